//! Live tests. They run only when `POLYREF_TEST_DATABASE_URL` points at a
//! PostgreSQL database; each test works in a throwaway schema.

use polyref_core::{
  Dialect, ReferenceController, ReferenceEntity, Row, Statement, Value,
  exec::SqlExecutor,
  proxy::{ColumnKind, ProxyBuilder},
  schema::Catalog,
};
use uuid::Uuid;

use crate::PgExecutor;

const TABLES: &str = "
  CREATE TABLE dogs (id bigserial PRIMARY KEY, name text, bark_sound text);
  CREATE TABLE cats (id bigserial PRIMARY KEY, name text, meow_sound text);
  CREATE TABLE animals (
    id     bigserial PRIMARY KEY,
    dog_id bigint,
    cat_id bigint,
    name   text,
    sound  varchar(40)
  );
";

struct Fixture {
  executor: PgExecutor,
  schema:   String,
  catalog:  Catalog,
  animal:   ReferenceEntity,
}

impl Fixture {
  fn controller(&self) -> ReferenceController<'_> {
    ReferenceController::new(&self.animal, &self.catalog, Dialect::Postgres)
  }

  async fn run(&self, sql: &str) -> crate::Result<u64> {
    self.executor.execute(&Statement::new(sql)).await
  }

  async fn rows(&self, sql: &str) -> Vec<Row> {
    self.executor.query(&Statement::new(sql)).await.unwrap()
  }

  async fn drop_schema(self) {
    self
      .executor
      .execute_script(&format!("DROP SCHEMA \"{}\" CASCADE", self.schema))
      .await
      .unwrap();
  }
}

async fn fixture() -> Option<Fixture> {
  let url = std::env::var("POLYREF_TEST_DATABASE_URL").ok()?;
  let executor = PgExecutor::connect(&url).await.expect("test database");
  let schema = format!("polyref_test_{}", Uuid::new_v4().simple());
  executor
    .execute_script(&format!(
      "CREATE SCHEMA \"{schema}\"; SET search_path TO \"{schema}\"; {TABLES}"
    ))
    .await
    .unwrap();
  let catalog = executor
    .introspect_catalog(&[("Dog", "dogs"), ("Cat", "cats"), ("Animal", "animals")])
    .await
    .unwrap();

  let animal = ReferenceEntity::builder("Animal")
    .source("dog", "dog_id", "Dog")
    .source("cat", "cat_id", "Cat")
    .proxy(ProxyBuilder::new("name").field().unwrap())
    .proxy(
      ProxyBuilder::new("sound")
        .without_default()
        .source_column("dog", "bark_sound")
        .source_column("cat", "meow_sound")
        .proxied(ColumnKind::Char { max_length: 40 })
        .unwrap(),
    )
    .build()
    .unwrap();

  Some(Fixture { executor, schema, catalog, animal })
}

#[tokio::test]
async fn triggers_keep_references_in_step() {
  let Some(f) = fixture().await else { return };
  f.controller().apply_all(&f.executor).await.unwrap();

  f.run("INSERT INTO dogs (name, bark_sound) VALUES ('Rex', 'woof')")
    .await
    .unwrap();
  f.run("UPDATE dogs SET bark_sound = 'grr'").await.unwrap();
  f.run("INSERT INTO cats (name, meow_sound) VALUES ('Tom', 'meow')")
    .await
    .unwrap();

  let rows = f.rows("SELECT dog_id, cat_id, sound FROM animals ORDER BY id").await;
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].get("sound"), Some(&Value::from("grr")));
  assert!(rows[0].is_null("cat_id"));
  assert_eq!(rows[1].get("sound"), Some(&Value::from("meow")));

  f.drop_schema().await;
}

#[tokio::test]
async fn check_constraint_rejects_zero_or_two_slots() {
  let Some(f) = fixture().await else { return };
  f.controller().apply_all(&f.executor).await.unwrap();

  assert!(f.run("INSERT INTO animals (name) VALUES ('ghost')").await.is_err());
  assert!(
    f.run("INSERT INTO animals (dog_id, cat_id) VALUES (1, 1)")
      .await
      .is_err()
  );
  f.run("INSERT INTO animals (dog_id) VALUES (1)").await.unwrap();

  f.drop_schema().await;
}

#[tokio::test]
async fn reapplying_and_tearing_down_are_clean() {
  let Some(f) = fixture().await else { return };
  f.controller().apply_all(&f.executor).await.unwrap();
  f.controller().apply_all(&f.executor).await.unwrap();

  let triggers = format!(
    "SELECT count(*) FROM information_schema.triggers WHERE trigger_schema = '{}'",
    f.schema
  );
  // One trigger per source, reported once per event.
  assert_eq!(
    f.rows(&triggers).await[0].get_index(0).and_then(Value::as_i64),
    Some(4)
  );

  f.controller().teardown_all(&f.executor).await.unwrap();
  assert_eq!(
    f.rows(&triggers).await[0].get_index(0).and_then(Value::as_i64),
    Some(0)
  );
  f.run("INSERT INTO animals (name) VALUES ('ghost')").await.unwrap();

  f.drop_schema().await;
}

#[tokio::test]
async fn unpack_joins_each_source() {
  let Some(f) = fixture().await else { return };
  f.controller().apply_all(&f.executor).await.unwrap();
  f.run("INSERT INTO dogs (name, bark_sound) VALUES ('Rex', 'woof')")
    .await
    .unwrap();
  f.run("INSERT INTO cats (name, meow_sound) VALUES ('Tom', 'meow')")
    .await
    .unwrap();

  let controller = f.controller();
  let unpacked = controller.query(&f.executor).unpack().await.unwrap();
  assert_eq!(unpacked.len(), 2);
  assert_eq!(unpacked[0].source, "dog");
  assert_eq!(unpacked[1].row.get("meow_sound"), Some(&Value::from("meow")));

  let dogs = controller
    .query(&f.executor)
    .select_sources(&["dog_id"])
    .unwrap();
  assert_eq!(dogs.count().await.unwrap(), 1);
  let references = dogs.fetch().await.unwrap();
  let one = dogs.unpack_one(&references[0]).await.unwrap();
  assert_eq!(one.row.get("name"), Some(&Value::from("Rex")));

  f.drop_schema().await;
}
