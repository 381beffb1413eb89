//! [`ReferenceRegistry`]: the explicitly registered reference entities.

use std::collections::HashMap;

use tracing::debug;

use crate::{
  Error, Result,
  controller::ReferenceController,
  dialect::Dialect,
  entity::ReferenceEntity,
  schema::SchemaCatalog,
};

#[derive(Debug, Default)]
pub struct ReferenceRegistry {
  entities: Vec<ReferenceEntity>,
  by_name:  HashMap<String, usize>,
}

impl ReferenceRegistry {
  pub fn new() -> Self { Self::default() }

  pub fn register(&mut self, entity: ReferenceEntity) -> Result<()> {
    if self.by_name.contains_key(entity.name()) {
      return Err(Error::DuplicateEntity(entity.name().to_owned()));
    }
    self.by_name.insert(entity.name().to_owned(), self.entities.len());
    self.entities.push(entity);
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&ReferenceEntity> {
    self.by_name.get(name).map(|&i| &self.entities[i])
  }

  pub fn require(&self, name: &str) -> Result<&ReferenceEntity> {
    self
      .get(name)
      .ok_or_else(|| Error::UnknownEntity(name.to_owned()))
  }

  /// Entities in registration order.
  pub fn iter(&self) -> impl Iterator<Item = &ReferenceEntity> { self.entities.iter() }

  pub fn len(&self) -> usize { self.entities.len() }

  pub fn is_empty(&self) -> bool { self.entities.is_empty() }

  /// One controller per entity, in registration order.
  pub fn controllers<'a>(
    &'a self,
    catalog: &'a dyn SchemaCatalog,
    dialect: Dialect,
  ) -> impl Iterator<Item = ReferenceController<'a>> {
    self
      .entities
      .iter()
      .map(move |entity| ReferenceController::new(entity, catalog, dialect))
  }

  /// Checks every declaration against `catalog` and resolves every proxy for
  /// every slot. Stops at the first problem.
  pub fn validate(&self, catalog: &dyn SchemaCatalog, dialect: Dialect) -> Result<()> {
    for controller in self.controllers(catalog, dialect) {
      let entity = controller.entity();
      let reference = controller.reference_schema()?;

      for source in entity.sources() {
        reference.find_column(source.column().as_str())?;
        catalog.require(source.entity())?;
      }
      for proxy in entity.proxies().iter() {
        reference.find_column(proxy.reference_column().as_str())?;
      }

      let bindings = controller.bindings()?;
      debug!(
        entity = entity.name(),
        sources = bindings.len(),
        proxies = entity.proxies().len(),
        "reference entity validated"
      );
    }
    Ok(())
  }
}
