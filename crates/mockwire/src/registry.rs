//! Registered mappings in registration order.

use crate::error::MappingError;
use crate::mapping::{Mapping, MappingKind, MappingModel};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Mapping store shared by the dispatcher and the admin surface.
///
/// Writers swap whole `Arc<Mapping>` entries under the write lock, so a
/// dispatch holding a snapshot keeps complete mappings alive even if they
/// are removed concurrently.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    mappings: RwLock<Vec<Arc<Mapping>>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping, replacing one with the same id in place.
    /// Returns the replaced mapping.
    pub fn add_or_replace(&self, mapping: Mapping) -> Option<Arc<Mapping>> {
        let mut mappings = self.mappings.write();
        Self::insert(&mut mappings, Arc::new(mapping))
    }

    fn insert(mappings: &mut Vec<Arc<Mapping>>, mapping: Arc<Mapping>) -> Option<Arc<Mapping>> {
        match mappings.iter().position(|m| m.id == mapping.id) {
            Some(index) => Some(std::mem::replace(&mut mappings[index], mapping)),
            None => {
                mappings.push(mapping);
                None
            }
        }
    }

    pub fn remove(&self, id: Uuid) -> Result<Arc<Mapping>, MappingError> {
        let mut mappings = self.mappings.write();
        let index = mappings
            .iter()
            .position(|m| m.id == id)
            .ok_or(MappingError::NotFound(id))?;
        Ok(mappings.remove(index))
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Mapping>> {
        self.mappings.read().iter().find(|m| m.id == id).cloned()
    }

    /// Remove every mapping except internal admin ones. Returns the count removed.
    pub fn reset(&self) -> usize {
        let mut mappings = self.mappings.write();
        let before = mappings.len();
        mappings.retain(|m| m.kind == MappingKind::Admin);
        before - mappings.len()
    }

    /// All mappings, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Mapping>> {
        self.mappings.read().clone()
    }

    pub fn len(&self) -> usize {
        self.mappings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.read().is_empty()
    }

    /// Register a batch atomically. A duplicate id inside the batch rejects
    /// the whole batch before anything is applied.
    pub fn import(&self, batch: Vec<Mapping>) -> Result<usize, MappingError> {
        let mut seen = HashSet::with_capacity(batch.len());
        for mapping in &batch {
            if !seen.insert(mapping.id) {
                return Err(MappingError::DuplicateId(mapping.id));
            }
        }

        let count = batch.len();
        let mut mappings = self.mappings.write();
        for mapping in batch {
            Self::insert(&mut mappings, Arc::new(mapping));
        }
        info!("Imported {} mappings", count);
        Ok(count)
    }

    /// Persistence models of every non-admin mapping.
    pub fn export(&self) -> Vec<MappingModel> {
        self.mappings
            .read()
            .iter()
            .filter(|m| !m.is_admin())
            .map(|m| m.to_model())
            .collect()
    }
}
