//! Handler lookup by database and cloud type, with per-type overrides

use crate::config::{CloudType, DatabaseType};
use crate::databases::{self, DatabaseHandler};
use crate::storage::{self, StorageHandler};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Built-in handlers unless an override is registered for the type
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    databases: HashMap<DatabaseType, Arc<dyn DatabaseHandler>>,
    storage: HashMap<CloudType, Arc<dyn StorageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, db_type: DatabaseType, handler: Arc<dyn DatabaseHandler>) -> Self {
        self.databases.insert(db_type, handler);
        self
    }

    pub fn with_storage(mut self, cloud_type: CloudType, handler: Arc<dyn StorageHandler>) -> Self {
        self.storage.insert(cloud_type, handler);
        self
    }

    pub fn database(&self, db_type: DatabaseType) -> Result<Arc<dyn DatabaseHandler>> {
        match self.databases.get(&db_type) {
            Some(handler) => Ok(handler.clone()),
            None => databases::handler_for(db_type),
        }
    }

    pub fn storage(&self, cloud_type: CloudType) -> Result<Arc<dyn StorageHandler>> {
        match self.storage.get(&cloud_type) {
            Some(handler) => Ok(handler.clone()),
            None => storage::handler_for(cloud_type),
        }
    }
}
