use std::sync::Arc;

use async_trait::async_trait;
use storage::Storage;
use tracing::{debug, warn};

use crate::{
    catalog::{CatalogError, GestureCatalog},
    CatalogLoader,
};

/// Loads the catalog from the data file and refuses it when dispatch could not succeed.
pub struct StoredCatalogLoader {
    storage: Storage,
}

impl StoredCatalogLoader {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CatalogLoader for StoredCatalogLoader {
    async fn load(&self) -> Result<Arc<GestureCatalog>, CatalogError> {
        let data = self.storage.load().await.map_err(|err| {
            warn!(error = %err, "failed to read gesture catalog");
            CatalogError::Unavailable(err.to_string())
        })?;

        let gestures = data.gestures.ok_or(CatalogError::MissingGestures)?;
        let matrix = data.matrix.ok_or(CatalogError::MissingDispatchConfig)?;
        let missing = matrix.missing_fields();
        if !missing.is_empty() {
            return Err(CatalogError::Incomplete(missing));
        }

        let catalog = GestureCatalog::new(gestures);
        debug!(gestures = catalog.len(), "loaded gesture catalog from storage");
        Ok(Arc::new(catalog))
    }
}
