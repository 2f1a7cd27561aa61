use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::model::{BackendId, ModelCatalog, ModelInfo};
use crate::source::GenerationSource;

/// Explicit set of generation backends and the models they serve.
///
/// Each coordinator is constructed with its own registry, so several
/// coordinators with different backends can run side by side.
pub struct SourceRegistry {
    sources: HashMap<BackendId, Arc<dyn GenerationSource>>,
    catalog: ModelCatalog,
}

impl SourceRegistry {
    /// Starts a builder for registering sources and a model catalog.
    pub fn builder() -> SourceRegistryBuilder {
        SourceRegistryBuilder::default()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Looks up a registered backend by id.
    pub fn source(&self, id: &BackendId) -> Option<Arc<dyn GenerationSource>> {
        self.sources.get(id).cloned()
    }

    /// Resolves a model id (or the catalog default) to its catalog entry and
    /// serving backend.
    pub fn resolve(
        &self,
        model_id: Option<&str>,
    ) -> Result<(ModelInfo, Arc<dyn GenerationSource>), ServiceError> {
        let model_id = model_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or_else(|| self.catalog.default_model())
            .ok_or_else(|| ServiceError::Validation("model must not be empty".into()))?;
        let model = self
            .catalog
            .get(model_id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownModel(model_id.to_string()))?;
        let source = self
            .source(&model.backend)
            .ok_or_else(|| ServiceError::BackendNotFound {
                backend: model.backend.clone(),
            })?;
        Ok((model, source))
    }
}

/// Builder used to register generation sources before creating a registry.
#[derive(Default)]
pub struct SourceRegistryBuilder {
    sources: Vec<Arc<dyn GenerationSource>>,
    catalog: ModelCatalog,
}

impl SourceRegistryBuilder {
    /// Registers a generation source. One source per backend id.
    pub fn register_source(mut self, source: Arc<dyn GenerationSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Replaces the model catalog.
    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Adds one model to the catalog.
    pub fn model(mut self, model: ModelInfo) -> Self {
        self.catalog = self.catalog.with_model(model);
        self
    }

    /// Builds the registry, rejecting duplicate backends and a default model
    /// that is missing from the catalog.
    pub fn build(self) -> Result<SourceRegistry, ServiceError> {
        let mut map: HashMap<BackendId, Arc<dyn GenerationSource>> = HashMap::new();
        let mut seen: HashSet<BackendId> = HashSet::new();
        for source in self.sources {
            let id = source.id();
            if !seen.insert(id.clone()) {
                return Err(ServiceError::Config(format!(
                    "duplicate backend registration: {id}"
                )));
            }
            map.insert(id, source);
        }
        if let Some(default_model) = self.catalog.default_model()
            && self.catalog.get(default_model).is_none()
        {
            return Err(ServiceError::Config(format!(
                "default model {default_model} is not in the catalog"
            )));
        }
        Ok(SourceRegistry {
            sources: map,
            catalog: self.catalog,
        })
    }
}
