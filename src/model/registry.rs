use super::Model;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ModelRegistryError {
    #[error("model not found: `{0}`")]
    NotFound(String),

    #[error("model already registered: `{0}`")]
    AlreadyRegistered(String),

    #[error("model `{0}` declares rendezvous parameters but does not support distributed inference")]
    InconsistentDistributedSupport(String),
}

/// Maps preset names to their [Model]. Built once at start-up and shared read-only.
#[derive(Default, Clone)]
pub struct ModelRegistry(HashMap<String, Arc<dyn Model>>);

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model under `name`. Models whose inference parameters carry rendezvous
    /// parameters must support distributed inference.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        model: Arc<dyn Model>,
    ) -> Result<(), ModelRegistryError> {
        let name = name.into();
        if self.0.contains_key(&name) {
            return Err(ModelRegistryError::AlreadyRegistered(name));
        }
        if model.inference_parameters().torch_run_rdzv_params.is_some()
            && !model.supports_distributed_inference()
        {
            return Err(ModelRegistryError::InconsistentDistributedSupport(name));
        }
        self.0.insert(name, model);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Model>, ModelRegistryError> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| ModelRegistryError::NotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModelRegistry").field(&self.names()).finish()
    }
}
