//! Preset model parameters and the [Model] interface every registered model implements.
//!
use std::time::Duration;

pub mod registry;
pub mod test_models;

pub use registry::{ModelRegistry, ModelRegistryError};

/// Ordered `--key=value` parameters of a launch command. Iteration follows insertion order so
/// the generated command line is stable; setting an existing key keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandParams(Vec<(String, String)>);

impl CommandParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for CommandParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = CommandParams::new();
        iter.into_iter().for_each(|(k, v)| params.set(k, v));
        params
    }
}

impl<const N: usize> From<[(&str, &str); N]> for CommandParams {
    fn from(value: [(&str, &str); N]) -> Self {
        value.into_iter().collect()
    }
}

/// Static launch parameters of a preset model.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetParam {
    /// GPU count needed to host the model, e.g. `"1"` or `"2"`.
    pub gpu_count_requirement: String,
    pub readiness_timeout: Duration,
    pub base_command: String,
    /// torchrun parameters. Absent for models not launched through torchrun.
    pub torch_run_params: Option<CommandParams>,
    /// Rendezvous parameters. Present only for models able to run on several nodes.
    pub torch_run_rdzv_params: Option<CommandParams>,
    pub model_run_params: CommandParams,
    /// Total number of worker processes across every node.
    pub world_size: i32,
    pub tag: String,
}

impl Default for PresetParam {
    fn default() -> Self {
        Self {
            gpu_count_requirement: "1".to_string(),
            readiness_timeout: Duration::from_secs(30 * 60),
            base_command: String::default(),
            torch_run_params: None,
            torch_run_rdzv_params: None,
            model_run_params: CommandParams::default(),
            world_size: 1,
            tag: String::default(),
        }
    }
}

/// A preset model as known to the [ModelRegistry].
pub trait Model: Send + Sync {
    fn inference_parameters(&self) -> PresetParam;

    fn tuning_parameters(&self) -> PresetParam;

    fn supports_distributed_inference(&self) -> bool;

    fn supports_tuning(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_params_keep_insertion_order() {
        let mut params = CommandParams::from([("nnodes", "1"), ("standalone", "")]);
        params.set("nproc_per_node", "4");
        params.set("nnodes", "2");

        let collected: Vec<_> = params.iter().collect();
        assert_eq!(
            collected,
            vec![("nnodes", "2"), ("standalone", ""), ("nproc_per_node", "4")]
        );
        assert_eq!(params.get("nproc_per_node"), Some("4"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.len(), 3);
    }
}
