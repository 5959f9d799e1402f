//! Reference models: a single-node one and a distributed-capable one. Both support tuning.
//!
use super::{CommandParams, Model, ModelRegistry, ModelRegistryError, PresetParam};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_MODEL: &str = "test-model";
pub const TEST_DISTRIBUTED_MODEL: &str = "test-distributed-model";

const READINESS_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default)]
pub struct TestModel;

impl Model for TestModel {
    fn inference_parameters(&self) -> PresetParam {
        PresetParam {
            gpu_count_requirement: "1".to_string(),
            readiness_timeout: READINESS_TIMEOUT,
            base_command: "python3".to_string(),
            ..Default::default()
        }
    }

    fn tuning_parameters(&self) -> PresetParam {
        PresetParam {
            gpu_count_requirement: "1".to_string(),
            readiness_timeout: READINESS_TIMEOUT,
            ..Default::default()
        }
    }

    fn supports_distributed_inference(&self) -> bool {
        false
    }

    fn supports_tuning(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct TestDistributedModel;

impl Model for TestDistributedModel {
    fn inference_parameters(&self) -> PresetParam {
        PresetParam {
            gpu_count_requirement: "1".to_string(),
            readiness_timeout: READINESS_TIMEOUT,
            base_command: "torchrun".to_string(),
            torch_run_params: Some(CommandParams::new()),
            torch_run_rdzv_params: Some(CommandParams::new()),
            model_run_params: CommandParams::from([("max_seq_len", "512"), ("max_batch_size", "8")]),
            world_size: 2,
            tag: "0.0.1".to_string(),
        }
    }

    fn tuning_parameters(&self) -> PresetParam {
        PresetParam {
            gpu_count_requirement: "1".to_string(),
            readiness_timeout: READINESS_TIMEOUT,
            ..Default::default()
        }
    }

    fn supports_distributed_inference(&self) -> bool {
        true
    }

    fn supports_tuning(&self) -> bool {
        true
    }
}

/// Registers [TestModel] and [TestDistributedModel] under their well-known names.
pub fn register_test_models(registry: &mut ModelRegistry) -> Result<(), ModelRegistryError> {
    registry.register(TEST_MODEL, Arc::new(TestModel))?;
    registry.register(TEST_DISTRIBUTED_MODEL, Arc::new(TestDistributedModel))?;
    Ok(())
}
