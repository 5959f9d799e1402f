//! Engine configuration, read from a YAML file.
//!
//! ```yaml
//! preset_registry_name: mcr.microsoft.com/aks/kaito
//! client:
//!   retry:
//!     steps: 4
//!     initial_delay: 10ms
//!     factor: 5.0
//!     cap: 10s
//! readiness:
//!   poll_interval: 1s
//! ```
//!
//! Only `preset_registry_name` is mandatory.
pub mod error;

pub use error::ConfigError;

use crate::k8s::readiness::DEFAULT_POLL_INTERVAL;
use crate::k8s::retry::{Backoff, RetryPolicy};
use crate::workspace::InferenceConfig;
use duration_str::deserialize_duration;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_RETRY_STEPS: u32 = 4;
const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_RETRY_FACTOR: f64 = 5.0;
const DEFAULT_RETRY_CAP: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct EngineConfig {
    pub preset_registry_name: String,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
}

#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_retry_steps")]
    pub steps: u32,
    #[serde(
        default = "default_retry_initial_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub initial_delay: Duration,
    #[serde(default = "default_retry_factor")]
    pub factor: f64,
    #[serde(default = "default_retry_cap", deserialize_with = "deserialize_duration")]
    pub cap: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            steps: DEFAULT_RETRY_STEPS,
            initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            factor: DEFAULT_RETRY_FACTOR,
            cap: DEFAULT_RETRY_CAP,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ReadinessConfig {
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub poll_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

fn default_retry_steps() -> u32 {
    DEFAULT_RETRY_STEPS
}

fn default_retry_initial_delay() -> Duration {
    DEFAULT_RETRY_INITIAL_DELAY
}

fn default_retry_factor() -> f64 {
    DEFAULT_RETRY_FACTOR
}

fn default_retry_cap() -> Duration {
    DEFAULT_RETRY_CAP
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig::new(&self.preset_registry_name)
    }

    /// Client retry policy. Every error is retried.
    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.client.retry;
        RetryPolicy::default().with_backoff(
            Backoff::new()
                .with_steps(retry.steps)
                .with_initial_delay(retry.initial_delay)
                .with_factor(retry.factor)
                .with_cap(retry.cap),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        self.readiness.poll_interval
    }
}
