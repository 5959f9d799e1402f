use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error loading config: `{0}`")]
    Io(#[from] std::io::Error),

    #[error("invalid engine config: `{0}`")]
    Yaml(#[from] serde_yaml::Error),
}
