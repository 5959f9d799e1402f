use super::sku::SkuError;
use crate::k8s::error::K8sError;
use crate::k8s::object::ResourceKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to get service `{namespace}/{name}`: {source}")]
    ServiceLookup {
        namespace: String,
        name: String,
        #[source]
        source: K8sError,
    },

    #[error("failed to create {kind} `{name}`: {source}")]
    Create {
        kind: ResourceKind,
        name: String,
        #[source]
        source: K8sError,
    },

    #[error("failed to get SKU num GPUs: {0}")]
    SkuGpus(#[from] SkuError),

    #[error("service `{0}` has no cluster IP")]
    MissingClusterIp(String),

    #[error("invalid node count `{0}`, at least one node is required")]
    InvalidNodeCount(i32),

    #[error("invalid GPU quantity `{0}`")]
    InvalidGpuQuantity(String),

    #[error("private access mode requires an image for preset `{0}`")]
    MissingPrivateImage(String),
}
