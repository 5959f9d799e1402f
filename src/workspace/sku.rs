//! Resolves how many GPUs a workload requests on the instance type it runs on.
//!
use crate::k8s::client::ResourceClient;
use crate::k8s::error::K8sError;
use crate::k8s::object::ResourceKind;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub const CAPACITY_NVIDIA_GPU: &str = "nvidia.com/gpu";

/// GPU count per supported instance type. Lookups ignore case.
const SKU_GPU_COUNTS: &[(&str, u32)] = &[
    ("standard_nc6s_v3", 1),
    ("standard_nc12s_v3", 2),
    ("standard_nc24s_v3", 4),
    ("standard_nc24rs_v3", 4),
    ("standard_nc4as_t4_v3", 1),
    ("standard_nc8as_t4_v3", 1),
    ("standard_nc16as_t4_v3", 1),
    ("standard_nc64as_t4_v3", 4),
    ("standard_nc24ads_a100_v4", 1),
    ("standard_nc48ads_a100_v4", 2),
    ("standard_nc96ads_a100_v4", 4),
    ("standard_nd96asr_v4", 8),
    ("standard_nd96amsr_a100_v4", 8),
    ("standard_nd40rs_v2", 8),
    ("standard_nv36ads_a10_v5", 1),
    ("standard_nv72ads_a10_v5", 2),
    ("standard_nc40ads_h100_v5", 1),
    ("standard_nc80adis_h100_v5", 2),
    ("standard_nd96isr_h100_v5", 8),
];

#[derive(Error, Debug)]
pub enum SkuError {
    #[error("failed to get worker node `{node}`: {source}")]
    NodeLookup {
        node: String,
        #[source]
        source: K8sError,
    },
}

/// Known GPU count for an instance type, if it is in the supported table.
pub fn sku_gpu_count(instance_type: &str) -> Option<u32> {
    let instance_type = instance_type.to_lowercase();
    SKU_GPU_COUNTS
        .iter()
        .find(|(sku, _)| *sku == instance_type)
        .map(|(_, count)| *count)
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GpuCountResolver: Send + Sync {
    /// Returns the GPU quantity to request, as a string quantity.
    async fn resolve(
        &self,
        worker_nodes: &[String],
        instance_type: &str,
        gpu_count_requirement: &str,
    ) -> Result<String, SkuError>;
}

/// Resolves the GPU count from the SKU table, falling back to the GPU capacity reported by the
/// first worker node and finally to the model requirement.
pub struct SkuGpuResolver<C: ?Sized> {
    client: Arc<C>,
}

impl<C: ?Sized> SkuGpuResolver<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> GpuCountResolver for SkuGpuResolver<C>
where
    C: ResourceClient + ?Sized,
{
    async fn resolve(
        &self,
        worker_nodes: &[String],
        instance_type: &str,
        gpu_count_requirement: &str,
    ) -> Result<String, SkuError> {
        if let Some(count) = sku_gpu_count(instance_type) {
            return Ok(count.to_string());
        }

        let Some(node_name) = worker_nodes.first() else {
            debug!(instance_type, "unknown instance type without worker nodes, using model requirement");
            return Ok(gpu_count_requirement.to_string());
        };

        let node: Node = self
            .client
            .get(node_name, "", ResourceKind::Node)
            .await
            .and_then(Node::try_from)
            .map_err(|source| SkuError::NodeLookup {
                node: node_name.clone(),
                source,
            })?;

        let capacity = node
            .status
            .and_then(|s| s.capacity)
            .and_then(|c| c.get(CAPACITY_NVIDIA_GPU).map(|q| q.0.clone()))
            .filter(|q| !q.is_empty());

        match capacity {
            Some(count) => Ok(count),
            None => {
                debug!(node = node_name.as_str(), "worker node reports no gpu capacity, using model requirement");
                Ok(gpu_count_requirement.to_string())
            }
        }
    }
}
