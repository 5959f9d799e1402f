//! Creates (or adopts) the workload running a preset model for a workspace.
//!
use super::error::InferenceError;
use super::inference::{
    build_launch_plan, container_ports, liveness_probe, readiness_probe, tolerations,
    update_torch_params_for_distributed_inference, InferenceConfig,
};
use super::manifests::{ManifestBuilder, WorkloadSpec};
use super::sku::GpuCountResolver;
use super::types::Workspace;
use super::utils::{config_adapter_volume, config_shm_volume};
use crate::k8s::client::ResourceClient;
use crate::k8s::object::ClusterObject;
use crate::model::PresetParam;
use std::sync::Arc;
use tracing::{error, info};

pub struct PresetInference<C: ?Sized, M, G> {
    client: Arc<C>,
    manifests: M,
    gpu_resolver: G,
    config: InferenceConfig,
}

impl<C, M, G> PresetInference<C, M, G>
where
    C: ResourceClient + ?Sized,
    M: ManifestBuilder,
    G: GpuCountResolver,
{
    pub fn new(client: Arc<C>, manifests: M, gpu_resolver: G, config: InferenceConfig) -> Self {
        Self {
            client,
            manifests,
            gpu_resolver,
            config,
        }
    }

    /// Creates the Service the workload is reached through and, for distributed models, the
    /// headless Service giving its pods stable DNS names. Existing services are kept.
    pub async fn ensure_services(
        &self,
        workspace: &Workspace,
        support_distributed: bool,
    ) -> Result<(), InferenceError> {
        let service = self.manifests.build_service(workspace, support_distributed);
        self.create_or_adopt(service.into()).await?;

        if support_distributed {
            let headless = self.manifests.build_headless_service(workspace);
            self.create_or_adopt(headless.into()).await?;
        }
        Ok(())
    }

    /// Submits the inference workload of `workspace`: a StatefulSet for distributed models,
    /// a Deployment otherwise. A workload that already exists is adopted as is.
    ///
    /// `params` is never modified; the distributed topology is derived on a copy.
    pub async fn create_preset_inference(
        &self,
        workspace: &Workspace,
        revision: &str,
        params: &PresetParam,
        support_distributed: bool,
    ) -> Result<ClusterObject, InferenceError> {
        let node_count = workspace.node_count();
        if node_count <= 0 {
            return Err(InferenceError::InvalidNodeCount(node_count));
        }

        let mut params = params.clone();
        if params.torch_run_params.is_some() && support_distributed {
            if let Err(err) =
                update_torch_params_for_distributed_inference(self.client.as_ref(), workspace, &mut params)
                    .await
            {
                error!(workspace = workspace.name.as_str(), "failed to update torch params: {err}");
                return Err(err);
            }
        }

        let mut volumes = Vec::new();
        let mut volume_mounts = Vec::new();
        if let Some((volume, mount)) = config_shm_volume(node_count) {
            volumes.push(volume);
            volume_mounts.push(mount);
        }
        if !workspace.inference.adapters.is_empty() {
            let (volume, mount) = config_adapter_volume();
            volumes.push(volume);
            volume_mounts.push(mount);
        }

        let gpus = self
            .gpu_resolver
            .resolve(
                &workspace.status.worker_nodes,
                &workspace.resource.instance_type,
                &params.gpu_count_requirement,
            )
            .await?;
        let plan = build_launch_plan(workspace, &params, &gpus, &self.config)?;

        let spec = WorkloadSpec {
            image: plan.image,
            image_pull_secrets: plan.image_pull_secrets,
            replicas: node_count,
            commands: plan.commands,
            container_ports: container_ports(),
            liveness_probe: Some(liveness_probe()),
            readiness_probe: Some(readiness_probe()),
            resource_requirements: plan.resource_requirements,
            tolerations: tolerations(),
            volumes,
            volume_mounts,
        };

        let workload: ClusterObject = if support_distributed {
            self.manifests.build_stateful_set(workspace, &spec).into()
        } else {
            self.manifests
                .build_deployment(workspace, revision, &spec)
                .into()
        };

        self.create_or_adopt(workload).await
    }

    async fn create_or_adopt(&self, object: ClusterObject) -> Result<ClusterObject, InferenceError> {
        match self.client.create(&object).await {
            Ok(_) => Ok(object),
            Err(err) if err.is_already_exists() => {
                info!(
                    kind = %object.kind(),
                    name = object.name(),
                    "object already exists, keeping it"
                );
                Ok(object)
            }
            Err(source) => Err(InferenceError::Create {
                kind: object.kind(),
                name: object.name().to_string(),
                source,
            }),
        }
    }
}
