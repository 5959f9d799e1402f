//! Derives the launch parameters of a preset inference workload: torchrun topology, command
//! line, GPU resources and container image.
//!
use super::error::InferenceError;
use super::manifests::headless_service_name;
use super::sku::CAPACITY_NVIDIA_GPU;
use super::types::{ModelImageAccessMode, Workspace};
use super::utils::{build_cmd_str, shell_cmd};
use crate::k8s::client::ResourceClient;
use crate::k8s::object::ResourceKind;
use crate::model::{CommandParams, PresetParam};
use k8s_openapi::api::core::v1::{
    ContainerPort, HTTPGetAction, LocalObjectReference, Probe, ResourceRequirements, Service,
    Toleration,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use tracing::debug;

pub const PROBE_PATH: &str = "/health";
pub const PORT: i32 = 5000;
pub const TORCH_PORT: &str = "29500";
pub const INFERENCE_FILE: &str = "inference_api.py";

pub const SKU_TOLERATION_KEY: &str = "sku";
pub const SKU_TOLERATION_VALUE: &str = "gpu";

const NODE_RANK_FROM_HOSTNAME: &str = "$(echo $HOSTNAME | grep -o '[^-]*$')";
const MAX_RESTARTS: &str = "3";
const RDZV_ID: &str = "job";
const RDZV_BACKEND: &str = "c10d";

/// Registry settings the orchestrator resolves public preset images against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceConfig {
    pub registry_name: String,
}

impl InferenceConfig {
    pub fn new(registry_name: impl Into<String>) -> Self {
        Self {
            registry_name: registry_name.into(),
        }
    }
}

/// Everything derived from a preset that the workload manifest needs.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub image: String,
    pub image_pull_secrets: Vec<LocalObjectReference>,
    pub commands: Vec<String>,
    pub resource_requirements: ResourceRequirements,
}

pub fn container_ports() -> Vec<ContainerPort> {
    vec![ContainerPort {
        container_port: PORT,
        ..Default::default()
    }]
}

fn http_probe(initial_delay_seconds: i32, period_seconds: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(PROBE_PATH.to_string()),
            port: IntOrString::Int(PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        ..Default::default()
    }
}

/// Model servers may take a long while loading weights before answering.
pub fn liveness_probe() -> Probe {
    http_probe(600, 10)
}

pub fn readiness_probe() -> Probe {
    http_probe(30, 10)
}

pub fn tolerations() -> Vec<Toleration> {
    vec![
        Toleration {
            effect: Some("NoSchedule".to_string()),
            operator: Some("Exists".to_string()),
            key: Some(CAPACITY_NVIDIA_GPU.to_string()),
            ..Default::default()
        },
        Toleration {
            effect: Some("NoSchedule".to_string()),
            operator: Some("Equal".to_string()),
            key: Some(SKU_TOLERATION_KEY.to_string()),
            value: Some(SKU_TOLERATION_VALUE.to_string()),
            ..Default::default()
        },
    ]
}

/// DNS name of the rank 0 pod used as rendezvous endpoint.
pub fn rdzv_endpoint(workspace: &Workspace) -> String {
    format!(
        "{}-0.{}.{}.svc.cluster.local:{TORCH_PORT}",
        workspace.name,
        headless_service_name(&workspace.name),
        workspace.namespace
    )
}

/// Fills in the torchrun topology of a distributed preset. The workspace Service must
/// already exist since its cluster IP is used as master address.
pub async fn update_torch_params_for_distributed_inference<C>(
    client: &C,
    workspace: &Workspace,
    params: &mut PresetParam,
) -> Result<(), InferenceError>
where
    C: ResourceClient + ?Sized,
{
    let service: Service = client
        .get(&workspace.name, &workspace.namespace, ResourceKind::Service)
        .await
        .and_then(Service::try_from)
        .map_err(|source| InferenceError::ServiceLookup {
            namespace: workspace.namespace.clone(),
            name: workspace.name.clone(),
            source,
        })?;

    let nodes = workspace.node_count();
    if nodes <= 0 {
        return Err(InferenceError::InvalidNodeCount(nodes));
    }

    let torch = params
        .torch_run_params
        .get_or_insert_with(CommandParams::new);
    torch.set("nnodes", nodes.to_string());
    torch.set("nproc_per_node", (params.world_size / nodes).to_string());
    if nodes > 1 {
        let cluster_ip = service
            .spec
            .and_then(|s| s.cluster_ip)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| InferenceError::MissingClusterIp(workspace.name.clone()))?;
        torch.set("node_rank", NODE_RANK_FROM_HOSTNAME);
        torch.set("master_addr", cluster_ip);
        torch.set("master_port", TORCH_PORT);
    }

    if let Some(rdzv) = params.torch_run_rdzv_params.as_mut() {
        rdzv.set("max_restarts", MAX_RESTARTS);
        rdzv.set("rdzv_id", RDZV_ID);
        rdzv.set("rdzv_backend", RDZV_BACKEND);
        rdzv.set("rdzv_endpoint", rdzv_endpoint(workspace));
    }

    debug!(workspace = workspace.name.as_str(), nodes, "updated torch params for distributed inference");
    Ok(())
}

/// Image and pull secrets of the inference container. Adapter pull secrets are always
/// included; private presets bring their own image and secrets.
pub fn inference_image_info(
    workspace: &Workspace,
    params: &PresetParam,
    registry_name: &str,
) -> Result<(String, Vec<LocalObjectReference>), InferenceError> {
    let secret_ref = |name: &String| LocalObjectReference {
        name: Some(name.clone()),
    };

    let mut pull_secrets: Vec<LocalObjectReference> = workspace
        .inference
        .adapters
        .iter()
        .flat_map(|a| a.source.image_pull_secrets.iter().map(secret_ref))
        .collect();

    let preset_name = workspace.preset_name().unwrap_or_default();
    let Some(preset) = workspace.inference.preset.as_ref() else {
        return Ok((public_image(registry_name, preset_name, &params.tag), pull_secrets));
    };

    match preset.access_mode {
        ModelImageAccessMode::Private => {
            let image = preset
                .preset_options
                .image
                .clone()
                .filter(|i| !i.is_empty())
                .ok_or_else(|| InferenceError::MissingPrivateImage(preset.name.clone()))?;
            pull_secrets.extend(preset.preset_options.image_pull_secrets.iter().map(secret_ref));
            Ok((image, pull_secrets))
        }
        ModelImageAccessMode::Public => Ok((
            public_image(registry_name, &preset.name, &params.tag),
            pull_secrets,
        )),
    }
}

fn public_image(registry_name: &str, preset_name: &str, tag: &str) -> String {
    format!("{registry_name}/kaito-{preset_name}:{tag}")
}

/// Builds `<base> <torch params> <rdzv params> inference_api.py <model params>` as a shell
/// command, together with the GPU request and limit.
pub fn prepare_inference_parameters(
    params: &PresetParam,
    gpu_count: &str,
) -> Result<(Vec<String>, ResourceRequirements), InferenceError> {
    let torch_command = build_cmd_str(&params.base_command, params.torch_run_params.as_ref());
    let torch_command = build_cmd_str(&torch_command, params.torch_run_rdzv_params.as_ref());
    let model_command = build_cmd_str(INFERENCE_FILE, Some(&params.model_run_params));
    let commands = shell_cmd(&format!("{torch_command} {model_command}"));

    Ok((commands, gpu_resource_requirements(gpu_count)?))
}

/// Derives the full [LaunchPlan] of a preset whose torch parameters are already final.
pub fn build_launch_plan(
    workspace: &Workspace,
    params: &PresetParam,
    gpu_count: &str,
    config: &InferenceConfig,
) -> Result<LaunchPlan, InferenceError> {
    let (commands, resource_requirements) = prepare_inference_parameters(params, gpu_count)?;
    let (image, image_pull_secrets) =
        inference_image_info(workspace, params, &config.registry_name)?;

    Ok(LaunchPlan {
        image,
        image_pull_secrets,
        commands,
        resource_requirements,
    })
}

fn gpu_resource_requirements(gpu_count: &str) -> Result<ResourceRequirements, InferenceError> {
    let gpus = gpu_count
        .trim()
        .parse::<u32>()
        .map_err(|_| InferenceError::InvalidGpuQuantity(gpu_count.to_string()))?;
    let list = BTreeMap::from([(CAPACITY_NVIDIA_GPU.to_string(), Quantity(gpus.to_string()))]);

    Ok(ResourceRequirements {
        requests: Some(list.clone()),
        limits: Some(list),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::client::MockResourceClient;
    use crate::k8s::error::tests::api_error;
    use crate::k8s::object::ClusterObject;
    use crate::model::test_models::TestDistributedModel;
    use crate::model::Model;
    use crate::workspace::types::{
        AdapterSource, AdapterSpec, PresetOptions, PresetSpec, ResourceSpec,
    };
    use assert_matches::assert_matches;
    use k8s_openapi::api::core::v1::ServiceSpec;
    use k8s_openapi::api::apps::v1::Deployment;
    use mockall::predicate::eq;

    fn workspace(count: i32) -> Workspace {
        Workspace {
            name: "foo".to_string(),
            namespace: "ns".to_string(),
            resource: ResourceSpec {
                count: Some(count),
                instance_type: "Standard_NC12s_v3".to_string(),
            },
            inference: crate::workspace::types::InferenceSpec {
                preset: Some(PresetSpec {
                    name: "test-distributed-model".to_string(),
                    ..Default::default()
                }),
                adapters: vec![],
            },
            ..Default::default()
        }
    }

    fn service_client(cluster_ip: Option<&'static str>) -> MockResourceClient {
        let mut client = MockResourceClient::new();
        client
            .expect_get()
            .with(eq("foo"), eq("ns"), eq(ResourceKind::Service))
            .returning(move |_, _, _| {
                Ok(Service {
                    spec: Some(ServiceSpec {
                        cluster_ip: cluster_ip.map(String::from),
                        ..Default::default()
                    }),
                    ..Default::default()
                }
                .into())
            });
        client
    }

    #[tokio::test]
    async fn distributed_params_for_two_nodes() {
        let client = service_client(Some("10.0.0.1"));
        let mut params = TestDistributedModel.inference_parameters();
        params.world_size = 4;

        update_torch_params_for_distributed_inference(&client, &workspace(2), &mut params)
            .await
            .unwrap();

        let torch = params.torch_run_params.unwrap();
        assert_eq!(torch.get("nnodes"), Some("2"));
        assert_eq!(torch.get("nproc_per_node"), Some("2"));
        assert_eq!(torch.get("node_rank"), Some("$(echo $HOSTNAME | grep -o '[^-]*$')"));
        assert_eq!(torch.get("master_addr"), Some("10.0.0.1"));
        assert_eq!(torch.get("master_port"), Some("29500"));

        let rdzv = params.torch_run_rdzv_params.unwrap();
        assert_eq!(
            rdzv.get("rdzv_endpoint"),
            Some("foo-0.foo-headless.ns.svc.cluster.local:29500")
        );
        assert_eq!(rdzv.get("max_restarts"), Some("3"));
        assert_eq!(rdzv.get("rdzv_id"), Some("job"));
        assert_eq!(rdzv.get("rdzv_backend"), Some("c10d"));
    }

    #[tokio::test]
    async fn single_node_skips_master_settings() {
        let client = service_client(None);
        let mut params = TestDistributedModel.inference_parameters();

        update_torch_params_for_distributed_inference(&client, &workspace(1), &mut params)
            .await
            .unwrap();

        let torch = params.torch_run_params.unwrap();
        assert_eq!(torch.get("nnodes"), Some("1"));
        assert_eq!(torch.get("nproc_per_node"), Some("2"));
        assert_eq!(torch.get("master_addr"), None);
        assert_eq!(torch.get("node_rank"), None);
    }

    #[tokio::test]
    async fn nproc_per_node_is_deterministic() {
        let client = service_client(Some("10.0.0.1"));
        let mut first = TestDistributedModel.inference_parameters();
        first.world_size = 7;
        let mut second = first.clone();

        update_torch_params_for_distributed_inference(&client, &workspace(3), &mut first)
            .await
            .unwrap();
        update_torch_params_for_distributed_inference(&client, &workspace(3), &mut second)
            .await
            .unwrap();

        assert_eq!(first.torch_run_params.as_ref().unwrap().get("nproc_per_node"), Some("2"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_service_is_fatal() {
        let mut client = MockResourceClient::new();
        client
            .expect_get()
            .returning(|_, _, _| Err(api_error(404, "NotFound")));
        let mut params = TestDistributedModel.inference_parameters();

        let err = update_torch_params_for_distributed_inference(&client, &workspace(2), &mut params)
            .await
            .unwrap_err();
        assert_matches!(err, InferenceError::ServiceLookup { source, .. } if source.is_not_found());
    }

    #[tokio::test]
    async fn unexpected_kind_for_service_is_a_lookup_error() {
        let mut client = MockResourceClient::new();
        client
            .expect_get()
            .returning(|_, _, _| Ok(ClusterObject::from(Deployment::default())));
        let mut params = TestDistributedModel.inference_parameters();

        let err = update_torch_params_for_distributed_inference(&client, &workspace(2), &mut params)
            .await
            .unwrap_err();
        assert_matches!(err, InferenceError::ServiceLookup { .. });
    }

    #[tokio::test]
    async fn invalid_topology() {
        let client = service_client(Some("10.0.0.1"));
        let mut params = TestDistributedModel.inference_parameters();
        let err = update_torch_params_for_distributed_inference(&client, &workspace(0), &mut params)
            .await
            .unwrap_err();
        assert_matches!(err, InferenceError::InvalidNodeCount(0));

        let client = service_client(None);
        let err = update_torch_params_for_distributed_inference(&client, &workspace(2), &mut params)
            .await
            .unwrap_err();
        assert_matches!(err, InferenceError::MissingClusterIp(name) if name == "foo");
    }

    #[test]
    fn public_image_from_registry() {
        let mut ws = workspace(1);
        ws.inference.adapters = vec![AdapterSpec {
            source: AdapterSource {
                name: "adapter".to_string(),
                image_pull_secrets: vec!["adapter-secret".to_string()],
                ..Default::default()
            },
            strength: None,
        }];
        let params = TestDistributedModel.inference_parameters();

        let (image, secrets) = inference_image_info(&ws, &params, "myregistry.io").unwrap();
        assert_eq!(image, "myregistry.io/kaito-test-distributed-model:0.0.1");
        assert_eq!(secrets, vec![LocalObjectReference { name: Some("adapter-secret".into()) }]);
    }

    #[test]
    fn private_image_from_preset_options() {
        let mut ws = workspace(1);
        ws.inference.preset = Some(PresetSpec {
            name: "private-model".to_string(),
            access_mode: ModelImageAccessMode::Private,
            preset_options: PresetOptions {
                image: Some("private.io/model:1".to_string()),
                image_pull_secrets: vec!["a".to_string(), "b".to_string()],
            },
        });
        let params = PresetParam::default();

        let (image, secrets) = inference_image_info(&ws, &params, "ignored").unwrap();
        assert_eq!(image, "private.io/model:1");
        assert_eq!(secrets.len(), 2);

        ws.inference.preset.as_mut().unwrap().preset_options.image = None;
        let err = inference_image_info(&ws, &params, "ignored").unwrap_err();
        assert_matches!(err, InferenceError::MissingPrivateImage(name) if name == "private-model");
    }

    #[test]
    fn command_assembly_is_stable() {
        let mut params = TestDistributedModel.inference_parameters();
        params
            .torch_run_params
            .get_or_insert_with(CommandParams::new)
            .set("nnodes", "2");

        let (first, _) = prepare_inference_parameters(&params, "2").unwrap();
        let (second, _) = prepare_inference_parameters(&params.clone(), "2").unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], "/bin/sh");
        assert_eq!(first[1], "-c");
        assert_eq!(
            first[2],
            "torchrun --nnodes=2 inference_api.py --max_seq_len=512 --max_batch_size=8"
        );
    }

    #[test]
    fn gpu_request_equals_limit() {
        let params = PresetParam::default();
        let (_, resources) = prepare_inference_parameters(&params, "4").unwrap();

        let requests = resources.requests.unwrap();
        assert_eq!(requests.get(CAPACITY_NVIDIA_GPU), Some(&Quantity("4".to_string())));
        assert_eq!(Some(requests), resources.limits);

        let err = prepare_inference_parameters(&params, "two").unwrap_err();
        assert_matches!(err, InferenceError::InvalidGpuQuantity(q) if q == "two");
    }

    #[test]
    fn fixed_probe_and_toleration_policy() {
        let liveness = liveness_probe();
        assert_eq!(liveness.initial_delay_seconds, Some(600));
        assert_eq!(liveness.period_seconds, Some(10));
        assert_eq!(readiness_probe().initial_delay_seconds, Some(30));
        assert_eq!(
            liveness.http_get.unwrap().path.as_deref(),
            Some(PROBE_PATH)
        );

        let tolerations = tolerations();
        assert_eq!(tolerations[0].key.as_deref(), Some(CAPACITY_NVIDIA_GPU));
        assert_eq!(tolerations[1].value.as_deref(), Some("gpu"));
    }
}
