//! Builds the Kubernetes objects that run a workspace.
//!
use super::types::Workspace;
use crate::k8s::labels::WorkspaceLabels;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, LocalObjectReference, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Service, ServicePort, ServiceSpec, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

pub const WORKSPACE_API_VERSION: &str = "kaito.sh/v1alpha1";
pub const WORKSPACE_KIND: &str = "Workspace";
pub const REVISION_ANNOTATION: &str = "workspace.kaito.io/revision";
const STATEFULSET_POD_NAME_LABEL: &str = "statefulset.kubernetes.io/pod-name";

pub const SERVICE_HTTP_PORT: i32 = 80;
pub const TORCH_PORT: i32 = 29500;

/// Name of the headless service backing the pods of a multi-node workspace.
pub fn headless_service_name(workspace_name: &str) -> String {
    format!("{workspace_name}-headless")
}

/// Container level inputs shared by every workload shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadSpec {
    pub image: String,
    pub image_pull_secrets: Vec<LocalObjectReference>,
    pub replicas: i32,
    pub commands: Vec<String>,
    pub container_ports: Vec<ContainerPort>,
    pub liveness_probe: Option<Probe>,
    pub readiness_probe: Option<Probe>,
    pub resource_requirements: ResourceRequirements,
    pub tolerations: Vec<Toleration>,
    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,
}

#[cfg_attr(test, mockall::automock)]
pub trait ManifestBuilder: Send + Sync {
    /// Single-node workload.
    fn build_deployment(&self, workspace: &Workspace, revision: &str, spec: &WorkloadSpec)
        -> Deployment;

    /// Multi-node workload. Pods get stable names `<workspace>-<ordinal>` through the
    /// headless service.
    fn build_stateful_set(&self, workspace: &Workspace, spec: &WorkloadSpec) -> StatefulSet;

    /// Service exposing the inference endpoint. For distributed workloads it also exposes the
    /// torch port of the rank 0 pod, whose cluster IP becomes the torchrun master address.
    fn build_service(&self, workspace: &Workspace, distributed: bool) -> Service;

    fn build_headless_service(&self, workspace: &Workspace) -> Service;
}

/// Default [ManifestBuilder].
#[derive(Debug, Default, Clone, Copy)]
pub struct KubeManifestBuilder;

impl KubeManifestBuilder {
    pub fn new() -> Self {
        Self
    }

    fn object_meta(workspace: &Workspace, name: String) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(workspace.namespace.clone()),
            labels: Some(WorkspaceLabels::new(&workspace.name).with_managed_by().get()),
            owner_references: owner_references(workspace),
            ..Default::default()
        }
    }

    fn selector(workspace: &Workspace) -> LabelSelector {
        LabelSelector {
            match_labels: Some(WorkspaceLabels::new(&workspace.name).get()),
            ..Default::default()
        }
    }

    fn pod_template(workspace: &Workspace, spec: &WorkloadSpec) -> PodTemplateSpec {
        let container = Container {
            name: workspace.name.clone(),
            image: Some(spec.image.clone()),
            command: Some(spec.commands.clone()),
            resources: Some(spec.resource_requirements.clone()),
            ports: non_empty(spec.container_ports.clone()),
            liveness_probe: spec.liveness_probe.clone(),
            readiness_probe: spec.readiness_probe.clone(),
            volume_mounts: non_empty(spec.volume_mounts.clone()),
            ..Default::default()
        };

        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(WorkspaceLabels::new(&workspace.name).get()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![container],
                image_pull_secrets: non_empty(spec.image_pull_secrets.clone()),
                tolerations: non_empty(spec.tolerations.clone()),
                volumes: non_empty(spec.volumes.clone()),
                ..Default::default()
            }),
        }
    }
}

impl ManifestBuilder for KubeManifestBuilder {
    fn build_deployment(
        &self,
        workspace: &Workspace,
        revision: &str,
        spec: &WorkloadSpec,
    ) -> Deployment {
        let mut metadata = Self::object_meta(workspace, workspace.name.clone());
        metadata.annotations = Some(BTreeMap::from([(
            REVISION_ANNOTATION.to_string(),
            revision.to_string(),
        )]));

        Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: Some(spec.replicas),
                selector: Self::selector(workspace),
                template: Self::pod_template(workspace, spec),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn build_stateful_set(&self, workspace: &Workspace, spec: &WorkloadSpec) -> StatefulSet {
        StatefulSet {
            metadata: Self::object_meta(workspace, workspace.name.clone()),
            spec: Some(StatefulSetSpec {
                replicas: Some(spec.replicas),
                pod_management_policy: Some("Parallel".to_string()),
                service_name: headless_service_name(&workspace.name),
                selector: Self::selector(workspace),
                template: Self::pod_template(workspace, spec),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn build_service(&self, workspace: &Workspace, distributed: bool) -> Service {
        let mut selector = WorkspaceLabels::new(&workspace.name);
        let mut ports = vec![ServicePort {
            name: Some("http".to_string()),
            protocol: Some("TCP".to_string()),
            port: SERVICE_HTTP_PORT,
            target_port: Some(IntOrString::Int(super::inference::PORT)),
            ..Default::default()
        }];
        if distributed {
            selector = selector.with(
                STATEFULSET_POD_NAME_LABEL,
                &format!("{}-0", workspace.name),
            );
            ports.push(torch_port());
        }

        Service {
            metadata: Self::object_meta(workspace, workspace.name.clone()),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(selector.get()),
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn build_headless_service(&self, workspace: &Workspace) -> Service {
        Service {
            metadata: Self::object_meta(workspace, headless_service_name(&workspace.name)),
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                selector: Some(WorkspaceLabels::new(&workspace.name).get()),
                ports: Some(vec![torch_port()]),
                publish_not_ready_addresses: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn torch_port() -> ServicePort {
    ServicePort {
        name: Some("torch".to_string()),
        protocol: Some("TCP".to_string()),
        port: TORCH_PORT,
        target_port: Some(IntOrString::Int(TORCH_PORT)),
        ..Default::default()
    }
}

fn owner_references(workspace: &Workspace) -> Option<Vec<OwnerReference>> {
    workspace.uid.as_ref().map(|uid| {
        vec![OwnerReference {
            api_version: WORKSPACE_API_VERSION.to_string(),
            kind: WORKSPACE_KIND.to_string(),
            name: workspace.name.clone(),
            uid: uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]
    })
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}
