//! Closed set of cluster object kinds the engine creates, fetches and evaluates.
//!
use super::error::K8sError;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deployment,
    StatefulSet,
    Service,
    Job,
    ConfigMap,
    Node,
}

impl ResourceKind {
    /// Nodes are the only cluster-scoped kind handled by the engine.
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Node)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Service => "Service",
            ResourceKind::Job => "Job",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Node => "Node",
        };
        f.write_str(kind)
    }
}

/// A typed cluster object. Workloads returned by the preset orchestrator are either
/// [ClusterObject::Deployment] or [ClusterObject::StatefulSet].
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterObject {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    Service(Service),
    Job(Job),
    ConfigMap(ConfigMap),
    Node(Node),
}

impl ClusterObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ClusterObject::Deployment(_) => ResourceKind::Deployment,
            ClusterObject::StatefulSet(_) => ResourceKind::StatefulSet,
            ClusterObject::Service(_) => ResourceKind::Service,
            ClusterObject::Job(_) => ResourceKind::Job,
            ClusterObject::ConfigMap(_) => ResourceKind::ConfigMap,
            ClusterObject::Node(_) => ResourceKind::Node,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ClusterObject::Deployment(obj) => &obj.metadata,
            ClusterObject::StatefulSet(obj) => &obj.metadata,
            ClusterObject::Service(obj) => &obj.metadata,
            ClusterObject::Job(obj) => &obj.metadata,
            ClusterObject::ConfigMap(obj) => &obj.metadata,
            ClusterObject::Node(obj) => &obj.metadata,
        }
    }

    /// Name of the object, empty if it has not been set.
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }
}

macro_rules! cluster_object_conversions {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for ClusterObject {
                fn from(obj: $variant) -> Self {
                    ClusterObject::$variant(obj)
                }
            }

            impl TryFrom<ClusterObject> for $variant {
                type Error = K8sError;

                fn try_from(obj: ClusterObject) -> Result<Self, Self::Error> {
                    match obj {
                        ClusterObject::$variant(inner) => Ok(inner),
                        other => Err(K8sError::UnexpectedKind {
                            expected: ResourceKind::$variant,
                            actual: other.kind(),
                        }),
                    }
                }
            }
        )+
    };
}

cluster_object_conversions!(Deployment, StatefulSet, Service, Job, ConfigMap, Node);
