use super::error::K8sError;
use super::object::{ClusterObject, ResourceKind};
use super::retry::{retry_on_error, RetryPolicy};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::PostParams;
use kube::config::KubeConfigOptions;
use kube::{Api, Client, Config, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

/// Create and get operations against the cluster api. Implementations retry failed calls
/// according to their [RetryPolicy] and return the last error once it is exhausted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject, K8sError>;

    async fn get(
        &self,
        name: &str,
        namespace: &str,
        kind: ResourceKind,
    ) -> Result<ClusterObject, K8sError>;
}

/// [ResourceClient] backed by a [kube::Client].
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    retry_policy: RetryPolicy,
}

impl KubeResourceClient {
    /// Constructs a new Kubernetes client.
    ///
    /// If loading from the inCluster config fail we fall back to kube-config
    /// This will respect the `$KUBECONFIG` envvar, but otherwise default to `~/.kube/config`.
    pub async fn try_default(retry_policy: RetryPolicy) -> Result<Self, K8sError> {
        debug!("trying inClusterConfig for k8s client");

        let config = match Config::incluster() {
            Ok(c) => c,
            Err(e) => {
                debug!("inClusterConfig {}, trying kubeconfig for k8s client", e);
                let c = KubeConfigOptions::default();
                Config::from_kubeconfig(&c).await?
            }
        };

        let client = Client::try_from(config)?;
        debug!("k8s client initialization succeeded");

        Ok(Self::new(client, retry_policy))
    }

    pub fn new(client: Client, retry_policy: RetryPolicy) -> Self {
        Self {
            client,
            retry_policy,
        }
    }

    async fn create_namespaced<K>(&self, kind: ResourceKind, object: &K) -> Result<K, K8sError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let namespace = object.namespace().ok_or_else(|| K8sError::MissingNamespace {
            kind,
            name: object.name_any(),
        })?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        let params = PostParams::default();

        retry_on_error(&self.retry_policy, || async {
            api.create(&params, object).await.map_err(K8sError::from)
        })
        .await
    }

    async fn get_namespaced<K>(&self, name: &str, namespace: &str) -> Result<K, K8sError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);

        retry_on_error(&self.retry_policy, || async {
            api.get(name).await.map_err(K8sError::from)
        })
        .await
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject, K8sError> {
        info!(
            kind = %object.kind(),
            namespace = object.namespace().unwrap_or_default(),
            name = object.name(),
            "creating k8s resource"
        );

        let kind = object.kind();
        let created: ClusterObject = match object {
            ClusterObject::Deployment(obj) => self.create_namespaced(kind, obj).await?.into(),
            ClusterObject::StatefulSet(obj) => self.create_namespaced(kind, obj).await?.into(),
            ClusterObject::Service(obj) => self.create_namespaced(kind, obj).await?.into(),
            ClusterObject::Job(obj) => self.create_namespaced(kind, obj).await?.into(),
            ClusterObject::ConfigMap(obj) => self.create_namespaced(kind, obj).await?.into(),
            ClusterObject::Node(obj) => {
                let api: Api<Node> = Api::all(self.client.clone());
                let params = PostParams::default();
                retry_on_error(&self.retry_policy, || async {
                    api.create(&params, obj).await.map_err(K8sError::from)
                })
                .await?
                .into()
            }
        };
        Ok(created)
    }

    async fn get(
        &self,
        name: &str,
        namespace: &str,
        kind: ResourceKind,
    ) -> Result<ClusterObject, K8sError> {
        if kind.is_namespaced() && namespace.is_empty() {
            return Err(K8sError::MissingNamespace {
                kind,
                name: name.to_string(),
            });
        }

        let object: ClusterObject = match kind {
            ResourceKind::Deployment => self
                .get_namespaced::<Deployment>(name, namespace)
                .await?
                .into(),
            ResourceKind::StatefulSet => self
                .get_namespaced::<StatefulSet>(name, namespace)
                .await?
                .into(),
            ResourceKind::Service => self.get_namespaced::<Service>(name, namespace).await?.into(),
            ResourceKind::Job => self.get_namespaced::<Job>(name, namespace).await?.into(),
            ResourceKind::ConfigMap => self
                .get_namespaced::<ConfigMap>(name, namespace)
                .await?
                .into(),
            ResourceKind::Node => {
                let api: Api<Node> = Api::all(self.client.clone());
                retry_on_error(&self.retry_policy, || async {
                    api.get(name).await.map_err(K8sError::from)
                })
                .await?
                .into()
            }
        };
        Ok(object)
    }
}
