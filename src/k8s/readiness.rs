//! Polls a submitted workload until its kind-specific readiness condition holds.
//!
use super::client::ResourceClient;
use super::error::K8sError;
use super::object::{ClusterObject, ResourceKind};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum ReadinessError {
    #[error("failed to fetch {kind} `{namespace}/{name}`: {source}")]
    Fetch {
        kind: ResourceKind,
        namespace: String,
        name: String,
        #[source]
        source: K8sError,
    },

    #[error("context deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("readiness check cancelled")]
    Cancelled,

    #[error("unsupported resource type: {0}")]
    UnsupportedResourceType(ResourceKind),
}

impl ReadinessError {
    /// True when the workload did not converge before the deadline, as opposed to failing.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ReadinessError::DeadlineExceeded(_))
    }
}

/// Status fields a readiness decision depends on, per workload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Deployments and StatefulSets.
    Replicated { desired: i32, ready: i32 },
    /// Jobs.
    Batch {
        failed: i32,
        succeeded: i32,
        active: i32,
    },
}

impl ReadinessState {
    /// A replicated workload is ready when every desired replica is ready. A batch workload is
    /// ready as long as no pod has failed; successful completion is not required.
    pub fn is_ready(&self) -> bool {
        match self {
            ReadinessState::Replicated { desired, ready } => desired == ready,
            ReadinessState::Batch { failed, .. } => *failed == 0,
        }
    }
}

impl TryFrom<&ClusterObject> for ReadinessState {
    type Error = ReadinessError;

    fn try_from(object: &ClusterObject) -> Result<Self, Self::Error> {
        match object {
            // Desired replicas come from the fetched spec so external scaling is honoured.
            // An unset spec.replicas defaults to 1 in the api-server.
            ClusterObject::Deployment(deployment) => Ok(ReadinessState::Replicated {
                desired: deployment
                    .spec
                    .as_ref()
                    .and_then(|s| s.replicas)
                    .unwrap_or(1),
                ready: deployment
                    .status
                    .as_ref()
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or_default(),
            }),
            ClusterObject::StatefulSet(sts) => Ok(ReadinessState::Replicated {
                desired: sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
                ready: sts
                    .status
                    .as_ref()
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or_default(),
            }),
            ClusterObject::Job(job) => {
                let status = job.status.clone().unwrap_or_default();
                Ok(ReadinessState::Batch {
                    failed: status.failed.unwrap_or_default(),
                    succeeded: status.succeeded.unwrap_or_default(),
                    active: status.active.unwrap_or_default(),
                })
            }
            other => Err(ReadinessError::UnsupportedResourceType(other.kind())),
        }
    }
}

fn has_readiness_predicate(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::Deployment | ResourceKind::StatefulSet | ResourceKind::Job
    )
}

/// Re-fetches a workload on a fixed interval until it is ready, the deadline expires, a fetch
/// fails or the caller cancels. The poller never modifies the object.
pub struct ReadinessPoller<C: ?Sized> {
    client: Arc<C>,
    interval: Duration,
}

impl<C> ReadinessPoller<C>
where
    C: ResourceClient + ?Sized,
{
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub async fn wait_until_ready(
        &self,
        object: &ClusterObject,
        timeout: Duration,
    ) -> Result<(), ReadinessError> {
        self.wait_until_ready_or_cancelled(object, timeout, &CancellationToken::new())
            .await
    }

    /// Same as [ReadinessPoller::wait_until_ready], also returning [ReadinessError::Cancelled]
    /// as soon as `cancel` fires. Both timers are dropped on every exit path.
    pub async fn wait_until_ready_or_cancelled(
        &self,
        object: &ClusterObject,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ReadinessError> {
        let kind = object.kind();
        if !has_readiness_predicate(kind) {
            return Err(ReadinessError::UnsupportedResourceType(kind));
        }
        let name = object.name();
        let namespace = object.namespace().unwrap_or_default();

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            race(cancel, &mut deadline, timeout, ticker.tick()).await?;

            let fetched = race(
                cancel,
                &mut deadline,
                timeout,
                self.client.get(name, namespace, kind),
            )
            .await?
            .map_err(|source| ReadinessError::Fetch {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?;

            let state = ReadinessState::try_from(&fetched)?;
            debug!(%kind, namespace, name, ?state, "checking resource status");

            if state.is_ready() {
                info!(%kind, namespace, name, "resource status is ready");
                return Ok(());
            }
        }
    }
}

/// Awaits `fut` unless cancellation or the deadline comes first. Cancellation wins ties, then
/// the deadline.
async fn race<F, T>(
    cancel: &CancellationToken,
    deadline: &mut std::pin::Pin<&mut tokio::time::Sleep>,
    timeout: Duration,
    fut: F,
) -> Result<T, ReadinessError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReadinessError::Cancelled),
        _ = deadline.as_mut() => Err(ReadinessError::DeadlineExceeded(timeout)),
        out = fut => Ok(out),
    }
}
