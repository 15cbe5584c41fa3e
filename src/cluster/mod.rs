//! Cluster client facade.
//!
//! The [`ClusterClient`] trait is the seam between bridge management and the
//! Kubernetes API: enumerate running pods, read and mutate a deployment's
//! replica count, and open raw tunnel streams to a pod port. Production code
//! uses [`KubeClusterClient`]; functional tests substitute a mock so the
//! reconciler and scale loop run without a cluster.

pub mod kube;

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

pub use self::kube::KubeClusterClient;

/// Byte stream carried by one tunnel to one pod port.
///
/// Blanket-implemented for every async duplex stream, so implementations can
/// hand back whatever transport they use (a kube port-forward stream, an
/// in-memory duplex in tests) behind one box.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Identity of one running pod as reported by the cluster.
///
/// The name is unique among currently running pods matching the selector.
/// The UID, when the cluster exposes one, additionally distinguishes a
/// recreated pod that happens to reuse a previous pod's name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodIdentity {
    /// Cluster-assigned pod name.
    pub name: String,
    /// Cluster-assigned UID, if known.
    pub uid: Option<String>,
}

impl PodIdentity {
    /// Identity from a name alone (no UID available).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: None,
        }
    }

    /// Identity from a name and UID.
    pub fn with_uid(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: Some(uid.into()),
        }
    }

    /// Whether `other` refers to the same pod instance.
    ///
    /// Names must match. UIDs must match too when both sides carry one;
    /// a missing UID on either side falls back to name-only comparison.
    pub fn is_same_instance(&self, other: &PodIdentity) -> bool {
        self.name == other.name
            && match (&self.uid, &other.uid) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Facade over the cluster operations bridge management consumes.
///
/// Implementations must be cheap to clone: every live bridge holds a clone
/// for opening per-connection tunnels from its background task.
pub trait ClusterClient: Clone + Send + Sync + 'static {
    /// Enumerate running pods matching the selectors, in API order.
    fn list_running_pods(
        &self,
        namespace: &str,
        label_selector: &str,
        field_selector: &str,
    ) -> impl Future<Output = Result<Vec<PodIdentity>>> + Send;

    /// Read the configured replica count of a deployment.
    fn replica_count(
        &self,
        deployment: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<i32>> + Send;

    /// Set the configured replica count of a deployment.
    ///
    /// Returns once the cluster accepted the request; convergence is the
    /// caller's concern.
    fn set_replica_count(
        &self,
        deployment: &str,
        namespace: &str,
        replicas: i32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Open one tunnel stream to `port` inside the named pod.
    fn open_tunnel(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> impl Future<Output = Result<Box<dyn TunnelStream>>> + Send;
}
