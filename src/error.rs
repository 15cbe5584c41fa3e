//! Error types for bridge management.
//!
//! One enum covers the three failure classes callers can hit: the cluster
//! being unreachable, a single pod refusing a tunnel, and a scale operation
//! missing its deadline.

use thiserror::Error;

/// Error type for bridge manager operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or auth failure talking to the cluster. Fatal to the
    /// current call; manager state is left unchanged.
    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(#[from] kube::Error),

    /// Tunnel establishment failed for one pod. Fatal to that creation
    /// only; a partial synchronization pass may leave some pods bridged
    /// and others not.
    #[error("cannot bridge pod {pod}: {source}")]
    Connection {
        /// Name of the pod the bridge was being established to
        pod: String,
        #[source]
        source: std::io::Error,
    },

    /// The deployment did not reach the desired running-pod count within
    /// the configured deadline. The cluster-side scale request is left in
    /// place.
    #[error("scale wait timed out: deployment did not reach {desired} running pods within {timeout_ms} ms")]
    ScaleTimeout {
        /// Replica count that was requested
        desired: i32,
        /// Deadline that expired, in milliseconds
        timeout_ms: u64,
    },
}

impl Error {
    /// Check if this error means the cluster could not be reached
    pub fn is_cluster_unavailable(&self) -> bool {
        matches!(self, Error::ClusterUnavailable(_))
    }

    /// Check if this error is a scale-convergence timeout
    pub fn is_scale_timeout(&self) -> bool {
        matches!(self, Error::ScaleTimeout { .. })
    }

    /// Check if this error is a per-pod tunnel failure
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }
}

/// Result type alias for bridge manager operations
pub type Result<T> = std::result::Result<T, Error>;
