//! podbridge library crate
//!
//! Keeps a pool of local port-forward tunnels ("bridges") synchronized
//! with the running pods of one Kubernetes deployment, and drives
//! scale-up/scale-down with a bounded convergence wait.
//!
//! ## Architecture
//!
//! - [`cluster`]: the [`ClusterClient`] facade over the Kubernetes API,
//!   with a kube-rs implementation
//! - [`bridge`]: one bridge's lifecycle (bind, probe, proxy, destroy) and
//!   the port allocator
//! - [`manager`]: the reconciler owning the pod→bridge mapping, plus the
//!   scale controller
//! - [`config`]: one struct of knobs with deployment-matching defaults
//!
//! ## Example
//!
//! ```rust,ignore
//! use podbridge::{BridgeConfig, KubeClusterClient, PodBridgeManager};
//!
//! let client = KubeClusterClient::connect().await?;
//! let mut manager = PodBridgeManager::connect(client, BridgeConfig::default()).await?;
//! manager.scale(3).await?;
//! for (pod, port) in manager.ports_by_pod() {
//!     println!("{pod} reachable on 127.0.0.1:{port}");
//! }
//! // Dropping the manager tears every bridge down.
//! ```

pub mod bridge;
pub mod cluster;
pub mod config;
pub mod error;
pub mod manager;

pub use bridge::{Bridge, BridgePorts, PortAllocator};
pub use cluster::{ClusterClient, KubeClusterClient, PodIdentity, TunnelStream};
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use manager::PodBridgeManager;
