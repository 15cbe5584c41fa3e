//! Bridge lifecycle.
//!
//! A [`Bridge`] is one live local-to-remote forwarding path: a local TCP
//! listener (two in debug mode) whose accepted connections are proxied
//! through fresh tunnels into a specific pod. Establishing binds the local
//! ports and probes the pod; while live, the bridge is a fire-and-forget
//! background task. When a `Bridge` is dropped it stops forwarding (RAII).

pub mod ports;

use std::fmt;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::cluster::{ClusterClient, PodIdentity};
use crate::error::{Error, Result};

pub use ports::PortAllocator;

/// Local/remote port pairs one bridge forwards.
#[derive(Clone, Copy, Debug)]
pub struct BridgePorts {
    local_port: u16,
    remote_port: u16,
    local_debug_port: Option<u16>,
    remote_debug_port: Option<u16>,
}

impl BridgePorts {
    /// Forward `local_port` to `remote_port` inside the pod.
    pub fn new(local_port: u16, remote_port: u16) -> Self {
        Self {
            local_port,
            remote_port,
            local_debug_port: None,
            remote_debug_port: None,
        }
    }

    /// Additionally forward a debug channel.
    pub fn with_debug(mut self, local_debug_port: u16, remote_debug_port: u16) -> Self {
        self.local_debug_port = Some(local_debug_port);
        self.remote_debug_port = Some(remote_debug_port);
        self
    }
}

/// One live forwarding tunnel to one pod.
///
/// Created only by [`Bridge::establish`]; destroyed by [`Bridge::destroy`]
/// or drop. The owning manager guarantees at most one bridge per pod and
/// pairwise-distinct local ports.
pub struct Bridge {
    pod: PodIdentity,
    local_port: u16,
    remote_port: u16,
    local_debug_port: Option<u16>,
    remote_debug_port: Option<u16>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    _task: JoinHandle<()>,
}

impl Bridge {
    /// Open a forwarding tunnel from the given local port(s) to the
    /// matching port(s) inside the named pod.
    ///
    /// Fails with [`Error::Connection`] if a local port cannot be bound or
    /// the pod is unreachable.
    pub async fn establish<C: ClusterClient>(
        client: &C,
        namespace: &str,
        pod: PodIdentity,
        ports: BridgePorts,
    ) -> Result<Self> {
        let mut bound = vec![BoundPort {
            listener: bind_local(&pod.name, ports.local_port).await?,
            remote_port: ports.remote_port,
        }];
        if let (Some(local_debug), Some(remote_debug)) =
            (ports.local_debug_port, ports.remote_debug_port)
        {
            bound.push(BoundPort {
                listener: bind_local(&pod.name, local_debug).await?,
                remote_port: remote_debug,
            });
        }

        // Reachability probe: open one tunnel and drop it, so an
        // unreachable pod fails establishment instead of the first
        // client connection.
        client
            .open_tunnel(namespace, &pod.name, ports.remote_port)
            .await
            .map_err(|e| match e {
                Error::Connection { .. } => e,
                other => Error::Connection {
                    pod: pod.name.clone(),
                    source: std::io::Error::other(other),
                },
            })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_bridge(
            client.clone(),
            namespace.to_string(),
            pod.name.clone(),
            bound,
            shutdown_rx,
        ));

        debug!(
            pod = %pod.name,
            local_port = ports.local_port,
            remote_port = ports.remote_port,
            "Bridge established"
        );

        Ok(Self {
            pod,
            local_port: ports.local_port,
            remote_port: ports.remote_port,
            local_debug_port: ports.local_debug_port,
            remote_debug_port: ports.remote_debug_port,
            shutdown_tx: Some(shutdown_tx),
            _task: task,
        })
    }

    /// Identity of the pod this bridge forwards to.
    pub fn pod(&self) -> &PodIdentity {
        &self.pod
    }

    /// Name of the pod this bridge forwards to.
    pub fn pod_name(&self) -> &str {
        &self.pod.name
    }

    /// Local service port.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Local debug port, when the bridge carries a debug channel.
    pub fn local_debug_port(&self) -> Option<u16> {
        self.local_debug_port
    }

    /// Stop forwarding and release OS resources (not the port numbers).
    ///
    /// Idempotent; the accept loop may already be gone, in which case
    /// there is nothing to do.
    pub fn destroy(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            debug!(pod = %self.pod.name, local_port = self.local_port, "Destroying bridge");
            let _ = tx.send(());
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Display for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.pod.name, self.local_port, self.remote_port)?;
        if let (Some(local), Some(remote)) = (self.local_debug_port, self.remote_debug_port) {
            write!(f, " (debug {local} -> {remote})")?;
        }
        Ok(())
    }
}

/// One bound listener and the pod-side port it forwards to.
struct BoundPort {
    listener: TcpListener,
    remote_port: u16,
}

async fn bind_local(pod: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| Error::Connection {
            pod: pod.to_string(),
            source: e,
        })
}

/// Accept loop: runs until shutdown, spawning one proxy task per accepted
/// connection.
async fn run_bridge<C: ClusterClient>(
    client: C,
    namespace: String,
    pod: String,
    bound: Vec<BoundPort>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let accept_any = futures::future::select_all(bound.iter().map(|b| {
            Box::pin(async move { (b.listener.accept().await, b.remote_port) })
        }));

        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!(pod = %pod, "Bridge shutdown requested");
                break;
            }
            ((result, remote_port), _, _) = accept_any => {
                match result {
                    Ok((stream, addr)) => {
                        trace!(pod = %pod, client_addr = %addr, remote_port, "New bridge connection");
                        let client = client.clone();
                        let namespace = namespace.clone();
                        let pod = pod.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                proxy_connection(&client, &namespace, &pod, remote_port, stream).await
                            {
                                warn!(pod = %pod, remote_port, error = %e, "Bridge connection error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(pod = %pod, error = %e, "Bridge accept error");
                    }
                }
            }
        }
    }
}

/// Proxy one accepted connection through a fresh tunnel.
async fn proxy_connection<C: ClusterClient>(
    client: &C,
    namespace: &str,
    pod: &str,
    remote_port: u16,
    mut local: TcpStream,
) -> Result<()> {
    let mut tunnel = client.open_tunnel(namespace, pod, remote_port).await?;

    // Copy until either side closes; half-close propagation is handled by
    // copy_bidirectional. Errors here are per-connection, not bridge-fatal.
    if let Err(e) = tokio::io::copy_bidirectional(&mut local, &mut tunnel).await {
        debug!(pod = %pod, remote_port, error = %e, "Bridge connection closed with error");
    }
    Ok(())
}
