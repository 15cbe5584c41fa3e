//! Pod bridge manager: reconciliation and scale control.
//!
//! [`PodBridgeManager`] owns the pod→bridge mapping. One synchronization
//! pass diffs the live running-pod set against the current bridges and
//! applies the difference: new pods get bridges on freshly allocated
//! ports, vanished pods get their bridges destroyed, unchanged pods are
//! left untouched. [`PodBridgeManager::scale`] drives the deployment's
//! replica count and blocks until the cluster converges or the deadline
//! expires.
//!
//! All mutating calls take `&mut self`: the borrow checker enforces the
//! single-logical-owner contract, so there is no internal locking.

use std::collections::HashSet;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::bridge::{Bridge, BridgePorts, PortAllocator};
use crate::cluster::{ClusterClient, PodIdentity};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};

/// Keeps a pool of local bridges synchronized with the running pods of one
/// deployment.
///
/// Dropping the manager destroys every bridge it still owns, so tunnels
/// never outlive the scope that created the manager.
pub struct PodBridgeManager<C: ClusterClient> {
    client: C,
    config: BridgeConfig,
    ports: PortAllocator,
    // Insertion order is the enumeration order exposed to callers.
    bridges: Vec<Bridge>,
}

impl<C: ClusterClient> PodBridgeManager<C> {
    /// Create a manager and run the initial synchronization pass.
    pub async fn connect(client: C, config: BridgeConfig) -> Result<Self> {
        let ports = PortAllocator::new(config.base_port, config.base_debug_port);
        let mut manager = Self {
            client,
            config,
            ports,
            bridges: Vec::new(),
        };
        manager.synchronize().await?;
        Ok(manager)
    }

    /// Number of live bridges.
    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    /// Pod name → local service port, in insertion order.
    pub fn ports_by_pod(&self) -> Vec<(String, u16)> {
        self.bridges
            .iter()
            .map(|b| (b.pod_name().to_string(), b.local_port()))
            .collect()
    }

    /// Local service ports, in insertion order.
    pub fn ports(&self) -> Vec<u16> {
        self.bridges.iter().map(Bridge::local_port).collect()
    }

    /// Pod name → local debug port for bridges carrying a debug channel,
    /// in insertion order.
    pub fn debug_ports_by_pod(&self) -> Vec<(String, u16)> {
        self.bridges
            .iter()
            .filter_map(|b| Some((b.pod_name().to_string(), b.local_debug_port()?)))
            .collect()
    }

    /// Run one reconciliation pass against the live cluster.
    ///
    /// Idempotent: an unchanged cluster yields zero creations and zero
    /// destructions. Enumeration failure aborts the pass with state
    /// unchanged; a per-pod establishment failure aborts with the bridges
    /// created so far kept, surfaced to the caller rather than retried.
    pub async fn synchronize(&mut self) -> Result<()> {
        debug!("Synchronizing pod bridges");
        let pods = self
            .client
            .list_running_pods(
                &self.config.namespace,
                &self.config.app_label_selector,
                &self.config.running_phase_selector,
            )
            .await?;

        for pod in &pods {
            match self.bridges.iter().position(|b| b.pod_name() == pod.name) {
                Some(index) => {
                    if self
                        .bridges
                        .get(index)
                        .is_some_and(|b| b.pod().is_same_instance(pod))
                    {
                        continue;
                    }
                    // Same name, different UID: the pod was recreated while
                    // we were not looking. Replace the stale bridge.
                    info!(pod = %pod.name, "Pod recreated under the same name, replacing bridge");
                    let mut stale = self.bridges.remove(index);
                    stale.destroy();
                    self.establish_bridge(pod.clone()).await?;
                }
                None => self.establish_bridge(pod.clone()).await?,
            }
        }

        let live: HashSet<&str> = pods.iter().map(|p| p.name.as_str()).collect();
        self.bridges.retain_mut(|bridge| {
            if live.contains(bridge.pod_name()) {
                true
            } else {
                info!(pod = %bridge.pod_name(), local_port = bridge.local_port(), "Pod gone, destroying bridge");
                bridge.destroy();
                false
            }
        });

        debug!(bridges = self.bridges.len(), "Pod bridges synchronized");
        Ok(())
    }

    /// Set the deployment's replica count and block until the cluster runs
    /// exactly that many pods, then synchronize bridges to the new pod set.
    ///
    /// `desired = 0` is legal and drains all bridges. On deadline expiry
    /// fails with [`Error::ScaleTimeout`]; the cluster-side request is not
    /// rolled back, and existing bridges are left as they were.
    pub async fn scale(&mut self, desired: i32) -> Result<()> {
        let current = self
            .client
            .replica_count(&self.config.deployment, &self.config.namespace)
            .await?;
        info!(
            deployment = %self.config.deployment,
            current,
            desired,
            "Scaling deployment"
        );

        self.client
            .set_replica_count(&self.config.deployment, &self.config.namespace, desired)
            .await?;

        self.await_converged(desired).await?;
        info!(desired, "Deployment successfully scaled");

        self.synchronize().await
    }

    /// Poll fresh enumerations until the running-pod count matches.
    ///
    /// The deadline is computed up front and re-checked on every iteration
    /// boundary. Enumeration errors are "not yet converged", never fatal;
    /// only the deadline is.
    async fn await_converged(&self, desired: i32) -> Result<()> {
        let desired_count = usize::try_from(desired).unwrap_or_default();
        let deadline = Instant::now() + self.config.scale_timeout();

        loop {
            match self
                .client
                .list_running_pods(
                    &self.config.namespace,
                    &self.config.app_label_selector,
                    &self.config.running_phase_selector,
                )
                .await
            {
                Ok(pods) if pods.len() == desired_count => return Ok(()),
                Ok(pods) => {
                    debug!(running = pods.len(), desired, "Deployment not yet converged")
                }
                Err(e) => {
                    debug!(error = %e, "Enumeration failed while awaiting convergence, treating as not converged")
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::ScaleTimeout {
                    desired,
                    timeout_ms: self.config.scale_timeout_ms,
                });
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Tear down every bridge and clear state. Idempotent.
    ///
    /// This is the best-effort shutdown sweep: individual teardown problems
    /// are logged by the bridges themselves and never propagated, so the
    /// sweep always completes.
    pub fn destroy_all(&mut self) {
        if self.bridges.is_empty() {
            return;
        }
        info!(bridges = self.bridges.len(), "Destroying all pod bridges");
        for bridge in &mut self.bridges {
            bridge.destroy();
        }
        self.bridges.clear();
    }

    async fn establish_bridge(&mut self, pod: PodIdentity) -> Result<()> {
        let mut ports = BridgePorts::new(
            self.ports.next_service_port(),
            self.config.inner_service_port,
        );
        if self.config.debug_mode {
            ports = ports.with_debug(self.ports.next_debug_port(), self.config.inner_debug_port);
        }

        let bridge = Bridge::establish(&self.client, &self.config.namespace, pod, ports).await?;
        info!(bridge = %bridge, "Forwarding");
        self.bridges.push(bridge);
        Ok(())
    }
}

impl<C: ClusterClient> Drop for PodBridgeManager<C> {
    fn drop(&mut self) {
        self.destroy_all();
    }
}
