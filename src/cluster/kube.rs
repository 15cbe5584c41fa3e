//! Kubernetes-backed cluster client.
//!
//! Implements [`ClusterClient`] on top of kube-rs: pod enumeration via the
//! list API, replica counts via the deployment scale subresource, and
//! tunnels via native websocket port-forwarding (no kubectl subprocess).

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use tracing::debug;

use super::{ClusterClient, PodIdentity, TunnelStream};
use crate::error::{Error, Result};

/// [`ClusterClient`] backed by a kube [`Client`].
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an already-connected kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the default kubeconfig / in-cluster environment.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ClusterClient for KubeClusterClient {
    async fn list_running_pods(
        &self,
        namespace: &str,
        label_selector: &str,
        field_selector: &str,
    ) -> Result<Vec<PodIdentity>> {
        let params = ListParams::default()
            .labels(label_selector)
            .fields(field_selector);

        let list = self.pods(namespace).list(&params).await?;

        // Pods without a name cannot be bridged; the API should never
        // return one, but skip rather than fail the whole enumeration.
        Ok(list
            .items
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name?;
                Some(PodIdentity {
                    name,
                    uid: pod.metadata.uid,
                })
            })
            .collect())
    }

    async fn replica_count(&self, deployment: &str, namespace: &str) -> Result<i32> {
        let scale = self.deployments(namespace).get_scale(deployment).await?;
        Ok(scale.spec.and_then(|s| s.replicas).unwrap_or(0))
    }

    async fn set_replica_count(
        &self,
        deployment: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<()> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        self.deployments(namespace)
            .patch_scale(deployment, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn open_tunnel(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<Box<dyn TunnelStream>> {
        let mut forwarder = self.pods(namespace).portforward(pod, &[port]).await?;

        let stream = forwarder.take_stream(port).ok_or_else(|| Error::Connection {
            pod: pod.to_string(),
            source: std::io::Error::other(format!("no forwarded stream for port {port}")),
        })?;

        // The forwarder must be driven to completion to pump frames; it
        // finishes once the stream closes.
        let pod = pod.to_string();
        tokio::spawn(async move {
            if let Err(e) = forwarder.join().await {
                debug!(pod = %pod, error = %e, "Port-forward connection closed with error");
            }
        });

        Ok(Box::new(stream))
    }
}
