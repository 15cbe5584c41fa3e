//! Bridge manager configuration.
//!
//! All knobs for one manager instance: which pods to bridge, where local
//! port sequences start, which container-side ports to reach, and how the
//! scale-convergence wait is bounded. Every field has a default matching
//! the reference deployment, so `BridgeConfig::default()` works against a
//! stock cluster and tests override only what they exercise.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_namespace() -> String {
    "default".to_string()
}

fn default_deployment() -> String {
    "sample-app".to_string()
}

fn default_app_label_selector() -> String {
    "app=sample-app".to_string()
}

fn default_running_phase_selector() -> String {
    "status.phase=Running".to_string()
}

fn default_base_port() -> u16 {
    49001
}

fn default_base_debug_port() -> u16 {
    50001
}

fn default_inner_service_port() -> u16 {
    9875
}

fn default_inner_debug_port() -> u16 {
    5006
}

fn default_scale_timeout_ms() -> u64 {
    120_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

/// Configuration for a [`PodBridgeManager`](crate::manager::PodBridgeManager).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Namespace the target deployment and its pods live in.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the deployment whose replica count `scale` mutates.
    #[serde(default = "default_deployment")]
    pub deployment: String,

    /// Label selector matching the deployment's pods.
    #[serde(default = "default_app_label_selector")]
    pub app_label_selector: String,

    /// Field selector restricting enumeration to running pods.
    #[serde(default = "default_running_phase_selector")]
    pub running_phase_selector: String,

    /// First local port of the service sequence.
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// First local port of the debug sequence (consumed only in debug mode).
    #[serde(default = "default_base_debug_port")]
    pub base_debug_port: u16,

    /// Container-side service port each bridge forwards to.
    #[serde(default = "default_inner_service_port")]
    pub inner_service_port: u16,

    /// Container-side debug port each bridge forwards to in debug mode.
    #[serde(default = "default_inner_debug_port")]
    pub inner_debug_port: u16,

    /// When true, every bridge also carries a debug channel.
    #[serde(default)]
    pub debug_mode: bool,

    /// Deadline for one `scale` call to observe convergence.
    #[serde(default = "default_scale_timeout_ms")]
    pub scale_timeout_ms: u64,

    /// Pause between convergence polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            deployment: default_deployment(),
            app_label_selector: default_app_label_selector(),
            running_phase_selector: default_running_phase_selector(),
            base_port: default_base_port(),
            base_debug_port: default_base_debug_port(),
            inner_service_port: default_inner_service_port(),
            inner_debug_port: default_inner_debug_port(),
            debug_mode: false,
            scale_timeout_ms: default_scale_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BridgeConfig {
    /// Build a configuration from `PODBRIDGE_*` environment variables,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            namespace: env_or("PODBRIDGE_NAMESPACE", defaults.namespace),
            deployment: env_or("PODBRIDGE_DEPLOYMENT", defaults.deployment),
            app_label_selector: env_or("PODBRIDGE_APP_LABEL_SELECTOR", defaults.app_label_selector),
            running_phase_selector: env_or(
                "PODBRIDGE_RUNNING_PHASE_SELECTOR",
                defaults.running_phase_selector,
            ),
            base_port: env_or("PODBRIDGE_BASE_PORT", defaults.base_port),
            base_debug_port: env_or("PODBRIDGE_BASE_DEBUG_PORT", defaults.base_debug_port),
            inner_service_port: env_or("PODBRIDGE_INNER_SERVICE_PORT", defaults.inner_service_port),
            inner_debug_port: env_or("PODBRIDGE_INNER_DEBUG_PORT", defaults.inner_debug_port),
            debug_mode: env_or("PODBRIDGE_DEBUG_MODE", defaults.debug_mode),
            scale_timeout_ms: env_or("PODBRIDGE_SCALE_TIMEOUT_MS", defaults.scale_timeout_ms),
            poll_interval_ms: env_or("PODBRIDGE_POLL_INTERVAL_MS", defaults.poll_interval_ms),
        }
    }

    /// Deadline for one `scale` call as a [`Duration`].
    pub fn scale_timeout(&self) -> Duration {
        Duration::from_millis(self.scale_timeout_ms)
    }

    /// Pause between convergence polls as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Read an environment variable, parse it, and fall back on any failure.
fn env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                warn!(key, raw = %raw, error = %e, "Ignoring unparsable environment override");
                default
            }
        },
        Err(_) => default,
    }
}
