//! Controller configuration.
//!
//! The controller never loads configuration itself — that stays a
//! collaborator's job (spec.md §1 Non-goals) — but it is constructed from an
//! already-parsed [`ControllerConfig`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The fixed timer durations from spec.md §5.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    #[serde(with = "humantime_serde")]
    pub leader_discovery_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub leader_reconnection_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub leader_subscription_retry_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub leader_subscription_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            leader_discovery_timeout: Duration::from_millis(3000),
            leader_reconnection_delay: Duration::from_millis(500),
            leader_subscription_retry_delay: Duration::from_millis(500),
            leader_subscription_timeout: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_millis(5000),
        }
    }
}

/// Everything the controller needs at construction time besides the node's
/// own identity (see [`crate::node_info::NodeInfo`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub timers: TimerConfig,
    /// Total number of nodes in the cluster, including this one.
    pub cluster_size: usize,
    /// Mirrors `NodeInfo.isReadOnlyReplica` but lives in config because it's
    /// an operator-set deployment choice rather than node identity.
    pub read_only: bool,
    /// Number of subsystem plugins the lifecycle orchestrator waits on
    /// after `AuthenticationProviderInitialized` before publishing
    /// `SystemReady` (spec.md §4.4 step 7). Zero is a legitimate
    /// deployment with no optional plugins, not a placeholder.
    pub subsystem_count: i64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            timers: TimerConfig::default(),
            cluster_size: 1,
            read_only: false,
            subsystem_count: 0,
        }
    }
}

impl ControllerConfig {
    /// Expected count of `ServiceShutdown` acknowledgements (spec.md §4.4:
    /// "6 for clustered ... 5 for single-node").
    pub fn expected_service_shutdowns(&self) -> i64 {
        if self.cluster_size > 1 { 6 } else { 5 }
    }

    /// Parses a config from an already-loaded TOML string. Reading the file
    /// itself is left to the host process.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timers_match_spec() {
        let t = TimerConfig::default();
        assert_eq!(t.leader_discovery_timeout, Duration::from_millis(3000));
        assert_eq!(t.shutdown_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn shutdown_count_depends_on_cluster_size() {
        let mut c = ControllerConfig {
            cluster_size: 3,
            ..Default::default()
        };
        assert_eq!(c.expected_service_shutdowns(), 6);
        c.cluster_size = 1;
        assert_eq!(c.expected_service_shutdowns(), 5);
    }

    #[test]
    fn parses_from_toml() {
        let parsed = ControllerConfig::from_toml_str(
            "cluster_size = 3\nread_only = false\n[timers]\nshutdown_timeout = \"9s\"\n",
        )
        .unwrap();
        assert_eq!(parsed.cluster_size, 3);
        assert_eq!(parsed.timers.shutdown_timeout, Duration::from_millis(9000));
    }
}
