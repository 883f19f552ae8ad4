//! Bridge configuration. Hosts deserialize it from their own config file (see fly-host).

use std::time::Duration;

use serde::Deserialize;

use crate::lock::LockScope;
use crate::naming::NamingPolicy;

/// Tunables for one bridge instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Upper bound on the wait for the native ready callback (default 30000 ms).
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Optional bound on every query/command wait. Unbounded when absent.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
    /// What the exclusive-ownership lock guards (default `process`).
    #[serde(default)]
    pub lock_scope: LockScope,
    /// Key naming on the wire (default `snake_case`).
    #[serde(default)]
    pub naming: NamingPolicy,
}

fn default_ready_timeout_ms() -> u64 {
    30_000
}

fn saturating_millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: default_ready_timeout_ms(),
            call_timeout_ms: None,
            lock_scope: LockScope::default(),
            naming: NamingPolicy::default(),
        }
    }
}

impl BridgeConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_ready_timeout(mut self, limit: Duration) -> Self {
        self.ready_timeout_ms = saturating_millis(limit);
        self
    }

    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout_ms = Some(saturating_millis(limit));
        self
    }

    pub fn with_lock_scope(mut self, scope: LockScope) -> Self {
        self.lock_scope = scope;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_durations_saturate() {
        let cfg = BridgeConfig::default()
            .with_ready_timeout(Duration::MAX)
            .with_call_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(cfg.ready_timeout_ms, u64::MAX);
        assert_eq!(cfg.call_timeout_ms, Some(u64::MAX));
        let cfg = cfg.with_call_timeout(Duration::from_millis(1500));
        assert_eq!(cfg.call_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn defaults() {
        let c = BridgeConfig::default();
        assert_eq!(c.ready_timeout(), Duration::from_secs(30));
        assert_eq!(c.call_timeout(), None);
        assert_eq!(c.lock_scope, LockScope::Process);
        assert_eq!(c.naming, NamingPolicy::SnakeCase);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: BridgeConfig =
            serde_json::from_str(r#"{"call_timeout_ms": 500, "lock_scope": "directory"}"#)
                .unwrap();
        assert_eq!(c.ready_timeout_ms, 30_000);
        assert_eq!(c.call_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(c.lock_scope, LockScope::Directory);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(serde_json::from_str::<BridgeConfig>(r#"{"ready_timeout": 1}"#).is_err());
    }
}
