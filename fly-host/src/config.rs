//! Load host config from file and environment.

use fly_bridge::BridgeConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Host configuration. File: ~/.config/flydrop/host.toml or /etc/flydrop/host.toml.
/// Env overrides: FLYDROP_WORKING_DIR, FLYDROP_READY_TIMEOUT_MS, FLYDROP_CALL_TIMEOUT_MS,
/// FLYDROP_LOG.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory handed to the native core (default ~/.local/share/flydrop).
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// tracing filter directive when RUST_LOG is unset (default "info").
    #[serde(default = "default_log")]
    pub log: String,
    /// Name the loopback node reports for itself.
    #[serde(default = "default_node_name")]
    pub node_name: String,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

fn default_working_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(h) => PathBuf::from(h).join(".local/share/flydrop"),
        None => PathBuf::from("flydrop-data"),
    }
}
fn default_log() -> String {
    "info".to_owned()
}
fn default_node_name() -> String {
    "flydrop-host".to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            log: default_log(),
            node_name: default_node_name(),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("FLYDROP_WORKING_DIR") {
        c.working_dir = PathBuf::from(s);
    }
    if let Some(ms) = var("FLYDROP_READY_TIMEOUT_MS").and_then(|s| s.parse::<u64>().ok()) {
        c.bridge.ready_timeout_ms = ms;
    }
    if let Some(ms) = var("FLYDROP_CALL_TIMEOUT_MS").and_then(|s| s.parse::<u64>().ok()) {
        c.bridge.call_timeout_ms = Some(ms);
    }
    if let Some(s) = var("FLYDROP_LOG") {
        c.log = s;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/flydrop/host.toml"));
    }
    out.push(PathBuf::from("/etc/flydrop/host.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    let text = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("flydrop: cannot read {}: {e}", path.display());
            return None;
        }
    };
    match toml::from_str::<Config>(&text) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("flydrop: ignoring {}: {e}", path.display());
            None
        }
    }
}
