use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_ROUND_TRIPS: usize = 30;
pub const DEFAULT_SSH_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Modules an ad-hoc run may invoke when no explicit allow-list is configured.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "ping",
    "command",
    "shell",
    "yum",
    "dnf",
    "apt",
    "service",
    "systemd",
    "copy",
    "file",
    "user",
    "group",
    "package",
    "lineinfile",
    "template",
    "debug",
    "setup",
    "raw",
    "get_url",
    "uri",
    "stat",
    "find",
    "fetch",
    "hostname",
    "cron",
    "mount",
    "sysctl",
    "firewalld",
    "iptables",
];

/// Top-level config (ekumen.toml + EKUMEN_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EkumenConfig {
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Knobs for the automation-tool runner and its PTY sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Overall deadline for one session.
    /// Override with env var: EKUMEN_RUNNER__COMMAND_TIMEOUT_SECS=900
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Longest wait for new output before the idle check runs.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Upper bound on prompt/response cycles per session.
    #[serde(default = "default_max_round_trips")]
    pub max_round_trips: usize,

    /// Value injected as `ConnectTimeout` into `ANSIBLE_SSH_ARGS`.
    #[serde(default = "default_ssh_connect_timeout")]
    pub ssh_connect_timeout_secs: u64,

    /// Module allow-list for ad-hoc runs. Empty means `DEFAULT_ALLOWED_MODULES`.
    /// From the environment use figment's array syntax: `[ping,setup]`.
    #[serde(default)]
    pub allowed_modules: Vec<String>,

    #[serde(default = "default_ansible_bin")]
    pub ansible_bin: String,

    #[serde(default = "default_ansible_playbook_bin")]
    pub ansible_playbook_bin: String,

    /// Shell that interprets the quoted command line inside the PTY.
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            ssh_connect_timeout_secs: DEFAULT_SSH_CONNECT_TIMEOUT_SECS,
            allowed_modules: Vec::new(),
            ansible_bin: default_ansible_bin(),
            ansible_playbook_bin: default_ansible_playbook_bin(),
            shell: default_shell(),
        }
    }
}

impl RunnerConfig {
    /// The allow-list actually enforced: the configured one, or the built-in
    /// safe list when none is configured.
    pub fn effective_allowed_modules(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .allowed_modules
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();

        if configured.is_empty() {
            DEFAULT_ALLOWED_MODULES.iter().map(|m| m.to_string()).collect()
        } else {
            configured
        }
    }
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}
fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}
fn default_max_round_trips() -> usize {
    DEFAULT_MAX_ROUND_TRIPS
}
fn default_ssh_connect_timeout() -> u64 {
    DEFAULT_SSH_CONNECT_TIMEOUT_SECS
}
fn default_ansible_bin() -> String {
    "ansible".to_string()
}
fn default_ansible_playbook_bin() -> String {
    "ansible-playbook".to_string()
}
fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

impl EkumenConfig {
    /// Load config from a TOML file with EKUMEN_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.ekumen/ekumen.toml
    ///
    /// A missing file is not an error; every key has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        Self::extract(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("EKUMEN_").split("__")),
        )
    }

    /// Extract from an already assembled figment (used by `load` and tests).
    pub fn extract(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::EkumenError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ekumen/ekumen.toml", home)
}
