//! `AnsibleRunner`: turns a run request into one automaton session.
//!
//! Everything that can be rejected is rejected before a process exists:
//! a missing tool, an empty or malformed inventory, a module outside the
//! allow-list, an empty playbook.  Accepted requests get a private scratch
//! directory holding the inventory (and playbook), which is removed when the
//! run ends whatever the outcome.

use crate::{
    automaton,
    command::CommandLine,
    error::{Result, TerminalError},
    types::{Credentials, SessionOptions},
    verdict::Verdict,
};
use ekumen_core::RunnerConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, sync::OnceLock};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Accepted `-v` levels.
const VERBOSITY_LEVELS: &[&str] = &["v", "vv", "vvv", "vvvv"];

const INVENTORY_FILE: &str = "inventory";
const PLAYBOOK_FILE: &str = "playbook.yml";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Which tool a request drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// `ansible all -m <module>`
    #[default]
    Adhoc,
    /// `ansible-playbook <playbook.yml>`
    Playbook,
}

/// One invocation, as supplied by the caller.
#[derive(Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub mode: Mode,

    /// Raw inventory text: host lines and INI-style `[group]` headers.
    #[serde(default)]
    pub inventory: String,

    #[serde(default = "default_module")]
    pub module: String,

    /// Module arguments for `-a`.
    #[serde(default)]
    pub args: String,

    /// Playbook YAML, written to the scratch directory before spawning.
    #[serde(default)]
    pub playbook: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Absent means "same as `password`".
    #[serde(default)]
    pub become_password: Option<String>,

    #[serde(default = "bool_true")]
    pub r#become: bool,

    #[serde(default = "default_become_method")]
    pub become_method: String,

    #[serde(default = "default_become_user")]
    pub become_user: String,

    #[serde(default)]
    pub limit: String,

    /// One of `v`, `vv`, `vvv`, `vvvv`; anything else is ignored.
    #[serde(default)]
    pub verbosity: String,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            mode: Mode::Adhoc,
            inventory: String::new(),
            module: default_module(),
            args: String::new(),
            playbook: String::new(),
            username: String::new(),
            password: String::new(),
            become_password: None,
            r#become: true,
            become_method: default_become_method(),
            become_user: default_become_user(),
            limit: String::new(),
            verbosity: String::new(),
        }
    }
}

impl RunRequest {
    /// The become password after applying the "defaults to `password`" rule.
    pub fn effective_become_password(&self) -> &str {
        self.become_password.as_deref().unwrap_or(&self.password)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.password.clone(), Some(self.effective_become_password().to_string()))
    }
}

// Passwords never reach logs, even through `{:?}`.
impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("mode", &self.mode)
            .field("module", &self.module)
            .field("args", &self.args)
            .field("username", &self.username)
            .field("become", &self.r#become)
            .field("become_method", &self.become_method)
            .field("become_user", &self.become_user)
            .field("limit", &self.limit)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

fn default_module() -> String {
    "ping".to_string()
}
fn default_become_method() -> String {
    "sudo".to_string()
}
fn default_become_user() -> String {
    "root".to_string()
}
fn bool_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn host_pattern() -> &'static Regex {
    static HOST: OnceLock<Regex> = OnceLock::new();
    HOST.get_or_init(|| Regex::new(r"^[\w.\-:@\[\]]+$").expect("host pattern is valid"))
}

/// Reject empty inventories and host lines with unexpected characters.
///
/// Blank lines, `#` comments and `[group]` headers are skipped; for every
/// other line only the first whitespace-separated token (the host) is
/// checked, so `host ansible_port=2222` is fine.
pub fn validate_inventory(content: &str) -> Result<()> {
    let content = content.trim();
    if content.is_empty() {
        return Err(TerminalError::InvalidInput(
            "Inventory is required. Please provide at least one host.".to_string(),
        ));
    }

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let host = line.split_whitespace().next().unwrap_or_default();
        if !host_pattern().is_match(host) {
            return Err(TerminalError::InvalidInput(format!(
                "Invalid host format: {line}"
            )));
        }
    }

    Ok(())
}

/// Reject empty module names and modules outside `allowed`.
pub fn validate_module(module: &str, allowed: &[String]) -> Result<()> {
    if module.is_empty() {
        return Err(TerminalError::InvalidInput(
            "Module name is required.".to_string(),
        ));
    }

    if !allowed.is_empty() && !allowed.iter().any(|m| m == module) {
        let shown: Vec<&str> = allowed.iter().take(10).map(String::as_str).collect();
        return Err(TerminalError::InvalidInput(format!(
            "Module \"{module}\" is not allowed. Allowed modules: {}...",
            shown.join(", ")
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Command assembly
// ---------------------------------------------------------------------------

/// Build the argument vector for `request`, with its files under `workdir`.
pub fn build_command(config: &RunnerConfig, request: &RunRequest, workdir: &Path) -> CommandLine {
    let inventory_path = workdir.join(INVENTORY_FILE).to_string_lossy().into_owned();

    let mut cmd = match request.mode {
        Mode::Adhoc => {
            let mut cmd = CommandLine::new(&config.ansible_bin);
            cmd.args(["all", "-i"])
                .arg(inventory_path)
                .args(["-m", request.module.trim()]);
            let args = request.args.trim();
            if !args.is_empty() {
                cmd.args(["-a", args]);
            }
            cmd
        }
        Mode::Playbook => {
            let mut cmd = CommandLine::new(&config.ansible_playbook_bin);
            cmd.arg("-i")
                .arg(inventory_path)
                .arg(workdir.join(PLAYBOOK_FILE).to_string_lossy().into_owned());
            cmd
        }
    };

    let username = request.username.trim();
    if !username.is_empty() {
        cmd.args(["-u", username]);
    }

    let limit = request.limit.trim();
    if !limit.is_empty() {
        cmd.args(["--limit", limit]);
    }

    if request.r#become {
        cmd.arg("--become")
            .args(["--become-method", request.become_method.as_str()])
            .args(["--become-user", request.become_user.as_str()]);
    }

    if !request.password.is_empty() {
        cmd.arg("--ask-pass");
    }

    if request.r#become && !request.effective_become_password().is_empty() {
        cmd.arg("--ask-become-pass");
    }

    if VERBOSITY_LEVELS.contains(&request.verbosity.as_str()) {
        cmd.arg(format!("-{}", request.verbosity));
    }

    cmd
}

/// Variables injected into the child so unreachable hosts fail fast.
pub fn session_env(config: &RunnerConfig) -> Vec<(String, String)> {
    vec![
        ("ANSIBLE_HOST_KEY_CHECKING".to_string(), "False".to_string()),
        (
            "ANSIBLE_SSH_ARGS".to_string(),
            format!(
                "-o ConnectTimeout={} -o StrictHostKeyChecking=no",
                config.ssh_connect_timeout_secs
            ),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// A validated request, ready to spawn.
///
/// Owns the scratch directory; dropping it removes the directory.
pub struct PreparedRun {
    pub command: CommandLine,
    pub options: SessionOptions,
    pub credentials: Credentials,
    workdir: TempDir,
}

impl PreparedRun {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }
}

/// Validates requests and runs them through the interactive automaton.
pub struct AnsibleRunner {
    config: RunnerConfig,
    allowed_modules: Vec<String>,
}

impl AnsibleRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let allowed_modules = config.effective_allowed_modules();
        Self {
            config,
            allowed_modules,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// `true` if the ad-hoc tool can be found on `PATH`.
    pub fn is_available(&self) -> bool {
        which::which(&self.config.ansible_bin).is_ok()
    }

    fn tool_for(&self, mode: Mode) -> &str {
        match mode {
            Mode::Adhoc => &self.config.ansible_bin,
            Mode::Playbook => &self.config.ansible_playbook_bin,
        }
    }

    /// Validate `request` and lay out its scratch directory.
    ///
    /// No process is started here.
    pub fn prepare(&self, request: &RunRequest) -> Result<PreparedRun> {
        let tool = self.tool_for(request.mode);
        if which::which(tool).is_err() {
            return Err(TerminalError::ToolUnavailable {
                tool: tool.to_string(),
            });
        }

        validate_inventory(&request.inventory)?;
        match request.mode {
            Mode::Adhoc => validate_module(request.module.trim(), &self.allowed_modules)?,
            Mode::Playbook => {
                if request.playbook.trim().is_empty() {
                    return Err(TerminalError::InvalidInput(
                        "Playbook content is required.".to_string(),
                    ));
                }
            }
        }

        let workdir = tempfile::Builder::new()
            .prefix("ansible_runner_")
            .tempdir()?;

        fs::write(workdir.path().join(INVENTORY_FILE), request.inventory.trim())?;
        if request.mode == Mode::Playbook {
            fs::write(workdir.path().join(PLAYBOOK_FILE), request.playbook.trim())?;
        }

        let command = build_command(&self.config, request, workdir.path());

        let mut options = SessionOptions::from_config(&self.config);
        options.cwd = workdir.path().to_path_buf();
        options.env = session_env(&self.config);

        debug!(command = %command, "prepared run");

        Ok(PreparedRun {
            command,
            options,
            credentials: request.credentials(),
            workdir,
        })
    }

    /// Execute `request` and return its verdict. Never fails: every error is
    /// folded into the verdict.
    ///
    /// The session itself is blocking, so it runs on Tokio's blocking pool.
    pub async fn run(&self, request: RunRequest) -> Verdict {
        info!(mode = ?request.mode, module = %request.module, "run requested");

        let prepared = match self.prepare(&request) {
            Ok(p) => p,
            Err(e) => {
                warn!("run rejected: {e}");
                return Verdict::from_error(&e);
            }
        };

        let joined = tokio::task::spawn_blocking(move || {
            let report = automaton::run(&prepared.command, &prepared.options, prepared.credentials.clone());
            // Scratch directory goes away with `prepared` here.
            drop(prepared);
            report
        })
        .await;

        match joined {
            Ok(report) => report.verdict,
            Err(e) => {
                warn!("session task failed: {e}");
                Verdict::failure(e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn adhoc(inventory: &str) -> RunRequest {
        RunRequest {
            inventory: inventory.to_string(),
            ..RunRequest::default()
        }
    }

    // --- Inventory validation ---

    #[test]
    fn empty_inventory_is_rejected() {
        let err = validate_inventory("  \n ").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Inventory is required. Please provide at least one host."
        );
    }

    #[test]
    fn groups_comments_and_host_vars_are_accepted() {
        let inv = "# web tier\n[web]\nweb1.example.com ansible_port=2222\n10.0.0.5\n\n[db]\ndeploy@db-1\n[::1]\n";
        assert!(validate_inventory(inv).is_ok());
    }

    #[test]
    fn shell_metacharacters_in_host_are_rejected() {
        let err = validate_inventory("10.0.0.5\nhost;reboot\n").unwrap_err();
        assert_eq!(err.to_string(), "Invalid host format: host;reboot");
    }

    // --- Module validation ---

    #[test]
    fn module_checks() {
        let allowed: Vec<String> = RunnerConfig::default().effective_allowed_modules();
        assert!(validate_module("ping", &allowed).is_ok());
        assert_eq!(
            validate_module("", &allowed).unwrap_err().to_string(),
            "Module name is required."
        );
        let msg = validate_module("script", &allowed).unwrap_err().to_string();
        assert!(msg.starts_with("Module \"script\" is not allowed. Allowed modules: ping, command,"));
        assert!(msg.ends_with("..."));
    }

    // --- Command assembly ---

    #[test]
    fn adhoc_command_with_defaults() {
        let config = RunnerConfig::default();
        let mut req = adhoc("10.0.0.5");
        req.password = "secret".into();
        let cmd = build_command(&config, &req, Path::new("/tmp/run"));

        assert_eq!(
            cmd.tokens(),
            &[
                "ansible",
                "all",
                "-i",
                "/tmp/run/inventory",
                "-m",
                "ping",
                "--become",
                "--become-method",
                "sudo",
                "--become-user",
                "root",
                "--ask-pass",
                "--ask-become-pass",
            ]
        );
    }

    #[test]
    fn adhoc_command_with_everything() {
        let config = RunnerConfig::default();
        let req = RunRequest {
            module: "shell".into(),
            args: " uptime && df -h ".into(),
            username: "deploy".into(),
            limit: "web*".into(),
            become_method: "su".into(),
            become_user: "admin".into(),
            verbosity: "vvv".into(),
            ..adhoc("10.0.0.5")
        };
        let cmd = build_command(&config, &req, Path::new("/w"));
        let line = cmd.to_shell_string();

        assert!(line.contains("-a 'uptime && df -h'"));
        assert!(line.contains("-u deploy"));
        assert!(line.contains("--limit 'web*'"));
        assert!(line.contains("--become-method su --become-user admin"));
        assert!(line.ends_with("-vvv"));
        // no password: nothing to answer, so don't ask
        assert!(!line.contains("--ask-pass"));
        assert!(!line.contains("--ask-become-pass"));
    }

    #[test]
    fn playbook_command_and_become_off() {
        let config = RunnerConfig::default();
        let req = RunRequest {
            mode: Mode::Playbook,
            playbook: "- hosts: all".into(),
            password: "secret".into(),
            r#become: false,
            verbosity: "loud".into(),
            ..adhoc("10.0.0.5")
        };
        let cmd = build_command(&config, &req, Path::new("/w"));
        assert_eq!(
            cmd.tokens(),
            &["ansible-playbook", "-i", "/w/inventory", "/w/playbook.yml", "--ask-pass"]
        );
    }

    #[test]
    fn explicit_empty_become_password_skips_ask_become_pass() {
        let req = RunRequest {
            password: "secret".into(),
            become_password: Some(String::new()),
            ..adhoc("10.0.0.5")
        };
        let cmd = build_command(&RunnerConfig::default(), &req, Path::new("/w"));
        assert!(!cmd.tokens().iter().any(|t| t == "--ask-become-pass"));
        // ...but a become prompt would still be answered with the SSH password
        assert_eq!(req.credentials().become_secret(), "secret");
    }

    #[test]
    fn environment_disables_host_key_checking() {
        let config = RunnerConfig {
            ssh_connect_timeout_secs: 7,
            ..RunnerConfig::default()
        };
        let env = session_env(&config);
        assert!(env.contains(&("ANSIBLE_HOST_KEY_CHECKING".into(), "False".into())));
        assert!(env.contains(&(
            "ANSIBLE_SSH_ARGS".into(),
            "-o ConnectTimeout=7 -o StrictHostKeyChecking=no".into()
        )));
    }

    // --- Request model ---

    #[test]
    fn request_defaults_from_json() {
        let req: RunRequest = serde_json::from_str(r#"{"inventory":"10.0.0.5"}"#).unwrap();
        assert_eq!(req.mode, Mode::Adhoc);
        assert_eq!(req.module, "ping");
        assert!(req.r#become);
        assert_eq!(req.become_method, "sudo");
        assert_eq!(req.become_user, "root");
        assert_eq!(req.become_password, None);

        let req: RunRequest =
            serde_json::from_str(r#"{"mode":"playbook","become":false,"password":"pw"}"#).unwrap();
        assert_eq!(req.mode, Mode::Playbook);
        assert!(!req.r#become);
        assert_eq!(req.effective_become_password(), "pw");
    }

    #[test]
    fn request_debug_hides_passwords() {
        let req = RunRequest {
            password: "hunter2".into(),
            become_password: Some("root-pw".into()),
            ..RunRequest::default()
        };
        let shown = format!("{req:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("root-pw"));
    }

    // --- Runner front end ---

    fn runner_with_tool(tool: &str) -> AnsibleRunner {
        AnsibleRunner::new(RunnerConfig {
            ansible_bin: tool.to_string(),
            ansible_playbook_bin: tool.to_string(),
            ..RunnerConfig::default()
        })
    }

    #[tokio::test]
    async fn missing_tool_is_reported_before_anything_else() {
        let runner = runner_with_tool("ekumen-definitely-not-installed");
        assert!(!runner.is_available());
        let verdict = runner.run(adhoc("")).await;
        assert!(!verdict.success);
        assert!(verdict.error.contains("is not installed or not in PATH"));
    }

    #[tokio::test]
    async fn invalid_input_never_spawns() {
        let runner = runner_with_tool("/bin/sh");
        let verdict = runner.run(adhoc("bad|host extra")).await;
        assert_eq!(verdict, Verdict::failure("Invalid host format: bad|host extra"));

        let verdict = runner
            .run(RunRequest {
                module: "script".into(),
                ..adhoc("10.0.0.5")
            })
            .await;
        assert!(verdict.error.starts_with("Module \"script\" is not allowed"));

        let verdict = runner
            .run(RunRequest {
                mode: Mode::Playbook,
                ..adhoc("10.0.0.5")
            })
            .await;
        assert_eq!(verdict.error, "Playbook content is required.");
    }

    #[test]
    fn prepare_writes_files_and_cleans_up() {
        let runner = runner_with_tool("/bin/sh");
        let req = RunRequest {
            mode: Mode::Playbook,
            playbook: "- hosts: all\n  tasks: []\n".into(),
            ..adhoc("[web]\n10.0.0.5\n")
        };

        let prepared = runner.prepare(&req).unwrap();
        let dir: PathBuf = prepared.workdir().to_path_buf();
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ansible_runner_"));
        assert_eq!(fs::read_to_string(dir.join("inventory")).unwrap(), "[web]\n10.0.0.5");
        assert_eq!(
            fs::read_to_string(dir.join("playbook.yml")).unwrap(),
            "- hosts: all\n  tasks: []"
        );
        assert_eq!(prepared.options.cwd, dir);
        assert_eq!(prepared.options.env.len(), 2);

        drop(prepared);
        assert!(!dir.exists());
    }
}
