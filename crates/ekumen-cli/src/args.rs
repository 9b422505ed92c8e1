//! Command-line surface: flags (or a JSON request file) → `RunRequest`.

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use ekumen_terminal::runner::{Mode, RunRequest};
use std::path::PathBuf;

/// Environment variable consulted when `--password` is not given.
pub const PASSWORD_ENV: &str = "EKUMEN_PASSWORD";
/// Environment variable consulted when `--become-password` is not given.
pub const BECOME_PASSWORD_ENV: &str = "EKUMEN_BECOME_PASSWORD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Adhoc,
    Playbook,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Adhoc => Mode::Adhoc,
            ModeArg::Playbook => Mode::Playbook,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "ekumen",
    version,
    about = "Run Ansible ad-hoc commands and playbooks, answering password prompts"
)]
pub struct Cli {
    /// Config file (default: $EKUMEN_CONFIG or ~/.ekumen/ekumen.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Read the whole request from a JSON file; other request flags are ignored
    #[arg(long, value_name = "PATH")]
    pub request: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ModeArg::Adhoc)]
    pub mode: ModeArg,

    /// Inventory file (host lines and [group] headers)
    #[arg(short = 'i', long, value_name = "PATH")]
    pub inventory: Option<PathBuf>,

    /// Comma-separated hosts, used when no inventory file is given
    #[arg(long, value_name = "HOSTS", conflicts_with = "inventory")]
    pub hosts: Option<String>,

    #[arg(short = 'm', long, default_value = "ping")]
    pub module: String,

    /// Module arguments
    #[arg(short = 'a', long = "args", default_value = "")]
    pub module_args: String,

    /// Playbook file for --mode playbook
    #[arg(long, value_name = "PATH")]
    pub playbook: Option<PathBuf>,

    #[arg(short = 'u', long, default_value = "")]
    pub username: String,

    /// SSH password (prefer $EKUMEN_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// Privilege-escalation password; defaults to the SSH password
    #[arg(long)]
    pub become_password: Option<String>,

    /// Do not escalate privileges
    #[arg(long)]
    pub no_become: bool,

    #[arg(long, default_value = "sudo")]
    pub become_method: String,

    #[arg(long, default_value = "root")]
    pub become_user: String,

    #[arg(long, default_value = "")]
    pub limit: String,

    /// Verbosity passed to Ansible (-v … -vvvv)
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Also write the output to ansible_output_<timestamp>.txt in this directory
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<PathBuf>,
}

impl Cli {
    /// Assemble the run request from flags, files and environment.
    pub fn to_request(&self) -> anyhow::Result<RunRequest> {
        if let Some(path) = &self.request {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading request file {}", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("parsing request file {}", path.display()));
        }

        let inventory = match (&self.inventory, &self.hosts) {
            (Some(path), _) => std::fs::read_to_string(path)
                .with_context(|| format!("reading inventory {}", path.display()))?,
            (None, Some(hosts)) => hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            (None, None) => String::new(),
        };

        let playbook = match &self.playbook {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading playbook {}", path.display()))?,
            None => String::new(),
        };

        let password = self
            .password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
            .unwrap_or_default();
        let become_password = self
            .become_password
            .clone()
            .or_else(|| std::env::var(BECOME_PASSWORD_ENV).ok());

        let verbosity = match self.verbose {
            0 => String::new(),
            n => "v".repeat(usize::from(n.min(4))),
        };

        Ok(RunRequest {
            mode: self.mode.into(),
            inventory,
            module: self.module.clone(),
            args: self.module_args.clone(),
            playbook,
            username: self.username.clone(),
            password,
            become_password,
            r#become: !self.no_become,
            become_method: self.become_method.clone(),
            become_user: self.become_user.clone(),
            limit: self.limit.clone(),
            verbosity,
        })
    }
}
