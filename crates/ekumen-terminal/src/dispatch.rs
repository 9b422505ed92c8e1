//! Credential dispatch: what to type back for each classified prompt.
//!
//! Choosing *which* secret answers a password prompt is delegated to a
//! [`CredentialPolicy`], so alternate orderings can be swapped in and tested
//! without any PTY.  The [`Dispatcher`] wraps a policy and handles the
//! prompt kinds that need no secret: host-key confirmation, end of output
//! and idle timeouts.
//!
//! | prompt             | action                                            |
//! |--------------------|---------------------------------------------------|
//! | SSH password       | send SSH password                                 |
//! | BECOME password    | send become password (falls back to SSH password) |
//! | generic password   | policy decides from what was already sent         |
//! | host-key question  | send `yes`                                        |
//! | end of output      | stop                                              |
//! | idle timeout       | stop if the child is dead, otherwise keep waiting |

use crate::{prompt::Prompt, types::Credentials};
use std::fmt;

/// Literal answer to every host-key confirmation.
pub const HOST_KEY_ACK: &str = "yes";

/// Which of the two secrets answers a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Ssh,
    Become,
}

/// What has been typed so far in one session. Never reset mid-session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialState {
    pub ssh_password_sent: bool,
    pub become_password_sent: bool,
}

/// Decides which credential answers a password prompt.
pub trait CredentialPolicy: Send {
    /// Pick the credential for `prompt`, updating internal state.
    ///
    /// Returns `None` for prompts that are not password requests.
    fn choose(&mut self, prompt: Prompt) -> Option<Credential>;

    /// Snapshot of what has been sent.
    fn state(&self) -> CredentialState;
}

/// Disambiguates generic `password:` prompts by send history.
///
/// A best-effort heuristic: the first unrecognised prompt gets the SSH
/// password, the second the become password, and anything after that is
/// treated as a retry and gets the SSH password again.
#[derive(Debug, Clone, Default)]
pub struct SendHistoryPolicy {
    state: CredentialState,
}

impl SendHistoryPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialPolicy for SendHistoryPolicy {
    fn choose(&mut self, prompt: Prompt) -> Option<Credential> {
        match prompt {
            Prompt::SshPassword => {
                self.state.ssh_password_sent = true;
                Some(Credential::Ssh)
            }
            Prompt::BecomePassword => {
                self.state.become_password_sent = true;
                Some(Credential::Become)
            }
            Prompt::GenericPassword => {
                if !self.state.ssh_password_sent {
                    self.state.ssh_password_sent = true;
                    Some(Credential::Ssh)
                } else if !self.state.become_password_sent {
                    self.state.become_password_sent = true;
                    Some(Credential::Become)
                } else {
                    Some(Credential::Ssh)
                }
            }
            _ => None,
        }
    }

    fn state(&self) -> CredentialState {
        self.state
    }
}

/// What the automaton should do next.
#[derive(Clone, PartialEq, Eq)]
pub enum Action {
    /// Type `line` and press Enter.
    Send { line: String, reply: Reply },
    /// Leave the read loop.
    Stop,
    /// Keep waiting for output.
    Wait,
}

/// Why a line is being sent, for logging without the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Credential(Credential),
    HostKeyAck,
}

// `line` may be a password.
impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Send { reply, .. } => f
                .debug_struct("Send")
                .field("line", &"<redacted>")
                .field("reply", reply)
                .finish(),
            Action::Stop => f.write_str("Stop"),
            Action::Wait => f.write_str("Wait"),
        }
    }
}

/// Turns classified prompts into actions for one session.
pub struct Dispatcher<P = SendHistoryPolicy> {
    credentials: Credentials,
    policy: P,
}

impl Dispatcher<SendHistoryPolicy> {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_policy(credentials, SendHistoryPolicy::new())
    }
}

impl<P: CredentialPolicy> Dispatcher<P> {
    pub fn with_policy(credentials: Credentials, policy: P) -> Self {
        Self {
            credentials,
            policy,
        }
    }

    pub fn state(&self) -> CredentialState {
        self.policy.state()
    }

    /// Decide the response to `prompt`.
    ///
    /// `is_alive` is only consulted on an idle timeout.
    pub fn decide(&mut self, prompt: Prompt, is_alive: impl FnOnce() -> bool) -> Action {
        match prompt {
            Prompt::SshPassword | Prompt::BecomePassword | Prompt::GenericPassword => {
                // The stock policy answers every password prompt; a custom one
                // that declines leaves the child waiting for the idle check.
                match self.policy.choose(prompt) {
                    Some(credential) => Action::Send {
                        line: self.secret(credential).to_string(),
                        reply: Reply::Credential(credential),
                    },
                    None => Action::Wait,
                }
            }
            Prompt::HostKey(_) => Action::Send {
                line: HOST_KEY_ACK.to_string(),
                reply: Reply::HostKeyAck,
            },
            Prompt::EndOfOutput => Action::Stop,
            Prompt::IdleTimeout => {
                if is_alive() {
                    Action::Wait
                } else {
                    Action::Stop
                }
            }
        }
    }

    fn secret(&self, credential: Credential) -> &str {
        match credential {
            Credential::Ssh => self.credentials.ssh(),
            Credential::Become => self.credentials.become_secret(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
