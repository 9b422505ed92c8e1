//! Prompt classification.
//!
//! A [`Classifier`] holds an ordered list of recognizers.  Pending output is
//! tested against them in table order and the first one that matches
//! anywhere in the buffer wins, so the tool-specific `SSH password:` and
//! `BECOME password` shapes are always seen before the generic `password:`
//! pattern that would otherwise shadow them.
//!
//! Two further outcomes have no pattern: [`Prompt::EndOfOutput`] and
//! [`Prompt::IdleTimeout`] are produced by the session itself.

use regex::Regex;
use std::fmt;

/// Surface forms of the SSH host-key confirmation question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyVariant {
    /// Any case-insensitive `yes/no`.
    YesNo,
    /// The literal `(yes/no/[fingerprint])`.
    Fingerprint,
    /// `Are you sure you want to continue`.
    ContinueConnecting,
}

/// What the child is waiting for (or why the wait ended).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    SshPassword,
    BecomePassword,
    GenericPassword,
    HostKey(HostKeyVariant),
    /// The child closed its output stream.
    EndOfOutput,
    /// Nothing matched within the per-read timeout.
    IdleTimeout,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Prompt::SshPassword => "ssh_password",
            Prompt::BecomePassword => "become_password",
            Prompt::GenericPassword => "generic_password",
            Prompt::HostKey(_) => "host_key",
            Prompt::EndOfOutput => "end_of_output",
            Prompt::IdleTimeout => "idle_timeout",
        };
        f.write_str(name)
    }
}

/// One pattern in the table.
#[derive(Debug, Clone)]
pub struct Recognizer {
    pub prompt: Prompt,
    pub pattern: Regex,
}

/// A located prompt inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptMatch {
    pub prompt: Prompt,
    /// Byte offset where the match starts; text before it belongs to the transcript.
    pub start: usize,
    /// Byte offset just past the match; consumed together with the prompt.
    pub end: usize,
}

/// The prompt table for `ansible` / `ansible-playbook`, highest priority first.
const ANSIBLE_PROMPTS: &[(Prompt, &str)] = &[
    (Prompt::SshPassword, r"SSH password:"),
    (Prompt::BecomePassword, r"BECOME password"),
    (Prompt::GenericPassword, r"(?i)password:"),
    (Prompt::HostKey(HostKeyVariant::YesNo), r"(?i)yes/no"),
    (
        Prompt::HostKey(HostKeyVariant::Fingerprint),
        r"\(yes/no/\[fingerprint\]\)",
    ),
    (
        Prompt::HostKey(HostKeyVariant::ContinueConnecting),
        r"Are you sure you want to continue",
    ),
];

/// Ordered set of recognizers evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct Classifier {
    recognizers: Vec<Recognizer>,
}

impl Classifier {
    /// Build a classifier from `(prompt, regex)` pairs in priority order.
    pub fn new<'a, I>(table: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (Prompt, &'a str)>,
    {
        let recognizers = table
            .into_iter()
            .map(|(prompt, src)| {
                Ok(Recognizer {
                    prompt,
                    pattern: Regex::new(src)?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { recognizers })
    }

    /// The standard table for the Ansible CLI tools.
    pub fn ansible() -> Self {
        Self::new(ANSIBLE_PROMPTS.iter().copied()).expect("built-in prompt patterns are valid")
    }

    /// Find the highest-priority prompt present in `buffer`.
    pub fn find(&self, buffer: &str) -> Option<PromptMatch> {
        self.recognizers.iter().find_map(|r| {
            r.pattern.find(buffer).map(|m| PromptMatch {
                prompt: r.prompt,
                start: m.start(),
                end: m.end(),
            })
        })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::ansible()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
