//! The interactive command automaton.
//!
//! Spawn → repeated (wait for prompt → decide → answer) → teardown → verdict.
//!
//! The loop is bounded twice: each wait by the per-read timeout (and the
//! session's overall deadline), and the number of waits by
//! `max_round_trips`.  Whatever way the loop ends, the session is closed
//! before the verdict is built, and every failure is folded into the
//! verdict rather than returned.

use crate::{
    command::CommandLine,
    dispatch::{Action, CredentialPolicy, CredentialState, Dispatcher, Reply, SendHistoryPolicy},
    error::{Result, TerminalError},
    prompt::Classifier,
    session::{Expect, PtySession},
    transcript::Transcript,
    types::{Credentials, SessionOptions},
    verdict::Verdict,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Loop bounds for one session.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub read_timeout: Duration,
    pub max_round_trips: usize,
}

impl From<&SessionOptions> for Limits {
    fn from(opts: &SessionOptions) -> Self {
        Self {
            read_timeout: opts.read_timeout,
            max_round_trips: opts.max_round_trips,
        }
    }
}

/// How the read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// End of output, or an idle timeout with the child gone.
    Finished,
    /// `max_round_trips` waits happened without reaching the end.
    RoundTripCap,
}

/// Everything known about a session after teardown.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub verdict: Verdict,
    pub credentials: CredentialState,
    pub round_trips: usize,
    /// `None` when the loop failed before it could end normally.
    pub exit: Option<LoopExit>,
}

/// Spawn `command` in a PTY and drive it to completion with the default
/// send-history credential policy.
pub fn run(command: &CommandLine, opts: &SessionOptions, credentials: Credentials) -> SessionReport {
    run_with_policy(command, opts, credentials, SendHistoryPolicy::new())
}

/// Like [`run`], with a caller-supplied credential policy.
pub fn run_with_policy<P: CredentialPolicy>(
    command: &CommandLine,
    opts: &SessionOptions,
    credentials: Credentials,
    policy: P,
) -> SessionReport {
    let mut dispatcher = Dispatcher::with_policy(credentials, policy);

    let session = match PtySession::spawn(command, opts) {
        Ok(s) => s,
        Err(e) => {
            warn!("spawn failed: {e}");
            return SessionReport {
                verdict: Verdict::from_error(&e),
                credentials: dispatcher.state(),
                round_trips: 0,
                exit: None,
            };
        }
    };

    drive(session, &Classifier::ansible(), &mut dispatcher, Limits::from(opts))
}

/// Drive an already spawned session to a verdict, closing it on every path.
pub fn drive<S, P>(
    mut session: S,
    classifier: &Classifier,
    dispatcher: &mut Dispatcher<P>,
    limits: Limits,
) -> SessionReport
where
    S: Expect,
    P: CredentialPolicy,
{
    let mut transcript = Transcript::new();
    let mut round_trips = 0;

    let outcome = converse(
        &mut session,
        classifier,
        dispatcher,
        limits,
        &mut transcript,
        &mut round_trips,
    );

    let close = session.close();
    // Output printed after the last prompt, e.g. before an idle stop or the cap.
    transcript.push(session.take_pending());

    let (verdict, exit) = match (outcome, close) {
        (Ok(exit), Ok(exit_code)) => {
            if exit == LoopExit::RoundTripCap {
                warn!(
                    round_trips,
                    "round-trip cap reached without end of output; session torn down"
                );
            }
            (Verdict::from_exit(exit_code, transcript.into_output()), Some(exit))
        }
        (Ok(exit), Err(e)) => {
            warn!("closing session failed: {e}");
            (Verdict::from_error(&e), Some(exit))
        }
        (Err(e), close) => {
            if let Err(close_err) = close {
                warn!("closing session after failure also failed: {close_err}");
            }
            (Verdict::from_error(&e), None)
        }
    };

    info!(
        success = verdict.success,
        round_trips,
        output_bytes = verdict.output.len(),
        "session finished"
    );

    SessionReport {
        verdict,
        credentials: dispatcher.state(),
        round_trips,
        exit,
    }
}

/// The bounded read/classify/respond loop.
fn converse<S, P>(
    session: &mut S,
    classifier: &Classifier,
    dispatcher: &mut Dispatcher<P>,
    limits: Limits,
    transcript: &mut Transcript,
    round_trips: &mut usize,
) -> Result<LoopExit>
where
    S: Expect,
    P: CredentialPolicy,
{
    while *round_trips < limits.max_round_trips {
        *round_trips += 1;

        let observed = session.await_prompt(classifier, limits.read_timeout)?;
        transcript.push(observed.before);
        debug!(round = *round_trips, prompt = %observed.prompt, "classified output");

        match dispatcher.decide(observed.prompt, || session.is_alive()) {
            Action::Send { line, reply } => {
                if let Reply::Credential(credential) = reply {
                    debug!(?credential, "sending credential");
                } else {
                    debug!("acknowledging host key");
                }
                if let Err(e) = session.send_line(&line) {
                    // A write failing because the child is gone means it died mid-exchange.
                    return Err(if session.is_alive() {
                        e
                    } else {
                        TerminalError::UnexpectedEof
                    });
                }
            }
            Action::Stop => return Ok(LoopExit::Finished),
            Action::Wait => continue,
        }
    }

    Ok(LoopExit::RoundTripCap)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
