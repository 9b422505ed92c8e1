//! PTY session: one child process behind a real terminal, via `portable-pty`.
//!
//! Each `PtySession` owns a pseudo-terminal pair, the spawned shell running
//! one command line, and a background thread that drains the master
//! read-end into a channel.  Waiting for a prompt pulls chunks off that
//! channel into a pending buffer until a recognizer matches, the child's
//! output ends, or the wait times out.
//!
//! The session is released on every exit path: `close` reaps the child, and
//! `Drop` kills and reaps it if `close` was never reached.

use crate::{
    command::CommandLine,
    error::{Result, TerminalError},
    prompt::{Classifier, Prompt},
    types::{SessionId, SessionOptions},
};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::{
    io::{Read, Write},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// How long `close` lets a child exit on its own before killing it.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Poll interval while waiting out `CLOSE_GRACE`.
const CLOSE_POLL: Duration = Duration::from_millis(20);

/// The outcome of one wait: which prompt ended it and the text that preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub prompt: Prompt,
    /// Output consumed before the prompt. It is handed over once and never seen again.
    pub before: String,
}

/// The expect-style surface the automaton drives.
///
/// `PtySession` is the real implementation; tests substitute scripted ones.
pub trait Expect {
    /// Block until a prompt from `classifier` matches, output ends, or
    /// `timeout` elapses (reported as [`Prompt::IdleTimeout`]).
    fn await_prompt(&mut self, classifier: &Classifier, timeout: Duration) -> Result<Observed>;

    /// Type `line` followed by Enter.
    fn send_line(&mut self, line: &str) -> Result<()>;

    /// Hand over output that arrived but was never consumed by a matched
    /// prompt or end of output, such as text printed before an idle timeout.
    fn take_pending(&mut self) -> String;

    /// `true` while the child has not exited.
    fn is_alive(&mut self) -> bool;

    /// Terminate and reap the child. Returns its exit code, or `None` when it
    /// had to be killed and no meaningful status exists.
    fn close(&mut self) -> Result<Option<u32>>;
}

/// A live PTY session wrapping a single command line.
pub struct PtySession {
    id: SessionId,

    /// The spawned `<shell> -c <command line>` process.
    child: Box<dyn Child + Send + Sync>,

    /// Write half; dropped on close so the child sees the terminal go away.
    writer: Option<Box<dyn Write + Send>>,

    /// Master PTY handle. Holding it keeps the terminal open.
    master: Option<Box<dyn MasterPty + Send>>,

    /// ANSI-stripped chunks from the reader thread. Disconnects at EOF.
    output_rx: Receiver<String>,

    /// Output received but not yet handed to the caller.
    pending: String,

    /// Set once the reader thread has hung up.
    eof: bool,

    /// Overall deadline for the session.
    deadline: Instant,
    overall_timeout: Duration,

    /// Exit status once known.
    exit_code: Option<u32>,
    closed: bool,
}

impl PtySession {
    /// Spawn `command` under `opts.shell -c` in a fresh pseudo-terminal.
    ///
    /// A background thread is started immediately to drain the master
    /// read-end.
    pub fn spawn(command: &CommandLine, opts: &SessionOptions) -> Result<Self> {
        let id = SessionId::new();
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 200,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&opts.shell);
        cmd.arg("-c");
        cmd.arg(command.to_shell_string());
        cmd.cwd(&opts.cwd);
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

        // Only the child may hold the slave end, otherwise the reader never sees EOF.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

        let (tx, output_rx) = mpsc::channel::<String>();
        let thread_id = id.clone();

        // Blocking reads run in a dedicated OS thread so waits can time out.
        std::thread::spawn(move || {
            let mut raw = [0u8; 4096];
            // Bytes of a character cut off by the end of the previous read.
            let mut carry: Vec<u8> = Vec::new();
            loop {
                match reader.read(&mut raw) {
                    Ok(0) => break, // EOF, child closed the terminal
                    Ok(n) => {
                        carry.extend_from_slice(&raw[..n]);
                        let complete = complete_utf8_len(&carry);
                        let text = decode(&carry[..complete]);
                        carry.drain(..complete);
                        if !text.is_empty() && tx.send(text).is_err() {
                            break; // session dropped
                        }
                    }
                    Err(e) => {
                        // Linux reports EIO once the last slave fd closes.
                        debug!(session = %thread_id, "PTY reader stopped: {e}");
                        break;
                    }
                }
            }
            if !carry.is_empty() {
                let _ = tx.send(decode(&carry));
            }
            debug!(session = %thread_id, "PTY reader thread exited");
        });

        info!(session = %id, shell = %opts.shell, cwd = %opts.cwd.display(), "spawned PTY session");

        Ok(Self {
            id,
            child,
            writer: Some(writer),
            master: Some(pair.master),
            output_rx,
            pending: String::new(),
            eof: false,
            deadline: Instant::now() + opts.overall_timeout,
            overall_timeout: opts.overall_timeout,
            exit_code: None,
            closed: false,
        })
    }

    fn timeout_error(&self) -> TerminalError {
        TerminalError::Timeout {
            ms: self.overall_timeout.as_millis() as u64,
        }
    }

    fn take_match(&mut self, classifier: &Classifier) -> Option<Observed> {
        let m = classifier.find(&self.pending)?;
        let before = self.pending[..m.start].to_string();
        self.pending.drain(..m.end);
        Some(Observed {
            prompt: m.prompt,
            before,
        })
    }

    /// Kill the child and reap it. Errors are logged, not returned.
    fn kill_and_reap(&mut self) {
        // The child leads its own session; take its whole process group down
        // so grandchildren (ssh, sudo, …) release the terminal too.
        #[cfg(unix)]
        if let Some(pid) = self.child.process_id() {
            // Safety: pid is our direct child, not yet reaped, so its group id is still ours to signal.
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
        if let Err(e) = self.child.kill() {
            debug!(session = %self.id, "kill failed (child probably gone): {e}");
        }
        if let Err(e) = self.child.wait() {
            warn!(session = %self.id, "reaping killed child failed: {e}");
        }
    }
}

/// Strip terminal escapes and decode, replacing invalid UTF-8.
fn decode(bytes: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(bytes);
    String::from_utf8_lossy(&clean).into_owned()
}

/// Length of `buf` up to, but excluding, a multibyte character that is
/// still missing trailing bytes.
fn complete_utf8_len(buf: &[u8]) -> usize {
    // A character is at most four bytes, so only its lead byte can start the tail.
    let floor = buf.len().saturating_sub(3);
    let Some(lead) = (floor..buf.len()).rev().find(|&i| buf[i] & 0xC0 != 0x80) else {
        return buf.len();
    };
    match std::str::from_utf8(&buf[lead..]) {
        Err(e) if e.valid_up_to() == 0 && e.error_len().is_none() => lead,
        _ => buf.len(),
    }
}

impl Expect for PtySession {
    fn await_prompt(&mut self, classifier: &Classifier, timeout: Duration) -> Result<Observed> {
        let read_deadline = Instant::now() + timeout;

        loop {
            if let Some(observed) = self.take_match(classifier) {
                debug!(session = %self.id, prompt = %observed.prompt, "prompt matched");
                return Ok(observed);
            }

            if self.eof {
                return Ok(Observed {
                    prompt: Prompt::EndOfOutput,
                    before: std::mem::take(&mut self.pending),
                });
            }

            let now = Instant::now();
            if now >= self.deadline {
                return Err(self.timeout_error());
            }
            if now >= read_deadline {
                return Ok(Observed {
                    prompt: Prompt::IdleTimeout,
                    before: String::new(),
                });
            }

            let wait = read_deadline.min(self.deadline) - now;
            match self.output_rx.recv_timeout(wait) {
                Ok(chunk) => self.pending.push_str(&chunk),
                Err(RecvTimeoutError::Timeout) => {} // re-checked at the top
                Err(RecvTimeoutError::Disconnected) => self.eof = true,
            }
        }
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TerminalError::IoError(std::io::ErrorKind::BrokenPipe.into()))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn take_pending(&mut self) -> String {
        while let Ok(chunk) = self.output_rx.try_recv() {
            self.pending.push_str(&chunk);
        }
        std::mem::take(&mut self.pending)
    }

    fn is_alive(&mut self) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit_code = Some(status.exit_code());
                false
            }
            Err(e) => {
                warn!(session = %self.id, "try_wait failed: {e}");
                false
            }
        }
    }

    fn close(&mut self) -> Result<Option<u32>> {
        if self.closed {
            return Ok(self.exit_code);
        }
        self.closed = true;

        // Closing our side of the terminal hangs up on the child.
        self.writer = None;

        let grace_deadline = Instant::now() + CLOSE_GRACE;
        while self.is_alive() && Instant::now() < grace_deadline {
            std::thread::sleep(CLOSE_POLL);
        }

        if self.exit_code.is_none() {
            warn!(session = %self.id, "child still running at close, killing it");
            self.kill_and_reap();
            // A killed child has no exit status worth reporting.
            self.exit_code = None;
        }

        drop(self.master.take());
        info!(session = %self.id, exit_code = ?self.exit_code, "PTY session closed");
        Ok(self.exit_code)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if !self.closed && self.exit_code.is_none() && self.is_alive() {
            warn!(session = %self.id, "session dropped while child alive, killing it");
            self.kill_and_reap();
        }
    }
}
