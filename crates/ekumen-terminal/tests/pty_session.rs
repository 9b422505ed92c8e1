// Drive real pseudo-terminal sessions against small /bin/sh scripts that
// imitate the prompts the automation CLI prints.

use ekumen_core::RunnerConfig;
use ekumen_terminal::automaton::{self, LoopExit};
use ekumen_terminal::command::CommandLine;
use ekumen_terminal::runner::{AnsibleRunner, RunRequest};
use ekumen_terminal::{Credentials, SessionOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn options(cwd: &Path) -> SessionOptions {
    SessionOptions {
        shell: "/bin/sh".to_string(),
        cwd: cwd.to_path_buf(),
        env: Vec::new(),
        overall_timeout: Duration::from_secs(20),
        read_timeout: Duration::from_secs(5),
        max_round_trips: 30,
    }
}

fn sh(script: &str) -> CommandLine {
    let mut cmd = CommandLine::new("/bin/sh");
    cmd.args(["-c", script]);
    cmd
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stand-in for `ansible`: asks for both passwords, succeeds only if both are right.
const FAKE_ANSIBLE: &str = r#"#!/bin/sh
echo "args: $*"
printf 'SSH password: '
stty -echo 2>/dev/null
read ssh_pw
stty echo 2>/dev/null
printf '\nBECOME password[defaults to SSH password]: '
stty -echo 2>/dev/null
read become_pw
stty echo 2>/dev/null
echo
if [ "$ssh_pw" = secret ] && [ "$become_pw" = secret ]; then
  echo '10.0.0.5 | SUCCESS => {"ping": "pong"}'
  exit 0
fi
echo '10.0.0.5 | FAILED'
exit 2
"#;

#[tokio::test]
async fn adhoc_ping_answers_ssh_and_become_prompts() {
    let tools = tempfile::tempdir().unwrap();
    let fake = write_script(tools.path(), "ansible", FAKE_ANSIBLE);

    let runner = AnsibleRunner::new(RunnerConfig {
        ansible_bin: fake.to_string_lossy().into_owned(),
        read_timeout_secs: 5,
        command_timeout_secs: 30,
        ..RunnerConfig::default()
    });

    let verdict = runner
        .run(RunRequest {
            inventory: "10.0.0.5".into(),
            module: "ping".into(),
            password: "secret".into(),
            r#become: true,
            ..RunRequest::default()
        })
        .await;

    assert!(verdict.success, "verdict: {verdict:?}");
    assert_eq!(verdict.error, "");
    assert!(verdict.output.contains("10.0.0.5 | SUCCESS"));
    assert!(verdict.output.contains("--ask-pass"));
    assert!(verdict.output.contains("--ask-become-pass"));
}

#[tokio::test]
async fn wrong_become_password_is_a_failed_verdict_not_an_error() {
    let tools = tempfile::tempdir().unwrap();
    let fake = write_script(tools.path(), "ansible", FAKE_ANSIBLE);

    let runner = AnsibleRunner::new(RunnerConfig {
        ansible_bin: fake.to_string_lossy().into_owned(),
        read_timeout_secs: 5,
        ..RunnerConfig::default()
    });

    let verdict = runner
        .run(RunRequest {
            inventory: "10.0.0.5".into(),
            password: "secret".into(),
            become_password: Some("wrong".into()),
            ..RunRequest::default()
        })
        .await;

    assert!(!verdict.success);
    assert_eq!(verdict.error, "");
    assert!(verdict.output.contains("FAILED"));
}

#[test]
fn clean_exit_without_prompts_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let report = automaton::run(
        &sh("echo all good"),
        &options(dir.path()),
        Credentials::new("secret", None),
    );

    assert!(report.verdict.success);
    assert!(report.verdict.output.contains("all good"));
    assert!(!report.credentials.ssh_password_sent);
    assert!(!report.credentials.become_password_sent);
    assert_eq!(report.exit, Some(LoopExit::Finished));
}

#[test]
fn non_zero_exit_keeps_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let report = automaton::run(
        &sh("echo 'host unreachable'; exit 3"),
        &options(dir.path()),
        Credentials::default(),
    );

    assert!(!report.verdict.success);
    assert_eq!(report.verdict.error, "");
    assert!(report.verdict.output.contains("host unreachable"));
}

#[test]
fn host_key_question_gets_yes() {
    let dir = tempfile::tempdir().unwrap();
    let script = "printf 'Are you sure you want to continue connecting (yes/no/[fingerprint])? '; \
                  read answer; [ \"$answer\" = yes ] && echo accepted";
    let report = automaton::run(&sh(script), &options(dir.path()), Credentials::default());

    assert!(report.verdict.success, "verdict: {:?}", report.verdict);
    assert!(report.verdict.output.contains("accepted"));
}

#[test]
fn three_generic_prompts_are_all_answered() {
    let dir = tempfile::tempdir().unwrap();
    let script = "n=0; for i in 1 2 3; do printf 'Password: '; read p; \
                  [ \"$p\" = secret ] && n=$((n+1)); echo; done; echo \"correct=$n\"";
    let report = automaton::run(
        &sh(script),
        &options(dir.path()),
        Credentials::new("secret", None),
    );

    assert!(report.verdict.success);
    assert!(report.verdict.output.contains("correct=3"));
    assert!(report.credentials.ssh_password_sent);
    assert!(report.credentials.become_password_sent);
}

#[test]
fn idle_timeout_keeps_waiting_for_a_live_child() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.read_timeout = Duration::from_millis(200);

    let report = automaton::run(&sh("sleep 1; echo finally"), &opts, Credentials::default());

    assert!(report.verdict.success);
    assert!(report.verdict.output.contains("finally"));
    assert!(report.round_trips >= 2);
}

#[test]
fn overall_deadline_tears_the_session_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.overall_timeout = Duration::from_millis(500);
    opts.read_timeout = Duration::from_millis(200);

    let started = Instant::now();
    let report = automaton::run(&sh("sleep 30"), &opts, Credentials::default());

    assert_eq!(report.verdict.error, "Command timed out");
    assert!(!report.verdict.success);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn round_trip_cap_ends_a_silent_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.read_timeout = Duration::from_millis(100);
    opts.max_round_trips = 3;

    let started = Instant::now();
    let report = automaton::run(&sh("sleep 30"), &opts, Credentials::default());

    assert_eq!(report.exit, Some(LoopExit::RoundTripCap));
    assert_eq!(report.round_trips, 3);
    assert!(!report.verdict.success);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn output_before_the_cap_reaches_the_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.read_timeout = Duration::from_millis(300);
    opts.max_round_trips = 3;

    let report = automaton::run(
        &sh("echo 'TASK [ping] partial'; sleep 30"),
        &opts,
        Credentials::default(),
    );

    assert_eq!(report.exit, Some(LoopExit::RoundTripCap));
    assert!(!report.verdict.success);
    assert!(
        report.verdict.output.contains("TASK [ping] partial"),
        "output: {:?}",
        report.verdict.output
    );
}

#[test]
fn prompt_split_across_reads_is_still_recognised() {
    let dir = tempfile::tempdir().unwrap();
    let script = "printf 'SSH pass'; sleep 0.3; printf 'word: '; \
                  stty -echo 2>/dev/null; read p; stty echo 2>/dev/null; echo; echo \"got=$p\"";
    let report = automaton::run(
        &sh(script),
        &options(dir.path()),
        Credentials::new("secret", None),
    );

    assert!(report.verdict.success, "verdict: {:?}", report.verdict);
    assert!(report.verdict.output.contains("got=secret"));
    assert!(report.credentials.ssh_password_sent);
    assert!(!report.credentials.become_password_sent);
}

#[test]
fn long_non_ascii_line_survives_read_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let script = "awk 'BEGIN { s = \"a\"; for (i = 0; i < 6000; i++) s = s \"é\"; print s }'";
    let report = automaton::run(&sh(script), &options(dir.path()), Credentials::default());

    assert!(report.verdict.success, "verdict: {:?}", report.verdict);
    let output = &report.verdict.output;
    assert!(!output.contains('\u{FFFD}'), "replacement characters in output");
    assert_eq!(output.matches('é').count(), 6000);
}

#[test]
fn child_sees_cwd_and_injected_env() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.env = vec![("EKUMEN_PROBE".to_string(), "probe-value".to_string())];

    let report = automaton::run(
        &sh("echo \"cwd=$(pwd -P) probe=$EKUMEN_PROBE\""),
        &opts,
        Credentials::default(),
    );

    let canonical = dir.path().canonicalize().unwrap();
    assert!(report.verdict.output.contains(&format!("cwd={}", canonical.display())));
    assert!(report.verdict.output.contains("probe=probe-value"));
}

#[test]
fn missing_shell_is_a_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.shell = "/nonexistent/ekumen-shell".to_string();

    let report = automaton::run(&sh("true"), &opts, Credentials::default());

    assert!(!report.verdict.success);
    assert!(!report.verdict.error.is_empty());
    assert_eq!(report.round_trips, 0);
}
