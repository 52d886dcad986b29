//! End-to-end tests: run the `pipesh` binary in one-shot mode and observe what the
//! pipeline stages write to the inherited standard streams.

use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

const TIMEOUT: Duration = Duration::from_secs(20);

struct Outcome {
    pid: u32,
    status: i32,
    stdout: Vec<u8>,
    stderr: String,
}

impl Outcome {
    fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Run `pipesh -c LINE`, failing the test instead of hanging if it never finishes.
fn pipesh(args: &[&str]) -> Outcome {
    let stdout = NamedTempFile::new().expect("stdout file");
    let stderr = NamedTempFile::new().expect("stderr file");

    let mut child = Command::new(env!("CARGO_BIN_EXE_pipesh"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout.reopen().unwrap()))
        .stderr(Stdio::from(stderr.reopen().unwrap()))
        .spawn()
        .expect("spawn pipesh");
    let pid = child.id();

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if started.elapsed() > TIMEOUT {
            let _ = child.kill();
            panic!("pipesh {:?} did not finish (pipe end left open?)", args);
        }
        thread::sleep(Duration::from_millis(10));
    };

    Outcome {
        pid,
        status: status.code().expect("pipesh exited normally"),
        stdout: fs::read(stdout.path()).unwrap(),
        stderr: fs::read_to_string(stderr.path()).unwrap(),
    }
}

fn run_line(line: &str) -> Outcome {
    pipesh(&["-c", line])
}

fn wait_for_file(path: &std::path::Path) -> bool {
    let started = Instant::now();
    while started.elapsed() < TIMEOUT {
        if fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_echo_into_cat() {
    let out = run_line("echo hello | cat");
    assert_eq!(out.status, 0);
    assert_eq!(out.stdout_str(), "hello\n");
    assert_eq!(out.stderr, "");
}

#[test]
fn test_three_stages_flow_left_to_right() {
    let out = run_line(r"printf 'b\na\nc\n' | tr a-z A-Z | sort");
    assert_eq!(out.status, 0);
    assert_eq!(out.stdout_str(), "A\nB\nC\n");
}

#[test]
fn test_bytes_arrive_unchanged() {
    let mut input = NamedTempFile::new().unwrap();
    let data: Vec<u8> = (0..300_000u32).map(|i| (i * 7 % 251) as u8).collect();
    input.write_all(&data).unwrap();
    input.flush().unwrap();

    let line = format!("cat {} | cat | cat", input.path().display());
    let out = run_line(&line);
    assert_eq!(out.status, 0);
    assert_eq!(out.stdout.len(), data.len());
    assert!(out.stdout == data, "pipeline altered the byte stream");
}

#[test]
fn test_more_than_a_pipe_buffer_is_not_dropped() {
    let out = run_line("head -c 1000000 /dev/zero | cat | wc -c");
    assert_eq!(out.status, 0);
    assert_eq!(out.stdout_str().trim(), "1000000");
}

#[test]
fn test_writer_blocks_while_reader_never_reads() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("writer-finished");
    let line = format!(
        "sh -c 'head -c 1000000 /dev/zero && echo done > {}' | sleep 1",
        marker.display()
    );

    let started = Instant::now();
    let out = run_line(&line);
    assert_eq!(out.status, 0, "status comes from the last stage (sleep)");
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert!(out.stdout.is_empty());
    // the writer stayed blocked on the full pipe until `sleep` exited, then got SIGPIPE
    assert!(!marker.exists(), "writer got past a pipe nobody reads");
}

#[test]
fn test_downstream_sees_end_of_input() {
    let out = run_line("echo x | cat | cat | wc -l");
    assert_eq!(out.status, 0);
    assert_eq!(out.stdout_str().trim(), "1");
}

#[test]
fn test_single_stage_failure_is_not_a_shell_error() {
    let out = run_line("false");
    assert_eq!(out.status, 1);
    assert!(out.stdout.is_empty());
    assert_eq!(out.stderr, "");
}

#[test]
fn test_status_comes_from_last_typed_stage() {
    assert_eq!(run_line("true | false").status, 1);
    assert_eq!(run_line("false | true").status, 0);
    assert_eq!(run_line("true | sh -c 'exit 7'").status, 7);
}

#[test]
fn test_missing_program_reports_on_stderr() {
    let out = run_line("pipesh-nonexistent-cmd --flag");
    assert_eq!(out.status, 127);
    assert!(out.stdout.is_empty());
    assert!(
        out.stderr
            .contains("pipesh: pipesh-nonexistent-cmd: command not found"),
        "stderr was {:?}",
        out.stderr
    );
}

#[test]
fn test_missing_middle_stage_is_isolated() {
    let marker = tempfile::tempdir().unwrap();
    let done = marker.path().join("first-stage-done");
    let line = format!(
        "sh -c 'echo ok > {}; echo data' | pipesh-nonexistent-middle | cat",
        done.display()
    );

    let out = run_line(&line);
    assert_eq!(out.status, 0, "status comes from the last stage (cat)");
    assert!(out.stdout.is_empty());
    assert!(out.stderr.contains("pipesh-nonexistent-middle: command not found"));
    assert!(wait_for_file(&done), "first stage never completed");
}

#[test]
fn test_writer_is_stopped_by_closed_reader() {
    // `yes` only terminates through SIGPIPE once `head` has exited
    let out = run_line("yes | head -n 2");
    assert_eq!(out.status, 0);
    assert_eq!(out.stdout_str(), "y\ny\n");
    assert_eq!(out.stderr, "");
}

#[test]
fn test_one_process_per_stage() {
    let stage = "sh -c 'echo $$ >&2; cat'";
    let line = format!("{stage} | {stage} | {stage}");
    let out = run_line(&line);
    assert_eq!(out.status, 0);

    let mut pids: Vec<u32> = out
        .stderr
        .lines()
        .map(|l| l.trim().parse().expect("pid line"))
        .collect();
    pids.sort();
    pids.dedup();
    assert_eq!(pids.len(), 3);
    assert!(!pids.contains(&out.pid), "the shell itself must not run a stage");
}

#[test]
fn test_shell_waits_on_last_typed_stage() {
    let out = run_line("true | sh -c 'echo $PPID'");
    assert_eq!(out.status, 0);
    assert_eq!(out.stdout_str().trim(), out.pid.to_string());

    let out = run_line("sh -c 'echo $PPID'");
    assert_eq!(out.stdout_str().trim(), out.pid.to_string());
}

#[test]
fn test_redirection_is_reported_and_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("never-written");
    let out = run_line(&format!("echo hi > {}", target.display()));
    assert_eq!(out.status, 0);
    assert_eq!(out.stdout_str(), "hi\n");
    assert!(out.stderr.contains("not supported"));
    assert!(!target.exists());
}

#[test]
fn test_print_parse_shows_typed_order() {
    let out = pipesh(&["--print-parse", "-c", "exit"]);
    assert_eq!(out.status, 0);
    assert!(out.stdout_str().starts_with("------------------------------\nParse OK\n"));
    assert!(out.stdout_str().contains("Pgms:\n            * [ exit ]\n"));

    let out = pipesh(&["--print-parse", "-c", "echo a | tr a b"]);
    let printed = out.stdout_str();
    let first = printed.find("* [ echo a ]").expect("echo printed");
    let second = printed.find("* [ tr a b ]").expect("tr printed");
    assert!(first < second);
    assert!(printed.ends_with("b\n"));
}

#[test]
fn test_parse_error_status() {
    let out = run_line("| cat");
    assert_eq!(out.status, 2);
    assert!(out.stderr.contains("parse error"));
}

#[test]
fn test_exit_status_argument() {
    let out = run_line("exit 3");
    assert_eq!(out.status, 3);
}
