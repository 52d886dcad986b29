//! Turns a [`Stage`] chain into a tree of processes connected by pipes.
//!
//! The shell forks a single child that owns the whole pipeline and waits only for it.
//! Inside that child the chain is built recursively: every level creates one pipe and
//! forks once. The parent side of the fork reads from the pipe and becomes the current
//! (later-typed) stage; the child side writes into the pipe and keeps building the
//! earlier-typed remainder. Because the chain head is the last command typed, data
//! flows left to right exactly as written on the command line.

use crate::pipeline::Stage;
use nix::errno::Errno;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, dup2, execvp, fork, pipe};
use std::ffi::CString;
use std::io::Write;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

/// Exit status of a pipeline process whose program could not be executed.
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// Exit status of a pipeline process that failed while wiring the chain.
pub const BUILD_FAILURE_STATUS: i32 = 1;

const STDIN_FILENO: RawFd = 0;
const STDOUT_FILENO: RawFd = 1;

/// The pipeline could not be started (or, for [`run_with_status`], waited for).
///
/// Failures that happen after the top-level fork never show up here; they are
/// reported on standard error by the process that hit them.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("cannot start pipeline: fork: {0}")]
    Fork(#[source] Errno),
    #[error("command {position} has no program name")]
    EmptyCommand { position: usize },
    #[error("{program}: argument {arg:?} contains a NUL byte")]
    InvalidArgument { program: String, arg: String },
    #[error("waiting for pipeline failed: {0}")]
    Wait(#[source] Errno),
}

/// A stage program could not replace the process image.
#[derive(Debug, thiserror::Error)]
#[error("{program}: {}", describe_exec_errno(.errno))]
pub struct ExecError {
    pub program: String,
    pub errno: Errno,
}

fn describe_exec_errno(errno: &Errno) -> String {
    match *errno {
        Errno::ENOENT => "command not found".to_string(),
        other => other.desc().to_string(),
    }
}

/// Resource failures while building the chain inside the pipeline subtree.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("pipe: {0}")]
    Pipe(#[source] Errno),
    #[error("fork: {0}")]
    Fork(#[source] Errno),
    #[error("dup2: {0}")]
    Redirect(#[source] Errno),
}

/// How the process owning the pipeline terminated.
///
/// That process ends up running the last-typed stage, so this is the status of
/// the rightmost command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Exited(i32),
    Signaled(Signal),
}

impl Completion {
    /// Shell-style status code: the exit code, or `128 + signal number`.
    pub fn code(&self) -> i32 {
        match self {
            Completion::Exited(code) => *code,
            Completion::Signaled(signal) => 128 + *signal as i32,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Completion::Exited(0))
    }
}

/// A stage converted to the NUL-terminated strings `execvp` needs.
#[derive(Debug)]
struct Invocation {
    argv: Vec<CString>,
}

impl Invocation {
    fn prepare(stage: &Stage, position: usize) -> Result<Self, SpawnError> {
        if stage.program().is_empty() {
            return Err(SpawnError::EmptyCommand { position });
        }
        let argv = stage
            .argv()
            .iter()
            .map(|arg| {
                CString::new(arg.as_str()).map_err(|_| SpawnError::InvalidArgument {
                    program: stage.program().to_string(),
                    arg: arg.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { argv })
    }

    fn program(&self) -> String {
        self.argv[0].to_string_lossy().into_owned()
    }

    /// Replace the current process image with this program.
    ///
    /// Only returns when `execvp` fails.
    fn replace_image(&self) -> ExecError {
        match execvp(&self.argv[0], &self.argv) {
            Ok(never) => match never {},
            Err(errno) => ExecError {
                program: self.program(),
                errno,
            },
        }
    }
}

/// Convert a chain to invocations, keeping chain order (head first).
fn prepare_chain(chain: &Stage) -> Result<Vec<Invocation>, SpawnError> {
    let length = chain.chain().count();
    chain
        .chain()
        .enumerate()
        // positions are reported in typed order
        .map(|(index, stage)| Invocation::prepare(stage, length - index))
        .collect()
}

/// Run a pipeline to completion.
///
/// Forks one child that builds and owns the whole pipeline and blocks until it
/// exits. The stage's exit status is not part of the result; only a failure to
/// start the pipeline is.
pub fn run(chain: &Stage) -> Result<(), SpawnError> {
    discard_status(run_with_status(chain))
}

fn discard_status(outcome: Result<Completion, SpawnError>) -> Result<(), SpawnError> {
    match outcome {
        Ok(completion) => tracing::debug!(?completion, "pipeline finished"),
        // the pipeline already ran, only its status is lost
        Err(SpawnError::Wait(errno)) => {
            tracing::warn!(%errno, "could not collect pipeline status")
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

/// Like [`run`], but also report how the pipeline terminated.
pub fn run_with_status(chain: &Stage) -> Result<Completion, SpawnError> {
    let invocations = prepare_chain(chain)?;
    let Some((head, earlier)) = invocations.split_first() else {
        return Err(SpawnError::EmptyCommand { position: 1 });
    };

    // anything still buffered would otherwise be written twice
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            tracing::debug!(pid = %child, stages = invocations.len(), "spawned pipeline");
            wait_for(child)
        }
        Ok(ForkResult::Child) => {
            restore_default_sigpipe();
            build_chain(head, earlier)
        }
        Err(errno) => Err(SpawnError::Fork(errno)),
    }
}

/// The Rust runtime ignores SIGPIPE and `execvp` would pass that on to every stage.
fn restore_default_sigpipe() {
    // SAFETY: installs the default disposition, no handler code is involved.
    if let Err(errno) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) } {
        tracing::debug!(%errno, "could not restore SIGPIPE");
    }
}

fn wait_for(child: Pid) -> Result<Completion, SpawnError> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(Completion::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(Completion::Signaled(signal)),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(errno) => return Err(SpawnError::Wait(errno)),
        }
    }
}

/// Build the process chain for `stage` and everything typed before it.
///
/// `earlier` holds the rest of the chain in chain order, so `earlier[0]` is
/// `stage.next`. Never returns: every path ends in `execvp` or `exit`.
fn build_chain(stage: &Invocation, earlier: &[Invocation]) -> ! {
    let Some((next, remaining)) = earlier.split_first() else {
        exit_exec_failure(stage.replace_image())
    };

    let (read_end, write_end) = match pipe() {
        Ok(ends) => ends,
        Err(errno) => exit_build_failure(BuildError::Pipe(errno)),
    };

    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => {
            drop(write_end);
            if let Err(err) = redirect(read_end, STDIN_FILENO) {
                exit_build_failure(err);
            }
            exit_exec_failure(stage.replace_image())
        }
        Ok(ForkResult::Child) => {
            drop(read_end);
            if let Err(err) = redirect(write_end, STDOUT_FILENO) {
                exit_build_failure(err);
            }
            build_chain(next, remaining)
        }
        Err(errno) => exit_build_failure(BuildError::Fork(errno)),
    }
}

/// Move `fd` onto the `target` slot, consuming it.
///
/// The original descriptor is closed on every path unless it already is `target`.
fn redirect(fd: OwnedFd, target: RawFd) -> Result<(), BuildError> {
    if fd.as_raw_fd() == target {
        let _ = fd.into_raw_fd();
        return Ok(());
    }
    let result = dup2(fd.as_raw_fd(), target);
    drop(fd);
    result.map(drop).map_err(BuildError::Redirect)
}

fn exit_exec_failure(err: ExecError) -> ! {
    eprintln!("pipesh: {}", err);
    std::process::exit(EXEC_FAILURE_STATUS)
}

fn exit_build_failure(err: BuildError) -> ! {
    eprintln!("pipesh: {}", err);
    std::process::exit(BUILD_FAILURE_STATUS)
}
