use crate::ExitCode;
use crate::env::Environment;
use crate::pipeline::Stage;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process. They are only recognized when they are the sole command on a line;
/// inside a pipeline the name is handed to the executor like any other program.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd".
    fn name() -> &'static str;

    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(self, env: &mut Environment) -> Result<ExitCode>;
}

type Dispatch = fn(&Stage, &mut Environment, &mut dyn Write) -> Option<ExitCode>;

const BUILTINS: [(&str, Dispatch); 3] = [
    ("exit", run_as::<Exit>),
    ("cd", run_as::<Cd>),
    ("..", run_as::<ParentDir>),
];

/// Whether `name` would be handled in-process when typed alone.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|(builtin, _)| *builtin == name)
}

/// Run `stage` as a builtin if its program names one.
///
/// Returns `None` when the stage is not a builtin. Diagnostics (errors, `--help`
/// output) are written to `diagnostics`.
pub fn try_run(
    stage: &Stage,
    env: &mut Environment,
    diagnostics: &mut dyn Write,
) -> Option<ExitCode> {
    BUILTINS
        .iter()
        .find(|(name, _)| *name == stage.program())
        .and_then(|(_, dispatch)| dispatch(stage, env, diagnostics))
}

fn run_as<T: BuiltinCommand>(
    stage: &Stage,
    env: &mut Environment,
    diagnostics: &mut dyn Write,
) -> Option<ExitCode> {
    if stage.program() != T::name() {
        return None;
    }
    let args: Vec<&str> = stage.args().iter().map(String::as_str).collect();
    let code = match T::from_args(&[T::name()], &args) {
        Ok(cmd) => match cmd.execute(env) {
            Ok(code) => code,
            Err(e) => {
                let _ = writeln!(diagnostics, "{:#}", e);
                1
            }
        },
        Err(EarlyExit { output, status }) => {
            let _ = writeln!(diagnostics, "{}", output.trim_end());
            if status.is_ok() { 0 } else { 1 }
        }
    };
    Some(code)
}

#[derive(FromArgs)]
/// Leave the shell.
pub struct Exit {
    #[argh(positional)]
    /// status to exit with; defaults to 0.
    pub status: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, env: &mut Environment) -> Result<ExitCode> {
        let status = self.status.unwrap_or(0);
        env.request_exit(status);
        Ok(status)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, env: &mut Environment) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => bail!("cd: missing argument"),
        };
        change_dir(env, target)
    }
}

#[derive(FromArgs)]
/// Go to the parent directory (same as `cd ..`).
pub struct ParentDir {}

impl BuiltinCommand for ParentDir {
    fn name() -> &'static str {
        ".."
    }

    fn execute(self, env: &mut Environment) -> Result<ExitCode> {
        change_dir(env, PathBuf::from(".."))
    }
}

fn change_dir(env: &mut Environment, target: PathBuf) -> Result<ExitCode> {
    let new_dir = if target.is_absolute() {
        target
    } else {
        env.current_dir.join(target)
    };

    let canonical = fs::canonicalize(&new_dir)
        .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

    env::set_current_dir(&canonical)
        .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
    tracing::debug!(dir = %canonical.display(), "changed directory");
    env.current_dir = canonical;
    Ok(0)
}
