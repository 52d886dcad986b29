use crate::ExitCode;
use crate::builtin;
use crate::env::Environment;
use crate::executor;
use crate::parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use std::path::PathBuf;

/// Status reported for a line that could not be parsed.
pub const PARSE_ERROR_STATUS: ExitCode = 2;

/// Front-end settings, filled from the command line.
#[derive(Debug, Clone)]
pub struct Options {
    /// Print the parsed structure of every line before running it.
    pub print_parse: bool,
    pub prompt: String,
    /// Where line history is loaded from and saved to.
    pub history: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            print_parse: false,
            prompt: "> ".to_string(),
            history: None,
        }
    }
}

/// The read-parse-execute loop.
///
/// Each line is parsed into a [`Pipeline`](crate::pipeline::Pipeline). A line that
/// consists of a single builtin runs in-process; anything else is handed to
/// [`executor::run_with_status`], which blocks until the pipeline has finished.
///
/// Example
/// ```no_run
/// use pipesh::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.execute_line("echo hello | tr a-z A-Z").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    options: Options,
}

impl Interpreter {
    pub fn new(options: Options) -> Self {
        Self {
            env: Environment::new(),
            options,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run one line against the process's real stdout/stderr.
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<ExitCode> {
        self.execute_line_with_output(line, &mut std::io::stdout(), &mut std::io::stderr())
    }

    /// Run one line, writing the shell's own messages to the given streams.
    ///
    /// Pipeline stages always inherit the process's standard streams.
    pub fn execute_line_with_output(
        &mut self,
        line: &str,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> anyhow::Result<ExitCode> {
        let pipeline = match parser::parse_line(line.trim()) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => return Ok(0),
            Err(e) => {
                writeln!(stderr, "pipesh: parse error: {}", e)?;
                self.env.last_status = PARSE_ERROR_STATUS;
                return Ok(PARSE_ERROR_STATUS);
            }
        };

        if self.options.print_parse {
            writeln!(stdout, "{}", pipeline)?;
            stdout.flush()?;
        }

        if let Err(e) = pipeline.validate() {
            writeln!(stderr, "pipesh: {}", e)?;
            self.env.last_status = PARSE_ERROR_STATUS;
            return Ok(PARSE_ERROR_STATUS);
        }

        if pipeline.has_unsupported_features() {
            tracing::warn!(
                stdin = ?pipeline.stdin_path,
                stdout = ?pipeline.stdout_path,
                background = pipeline.background,
                "redirections and background execution are not supported; running in the foreground without them"
            );
        }

        if let Some(stage) = pipeline.sole_stage() {
            if let Some(code) = builtin::try_run(stage, &mut self.env, stderr) {
                self.env.last_status = code;
                return Ok(code);
            }
        } else if let Some(stage) = pipeline.stages().find(|s| builtin::is_builtin(s.program())) {
            tracing::warn!(
                builtin = stage.program(),
                "builtins only work as a standalone command"
            );
        }

        tracing::debug!(stages = pipeline.len(), "running pipeline");
        let code = match executor::run_with_status(pipeline.head()) {
            Ok(completion) => completion.code(),
            Err(e) => {
                writeln!(stderr, "pipesh: {}", e)?;
                1
            }
        };
        self.env.last_status = code;
        Ok(code)
    }

    /// Interactive loop with line editing and history.
    ///
    /// Ends on `exit` or end of input and returns the status the shell should exit with.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        if let Some(path) = &self.options.history {
            if let Err(err) = rl.load_history(path) {
                tracing::debug!(path = %path.display(), %err, "no history loaded");
            }
        }

        while !self.env.should_exit {
            match rl.readline(&self.options.prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.execute_line(&line)?;
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(path) = &self.options.history {
            if let Err(err) = rl.save_history(path) {
                tracing::warn!(path = %path.display(), %err, "failed to save history");
            }
        }
        Ok(self.env.last_status)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Options::default())
    }
}
