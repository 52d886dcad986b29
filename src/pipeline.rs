//! In-memory model of one parsed command line.
//!
//! A [`Pipeline`] owns a singly linked chain of [`Stage`]s. The chain runs from the
//! **last** command typed (the head) to the **first** command typed (the tail): for
//! `a | b | c` the head is `c`, `c.next` is `b` and `b.next` is `a`. The parser builds
//! the chain in this order by pushing every newly parsed stage onto the front, and the
//! executor's recursion relies on it to wire stdin/stdout in the right direction.

use std::fmt;
use std::path::PathBuf;

/// One command of a pipeline: a program name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    argv: Vec<String>,
    next: Option<Box<Stage>>,
}

impl Stage {
    /// Create a detached stage from its argument vector (`argv[0]` is the program).
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv, next: None }
    }

    /// The whole argument vector, program name included.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The program name, or an empty string for a (malformed) empty vector.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// Arguments following the program name.
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    /// The stage typed immediately before this one, if any.
    pub fn next(&self) -> Option<&Stage> {
        self.next.as_deref()
    }

    /// Iterate over this stage and everything after it in the chain.
    pub fn chain(&self) -> Stages<'_> {
        Stages {
            current: Some(self),
        }
    }
}

/// Iterator over a stage chain, head to tail (last-typed to first-typed).
pub struct Stages<'a> {
    current: Option<&'a Stage>,
}

impl<'a> Iterator for Stages<'a> {
    type Item = &'a Stage;

    fn next(&mut self) -> Option<Self::Item> {
        let stage = self.current?;
        self.current = stage.next();
        Some(stage)
    }
}

/// Structural problems in a pipeline that would make it impossible to execute.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("pipeline has no commands")]
    EmptyPipeline,
    #[error("command {position} has no program name")]
    EmptyProgram { position: usize },
    #[error("argument {arg:?} of command {position} contains a NUL byte")]
    InteriorNul { position: usize, arg: String },
}

/// A full command line: the stage chain plus line-level metadata.
///
/// Redirection targets and the background flag are recorded but not acted upon
/// by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    head: Box<Stage>,
    /// Path given with `<`.
    pub stdin_path: Option<PathBuf>,
    /// Path given with `>`.
    pub stdout_path: Option<PathBuf>,
    /// Destination for standard error. The grammar has no syntax for it yet.
    pub stderr_path: Option<PathBuf>,
    /// Set when the line ends with `&`.
    pub background: bool,
}

impl Pipeline {
    /// Start a pipeline from its first-typed command.
    pub fn new(first: Vec<String>) -> Self {
        Self {
            head: Box::new(Stage::new(first)),
            stdin_path: None,
            stdout_path: None,
            stderr_path: None,
            background: false,
        }
    }

    /// Build a pipeline from argument vectors listed in the order they were typed.
    pub fn from_typed_order<I>(stages: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut stages = stages.into_iter();
        let first = stages.next().ok_or(ModelError::EmptyPipeline)?;
        let mut pipeline = Self::new(first);
        for argv in stages {
            pipeline.push_typed(argv);
        }
        Ok(pipeline)
    }

    /// Append a command typed after every existing one. It becomes the new head.
    pub fn push_typed(&mut self, argv: Vec<String>) {
        let previous = std::mem::replace(&mut self.head, Box::new(Stage::new(argv)));
        self.head.next = Some(previous);
    }

    /// The last-typed stage; the entry point handed to the executor.
    pub fn head(&self) -> &Stage {
        &self.head
    }

    /// Stages from head to tail (last-typed first).
    pub fn stages(&self) -> Stages<'_> {
        self.head.chain()
    }

    /// Stages in the order they were typed (first-typed first).
    pub fn typed_order(&self) -> Vec<&Stage> {
        let mut stages: Vec<&Stage> = self.stages().collect();
        stages.reverse();
        stages
    }

    pub fn len(&self) -> usize {
        self.stages().count()
    }

    /// Always false; a pipeline holds at least one stage.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The only stage of a single-command line.
    pub fn sole_stage(&self) -> Option<&Stage> {
        match self.head.next {
            None => Some(&self.head),
            Some(_) => None,
        }
    }

    /// Whether any redirection or the background flag was given.
    pub fn has_unsupported_features(&self) -> bool {
        self.stdin_path.is_some()
            || self.stdout_path.is_some()
            || self.stderr_path.is_some()
            || self.background
    }

    /// Check that every stage can be turned into an `execvp` call.
    ///
    /// Positions in errors are 1-based and count in typed order.
    pub fn validate(&self) -> Result<(), ModelError> {
        for (index, stage) in self.typed_order().into_iter().enumerate() {
            let position = index + 1;
            if stage.program().is_empty() {
                return Err(ModelError::EmptyProgram { position });
            }
            if let Some(arg) = stage.argv().iter().find(|arg| arg.contains('\0')) {
                return Err(ModelError::InteriorNul {
                    position,
                    arg: arg.clone(),
                });
            }
        }
        Ok(())
    }
}

fn path_or_none(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<none>".to_string())
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "------------------------------")?;
        writeln!(f, "Parse OK")?;
        writeln!(f, "stdin:      {}", path_or_none(&self.stdin_path))?;
        writeln!(f, "stdout:     {}", path_or_none(&self.stdout_path))?;
        writeln!(f, "stderr:     {}", path_or_none(&self.stderr_path))?;
        writeln!(f, "background: {}", self.background)?;
        writeln!(f, "Pgms:")?;
        for stage in self.typed_order() {
            write!(f, "            * [ ")?;
            for arg in stage.argv() {
                write!(f, "{} ", arg)?;
            }
            writeln!(f, "]")?;
        }
        write!(f, "------------------------------")
    }
}
