use argh::FromArgs;
use pipesh::{Interpreter, Options};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// A small interactive shell that runs pipelines of external programs.
struct Args {
    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status
    command: Option<String>,

    #[argh(switch)]
    /// print the parsed structure of each line before running it
    print_parse: bool,

    #[argh(option, default = "String::from(\"> \")")]
    /// prompt shown before each line
    prompt: String,

    #[argh(option)]
    /// file to load line history from and save it to
    history: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pipesh=warn")),
        )
        .init();

    let args: Args = argh::from_env();
    let mut sh = Interpreter::new(Options {
        print_parse: args.print_parse,
        prompt: args.prompt,
        history: args.history,
    });

    let code = match args.command {
        Some(line) => sh.execute_line(&line)?,
        None => sh.repl()?,
    };
    std::process::exit(code)
}
