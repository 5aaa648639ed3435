use argh::FromArgs;
use promptsh::config::Args;
use promptsh::io_adapters::{EditorInput, LineSource, StreamInput};
use promptsh::session::status;
use promptsh::{ExecError, Interpreter, LoopExit, Session, Shell, ShellConfig, TerminationEvent, Transcript};
use std::io::{self, IsTerminal, Write};
use std::process;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

fn main() {
    let (config, log_level) = parse_args();
    init_tracing(log_level.as_deref());
    debug!(?config, "starting");

    let transcript = match Transcript::open(&config.history_path) {
        Ok(transcript) => Arc::new(transcript),
        Err(e) => {
            eprintln!("Error on opening of {}: {e}", config.history_path.display());
            process::exit(status::LOG_OPEN_FAILURE);
        }
    };

    let session = match Session::install(transcript.clone(), config.idle_timeout) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error on setting up the session: {e}");
            let _ = transcript.finalize();
            process::exit(status::SESSION_SETUP_FAILURE);
        }
    };

    let mut input: Box<dyn LineSource> = if io::stdin().is_terminal() {
        match EditorInput::new() {
            Ok(editor) => Box::new(editor),
            Err(e) => {
                eprintln!("Error on setting up the line editor: {e}");
                session.shutdown(status::SESSION_SETUP_FAILURE);
            }
        }
    } else {
        Box::new(StreamInput::stdio())
    };

    let mut shell = Shell::new(config, transcript, Interpreter::default());
    match shell.run(input.as_mut()) {
        Ok(LoopExit::Exit) => session.shutdown(status::NORMAL),
        Ok(LoopExit::EndOfInput) => {
            let _ = writeln!(io::stdout());
            session.shutdown(status::NORMAL)
        }
        Ok(LoopExit::Interrupted) => session.terminate(TerminationEvent::UserInterrupt),
        Err(e) if e.downcast_ref::<ExecError>().is_some() => {
            error!("{e:#}");
            let _ = writeln!(io::stderr(), "Error with parent process.\nExiting...");
            session.shutdown(status::RESOURCE_FAILURE)
        }
        Err(e) => {
            let _ = writeln!(io::stderr(), "{e:#}");
            session.shutdown(status::INPUT_FAILURE)
        }
    }
}

/// Parse the command line. `--help` exits 0, bad usage exits 64.
fn parse_args() -> (ShellConfig, Option<String>) {
    let argv: Vec<String> = std::env::args().collect();
    let command = argv.first().map(String::as_str).unwrap_or("promptsh");
    let rest: Vec<&str> = argv.iter().skip(1).map(String::as_str).collect();

    let args = match Args::from_args(&[command], &rest) {
        Ok(args) => args,
        Err(argh::EarlyExit { output, status: outcome }) => match outcome {
            Ok(()) => {
                println!("{output}");
                process::exit(status::NORMAL);
            }
            Err(()) => {
                eprintln!("{output}");
                process::exit(status::USAGE);
            }
        },
    };
    let log_level = args.log_level.clone();
    match ShellConfig::try_from(args) {
        Ok(config) => (config, log_level),
        Err(message) => {
            eprintln!("{command}: {message}");
            process::exit(status::USAGE);
        }
    }
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
