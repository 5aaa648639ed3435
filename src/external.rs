use crate::command::{Action, CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use nix::errno::Errno;
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;
use tracing::debug;

/// Failure to run an external command.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The program could not be started: unknown name, permission denied, bad binary.
    #[error("{command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// The operating system could not create another process at all.
    #[error("cannot create a process for {command}: {source}")]
    Resources {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for {command}: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl ExecError {
    /// Whether the shell itself can no longer work after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecError::Resources { .. })
    }
}

/// How a finished child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit status, or `128 + signal` when the child was killed by a signal.
    pub code: ExitCode,
    pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitOutcome { code, signal: None },
            None => ExitOutcome {
                code: terminated_by_signal(status),
                signal: status.signal(),
            },
        }
    }
}

/// Directories searched when PATH is unset, matching `execvp`.
pub const DEFAULT_SEARCH_PATH: &str = "/bin:/usr/bin";

/// Command that is not a builtin.
pub struct ExternalCommand {
    name: String,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(name: impl Into<String>, args: Vec<OsString>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Start the program in a child process and block until it terminates.
    ///
    /// The child's argv[0] is the name exactly as typed, followed by the arguments.
    /// Standard streams are inherited from the shell.
    pub fn run(&self, env: &Environment) -> Result<ExitOutcome, ExecError> {
        let search_paths = env.get_var("PATH").unwrap_or(DEFAULT_SEARCH_PATH);
        let program = find_command_path(
            OsStr::new(search_paths),
            &env.current_dir,
            Path::new(&self.name),
        )
        .ok_or_else(|| ExecError::Spawn {
            command: self.name.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, "command not found"),
        })?;

        let mut child = std::process::Command::new(&program)
            .arg0(&self.name)
            .args(&self.args)
            .env_clear()
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir)
            .spawn()
            .map_err(|source| classify_spawn_error(&self.name, source))?;
        debug!(pid = child.id(), program = %program.display(), "spawned child");

        let status = child.wait().map_err(|source| ExecError::Wait {
            command: self.name.clone(),
            source,
        })?;
        let outcome = ExitOutcome::from(status);
        debug!(code = outcome.code, signal = ?outcome.signal, "child finished");
        Ok(outcome)
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    /// Accepts every name; resolution failures surface when the command runs.
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        Some(Box::new(ExternalCommand::new(
            name,
            args.iter().map(OsString::from).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(self: Box<Self>, env: &mut Environment) -> anyhow::Result<Action> {
        let outcome = self.run(env)?;
        Ok(Action::Completed(outcome.code))
    }
}

fn classify_spawn_error(command: &str, source: io::Error) -> ExecError {
    let command = command.to_owned();
    match source.raw_os_error().map(Errno::from_raw) {
        Some(Errno::EAGAIN | Errno::ENOMEM) => ExecError::Resources { command, source },
        _ => ExecError::Spawn { command, source },
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

/// Resolve a command path the way `execvp` would.
///
/// Behavior:
/// - Absolute path: returned if it is a file.
/// - Any path with a separator (`./foo`, `bin/sh`): resolved against `cwd`, returned
///   if it is a file.
/// - Single component: each directory of `search_paths` (PATH) is searched in order and
///   the first executable file wins.
/// - Empty path: `None`.
pub fn find_command_path(search_paths: &OsStr, cwd: &Path, path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if path.is_absolute() {
        return find_by_path(path.to_path_buf());
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(_), None) if !path.starts_with(".") => find_in_path(search_paths, path.as_os_str()),
        _ => find_by_path(cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable_file(candidate))
}

fn find_by_path(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() { Some(path) } else { None }
}

fn is_executable_file(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs::{self, File};

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn env_in(dir: &Path) -> Environment {
        let mut env = Environment {
            vars: HashMap::new(),
            current_dir: dir.to_path_buf(),
        };
        env.set_var("PATH", std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into()));
        env
    }

    fn make_script(path: &Path, body: &str) {
        fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn absolute_existing() {
        let res = find_command_path(osstr("/nowhere"), Path::new("/"), Path::new("/bin/sh"));
        assert_eq!(res.as_deref(), Some(Path::new("/bin/sh")));
    }

    #[test]
    fn absolute_nonexisting() {
        let res = find_command_path(osstr("/bin"), Path::new("/"), Path::new("/bin/nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nowhere:/bin"), Path::new("/"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found, Path::new("/bin/sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("/"), Path::new("nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    fn path_search_skips_non_executable_files() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        File::create(first.path().join("tool")).unwrap();
        make_script(&second.path().join("tool"), "exit 0");

        let paths = std::env::join_paths([first.path(), second.path()]).unwrap();
        let found = find_command_path(&paths, Path::new("/"), Path::new("tool")).unwrap();
        assert_eq!(found, second.path().join("tool"));
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        File::create(dir.path().join("bin").join("sh")).unwrap();
        File::create(dir.path().join("foo")).unwrap();

        let nested = find_command_path(osstr("/bin"), dir.path(), Path::new("bin/sh")).unwrap();
        assert_eq!(nested, dir.path().join("bin/sh"));

        let dotted = find_command_path(osstr("/bin"), dir.path(), Path::new("./foo")).unwrap();
        assert_eq!(dotted, dir.path().join("./foo"));
    }

    #[test]
    fn directories_are_not_commands() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        assert!(find_command_path(osstr("/bin"), dir.path(), Path::new("./sub")).is_none());
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new("/"), Path::new("")).is_none());
    }

    #[test]
    fn run_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        let outcome = ExternalCommand::new("sh", vec!["-c".into(), "exit 7".into()])
            .run(&env)
            .unwrap();
        assert_eq!(outcome, ExitOutcome { code: 7, signal: None });
    }

    #[test]
    fn run_without_path_uses_default_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment {
            vars: HashMap::new(),
            current_dir: dir.path().to_path_buf(),
        };
        let outcome = ExternalCommand::new("sh", vec!["-c".into(), "exit 3".into()])
            .run(&env)
            .unwrap();
        assert_eq!(outcome.code, 3);
    }

    #[test]
    fn run_reports_signal_death() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        let outcome = ExternalCommand::new("sh", vec!["-c".into(), "kill -TERM $$".into()])
            .run(&env)
            .unwrap();
        assert_eq!(outcome.signal, Some(15));
        assert_eq!(outcome.code, 128 + 15);
    }

    #[test]
    fn run_passes_arguments_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        make_script(&dir.path().join("record"), "echo \"$1 $2\" > out.txt");

        ExternalCommand::new("./record", vec!["one".into(), "two".into()])
            .run(&env)
            .unwrap();

        let out = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out, "one two\n");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn run_keeps_typed_name_as_argv0() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        let script = "tr '\\000' ' ' < /proc/$$/cmdline > cmdline.txt";

        ExternalCommand::new("sh", vec!["-c".into(), script.into()])
            .run(&env)
            .unwrap();

        let cmdline = fs::read_to_string(dir.path().join("cmdline.txt")).unwrap();
        assert!(cmdline.starts_with("sh -c "), "argv was {cmdline:?}");
    }

    #[test]
    fn run_unknown_command_is_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        let err = ExternalCommand::new("nosuchcommand123", vec![])
            .run(&env)
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "nosuchcommand123: command not found");
    }

    #[test]
    fn run_non_executable_is_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        File::create(dir.path().join("plain")).unwrap();

        let err = ExternalCommand::new("./plain", vec![]).run(&env).unwrap_err();
        match err {
            ExecError::Spawn { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn resource_errors_are_fatal() {
        let err = classify_spawn_error("ls", io::Error::from_raw_os_error(Errno::EAGAIN as i32));
        assert!(err.is_fatal());
        let err = classify_spawn_error("ls", io::Error::from_raw_os_error(Errno::ENOENT as i32));
        assert!(!err.is_fatal());
    }
}
