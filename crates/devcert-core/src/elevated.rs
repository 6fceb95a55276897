//! Synchronous external command execution.
//!
//! Every call blocks until the child exits. There is no timeout and no
//! cancellation: a consent dialog left open by the operator keeps the call
//! waiting. Nothing is retried and no credentials are cached.

use std::process::{
    Command,
    Output,
};

use log::debug;

use crate::error::{
    DevCertError,
    Result,
};

/// Exit status and captured output of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.join(" ")
    }

    fn from_output(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: split_lines(&output.stdout),
            stderr: split_lines(&output.stderr),
        }
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

pub trait CommandRunner {
    /// Runs `program` with the caller's own privileges.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Runs `argv` with elevated privileges where the host needs an explicit
    /// escalation prompt for it.
    fn run_elevated(&self, argv: &[&str]) -> Result<CommandOutput>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!("Running: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| DevCertError::Command {
                command: format!("{} {}", program, args.join(" ")),
                source,
            })?;

        Ok(CommandOutput::from_output(output))
    }

    fn run_elevated(&self, argv: &[&str]) -> Result<CommandOutput> {
        debug!("Running with elevated privileges: {}", argv.join(" "));

        let command_line = argv.join(" ");
        let output = elevated_command(argv)
            .output()
            .map_err(|source| DevCertError::Command {
                command: command_line,
                source,
            })?;

        Ok(CommandOutput::from_output(output))
    }
}

#[cfg(target_os = "macos")]
fn elevated_command(argv: &[&str]) -> Command {
    let mut command = Command::new("osascript");
    command.arg("-e").arg(admin_script(argv));
    command
}

#[cfg(all(unix, not(target_os = "macos")))]
fn elevated_command(argv: &[&str]) -> Command {
    let mut command = Command::new("sudo");
    command.args(argv);
    command
}

// Windows raises its own consent dialog for trust store changes.
#[cfg(not(unix))]
fn elevated_command(argv: &[&str]) -> Command {
    let mut command = Command::new(argv.first().copied().unwrap_or_default());
    command.args(argv.iter().skip(1));
    command
}

/// Wraps `argv` in an AppleScript `do shell script` that asks for an
/// administrator password.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn admin_script(argv: &[&str]) -> String {
    let shell_command = argv
        .iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        r#"do shell script "{}" with administrator privileges"#,
        shell_command.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}
