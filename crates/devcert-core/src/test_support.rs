use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::elevated::{
    CommandOutput,
    CommandRunner,
};
use crate::error::{
    DevCertError,
    Result,
};
use crate::logger::Logger;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub elevated: bool,
}

enum Response {
    Output(CommandOutput),
    SpawnError,
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Response>,
    calls: Vec<RecordedCall>,
}

/// Replays canned tool output in order and records every invocation. Clones
/// share the same script, so a test can keep one handle after boxing another.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedRunner {
    pub fn respond(&self, output: CommandOutput) -> &Self {
        self.state
            .borrow_mut()
            .responses
            .push_back(Response::Output(output));
        self
    }

    pub fn respond_spawn_error(&self) -> &Self {
        self.state
            .borrow_mut()
            .responses
            .push_back(Response::SpawnError);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.borrow().calls.clone()
    }

    fn next(&self, call: RecordedCall) -> Result<CommandOutput> {
        let mut state = self.state.borrow_mut();
        let command = format!("{} {}", call.program, call.args.join(" "));
        state.calls.push(call);

        match state.responses.pop_front() {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::SpawnError) => Err(DevCertError::Command {
                command,
                source: io::Error::new(io::ErrorKind::NotFound, "program not found"),
            }),
            None => panic!("unexpected command: {}", command),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.next(RecordedCall {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            elevated: false,
        })
    }

    fn run_elevated(&self, argv: &[&str]) -> Result<CommandOutput> {
        self.next(RecordedCall {
            program: argv.first().map(|p| p.to_string()).unwrap_or_default(),
            args: argv.iter().skip(1).map(|arg| arg.to_string()).collect(),
            elevated: true,
        })
    }
}

pub fn output(code: i32, stdout: &[&str], stderr: &[&str]) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: stdout.iter().map(|line| line.to_string()).collect(),
        stderr: stderr.iter().map(|line| line.to_string()).collect(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Verbose,
    Warning,
    Error,
}

#[derive(Default)]
pub struct RecordingLogger {
    messages: RefCell<Vec<(Severity, String)>>,
}

impl RecordingLogger {
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.messages.borrow().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.with_severity(Severity::Info)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.with_severity(Severity::Warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_severity(Severity::Error)
    }

    fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn push(&self, severity: Severity, message: &str) {
        self.messages
            .borrow_mut()
            .push((severity, message.to_string()));
    }
}

impl Logger for RecordingLogger {
    fn log(&self, message: &str) {
        self.push(Severity::Info, message);
    }

    fn log_verbose(&self, message: &str) {
        self.push(Severity::Verbose, message);
    }

    fn log_warning(&self, message: &str) {
        self.push(Severity::Warning, message);
    }

    fn log_error(&self, message: &str) {
        self.push(Severity::Error, message);
    }
}
