use log::{
    debug,
    error,
    info,
    warn,
};

/// Sink for the messages the certificate lifecycle reports back to its caller.
///
/// The caller owns verbosity policy; the core only decides the content and
/// severity class of each message.
pub trait Logger {
    fn log(&self, message: &str);
    fn log_verbose(&self, message: &str);
    fn log_warning(&self, message: &str);
    fn log_error(&self, message: &str);
}

/// Forwards every message to the `log` facade under the `devcert` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogCrateLogger;

impl Logger for LogCrateLogger {
    fn log(&self, message: &str) {
        info!(target: "devcert", "{}", message);
    }

    fn log_verbose(&self, message: &str) {
        debug!(target: "devcert", "{}", message);
    }

    fn log_warning(&self, message: &str) {
        warn!(target: "devcert", "{}", message);
    }

    fn log_error(&self, message: &str) {
        error!(target: "devcert", "{}", message);
    }
}
