use std::fs;
use std::path::{
    Path,
    PathBuf,
};

use once_cell::sync::OnceCell;

use super::{
    Platform,
    TrustOutcome,
    TrustStore,
};
use crate::elevated::{
    CommandOutput,
    CommandRunner,
};
use crate::logger::Logger;
use crate::ssl::cert_generator::{
    FRIENDLY_NAME,
    SERIAL_NUMBER,
};

/// HRESULT_FROM_WIN32(ERROR_CANCELLED), returned by certutil when the consent
/// dialog is dismissed.
const CANCELLED_STATUS: u32 = 0x8007_04C7;
const CANCELLED_MESSAGE: &str = "The operation was canceled by the user.";

/// Current user's root store, driven through `certutil`.
pub struct WindowsTrustStore {
    runner: Box<dyn CommandRunner>,
    certutil: OnceCell<Option<PathBuf>>,
}

impl WindowsTrustStore {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            runner,
            certutil: OnceCell::new(),
        }
    }

    /// Resolved once; a failed lookup is remembered and never retried.
    fn certutil(&self, logger: &dyn Logger) -> Option<&Path> {
        self.certutil
            .get_or_init(|| locate_certutil(self.runner.as_ref(), logger))
            .as_deref()
    }

    fn run_certutil(&self, args: &[&str], logger: &dyn Logger) -> Option<CommandOutput> {
        let certutil = self.certutil(logger)?;
        let program = certutil.to_string_lossy();

        match self.runner.run(&*program, args) {
            Ok(output) => Some(output),
            Err(e) => {
                logger.log_error(&format!("Error running certutil: {}", e));
                None
            }
        }
    }
}

impl TrustStore for WindowsTrustStore {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn trust(&self, certificate_path: &Path, logger: &dyn Logger) -> TrustOutcome {
        if self.certutil(logger).is_none() {
            return TrustOutcome::Failed;
        }

        logger.log(
            "Attempting to trust a dev certificate. This self-signed certificate only points to \
             localhost and will be stored in your local user profile to be used by other \
             development servers. If you do not consent to trust this certificate, click \"NO\" \
             in the dialog.",
        );

        let path = certificate_path.to_string_lossy();
        let Some(output) = self.run_certutil(&["-user", "-addstore", "root", &*path], logger)
        else {
            return TrustOutcome::Failed;
        };

        let outcome = classify(&output, "trust", logger);
        if outcome.is_success() {
            logger.log_verbose("Successfully trusted development certificate.");
        }
        outcome
    }

    fn untrust(&self, logger: &dyn Logger) -> TrustOutcome {
        let Some(output) =
            self.run_certutil(&["-user", "-delstore", "root", SERIAL_NUMBER], logger)
        else {
            return TrustOutcome::Failed;
        };

        let outcome = classify(&output, "untrust", logger);
        if outcome.is_success() {
            logger.log_verbose("Successfully untrusted development certificate.");
        }
        outcome
    }

    fn set_friendly_name(&self, certificate_path: &Path, logger: &dyn Logger) -> bool {
        if self.certutil(logger).is_none() {
            return false;
        }

        let inf_path = friendly_name_path(certificate_path);
        if let Err(e) = fs::write(&inf_path, friendly_name_descriptor(FRIENDLY_NAME)) {
            logger.log_error(&format!(
                "Unable to write {}: {}",
                inf_path.display(),
                e
            ));
            return false;
        }

        let inf = inf_path.to_string_lossy();
        let result = self.run_certutil(
            &["-repairstore", "-user", "root", SERIAL_NUMBER, &*inf],
            logger,
        );
        let _ = fs::remove_file(&inf_path);

        match result {
            Some(output) if output.success() => {
                logger.log_verbose("Successfully set certificate name.");
                true
            }
            Some(output) => {
                logger.log_error(&format!("CertUtil Error: {}", output.stdout_text()));
                false
            }
            None => false,
        }
    }
}

fn locate_certutil(runner: &dyn CommandRunner, logger: &dyn Logger) -> Option<PathBuf> {
    let output = match runner.run("where", &["certutil"]) {
        Ok(output) => output,
        Err(e) => {
            logger.log_error(&format!("Error finding certUtil command: \"{}\"", e));
            return None;
        }
    };

    let stderr = output.stderr_text();
    if !stderr.trim().is_empty() {
        logger.log_error(&format!("Error finding certUtil command: \"{}\"", stderr));
        return None;
    }

    let found = output
        .stdout
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty());

    match found {
        Some(path) if output.success() => Some(PathBuf::from(path)),
        _ => {
            logger.log_error("Error finding certUtil command: no path was returned.");
            None
        }
    }
}

/// `operation` names the attempted change ("trust" or "untrust") in messages.
fn classify(output: &CommandOutput, operation: &str, logger: &dyn Logger) -> TrustOutcome {
    if output.success() {
        return TrustOutcome::Succeeded;
    }

    logger.log_error(&format!("Error: {}", output.stdout_text()));

    if was_cancelled(output) {
        logger.log(&format!("Certificate {} cancelled.", operation));
        TrustOutcome::DeclinedByUser
    } else {
        logger.log_error(&format!(
            "Certificate {} failed with an unknown error.",
            operation
        ));
        TrustOutcome::Failed
    }
}

fn was_cancelled(output: &CommandOutput) -> bool {
    // Exit codes arrive as i32; the HRESULT is compared bit for bit.
    if output.code.map(|code| code as u32) == Some(CANCELLED_STATUS) {
        return true;
    }

    output
        .stdout
        .iter()
        .map(|line| line.trim())
        .rev()
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.ends_with(CANCELLED_MESSAGE))
}

fn friendly_name_path(certificate_path: &Path) -> PathBuf {
    let stem = certificate_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "devcert".to_string());
    certificate_path.with_file_name(format!("{}.inf", stem))
}

fn friendly_name_descriptor(name: &str) -> String {
    [
        "[Version]",
        "Signature = \"$Windows NT$\"",
        "[Properties]",
        &format!("11 = \"{{text}}{}\"", name),
        "",
    ]
    .join("\r\n")
}
