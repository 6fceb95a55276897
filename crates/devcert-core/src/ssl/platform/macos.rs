use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    Platform,
    TrustOutcome,
    TrustStore,
};
use crate::elevated::{
    CommandOutput,
    CommandRunner,
};
use crate::error::Result;
use crate::logger::Logger;
use crate::ssl::cert_generator::{
    COMMON_NAME,
    SERIAL_NUMBER,
};

pub const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

// sudo-style prompts report the first form, osascript the second.
static DECLINED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)authorization was cancell?ed by the user|user cancell?ed|\(-128\)")
        .expect("Failed to compile the consent decline pattern")
});

/// System keychain, driven through `security` with an administrator prompt.
pub struct MacOsTrustStore {
    runner: Box<dyn CommandRunner>,
}

impl MacOsTrustStore {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn find_certificate(&self, logger: &dyn Logger) -> Option<String> {
        logger.log_verbose("Trying to find the signature of the dev cert");

        let output = match self.runner.run(
            "security",
            &["find-certificate", "-c", COMMON_NAME, "-a", "-Z", SYSTEM_KEYCHAIN],
        ) {
            Ok(output) => output,
            Err(e) => {
                logger.log_error(&format!("Error finding the dev certificate: {}", e));
                return None;
            }
        };

        if !output.success() {
            logger.log_error(&format!(
                "Error finding the dev certificate: {} {}",
                output.stdout_text(),
                output.stderr_text()
            ));
            return None;
        }

        match find_certificate_hash(&output.stdout, SERIAL_NUMBER) {
            Ok(Some(hash)) => {
                logger.log_verbose(&format!("Found the dev cert. SHA is {}", hash));
                Some(hash)
            }
            Ok(None) => {
                logger.log_error("Unable to find the dev certificate.");
                None
            }
            Err(e) => {
                logger.log_error(&format!("Unable to parse keychain listing: {}", e));
                None
            }
        }
    }
}

impl TrustStore for MacOsTrustStore {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn trust(&self, certificate_path: &Path, logger: &dyn Logger) -> TrustOutcome {
        logger.log(
            "Attempting to trust a dev certificate. This self-signed certificate only points to \
             localhost and will be stored in your local user profile to be used by other \
             development servers. If you do not consent to trust this certificate, do not enter \
             your root password in the prompt.",
        );

        let path = certificate_path.to_string_lossy();
        let result = self.runner.run_elevated(&[
            "security",
            "add-trusted-cert",
            "-d",
            "-r",
            "trustRoot",
            "-k",
            SYSTEM_KEYCHAIN,
            &*path,
        ]);

        let outcome = classify(result, "trust", logger);
        if outcome.is_success() {
            logger.log_verbose("Successfully trusted development certificate.");
        }
        outcome
    }

    fn untrust(&self, logger: &dyn Logger) -> TrustOutcome {
        let Some(hash) = self.find_certificate(logger) else {
            return TrustOutcome::Failed;
        };

        let result = self.runner.run_elevated(&[
            "security",
            "delete-certificate",
            "-Z",
            hash.as_str(),
            SYSTEM_KEYCHAIN,
        ]);

        let outcome = classify(result, "untrust", logger);
        if outcome.is_success() {
            logger.log_verbose("Successfully untrusted dev certificate.");
        }
        outcome
    }
}

/// `operation` names the attempted change ("trust" or "untrust") in messages.
fn classify(
    result: Result<CommandOutput>, operation: &str, logger: &dyn Logger,
) -> TrustOutcome {
    let output = match result {
        Ok(output) => output,
        Err(e) => {
            logger.log_error(&format!("Certificate {} failed: {}", operation, e));
            return TrustOutcome::Failed;
        }
    };

    if output.success() {
        return TrustOutcome::Succeeded;
    }

    if was_declined(&output.stderr) {
        logger.log(&format!("Certificate {} cancelled.", operation));
        return TrustOutcome::DeclinedByUser;
    }

    let code = output
        .code
        .map_or_else(|| "none".to_string(), |code| code.to_string());
    logger.log_error(&format!(
        "Certificate {} failed with an unknown error. Exit code: {}. Error: {}",
        operation,
        code,
        output.stderr_text()
    ));
    TrustOutcome::Failed
}

fn was_declined(stderr: &[String]) -> bool {
    stderr.iter().any(|line| DECLINED.is_match(line))
}

/// Scans `security find-certificate -a -Z` output and returns the SHA-1 hash
/// of the entry whose serial number blob equals `serial`, ignoring case.
///
/// Each entry starts with its hash lines, followed by an attribute block; the
/// hash seen last is the one that owns a matching `snbr` attribute.
pub fn find_certificate_hash(lines: &[String], serial: &str) -> Result<Option<String>> {
    let sha1_line = Regex::new(r"^SHA-1 hash: (.+)$")?;
    let serial_line = Regex::new(r#"^\s*"snbr"<blob>=0x(\S+)"#)?;

    let mut current_hash: Option<&str> = None;
    for line in lines {
        if let Some(captures) = sha1_line.captures(line) {
            current_hash = captures.get(1).map(|m| m.as_str().trim());
            continue;
        }

        let Some(captures) = serial_line.captures(line) else {
            continue;
        };
        let matches_serial = captures
            .get(1)
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case(serial));
        if matches_serial {
            return Ok(current_hash.map(str::to_string));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        output,
        RecordingLogger,
        ScriptedRunner,
    };

    const DEV_CERT_HASH: &str = "8F4B2C0A9E1D7B3C5A6F0E9D8C7B6A5F4E3D2C1B";

    fn fixture(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    fn keychain_listing() -> Vec<String> {
        fixture(
            r#"SHA-256 hash: 1B6F1B5B7A1C1D3B3E6F0C2A9D8E7F6A5B4C3D2E1F0A9B8C7D6E5F4A3B2C1D0E
SHA-1 hash: 0A1B2C3D4E5F60718293A4B5C6D7E8F901234567
keychain: "/Library/Keychains/System.keychain"
version: 512
class: 0x80001000
attributes:
    "alis"<blob>="localhost"
    "cenc"<uint32>=0x00000003
    "ctyp"<uint32>=0x00000001
    "labl"<blob>="localhost"
    "snbr"<blob>=0x00C4A1B2D3E4F5  "\000\304\241\262\323\344\365"
    "subj"<blob>=0x3014311230100603550403130...  "0\0241\0220\020\006\003U\004\003\023\011localhost"
SHA-256 hash: 5E2D8B7C6A5F4E3D2C1B0A9F8E7D6C5B4A3F2E1D0C9B8A7F6E5D4C3B2A1F0E9D
SHA-1 hash: 8F4B2C0A9E1D7B3C5A6F0E9D8C7B6A5F4E3D2C1B
keychain: "/Library/Keychains/System.keychain"
version: 512
class: 0x80001000
attributes:
    "alis"<blob>="localhost"
    "cenc"<uint32>=0x00000003
    "labl"<blob>="localhost"
    "snbr"<blob>=0x731C321744E34650A202E3EF91C3C1B9  "s\0342\027D\343FP\242\002\343\357\221\303\301\271"
    "subj"<blob>=0x3014311230100603550403130...  "0\0241\0220\020\006\003U\004\003\023\011localhost""#,
        )
    }

    #[test]
    fn test_find_hash_matches_serial_case_insensitively() {
        let hash = find_certificate_hash(&keychain_listing(), SERIAL_NUMBER).unwrap();
        assert_eq!(hash.as_deref(), Some(DEV_CERT_HASH));
    }

    #[test]
    fn test_find_hash_ignores_other_localhost_certificates() {
        let listing = keychain_listing();
        let first_entry_only = &listing[..12];
        assert_eq!(find_certificate_hash(first_entry_only, SERIAL_NUMBER).unwrap(), None);
    }

    #[test]
    fn test_find_hash_on_empty_output() {
        assert_eq!(find_certificate_hash(&[], SERIAL_NUMBER).unwrap(), None);
    }

    #[test]
    fn test_trust_runs_add_trusted_cert_elevated() {
        let runner = ScriptedRunner::default();
        runner.respond(output(0, &[], &[]));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        let outcome = store.trust(Path::new("/Users/dev/.devcert/temp/1.cer"), &logger);

        assert_eq!(outcome, TrustOutcome::Succeeded);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].elevated);
        assert_eq!(calls[0].program, "security");
        assert_eq!(
            calls[0].args,
            vec![
                "add-trusted-cert",
                "-d",
                "-r",
                "trustRoot",
                "-k",
                SYSTEM_KEYCHAIN,
                "/Users/dev/.devcert/temp/1.cer"
            ]
        );
        assert_eq!(logger.infos().len(), 1);
    }

    #[test]
    fn test_trust_declined_by_user() {
        let runner = ScriptedRunner::default();
        runner.respond(output(
            1,
            &[],
            &["0:180: execution error: User canceled. (-128)"],
        ));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(
            store.trust(Path::new("a.cer"), &logger),
            TrustOutcome::DeclinedByUser
        );
        assert!(logger.errors().is_empty());
        assert!(logger.infos().contains(&"Certificate trust cancelled.".to_string()));
    }

    #[test]
    fn test_trust_declined_through_authorization_prompt() {
        let runner = ScriptedRunner::default();
        runner.respond(output(
            1,
            &[],
            &["SecTrustSettingsSetTrustSettings: The authorization was cancelled by the user."],
        ));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(
            store.trust(Path::new("a.cer"), &logger),
            TrustOutcome::DeclinedByUser
        );
    }

    #[test]
    fn test_trust_failure_reports_exit_code_and_stderr() {
        let runner = ScriptedRunner::default();
        runner.respond(output(
            1,
            &[],
            &["SecCertificateCreateFromData:", "Unknown format in import."],
        ));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(store.trust(Path::new("a.cer"), &logger), TrustOutcome::Failed);
        assert_eq!(
            logger.errors(),
            vec![
                "Certificate trust failed with an unknown error. Exit code: 1. Error: \
                 SecCertificateCreateFromData: Unknown format in import."
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_untrust_deletes_found_hash() {
        let runner = ScriptedRunner::default();
        let listing = keychain_listing();
        let listing: Vec<&str> = listing.iter().map(String::as_str).collect();
        runner
            .respond(output(0, &listing, &[]))
            .respond(output(0, &[], &[]));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(store.untrust(&logger), TrustOutcome::Succeeded);

        let calls = runner.calls();
        assert!(!calls[0].elevated);
        assert_eq!(
            calls[0].args,
            vec!["find-certificate", "-c", "localhost", "-a", "-Z", SYSTEM_KEYCHAIN]
        );
        assert!(calls[1].elevated);
        assert_eq!(
            calls[1].args,
            vec!["delete-certificate", "-Z", DEV_CERT_HASH, SYSTEM_KEYCHAIN]
        );
    }

    #[test]
    fn test_untrust_without_match_fails() {
        let runner = ScriptedRunner::default();
        runner.respond(output(0, &["keychain: \"/Library/Keychains/System.keychain\""], &[]));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(store.untrust(&logger), TrustOutcome::Failed);
        assert_eq!(logger.errors(), vec!["Unable to find the dev certificate.".to_string()]);
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_untrust_when_search_fails() {
        let runner = ScriptedRunner::default();
        runner.respond(output(
            44,
            &[],
            &["security: SecKeychainSearchCopyNext: The specified item could not be found in the keychain."],
        ));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(store.untrust(&logger), TrustOutcome::Failed);
        assert!(logger.errors()[0].starts_with("Error finding the dev certificate:"));
    }

    #[test]
    fn test_untrust_declined_by_user() {
        let runner = ScriptedRunner::default();
        let listing = keychain_listing();
        let listing: Vec<&str> = listing.iter().map(String::as_str).collect();
        runner
            .respond(output(0, &listing, &[]))
            .respond(output(1, &[], &["execution error: User canceled. (-128)"]));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(store.untrust(&logger), TrustOutcome::DeclinedByUser);
        assert!(logger
            .infos()
            .contains(&"Certificate untrust cancelled.".to_string()));
    }

    #[test]
    fn test_untrust_delete_failure_names_untrust() {
        let runner = ScriptedRunner::default();
        let listing = keychain_listing();
        let listing: Vec<&str> = listing.iter().map(String::as_str).collect();
        runner.respond(output(0, &listing, &[])).respond(output(
            1,
            &[],
            &["SecKeychainItemDelete: The specified item could not be found in the keychain."],
        ));
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(store.untrust(&logger), TrustOutcome::Failed);
        assert_eq!(
            logger.errors(),
            vec![
                "Certificate untrust failed with an unknown error. Exit code: 1. Error: \
                 SecKeychainItemDelete: The specified item could not be found in the keychain."
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_untrust_spawn_error_names_untrust() {
        let runner = ScriptedRunner::default();
        let listing = keychain_listing();
        let listing: Vec<&str> = listing.iter().map(String::as_str).collect();
        runner.respond(output(0, &listing, &[]));
        runner.respond_spawn_error();
        let store = MacOsTrustStore::new(Box::new(runner.clone()));
        let logger = RecordingLogger::default();

        assert_eq!(store.untrust(&logger), TrustOutcome::Failed);
        let errors = logger.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Certificate untrust failed:"));
    }

    #[test]
    fn test_decline_pattern_variants() {
        assert!(was_declined(&["0:180: execution error: User canceled. (-128)".to_string()]));
        assert!(was_declined(&[
            "The authorization was cancelled by the user.".to_string()
        ]));
        assert!(!was_declined(&["Unknown format in import.".to_string()]));
        assert!(!was_declined(&[]));
    }
}
