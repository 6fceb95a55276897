use std::path::{
    Path,
    PathBuf,
};

use super::{
    Platform,
    TrustOutcome,
    TrustStore,
};
use crate::logger::Logger;
use crate::ssl::cert_generator::SERIAL_NUMBER;

/// Hosts without automatic trust support. Trusting is left to the user and
/// reported as success, since an untrusted self-signed certificate still works
/// behind browser warnings. Untrusting cannot be faked and always fails.
pub struct ManualTrustStore {
    certificate_path: PathBuf,
}

impl ManualTrustStore {
    pub fn new(certificate_path: PathBuf) -> Self {
        Self { certificate_path }
    }
}

impl TrustStore for ManualTrustStore {
    fn platform(&self) -> Platform {
        Platform::Other
    }

    fn trust(&self, _certificate_path: &Path, logger: &dyn Logger) -> TrustOutcome {
        logger.log(&format!(
            "Automatic certificate trust is only implemented on Windows and macOS. To trust the \
             development certificate, add this certificate to your trusted root certification \
             authorities: \"{}\".",
            self.certificate_path.display()
        ));
        TrustOutcome::Succeeded
    }

    fn untrust(&self, logger: &dyn Logger) -> TrustOutcome {
        logger.log(&format!(
            "Automatic certificate untrust is only implemented on Windows and macOS. To untrust \
             the development certificate, remove this certificate from your trusted root \
             certification authorities: \"{}\". The certificate has serial number \"{}\".",
            self.certificate_path.display(),
            SERIAL_NUMBER
        ));
        TrustOutcome::Failed
    }
}
