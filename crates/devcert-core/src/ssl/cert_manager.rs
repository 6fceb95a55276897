use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::{
    Path,
    PathBuf,
};

use log::{
    debug,
    warn,
};
use openssl::asn1::Asn1Time;
use openssl::nid::Nid;
use openssl::x509::X509;
use serde::Serialize;

use super::cert_generator::{
    self,
    CertificatePair,
    FRIENDLY_NAME,
};
use super::cert_store::CertificateStore;
use super::platform::{
    self,
    Platform,
    TrustOutcome,
    TrustStore,
};
use crate::config::DevCertConfig;
use crate::elevated::SystemCommandRunner;
use crate::error::{
    DevCertError,
    Result,
};
use crate::logger::Logger;

/// What the stored certificate looks like, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateInfo {
    pub file_path: String,
    pub serial_number: Option<String>,
    pub subject: Option<String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
    pub is_expired: bool,
    pub has_subject_alt_name: bool,
    pub friendly_name: Option<String>,
}

/// Hands out a trusted `localhost` certificate, generating and trusting a new
/// one when allowed and needed.
pub struct CertificateManager {
    store: CertificateStore,
    trust_store: Box<dyn TrustStore>,
    temp_dir: PathBuf,
}

impl CertificateManager {
    pub fn new(config: &DevCertConfig) -> Self {
        let store = CertificateStore::with_path(&config.store_dir);
        let trust_store =
            platform::for_current_os(Box::new(SystemCommandRunner), store.certificate_path());
        Self::with_components(store, trust_store, config.temp_dir.clone())
    }

    pub fn with_components(
        store: CertificateStore, trust_store: Box<dyn TrustStore>, temp_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            trust_store,
            temp_dir,
        }
    }

    pub fn certificate_path(&self) -> PathBuf {
        self.store.certificate_path()
    }

    pub fn platform(&self) -> Platform {
        self.trust_store.platform()
    }

    /// Returns the stored certificate, regenerating it first when it is
    /// missing or lacks a subjectAltName and `allow_generate` is set.
    ///
    /// `None` means no usable certificate exists: either generation was not
    /// allowed or the new certificate could not be trusted. A stale
    /// certificate is returned as-is, with a warning, when generation is not
    /// allowed.
    pub fn ensure_certificate(
        &mut self, allow_generate: bool, logger: &dyn Logger,
    ) -> Result<Option<CertificatePair>> {
        match self.store.read()? {
            Some(existing) if has_subject_alt_name(&existing.certificate_pem) => {
                return Ok(Some(existing));
            }
            Some(existing) => {
                let mut warning = String::from(
                    "The existing development certificate is missing the subjectAltName property \
                     and will not work with the latest versions of some browsers.",
                );
                if allow_generate {
                    warning.push_str(" Attempting to untrust the certificate and generate a new one.");
                } else {
                    warning.push_str(" Untrust the certificate and generate a new one.");
                }
                logger.log_warning(&warning);

                if !allow_generate {
                    return Ok(Some(existing));
                }

                self.untrust_certificate(logger);
                self.regenerate(logger)?;
            }
            None if allow_generate => self.regenerate(logger)?,
            None => {}
        }

        self.store.read()
    }

    /// Removes the certificate from the OS trust store. The persisted copy is
    /// left alone.
    pub fn untrust_certificate(&self, logger: &dyn Logger) -> bool {
        self.trust_store.untrust(logger).is_success()
    }

    /// Untrusts, then deletes the persisted certificate and key whether or not
    /// the untrust worked. Returns the untrust result.
    pub fn remove_certificate(&mut self, logger: &dyn Logger) -> Result<bool> {
        let untrusted = self.untrust_certificate(logger);
        self.store.clear()?;
        Ok(untrusted)
    }

    pub fn certificate_info(&mut self) -> Result<Option<CertificateInfo>> {
        let file_path = self.certificate_path().display().to_string();
        let Some(pair) = self.store.read()? else {
            return Ok(None);
        };

        let info = match X509::from_pem(pair.certificate_pem.as_bytes()) {
            Ok(certificate) => describe(&certificate, file_path),
            Err(e) => {
                debug!("Stored certificate does not parse: {}", e);
                CertificateInfo {
                    file_path,
                    serial_number: None,
                    subject: None,
                    not_before: None,
                    not_after: None,
                    is_expired: false,
                    has_subject_alt_name: false,
                    friendly_name: None,
                }
            }
        };
        Ok(Some(info))
    }

    fn regenerate(&mut self, logger: &dyn Logger) -> Result<()> {
        debug!("Generating a new development certificate");
        let pair = cert_generator::generate()?;

        fs::create_dir_all(&self.temp_dir).map_err(|e| DevCertError::io(&self.temp_dir, e))?;

        let mut temp_file = tempfile::Builder::new()
            .suffix(".cer")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| DevCertError::io(&self.temp_dir, e))?;
        temp_file
            .write_all(pair.certificate_pem.as_bytes())
            .and_then(|_| temp_file.flush())
            .map_err(|e| DevCertError::io(temp_file.path(), e))?;

        // certutil cannot open a file another handle still holds.
        let temp_path = temp_file.into_temp_path();
        let result = self.install(&pair, &temp_path, logger);

        let display_path = temp_path.display().to_string();
        if let Err(e) = temp_path.close() {
            warn!("Failed to remove temporary certificate {}: {}", display_path, e);
        }

        result
    }

    fn install(
        &mut self, pair: &CertificatePair, certificate_path: &Path, logger: &dyn Logger,
    ) -> Result<()> {
        let outcome = self.trust_store.trust(certificate_path, logger);
        if outcome != TrustOutcome::Succeeded {
            debug!("Trust outcome {:?}, discarding the generated certificate", outcome);
            return self.store.clear();
        }

        if let Err(e) = self.store.store(pair) {
            warn!("Could not persist the trusted certificate, removing its trust: {}", e);
            self.trust_store.untrust(logger);
            return Err(e);
        }

        if !self.trust_store.set_friendly_name(certificate_path, logger) {
            logger.log_warning("Unable to set the certificate's friendly name.");
        }
        Ok(())
    }
}

/// True when the PEM parses and carries a subjectAltName extension. Anything
/// unparsable counts as missing it.
pub fn has_subject_alt_name(certificate_pem: &str) -> bool {
    X509::from_pem(certificate_pem.as_bytes())
        .ok()
        .and_then(|certificate| certificate.subject_alt_names())
        .is_some()
}

fn describe(certificate: &X509, file_path: String) -> CertificateInfo {
    let serial_number = certificate
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_hex_str().map(|hex| hex.to_lowercase()))
        .ok();

    let subject = certificate
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().to_string().ok());

    let is_expired = Asn1Time::days_from_now(0)
        .and_then(|now| certificate.not_after().compare(&now))
        .map(|ordering| ordering == Ordering::Less)
        .unwrap_or(false);

    let friendly_name = certificate
        .to_der()
        .ok()
        .filter(|der| {
            let label = cert_generator::der_bmp_string(FRIENDLY_NAME);
            der.windows(label.len()).any(|window| window == label.as_slice())
        })
        .map(|_| FRIENDLY_NAME.to_string());

    CertificateInfo {
        file_path,
        serial_number,
        subject,
        not_before: Some(certificate.not_before().to_string()),
        not_after: Some(certificate.not_after().to_string()),
        is_expired,
        has_subject_alt_name: certificate.subject_alt_names().is_some(),
        friendly_name,
    }
}
