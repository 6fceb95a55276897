use std::fs;
use std::io::{
    ErrorKind,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};

use log::{
    debug,
    warn,
};
use openssl::pkey::PKey;
use openssl::x509::X509;
use tempfile::NamedTempFile;

use super::cert_generator::CertificatePair;
use crate::error::{
    DevCertError,
    Result,
};

const CERTIFICATE_FILE_NAME: &str = "devcert.cer";
const KEY_FILE_NAME: &str = "devcert.key";

/// Persisted development certificate and private key.
///
/// The first `read` loads from disk; afterwards the in-memory copy is
/// authoritative and every mutation writes through. Each file is replaced
/// atomically, and a pair where only one side exists on disk reads back as
/// absent.
pub struct CertificateStore {
    store_path: PathBuf,
    cached: Option<Option<CertificatePair>>,
}

impl CertificateStore {
    pub fn with_path(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            cached: None,
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn certificate_path(&self) -> PathBuf {
        self.store_path.join(CERTIFICATE_FILE_NAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.store_path.join(KEY_FILE_NAME)
    }

    pub fn read(&mut self) -> Result<Option<CertificatePair>> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }

        let loaded = self.load_from_disk()?;
        self.cached = Some(loaded.clone());
        Ok(loaded)
    }

    pub fn store(&mut self, pair: &CertificatePair) -> Result<()> {
        fs::create_dir_all(&self.store_path)
            .map_err(|e| DevCertError::io(&self.store_path, e))?;

        // Key first: a crash in between leaves a new key beside an old
        // certificate, which the mismatch check on load rejects.
        let written = write_atomically(&self.key_path(), &pair.private_key_pem, true)
            .and_then(|_| write_atomically(&self.certificate_path(), &pair.certificate_pem, false));
        if let Err(e) = written {
            // Disk may now hold a half-replaced pair; reload it on next read.
            self.cached = None;
            return Err(e);
        }

        self.cached = Some(Some(pair.clone()));
        debug!(
            "Stored development certificate at {}",
            self.certificate_path().display()
        );
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        remove_if_exists(&self.certificate_path())?;
        remove_if_exists(&self.key_path())?;

        self.cached = Some(None);
        debug!(
            "Cleared development certificate store at {}",
            self.store_path.display()
        );
        Ok(())
    }

    fn load_from_disk(&self) -> Result<Option<CertificatePair>> {
        let certificate_pem = read_if_exists(&self.certificate_path())?;
        let private_key_pem = read_if_exists(&self.key_path())?;

        let pair = match (certificate_pem, private_key_pem) {
            (Some(certificate_pem), Some(private_key_pem))
                if !certificate_pem.trim().is_empty() && !private_key_pem.trim().is_empty() =>
            {
                CertificatePair {
                    certificate_pem,
                    private_key_pem,
                }
            }
            (None, None) => {
                debug!(
                    "No development certificate found in {}",
                    self.store_path.display()
                );
                return Ok(None);
            }
            _ => {
                warn!(
                    "Ignoring incomplete development certificate in {}",
                    self.store_path.display()
                );
                return Ok(None);
            }
        };

        if keys_mismatch(&pair) {
            warn!(
                "Development certificate in {} does not match its private key, ignoring it",
                self.store_path.display()
            );
            return Ok(None);
        }

        debug!(
            "Loaded development certificate from {}",
            self.certificate_path().display()
        );
        Ok(Some(pair))
    }
}

/// True only when both halves parse and their public keys differ. Unparsable
/// material is left for the caller to judge.
fn keys_mismatch(pair: &CertificatePair) -> bool {
    let certificate = X509::from_pem(pair.certificate_pem.as_bytes());
    let key = PKey::private_key_from_pem(pair.private_key_pem.as_bytes());

    match (certificate, key) {
        (Ok(certificate), Ok(key)) => match certificate.public_key() {
            Ok(public_key) => !public_key.public_eq(&key),
            Err(_) => false,
        },
        _ => false,
    }
}

fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DevCertError::io(path, e)),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DevCertError::io(path, e)),
    }
}

fn write_atomically(path: &Path, contents: &str, private: bool) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir).map_err(|e| DevCertError::io(dir, e))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| DevCertError::io(file.path(), e))?;

    if private {
        restrict_permissions(file.path())?;
    }

    file.persist(path)
        .map_err(|e| DevCertError::io(path, e.error))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| DevCertError::io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
