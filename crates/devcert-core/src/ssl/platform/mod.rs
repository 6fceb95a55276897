use std::path::{
    Path,
    PathBuf,
};

use crate::elevated::CommandRunner;
use crate::logger::Logger;

pub mod macos;
pub mod other;
pub mod windows;

/// Result of asking the operating system to trust or untrust the certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustOutcome {
    Succeeded,
    /// The operator dismissed the consent dialog.
    DeclinedByUser,
    Failed,
}

impl TrustOutcome {
    pub fn is_success(self) -> bool {
        self == TrustOutcome::Succeeded
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            _ => Platform::Other,
        }
    }
}

pub trait TrustStore {
    fn platform(&self) -> Platform;

    /// Adds the certificate file at `certificate_path` to the trusted roots.
    fn trust(&self, certificate_path: &Path, logger: &dyn Logger) -> TrustOutcome;

    /// Removes the development certificate, located by its serial number.
    fn untrust(&self, logger: &dyn Logger) -> TrustOutcome;

    /// Labels a freshly trusted certificate. Platforms without the concept
    /// report success.
    fn set_friendly_name(&self, _certificate_path: &Path, _logger: &dyn Logger) -> bool {
        true
    }
}

/// Picks the trust store for the host. `certificate_path` is the persisted
/// certificate, quoted in manual instructions where automatic trust is
/// unavailable.
pub fn for_current_os(
    runner: Box<dyn CommandRunner>, certificate_path: PathBuf,
) -> Box<dyn TrustStore> {
    for_platform(Platform::current(), runner, certificate_path)
}

pub fn for_platform(
    platform: Platform, runner: Box<dyn CommandRunner>, certificate_path: PathBuf,
) -> Box<dyn TrustStore> {
    match platform {
        Platform::Windows => Box::new(windows::WindowsTrustStore::new(runner)),
        Platform::MacOs => Box::new(macos::MacOsTrustStore::new(runner)),
        Platform::Other => Box::new(other::ManualTrustStore::new(certificate_path)),
    }
}
