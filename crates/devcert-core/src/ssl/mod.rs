pub mod cert_generator;
pub mod cert_manager;
pub mod cert_store;
pub mod platform;

pub use cert_generator::CertificatePair;
pub use cert_manager::{
    CertificateInfo,
    CertificateManager,
};
pub use cert_store::CertificateStore;
pub use platform::{
    Platform,
    TrustOutcome,
    TrustStore,
};
