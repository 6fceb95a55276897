pub mod config;
pub mod elevated;
pub mod error;
pub mod logger;
pub mod ssl;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::DevCertConfig;
pub use error::{
    DevCertError,
    Result,
};
pub use logger::{
    LogCrateLogger,
    Logger,
};
pub use ssl::{
    CertificateInfo,
    CertificateManager,
    CertificatePair,
    CertificateStore,
    TrustOutcome,
};
