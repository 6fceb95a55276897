use std::path::PathBuf;

use clap::{
    Parser,
    Subcommand,
};
use devcert_core::config::HOME_ENV_VAR;
use devcert_core::{
    DevCertConfig,
    Result,
};

#[derive(Parser, Debug)]
#[command(name = "devcert")]
#[command(about = "Generate, trust and untrust the localhost development certificate")]
#[command(version)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Directory holding the certificate store (defaults to $DEVCERT_HOME or ~/.devcert)",
        value_name = "DIR"
    )]
    pub home: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Set the global log level",
        value_name = "LEVEL"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate the certificate if needed and add it to the OS trust store
    Trust,
    /// Remove the certificate from the OS trust store and delete it
    Untrust,
    /// Show the stored certificate without changing anything
    Status {
        #[arg(long, help = "Print the certificate details as JSON")]
        json: bool,
    },
}

impl Cli {
    pub fn config(&self) -> Result<DevCertConfig> {
        match &self.home {
            Some(home) => Ok(DevCertConfig::with_base_dir(home)),
            None => DevCertConfig::from_env(),
        }
    }

    pub fn home_source(&self) -> &'static str {
        if self.home.is_some() {
            "--home"
        } else if std::env::var_os(HOME_ENV_VAR).is_some_and(|dir| !dir.is_empty()) {
            HOME_ENV_VAR
        } else {
            "home directory"
        }
    }
}
