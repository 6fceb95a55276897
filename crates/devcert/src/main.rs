mod cli;
mod logging;

use anyhow::{
    bail,
    Context,
    Result,
};
use clap::Parser;
use devcert_core::{
    CertificateManager,
    LogCrateLogger,
};
use log::{
    debug,
    info,
};

use crate::cli::{
    Cli,
    Command,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let config = cli
        .config()
        .context("Failed to resolve the devcert directory")?;
    debug!(
        "Using certificate store {} (from {})",
        config.store_dir.display(),
        cli.home_source()
    );

    let mut manager = CertificateManager::new(&config);
    debug!("Trust store platform: {:?}", manager.platform());

    match cli.command {
        Command::Trust => trust(&mut manager),
        Command::Untrust => untrust(&mut manager),
        Command::Status { json } => status(&mut manager, json),
    }
}

fn trust(manager: &mut CertificateManager) -> Result<()> {
    let certificate = manager
        .ensure_certificate(true, &LogCrateLogger)
        .context("Failed to ensure the development certificate")?;

    if certificate.is_none() {
        bail!("No trusted development certificate is available");
    }

    info!(
        "Development certificate ready at {}",
        manager.certificate_path().display()
    );
    Ok(())
}

fn untrust(manager: &mut CertificateManager) -> Result<()> {
    let untrusted = manager
        .remove_certificate(&LogCrateLogger)
        .context("Failed to remove the development certificate")?;

    if !untrusted {
        bail!(
            "The development certificate was deleted from {} but could not be untrusted",
            manager.certificate_path().display()
        );
    }

    info!("Development certificate untrusted and deleted");
    Ok(())
}

fn status(manager: &mut CertificateManager, json: bool) -> Result<()> {
    manager
        .ensure_certificate(false, &LogCrateLogger)
        .context("Failed to read the development certificate")?;
    let info = manager
        .certificate_info()
        .context("Failed to inspect the development certificate")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("Failed to serialize status")?
        );
        return Ok(());
    }

    let Some(info) = info else {
        println!(
            "No development certificate at {}",
            manager.certificate_path().display()
        );
        return Ok(());
    };

    println!("Certificate:      {}", info.file_path);
    println!(
        "Serial number:    {}",
        info.serial_number.as_deref().unwrap_or("unreadable")
    );
    println!(
        "Subject:          {}",
        info.subject.as_deref().unwrap_or("unreadable")
    );
    println!(
        "Valid from:       {}",
        info.not_before.as_deref().unwrap_or("unknown")
    );
    println!(
        "Valid until:      {}{}",
        info.not_after.as_deref().unwrap_or("unknown"),
        if info.is_expired { " (expired)" } else { "" }
    );
    println!(
        "subjectAltName:   {}",
        if info.has_subject_alt_name {
            "present"
        } else {
            "missing"
        }
    );
    println!(
        "Friendly name:    {}",
        info.friendly_name.as_deref().unwrap_or("none")
    );
    Ok(())
}
