//! Subcommand implementations

pub mod discover;
pub mod generate;
pub mod hosts;
pub mod monitor;
pub mod status;

use anyhow::{Context, Result};
use manager_lib::discovery::DiscoveryReport;
use manager_lib::ServiceDiscovery;

use crate::config::Settings;
use crate::output::print_warning;

/// Discover the configured compose file, warning about skipped entries
pub(crate) fn load_report(settings: &Settings) -> Result<DiscoveryReport> {
    let compose_file = &settings.manager.compose_file;
    let report = ServiceDiscovery::default()
        .discover_report(compose_file)
        .with_context(|| format!("Failed to discover services in {}", compose_file.display()))?;

    for (name, reason) in report.skipped() {
        print_warning(&format!("Skipped service '{}': {}", name, reason));
    }

    Ok(report)
}
