//! Hosts-file line for routed domains

use anyhow::{Context, Result};
use manager_lib::discovery::hosts_line;
use std::path::Path;

use super::load_report;
use crate::config::Settings;
use crate::output::{print_success, print_warning};

pub fn hosts(settings: &Settings, ip: &str, output: Option<&Path>) -> Result<()> {
    let services = load_report(settings)?.into_services();

    let Some(line) = hosts_line(&services, ip) else {
        print_warning("No routed domains found");
        return Ok(());
    };

    match output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", line))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!("Wrote {}", path.display()));
        }
        None => println!("{}", line),
    }

    Ok(())
}
