//! Service discovery from compose files
//!
//! Builds a [`Service`] per inventory entry. Entries that cannot be
//! interpreted are reported as skipped and left out; discovery as a whole
//! only fails when the inventory itself cannot be loaded.

mod parse;

#[cfg(test)]
mod tests;

pub use parse::build_service;

use crate::error::InventoryError;
use crate::inventory::{ComposeFile, InventoryProvider, RawServiceEntry};
use crate::models::Service;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of interpreting one inventory entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Discovered(Service),
    Skipped { name: String, reason: String },
}

/// Outcomes of one discovery run, in inventory order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    pub outcomes: Vec<EntryOutcome>,
}

impl DiscoveryReport {
    /// Successfully built services
    pub fn services(&self) -> Vec<Service> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                EntryOutcome::Discovered(service) => Some(service.clone()),
                EntryOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    /// Consume the report, keeping only the services
    pub fn into_services(self) -> Vec<Service> {
        self.outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                EntryOutcome::Discovered(service) => Some(service),
                EntryOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    /// `(name, reason)` for every skipped entry
    pub fn skipped(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                EntryOutcome::Skipped { name, reason } => Some((name.as_str(), reason.as_str())),
                EntryOutcome::Discovered(_) => None,
            })
            .collect()
    }
}

/// Interpret every inventory entry
pub fn discover(entries: &[RawServiceEntry]) -> DiscoveryReport {
    let outcomes = entries
        .iter()
        .map(|entry| match build_service(entry) {
            Ok(service) => {
                debug!(service = %service.name, "Discovered service");
                EntryOutcome::Discovered(service)
            }
            Err(reason) => {
                error!(service = %entry.name, reason = %reason, "Failed to parse service");
                EntryOutcome::Skipped {
                    name: entry.name.clone(),
                    reason,
                }
            }
        })
        .collect();

    DiscoveryReport { outcomes }
}

/// Discovers services through an inventory provider
#[derive(Clone)]
pub struct ServiceDiscovery {
    inventory: Arc<dyn InventoryProvider>,
}

impl Default for ServiceDiscovery {
    fn default() -> Self {
        Self::new(Arc::new(ComposeFile))
    }
}

impl ServiceDiscovery {
    pub fn new(inventory: Arc<dyn InventoryProvider>) -> Self {
        Self { inventory }
    }

    /// Load the inventory and report the outcome for every entry
    pub fn discover_report(&self, compose_file: &Path) -> Result<DiscoveryReport, InventoryError> {
        info!(path = %compose_file.display(), "Discovering services");

        let entries = self.inventory.load(compose_file)?;
        let report = discover(&entries);

        info!(
            discovered = report.outcomes.len() - report.skipped().len(),
            skipped = report.skipped().len(),
            "Discovery complete"
        );
        Ok(report)
    }

    /// Load the inventory and return the services that could be built
    pub fn discover_services(&self, compose_file: &Path) -> Result<Vec<Service>, InventoryError> {
        Ok(self.discover_report(compose_file)?.into_services())
    }
}

/// Service name -> names it depends on
pub fn dependency_graph(services: &[Service]) -> BTreeMap<String, BTreeSet<String>> {
    services
        .iter()
        .map(|service| {
            (
                service.name.clone(),
                service.depends_on.iter().cloned().collect(),
            )
        })
        .collect()
}

/// Network name -> names of the services attached to it
pub fn services_by_network(services: &[Service]) -> BTreeMap<String, Vec<String>> {
    let mut networks: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for service in services {
        for network in &service.networks {
            networks
                .entry(network.clone())
                .or_default()
                .push(service.name.clone());
        }
    }
    networks
}

/// Services with routing switched on
pub fn routing_enabled(services: &[Service]) -> Vec<&Service> {
    services.iter().filter(|s| s.routing_enabled).collect()
}

/// Services with an enabled scaling config
pub fn scalable(services: &[Service]) -> Vec<&Service> {
    services.iter().filter(|s| s.is_scalable()).collect()
}

/// A hosts-file line mapping `ip` to every domain the services route
pub fn hosts_line(services: &[Service], ip: &str) -> Option<String> {
    let domains: BTreeSet<String> = services.iter().flat_map(Service::domain_names).collect();
    if domains.is_empty() {
        return None;
    }

    let mut line = ip.to_string();
    for domain in domains {
        line.push(' ');
        line.push_str(&domain);
    }
    Some(line)
}
