//! Routing document generation

use anyhow::{Context, Result};
use manager_lib::autoscaler::ContainerRuntime;
use manager_lib::generator::OUTPUT_FILE;
use manager_lib::{ConfigGenerator, DockerCli, OrchestrationMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::load_report;
use crate::config::Settings;
use crate::output::{print_info, print_success};

/// Editors often write a file in several steps; wait this long for them to settle
const SETTLE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub struct GenerateOptions {
    pub output_dir: Option<PathBuf>,
    pub swarm: bool,
}

/// Generate `services.yml` once
pub async fn generate(settings: &Settings, options: &GenerateOptions) -> Result<()> {
    let swarm = swarm_mode(settings, options).await;
    let path = write_document(settings, &output_dir(settings, options), swarm)?;
    print_success(&format!("Wrote {}", path.display()));
    Ok(())
}

/// Generate, then regenerate on every compose file change until Ctrl+C
pub async fn watch(settings: &Settings, options: &GenerateOptions) -> Result<()> {
    let swarm = swarm_mode(settings, options).await;
    let output_dir = output_dir(settings, options);
    let compose_file = settings.manager.compose_file.clone();

    let file_name = compose_file
        .file_name()
        .map(OsStr::to_os_string)
        .with_context(|| format!("Not a file path: {}", compose_file.display()))?;
    let watch_dir = match compose_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    regenerate(settings, &output_dir, swarm);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )
    .context("Failed to create filesystem watcher")?;

    // The directory is watched so replacing the file (rename into place) is seen
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

    print_info(&format!(
        "Watching {} for changes (Ctrl+C to stop)",
        compose_file.display()
    ));

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    debug!("Watcher channel closed");
                    break;
                };
                if !touches(&event, &file_name) {
                    continue;
                }

                tokio::time::sleep(SETTLE_DELAY).await;
                while rx.try_recv().is_ok() {}

                info!(path = %compose_file.display(), "Compose file changed");
                regenerate(settings, &output_dir, swarm);
            }
            _ = tokio::signal::ctrl_c() => {
                print_info("Stopped watching");
                break;
            }
        }
    }

    Ok(())
}

/// True for create/modify events on the compose file
fn touches(event: &Event, file_name: &OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name))
}

/// Watch mode keeps running when a generation fails
fn regenerate(settings: &Settings, output_dir: &Path, swarm: bool) {
    match write_document(settings, output_dir, swarm) {
        Ok(path) => print_success(&format!("Wrote {}", path.display())),
        Err(e) => error!(error = %format!("{:#}", e), "Failed to generate routing configuration"),
    }
}

fn write_document(settings: &Settings, output_dir: &Path, swarm: bool) -> Result<PathBuf> {
    let services = load_report(settings)?.into_services();
    let document =
        ConfigGenerator::new(settings.manager.generator.clone(), swarm).generate(&services);
    let yaml = document
        .to_yaml()
        .context("Failed to serialize routing configuration")?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let path = output_dir.join(OUTPUT_FILE);
    std::fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;

    info!(
        path = %path.display(),
        routers = document.http.routers.len() + document.tcp.routers.len(),
        "Routing configuration written"
    );
    Ok(path)
}

fn output_dir(settings: &Settings, options: &GenerateOptions) -> PathBuf {
    options
        .output_dir
        .clone()
        .or_else(|| settings.output_directory.clone())
        .unwrap_or_else(|| settings.manager.output_directory.clone())
}

/// `--swarm`, then the configured flag, then what docker reports
async fn swarm_mode(settings: &Settings, options: &GenerateOptions) -> bool {
    if options.swarm {
        return true;
    }
    if let Some(swarm) = settings.manager.generator.swarm_mode {
        return swarm;
    }

    match DockerCli::new(&settings.manager.compose_file)
        .detect_mode()
        .await
    {
        Ok(mode) => mode == OrchestrationMode::Swarm,
        Err(e) => {
            debug!(error = %e, "Could not detect orchestration mode, assuming compose");
            false
        }
    }
}
