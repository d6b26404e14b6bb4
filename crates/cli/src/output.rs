//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Print rows as a table, or the serializable view as JSON/YAML
pub fn print_rows<R: Tabled, T: Serialize + ?Sized>(
    rows: &[R],
    data: &T,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No items found".yellow());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => print_data(data, format)?,
    }
    Ok(())
}

/// Print a serializable value as JSON or YAML; tables fall back to JSON
pub fn print_data<T: Serialize + ?Sized>(data: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(data)?),
        OutputFormat::Json | OutputFormat::Table => {
            println!("{}", serde_json::to_string_pretty(data)?)
        }
    }
    Ok(())
}

pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "running" | "scaled" => status.green().to_string(),
        "degraded" | "dry_run" | "cooldown_active" => status.yellow().to_string(),
        "unhealthy" | "not running" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// `yes`/`no` for table cells
pub fn yes_no(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".dimmed().to_string()
    }
}

/// Comma-joined list, `-` when empty
pub fn join_or_dash<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_or_dash() {
        let empty: [&str; 0] = [];
        assert_eq!(join_or_dash(&empty), "-");
        assert_eq!(join_or_dash(&["web", "api"]), "web, api");
    }

    #[test]
    fn test_color_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("healthy"), "healthy");
        assert_eq!(color_status("not running"), "not running");
        assert_eq!(color_status("unknown"), "unknown");
    }
}
