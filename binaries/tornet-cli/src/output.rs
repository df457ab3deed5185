//! Output formatting utilities

use colored::*;
use serde::Serialize;
use tabled::{Table, Tabled};
use tornet_fleet::UnitEntry;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    Table,
    /// JSON format, as stored in the registry
    #[default]
    Json,
    /// YAML format
    Yaml,
}

/// One registry entry as a table row
#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ROLE")]
    role: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "ID")]
    id: String,
}

impl From<&UnitEntry> for UnitRow {
    fn from(entry: &UnitEntry) -> Self {
        Self {
            name: entry.name.clone(),
            role: entry.role.to_string(),
            status: entry.status.to_string(),
            address: entry.address.to_string(),
            id: entry.short_id().to_string(),
        }
    }
}

/// Print registry entries in the specified format
pub fn print_entries(entries: &[UnitEntry], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("{}", "No units".dimmed());
            } else {
                let rows: Vec<UnitRow> = entries.iter().map(UnitRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => print_single(&entries, format)?,
    }
    Ok(())
}

/// Print a single item in the specified format
pub fn print_single<T: Serialize>(data: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(data)?);
        }
    }
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}
