//! Registry listing

use tornet_fleet::{Registry, UnitEntry};

use crate::output::{print_entries, OutputFormat};

/// Keeps the entries whose compact JSON form contains `filter`, in order.
pub fn filter_entries(entries: Vec<UnitEntry>, filter: Option<&str>) -> anyhow::Result<Vec<UnitEntry>> {
    let Some(filter) = filter else {
        return Ok(entries);
    };

    let mut kept = Vec::with_capacity(entries.len());
    for entry in entries {
        if serde_json::to_string(&entry)?.contains(filter) {
            kept.push(entry);
        }
    }
    Ok(kept)
}

/// Execute the list command
pub fn execute(registry: &Registry, filter: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let entries = filter_entries(registry.list()?, filter)?;
    print_entries(&entries, format)
}
