//! Device list input.
//!
//! The list is a CSV file whose first column holds external device ids. An
//! optional header row is recognised by its first cell.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::info;

use crate::core::UpgradeError;

const HEADER_NAMES: [&str; 3] = ["external_id", "device_id", "id"];

/// Read, deduplicate and sort the external ids in `path`.
///
/// An unreadable file or one without any ids is an error: there is nothing to upgrade.
pub fn read_devices(path: &Path) -> Result<Vec<String>, UpgradeError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| UpgradeError::DeviceList(format!("{}: {e}", path.display())))?;

    let devices = parse_devices(reader)
        .map_err(|e| UpgradeError::DeviceList(format!("{}: {e}", path.display())))?;

    if devices.is_empty() {
        return Err(UpgradeError::DeviceList(format!(
            "no devices to process in {}",
            path.display()
        )));
    }

    info!(count = devices.len(), file = %path.display(), "Loaded device external IDs");
    Ok(devices)
}

fn parse_devices<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<String>, csv::Error> {
    let mut unique = BTreeSet::new();
    let mut first = true;

    for record in reader.records() {
        let record = record?;
        let Some(cell) = record.get(0) else {
            continue;
        };
        let cell = cell.trim_start_matches('\u{feff}').trim();

        if first {
            first = false;
            if HEADER_NAMES.iter().any(|h| cell.eq_ignore_ascii_case(h)) {
                continue;
            }
        }
        if !cell.is_empty() {
            unique.insert(cell.to_string());
        }
    }

    Ok(unique.into_iter().collect())
}
