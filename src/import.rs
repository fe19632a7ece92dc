//! Machine catalog import from JSON exports
//!
//! Reads catalog collections (`mep_washer.json`, `mep_dryer.json`, ...) from a
//! directory tree. A file holds either an array of machine documents or an
//! object keyed by document id. Numeric fields are read leniently and the
//! machine family is classified once here, at ingestion.
//!
//! Carts travel as JSON documents too: hours, machine lines and the rate
//! table, with hours and quantities read as leniently as catalog numbers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::db;
use crate::models::{Cart, Machine};
use crate::numeric::{lenient_f64, lenient_quantity, value_to_f64, value_to_text};
use crate::rates::CategoryRates;

/// A machine document as found in catalog exports
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MachineDocument {
    pub id: Value,
    pub model: Value,
    pub category: Value,
    pub capacity: Value,
    pub total_load: Value,
    #[serde(rename = "gasBTU")]
    pub gas_btu: Value,
    pub cold_water: Value,
    pub hot_water: Value,
    pub exhaust: Value,
}

impl MachineDocument {
    /// Build a catalog machine. The collection name stands in for a
    /// missing category and `fallback_id` for a missing id.
    pub fn into_machine(self, fallback_id: &str, collection: &str) -> Machine {
        let id = value_to_text(&self.id).unwrap_or_else(|| fallback_id.to_string());
        let model = value_to_text(&self.model).unwrap_or_default();
        let category = value_to_text(&self.category).unwrap_or_else(|| collection.to_string());

        let mut machine = Machine::new(id, model, category)
            .with_load(value_to_f64(&self.total_load))
            .with_gas_btu(value_to_f64(&self.gas_btu))
            .with_water(
                value_to_f64(&self.cold_water["waterConsump"]),
                value_to_f64(&self.hot_water["waterConsump"]),
            )
            .with_exhaust(value_to_f64(&self.exhaust["volume"]));
        machine.capacity = value_to_text(&self.capacity);
        machine
    }
}

/// Find all catalog JSON files under a directory, in a stable order
pub fn find_catalog_files(catalog_dir: &Path) -> Result<Vec<PathBuf>> {
    if !catalog_dir.is_dir() {
        bail!("{} is not a directory", catalog_dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(catalog_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Parse one catalog file into machines. Entries that are not JSON objects
/// are counted in the returned skip count.
pub fn parse_catalog_file(filepath: &Path) -> Result<(Vec<Machine>, usize)> {
    let content = fs::read_to_string(filepath)
        .with_context(|| format!("Failed to read {}", filepath.display()))?;
    let root: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", filepath.display()))?;

    let collection = filepath
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("machines");

    let entries: Vec<(String, Value)> = match root {
        Value::Array(docs) => docs
            .into_iter()
            .enumerate()
            .map(|(i, doc)| (format!("{collection}-{}", i + 1), doc))
            .collect(),
        Value::Object(map) => map.into_iter().collect(),
        _ => bail!(
            "{}: expected an array or object of machine documents",
            filepath.display()
        ),
    };

    let mut machines = Vec::new();
    let mut skipped = 0;
    for (doc_id, doc) in entries {
        if !doc.is_object() {
            tracing::warn!(file = %filepath.display(), doc = %doc_id, "skipping non-object entry");
            skipped += 1;
            continue;
        }
        let document: MachineDocument = serde_json::from_value(doc)
            .with_context(|| format!("{}: bad document {doc_id}", filepath.display()))?;
        machines.push(document.into_machine(&doc_id, collection));
    }
    Ok((machines, skipped))
}

/// Import every catalog file under `catalog_dir` into the database
pub fn import_to_database(conn: &Connection, catalog_dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    tracing::info!(dir = %catalog_dir.display(), "scanning for catalog files");
    let files = find_catalog_files(catalog_dir)?;
    tracing::info!(count = files.len(), "found catalog files");

    for filepath in &files {
        match parse_catalog_file(filepath) {
            Ok((machines, skipped)) => {
                for machine in &machines {
                    db::upsert_machine(conn, machine)?;
                    tracing::debug!(
                        id = %machine.id,
                        family = %machine.family,
                        load_kw = machine.total_load_kw,
                        "imported machine"
                    );
                }
                stats.files += 1;
                stats.machines += machines.len();
                stats.skipped += skipped;
                tracing::info!(
                    file = %filepath.display(),
                    machines = machines.len(),
                    "parsed catalog file"
                );
            }
            Err(e) => {
                tracing::warn!("{e:#}");
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub machines: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} machines from {} files. Skipped: {}, Errors: {}",
            self.machines, self.files, self.skipped, self.errors
        )
    }
}

/// A small catalog for trying the tool without an export
pub fn sample_catalog() -> Vec<Machine> {
    vec![
        Machine::new("WX-60", "WX-60 Softmount Washer", "mep_washer")
            .with_capacity("60 kg")
            .with_load(5.5)
            .with_water(420.0, 180.0),
        Machine::new("WX-25", "WX-25 Hardmount Washer", "mep_washer")
            .with_capacity("25 kg")
            .with_load(2.5)
            .with_water(40.0, 20.0),
        Machine::new("TD-55G", "TD-55 Gas Tumble Dryer", "mep_dryer")
            .with_capacity("55 kg")
            .with_load(1.5)
            .with_gas_btu(150000.0)
            .with_exhaust(2600.0),
        Machine::new("TD-30G", "TD-30 Gas Tumble Dryer", "mep_dryer")
            .with_capacity("30 kg")
            .with_load(0.75)
            .with_gas_btu(50000.0)
            .with_exhaust(1100.0),
        Machine::new("FI-3300", "FI-3300 Flatwork Ironer", "mep_ironer")
            .with_capacity("3300 mm roll")
            .with_load(3.2)
            .with_gas_btu(96000.0)
            .with_exhaust(1800.0),
    ]
}

/// Replace the catalog with the sample machines
pub fn load_sample(conn: &Connection) -> Result<usize> {
    db::clear_catalog(conn)?;
    let machines = sample_catalog();
    for machine in &machines {
        db::upsert_machine(conn, machine)?;
    }
    Ok(machines.len())
}

/// A cart as exchanged in JSON files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDocument {
    #[serde(default = "default_hours", deserialize_with = "lenient_f64")]
    pub hours: f64,
    #[serde(default)]
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub rates: CategoryRates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(alias = "id")]
    pub machine_id: String,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub quantity: u32,
}

fn default_hours() -> f64 {
    db::DEFAULT_HOURS
}

impl From<&Cart> for CartDocument {
    fn from(cart: &Cart) -> Self {
        CartDocument {
            hours: cart.hours,
            items: cart
                .items
                .iter()
                .map(|item| CartLine {
                    machine_id: item.machine.id.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            rates: cart.rates.clone(),
        }
    }
}

/// Read a cart document from a JSON file
pub fn read_cart_document(path: &Path) -> Result<CartDocument> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid cart file {}", path.display()))
}

/// Store a cart document as a new cart and return its id.
///
/// Every machine must already be in the catalog; nothing is written
/// otherwise. Repeated lines for one machine are added together.
pub fn import_cart(conn: &Connection, document: &CartDocument, created_at: &str) -> Result<i64> {
    let mut lines: Vec<(&str, u32)> = Vec::new();
    for line in &document.items {
        match lines.iter_mut().find(|(id, _)| *id == line.machine_id) {
            Some((_, quantity)) => *quantity = quantity.saturating_add(line.quantity),
            None => lines.push((line.machine_id.as_str(), line.quantity)),
        }
    }

    let mut missing = Vec::new();
    for (machine_id, _) in &lines {
        if db::get_machine(conn, machine_id)?.is_none() {
            missing.push(*machine_id);
        }
    }
    if !missing.is_empty() {
        bail!("machines not in catalog: {}", missing.join(", "));
    }

    let tx = conn.unchecked_transaction()?;
    let cart_id = db::create_cart(&tx, created_at)?;
    db::set_hours(&tx, cart_id, document.hours)?;
    for (machine_id, quantity) in &lines {
        db::put_line(&tx, cart_id, machine_id, *quantity)?;
    }
    db::replace_rates(&tx, cart_id, &document.rates)?;
    tx.commit()?;

    tracing::info!(cart = cart_id, lines = lines.len(), "imported cart");
    Ok(cart_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MachineFamily;
    use serde_json::json;

    #[test]
    fn test_document_into_machine() {
        let doc: MachineDocument = serde_json::from_value(json!({
            "model": "WX-40",
            "capacity": 40,
            "totalLoad": "2.5",
            "coldWater": {"waterConsump": "40 L"},
            "hotWater": {"waterConsump": 20},
            "exhaust": {"volume": ""}
        }))
        .unwrap();
        let machine = doc.into_machine("doc-1", "mep_washer");

        assert_eq!(machine.id, "doc-1");
        assert_eq!(machine.category, "mep_washer");
        assert_eq!(machine.family, MachineFamily::Washer);
        assert_eq!(machine.capacity.as_deref(), Some("40"));
        assert_eq!(machine.total_load_kw, 2.5);
        assert_eq!(machine.cold_water_l, 40.0);
        assert_eq!(machine.hot_water_l, 20.0);
        assert_eq!(machine.exhaust_m3h, 0.0);
    }

    #[test]
    fn test_document_fields_win_over_fallbacks() {
        let doc: MachineDocument = serde_json::from_value(json!({
            "id": "D-9",
            "category": "TUMBLE DRYER",
            "gasBTU": 50000,
            "coldWater": "n/a"
        }))
        .unwrap();
        let machine = doc.into_machine("doc-1", "mep_washer");

        assert_eq!(machine.id, "D-9");
        assert_eq!(machine.family, MachineFamily::Dryer);
        assert_eq!(machine.gas_btu, 50000.0);
        assert_eq!(machine.cold_water_l, 0.0);
    }

    #[test]
    fn test_cart_document_reads_leniently() {
        let doc: CartDocument = serde_json::from_value(json!({
            "hours": "10 h",
            "items": [
                {"machineId": "WX-25", "quantity": "3"},
                {"id": "TD-30G", "quantity": 2.9},
                {"machineId": "FI-3300", "quantity": ""},
                {"machineId": "WX-60"}
            ],
            "rates": {"washer_mep_washer": {"electricity": "12.5"}}
        }))
        .unwrap();

        assert_eq!(doc.hours, 10.0);
        let quantities: Vec<u32> = doc.items.iter().map(|l| l.quantity).collect();
        assert_eq!(quantities, vec![3, 2, 0, 0]);
        assert_eq!(doc.items[1].machine_id, "TD-30G");
        assert_eq!(doc.rates.for_category("mep_washer").electricity, 12.5);
    }

    #[test]
    fn test_cart_document_defaults() {
        let doc: CartDocument = serde_json::from_value(json!({})).unwrap();
        assert_eq!(doc.hours, db::DEFAULT_HOURS);
        assert!(doc.items.is_empty());
        assert!(doc.rates.is_empty());
    }

    #[test]
    fn test_sample_catalog_covers_families() {
        let machines = sample_catalog();
        for family in [MachineFamily::Washer, MachineFamily::Dryer, MachineFamily::Ironer] {
            assert!(machines.iter().any(|m| m.family == family));
        }
    }
}
