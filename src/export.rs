//! Consumption sheet export
//!
//! One column per machine (machines sharing a display name are merged), a
//! final "Total Consumption" column, nameplate sections first and the
//! computed daily usage and cost sections after them.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::calculator::{aggregate, per_item};
use crate::models::{CartItem, UsageResult};
use crate::rates::CategoryRates;

/// Nameplate and computed figures for one merged column
#[derive(Debug, Clone, Default)]
struct Column {
    name: String,
    total_load_kw: f64,
    gas_btu: f64,
    cold_water_l: f64,
    hot_water_l: f64,
    exhaust_m3h: f64,
    usage: UsageResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionSheet {
    pub rows: Vec<Vec<String>>,
}

fn merge_columns(items: &[CartItem], usages: &[UsageResult]) -> Vec<Column> {
    let mut columns: Vec<Column> = Vec::new();
    for (i, (item, usage)) in items.iter().zip(usages).enumerate() {
        let m = &item.machine;
        let name = match m.display_name().trim() {
            "" => format!("Machine {}", i + 1),
            name => name.to_string(),
        };

        let index = match columns.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                columns.push(Column {
                    name,
                    ..Default::default()
                });
                columns.len() - 1
            }
        };
        let column = &mut columns[index];
        column.total_load_kw += m.total_load_kw;
        column.gas_btu += m.gas_btu;
        column.cold_water_l += m.cold_water_l;
        column.hot_water_l += m.hot_water_l;
        column.exhaust_m3h += m.exhaust_m3h;
        column.usage += *usage;
    }
    columns
}

fn metric_row(label: &str, columns: &[Column], value: impl Fn(&Column) -> f64, total: f64, precision: usize) -> Vec<String> {
    let mut row = vec![label.to_string()];
    row.extend(columns.iter().map(|c| format!("{:.*}", precision, value(c))));
    row.push(format!("{total:.precision$}"));
    row
}

fn nameplate_row(label: &str, columns: &[Column], value: impl Fn(&Column) -> f64) -> Vec<String> {
    let mut row = vec![label.to_string()];
    row.extend(columns.iter().map(|c| value(c).to_string()));
    row.push(columns.iter().map(&value).sum::<f64>().to_string());
    row
}

fn section(title: &str) -> [Vec<String>; 2] {
    [Vec::new(), vec![title.to_string()]]
}

/// Build the sheet for a cart
pub fn build_sheet(items: &[CartItem], hours: f64, rates: &CategoryRates) -> ConsumptionSheet {
    let usages = per_item(items, hours, rates);
    let totals = aggregate(items, hours, rates);
    let columns = merge_columns(items, &usages);

    let mut header = vec!["Type".to_string()];
    header.extend(columns.iter().map(|c| c.name.clone()));
    header.push("Total Consumption".to_string());

    let mut model_row = vec!["Model".to_string()];
    model_row.extend(columns.iter().map(|c| c.name.clone()));
    model_row.push(String::new());

    let mut rows = vec![header, model_row];

    rows.extend(section("ELECTRICITY"));
    rows.push(nameplate_row("Average Consumption (kW)", &columns, |c| c.total_load_kw));
    rows.extend(section("GAS"));
    rows.push(nameplate_row("Gas BTU Consumption (BTU/h)", &columns, |c| c.gas_btu));
    rows.extend(section("COLD WATER"));
    rows.push(nameplate_row("Water Consumption (Liters)", &columns, |c| c.cold_water_l));
    rows.extend(section("HOT WATER"));
    rows.push(nameplate_row("Water Consumption (Liters)", &columns, |c| c.hot_water_l));
    rows.extend(section("EXHAUST"));
    rows.push(nameplate_row("Volume (m³/h)", &columns, |c| c.exhaust_m3h));

    rows.extend(section(&format!("DAILY USAGE ({hours} h)")));
    rows.push(metric_row("Electricity (kWh)", &columns, |c| c.usage.raw_electricity, totals.raw_electricity, 3));
    rows.push(metric_row("Cold Water (m³)", &columns, |c| c.usage.raw_cold_water, totals.raw_cold_water, 3));
    rows.push(metric_row("Hot Water (m³)", &columns, |c| c.usage.raw_hot_water, totals.raw_hot_water, 3));
    rows.push(metric_row("Gas - Washer Hot Water (kg)", &columns, |c| c.usage.raw_gas_hot_water, totals.raw_gas_hot_water, 3));
    rows.push(metric_row("Gas - Dryer (kg)", &columns, |c| c.usage.raw_gas_dryer, totals.raw_gas_dryer, 3));
    rows.push(metric_row("Gas - Ironer (kg)", &columns, |c| c.usage.raw_gas_ironer, totals.raw_gas_ironer, 3));

    rows.extend(section("DAILY COST"));
    rows.push(metric_row("Electricity", &columns, |c| c.usage.electricity, totals.electricity, 2));
    rows.push(metric_row("Gas", &columns, |c| c.usage.gas, totals.gas, 2));
    rows.push(metric_row("Cold Water", &columns, |c| c.usage.water_cold, totals.water_cold, 2));
    rows.push(metric_row("Hot Water", &columns, |c| c.usage.water_hot, totals.water_hot, 2));
    rows.push(metric_row("Grand Total", &columns, |c| c.usage.grand_total(), totals.grand_total(), 2));

    ConsumptionSheet { rows }
}

impl ConsumptionSheet {
    /// Number of merged machine columns
    pub fn machine_columns(&self) -> usize {
        self.rows.first().map_or(0, |header| header.len().saturating_sub(2))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        for row in &self.rows {
            csv.write_record(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv(file)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), rows = self.rows.len(), "wrote consumption sheet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Machine;

    #[test]
    fn test_duplicate_names_merge_into_one_column() {
        let a = Machine::new("a", "TD-30", "mep_dryer").with_gas_btu(50000.0);
        let b = Machine::new("b", "TD-30", "mep_dryer").with_gas_btu(50000.0);
        let items = vec![CartItem::new(a, 1), CartItem::new(b, 2)];
        let sheet = build_sheet(&items, 8.0, &CategoryRates::new());

        assert_eq!(sheet.machine_columns(), 1);
        assert_eq!(sheet.rows[0], vec!["Type", "TD-30", "Total Consumption"]);

        let gas = sheet.rows.iter().find(|r| r[0] == "Gas BTU Consumption (BTU/h)").unwrap();
        assert_eq!(gas[1], "100000");
        assert_eq!(gas[2], "100000");
    }

    #[test]
    fn test_blank_names_fall_back_to_position() {
        let blank = Machine::new("x", "", "");
        let items = vec![CartItem::new(blank, 1)];
        let sheet = build_sheet(&items, 8.0, &CategoryRates::new());
        assert_eq!(sheet.rows[0][1], "Machine 1");
    }
}
