//! Utility consumption and cost calculator
//!
//! Turns machine nameplate figures, a quantity, operating hours and a tariff
//! table into usage (kWh, m³, kg) and cost figures. Everything here is pure:
//! no I/O, no shared state, and bad input degrades to 0 instead of failing.

use std::collections::BTreeMap;
use std::fmt;

use crate::models::{CartItem, Machine, MachineFamily, UsageResult, UtilityKind};
use crate::numeric::finite_or_zero;
use crate::rates::{CategoryRates, RateKey};

/// BTU of burner input per kg of gas
pub const BTU_TO_KG_GAS: f64 = 47654.2;
/// Fixed burner efficiency for dryers and ironers
pub const GAS_EFFICIENCY: f64 = 0.6;
/// Temperature rise for hot-wash water, in °C
pub const HOT_WATER_TEMP_RISE: f64 = 60.0;
/// Empirical lb-per-gallon factor for water heating
pub const WATER_HEAT_FACTOR: f64 = 8.34;
/// Heat per unit of gas used for the hot-water gas equivalent
pub const HOT_WATER_HEAT_CONSTANT: f64 = 46452.0;
pub const LITERS_PER_CUBIC_METER: f64 = 1000.0;

/// Gas (kg) needed to heat one load's hot water
pub fn hot_water_gas_kg(hot_water_l: f64) -> f64 {
    hot_water_l * WATER_HEAT_FACTOR * HOT_WATER_TEMP_RISE / HOT_WATER_HEAT_CONSTANT
}

/// Gas (kg) burned per operating hour by a burner with the given rating
pub fn burner_gas_kg(gas_btu: f64) -> f64 {
    gas_btu / BTU_TO_KG_GAS * GAS_EFFICIENCY
}

/// Usage and cost of `quantity` machines run for `hours`.
///
/// Zero quantity or zero hours is the "not configured yet" case and yields
/// an all-zero result. Gas is only modelled for washers (hot-water heating),
/// dryers and ironers; other families never use gas.
pub fn compute_usage(
    machine: &Machine,
    quantity: u32,
    hours: f64,
    rates: &CategoryRates,
) -> UsageResult {
    if quantity == 0 || hours == 0.0 || !hours.is_finite() {
        return UsageResult::default();
    }

    let scale = f64::from(quantity) * hours;
    if !scale.is_finite() {
        return UsageResult::default();
    }
    let tariff = rates.get(&RateKey::for_machine(machine));
    let scaled = |per_unit: f64| finite_or_zero(per_unit * scale);

    let mut usage = UsageResult {
        raw_electricity: scaled(finite_or_zero(machine.total_load_kw)),
        ..Default::default()
    };

    match machine.family {
        MachineFamily::Washer => {
            let cold_l = finite_or_zero(machine.cold_water_l);
            let hot_l = finite_or_zero(machine.hot_water_l);
            usage.raw_cold_water = scaled(cold_l / LITERS_PER_CUBIC_METER);
            usage.raw_hot_water = scaled(hot_l / LITERS_PER_CUBIC_METER);
            if hot_l != 0.0 {
                usage.raw_gas_hot_water = scaled(hot_water_gas_kg(hot_l));
            }
        }
        MachineFamily::Dryer => {
            usage.raw_gas_dryer = scaled(burner_gas_kg(finite_or_zero(machine.gas_btu)));
        }
        MachineFamily::Ironer => {
            usage.raw_gas_ironer = scaled(burner_gas_kg(finite_or_zero(machine.gas_btu)));
        }
        MachineFamily::Other => {}
    }

    let priced = |raw: f64, rate: f64| finite_or_zero(raw * finite_or_zero(rate));
    usage.electricity = priced(usage.raw_electricity, tariff.electricity);
    usage.water_cold = priced(usage.raw_cold_water, tariff.water_cold);
    usage.water_hot = priced(usage.raw_hot_water, tariff.water_hot);
    // at most one raw gas source is non-zero for any machine
    usage.gas = priced(usage.raw_gas_total(), tariff.gas);
    usage
}

/// Usage for a single load (one operating hour)
pub fn per_load(machine: &Machine, quantity: u32, rates: &CategoryRates) -> UsageResult {
    compute_usage(machine, quantity, 1.0, rates)
}

/// One result per cart item, in cart order
pub fn per_item(items: &[CartItem], hours: f64, rates: &CategoryRates) -> Vec<UsageResult> {
    items
        .iter()
        .map(|item| compute_usage(&item.machine, item.quantity, hours, rates))
        .collect()
}

/// Field-wise totals over all cart items
pub fn aggregate(items: &[CartItem], hours: f64, rates: &CategoryRates) -> UsageResult {
    let totals: UsageResult = items
        .iter()
        .map(|item| compute_usage(&item.machine, item.quantity, hours, rates))
        .sum();
    tracing::debug!(
        items = items.len(),
        hours,
        grand_total = totals.grand_total(),
        "aggregated cart usage"
    );
    totals
}

/// Time span a summary covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Period {
    /// The cart's daily operating hours
    #[default]
    Day,
    /// One load, i.e. one operating hour
    Load,
}

impl Period {
    pub fn label(self) -> &'static str {
        match self {
            Period::Day => "per Day",
            Period::Load => "per Load",
        }
    }
}

/// Which figures a summary shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Currency,
    Usage,
}

impl std::str::FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "currency" | "cost" => Ok(View::Currency),
            "usage" | "raw" => Ok(View::Usage),
            other => Err(format!("unknown view '{other}' (expected currency or usage)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineItem {
    pub name: String,
    pub family: MachineFamily,
    pub quantity: u32,
    pub usage: UsageResult,
}

/// Per-item and total figures for a cart, ready for display
#[derive(Debug, Clone)]
pub struct CostSummary {
    pub period: Period,
    pub hours: f64,
    pub lines: Vec<LineItem>,
    pub totals: UsageResult,
    pub view: View,
    pub currency: String,
}

/// Build a daily summary for a set of cart items
pub fn summarize(
    items: &[CartItem],
    hours: f64,
    rates: &CategoryRates,
    view: View,
    currency: &str,
) -> CostSummary {
    build_summary(items, Period::Day, hours, rates, view, currency)
}

/// Build a single-load summary (one operating hour per machine)
pub fn summarize_per_load(
    items: &[CartItem],
    rates: &CategoryRates,
    view: View,
    currency: &str,
) -> CostSummary {
    build_summary(items, Period::Load, 1.0, rates, view, currency)
}

fn build_summary(
    items: &[CartItem],
    period: Period,
    hours: f64,
    rates: &CategoryRates,
    view: View,
    currency: &str,
) -> CostSummary {
    let lines: Vec<LineItem> = items
        .iter()
        .zip(per_item(items, hours, rates))
        .map(|(item, usage)| LineItem {
            name: item.machine.display_name().to_string(),
            family: item.machine.family,
            quantity: item.quantity,
            usage,
        })
        .collect();

    CostSummary {
        period,
        hours,
        totals: lines.iter().map(|l| l.usage).sum(),
        lines,
        view,
        currency: currency.to_string(),
    }
}

impl CostSummary {
    fn money(&self, value: f64) -> String {
        format!("{}{:.2}", self.currency, value)
    }
}

impl fmt::Display for CostSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Cost and Consumption {} ===", self.period.label())?;
        match self.period {
            Period::Day => writeln!(f, "Operating hours: {}", self.hours)?,
            Period::Load => writeln!(f, "Single load ({} h per machine)", self.hours)?,
        }
        writeln!(f)?;

        match self.view {
            View::Currency => {
                writeln!(
                    f,
                    "{:<28} {:>4} {:>14} {:>14} {:>14} {:>14}",
                    "Machine", "Qty", "Electricity", "Gas", "Cold Water", "Hot Water"
                )?;
                writeln!(f, "{}", "-".repeat(93))?;
                for line in &self.lines {
                    writeln!(
                        f,
                        "{:<28} {:>4} {:>14} {:>14} {:>14} {:>14}",
                        line.name,
                        line.quantity,
                        self.money(line.usage.electricity),
                        self.money(line.usage.gas),
                        self.money(line.usage.water_cold),
                        self.money(line.usage.water_hot),
                    )?;
                }
            }
            View::Usage => {
                writeln!(
                    f,
                    "{:<28} {:>4} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
                    "Machine", "Qty", "kWh", "Gas W kg", "Gas D kg", "Gas I kg", "Cold m³", "Hot m³"
                )?;
                writeln!(f, "{}", "-".repeat(99))?;
                for line in &self.lines {
                    let u = &line.usage;
                    writeln!(
                        f,
                        "{:<28} {:>4} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
                        line.name,
                        line.quantity,
                        u.raw_electricity,
                        u.raw_gas_hot_water,
                        u.raw_gas_dryer,
                        u.raw_gas_ironer,
                        u.raw_cold_water,
                        u.raw_hot_water,
                    )?;
                }
            }
        }
        writeln!(f)?;

        let t = &self.totals;
        writeln!(f, "Energy:")?;
        writeln!(
            f,
            "  Electricity: {} ({:.2} kWh)",
            self.money(t.electricity),
            t.raw_electricity
        )?;
        writeln!(
            f,
            "  Gas:         {} (dryer {:.2} kg, ironer {:.2} kg)",
            self.money(t.gas),
            t.raw_gas_dryer,
            t.raw_gas_ironer
        )?;
        writeln!(f, "Water:")?;
        writeln!(
            f,
            "  Cold Water:  {} ({:.2} m³)",
            self.money(t.water_cold),
            t.raw_cold_water
        )?;
        writeln!(
            f,
            "  Hot Wash:    {} ({:.2} m³, gas {:.2} kg)",
            self.money(t.water_hot),
            t.raw_hot_water,
            t.raw_gas_hot_water
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "Grand Total ({}): {}",
            self.period.label(),
            self.money(t.grand_total())
        )?;

        Ok(())
    }
}

/// Rate worksheet: each category in the cart with its rate key, the
/// utilities it is priced on, and per-load cost of each machine.
pub fn format_rate_sheet(items: &[CartItem], rates: &CategoryRates, currency: &str) -> String {
    let mut groups: BTreeMap<RateKey, Vec<&CartItem>> = BTreeMap::new();
    for item in items {
        groups.entry(RateKey::for_machine(&item.machine)).or_default().push(item);
    }

    let mut output = String::new();
    for (key, machines) in groups {
        let tariff = rates.get(&key);
        let heading = if key.label.is_empty() { "Other" } else { key.label.as_str() };
        let key_text = match key.to_string() {
            text if text.is_empty() => "(blank)".to_string(),
            text => text,
        };
        let utilities = key.family.applicable_utilities();

        output.push_str(&format!("{heading}  [rate key: {key_text}]\n"));
        for utility in utilities {
            output.push_str(&format!(
                "  {:<24} {}{:.2}\n",
                utility.label(),
                currency,
                tariff.rate(*utility)
            ));
        }

        for item in machines {
            let cost = per_load(&item.machine, item.quantity, rates);
            output.push_str(&format!(
                "    {} x{}: ",
                item.machine.display_name(),
                item.quantity
            ));
            let parts: Vec<String> = utilities
                .iter()
                .map(|u| format!("{} {}{:.2}", short_label(*u), currency, cost.cost(*u)))
                .collect();
            output.push_str(&parts.join(", "));
            output.push_str(" per load\n");
        }
        output.push('\n');
    }
    output
}

fn short_label(utility: UtilityKind) -> &'static str {
    match utility {
        UtilityKind::Electricity => "elec",
        UtilityKind::WaterCold => "cold",
        UtilityKind::WaterHot => "hot",
        UtilityKind::Gas => "gas",
    }
}
