//! Database schema and operations for the machine catalog and saved carts

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Result, StoreError};
use crate::models::{Cart, CartItem, Machine, MachineFamily, Tariff, UsageResult, UtilityKind};
use crate::numeric::{clamp_rate, finite_or_zero};
use crate::rates::{CategoryRates, RateKey};

/// Operating hours given to a new cart
pub const DEFAULT_HOURS: f64 = 12.0;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Machine catalog
        CREATE TABLE IF NOT EXISTS machines (
            id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            category TEXT NOT NULL,
            family TEXT NOT NULL,
            capacity TEXT,
            total_load_kw REAL NOT NULL DEFAULT 0,
            gas_btu REAL NOT NULL DEFAULT 0,
            cold_water_l REAL NOT NULL DEFAULT 0,
            hot_water_l REAL NOT NULL DEFAULT 0,
            exhaust_m3h REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS carts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            hours REAL NOT NULL DEFAULT 12,
            totals TEXT
        );

        CREATE TABLE IF NOT EXISTS cart_items (
            cart_id INTEGER NOT NULL,
            machine_id TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (cart_id, machine_id)
        );

        -- One tariff row per (family, raw category label)
        CREATE TABLE IF NOT EXISTS cart_rates (
            cart_id INTEGER NOT NULL,
            family TEXT NOT NULL,
            label TEXT NOT NULL,
            electricity REAL NOT NULL DEFAULT 0,
            water_cold REAL NOT NULL DEFAULT 0,
            water_hot REAL NOT NULL DEFAULT 0,
            gas REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (cart_id, family, label)
        );

        CREATE INDEX IF NOT EXISTS idx_machines_family ON machines(family);
        CREATE INDEX IF NOT EXISTS idx_cart_items_cart ON cart_items(cart_id);
        CREATE INDEX IF NOT EXISTS idx_cart_rates_cart ON cart_rates(cart_id);
        "#,
    )?;
    Ok(())
}

const MACHINE_COLUMNS: &str = "id, model, category, family, capacity, total_load_kw, gas_btu, cold_water_l, hot_water_l, exhaust_m3h";

fn machine_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<(Machine, String)> {
    let family: String = row.get(offset + 3)?;
    Ok((
        Machine {
            id: row.get(offset)?,
            model: row.get(offset + 1)?,
            category: row.get(offset + 2)?,
            family: MachineFamily::Other,
            capacity: row.get(offset + 4)?,
            total_load_kw: row.get(offset + 5)?,
            gas_btu: row.get(offset + 6)?,
            cold_water_l: row.get(offset + 7)?,
            hot_water_l: row.get(offset + 8)?,
            exhaust_m3h: row.get(offset + 9)?,
        },
        family,
    ))
}

fn with_family((mut machine, family): (Machine, String)) -> Result<Machine> {
    machine.family = family.parse()?;
    Ok(machine)
}

/// Insert or replace a catalog machine
pub fn upsert_machine(conn: &Connection, machine: &Machine) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO machines (id, model, category, family, capacity, total_load_kw, gas_btu, cold_water_l, hot_water_l, exhaust_m3h)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            machine.id,
            machine.model,
            machine.category,
            machine.family.as_str(),
            machine.capacity,
            finite_or_zero(machine.total_load_kw),
            finite_or_zero(machine.gas_btu),
            finite_or_zero(machine.cold_water_l),
            finite_or_zero(machine.hot_water_l),
            finite_or_zero(machine.exhaust_m3h),
        ],
    )?;
    Ok(())
}

/// Remove every catalog machine (for re-import). Carts are kept; their lines
/// load again once the machines are re-imported under the same ids.
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM machines", [])?;
    Ok(())
}

/// Look up one catalog machine
pub fn get_machine(conn: &Connection, id: &str) -> Result<Option<Machine>> {
    let sql = format!("SELECT {MACHINE_COLUMNS} FROM machines WHERE id = ?1");
    let row = conn
        .query_row(&sql, [id], |row| machine_from_row(row, 0))
        .optional()?;
    row.map(with_family).transpose()
}

/// List catalog machines, optionally restricted to one family
pub fn list_machines(conn: &Connection, family: Option<MachineFamily>) -> Result<Vec<Machine>> {
    let sql = format!(
        "SELECT {MACHINE_COLUMNS} FROM machines
         WHERE ?1 IS NULL OR family = ?1
         ORDER BY category, model"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([family.map(MachineFamily::as_str)], |row| {
        machine_from_row(row, 0)
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(with_family(row?)?);
    }
    Ok(results)
}

/// Distinct catalog categories with their machine counts
pub fn list_categories(conn: &Connection) -> Result<Vec<(String, usize)>> {
    let mut stmt =
        conn.prepare("SELECT category, COUNT(*) FROM machines GROUP BY category ORDER BY category")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (category, count) = row?;
        results.push((category, usize::try_from(count).unwrap_or_default()));
    }
    Ok(results)
}

/// Header information for a stored cart
#[derive(Debug, Clone)]
pub struct CartInfo {
    pub id: i64,
    pub created_at: String,
    pub hours: f64,
    pub lines: usize,
    pub machines: u64,
    pub saved_total: Option<f64>,
}

/// Create an empty cart and return its id
pub fn create_cart(conn: &Connection, created_at: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO carts (created_at, hours) VALUES (?1, ?2)",
        params![created_at, DEFAULT_HOURS],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(cart = id, "created cart");
    Ok(id)
}

fn ensure_cart(conn: &Connection, cart_id: i64) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT id FROM carts WHERE id = ?1", [cart_id], |row| row.get(0))
        .optional()?;
    exists.map(|_| ()).ok_or(StoreError::CartNotFound(cart_id))
}

/// All carts, newest first
pub fn list_carts(conn: &Connection) -> Result<Vec<CartInfo>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.created_at, c.hours, c.totals,
                COUNT(ci.machine_id), COALESCE(SUM(ci.quantity), 0)
         FROM carts c
         LEFT JOIN cart_items ci ON ci.cart_id = c.id
         GROUP BY c.id
         ORDER BY c.created_at DESC, c.id DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (id, created_at, hours, totals, lines, machines) = row?;
        let saved_total = match totals {
            Some(json) => Some(serde_json::from_str::<UsageResult>(&json)?.grand_total()),
            None => None,
        };
        results.push(CartInfo {
            id,
            created_at,
            hours,
            lines: usize::try_from(lines).unwrap_or_default(),
            machines: u64::try_from(machines).unwrap_or_default(),
            saved_total,
        });
    }
    Ok(results)
}

/// Delete a cart with its items and rates
pub fn delete_cart(conn: &Connection, cart_id: i64) -> Result<()> {
    ensure_cart(conn, cart_id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM cart_items WHERE cart_id = ?1", [cart_id])?;
    tx.execute("DELETE FROM cart_rates WHERE cart_id = ?1", [cart_id])?;
    tx.execute("DELETE FROM carts WHERE id = ?1", [cart_id])?;
    tx.commit()?;
    tracing::info!(cart = cart_id, "deleted cart");
    Ok(())
}

/// Add one unit of a machine, inserting the line at quantity 1 if needed
pub fn add_to_cart(conn: &Connection, cart_id: i64, machine_id: &str) -> Result<u32> {
    ensure_cart(conn, cart_id)?;
    if get_machine(conn, machine_id)?.is_none() {
        return Err(StoreError::MachineNotFound(machine_id.to_string()));
    }

    conn.execute(
        "INSERT INTO cart_items (cart_id, machine_id, quantity) VALUES (?1, ?2, 1)
         ON CONFLICT(cart_id, machine_id) DO UPDATE SET quantity = quantity + 1",
        params![cart_id, machine_id],
    )?;
    item_quantity(conn, cart_id, machine_id)
}

/// Remove one unit of a machine; the quantity never drops below 1
pub fn remove_one_from_cart(conn: &Connection, cart_id: i64, machine_id: &str) -> Result<u32> {
    let changed = conn.execute(
        "UPDATE cart_items SET quantity = MAX(1, quantity - 1)
         WHERE cart_id = ?1 AND machine_id = ?2",
        params![cart_id, machine_id],
    )?;
    if changed == 0 {
        return Err(not_in_cart(conn, cart_id, machine_id));
    }
    item_quantity(conn, cart_id, machine_id)
}

/// Put a machine line at an exact quantity, inserting it if needed
pub fn put_line(conn: &Connection, cart_id: i64, machine_id: &str, quantity: u32) -> Result<()> {
    ensure_cart(conn, cart_id)?;
    if get_machine(conn, machine_id)?.is_none() {
        return Err(StoreError::MachineNotFound(machine_id.to_string()));
    }

    conn.execute(
        "INSERT INTO cart_items (cart_id, machine_id, quantity) VALUES (?1, ?2, ?3)
         ON CONFLICT(cart_id, machine_id) DO UPDATE SET quantity = excluded.quantity",
        params![cart_id, machine_id, quantity],
    )?;
    Ok(())
}

/// Drop a machine line regardless of quantity
pub fn remove_all_from_cart(conn: &Connection, cart_id: i64, machine_id: &str) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM cart_items WHERE cart_id = ?1 AND machine_id = ?2",
        params![cart_id, machine_id],
    )?;
    if changed == 0 {
        return Err(not_in_cart(conn, cart_id, machine_id));
    }
    Ok(())
}

/// Set a line quantity. Zero is kept and simply contributes nothing.
pub fn set_quantity(conn: &Connection, cart_id: i64, machine_id: &str, quantity: u32) -> Result<()> {
    let changed = conn.execute(
        "UPDATE cart_items SET quantity = ?3 WHERE cart_id = ?1 AND machine_id = ?2",
        params![cart_id, machine_id, quantity],
    )?;
    if changed == 0 {
        return Err(not_in_cart(conn, cart_id, machine_id));
    }
    Ok(())
}

/// Remove every line from a cart
pub fn clear_cart(conn: &Connection, cart_id: i64) -> Result<()> {
    ensure_cart(conn, cart_id)?;
    conn.execute("DELETE FROM cart_items WHERE cart_id = ?1", [cart_id])?;
    Ok(())
}

fn not_in_cart(conn: &Connection, cart_id: i64, machine_id: &str) -> StoreError {
    match ensure_cart(conn, cart_id) {
        Ok(()) => StoreError::NotInCart {
            cart: cart_id,
            machine: machine_id.to_string(),
        },
        Err(e) => e,
    }
}

fn item_quantity(conn: &Connection, cart_id: i64, machine_id: &str) -> Result<u32> {
    let quantity: i64 = conn.query_row(
        "SELECT quantity FROM cart_items WHERE cart_id = ?1 AND machine_id = ?2",
        params![cart_id, machine_id],
        |row| row.get(0),
    )?;
    Ok(u32::try_from(quantity).unwrap_or_default())
}

/// Store operating hours. No range check is applied; non-finite input is stored as 0.
pub fn set_hours(conn: &Connection, cart_id: i64, hours: f64) -> Result<()> {
    ensure_cart(conn, cart_id)?;
    conn.execute(
        "UPDATE carts SET hours = ?2 WHERE id = ?1",
        params![cart_id, finite_or_zero(hours)],
    )?;
    Ok(())
}

fn rate_column(utility: UtilityKind) -> &'static str {
    match utility {
        UtilityKind::Electricity => "electricity",
        UtilityKind::WaterCold => "water_cold",
        UtilityKind::WaterHot => "water_hot",
        UtilityKind::Gas => "gas",
    }
}

/// Set one tariff for a rate key. Negative and non-finite values are stored as 0.
pub fn set_rate(
    conn: &Connection,
    cart_id: i64,
    key: &RateKey,
    utility: UtilityKind,
    value: f64,
) -> Result<f64> {
    ensure_cart(conn, cart_id)?;
    let value = clamp_rate(value);
    let column = rate_column(utility);
    conn.execute(
        &format!(
            "INSERT INTO cart_rates (cart_id, family, label, {column}) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(cart_id, family, label) DO UPDATE SET {column} = excluded.{column}"
        ),
        params![cart_id, key.family.as_str(), key.label, value],
    )?;
    tracing::debug!(cart = cart_id, key = %key, utility = %utility, value, "set rate");
    Ok(value)
}

/// Replace the whole tariff table of a cart
pub fn replace_rates(conn: &Connection, cart_id: i64, rates: &CategoryRates) -> Result<()> {
    ensure_cart(conn, cart_id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM cart_rates WHERE cart_id = ?1", [cart_id])?;
    for (key, tariff) in rates.entries() {
        tx.execute(
            "INSERT INTO cart_rates (cart_id, family, label, electricity, water_cold, water_hot, gas)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                cart_id,
                key.family.as_str(),
                key.label,
                clamp_rate(tariff.electricity),
                clamp_rate(tariff.water_cold),
                clamp_rate(tariff.water_hot),
                clamp_rate(tariff.gas),
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Load the tariff table of a cart
pub fn load_rates(conn: &Connection, cart_id: i64) -> Result<CategoryRates> {
    ensure_cart(conn, cart_id)?;
    let mut stmt = conn.prepare(
        "SELECT family, label, electricity, water_cold, water_hot, gas
         FROM cart_rates WHERE cart_id = ?1",
    )?;
    let rows = stmt.query_map([cart_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            Tariff {
                electricity: row.get(2)?,
                water_cold: row.get(3)?,
                water_hot: row.get(4)?,
                gas: row.get(5)?,
            },
        ))
    })?;

    let mut rates = CategoryRates::new();
    for row in rows {
        let (family, label, tariff) = row?;
        let key = RateKey {
            family: family.parse()?,
            label,
        };
        rates.insert(key, tariff);
    }
    Ok(rates)
}

/// Cart items joined with the catalog, in the order they were added.
///
/// A line whose machine is no longer in the catalog (after `clear_catalog`
/// or a re-import) is an error rather than a silently smaller cart.
pub fn load_items(conn: &Connection, cart_id: i64) -> Result<Vec<CartItem>> {
    let columns: Vec<String> = MACHINE_COLUMNS
        .split(", ")
        .map(|c| format!("m.{c}"))
        .collect();
    let sql = format!(
        "SELECT ci.quantity, ci.machine_id, m.id IS NOT NULL, {} FROM cart_items ci
         LEFT JOIN machines m ON m.id = ci.machine_id
         WHERE ci.cart_id = ?1
         ORDER BY ci.rowid",
        columns.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([cart_id], |row| {
        let quantity: i64 = row.get(0)?;
        let machine_id: String = row.get(1)?;
        let in_catalog: bool = row.get(2)?;
        let machine = if in_catalog {
            Some(machine_from_row(row, 3)?)
        } else {
            None
        };
        Ok((quantity, machine_id, machine))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (quantity, machine_id, machine) = row?;
        let Some(machine) = machine else {
            tracing::warn!(cart = cart_id, machine = %machine_id, "cart line refers to a machine missing from the catalog");
            return Err(StoreError::MachineNotFound(machine_id));
        };
        items.push(CartItem {
            machine: with_family(machine)?,
            quantity: u32::try_from(quantity).unwrap_or_default(),
        });
    }
    Ok(items)
}

/// Load a full cart: hours, items, rates and any saved totals
pub fn load_cart(conn: &Connection, cart_id: i64) -> Result<Cart> {
    let header: Option<(String, f64, Option<String>)> = conn
        .query_row(
            "SELECT created_at, hours, totals FROM carts WHERE id = ?1",
            [cart_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (created_at, hours, totals) = header.ok_or(StoreError::CartNotFound(cart_id))?;

    let totals = match totals {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };

    Ok(Cart {
        id: cart_id,
        created_at,
        hours,
        items: load_items(conn, cart_id)?,
        rates: load_rates(conn, cart_id)?,
        totals,
    })
}

/// Persist computed totals beside the cart
pub fn save_totals(conn: &Connection, cart_id: i64, totals: &UsageResult) -> Result<()> {
    ensure_cart(conn, cart_id)?;
    let json = serde_json::to_string(totals)?;
    conn.execute("UPDATE carts SET totals = ?2 WHERE id = ?1", params![cart_id, json])?;
    tracing::info!(cart = cart_id, grand_total = totals.grand_total(), "saved cart totals");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_machine_round_trip() {
        let conn = setup();
        let machine = Machine::new("w1", "WX-40", "mep_washer")
            .with_load(2.5)
            .with_water(40.0, 20.0)
            .with_capacity("40 kg");
        upsert_machine(&conn, &machine).unwrap();

        let loaded = get_machine(&conn, "w1").unwrap().unwrap();
        assert_eq!(loaded, machine);
        assert!(get_machine(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_list_machines_by_family() {
        let conn = setup();
        upsert_machine(&conn, &Machine::new("w1", "A", "mep_washer")).unwrap();
        upsert_machine(&conn, &Machine::new("d1", "B", "mep_dryer")).unwrap();
        upsert_machine(&conn, &Machine::new("d2", "C", "mep_dryer")).unwrap();

        assert_eq!(list_machines(&conn, None).unwrap().len(), 3);
        let dryers = list_machines(&conn, Some(MachineFamily::Dryer)).unwrap();
        assert_eq!(dryers.len(), 2);
        assert!(dryers.iter().all(|m| m.family == MachineFamily::Dryer));

        let categories = list_categories(&conn).unwrap();
        assert_eq!(categories, vec![("mep_dryer".to_string(), 2), ("mep_washer".to_string(), 1)]);
    }

    #[test]
    fn test_new_cart_defaults() {
        let conn = setup();
        let id = create_cart(&conn, "2026-01-01T00:00:00Z").unwrap();
        let cart = load_cart(&conn, id).unwrap();
        assert_eq!(cart.hours, DEFAULT_HOURS);
        assert!(cart.items.is_empty());
        assert!(cart.rates.is_empty());
        assert!(cart.totals.is_none());
    }

    #[test]
    fn test_missing_cart() {
        let conn = setup();
        assert!(matches!(load_cart(&conn, 42), Err(StoreError::CartNotFound(42))));
        assert!(matches!(set_hours(&conn, 42, 8.0), Err(StoreError::CartNotFound(42))));
    }

    #[test]
    fn test_rate_columns_are_independent() {
        let conn = setup();
        let id = create_cart(&conn, "2026-01-01T00:00:00Z").unwrap();
        let key = RateKey::for_category("mep_washer");
        set_rate(&conn, id, &key, UtilityKind::Electricity, 12.0).unwrap();
        set_rate(&conn, id, &key, UtilityKind::WaterHot, 45.0).unwrap();
        assert_eq!(set_rate(&conn, id, &key, UtilityKind::WaterCold, -1.0).unwrap(), 0.0);

        let tariff = load_rates(&conn, id).unwrap().get(&key);
        assert_eq!(tariff.electricity, 12.0);
        assert_eq!(tariff.water_hot, 45.0);
        assert_eq!(tariff.water_cold, 0.0);
        assert_eq!(tariff.gas, 0.0);
    }
}
