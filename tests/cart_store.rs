use laundry_calc::calculator::{aggregate, compute_usage};
use laundry_calc::db;
use laundry_calc::import::{CartDocument, import_cart, load_sample, read_cart_document};
use laundry_calc::models::UtilityKind;
use laundry_calc::rates::{CategoryRates, resolve_rate_key};
use laundry_calc::{StoreError, UsageResult};
use rusqlite::Connection;
use tempfile::tempdir;

fn setup() -> (Connection, i64) {
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    load_sample(&conn).unwrap();
    let cart = db::create_cart(&conn, "2026-03-01T09:00:00+08:00").unwrap();
    (conn, cart)
}

#[test]
fn test_add_increments_and_remove_stops_at_one() {
    let (conn, cart) = setup();

    assert_eq!(db::add_to_cart(&conn, cart, "WX-25").unwrap(), 1);
    assert_eq!(db::add_to_cart(&conn, cart, "WX-25").unwrap(), 2);
    assert_eq!(db::add_to_cart(&conn, cart, "WX-25").unwrap(), 3);

    assert_eq!(db::remove_one_from_cart(&conn, cart, "WX-25").unwrap(), 2);
    assert_eq!(db::remove_one_from_cart(&conn, cart, "WX-25").unwrap(), 1);
    assert_eq!(db::remove_one_from_cart(&conn, cart, "WX-25").unwrap(), 1);
}

#[test]
fn test_unknown_machine_and_missing_line() {
    let (conn, cart) = setup();

    assert!(matches!(
        db::add_to_cart(&conn, cart, "NOPE"),
        Err(StoreError::MachineNotFound(_))
    ));
    assert!(matches!(
        db::remove_one_from_cart(&conn, cart, "WX-25"),
        Err(StoreError::NotInCart { .. })
    ));
    assert!(matches!(
        db::set_quantity(&conn, 999, "WX-25", 2),
        Err(StoreError::CartNotFound(999))
    ));
}

#[test]
fn test_items_keep_insertion_order() {
    let (conn, cart) = setup();
    for id in ["TD-55G", "WX-60", "FI-3300"] {
        db::add_to_cart(&conn, cart, id).unwrap();
    }

    let items = db::load_items(&conn, cart).unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.machine.id.as_str()).collect();
    assert_eq!(ids, vec!["TD-55G", "WX-60", "FI-3300"]);
}

#[test]
fn test_zero_quantity_line_contributes_nothing() {
    let (conn, cart) = setup();
    db::add_to_cart(&conn, cart, "WX-25").unwrap();
    db::set_quantity(&conn, cart, "WX-25", 0).unwrap();
    db::set_rate(&conn, cart, &resolve_rate_key("mep_washer"), UtilityKind::Electricity, 12.0)
        .unwrap();

    let loaded = db::load_cart(&conn, cart).unwrap();
    assert_eq!(loaded.items.len(), 1);
    assert_eq!(loaded.items[0].quantity, 0);
    assert_eq!(
        aggregate(&loaded.items, loaded.hours, &loaded.rates),
        UsageResult::default()
    );
}

#[test]
fn test_loaded_cart_computes_like_in_memory() {
    let (conn, cart) = setup();
    db::add_to_cart(&conn, cart, "WX-25").unwrap();
    db::add_to_cart(&conn, cart, "WX-25").unwrap();
    db::add_to_cart(&conn, cart, "TD-30G").unwrap();
    db::set_hours(&conn, cart, 8.0).unwrap();

    let washer_key = resolve_rate_key("mep_washer");
    let dryer_key = resolve_rate_key("mep_dryer");
    db::set_rate(&conn, cart, &washer_key, UtilityKind::Electricity, 12.0).unwrap();
    db::set_rate(&conn, cart, &washer_key, UtilityKind::WaterCold, 30.0).unwrap();
    db::set_rate(&conn, cart, &washer_key, UtilityKind::WaterHot, 45.0).unwrap();
    db::set_rate(&conn, cart, &washer_key, UtilityKind::Gas, 60.0).unwrap();
    db::set_rate(&conn, cart, &dryer_key, UtilityKind::Gas, 60.0).unwrap();

    let loaded = db::load_cart(&conn, cart).unwrap();
    assert_eq!(loaded.hours, 8.0);

    let washer = &loaded.items[0];
    assert_eq!(washer.quantity, 2);
    let u = compute_usage(&washer.machine, washer.quantity, loaded.hours, &loaded.rates);
    assert!((u.electricity - 480.0).abs() < 1e-9);
    assert!((u.water_cold - 19.2).abs() < 1e-9);
    assert!((u.water_hot - 14.4).abs() < 1e-9);

    let dryer = &loaded.items[1];
    let d = compute_usage(&dryer.machine, dryer.quantity, loaded.hours, &loaded.rates);
    assert!((d.raw_gas_dryer - 50000.0 / 47654.2 * 0.6 * 8.0).abs() < 1e-9);
    assert_eq!(d.electricity, 0.0);
}

#[test]
fn test_save_totals_and_list() {
    let (conn, cart) = setup();
    db::add_to_cart(&conn, cart, "FI-3300").unwrap();
    db::set_rate(&conn, cart, &resolve_rate_key("mep_ironer"), UtilityKind::Gas, 55.0).unwrap();

    let loaded = db::load_cart(&conn, cart).unwrap();
    let totals = aggregate(&loaded.items, loaded.hours, &loaded.rates);
    db::save_totals(&conn, cart, &totals).unwrap();

    let saved = db::load_cart(&conn, cart).unwrap().totals.unwrap();
    assert!((saved.gas - totals.gas).abs() < 1e-9);
    assert!((saved.raw_gas_ironer - totals.raw_gas_ironer).abs() < 1e-9);
    assert!(saved.gas > 0.0);

    let newer = db::create_cart(&conn, "2026-03-02T09:00:00+08:00").unwrap();
    let carts = db::list_carts(&conn).unwrap();
    assert_eq!(carts[0].id, newer);
    assert_eq!(carts[1].id, cart);
    assert_eq!(carts[1].lines, 1);
    assert_eq!(carts[1].machines, 1);
    assert!((carts[1].saved_total.unwrap() - totals.grand_total()).abs() < 1e-9);
}

#[test]
fn test_replace_rates_and_delete_cart() {
    let (conn, cart) = setup();
    db::set_rate(&conn, cart, &resolve_rate_key("mep_dryer"), UtilityKind::Gas, 10.0).unwrap();

    let mut rates = CategoryRates::new();
    rates.set(resolve_rate_key("mep_washer"), UtilityKind::Electricity, 11.0);
    db::replace_rates(&conn, cart, &rates).unwrap();
    assert_eq!(db::load_rates(&conn, cart).unwrap(), rates);

    db::add_to_cart(&conn, cart, "WX-60").unwrap();
    db::delete_cart(&conn, cart).unwrap();
    assert!(matches!(db::load_cart(&conn, cart), Err(StoreError::CartNotFound(_))));
    assert!(db::list_carts(&conn).unwrap().is_empty());
}

#[test]
fn test_clear_cart_keeps_rates() {
    let (conn, cart) = setup();
    db::add_to_cart(&conn, cart, "WX-60").unwrap();
    db::set_rate(&conn, cart, &resolve_rate_key("mep_washer"), UtilityKind::Electricity, 9.0)
        .unwrap();

    db::clear_cart(&conn, cart).unwrap();
    let loaded = db::load_cart(&conn, cart).unwrap();
    assert!(loaded.items.is_empty());
    assert_eq!(loaded.rates.len(), 1);
}

#[test]
fn test_lines_for_cleared_machines_are_reported() {
    let (conn, cart) = setup();
    db::add_to_cart(&conn, cart, "WX-25").unwrap();
    db::add_to_cart(&conn, cart, "WX-25").unwrap();
    db::clear_catalog(&conn).unwrap();

    assert_eq!(db::list_carts(&conn).unwrap()[0].lines, 1);
    assert!(matches!(
        db::load_items(&conn, cart),
        Err(StoreError::MachineNotFound(id)) if id == "WX-25"
    ));
    assert!(matches!(db::load_cart(&conn, cart), Err(StoreError::MachineNotFound(_))));

    // re-importing the same ids restores the line untouched
    load_sample(&conn).unwrap();
    let items = db::load_items(&conn, cart).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
}

#[test]
fn test_cart_file_round_trip() {
    let (conn, cart) = setup();
    db::add_to_cart(&conn, cart, "TD-30G").unwrap();
    db::set_quantity(&conn, cart, "TD-30G", 4).unwrap();
    db::add_to_cart(&conn, cart, "WX-60").unwrap();
    db::set_hours(&conn, cart, 9.5).unwrap();
    db::set_rate(&conn, cart, &resolve_rate_key("mep_dryer"), UtilityKind::Gas, 60.0).unwrap();

    let original = db::load_cart(&conn, cart).unwrap();
    let document = CartDocument::from(&original);

    let dir = tempdir().unwrap();
    let path = dir.path().join("cart.json");
    std::fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

    let copy = import_cart(&conn, &read_cart_document(&path).unwrap(), "2026-03-05T09:00:00+08:00")
        .unwrap();
    assert_ne!(copy, cart);

    let loaded = db::load_cart(&conn, copy).unwrap();
    assert_eq!(loaded.hours, 9.5);
    assert_eq!(loaded.items, original.items);
    assert_eq!(loaded.rates, original.rates);
    assert_eq!(
        aggregate(&loaded.items, loaded.hours, &loaded.rates),
        aggregate(&original.items, original.hours, &original.rates)
    );
}

#[test]
fn test_cart_file_with_loose_quantities() {
    let (conn, _) = setup();
    let document: CartDocument = serde_json::from_str(
        r#"{
            "hours": "8",
            "items": [
                {"machineId": "WX-25", "quantity": "2 units"},
                {"machineId": "FI-3300", "quantity": null},
                {"machineId": "WX-25", "quantity": 1}
            ]
        }"#,
    )
    .unwrap();

    let cart = import_cart(&conn, &document, "2026-03-06T09:00:00+08:00").unwrap();
    let loaded = db::load_cart(&conn, cart).unwrap();
    assert_eq!(loaded.hours, 8.0);
    let lines: Vec<(&str, u32)> = loaded
        .items
        .iter()
        .map(|i| (i.machine.id.as_str(), i.quantity))
        .collect();
    assert_eq!(lines, vec![("WX-25", 3), ("FI-3300", 0)]);
}

#[test]
fn test_cart_file_with_unknown_machine_writes_nothing() {
    let (conn, _) = setup();
    let before = db::list_carts(&conn).unwrap().len();
    let document: CartDocument =
        serde_json::from_str(r#"{"items": [{"machineId": "WX-25"}, {"machineId": "GONE"}]}"#)
            .unwrap();

    let err = import_cart(&conn, &document, "2026-03-07T09:00:00+08:00").unwrap_err();
    assert!(err.to_string().contains("GONE"));
    assert_eq!(db::list_carts(&conn).unwrap().len(), before);
}
