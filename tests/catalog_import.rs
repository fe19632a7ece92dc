use std::fs;

use laundry_calc::db;
use laundry_calc::import::{import_to_database, parse_catalog_file};
use laundry_calc::models::MachineFamily;
use rusqlite::Connection;
use tempfile::tempdir;

#[test]
fn test_import_array_and_keyed_files() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("mep_washer.json"),
        r#"[
            {"id": "w-1", "model": "WX-40", "totalLoad": "2.5",
             "coldWater": {"waterConsump": 40}, "hotWater": {"waterConsump": "20"}},
            {"model": "WX-10", "totalLoad": 1}
        ]"#,
    )
    .unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(
        dir.path().join("nested").join("mep_dryer.json"),
        r#"{"d-1": {"model": "DX-30", "gasBTU": "50000", "exhaust": {"volume": 900}}}"#,
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a catalog").unwrap();

    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let stats = import_to_database(&conn, dir.path()).unwrap();

    assert_eq!(stats.files, 2);
    assert_eq!(stats.machines, 3);
    assert_eq!(stats.errors, 0);

    let washer = db::get_machine(&conn, "w-1").unwrap().unwrap();
    assert_eq!(washer.family, MachineFamily::Washer);
    assert_eq!(washer.category, "mep_washer");
    assert_eq!(washer.hot_water_l, 20.0);

    // array entries without an id get a positional one
    assert!(db::get_machine(&conn, "mep_washer-2").unwrap().is_some());

    let dryer = db::get_machine(&conn, "d-1").unwrap().unwrap();
    assert_eq!(dryer.family, MachineFamily::Dryer);
    assert_eq!(dryer.gas_btu, 50000.0);
    assert_eq!(dryer.exhaust_m3h, 900.0);
}

#[test]
fn test_bad_files_are_counted_not_fatal() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    fs::write(dir.path().join("scalar.json"), "42").unwrap();
    fs::write(
        dir.path().join("mep_ironer.json"),
        r#"[{"id": "i-1", "gasBTU": 96000}, "stray string"]"#,
    )
    .unwrap();

    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let stats = import_to_database(&conn, dir.path()).unwrap();

    assert_eq!(stats.errors, 2);
    assert_eq!(stats.files, 1);
    assert_eq!(stats.machines, 1);
    assert_eq!(stats.skipped, 1);
    assert!(stats.to_string().contains("Imported 1 machines"));
}

#[test]
fn test_parse_catalog_file_uses_stem_as_category() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("IRONERS.json");
    fs::write(&path, r#"[{"model": "FI-3300", "category": ""}]"#).unwrap();

    let (machines, skipped) = parse_catalog_file(&path).unwrap();
    assert_eq!(skipped, 0);
    assert_eq!(machines[0].category, "IRONERS");
    assert_eq!(machines[0].family, MachineFamily::Ironer);
}

#[test]
fn test_missing_directory_is_an_error() {
    let dir = tempdir().unwrap();
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    assert!(import_to_database(&conn, &dir.path().join("absent")).is_err());
}
