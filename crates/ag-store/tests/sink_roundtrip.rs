//! Per-run store behavior: schema, date normalization, field catalog.

use ag_output::OutputTable;
use ag_store::save_output_tables;
use rusqlite::Connection;

fn table(title: &str, rows: &[(&str, &str)]) -> OutputTable {
    OutputTable {
        title: Some(title.to_string()),
        model_version: Some("7.4".to_string()),
        fields: vec!["Date".to_string(), "yield".to_string()],
        units: vec!["(dd/mm/yyyy)".to_string(), "(kg/ha)".to_string()],
        columns: vec![
            rows.iter().map(|(d, _)| d.to_string()).collect(),
            rows.iter().map(|(_, y)| y.to_string()).collect(),
        ],
    }
}

#[test]
fn saves_rows_with_point_id_and_iso_dates() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("apsimData.sqlite");

    let tables = vec![
        table("met_maize_00042", &[("01/01/2000", "0"), ("02/01/2000", "150.5")]),
        OutputTable::default(), // failed simulation: valid, skipped
        table("met_maize_00043", &[("01/01/2000", "10")]),
    ];
    let written = save_output_tables(&db, &tables).unwrap();
    assert_eq!(written, 3);

    let conn = Connection::open(&db).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM apsimOutput", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 3);

    let (point, date): (i64, String) = conn
        .query_row(
            "SELECT point_id, Date FROM apsimOutput WHERE yield = 150.5",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(point, 42);
    assert_eq!(date, "2000-01-02");
}

#[test]
fn field_catalog_defined_by_first_nonempty_table() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("apsimData.sqlite");

    let mut second = table("m_c_2", &[("01/01/2000", "1")]);
    second.units[1] = "(t/ha)".to_string();
    let tables = vec![
        OutputTable::default(),
        table("m_c_1", &[("01/01/2000", "0")]),
        second,
    ];
    save_output_tables(&db, &tables).unwrap();

    let conn = Connection::open(&db).unwrap();
    let units: String = conn
        .query_row(
            "SELECT units FROM outputFields WHERE name = 'yield'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(units, "(kg/ha)");
}

#[test]
fn replaces_prior_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("apsimData.sqlite");

    save_output_tables(&db, &[table("m_c_1", &[("01/01/2000", "5")])]).unwrap();
    save_output_tables(&db, &[table("m_c_2", &[("01/01/2000", "7")])]).unwrap();

    let conn = Connection::open(&db).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM apsimOutput", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn all_empty_batch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("apsimData.sqlite");
    let written = save_output_tables(&db, &[OutputTable::default()]).unwrap();
    assert_eq!(written, 0);
    assert!(!db.exists());
}
