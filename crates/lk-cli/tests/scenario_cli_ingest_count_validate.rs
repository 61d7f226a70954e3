use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn lk(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("lk").expect("lk binary");
    cmd.env_remove("LK_DATA_DIR")
        .env("RUST_LOG", "warn")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, body).unwrap();
    p
}

#[test]
fn ingest_count_show_round_trip_through_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let lines = write(
        tmp.path(),
        "inv7.csv",
        "item_code,description,unit,quantity,unit_price\n\
         BRISKET,Brisket choice,lb,30,57.38\n\
         LIME-CS,Limes,case,3,5.88\n",
    );

    // GIVEN: an invoice ingested in one process
    lk(&data)
        .args(["ingest", "--order-date", "2024-02-01", "--source-ref", "INV-7", "--file"])
        .arg(&lines)
        .assert()
        .success()
        .stdout(predicate::str::contains("applied=2 source_ref=INV-7"))
        .stdout(predicate::str::contains("persisted=true"));

    // WHEN: a count is applied in a second process
    lk(&data)
        .args(["count", "--item", "BRISKET", "--qty", "50", "--date", "2024-02-03"])
        .assert()
        .success()
        .stdout(predicate::str::contains("diff=20.000"))
        .stdout(predicate::str::contains("warning=large_variance"));

    // THEN: a third process sees both lots and the adjustment history
    lk(&data)
        .args(["show", "BRISKET"])
        .assert()
        .success()
        .stdout(predicate::str::contains("INVENTORY_ADJUSTMENT"));

    lk(&data)
        .args(["history", "BRISKET", "--last", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"count\""));

    lk(&data).arg("verify").assert().success().stdout(predicate::str::contains(
        "checked=2 violations=0",
    ));
}

#[test]
fn invalid_batch_fails_and_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let lines = write(
        tmp.path(),
        "bad.json",
        r#"[{"item_code":"A","quantity":1.0,"unit_price":1.0},
            {"item_code":"B","quantity":0.0,"unit_price":1.0}]"#,
    );

    lk(&data)
        .args(["ingest", "--order-date", "2024-02-01", "--source-ref", "INV-9", "--file"])
        .arg(&lines)
        .assert()
        .failure()
        .stderr(predicate::str::contains("record 1"));

    assert!(!data.join("ledgers.json").exists());
}

#[test]
fn validate_exports_discrepancy_csv() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let lines = write(
        tmp.path(),
        "inv.csv",
        "item_code,quantity,unit_price\nBRISKET,30,60.00\n",
    );
    let refs = write(
        tmp.path(),
        "refs.csv",
        "item_code,source_ref,date,unit_price,quantity\nBRISKET,INV-7,2024-02-01,57.38,30\n",
    );
    let out = tmp.path().join("discrepancies.csv");

    lk(&data)
        .args(["ingest", "--order-date", "2024-02-01", "--source-ref", "INV-7", "--file"])
        .arg(&lines)
        .assert()
        .success();

    lk(&data)
        .arg("validate")
        .arg("--refs")
        .arg(&refs)
        .arg("--export")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("discrepancies=1"))
        .stdout(predicate::str::contains("severity=medium pct=4.57"));

    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("item_code,"));
    assert!(csv.contains("BRISKET"));
}

#[test]
fn missing_data_dir_is_an_error() {
    let mut cmd = Command::cargo_bin("lk").unwrap();
    cmd.env_remove("LK_DATA_DIR")
        .arg("report")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no data dir"));
}

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let tmp = tempfile::tempdir().unwrap();
    let base = write(tmp.path(), "base.yaml", "pricecheck:\n  top_n: 5\n");
    let mut cmd = Command::cargo_bin("lk").unwrap();
    cmd.arg("config-hash")
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains(r#"{"pricecheck":{"top_n":5}}"#));
}
