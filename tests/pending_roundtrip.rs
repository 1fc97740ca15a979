// tests/pending_roundtrip.rs
use efemerides_bot::pending::{PendingStore, PendingThread};
use efemerides_bot::DayMonth;
use std::fs;

fn thread() -> PendingThread {
    PendingThread::new(
        "🇪🇸 En tal día como hoy del año 1588, la Grande y Felicísima Armada zarpa de Lisboa.",
        vec!["Contaba con más de 130 naves.".into(), "El mando era del duque de Medina Sidonia.".into()],
        DayMonth::new(28, 5).unwrap(),
    )
}

#[test]
fn save_load_clear_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = PendingStore::new(dir.path().join("state").join("pending_thread.json"));

    assert!(store.load().is_none());
    store.save(&thread()).unwrap();
    let loaded = store.load().expect("saved thread");
    assert_eq!(loaded, thread());
    assert!(loaded.is_for(DayMonth::new(28, 5).unwrap()));
    assert!(!loaded.is_for(DayMonth::new(29, 5).unwrap()));

    store.clear().unwrap();
    assert!(store.load().is_none());
    // Clearing an empty slot is not an error.
    store.clear().unwrap();
}

#[test]
fn on_disk_shape_is_plain_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    let store = PendingStore::new(&path);
    let mut t = thread();
    t.reply_to = Some("1790000000000000000".into());
    store.save(&t).unwrap();

    let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(v["target_date_key"], "28/05");
    assert_eq!(v["followups"].as_array().unwrap().len(), 2);
    assert_eq!(v["reply_to"], "1790000000000000000");
    assert!(!dir.path().join("pending.json.tmp").exists());
}

#[test]
fn state_written_without_reply_to_still_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    fs::write(
        &path,
        r#"{"headline":"Titular","followups":[],"target_date_key":"01/01"}"#,
    )
    .unwrap();
    let t = PendingStore::new(&path).load().unwrap();
    assert_eq!(t.reply_to, None);
    assert!(t.followups.is_empty());
}

#[test]
fn unreadable_state_is_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    let store = PendingStore::new(&path);

    fs::write(&path, "{not json").unwrap();
    assert!(store.load().is_none());

    fs::write(
        &path,
        r#"{"headline":"Titular","followups":[],"target_date_key":"32/13"}"#,
    )
    .unwrap();
    assert!(store.load().is_none());

    fs::write(
        &path,
        r#"{"headline":"  ","followups":[],"target_date_key":"01/01"}"#,
    )
    .unwrap();
    assert!(store.load().is_none());
}
