use chrono::DateTime;
use skincare_core::{
    CareStatus, EntryId, EntryPatch, EntryStore, KeyValueStore, MemoryKeyValueStore, MirrorState,
    MonthKey, NewEntry, SqliteKeyValueStore, StoreEvent, STORAGE_KEY,
};

fn input(name: &str, adpro: CareStatus, vaseline: CareStatus, note: &str) -> NewEntry {
    NewEntry::new(name, adpro, vaseline, note)
}

fn at(value: &str) -> DateTime<chrono::FixedOffset> {
    DateTime::parse_from_rfc3339(value).unwrap()
}

#[test]
fn add_trims_text_and_assigns_identity() {
    let mut store = EntryStore::open(MemoryKeyValueStore::new());

    let entry = store.add(
        input(" Sato ", CareStatus::Done, CareStatus::NotApplicable, " ")
            .with_created_at(at("2024-05-10T10:00:00+09:00")),
    );

    assert_eq!(entry.evaluator_name, "Sato");
    assert_eq!(entry.note, "");
    assert!(!entry.id.as_str().is_empty());
    assert_eq!(entry.month_key, MonthKey::new(2024, 5).unwrap());
    assert_eq!(entry.month_key.to_string(), "2024-05");
    assert_eq!(entry.mirror, MirrorState::NotMirrored);
    assert_eq!(store.entries(), &[entry]);
}

#[test]
fn newest_insert_is_first_even_when_backdated() {
    let mut store = EntryStore::open(MemoryKeyValueStore::new());

    let first = store.add(
        input("Sato", CareStatus::Done, CareStatus::Done, "")
            .with_created_at(at("2024-05-10T10:00:00+09:00")),
    );
    let backdated = store.add(
        input("Suzuki", CareStatus::NotDone, CareStatus::Done, "")
            .with_created_at(at("2023-01-02T08:00:00+09:00")),
    );

    let ids = store
        .entries()
        .iter()
        .map(|entry| entry.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![backdated.id, first.id]);
    assert_eq!(store.entries()[0].month_key.to_string(), "2023-01");
}

#[test]
fn generated_ids_are_unique() {
    let mut store = EntryStore::open(MemoryKeyValueStore::new());
    let a = store.add(input("a", CareStatus::Done, CareStatus::Done, ""));
    let b = store.add(input("a", CareStatus::Done, CareStatus::Done, ""));
    assert_ne!(a.id, b.id);
    assert_eq!(store.len(), 2);
}

#[test]
fn created_at_is_truncated_to_milliseconds() {
    let mut store = EntryStore::open(MemoryKeyValueStore::new());
    let entry = store.add(
        input("Sato", CareStatus::Done, CareStatus::Done, "")
            .with_created_at(at("2024-05-10T10:00:00.123456789+09:00")),
    );
    assert_eq!(entry.created_at, at("2024-05-10T10:00:00.123+09:00"));
}

#[test]
fn update_merges_fields_and_keeps_identity() {
    let mut store = EntryStore::open(MemoryKeyValueStore::new());
    let entry = store.add(
        input("Sato", CareStatus::NotDone, CareStatus::Done, "dry")
            .with_created_at(at("2024-04-30T23:00:00+09:00")),
    );

    store.update(
        &entry.id,
        EntryPatch {
            status_adpro: Some(CareStatus::Done),
            note: Some("  better  ".to_string()),
            ..EntryPatch::default()
        },
    );

    let updated = store.get(&entry.id).unwrap();
    assert_eq!(updated.status_adpro, CareStatus::Done);
    assert_eq!(updated.status_vaseline, CareStatus::Done);
    assert_eq!(updated.note, "better");
    assert_eq!(updated.evaluator_name, "Sato");
    assert_eq!(updated.created_at, entry.created_at);
    assert_eq!(updated.month_key, entry.month_key);
}

#[test]
fn remove_is_idempotent() {
    let mut store = EntryStore::open(MemoryKeyValueStore::new());
    let keep = store.add(input("a", CareStatus::Done, CareStatus::Done, ""));
    let gone = store.add(input("b", CareStatus::Done, CareStatus::Done, ""));

    store.remove(&gone.id);
    store.remove(&gone.id);
    store.remove(&EntryId::from("never-existed"));

    assert_eq!(store.entries(), &[keep]);
}

#[test]
fn collection_survives_reopen() {
    let kv = MemoryKeyValueStore::new();
    let mut store = EntryStore::open(kv.clone());
    let older = store.add(
        input("Sato", CareStatus::Done, CareStatus::NotApplicable, "note")
            .with_created_at(at("2024-04-01T09:00:00+09:00")),
    );
    let newer = store.add(input("Suzuki", CareStatus::NotDone, CareStatus::Done, ""));
    store.update(&newer.id, EntryPatch::mirrored("remote-1"));
    drop(store);

    let reopened = EntryStore::open(kv);
    let entries = reopened.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, newer.id);
    assert_eq!(entries[0].remote_id(), Some("remote-1"));
    assert_eq!(entries[1], older);
}

#[test]
fn evaluator_names_are_distinct_sorted_and_non_empty() {
    let mut store = EntryStore::open(MemoryKeyValueStore::new());
    for name in ["Suzuki", "  ", "Sato", "Suzuki", "Abe"] {
        store.add(input(name, CareStatus::Done, CareStatus::Done, ""));
    }

    assert_eq!(store.evaluator_names(), vec!["Abe", "Sato", "Suzuki"]);
}

#[test]
fn evaluator_names_fold_kana_for_ordering() {
    let mut store = EntryStore::open(MemoryKeyValueStore::new());
    for name in ["スズキ", "さとう", "あべ"] {
        store.add(input(name, CareStatus::Done, CareStatus::Done, ""));
    }

    assert_eq!(store.evaluator_names(), vec!["あべ", "さとう", "スズキ"]);
}

#[test]
fn absent_key_loads_empty() {
    let store = EntryStore::open(MemoryKeyValueStore::new());
    assert!(store.is_empty());
}

#[test]
fn corrupt_value_loads_empty_and_is_overwritten_on_add() {
    let kv = MemoryKeyValueStore::new();
    kv.write(STORAGE_KEY, "{not json").unwrap();

    let mut store = EntryStore::open(kv.clone());
    assert!(store.is_empty());

    store.add(input("Sato", CareStatus::Done, CareStatus::Done, ""));
    let raw = kv.read(STORAGE_KEY).unwrap().unwrap();
    assert!(raw.starts_with('['));
}

#[test]
fn invalid_record_is_skipped_and_valid_neighbours_survive_add() {
    let kv = MemoryKeyValueStore::new();
    kv.write(
        STORAGE_KEY,
        r#"[
            {"id":"good","createdAt":"2024-05-10T10:00:00.000+09:00","monthKey":"2024-05",
             "evaluatorName":"Sato","statusAdpro":"done","statusVaseline":"done","note":"keep"},
            {"id":"bad","createdAt":"2024-05-09T10:00:00.000+09:00","monthKey":"2024-05",
             "evaluatorName":"Suzuki","statusAdpro":"skipped","statusVaseline":"done","note":""}
        ]"#,
    )
    .unwrap();

    let mut store = EntryStore::open(kv.clone());
    assert_eq!(store.len(), 1);
    assert_eq!(store.entries()[0].id, EntryId::from("good"));

    let added = store.add(input("Tanaka", CareStatus::NotDone, CareStatus::Done, ""));
    assert_eq!(store.len(), 2);

    let reopened = EntryStore::open(kv.clone());
    let ids = reopened
        .entries()
        .iter()
        .map(|entry| entry.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![added.id, EntryId::from("good")]);
    assert_eq!(reopened.entries()[1].note, "keep");
}

#[test]
fn unavailable_store_keeps_working_in_memory() {
    let kv = MemoryKeyValueStore::unavailable();
    let mut store = EntryStore::open(kv.clone());
    assert!(store.is_empty());

    let entry = store.add(input("Sato", CareStatus::Done, CareStatus::Done, ""));
    assert_eq!(store.entries(), &[entry]);

    kv.set_available(true);
    assert_eq!(kv.read(STORAGE_KEY).unwrap(), None);
}

#[test]
fn sessions_on_one_file_observe_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skincare.db");

    let mut first = EntryStore::open(SqliteKeyValueStore::open(&path).unwrap());
    let mut second = EntryStore::open(SqliteKeyValueStore::open(&path).unwrap());
    let events = second.subscribe();

    assert!(!second.reload_if_changed());

    let entry = first.add(input("Sato", CareStatus::Done, CareStatus::Done, ""));
    assert!(second.reload_if_changed());
    assert_eq!(second.entries(), &[entry]);
    assert_eq!(events.try_recv().unwrap(), StoreEvent::Reloaded);

    assert!(!second.reload_if_changed());
    assert!(!first.reload_if_changed());
}

#[test]
fn reload_ignores_corrupt_foreign_value() {
    let kv = MemoryKeyValueStore::new();
    let mut store = EntryStore::open(kv.clone());
    let entry = store.add(input("Sato", CareStatus::Done, CareStatus::Done, ""));

    kv.write(STORAGE_KEY, "garbage").unwrap();
    assert!(!store.reload_if_changed());
    assert_eq!(store.entries(), &[entry]);
}
