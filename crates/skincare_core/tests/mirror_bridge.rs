use async_trait::async_trait;
use chrono::{DateTime, Local};
use skincare_core::{
    CareStatus, DeleteError, EntryId, EntryStore, EvaluationSession, MemoryKeyValueStore,
    MirrorError, MirrorResult, MirrorStage, MirrorState, NewEntry, Notification, NotificationKind,
    MonthKey, RemoteDocument, RemoteListing, RemoteMirror, RemoteRecord, SubmitError,
    SubmitOutcome,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
struct Gate {
    started: Notify,
    release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.started.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct MockMirror {
    fail_create: bool,
    fail_delete: bool,
    listing: RemoteListing,
    create_gate: Option<Arc<Gate>>,
    delete_gate: Option<Arc<Gate>>,
    created: Mutex<Vec<RemoteRecord>>,
    deleted: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

#[async_trait]
impl RemoteMirror for MockMirror {
    fn mirror_id(&self) -> &str {
        "mock"
    }

    async fn list_all(&self) -> MirrorResult<RemoteListing> {
        Ok(self.listing.clone())
    }

    async fn create(&self, record: &RemoteRecord) -> MirrorResult<String> {
        if let Some(gate) = &self.create_gate {
            gate.pass().await;
        }
        if self.fail_create {
            return Err(MirrorError::new(
                MirrorStage::Create,
                "http_503",
                "service unavailable",
                true,
            ));
        }
        self.created.lock().unwrap().push(record.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("remote-{n}"))
    }

    async fn delete(&self, remote_id: &str) -> MirrorResult<()> {
        if let Some(gate) = &self.delete_gate {
            gate.pass().await;
        }
        if self.fail_delete {
            return Err(MirrorError::new(
                MirrorStage::Delete,
                "http_403",
                "permission denied",
                false,
            ));
        }
        self.deleted.lock().unwrap().push(remote_id.to_string());
        Ok(())
    }
}

fn session_with(mirror: &Arc<MockMirror>) -> EvaluationSession<MemoryKeyValueStore> {
    let mirror: Arc<dyn RemoteMirror> = mirror.clone();
    EvaluationSession::new(EntryStore::open(MemoryKeyValueStore::new()), Some(mirror))
}

fn input(name: &str) -> NewEntry {
    NewEntry::new(name, CareStatus::Done, CareStatus::NotApplicable, "note")
}

fn drain(session: &EvaluationSession<MemoryKeyValueStore>) -> Vec<Notification> {
    session.notifications().try_iter().collect()
}

fn remote_document(id: &str, created_at: &str) -> RemoteDocument {
    RemoteDocument {
        remote_id: id.to_string(),
        record: RemoteRecord {
            evaluator_name: format!("name-{id}"),
            status_adpro: CareStatus::NotDone,
            status_vaseline: CareStatus::Done,
            note: String::new(),
            created_at: DateTime::parse_from_rfc3339(created_at).unwrap(),
        },
    }
}

#[tokio::test]
async fn submit_stores_locally_then_records_remote_id() {
    let mirror = Arc::new(MockMirror::default());
    let session = session_with(&mirror);

    let outcome = session.submit(input(" Sato ")).await.unwrap();

    let entry = match outcome {
        SubmitOutcome::Mirrored(entry) => entry,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(entry.remote_id(), Some("remote-1"));
    assert_eq!(session.entries(), vec![entry.clone()]);

    let created = mirror.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].evaluator_name, "Sato");
    assert_eq!(created[0].created_at, entry.created_at);

    let notes = drain(&session);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::Success);
}

#[tokio::test]
async fn failed_mirror_keeps_local_entry_without_remote_id() {
    let mirror = Arc::new(MockMirror {
        fail_create: true,
        ..MockMirror::default()
    });
    let session = session_with(&mirror);

    let outcome = session.submit(input("Sato")).await.unwrap();

    let (entry, error) = match outcome {
        SubmitOutcome::MirrorFailed { entry, error } => (entry, error),
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(error.code, "http_503");
    assert_eq!(entry.remote_id(), None);
    assert!(matches!(entry.mirror, MirrorState::Failed { .. }));
    assert_eq!(session.entries().len(), 1);

    let notes = drain(&session);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::Error);
}

#[tokio::test]
async fn blank_evaluator_name_is_rejected_before_any_write() {
    let mirror = Arc::new(MockMirror::default());
    let session = session_with(&mirror);

    let err = session.submit(input("   ")).await.unwrap_err();

    assert_eq!(err, SubmitError::MissingEvaluatorName);
    assert!(session.entries().is_empty());
    assert!(mirror.created.lock().unwrap().is_empty());
    let notes = drain(&session);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::Error);
}

#[tokio::test]
async fn delete_uses_remote_id_then_local_id() {
    let mirror = Arc::new(MockMirror::default());
    let session = session_with(&mirror);
    let SubmitOutcome::Mirrored(mirrored) = session.submit(input("Sato")).await.unwrap() else {
        panic!("expected mirrored outcome");
    };

    let failing = Arc::new(MockMirror {
        fail_create: true,
        ..MockMirror::default()
    });
    let failing_session = session_with(&failing);
    let SubmitOutcome::MirrorFailed { entry: local, .. } =
        failing_session.submit(input("Suzuki")).await.unwrap()
    else {
        panic!("expected failed outcome");
    };

    session.delete(&mirrored.id).await.unwrap();
    failing_session.delete(&local.id).await.unwrap();

    assert_eq!(mirror.deleted.lock().unwrap().clone(), vec!["remote-1"]);
    assert_eq!(
        failing.deleted.lock().unwrap().clone(),
        vec![local.id.as_str().to_string()]
    );
    assert!(session.entries().is_empty());
    assert!(failing_session.entries().is_empty());
}

#[tokio::test]
async fn failed_remote_delete_keeps_local_entry() {
    let mirror = Arc::new(MockMirror {
        fail_delete: true,
        ..MockMirror::default()
    });
    let session = session_with(&mirror);
    let SubmitOutcome::Mirrored(entry) = session.submit(input("Sato")).await.unwrap() else {
        panic!("expected mirrored outcome");
    };
    drain(&session);

    let err = session.delete(&entry.id).await.unwrap_err();

    assert!(matches!(err, DeleteError::Mirror(_)));
    assert_eq!(session.entries(), vec![entry]);
    let notes = drain(&session);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::Error);
}

#[tokio::test]
async fn deleting_unknown_entry_reports_not_found() {
    let mirror = Arc::new(MockMirror::default());
    let session = session_with(&mirror);

    let err = session.delete(&EntryId::from("missing")).await.unwrap_err();

    assert_eq!(err, DeleteError::NotFound(EntryId::from("missing")));
    assert!(mirror.deleted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn second_delete_is_refused_while_first_is_in_flight() {
    let gate = Arc::new(Gate::default());
    let mirror = Arc::new(MockMirror {
        delete_gate: Some(gate.clone()),
        ..MockMirror::default()
    });
    let session = session_with(&mirror);
    let SubmitOutcome::Mirrored(a) = session.submit(input("a")).await.unwrap() else {
        panic!("expected mirrored outcome");
    };
    let SubmitOutcome::Mirrored(b) = session.submit(input("b")).await.unwrap() else {
        panic!("expected mirrored outcome");
    };

    let (first, second) = tokio::join!(session.delete(&a.id), async {
        gate.started.notified().await;
        let result = session.delete(&b.id).await;
        gate.release.notify_one();
        result
    });

    first.unwrap();
    assert_eq!(second, Err(DeleteError::InProgress(a.id.clone())));
    assert_eq!(session.entries(), vec![b.clone()]);

    // The guard is released once the first delete finishes.
    let gate_for_b = gate.clone();
    let (third, ()) = tokio::join!(session.delete(&b.id), async move {
        gate_for_b.started.notified().await;
        gate_for_b.release.notify_one();
    });
    third.unwrap();
    assert!(session.entries().is_empty());
}

#[tokio::test]
async fn entry_deleted_during_create_is_reported_as_orphaned() {
    let gate = Arc::new(Gate::default());
    let mirror = Arc::new(MockMirror {
        create_gate: Some(gate.clone()),
        ..MockMirror::default()
    });
    let session = session_with(&mirror);

    let (outcome, ()) = tokio::join!(session.submit(input("Sato")), async {
        gate.started.notified().await;
        let id = session.entries()[0].id.clone();
        session.delete(&id).await.unwrap();
        gate.release.notify_one();
    });

    let SubmitOutcome::OrphanedRemote { remote_id, .. } = outcome.unwrap() else {
        panic!("expected orphaned outcome");
    };
    assert_eq!(remote_id, "remote-1");
    assert!(session.entries().is_empty());
}

#[tokio::test]
async fn hydrate_imports_missing_documents_oldest_first() {
    let mirror = Arc::new(MockMirror {
        listing: RemoteListing {
            documents: vec![
                remote_document("r-new", "2024-05-02T09:00:00+09:00"),
                remote_document("remote-1", "2024-05-03T09:00:00+09:00"),
                remote_document("r-old", "2024-05-01T09:00:00+09:00"),
            ],
            rejected: vec!["r-bad".to_string()],
        },
        ..MockMirror::default()
    });
    let session = session_with(&mirror);
    let SubmitOutcome::Mirrored(local) = session.submit(input("Sato")).await.unwrap() else {
        panic!("expected mirrored outcome");
    };

    let report = session.hydrate_from_remote().await.unwrap();
    assert_eq!(report.imported, 2);
    assert_eq!(report.already_present, 1);
    assert_eq!(report.rejected, 1);

    let entries = session.entries();
    let ids = entries
        .iter()
        .map(|entry| entry.id.as_str().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["r-new", "r-old", local.id.as_str()]);
    assert_eq!(entries[0].remote_id(), Some("r-new"));
    assert_eq!(entries[0].month_key.to_string(), "2024-05");

    let again = session.hydrate_from_remote().await.unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.already_present, 3);
    assert_eq!(session.entries().len(), 3);
}

#[tokio::test]
async fn hydrated_utc_timestamp_is_bucketed_in_local_month() {
    let remote_at = "2024-05-31T20:00:00Z";
    let mirror = Arc::new(MockMirror {
        listing: RemoteListing {
            documents: vec![remote_document("r-utc", remote_at)],
            rejected: Vec::new(),
        },
        ..MockMirror::default()
    });
    let session = session_with(&mirror);

    session.hydrate_from_remote().await.unwrap();

    let local_at = DateTime::parse_from_rfc3339(remote_at)
        .unwrap()
        .with_timezone(&Local)
        .fixed_offset();
    let entries = session.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].created_at, local_at);
    assert_eq!(entries[0].created_at.offset(), local_at.offset());
    assert_eq!(entries[0].month_key, MonthKey::from_timestamp(&local_at));

    let local_month = if local_at.offset().local_minus_utc() >= 4 * 3600 {
        "2024-06"
    } else {
        "2024-05"
    };
    assert_eq!(entries[0].month_key.to_string(), local_month);
}

#[tokio::test]
async fn local_only_session_never_touches_a_mirror() {
    let session = EvaluationSession::new(EntryStore::open(MemoryKeyValueStore::new()), None);
    assert!(!session.has_mirror());

    let outcome = session.submit(input("Sato")).await.unwrap();
    let entry = match outcome {
        SubmitOutcome::LocalOnly(entry) => entry,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(entry.mirror, MirrorState::NotMirrored);

    session.delete(&entry.id).await.unwrap();
    assert!(session.entries().is_empty());
    assert_eq!(session.hydrate_from_remote().await.unwrap().imported, 0);

    let kinds = drain(&session)
        .into_iter()
        .map(|notification| notification.kind)
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![NotificationKind::Success, NotificationKind::Success]
    );
}
