//! The reconcile loop against the on-disk store, including reopening the
//! store between passes the way a restarted process would.

use serde_json::json;
use smbop_core::resources::{document_key, read_document};
use smbop_core::{list_events, Outcome, Reconciler};
use smbop_schema::{GroupKey, ObjectKind, OperatorConfig, ShareKey, ShareState, ShareStatus};
use smbop_store::{verify_store_integrity, FileStore, Object, ObjectKey, ObjectStore};
use std::path::Path;

fn share(store: &FileStore, name: &str, spec: serde_json::Value) -> ObjectKey {
    let key = ObjectKey::new(ObjectKind::SmbShare, "ns", name);
    store.create(Object::new(key.clone(), &spec).unwrap()).unwrap();
    key
}

fn converge(root: &Path, config: &OperatorConfig, key: &ObjectKey) {
    let store = FileStore::open(root).unwrap();
    let report = Reconciler::new(&store, config)
        .run_until_done(key, 50, || false)
        .unwrap();
    assert_eq!(report.outcome, Outcome::Done);
}

fn assert_clean(store: &FileStore) {
    let report = verify_store_integrity(store.layout()).unwrap();
    assert!(report.is_clean(), "integrity failures: {:?}", report.failed);
}

#[test]
fn share_converges_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = OperatorConfig::default();
    let key = share(
        &FileStore::open(dir.path()).unwrap(),
        "s1",
        json!({"storage": {"pvc": {"spec": {"size": "1Gi"}}}}),
    );
    converge(dir.path(), &config, &key);

    let store = FileStore::open(dir.path()).unwrap();
    let status: ShareStatus = store.get(&key).unwrap().status_as().unwrap();
    assert_eq!(status.state, Some(ShareState::Converged));
    let doc = read_document(&store.get(&document_key("ns", &config)).unwrap()).unwrap();
    assert_eq!(doc.configs[&GroupKey::new("s1")].shares, vec![ShareKey::new("s1")]);
    assert!(store
        .get_opt(&ObjectKey::new(ObjectKind::Deployment, "ns", "s1"))
        .unwrap()
        .is_some());
    assert_clean(&store);
}

#[test]
fn each_pass_can_run_in_a_fresh_process() {
    let dir = tempfile::tempdir().unwrap();
    let config = OperatorConfig::default();
    let key = share(
        &FileStore::open(dir.path()).unwrap(),
        "s1",
        json!({"storage": {"pvc": {"name": "data"}}}),
    );

    let mut passes = 0;
    loop {
        passes += 1;
        assert!(passes < 50, "share did not converge");
        let store = FileStore::open(dir.path()).unwrap();
        if Reconciler::new(&store, &config).process(&key).unwrap() == Outcome::Done {
            break;
        }
    }

    let store = FileStore::open(dir.path()).unwrap();
    let status: ShareStatus = store.get(&key).unwrap().status_as().unwrap();
    assert_eq!(status.state, Some(ShareState::Converged));
    assert_clean(&store);
}

#[test]
fn teardown_leaves_an_empty_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let config = OperatorConfig::default();
    let (a, b) = {
        let store = FileStore::open(dir.path()).unwrap();
        let grouped = json!({
            "storage": {"pvc": {"name": "shared"}},
            "scaling": {"group_mode": "explicit", "group": "g1"}
        });
        (
            share(&store, "a", grouped.clone()),
            share(&store, "b", grouped),
        )
    };
    converge(dir.path(), &config, &a);
    converge(dir.path(), &config, &b);

    let store = FileStore::open(dir.path()).unwrap();
    store.delete(&a).unwrap();
    store.delete(&b).unwrap();
    converge(dir.path(), &config, &a);
    converge(dir.path(), &config, &b);

    for kind in ObjectKind::ALL {
        assert!(
            store.list(kind, Some("ns")).unwrap().is_empty(),
            "{kind} objects left behind"
        );
    }
    assert_clean(&store);
}

#[test]
fn incompatible_share_event_persists() {
    let dir = tempfile::tempdir().unwrap();
    let config = OperatorConfig::default();
    let (a, b) = {
        let store = FileStore::open(dir.path()).unwrap();
        let grouped = |claim: &str| {
            json!({
                "storage": {"pvc": {"name": claim}},
                "scaling": {"group_mode": "explicit", "group": "g1"}
            })
        };
        (
            share(&store, "a", grouped("one")),
            share(&store, "b", grouped("two")),
        )
    };
    converge(dir.path(), &config, &a);
    converge(dir.path(), &config, &b);

    let store = FileStore::open(dir.path()).unwrap();
    let events = list_events(&store, "ns").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].involved.name, "b");
    assert_clean(&store);
}
