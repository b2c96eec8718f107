use serde::{Deserialize, Serialize};
use smbop_schema::{ObjectKind, Uid};
use smbop_store::{Object, ObjectKey, ObjectStore, StoreError};
use tracing::warn;

pub const REASON_INVALID_CONFIGURATION: &str = "InvalidConfiguration";
pub const EVENT_TYPE_WARNING: &str = "Warning";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvolvedObject {
    pub kind: ObjectKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
}

/// Body of an `Event` object. Repeats of the same reason on the same object
/// bump `count` on one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub involved: InvolvedObject,
    pub reason: String,
    pub message: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub count: u32,
    pub first_timestamp: String,
    pub last_timestamp: String,
}

/// Deterministic event name for `reason` on `involved`.
pub fn event_name(involved: &ObjectKey, reason: &str) -> String {
    let digest = blake3::hash(
        format!(
            "{}/{}/{}/{reason}",
            involved.kind, involved.namespace, involved.name
        )
        .as_bytes(),
    );
    format!("{}.{}", involved.name, &digest.to_hex()[..10])
}

/// Record a warning event against `involved`, creating the event or bumping
/// its count. New events are owned by the involved object when it has a uid.
pub fn record_event(
    store: &dyn ObjectStore,
    involved: &Object,
    reason: &str,
    message: &str,
) -> Result<Object, StoreError> {
    warn!("{}: {reason}: {message}", involved.key);
    let key = ObjectKey::new(
        ObjectKind::Event,
        involved.key.namespace.as_str(),
        event_name(&involved.key, reason),
    );
    let now = chrono::Utc::now().to_rfc3339();

    if let Some(mut existing) = store.get_opt(&key)? {
        let mut record: EventRecord = existing.spec_as()?;
        record.count = record.count.saturating_add(1);
        message.clone_into(&mut record.message);
        record.last_timestamp = now;
        existing.set_spec(&record)?;
        return store.update(existing);
    }

    let record = EventRecord {
        involved: InvolvedObject {
            kind: involved.key.kind,
            name: involved.key.name.clone(),
            uid: involved.uid().cloned(),
        },
        reason: reason.to_owned(),
        message: message.to_owned(),
        event_type: EVENT_TYPE_WARNING.to_owned(),
        count: 1,
        first_timestamp: now.clone(),
        last_timestamp: now,
    };
    let mut obj = Object::new(key, &record)?;
    if let Some(owner) = involved.owner_ref() {
        obj.add_owner(owner);
    }
    store.create(obj)
}

/// Events recorded in a namespace, oldest first.
pub fn list_events(
    store: &dyn ObjectStore,
    namespace: &str,
) -> Result<Vec<EventRecord>, StoreError> {
    let mut records = store
        .list(ObjectKind::Event, Some(namespace))?
        .iter()
        .map(Object::spec_as::<EventRecord>)
        .collect::<Result<Vec<_>, _>>()?;
    records.sort_by(|a, b| a.first_timestamp.cmp(&b.first_timestamp));
    Ok(records)
}
