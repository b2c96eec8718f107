use crate::backend::ObjectStore;
use crate::object::{Object, ObjectKey};
use crate::ops::{self, RawObjects};
use crate::StoreError;
use smbop_schema::{ObjectKind, Uid};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Store operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Create,
    Update,
    Delete,
    List,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<ObjectKey, Object>,
    next_uid: u64,
    injected: VecDeque<Op>,
    mutations: u64,
}

impl RawObjects for MemoryState {
    fn read(&self, key: &ObjectKey) -> Result<Option<Object>, StoreError> {
        Ok(self.objects.get(key).cloned())
    }

    fn write(&mut self, obj: &Object) -> Result<(), StoreError> {
        self.objects.insert(obj.key.clone(), obj.clone());
        Ok(())
    }

    fn remove(&mut self, key: &ObjectKey) -> Result<(), StoreError> {
        self.objects.remove(key);
        Ok(())
    }

    fn in_namespace(&self, namespace: &str) -> Result<Vec<Object>, StoreError> {
        Ok(self
            .objects
            .values()
            .filter(|o| o.key.namespace == namespace)
            .cloned()
            .collect())
    }
}

impl MemoryState {
    /// Consume a pending injected failure for `op`, if one is queued first.
    fn take_failure(&mut self, op: Op) -> Result<(), StoreError> {
        if self.injected.front() == Some(&op) {
            self.injected.pop_front();
            return Err(StoreError::Unavailable("injected failure".to_owned()));
        }
        Ok(())
    }
}

/// In-process store with the full object semantics. Used by tests and by
/// callers that want a throwaway store.
///
/// Failures can be injected per operation to exercise crash/restart paths,
/// and every successful mutation is counted.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the guard cannot leave the map half-written,
        // so a poisoned lock is still safe to use.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make the next call of `op` fail with `Unavailable`. Queued failures
    /// fire in order; a call of a different operation does not consume one.
    pub fn fail_next(&self, op: Op) {
        self.lock().injected.push_back(op);
    }

    /// Number of successful create, update, and delete calls so far.
    pub fn mutations(&self) -> u64 {
        self.lock().mutations
    }

    /// Every stored object, ordered by key.
    pub fn snapshot(&self) -> Vec<Object> {
        self.lock().objects.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &ObjectKey) -> Result<Object, StoreError> {
        let mut state = self.lock();
        state.take_failure(Op::Get)?;
        state
            .read(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn create(&self, obj: Object) -> Result<Object, StoreError> {
        let mut state = self.lock();
        state.take_failure(Op::Create)?;
        state.next_uid += 1;
        let uid = Uid::new(format!("{:032x}", state.next_uid));
        let created = ops::create(&mut *state, obj, uid)?;
        state.mutations += 1;
        Ok(created)
    }

    fn update(&self, obj: Object) -> Result<Object, StoreError> {
        let mut state = self.lock();
        state.take_failure(Op::Update)?;
        let updated = ops::update(&mut *state, obj)?;
        state.mutations += 1;
        Ok(updated)
    }

    fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.take_failure(Op::Delete)?;
        ops::delete(&mut *state, key)?;
        state.mutations += 1;
        Ok(())
    }

    fn list(&self, kind: ObjectKind, namespace: Option<&str>) -> Result<Vec<Object>, StoreError> {
        let mut state = self.lock();
        state.take_failure(Op::List)?;
        Ok(state
            .objects
            .values()
            .filter(|o| o.key.kind == kind)
            .filter(|o| namespace.map_or(true, |ns| o.key.namespace == ns))
            .cloned()
            .collect())
    }
}
