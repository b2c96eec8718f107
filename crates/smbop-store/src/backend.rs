use crate::object::{Object, ObjectKey};
use crate::StoreError;
use smbop_schema::ObjectKind;

/// The external object store the reconciler converges against.
///
/// Semantics every implementation provides:
/// - `create` assigns a uid, sets `resource_version` and `generation` to 1,
///   and fails with `AlreadyExists` on a duplicate key.
/// - `update` is a compare-and-swap on `resource_version` (and uid), failing
///   with `Conflict` on mismatch. `generation` is bumped only when the spec
///   changes. Clearing the last finalizer of an object marked for deletion
///   removes it.
/// - `delete` marks objects that still carry finalizers and removes the rest.
///   Removal cascades to dependents whose every owner is gone.
pub trait ObjectStore: Send + Sync {
    fn get(&self, key: &ObjectKey) -> Result<Object, StoreError>;

    fn create(&self, obj: Object) -> Result<Object, StoreError>;

    fn update(&self, obj: Object) -> Result<Object, StoreError>;

    fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// List objects of a kind, optionally restricted to one namespace,
    /// sorted by namespace and name.
    fn list(&self, kind: ObjectKind, namespace: Option<&str>) -> Result<Vec<Object>, StoreError>;

    /// Like `get`, with not-found mapped to `None`.
    fn get_opt(&self, key: &ObjectKey) -> Result<Option<Object>, StoreError> {
        match self.get(key) {
            Ok(obj) => Ok(Some(obj)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch the object at `desired.key`, creating it from `desired` when
    /// absent. The flag reports whether this call created it.
    fn get_or_create(&self, desired: Object) -> Result<(Object, bool), StoreError> {
        if let Some(existing) = self.get_opt(&desired.key)? {
            return Ok((existing, false));
        }
        let key = desired.key.clone();
        match self.create(desired) {
            Ok(created) => Ok((created, true)),
            // Lost a creation race; the winner's object is what exists now.
            Err(StoreError::AlreadyExists(_)) => Ok((self.get(&key)?, false)),
            Err(e) => Err(e),
        }
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn get(&self, key: &ObjectKey) -> Result<Object, StoreError> {
        (**self).get(key)
    }

    fn create(&self, obj: Object) -> Result<Object, StoreError> {
        (**self).create(obj)
    }

    fn update(&self, obj: Object) -> Result<Object, StoreError> {
        (**self).update(obj)
    }

    fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn list(&self, kind: ObjectKind, namespace: Option<&str>) -> Result<Vec<Object>, StoreError> {
        (**self).list(kind, namespace)
    }
}
