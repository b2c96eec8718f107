use super::{json_pretty, open_store, store_error, EXIT_SUCCESS};
use smbop_schema::parse_manifest_file;
use smbop_store::{Object, ObjectKey, ObjectStore};
use std::path::Path;

pub fn run(store_path: &Path, file: &Path, json: bool) -> Result<u8, String> {
    let manifests = parse_manifest_file(file).map_err(|e| format!("manifest error: {e}"))?;
    for manifest in &manifests {
        manifest
            .validate()
            .map_err(|e| format!("manifest error: {}/{}: {e}", manifest.namespace, manifest.name))?;
    }

    let store = open_store(store_path)?;
    let mut applied = Vec::with_capacity(manifests.len());
    for manifest in manifests {
        let key = ObjectKey::new(manifest.kind, manifest.namespace, manifest.name);
        let action = match store.get_opt(&key).map_err(|e| store_error(&e))? {
            Some(existing) if existing.spec == manifest.spec => "unchanged",
            Some(mut existing) => {
                // Replaces the spec; a concurrent writer surfaces as a conflict.
                existing.spec = manifest.spec;
                store.update(existing).map_err(|e| store_error(&e))?;
                "updated"
            }
            None => {
                let obj = Object::new(key.clone(), &manifest.spec).map_err(|e| store_error(&e))?;
                store.create(obj).map_err(|e| store_error(&e))?;
                "created"
            }
        };
        applied.push((key, action));
    }

    if json {
        let payload: Vec<_> = applied
            .iter()
            .map(|(key, action)| {
                serde_json::json!({
                    "kind": key.kind,
                    "namespace": key.namespace,
                    "name": key.name,
                    "action": action,
                })
            })
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else {
        for (key, action) in &applied {
            println!("{key} {action}");
        }
    }
    Ok(EXIT_SUCCESS)
}
