use super::{json_pretty, open_store, parse_kind, parse_target, store_error, EXIT_SUCCESS};
use smbop_store::ObjectStore;
use std::path::Path;

pub fn run(store_path: &Path, kind: &str, target: &str, json: bool) -> Result<u8, String> {
    let key = parse_target(parse_kind(kind)?, target)?;
    let store = open_store(store_path)?;
    store.delete(&key).map_err(|e| store_error(&e))?;

    // Objects holding finalizers stay until the reconciler releases them.
    let pending = store
        .get_opt(&key)
        .map_err(|e| store_error(&e))?
        .map(|obj| obj.metadata.finalizers)
        .unwrap_or_default();

    if json {
        let payload = serde_json::json!({
            "kind": key.kind,
            "namespace": key.namespace,
            "name": key.name,
            "removed": pending.is_empty(),
            "pending_finalizers": pending,
        });
        println!("{}", json_pretty(&payload)?);
    } else if pending.is_empty() {
        println!("deleted {key}");
    } else {
        println!(
            "deletion requested for {key} (waiting on: {})",
            pending.join(", ")
        );
    }
    Ok(EXIT_SUCCESS)
}
