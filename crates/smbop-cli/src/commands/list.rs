use super::{colorize_state, json_pretty, open_store, parse_kind, store_error, EXIT_SUCCESS};
use smbop_schema::{ObjectKind, ShareStatus};
use smbop_store::{Object, ObjectStore};
use std::path::Path;

fn state_of(obj: &Object) -> String {
    if obj.is_deleting() {
        return "terminating".to_owned();
    }
    if obj.key.kind != ObjectKind::SmbShare {
        return String::new();
    }
    obj.status_as::<ShareStatus>()
        .ok()
        .and_then(|s| s.state)
        .map_or_else(|| "pending".to_owned(), |s| s.to_string())
}

pub fn run(store_path: &Path, kind: &str, namespace: Option<&str>, json: bool) -> Result<u8, String> {
    let kind = parse_kind(kind)?;
    let store = open_store(store_path)?;
    let objects = store.list(kind, namespace).map_err(|e| store_error(&e))?;

    if json {
        println!("{}", json_pretty(&objects)?);
    } else if objects.is_empty() {
        println!("no {kind} objects found");
    } else {
        println!(
            "{:<16} {:<28} {:<14} {:>4} {:>6}",
            "NAMESPACE", "NAME", "STATE", "GEN", "OWNERS"
        );
        for obj in &objects {
            println!(
                "{:<16} {:<28} {:<14} {:>4} {:>6}",
                obj.key.namespace,
                obj.key.name,
                colorize_state(&state_of(obj)),
                obj.metadata.generation,
                obj.metadata.owner_references.len()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
