use super::{core_error, json_pretty, load_config, open_store, store_error, EXIT_SUCCESS};
use smbop_core::resources::{document_key, read_document};
use smbop_store::ObjectStore;
use std::path::Path;

/// Print the document as the in-container tooling reads it. The output is
/// JSON either way; `--json` adds the object's store metadata around it.
pub fn run(
    store_path: &Path,
    config_path: Option<&Path>,
    namespace: &str,
    json: bool,
) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let store = open_store(store_path)?;
    let key = document_key(namespace, &config);
    let obj = store
        .get_opt(&key)
        .map_err(|e| store_error(&e))?
        .ok_or_else(|| format!("no configuration document in namespace '{namespace}'"))?;
    let doc = read_document(&obj).map_err(|e| core_error(&e))?;

    if json {
        let payload = serde_json::json!({
            "namespace": namespace,
            "name": key.name,
            "resource_version": obj.metadata.resource_version,
            "document": doc,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", doc.to_json().map_err(|e| e.to_string())?);
    }
    Ok(EXIT_SUCCESS)
}
