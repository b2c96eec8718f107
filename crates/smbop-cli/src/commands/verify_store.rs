use super::{json_pretty, open_store, store_error, EXIT_STORE_ERROR, EXIT_SUCCESS};
use smbop_store::verify_store_integrity;
use std::path::Path;

pub fn run(store_path: &Path, json: bool) -> Result<u8, String> {
    let store = open_store(store_path)?;
    let report = verify_store_integrity(store.layout()).map_err(|e| store_error(&e))?;

    if json {
        let payload = serde_json::json!({
            "checked": report.checked,
            "passed": report.passed,
            "failed": report.failed.len(),
            "dangling_owners": report.dangling_owners.len(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "store integrity: {}/{} objects passed",
            report.passed, report.checked
        );
        for f in &report.failed {
            println!("  FAIL {}: {}", f.subject, f.reason);
        }
        for d in &report.dangling_owners {
            println!("  DANGLING {}: {}", d.subject, d.reason);
        }
    }

    if report.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_STORE_ERROR)
    }
}
