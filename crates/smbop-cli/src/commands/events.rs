use super::{json_pretty, open_store, store_error, EXIT_SUCCESS};
use smbop_core::list_events;
use std::path::Path;

pub fn run(store_path: &Path, namespace: &str, json: bool) -> Result<u8, String> {
    let store = open_store(store_path)?;
    let events = list_events(&store, namespace).map_err(|e| store_error(&e))?;

    if json {
        println!("{}", json_pretty(&events)?);
    } else if events.is_empty() {
        println!("no events in namespace '{namespace}'");
    } else {
        println!(
            "{:<8} {:<22} {:<28} {:>5} MESSAGE",
            "TYPE", "REASON", "OBJECT", "COUNT"
        );
        for ev in &events {
            let object = format!("{}/{}", ev.involved.kind, ev.involved.name);
            let kind = console::style(format!("{:<8}", ev.event_type)).yellow();
            println!(
                "{kind} {:<22} {object:<28} {:>5} {}",
                ev.reason, ev.count, ev.message
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
