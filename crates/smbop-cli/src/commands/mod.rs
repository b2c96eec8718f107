pub mod apply;
pub mod completions;
pub mod delete;
pub mod events;
pub mod list;
pub mod reconcile;
pub mod show_config;
pub mod verify_store;

use indicatif::{ProgressBar, ProgressStyle};
use smbop_core::CoreError;
use smbop_schema::{ObjectKind, OperatorConfig};
use smbop_store::{FileStore, ObjectKey, StoreError};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
/// A share was halted by an invalid configuration and recorded an event.
pub const EXIT_INVALID: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> Result<ProgressBar, String> {
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .map_err(|e| e.to_string())?
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    let pb = ProgressBar::new_spinner();
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

pub fn spin_done(pb: &ProgressBar, ok: bool, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    let mark = if ok { "✓" } else { "✗" };
    pb.finish_with_message(format!("{mark} {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "converged" => Style::new().green().apply_to(state).to_string(),
        "initializing" => Style::new().yellow().apply_to(state).to_string(),
        "terminating" => Style::new().red().apply_to(state).to_string(),
        "absent" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

pub fn store_error(e: &StoreError) -> String {
    format!("store error: {e}")
}

pub fn core_error(e: &CoreError) -> String {
    match e {
        CoreError::Store(inner) => store_error(inner),
        CoreError::Schema(inner) => format!("manifest error: {inner}"),
        other => other.to_string(),
    }
}

pub fn open_store(path: &Path) -> Result<FileStore, String> {
    FileStore::open(path).map_err(|e| store_error(&e))
}

pub fn load_config(path: Option<&Path>) -> Result<OperatorConfig, String> {
    match path {
        Some(p) => OperatorConfig::load(p).map_err(|e| format!("config error: {e}")),
        None => Ok(OperatorConfig::default()),
    }
}

pub fn parse_kind(input: &str) -> Result<ObjectKind, String> {
    ObjectKind::parse(input).ok_or_else(|| {
        let known: Vec<&str> = ObjectKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown kind '{input}' (expected one of: {})", known.join(", "))
    })
}

pub fn parse_target(kind: ObjectKind, input: &str) -> Result<ObjectKey, String> {
    ObjectKey::parse(kind, input)
        .ok_or_else(|| format!("invalid target '{input}': expected <namespace>/<name>"))
}
