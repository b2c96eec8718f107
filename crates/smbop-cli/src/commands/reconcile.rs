use super::{
    colorize_state, core_error, json_pretty, load_config, open_store, parse_target, spin_done,
    spinner, store_error, EXIT_FAILURE, EXIT_INVALID, EXIT_SUCCESS,
};
use smbop_core::{shutdown_requested, Outcome, Reconciler, RunReport};
use smbop_schema::{ObjectKind, ShareState, ShareStatus};
use smbop_store::{ObjectKey, ObjectStore};
use std::path::Path;

/// Where a share ended up after reconciling.
struct Settled {
    state: ShareState,
    /// Done but not converged: stopped on a configuration problem.
    halted: bool,
}

fn settled(store: &dyn ObjectStore, key: &ObjectKey, outcome: Outcome) -> Result<Settled, String> {
    let Some(share) = store.get_opt(key).map_err(|e| store_error(&e))? else {
        return Ok(Settled {
            state: ShareState::Absent,
            halted: false,
        });
    };
    if share.is_deleting() {
        return Ok(Settled {
            state: ShareState::Terminating,
            halted: false,
        });
    }
    let status: ShareStatus = share.status_as().map_err(|e| store_error(&e))?;
    let state = status.state.unwrap_or(ShareState::Initializing);
    Ok(Settled {
        state,
        halted: outcome == Outcome::Done && state != ShareState::Converged,
    })
}

fn report_json(key: &ObjectKey, report: &RunReport, settled: &Settled) -> serde_json::Value {
    serde_json::json!({
        "namespace": key.namespace,
        "name": key.name,
        "outcome": report.outcome.to_string(),
        "passes": report.passes,
        "retries": report.retries,
        "state": settled.state.to_string(),
        "halted": settled.halted,
    })
}

pub fn run(
    store_path: &Path,
    config_path: Option<&Path>,
    target: &str,
    until_done: Option<u32>,
    json: bool,
) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let store = open_store(store_path)?;
    let key = parse_target(ObjectKind::SmbShare, target)?;
    let reconciler = Reconciler::new(&store, &config);

    let report = match until_done {
        None => RunReport {
            passes: 1,
            retries: 0,
            outcome: reconciler.process(&key).map_err(|e| core_error(&e))?,
        },
        Some(max_passes) => {
            let pb = if json {
                None
            } else {
                Some(spinner(&format!("reconciling {}/{}", key.namespace, key.name))?)
            };
            let result = reconciler.run_until_done(&key, max_passes, shutdown_requested);
            if let Some(pb) = &pb {
                let ok = matches!(&result, Ok(r) if r.outcome == Outcome::Done);
                spin_done(pb, ok, &format!("{}/{}", key.namespace, key.name));
            }
            result.map_err(|e| core_error(&e))?
        }
    };
    let settled = settled(&store, &key, report.outcome)?;

    if json {
        println!("{}", json_pretty(&report_json(&key, &report, &settled))?);
    } else {
        println!(
            "{}/{}: {} after {} pass(es), state {}",
            key.namespace,
            key.name,
            report.outcome,
            report.passes,
            colorize_state(&settled.state.to_string())
        );
        if settled.halted {
            println!("halted on invalid configuration; see `smbop events {}`", key.namespace);
        }
    }

    if settled.halted {
        return Ok(EXIT_INVALID);
    }
    if until_done.is_some() && report.outcome == Outcome::Requeue {
        if shutdown_requested() {
            eprintln!("interrupted before {}/{} settled", key.namespace, key.name);
        } else {
            eprintln!(
                "{}/{} did not settle within {} passes",
                key.namespace, key.name, report.passes
            );
        }
        return Ok(EXIT_FAILURE);
    }
    Ok(EXIT_SUCCESS)
}

pub fn run_all(
    store_path: &Path,
    config_path: Option<&Path>,
    namespace: Option<&str>,
    max_passes: u32,
    json: bool,
) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let store = open_store(store_path)?;
    let reconciler = Reconciler::new(&store, &config);
    let shares = store
        .list(ObjectKind::SmbShare, namespace)
        .map_err(|e| store_error(&e))?;

    if shares.is_empty() && !json {
        println!("no shares found");
        return Ok(EXIT_SUCCESS);
    }

    let mut rows = Vec::with_capacity(shares.len());
    let mut code = EXIT_SUCCESS;
    for share in shares {
        if shutdown_requested() {
            eprintln!("interrupted");
            return Ok(EXIT_FAILURE);
        }
        let key = share.key;
        match reconciler.run_until_done(&key, max_passes, shutdown_requested) {
            Ok(report) => {
                let settled = settled(&store, &key, report.outcome)?;
                if settled.halted {
                    code = code.max(EXIT_INVALID);
                } else if report.outcome == Outcome::Requeue {
                    code = code.max(EXIT_FAILURE);
                }
                if json {
                    rows.push(report_json(&key, &report, &settled));
                } else {
                    println!(
                        "{:<16} {:<24} {:<8} {:>6} {}",
                        key.namespace,
                        key.name,
                        report.outcome.to_string(),
                        report.passes,
                        colorize_state(&settled.state.to_string())
                    );
                }
            }
            Err(e) => {
                let msg = core_error(&e);
                code = code.max(EXIT_FAILURE);
                if json {
                    rows.push(serde_json::json!({
                        "namespace": key.namespace,
                        "name": key.name,
                        "error": msg,
                    }));
                } else {
                    eprintln!("{}/{}: {msg}", key.namespace, key.name);
                }
            }
        }
    }

    if json {
        println!("{}", json_pretty(&rows)?);
    }
    Ok(code)
}
