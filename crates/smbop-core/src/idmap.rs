//! ID-map range allocation for domain-joined server groups.
//!
//! Every declared domain gets its own disjoint range, in declaration order,
//! and a catch-all `*` entry always comes last so unmapped domains still
//! resolve. The output depends only on the domain list.

use smbop_schema::{IdmapBackend, IdmapDomain, SmbOptions};
use std::ops::RangeInclusive;

pub const CATCH_ALL: &str = "*";
pub const IDMAP_BASE: u64 = 2_000_000;
pub const IDMAP_WIDTH: u64 = 1_000_000;
/// Range used when no domains are declared at all.
pub const DEFAULT_RANGE: RangeInclusive<u64> = 2000..=9_999_999;
const SCHEMA_MODE: &str = "rfc2307";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdmapEntry {
    pub domain: String,
    pub backend: IdmapBackend,
    pub range: RangeInclusive<u64>,
    pub schema_mode: Option<&'static str>,
}

impl IdmapEntry {
    fn allocated(domain: &str, backend: IdmapBackend, index: u64) -> Self {
        let lo = IDMAP_BASE + index * IDMAP_WIDTH;
        Self {
            domain: domain.to_owned(),
            backend,
            range: lo..=lo + IDMAP_WIDTH - 1,
            schema_mode: (backend == IdmapBackend::Ad).then_some(SCHEMA_MODE),
        }
    }
}

pub fn allocate_idmap(domains: &[IdmapDomain]) -> Vec<IdmapEntry> {
    if domains.is_empty() {
        return vec![IdmapEntry {
            domain: CATCH_ALL.to_owned(),
            backend: IdmapBackend::Autorid,
            range: DEFAULT_RANGE,
            schema_mode: None,
        }];
    }

    let mut entries: Vec<IdmapEntry> = domains
        .iter()
        .zip(0u64..)
        .map(|(d, i)| {
            let backend = match d.backend {
                Some(IdmapBackend::Autorid) => IdmapBackend::Autorid,
                _ => IdmapBackend::Ad,
            };
            IdmapEntry::allocated(d.name.trim(), backend, i)
        })
        .collect();

    if !entries.iter().any(|e| e.domain == CATCH_ALL) {
        let next = entries.len() as u64;
        entries.push(IdmapEntry::allocated(
            CATCH_ALL,
            IdmapBackend::Autorid,
            next,
        ));
    }
    entries
}

/// Render the allocation as `idmap config <domain> : <param>` options.
pub fn idmap_options(domains: &[IdmapDomain]) -> SmbOptions {
    let mut options = SmbOptions::new();
    for entry in allocate_idmap(domains) {
        let prefix = format!("idmap config {} :", entry.domain);
        options.insert(
            format!("{prefix} backend"),
            entry.backend.as_str().to_owned(),
        );
        options.insert(
            format!("{prefix} range"),
            format!("{}-{}", entry.range.start(), entry.range.end()),
        );
        if let Some(mode) = entry.schema_mode {
            options.insert(format!("{prefix} schema_mode"), mode.to_owned());
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(name: &str, backend: Option<IdmapBackend>) -> IdmapDomain {
        IdmapDomain {
            name: name.to_owned(),
            backend,
        }
    }

    #[test]
    fn no_domains_yields_default_catch_all() {
        let opts = idmap_options(&[]);
        assert_eq!(opts.len(), 2);
        assert_eq!(opts["idmap config * : backend"], "autorid");
        assert_eq!(opts["idmap config * : range"], "2000-9999999");
    }

    #[test]
    fn domains_get_disjoint_ranges_in_order() {
        let entries = allocate_idmap(&[domain("FOO", None), domain("BAR", None)]);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].range, 2_000_000..=2_999_999);
        assert_eq!(entries[1].range, 3_000_000..=3_999_999);
        assert_eq!(entries[2].domain, "*");
        assert_eq!(entries[2].range, 4_000_000..=4_999_999);
        assert_eq!(entries[2].backend, IdmapBackend::Autorid);
    }

    #[test]
    fn ad_domains_carry_schema_mode() {
        let opts = idmap_options(&[
            domain("FOO", None),
            domain("BAR", Some(IdmapBackend::Autorid)),
        ]);
        assert_eq!(opts["idmap config FOO : backend"], "ad");
        assert_eq!(opts["idmap config FOO : schema_mode"], "rfc2307");
        assert_eq!(opts["idmap config BAR : backend"], "autorid");
        assert!(!opts.contains_key("idmap config BAR : schema_mode"));
    }

    #[test]
    fn declared_catch_all_is_not_duplicated() {
        let entries = allocate_idmap(&[
            domain("*", Some(IdmapBackend::Autorid)),
            domain("FOO", None),
        ]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].domain, "*");
    }

    #[test]
    fn allocation_is_deterministic() {
        let domains = [domain("A", None), domain("B", None)];
        assert_eq!(idmap_options(&domains), idmap_options(&domains));
    }
}
