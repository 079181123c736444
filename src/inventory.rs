//! Host inventory and selector resolution.
//!
//! The inventory is the authoritative list of reachable nodes, loaded once
//! from `hosts.json` and read-only afterwards. Each record maps a short
//! callsign to connection parameters and, for tunneled hosts, the callsign
//! of the master that carries them.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Connection parameters of a single node.
///
/// Fields this crate does not interpret (deployment paths and the like) are
/// preserved in `extra` so a rewrite of the file loses nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub master_callsign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The declarative host registry, in file declaration order.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: IndexMap<String, HostRecord>,
}

impl Inventory {
    /// Loads and validates an inventory from a JSON host map.
    pub fn load(path: &Path) -> Result<Self, ControlError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ControlError::InventoryRead(path.to_path_buf(), err))?;
        let hosts: IndexMap<String, HostRecord> = serde_json::from_str(&raw)
            .map_err(|err| ControlError::InventoryParse(path.to_path_buf(), err))?;
        let inventory = Self { hosts };
        inventory.validate()?;
        Ok(inventory)
    }

    /// Builds an inventory from already-parsed records. Used by tests.
    pub fn from_records(hosts: IndexMap<String, HostRecord>) -> Result<Self, ControlError> {
        let inventory = Self { hosts };
        inventory.validate()?;
        Ok(inventory)
    }

    pub fn get(&self, callsign: &str) -> Result<&HostRecord, ControlError> {
        self.hosts
            .get(callsign)
            .ok_or_else(|| ControlError::UnknownCallsign(callsign.to_string()))
    }

    pub fn has(&self, callsign: &str) -> bool {
        self.hosts.contains_key(callsign)
    }

    /// All callsigns in declaration order.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Rejects inventories whose master references cannot be dialed:
    /// a missing master, a host that is its own master, or a master chain
    /// that loops.
    fn validate(&self) -> Result<(), ControlError> {
        for (callsign, record) in &self.hosts {
            let mut seen = vec![callsign.as_str()];
            let mut current = record;
            while let Some(master) = current.master_callsign.as_deref() {
                if seen.contains(&master) {
                    return Err(ControlError::MasterCycle(callsign.clone()));
                }
                seen.push(master);
                current = self.hosts.get(master).ok_or_else(|| {
                    ControlError::MissingMaster {
                        host: callsign.clone(),
                        master: master.to_string(),
                    }
                })?;
            }
        }
        Ok(())
    }

    /// Expands a selector into a concrete, ordered set of callsigns.
    ///
    /// `"all"` selects the whole inventory; an exact callsign selects that
    /// host preceded by its master when tunneled; anything else is treated
    /// as a prefix over the inventory. A selector that matches nothing is a
    /// configuration error. Masters always appear before the hosts they
    /// carry, and duplicates collapse to their first occurrence.
    pub fn resolve(&self, selector: &str) -> Result<Vec<String>, ControlError> {
        let matched: Vec<&str> = if selector == "all" {
            self.all().collect()
        } else if self.has(selector) {
            vec![selector]
        } else {
            let group: Vec<&str> = self
                .all()
                .filter(|name| name.starts_with(selector))
                .collect();
            log::debug!("callsigns starting with '{selector}': {group:?}");
            if group.is_empty() {
                return Err(ControlError::UnknownSelector(selector.to_string()));
            }
            group
        };

        let mut resolved: Vec<String> = Vec::with_capacity(matched.len());
        for callsign in matched {
            // Masters dial first, transitively.
            let mut chain = vec![callsign.to_string()];
            let mut current = self.get(callsign)?;
            while let Some(master) = current.master_callsign.as_deref() {
                chain.push(master.to_string());
                current = self.get(master)?;
            }
            for name in chain.into_iter().rev() {
                if !resolved.contains(&name) {
                    resolved.push(name);
                }
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(master: Option<&str>) -> HostRecord {
        HostRecord {
            ip: "10.0.0.1".to_string(),
            port: 22,
            user: "pilot".to_string(),
            password: "secret".to_string(),
            master_callsign: master.map(str::to_string),
            local_ip: None,
            extra: serde_json::Map::new(),
        }
    }

    fn inventory(entries: &[(&str, Option<&str>)]) -> Inventory {
        let hosts = entries
            .iter()
            .map(|(name, master)| (name.to_string(), record(*master)))
            .collect();
        Inventory::from_records(hosts).expect("valid inventory")
    }

    #[test]
    fn all_selector_keeps_declaration_order() {
        let inv = inventory(&[("m0", None), ("m1", Some("m0")), ("w0", None)]);
        assert_eq!(inv.resolve("all").expect("resolve"), vec!["m0", "m1", "w0"]);
    }

    #[test]
    fn exact_callsign_pulls_master_first() {
        let inv = inventory(&[("m0", None), ("m1", Some("m0"))]);
        assert_eq!(inv.resolve("m1").expect("resolve"), vec!["m0", "m1"]);
        assert_eq!(inv.resolve("m0").expect("resolve"), vec!["m0"]);
    }

    #[test]
    fn prefix_match_collects_group() {
        let inv = inventory(&[("alpha", None), ("albatross", None), ("bravo", None)]);
        assert_eq!(
            inv.resolve("al").expect("resolve"),
            vec!["alpha", "albatross"]
        );
    }

    #[test]
    fn prefix_match_includes_needed_masters() {
        let inv = inventory(&[("gw", None), ("edge0", Some("gw")), ("edge1", Some("gw"))]);
        assert_eq!(
            inv.resolve("edge").expect("resolve"),
            vec!["gw", "edge0", "edge1"]
        );
    }

    #[test]
    fn unknown_selector_is_an_error() {
        let inv = inventory(&[("alpha", None)]);
        let err = inv.resolve("zulu").expect_err("unknown selector");
        assert!(matches!(err, ControlError::UnknownSelector(_)));
    }

    #[test]
    fn resolution_is_idempotent() {
        let inv = inventory(&[("m0", None), ("m1", Some("m0")), ("m2", None)]);
        let first = inv.resolve("m").expect("resolve");
        let mut again = Vec::new();
        for callsign in &first {
            for name in inv.resolve(callsign).expect("resolve element") {
                if !again.contains(&name) {
                    again.push(name);
                }
            }
        }
        assert_eq!(first, again);
    }

    #[test]
    fn self_master_is_rejected() {
        let hosts: IndexMap<String, HostRecord> =
            [("solo".to_string(), record(Some("solo")))].into_iter().collect();
        let err = Inventory::from_records(hosts).expect_err("self master");
        assert!(matches!(err, ControlError::MasterCycle(_)));
    }

    #[test]
    fn master_cycle_is_rejected() {
        let hosts: IndexMap<String, HostRecord> = [
            ("a".to_string(), record(Some("b"))),
            ("b".to_string(), record(Some("a"))),
        ]
        .into_iter()
        .collect();
        let err = Inventory::from_records(hosts).expect_err("cycle");
        assert!(matches!(err, ControlError::MasterCycle(_)));
    }

    #[test]
    fn missing_master_is_rejected() {
        let hosts: IndexMap<String, HostRecord> =
            [("a".to_string(), record(Some("ghost")))].into_iter().collect();
        let err = Inventory::from_records(hosts).expect_err("missing master");
        assert!(matches!(err, ControlError::MissingMaster { .. }));
    }

    #[test]
    fn unknown_json_fields_are_preserved() {
        let raw = r#"{"ip": "10.0.0.2", "port": 22, "user": "pilot",
                      "password": "pw", "master_callsign": null,
                      "paths": {"user": "/home/pilot"}}"#;
        let record: HostRecord = serde_json::from_str(raw).expect("parse");
        assert!(record.extra.contains_key("paths"));
        let back = serde_json::to_value(&record).expect("serialize");
        assert_eq!(back["paths"]["user"], "/home/pilot");
    }
}
