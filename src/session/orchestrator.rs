//! Parallel connection fan-out with master→child dependency gating.
//!
//! One worker task is spawned per resolved host. A host with a master waits
//! on the master's ready-signal before opening its tunnel; every worker
//! publishes its outcome into the shared map under one mutex and then
//! signals its own readiness, on success and failure alike.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

use super::client::{dial_direct, dial_via_master, open_sftp};
use super::probe;
use super::{ConnectionMap, NodeLink, NodeSession};
use crate::config;
use crate::error::ControlError;
use crate::inventory::{HostRecord, Inventory};
use crate::logging::{scribe, scribe_host};

type SharedMap = Arc<Mutex<HashMap<String, Arc<NodeSession>>>>;

/// What a tunneled worker needs to know about its master.
struct MasterGate {
    callsign: String,
    record: HostRecord,
    ready: watch::Receiver<bool>,
}

/// Dials every host the selector resolves to, in parallel, and returns the
/// resulting connection map in resolution order.
///
/// A dependent host's dial strictly happens-after its master's dial has
/// finished; independent hosts proceed concurrently. Hosts that fail to
/// connect are present in the map as unavailable entries.
pub async fn connect_fleet(
    inventory: &Inventory,
    selector: &str,
) -> Result<ConnectionMap, ControlError> {
    let callsigns = inventory.resolve(selector)?;
    scribe(&format!("Connecting to {callsigns:?}"));

    let mut senders = HashMap::new();
    let mut receivers = HashMap::new();
    for callsign in &callsigns {
        let (tx, rx) = watch::channel(false);
        senders.insert(callsign.clone(), tx);
        receivers.insert(callsign.clone(), rx);
    }

    let map: SharedMap = Arc::default();
    let mut workers = JoinSet::new();
    for callsign in &callsigns {
        let record = inventory.get(callsign)?.clone();
        let gate = match record.master_callsign.as_deref() {
            Some(master) => Some(MasterGate {
                callsign: master.to_string(),
                record: inventory.get(master)?.clone(),
                ready: receivers[master].clone(),
            }),
            None => None,
        };
        let ready = senders
            .remove(callsign)
            .ok_or_else(|| ControlError::UnknownCallsign(callsign.clone()))?;
        workers.spawn(connect_node(
            callsign.clone(),
            record,
            gate,
            ready,
            map.clone(),
        ));
    }
    drop(receivers);
    while workers.join_next().await.is_some() {}

    let mut inner = std::mem::take(&mut *map.lock().await);
    let mut connections = ConnectionMap::new();
    for callsign in callsigns {
        if let Some(session) = inner.remove(&callsign) {
            connections.insert(callsign, session);
        }
    }
    Ok(connections)
}

/// Per-host worker. Publishes the session under the mutex, then signals.
async fn connect_node(
    callsign: String,
    record: HostRecord,
    gate: Option<MasterGate>,
    ready: watch::Sender<bool>,
    map: SharedMap,
) {
    let session = match establish(&callsign, &record, gate, &map).await {
        Ok(session) => session,
        Err(err) => {
            debug!("{callsign} unavailable: {err}");
            NodeSession::unavailable(callsign.clone(), err.to_string())
        }
    };
    session.report();
    map.lock().await.insert(callsign, Arc::new(session));
    let _ = ready.send(true);
}

async fn establish(
    callsign: &str,
    record: &HostRecord,
    gate: Option<MasterGate>,
    map: &SharedMap,
) -> Result<NodeSession, ControlError> {
    let handle = match gate {
        None => {
            scribe_host(callsign, "Connecting directly...", None);
            dial_direct(callsign, record).await?
        }
        Some(mut gate) => {
            scribe_host(callsign, "Connecting using nested SSH...", None);
            let waited =
                tokio::time::timeout(config::MASTER_WAIT_TIMEOUT, gate.ready.wait_for(|r| *r))
                    .await;
            let waited_ok = matches!(waited, Ok(Ok(_)));
            drop(waited);
            if !waited_ok {
                return Err(ControlError::MasterWait {
                    host: callsign.to_string(),
                    master: gate.callsign,
                });
            }
            // The master's published state and the tunnel open happen under
            // the same lock that guards map insertion.
            let guard = map.lock().await;
            let master_link = guard
                .get(&gate.callsign)
                .and_then(|session| session.link.as_ref())
                .ok_or_else(|| ControlError::MasterUnavailable {
                    host: callsign.to_string(),
                    master: gate.callsign.clone(),
                })?;
            dial_via_master(callsign, record, &master_link.handle, &gate.record).await?
        }
    };

    let sftp = open_sftp(&handle).await?;
    let link = NodeLink { handle, sftp };
    debug!("{callsign} checking tmux state");
    let status = probe::probe(&link).await?;
    Ok(NodeSession::connected(callsign.to_string(), link, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;
    use crate::session::NodeStatus;
    use indexmap::IndexMap;

    fn unreachable_record(master: Option<&str>) -> HostRecord {
        HostRecord {
            // Port 1 on loopback refuses immediately, so the dial fails
            // without waiting out the timeout.
            ip: "127.0.0.1".to_string(),
            port: 1,
            user: "pilot".to_string(),
            password: "secret".to_string(),
            master_callsign: master.map(str::to_string),
            local_ip: None,
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn master_failure_marks_children_unavailable() {
        let hosts: IndexMap<String, HostRecord> = [
            ("m0".to_string(), unreachable_record(None)),
            ("m1".to_string(), unreachable_record(Some("m0"))),
        ]
        .into_iter()
        .collect();
        let inventory = Inventory::from_records(hosts).expect("inventory");

        let connections = connect_fleet(&inventory, "all").await.expect("fan-out");
        assert_eq!(connections.len(), 2);
        assert!(!connections["m0"].is_connected());
        assert!(!connections["m1"].is_connected());
        match &connections["m1"].status {
            NodeStatus::Unavailable(cause) => {
                assert!(cause.contains("m0"), "cause should name the master: {cause}")
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fan_out_keeps_resolution_order() {
        let hosts: IndexMap<String, HostRecord> = [
            ("b".to_string(), unreachable_record(None)),
            ("a".to_string(), unreachable_record(None)),
        ]
        .into_iter()
        .collect();
        let inventory = Inventory::from_records(hosts).expect("inventory");

        let connections = connect_fleet(&inventory, "all").await.expect("fan-out");
        let order: Vec<&str> = connections.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}
