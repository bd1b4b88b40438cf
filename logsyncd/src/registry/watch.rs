use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, bail};
use common::{FragmentDoc, ResourceEvent, Workload};
use etcd_client::{Event, EventType};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tracing::{error, warn};

use super::store::{DOCUMENTS_PREFIX, RegistryStore, WORKLOADS_PREFIX};

/// Which resource tree a subscription follows.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Workloads,
    Documents,
}

impl Kind {
    fn prefix(&self) -> &'static str {
        match self {
            Kind::Workloads => WORKLOADS_PREFIX,
            Kind::Documents => DOCUMENTS_PREFIX,
        }
    }
}

/// Last observation per registry key: the raw YAML and its mod revision.
/// Supplies the `old` side of change events, including on resync
/// re-delivery, so downstream no-op checks can absorb duplicates.
type Cache = HashMap<String, (String, i64)>;

/// Start the workload and document subscriptions. Each delivers an initial
/// snapshot, then watch events, re-listing everything every `resync` as the
/// at-least-once recovery path. Runs for the life of the process.
pub fn spawn(store: RegistryStore, resync: Duration, tx: mpsc::Sender<ResourceEvent>) {
    tokio::spawn(run_subscription(
        store.clone(),
        Kind::Workloads,
        resync,
        tx.clone(),
    ));
    tokio::spawn(run_subscription(store, Kind::Documents, resync, tx));
}

/// Keep the subscription alive across transport failures.
async fn run_subscription(
    store: RegistryStore,
    kind: Kind,
    resync: Duration,
    tx: mpsc::Sender<ResourceEvent>,
) {
    let mut cache = Cache::new();
    loop {
        if let Err(e) = run_once(&store, kind, resync, &tx, &mut cache).await {
            error!("{kind:?} subscription error: {e:?}, retrying in 3s");
        }
        sleep(Duration::from_secs(3)).await;
    }
}

async fn run_once(
    store: &RegistryStore,
    kind: Kind,
    resync: Duration,
    tx: &mpsc::Sender<ResourceEvent>,
    cache: &mut Cache,
) -> Result<()> {
    let prefix = kind.prefix();
    let (items, rev) = store.snapshot_with_rev(prefix).await?;
    deliver_listing(kind, items, cache, tx).await;

    // Dropping the watcher cancels the stream, so it stays bound here.
    let (_watcher, mut stream) = store.watch_prefix(prefix, rev + 1).await?;
    let mut resync_tick = interval(resync);
    resync_tick.tick().await;

    loop {
        tokio::select! {
            resp = stream.next() => {
                let Some(resp) = resp else {
                    bail!("watch stream for {prefix} closed");
                };
                let resp = resp?;
                for event in resp.events() {
                    handle_watch_event(kind, event, cache, tx).await;
                }
            }
            _ = resync_tick.tick() => {
                let (items, _rev) = store.snapshot_with_rev(prefix).await?;
                deliver_listing(kind, items, cache, tx).await;
            }
        }
    }
}

async fn deliver_listing(
    kind: Kind,
    items: Vec<(String, String, i64)>,
    cache: &mut Cache,
    tx: &mpsc::Sender<ResourceEvent>,
) {
    for (key, yaml, mod_rev) in items {
        send_changed(kind, &key, yaml, mod_rev, cache, tx).await;
    }
}

async fn handle_watch_event(
    kind: Kind,
    event: &Event,
    cache: &mut Cache,
    tx: &mpsc::Sender<ResourceEvent>,
) {
    let Some(kv) = event.kv() else {
        return;
    };
    let key = String::from_utf8_lossy(kv.key()).to_string();
    match event.event_type() {
        EventType::Put => {
            let yaml = String::from_utf8_lossy(kv.value()).to_string();
            send_changed(kind, &key, yaml, kv.mod_revision(), cache, tx).await;
        }
        EventType::Delete => {
            let prior = cache.remove(&key).or_else(|| {
                event.prev_kv().map(|prev| {
                    (
                        String::from_utf8_lossy(prev.value()).to_string(),
                        prev.mod_revision(),
                    )
                })
            });
            let Some((yaml, mod_rev)) = prior else {
                warn!("delete event for {key} without prior state, skipped");
                return;
            };
            let removed = match kind {
                Kind::Workloads => {
                    parse_workload(&key, &yaml).map(|workload| ResourceEvent::WorkloadRemoved {
                        workload,
                    })
                }
                Kind::Documents => parse_document(&key, &yaml, mod_rev)
                    .map(|document| ResourceEvent::DocumentRemoved { document }),
            };
            if let Some(removed) = removed {
                let _ = tx.send(removed).await;
            }
        }
    }
}

async fn send_changed(
    kind: Kind,
    key: &str,
    yaml: String,
    mod_rev: i64,
    cache: &mut Cache,
    tx: &mpsc::Sender<ResourceEvent>,
) {
    let prior = cache.insert(key.to_string(), (yaml.clone(), mod_rev));
    let event = match kind {
        Kind::Workloads => {
            let Some(new) = parse_workload(key, &yaml) else {
                return;
            };
            let old = prior.and_then(|(old_yaml, _)| parse_workload(key, &old_yaml));
            ResourceEvent::WorkloadChanged { old, new }
        }
        Kind::Documents => {
            let Some(new) = parse_document(key, &yaml, mod_rev) else {
                return;
            };
            let old = prior.and_then(|(old_yaml, old_rev)| parse_document(key, &old_yaml, old_rev));
            ResourceEvent::DocumentChanged { old, new }
        }
    };
    let _ = tx.send(event).await;
}

fn parse_workload(key: &str, yaml: &str) -> Option<Workload> {
    match serde_yaml::from_str(yaml) {
        Ok(workload) => Some(workload),
        Err(e) => {
            warn!("skipping unparsable workload {key}: {e}");
            None
        }
    }
}

fn parse_document(key: &str, yaml: &str, mod_rev: i64) -> Option<FragmentDoc> {
    match serde_yaml::from_str::<FragmentDoc>(yaml) {
        Ok(mut doc) => {
            doc.revision = mod_rev.to_string();
            Some(doc)
        }
        Err(e) => {
            warn!("skipping unparsable document {key}: {e}");
            None
        }
    }
}
