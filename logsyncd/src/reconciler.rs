use std::sync::Arc;

use common::{FragmentDoc, ResourceEvent, Workload};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::confgen::ConfigWriter;
use crate::debounce::DebounceGate;
use crate::render::render;
use crate::resolver::resolve_fragments;
use crate::registry::Store;

/// Turns registry change events into per-workload config files. Every
/// filesystem change goes through the shared debounce gate, which fires the
/// reload notifier at most once per period.
pub struct Reconciler {
    store: Arc<dyn Store>,
    writer: ConfigWriter,
    gate: Arc<DebounceGate>,
    global_namespace: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        writer: ConfigWriter,
        gate: Arc<DebounceGate>,
        global_namespace: String,
    ) -> Self {
        Reconciler {
            store,
            writer,
            gate,
            global_namespace,
        }
    }

    /// Consume events until the channel closes. Per-workload failures are
    /// contained; the loop keeps going for everything else.
    pub async fn run(&self, mut events: mpsc::Receiver<ResourceEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
    }

    pub async fn handle(&self, event: ResourceEvent) {
        match event {
            ResourceEvent::WorkloadChanged { old, new } => {
                if old.as_ref().is_some_and(|old| unchanged(old, &new)) {
                    return;
                }
                self.sync_workload(&new).await;
            }
            ResourceEvent::WorkloadRemoved { workload } => {
                // Removal is left unhandled: the generated config stays on
                // disk after the workload is gone. Known limitation.
                debug!(
                    "ignoring removal of workload {}/{}",
                    workload.metadata.namespace, workload.metadata.name
                );
            }
            ResourceEvent::DocumentChanged { old, new } => {
                let same_revision = old
                    .as_ref()
                    .is_some_and(|old| old.revision == new.revision);
                if same_revision {
                    return;
                }
                self.sync_document(&new).await;
            }
            ResourceEvent::DocumentRemoved { document } => {
                // Same gap as workload removal: configs built from this
                // document go stale until the next change touches them.
                debug!(
                    "ignoring removal of document {}/{}",
                    document.metadata.namespace, document.metadata.name
                );
            }
        }
    }

    /// Re-sync every workload whose resolution can pass through `doc`.
    async fn sync_document(&self, doc: &FragmentDoc) {
        let workloads = match self.store.list_workloads().await {
            Ok(workloads) => workloads,
            Err(e) => {
                error!(
                    "listing workloads for document {}/{} failed: {e}",
                    doc.metadata.namespace, doc.metadata.name
                );
                return;
            }
        };
        for workload in workloads.iter().filter(|w| self.is_affected(w, doc)) {
            self.sync_workload(workload).await;
        }
    }

    fn is_affected(&self, workload: &Workload, doc: &FragmentDoc) -> bool {
        if doc.is_catalog() {
            // The global catalog reaches everything; a namespace catalog
            // reaches its own namespace.
            doc.metadata.namespace == self.global_namespace
                || workload.metadata.namespace == doc.metadata.namespace
        } else {
            workload.declares_document(&doc.metadata.namespace, &doc.metadata.name)
        }
    }

    /// Resolve, render, and persist one workload's config inside the
    /// debounce critical section.
    pub async fn sync_workload(&self, workload: &Workload) {
        let namespace = &workload.metadata.namespace;
        let name = &workload.metadata.name;
        let templates =
            resolve_fragments(self.store.as_ref(), &self.global_namespace, workload).await;
        let mut fragments = Vec::with_capacity(templates.len());
        for template in &templates {
            match render(template, workload) {
                Ok(fragment) => fragments.push(fragment),
                // A bad fragment never takes its siblings down with it.
                Err(e) => error!("dropping fragment for {namespace}/{name}: {e}"),
            }
        }
        self.gate
            .update(|| self.writer.apply(workload, &fragments))
            .await;
    }
}

/// Resync no-op guard: two observations are equal when they serialize
/// identically.
fn unchanged(old: &Workload, new: &Workload) -> bool {
    match (serde_yaml::to_string(old), serde_yaml::to_string(new)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::ObjectMeta;

    #[test]
    fn test_unchanged_compares_serialized_form() {
        let a = Workload {
            metadata: ObjectMeta {
                name: "billing".to_string(),
                namespace: "prod".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut b = a.clone();
        assert!(unchanged(&a, &b));
        b.metadata.uid = "wl-9".to_string();
        assert!(!unchanged(&a, &b));
    }
}
