use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use ::common::{DocRef, EnvRef, FragmentDoc, ObjectMeta, Workload, WorkloadSpec, selector_doc_name};
use logsyncd::debounce::ReloadNotify;
use logsyncd::registry::Store;
use std::sync::Mutex;

pub const GLOBAL_NS: &str = "logship-global";

/// In-memory registry for reconciler tests.
#[derive(Default)]
pub struct MemStore {
    pub workloads: Mutex<HashMap<(String, String), Workload>>,
    pub documents: Mutex<HashMap<(String, String), FragmentDoc>>,
}

impl MemStore {
    pub fn put_workload(&self, workload: Workload) {
        let key = (
            workload.metadata.namespace.clone(),
            workload.metadata.name.clone(),
        );
        self.workloads.lock().unwrap().insert(key, workload);
    }

    pub fn put_document(&self, doc: FragmentDoc) {
        let key = (doc.metadata.namespace.clone(), doc.metadata.name.clone());
        self.documents.lock().unwrap().insert(key, doc);
    }
}

#[async_trait]
impl Store for MemStore {
    async fn list_workloads(&self) -> Result<Vec<Workload>> {
        Ok(self.workloads.lock().unwrap().values().cloned().collect())
    }

    async fn get_document(&self, namespace: &str, name: &str) -> Result<Option<FragmentDoc>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

pub struct CountingNotify {
    pub count: Arc<AtomicUsize>,
}

#[async_trait]
impl ReloadNotify for CountingNotify {
    async fn notify(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn make_workload(namespace: &str, name: &str) -> Workload {
    Workload {
        api_version: "v1".to_string(),
        kind: "Workload".to_string(),
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: format!("uid-{namespace}-{name}"),
            ..Default::default()
        },
        spec: WorkloadSpec {
            environment: EnvRef {
                name: "python".to_string(),
                namespace: namespace.to_string(),
            },
            documents: vec![DocRef {
                name: selector_doc_name(name),
                namespace: namespace.to_string(),
            }],
        },
    }
}

pub fn make_document(
    namespace: &str,
    name: &str,
    revision: &str,
    data: &[(&str, &str)],
) -> FragmentDoc {
    FragmentDoc {
        api_version: "v1".to_string(),
        kind: "FragmentDoc".to_string(),
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        },
        revision: revision.to_string(),
        data: data
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}
