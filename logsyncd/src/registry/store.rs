use anyhow::Result;
use async_trait::async_trait;
use common::{FragmentDoc, Workload};
use etcd_client::{Client, GetOptions, PutOptions, WatchOptions, WatchStream, Watcher};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

pub const WORKLOADS_PREFIX: &str = "/registry/workloads/";
pub const DOCUMENTS_PREFIX: &str = "/registry/documents/";

/// Read surface the resolver and reconciler need. Production uses the
/// etcd-backed [`RegistryStore`]; tests substitute an in-memory fake.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_workloads(&self) -> Result<Vec<Workload>>;
    async fn get_document(&self, namespace: &str, name: &str) -> Result<Option<FragmentDoc>>;
}

/// Registry access over etcd. Workloads live under
/// `/registry/workloads/{namespace}/{name}` and fragment-store documents
/// under `/registry/documents/{namespace}/{name}`, both as YAML.
#[derive(Clone)]
pub struct RegistryStore {
    client: Arc<RwLock<Client>>,
}

impl RegistryStore {
    pub async fn new(endpoints: &[&str]) -> Result<Self> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self {
            client: Arc::new(RwLock::new(client)),
        })
    }

    pub async fn insert_workload_yaml(
        &self,
        namespace: &str,
        name: &str,
        yaml: &str,
    ) -> Result<()> {
        let key = format!("{WORKLOADS_PREFIX}{namespace}/{name}");
        let mut client = self.client.write().await;
        client.put(key, yaml, Some(PutOptions::new())).await?;
        Ok(())
    }

    pub async fn delete_workload(&self, namespace: &str, name: &str) -> Result<()> {
        let key = format!("{WORKLOADS_PREFIX}{namespace}/{name}");
        let mut client = self.client.write().await;
        client.delete(key, None).await?;
        Ok(())
    }

    pub async fn insert_document_yaml(
        &self,
        namespace: &str,
        name: &str,
        yaml: &str,
    ) -> Result<()> {
        let key = format!("{DOCUMENTS_PREFIX}{namespace}/{name}");
        let mut client = self.client.write().await;
        client.put(key, yaml, Some(PutOptions::new())).await?;
        Ok(())
    }

    pub async fn delete_document(&self, namespace: &str, name: &str) -> Result<()> {
        let key = format!("{DOCUMENTS_PREFIX}{namespace}/{name}");
        let mut client = self.client.write().await;
        client.delete(key, None).await?;
        Ok(())
    }

    pub async fn get_workload(&self, namespace: &str, name: &str) -> Result<Option<Workload>> {
        let key = format!("{WORKLOADS_PREFIX}{namespace}/{name}");
        let mut client = self.client.write().await;
        let resp = client.get(key, None).await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(serde_yaml::from_str(&String::from_utf8_lossy(
                kv.value(),
            ))?)),
            None => Ok(None),
        }
    }

    /// Snapshot of a prefix plus the revision it was read at. Items carry
    /// (key, yaml, mod revision).
    pub async fn snapshot_with_rev(
        &self,
        prefix: &str,
    ) -> Result<(Vec<(String, String, i64)>, i64)> {
        let mut client = self.client.write().await;
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        let rev = resp.header().map(|h| h.revision()).unwrap_or(0);
        let items = resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).to_string(),
                    String::from_utf8_lossy(kv.value()).to_string(),
                    kv.mod_revision(),
                )
            })
            .collect();
        Ok((items, rev))
    }

    /// Prefix watch with prev_kv from a starting revision.
    pub async fn watch_prefix(
        &self,
        prefix: &str,
        start_rev: i64,
    ) -> Result<(Watcher, WatchStream)> {
        let opts = WatchOptions::new()
            .with_prefix()
            .with_prev_key()
            .with_start_revision(start_rev);
        let mut client = self.client.write().await;
        let (watcher, stream) = client.watch(prefix, Some(opts)).await?;
        Ok((watcher, stream))
    }
}

#[async_trait]
impl Store for RegistryStore {
    async fn list_workloads(&self) -> Result<Vec<Workload>> {
        let (items, _rev) = self.snapshot_with_rev(WORKLOADS_PREFIX).await?;
        let mut workloads = Vec::with_capacity(items.len());
        for (key, yaml, _mod_rev) in items {
            match serde_yaml::from_str(&yaml) {
                Ok(w) => workloads.push(w),
                Err(e) => warn!("skipping unparsable workload {key}: {e}"),
            }
        }
        Ok(workloads)
    }

    async fn get_document(&self, namespace: &str, name: &str) -> Result<Option<FragmentDoc>> {
        let key = format!("{DOCUMENTS_PREFIX}{namespace}/{name}");
        let mut client = self.client.write().await;
        let resp = client.get(key, None).await?;
        match resp.kvs().first() {
            Some(kv) => {
                let mut doc: FragmentDoc =
                    serde_yaml::from_str(&String::from_utf8_lossy(kv.value()))?;
                doc.revision = kv.mod_revision().to_string();
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }
}
