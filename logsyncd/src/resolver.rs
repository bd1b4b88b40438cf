use common::{FragmentDoc, LOG_TYPES_KEY, Workload};
use tracing::warn;

use crate::registry::Store;

/// Determine the fragment templates that apply to a workload, in the order
/// its selector document lists them. Resolution gaps degrade to partial or
/// empty results with a warning; they are never fatal.
pub async fn resolve_fragments(
    store: &dyn Store,
    global_namespace: &str,
    workload: &Workload,
) -> Vec<String> {
    let namespace = &workload.metadata.namespace;
    let name = &workload.metadata.name;
    let selector_name = workload.selector_doc_name();

    // A workload opts in by declaring its selector document among its refs.
    if !workload.declares_document(namespace, &selector_name) {
        warn!("Namespace:{namespace}, Workload:{name} does not carry the selector document {selector_name}");
        return Vec::new();
    }

    let selector = match store.get_document(namespace, &selector_name).await {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            warn!("Namespace:{namespace}, Workload:{name} selector document {selector_name} not found");
            return Vec::new();
        }
        Err(e) => {
            warn!("Namespace:{namespace}, Workload:{name} fetch of {selector_name} failed: {e}");
            return Vec::new();
        }
    };
    let Some(log_types) = selector.data.get(LOG_TYPES_KEY) else {
        return Vec::new();
    };

    let local = fetch_catalog(store, namespace).await;
    let global = fetch_catalog(store, global_namespace).await;

    let mut fragments = Vec::new();
    for log_type in log_types.split(',') {
        // Local catalog wins per log type; the global catalog is the
        // fallback for types the local one does not define.
        if let Some(template) = local.as_ref().and_then(|c| c.data.get(log_type)) {
            fragments.push(template.clone());
        } else if let Some(template) = global.as_ref().and_then(|c| c.data.get(log_type)) {
            fragments.push(template.clone());
        } else {
            warn!("Namespace:{namespace}, Workload:{name}, LogType:{log_type} not found in any catalog");
        }
    }
    fragments
}

async fn fetch_catalog(store: &dyn Store, namespace: &str) -> Option<FragmentDoc> {
    match store.get_document(namespace, common::CATALOG_DOC_NAME).await {
        Ok(Some(doc)) => Some(doc),
        Ok(None) => {
            warn!(
                "Namespace:{namespace} has no {} catalog document",
                common::CATALOG_DOC_NAME
            );
            None
        }
        Err(e) => {
            warn!(
                "Namespace:{namespace} fetch of {} failed: {e}",
                common::CATALOG_DOC_NAME
            );
            None
        }
    }
}
