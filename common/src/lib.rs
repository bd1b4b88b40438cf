use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name of the catalog document mapping a log type to its fragment
/// template. One catalog may exist per namespace, plus one in the
/// configured global namespace acting as the cluster-wide fallback.
pub const CATALOG_DOC_NAME: &str = "log-catalog";

/// Key inside a selector document holding the comma-separated list of log
/// types the workload wants shipped.
pub const LOG_TYPES_KEY: &str = "log-types";

/// Name of the selector document for a workload.
pub fn selector_doc_name(workload_name: &str) -> String {
    format!("log-config-{workload_name}")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// Reference to the runtime environment a workload executes in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvRef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Reference to a fragment-store document a workload declares interest in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub environment: EnvRef,
    /// Ordered references to fragment-store documents. The selector
    /// document must appear here for the workload to opt in to shipping.
    #[serde(default)]
    pub documents: Vec<DocRef>,
}

/// A unit of deployable logic whose logs should be shipped. Owned by the
/// external workload registry; the controller never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkloadSpec,
}

impl Workload {
    pub fn selector_doc_name(&self) -> String {
        selector_doc_name(&self.metadata.name)
    }

    /// Whether this workload declares the given document among its refs.
    pub fn declares_document(&self, namespace: &str, name: &str) -> bool {
        self.spec
            .documents
            .iter()
            .any(|d| d.namespace == namespace && d.name == name)
    }
}

/// A namespace-scoped key/value document from the fragment store. Used
/// either as a per-workload selector or as a namespace/global catalog of
/// log-routing templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentDoc {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    /// Modification token assigned by the registry. An update whose
    /// revision matches the previous observation is a no-op.
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl FragmentDoc {
    pub fn is_catalog(&self) -> bool {
        self.metadata.name == CATALOG_DOC_NAME
    }
}

/// Change events delivered by a registry subscription.
///
/// `old` carries the subscription's previous observation of the resource,
/// when there was one; periodic resync re-delivers every resource with the
/// cached `old` so downstream no-op checks absorb the duplicates.
#[derive(Debug, Clone)]
pub enum ResourceEvent {
    WorkloadChanged {
        old: Option<Workload>,
        new: Workload,
    },
    WorkloadRemoved {
        workload: Workload,
    },
    DocumentChanged {
        old: Option<FragmentDoc>,
        new: FragmentDoc,
    },
    DocumentRemoved {
        document: FragmentDoc,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_selector_doc_name() {
        assert_eq!(selector_doc_name("billing"), "log-config-billing");
    }

    #[test]
    fn test_declares_document() {
        let workload = Workload {
            metadata: ObjectMeta {
                name: "billing".to_string(),
                namespace: "prod".to_string(),
                ..Default::default()
            },
            spec: WorkloadSpec {
                documents: vec![DocRef {
                    name: "log-config-billing".to_string(),
                    namespace: "prod".to_string(),
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(workload.declares_document("prod", "log-config-billing"));
        assert!(!workload.declares_document("staging", "log-config-billing"));
        assert_eq!(workload.selector_doc_name(), "log-config-billing");
    }

    #[test]
    fn test_workload_yaml_round() {
        let yaml = r#"
apiVersion: v1
kind: Workload
metadata:
  name: billing
  namespace: prod
  uid: wl-123
spec:
  environment:
    name: python
    namespace: prod
  documents:
    - name: log-config-billing
      namespace: prod
"#;
        let workload: Workload = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(workload.metadata.uid, "wl-123");
        assert_eq!(workload.spec.environment.name, "python");
        assert_eq!(workload.spec.documents.len(), 1);
    }

    #[test]
    fn test_catalog_detection() {
        let mut doc = FragmentDoc {
            metadata: ObjectMeta {
                name: CATALOG_DOC_NAME.to_string(),
                namespace: "prod".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(doc.is_catalog());
        doc.metadata.name = "log-config-billing".to_string();
        assert!(!doc.is_catalog());
    }
}
