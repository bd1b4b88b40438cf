use std::fs;
use std::path::{Path, PathBuf};

use common::Workload;
use tracing::{debug, error, warn};

/// Persists the generated per-workload config file on the path the daemon
/// watches. All writes happen inside the debounce gate's critical section
/// so the eventual reload notification reflects the latest on-disk state.
pub struct ConfigWriter {
    config_dir: PathBuf,
    pos_dir: PathBuf,
    log_dir: PathBuf,
}

impl ConfigWriter {
    pub fn new<P: AsRef<Path>>(config_dir: P, pos_dir: P, log_dir: P) -> Self {
        ConfigWriter {
            config_dir: config_dir.as_ref().to_path_buf(),
            pos_dir: pos_dir.as_ref().to_path_buf(),
            log_dir: log_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.config_dir.join(format!("{namespace}_{name}.conf"))
    }

    fn pos_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.pos_dir.join(format!("pos__{namespace}_{name}.pos"))
    }

    fn log_glob(&self, namespace: &str, name: &str) -> PathBuf {
        self.log_dir.join(format!("{namespace}_{name}_*"))
    }

    /// Assemble the full generated document: tail source, tag-stamping
    /// filter, and a copy block wrapping the rendered fragments in order.
    pub fn assemble(&self, workload: &Workload, fragments: &[String]) -> String {
        let namespace = &workload.metadata.namespace;
        let name = &workload.metadata.name;
        let tag = format!("{namespace}.{name}");
        format!(
            r#"<source>
    @type tail
    path {log_glob}
    pos_file {pos_path}
    read_from_head true
    emit_unmatched_lines true
    refresh_interval 20
    tag {tag}
    <parse>
        @type json
    </parse>
</source>

<filter {tag}>
    @type record_transformer
    <record>
        tag ${{tag}}
    </record>
</filter>

<match {tag}>
    @type copy
    {fragments}
</match>
"#,
            log_glob = self.log_glob(namespace, name).display(),
            pos_path = self.pos_path(namespace, name).display(),
            fragments = fragments.join("\n"),
        )
    }

    /// Write the generated config, or delete it when no fragments resolved.
    /// A workload without fragments must have no file on disk, not an empty
    /// one. Failures are logged and left for the next reconciliation.
    pub fn apply(&self, workload: &Workload, fragments: &[String]) {
        let namespace = &workload.metadata.namespace;
        let name = &workload.metadata.name;
        let path = self.config_path(namespace, name);
        if fragments.is_empty() {
            match fs::remove_file(&path) {
                Ok(()) => debug!("removed config for {namespace}/{name}"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("delete {} failed: {e}", path.display()),
            }
            return;
        }
        let content = self.assemble(workload, fragments);
        debug!("{namespace} {name} update config");
        if let Err(e) = fs::write(&path, content) {
            error!("write {} failed: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::ObjectMeta;

    fn workload() -> Workload {
        Workload {
            metadata: ObjectMeta {
                name: "billing".to_string(),
                namespace: "prod".to_string(),
                uid: "wl-123".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn writer(dir: &Path) -> ConfigWriter {
        ConfigWriter::new(dir, dir, Path::new("/var/log/workloads"))
    }

    #[test]
    fn test_assemble_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let fragments = vec!["<store>\n  @type stdout\n</store>".to_string()];
        let doc = writer.assemble(&workload(), &fragments);

        assert!(doc.contains("@type tail"));
        assert!(doc.contains("path /var/log/workloads/prod_billing_*"));
        assert!(doc.contains(&format!(
            "pos_file {}/pos__prod_billing.pos",
            dir.path().display()
        )));
        assert!(doc.contains("tag prod.billing"));
        assert!(doc.contains("<filter prod.billing>"));
        // The record transformer keeps the literal fluentd variable.
        assert!(doc.contains("tag ${tag}"));
        assert!(doc.contains("<match prod.billing>"));
        assert!(doc.contains("@type copy"));
        assert!(doc.contains("<store>\n  @type stdout\n</store>"));
    }

    #[test]
    fn test_apply_writes_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let path = writer.config_path("prod", "billing");

        writer.apply(&workload(), &["<store></store>".to_string()]);
        assert!(path.exists());

        // Absence, not an empty file.
        writer.apply(&workload(), &[]);
        assert!(!path.exists());

        // Deleting a missing file is not an error.
        writer.apply(&workload(), &[]);
        assert!(!path.exists());
    }

    #[test]
    fn test_apply_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let path = writer.config_path("prod", "billing");

        writer.apply(&workload(), &["first".to_string()]);
        writer.apply(&workload(), &["second".to_string()]);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("second"));
        assert!(!content.contains("first"));
    }
}
