use common::Workload;

/// Substitution failure in a single fragment template. The caller drops
/// that fragment and keeps rendering the workload's other fragments.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("unknown placeholder `{0}`")]
    UnknownPlaceholder(String),
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
}

/// Expand `{{field}}` placeholders in a fragment template against the
/// workload's fields. Recognized fields: `namespace`, `name`, `uid`,
/// `env_name`, `env_namespace`.
pub fn render(template: &str, workload: &Workload) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let offset = template.len() - rest.len() + start;
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(RenderError::Unterminated(offset));
        };
        let key = after[..end].trim();
        let value = field_value(workload, key)
            .ok_or_else(|| RenderError::UnknownPlaceholder(key.to_string()))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn field_value<'a>(workload: &'a Workload, key: &str) -> Option<&'a str> {
    match key {
        "namespace" => Some(&workload.metadata.namespace),
        "name" => Some(&workload.metadata.name),
        "uid" => Some(&workload.metadata.uid),
        "env_name" => Some(&workload.spec.environment.name),
        "env_namespace" => Some(&workload.spec.environment.namespace),
        _ => None,
    }
}
