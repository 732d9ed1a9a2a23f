use crate::record::Metadata;
use regex::{Captures, Regex};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::LazyLock;

static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{meta:([^{}]+)\}").expect("valid template regex"));

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Substitute `{meta:field}` tags with the field's current value. Tags naming
/// absent or non-scalar fields stay as written.
pub fn expand_template<'a>(template: &'a str, meta: &Metadata) -> Cow<'a, str> {
    if !template.contains("{meta:") {
        return Cow::Borrowed(template);
    }
    META_TAG_RE.replace_all(template, |caps: &Captures| {
        let field = caps[1].trim();
        meta.get(field)
            .and_then(scalar_text)
            .unwrap_or_else(|| caps[0].to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expands_known_fields() {
        let meta = json!({"uploader": "Chan", "view_count": 42});
        let meta = meta.as_object().unwrap();
        assert_eq!(
            expand_template("{meta:uploader} ({meta:view_count})", meta),
            "Chan (42)"
        );
    }

    #[test]
    fn test_leaves_unknown_and_non_scalar_tags() {
        let meta = json!({"tags": ["a", "b"]});
        let meta = meta.as_object().unwrap();
        assert_eq!(
            expand_template("{meta:missing}-{meta:tags}", meta),
            "{meta:missing}-{meta:tags}"
        );
        assert!(matches!(expand_template("plain", meta), Cow::Borrowed("plain")));
    }
}
