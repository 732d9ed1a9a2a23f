//! New file stems from filename operations and metadata.

use super::naming;
use crate::config::NamingStyle;
use crate::dates::{
    DateFormat, add_date_tag, collapse_whitespace, date_tag, format_components,
    resolve_record_date, strip_date_tags,
};
use crate::ops::{FilenameOps, expand_template};
use crate::record::{Computed, Metadata};
use serde_json::Value;

const INVALID_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Drop characters that are not allowed in file names, including control
/// characters, and tidy the whitespace left behind.
pub fn sanitize_file_name(value: &str) -> String {
    let kept: String = value
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect();
    collapse_whitespace(&kept)
}

/// `[value1_value2]` from the string values of `fields`, or empty.
pub fn meta_prefix_tag(meta: &Metadata, fields: &[String]) -> String {
    let values: Vec<&str> = fields
        .iter()
        .filter_map(|f| meta.get(f.as_str()).and_then(Value::as_str))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return String::new();
    }
    let body = sanitize_file_name(&values.join("_"));
    if body.is_empty() {
        return String::new();
    }
    format!("[{}]", body)
}

/// Tags derived from the edited metadata.
pub fn compute_tags(meta: &Metadata, ops: &FilenameOps, prefix_fields: &[String]) -> Computed {
    let date = resolve_record_date(meta);
    let formatted_date = date
        .as_ref()
        .map(|d| format_components(d, DateFormat::Ymd))
        .unwrap_or_default();
    let tag = match (&date, &ops.date_tag) {
        (Some(parts), Some(op)) => date_tag(parts, op.format)
            .map(|t| sanitize_file_name(&t))
            .unwrap_or_default(),
        _ => String::new(),
    };
    Computed {
        date_tag: tag,
        filename_meta_prefix: meta_prefix_tag(meta, prefix_fields),
        formatted_date,
    }
}

fn expand(value: &str, meta: &Metadata) -> String {
    expand_template(value, meta).into_owned()
}

/// Apply the filename steps in order:
/// set, replacements and trims, prefix/append, delete date tags, place the
/// date tag, naming style, repairs, then the metadata prefix tag in front.
pub fn transform_stem(
    stem: &str,
    meta: &Metadata,
    ops: &FilenameOps,
    style: NamingStyle,
    computed: &Computed,
) -> String {
    let mut name = match &ops.set {
        Some(template) => expand(template, meta),
        None => stem.to_string(),
    };

    for (find, replacement) in &ops.replaces {
        let find = expand(find, meta);
        if !find.is_empty() {
            name = name.replace(&find, &expand(replacement, meta));
        }
    }
    for (find, replacement) in &ops.replace_prefixes {
        let find = expand(find, meta);
        if let Some(rest) = name.strip_prefix(find.as_str()) {
            name = format!("{}{}", expand(replacement, meta), rest);
        }
    }
    for (find, replacement) in &ops.replace_suffixes {
        let find = expand(find, meta);
        if let Some(rest) = name.strip_suffix(find.as_str()) {
            name = format!("{}{}", rest, expand(replacement, meta));
        }
    }
    for trim in &ops.trim_prefixes {
        let trim = expand(trim, meta);
        if let Some(rest) = name.strip_prefix(trim.as_str()) {
            name = rest.to_string();
        }
    }
    for trim in &ops.trim_suffixes {
        let trim = expand(trim, meta);
        if let Some(rest) = name.strip_suffix(trim.as_str()) {
            name = rest.to_string();
        }
    }

    for prefix in &ops.prefixes {
        name = format!("{}{}", expand(prefix, meta), name);
    }
    for suffix in &ops.appends {
        name = format!("{}{}", name, expand(suffix, meta));
    }

    if let Some(op) = &ops.delete_date_tag {
        name = strip_date_tags(&name, op.location).1;
    }
    if let Some(op) = &ops.date_tag {
        if !computed.date_tag.is_empty() {
            if let Some(tagged) = add_date_tag(&name, &computed.date_tag, op.location) {
                name = tagged;
            }
        }
    }

    name = naming::normalize(&name, style);

    let prefix = &computed.filename_meta_prefix;
    if !prefix.is_empty() && !name.contains(prefix.as_str()) {
        name = format!("{} {}", prefix, name);
    }
    if ops.date_tag.is_some() && !computed.date_tag.is_empty() && !name.contains(computed.date_tag.as_str()) {
        name = format!("{} {}", computed.date_tag, name);
    }

    let name = sanitize_file_name(&name);
    if name.is_empty() {
        stem.to_string()
    } else {
        name
    }
}
