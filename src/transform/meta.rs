//! Metadata edits in their fixed order.
//!
//! 1. `set`, credits `set`
//! 2. `copy-to`, `paste-from`
//! 3. `replace`, credits `replace`, `replace-prefix`, `replace-suffix`,
//!    `trim-prefix`, `trim-suffix`
//! 4. `prefix`, `append`, credits `append`
//! 5. `delete-date-tag`
//! 6. `date-tag`
//!
//! Stages 1-4 run in [`apply_meta_edits`], stages 5-6 in
//! [`apply_date_tag_edits`] so the date is resolved from the edited record.

use super::prompt::{OverwriteState, Prompter};
use crate::dates::{add_date_tag, collapse_whitespace, date_tag, resolve_record_date, strip_date_tags};
use crate::error::{Error, Result};
use crate::ops::{CategoryOverride, FieldReplace, FieldValue, MetaOps, OverrideCategory, expand_template};
use crate::record::Metadata;
use crate::ui::prelude::*;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Everything stages 1-4 need besides the metadata itself.
pub struct EditContext<'a> {
    pub ops: &'a MetaOps,
    /// Per-record overwrite flag; wins over the global bits.
    pub record_overwrite: bool,
    pub overwrite: &'a OverwriteState,
    pub prompter: &'a dyn Prompter,
    pub cancel: &'a CancellationToken,
    pub label: &'a str,
}

fn string_value<'m>(meta: &'m Metadata, field: &str) -> Option<&'m str> {
    meta.get(field).and_then(Value::as_str)
}

/// Store `value` unless it is already there.
fn store(meta: &mut Metadata, field: &str, value: String) -> bool {
    if string_value(meta, field) == Some(value.as_str()) {
        return false;
    }
    meta.insert(field.to_string(), Value::String(value));
    true
}

/// Rewrite a string field through `edit`; absent and non-string fields are
/// left alone.
fn edit_string(meta: &mut Metadata, field: &str, edit: impl FnOnce(&str) -> Option<String>) -> bool {
    let Some(current) = string_value(meta, field) else {
        return false;
    };
    match edit(current) {
        Some(next) => store(meta, field, next),
        None => false,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn set_field(meta: &mut Metadata, field: &str, template: &str, ctx: &EditContext<'_>) -> Result<bool> {
    let value = expand_template(template, meta).into_owned();
    let current = match meta.get(field) {
        None => return Ok(store(meta, field, value)),
        Some(Value::String(s)) if *s == value => return Ok(false),
        Some(existing) => display_value(existing),
    };

    let overwrite = ctx.record_overwrite
        || ctx.overwrite.should_overwrite(
            ctx.label,
            field,
            &current,
            &value,
            ctx.prompter,
            ctx.cancel,
        )?;
    if !overwrite {
        let declined = Error::OverwriteCanceled {
            field: field.to_string(),
        };
        emit(
            Level::Info,
            "meta.set.preserved",
            &format!("{}: {}", ctx.label, declined),
            Some(serde_json::json!({ "field": field, "kind": declined.kind() })),
        );
        return Ok(false);
    }
    Ok(store(meta, field, value))
}

/// Credit fields present in the record, in canonical order.
fn present_credit_fields(meta: &Metadata, category: OverrideCategory) -> Vec<&'static str> {
    category
        .fields()
        .iter()
        .copied()
        .filter(|f| meta.contains_key(*f))
        .collect()
}

fn credit_override<'o>(ops: &'o MetaOps) -> Option<&'o CategoryOverride> {
    ops.override_for(OverrideCategory::Credits)
}

fn replace_all(meta: &mut Metadata, field: &str, find: &str, replacement: &str) -> bool {
    if find.is_empty() {
        return false;
    }
    let find = expand_template(find, meta).into_owned();
    let replacement = expand_template(replacement, meta).into_owned();
    edit_string(meta, field, |cur| {
        cur.contains(find.as_str())
            .then(|| collapse_whitespace(&cur.replace(find.as_str(), &replacement)))
    })
}

fn apply_replace(meta: &mut Metadata, op: &FieldReplace) -> bool {
    replace_all(meta, &op.field, &op.find, &op.replacement)
}

fn apply_replace_prefix(meta: &mut Metadata, op: &FieldReplace) -> bool {
    let find = expand_template(&op.find, meta).into_owned();
    let replacement = expand_template(&op.replacement, meta).into_owned();
    edit_string(meta, &op.field, |cur| {
        cur.strip_prefix(find.as_str())
            .map(|rest| collapse_whitespace(&format!("{}{}", replacement, rest)))
    })
}

fn apply_replace_suffix(meta: &mut Metadata, op: &FieldReplace) -> bool {
    let find = expand_template(&op.find, meta).into_owned();
    let replacement = expand_template(&op.replacement, meta).into_owned();
    edit_string(meta, &op.field, |cur| {
        cur.strip_suffix(find.as_str())
            .map(|rest| collapse_whitespace(&format!("{}{}", rest, replacement)))
    })
}

fn apply_trim_prefix(meta: &mut Metadata, op: &FieldValue) -> bool {
    let trim = expand_template(&op.value, meta).into_owned();
    edit_string(meta, &op.field, |cur| {
        cur.strip_prefix(trim.as_str()).map(collapse_whitespace)
    })
}

fn apply_trim_suffix(meta: &mut Metadata, op: &FieldValue) -> bool {
    let trim = expand_template(&op.value, meta).into_owned();
    edit_string(meta, &op.field, |cur| {
        cur.strip_suffix(trim.as_str()).map(collapse_whitespace)
    })
}

fn prepend(meta: &mut Metadata, field: &str, template: &str) -> bool {
    let prefix = expand_template(template, meta).into_owned();
    edit_string(meta, field, |cur| Some(collapse_whitespace(&format!("{}{}", prefix, cur))))
}

fn append(meta: &mut Metadata, field: &str, template: &str) -> bool {
    let suffix = expand_template(template, meta).into_owned();
    edit_string(meta, field, |cur| Some(collapse_whitespace(&format!("{}{}", cur, suffix))))
}

/// Stages 1-4. Returns whether any field changed.
pub fn apply_meta_edits(meta: &mut Metadata, ctx: &EditContext<'_>) -> Result<bool> {
    let ops = ctx.ops;
    let credits = credit_override(ops);
    let mut changed = false;

    for op in &ops.set_fields {
        changed |= set_field(meta, &op.field, &op.value, ctx)?;
    }
    if let Some(value) = credits.and_then(|c| c.set.as_deref()) {
        for field in present_credit_fields(meta, OverrideCategory::Credits) {
            changed |= set_field(meta, field, value, ctx)?;
        }
    }

    for copy in ops.copy_to.iter().chain(&ops.paste_from) {
        let Some(value) = meta.get(&copy.source).cloned() else {
            emit(
                Level::Debug,
                "meta.copy.missing",
                &format!("{}: no field '{}' to copy", ctx.label, copy.source),
                None,
            );
            continue;
        };
        if meta.get(&copy.destination) != Some(&value) {
            meta.insert(copy.destination.clone(), value);
            changed = true;
        }
    }

    if ctx.cancel.is_cancelled() {
        return Err(Error::OperationCanceled);
    }

    for op in &ops.replaces {
        changed |= apply_replace(meta, op);
    }
    if let Some(credits) = credits {
        for (find, replacement) in &credits.replaces {
            for field in present_credit_fields(meta, OverrideCategory::Credits) {
                changed |= replace_all(meta, field, find, replacement);
            }
        }
    }
    for op in &ops.replace_prefixes {
        changed |= apply_replace_prefix(meta, op);
    }
    for op in &ops.replace_suffixes {
        changed |= apply_replace_suffix(meta, op);
    }
    for op in &ops.trim_prefixes {
        changed |= apply_trim_prefix(meta, op);
    }
    for op in &ops.trim_suffixes {
        changed |= apply_trim_suffix(meta, op);
    }

    for op in &ops.prefixes {
        changed |= prepend(meta, &op.field, &op.value);
    }
    for op in &ops.appends {
        changed |= append(meta, &op.field, &op.value);
    }
    if let Some(value) = credits.and_then(|c| c.append.as_deref()) {
        for field in present_credit_fields(meta, OverrideCategory::Credits) {
            changed |= append(meta, field, value);
        }
    }

    Ok(changed)
}

/// Stages 5-6: strip, then place date tags built from the record's date.
pub fn apply_date_tag_edits(meta: &mut Metadata, ops: &MetaOps, label: &str) -> bool {
    let mut changed = false;

    for (field, op) in &ops.delete_date_tag_ops {
        changed |= edit_string(meta, field, |cur| {
            let (removed, residue) = strip_date_tags(cur, op.location);
            (!removed.is_empty()).then_some(residue)
        });
    }

    if ops.date_tag_ops.is_empty() {
        return changed;
    }
    let Some(date) = resolve_record_date(meta) else {
        emit(
            Level::Debug,
            "meta.date_tag.no_date",
            &format!("{}: no usable date in metadata, skipping date tags", label),
            None,
        );
        return changed;
    };
    for (field, op) in &ops.date_tag_ops {
        let Some(tag) = date_tag(&date, op.format) else {
            continue;
        };
        changed |= edit_string(meta, field, |cur| add_date_tag(cur, &tag, op.location));
    }
    changed
}
