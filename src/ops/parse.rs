use super::{DateTagOp, FieldCopy, FieldReplace, FieldValue, FilenameOp, MetaOp, OverrideCategory};
use crate::dates::{DateFormat, TagLocation};
use crate::error::{Error, Result};

/// Split on `:` unless the colon is preceded by a backslash, which is dropped,
/// or sits inside a `{meta:field}` template tag.
pub fn split_escaped(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&':') => {
                current.push(':');
                chars.next();
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ':' if depth == 0 => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    parts
}

/// Canonical operation name: lower case, `_` folded to `-`, aliases resolved.
fn canonical_op(name: &str) -> Option<&'static str> {
    let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
    let op = match normalized.as_str() {
        "set" => "set",
        "append" | "add-suffix" => "append",
        "prefix" | "add-prefix" => "prefix",
        "trim-suffix" | "remove-suffix" => "trim-suffix",
        "trim-prefix" | "remove-prefix" => "trim-prefix",
        "replace" => "replace",
        "replace-suffix" => "replace-suffix",
        "replace-prefix" => "replace-prefix",
        "copy-to" | "copy" => "copy-to",
        "paste-from" | "paste" => "paste-from",
        "date-tag" | "add-date-tag" => "date-tag",
        "delete-date-tag" | "remove-date-tag" => "delete-date-tag",
        _ => return None,
    };
    Some(op)
}

fn takes_two_args(op: &str) -> bool {
    matches!(
        op,
        "replace" | "replace-suffix" | "replace-prefix" | "date-tag" | "delete-date-tag"
    )
}

fn arity_error(spec: &str, op: &str) -> Error {
    let expected = if takes_two_args(op) { 2 } else { 1 };
    Error::config(format!(
        "operation '{}' in '{}' takes {} argument{}",
        op,
        spec,
        expected,
        if expected == 1 { "" } else { "s" }
    ))
}

fn date_tag_op(location: &str, format: &str, allow_all: bool) -> Result<DateTagOp> {
    let location: TagLocation = location.parse()?;
    if location == TagLocation::All && !allow_all {
        return Err(Error::config(
            "metadata date-tag location must be prefix or suffix ('all' only applies to delete-date-tag)",
        ));
    }
    let format: DateFormat = format.parse()?;
    Ok(DateTagOp { location, format })
}

/// Parse `field:op:value` or `field:op:arg1:arg2`.
pub fn parse_meta_op(spec: &str) -> Result<MetaOp> {
    let parts = split_escaped(spec);
    if parts.len() < 3 || parts.len() > 4 {
        return Err(Error::config(format!(
            "metadata operation '{}' must look like field:op:value or field:op:arg1:arg2",
            spec
        )));
    }

    let field = parts[0].trim().to_lowercase();
    if field.is_empty() {
        return Err(Error::config(format!("metadata operation '{}' has no field", spec)));
    }
    let op = canonical_op(&parts[1])
        .ok_or_else(|| Error::config(format!("unknown operation '{}' in '{}'", parts[1], spec)))?;
    if takes_two_args(op) != (parts.len() == 4) {
        return Err(arity_error(spec, op));
    }

    if let Some(category) = OverrideCategory::from_field(&field) {
        return match op {
            "set" => Ok(MetaOp::OverrideSet {
                category,
                value: parts[2].clone(),
            }),
            "append" => Ok(MetaOp::OverrideAppend {
                category,
                value: parts[2].clone(),
            }),
            "replace" => Ok(MetaOp::OverrideReplace {
                category,
                find: parts[2].clone(),
                replacement: parts[3].clone(),
            }),
            other => Err(Error::config(format!(
                "'{}' only supports set, append and replace (got '{}')",
                field, other
            ))),
        };
    }

    let value = || FieldValue {
        field: field.clone(),
        value: parts[2].clone(),
    };
    let replace = || FieldReplace {
        field: field.clone(),
        find: parts[2].clone(),
        replacement: parts[3].clone(),
    };

    let parsed = match op {
        "set" => MetaOp::Set(value()),
        "append" => MetaOp::Append(value()),
        "prefix" => MetaOp::Prefix(value()),
        "trim-suffix" => MetaOp::TrimSuffix(value()),
        "trim-prefix" => MetaOp::TrimPrefix(value()),
        "replace" => MetaOp::Replace(replace()),
        "replace-suffix" => MetaOp::ReplaceSuffix(replace()),
        "replace-prefix" => MetaOp::ReplacePrefix(replace()),
        "copy-to" => MetaOp::CopyTo(FieldCopy {
            source: field.clone(),
            destination: non_empty_field(&parts[2], spec)?,
        }),
        "paste-from" => MetaOp::PasteFrom(FieldCopy {
            source: non_empty_field(&parts[2], spec)?,
            destination: field.clone(),
        }),
        "date-tag" => MetaOp::DateTag {
            field: field.clone(),
            op: date_tag_op(&parts[2], &parts[3], false)?,
        },
        "delete-date-tag" => MetaOp::DeleteDateTag {
            field: field.clone(),
            op: date_tag_op(&parts[2], &parts[3], true)?,
        },
        _ => unreachable!("canonical_op only yields known names"),
    };
    Ok(parsed)
}

fn non_empty_field(name: &str, spec: &str) -> Result<String> {
    let trimmed = name.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(Error::config(format!("'{}' names an empty field", spec)));
    }
    Ok(trimmed)
}

/// Parse `op:value` or `op:arg1:arg2` for filename rewrites.
pub fn parse_filename_op(spec: &str) -> Result<FilenameOp> {
    let parts = split_escaped(spec);
    if parts.len() < 2 || parts.len() > 3 {
        return Err(Error::config(format!(
            "filename operation '{}' must look like op:value or op:arg1:arg2",
            spec
        )));
    }

    let op = canonical_op(&parts[0])
        .ok_or_else(|| Error::config(format!("unknown operation '{}' in '{}'", parts[0], spec)))?;
    if takes_two_args(op) != (parts.len() == 3) {
        return Err(arity_error(spec, op));
    }

    let parsed = match op {
        "set" => FilenameOp::Set(parts[1].clone()),
        "append" => FilenameOp::Append(parts[1].clone()),
        "prefix" => FilenameOp::Prefix(parts[1].clone()),
        "trim-suffix" => FilenameOp::TrimSuffix(parts[1].clone()),
        "trim-prefix" => FilenameOp::TrimPrefix(parts[1].clone()),
        "replace" => FilenameOp::Replace {
            find: parts[1].clone(),
            replacement: parts[2].clone(),
        },
        "replace-prefix" => FilenameOp::ReplacePrefix {
            find: parts[1].clone(),
            replacement: parts[2].clone(),
        },
        "replace-suffix" => FilenameOp::ReplaceSuffix {
            find: parts[1].clone(),
            replacement: parts[2].clone(),
        },
        // `all` places a filename tag in front, like `prefix`
        "date-tag" => FilenameOp::DateTag(date_tag_op(&parts[1], &parts[2], true)?),
        "delete-date-tag" => FilenameOp::DeleteDateTag(date_tag_op(&parts[1], &parts[2], true)?),
        other => {
            return Err(Error::config(format!(
                "operation '{}' is not available for filenames",
                other
            )));
        }
    };
    Ok(parsed)
}
