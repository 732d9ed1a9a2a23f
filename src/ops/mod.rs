//! Operation model for metadata and filename rewrites.
//!
//! Users describe edits as colon-separated strings (see [`parse`]); once
//! parsed, they live in [`MetaOps`] and [`FilenameOps`], which keep each kind
//! of operation in its own ordered list. The transformers walk those lists in
//! a fixed order.

mod parse;
mod template;

pub use parse::{parse_filename_op, parse_meta_op, split_escaped};
pub use template::expand_template;

use crate::config::Settings;
use crate::dates::{DateFormat, TagLocation};
use crate::error::{Error, Result};

/// Fields covered by the `all-credits` override.
pub const CREDIT_FIELDS: &[&str] = &[
    "actor",
    "artist",
    "author",
    "composer",
    "creator",
    "director",
    "performer",
    "producer",
    "publisher",
    "studio",
    "writer",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReplace {
    pub field: String,
    pub find: String,
    pub replacement: String,
}

/// Copy `source` into `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCopy {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTagOp {
    pub location: TagLocation,
    pub format: DateFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverrideCategory {
    Credits,
}

impl OverrideCategory {
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            OverrideCategory::Credits => CREDIT_FIELDS,
        }
    }

    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "all-credits" | "credits-all" => Some(OverrideCategory::Credits),
            _ => None,
        }
    }
}

/// `set` / `append` / `replace` applied to every field of a category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryOverride {
    pub set: Option<String>,
    pub append: Option<String>,
    pub replaces: Vec<(String, String)>,
}

/// One parsed metadata operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaOp {
    Set(FieldValue),
    Append(FieldValue),
    Prefix(FieldValue),
    TrimSuffix(FieldValue),
    TrimPrefix(FieldValue),
    Replace(FieldReplace),
    ReplaceSuffix(FieldReplace),
    ReplacePrefix(FieldReplace),
    CopyTo(FieldCopy),
    PasteFrom(FieldCopy),
    DateTag { field: String, op: DateTagOp },
    DeleteDateTag { field: String, op: DateTagOp },
    OverrideSet { category: OverrideCategory, value: String },
    OverrideAppend { category: OverrideCategory, value: String },
    OverrideReplace { category: OverrideCategory, find: String, replacement: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaOps {
    pub set_fields: Vec<FieldValue>,
    pub appends: Vec<FieldValue>,
    pub prefixes: Vec<FieldValue>,
    pub trim_suffixes: Vec<FieldValue>,
    pub trim_prefixes: Vec<FieldValue>,
    pub replaces: Vec<FieldReplace>,
    pub replace_suffixes: Vec<FieldReplace>,
    pub replace_prefixes: Vec<FieldReplace>,
    pub copy_to: Vec<FieldCopy>,
    pub paste_from: Vec<FieldCopy>,
    pub date_tag_ops: Vec<(String, DateTagOp)>,
    pub delete_date_tag_ops: Vec<(String, DateTagOp)>,
    pub set_overrides: Vec<(OverrideCategory, CategoryOverride)>,
}

impl MetaOps {
    pub fn push(&mut self, op: MetaOp) {
        match op {
            MetaOp::Set(v) => self.set_fields.push(v),
            MetaOp::Append(v) => self.appends.push(v),
            MetaOp::Prefix(v) => self.prefixes.push(v),
            MetaOp::TrimSuffix(v) => self.trim_suffixes.push(v),
            MetaOp::TrimPrefix(v) => self.trim_prefixes.push(v),
            MetaOp::Replace(r) => self.replaces.push(r),
            MetaOp::ReplaceSuffix(r) => self.replace_suffixes.push(r),
            MetaOp::ReplacePrefix(r) => self.replace_prefixes.push(r),
            MetaOp::CopyTo(c) => self.copy_to.push(c),
            MetaOp::PasteFrom(c) => self.paste_from.push(c),
            // Keyed by field: a later op for the same field replaces the earlier one
            MetaOp::DateTag { field, op } => upsert(&mut self.date_tag_ops, field, op),
            MetaOp::DeleteDateTag { field, op } => upsert(&mut self.delete_date_tag_ops, field, op),
            MetaOp::OverrideSet { category, value } => self.category(category).set = Some(value),
            MetaOp::OverrideAppend { category, value } => self.category(category).append = Some(value),
            MetaOp::OverrideReplace {
                category,
                find,
                replacement,
            } => self.category(category).replaces.push((find, replacement)),
        }
    }

    fn category(&mut self, category: OverrideCategory) -> &mut CategoryOverride {
        let idx = match self.set_overrides.iter().position(|(c, _)| *c == category) {
            Some(idx) => idx,
            None => {
                self.set_overrides.push((category, CategoryOverride::default()));
                self.set_overrides.len() - 1
            }
        };
        &mut self.set_overrides[idx].1
    }

    pub fn override_for(&self, category: OverrideCategory) -> Option<&CategoryOverride> {
        self.set_overrides
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, o)| o)
    }

    pub fn is_empty(&self) -> bool {
        *self == MetaOps::default()
    }

    pub fn has_date_tag_ops(&self) -> bool {
        !self.date_tag_ops.is_empty() || !self.delete_date_tag_ops.is_empty()
    }

    pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let mut ops = MetaOps::default();
        for spec in specs {
            ops.push(parse_meta_op(spec.as_ref())?);
        }
        Ok(ops)
    }
}

fn upsert(list: &mut Vec<(String, DateTagOp)>, field: String, op: DateTagOp) {
    match list.iter_mut().find(|(f, _)| *f == field) {
        Some(entry) => entry.1 = op,
        None => list.push((field, op)),
    }
}

/// One parsed filename operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameOp {
    Set(String),
    Append(String),
    Prefix(String),
    TrimSuffix(String),
    TrimPrefix(String),
    Replace { find: String, replacement: String },
    ReplacePrefix { find: String, replacement: String },
    ReplaceSuffix { find: String, replacement: String },
    DateTag(DateTagOp),
    DeleteDateTag(DateTagOp),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameOps {
    pub set: Option<String>,
    pub appends: Vec<String>,
    pub prefixes: Vec<String>,
    pub trim_suffixes: Vec<String>,
    pub trim_prefixes: Vec<String>,
    pub replaces: Vec<(String, String)>,
    pub replace_prefixes: Vec<(String, String)>,
    pub replace_suffixes: Vec<(String, String)>,
    pub date_tag: Option<DateTagOp>,
    pub delete_date_tag: Option<DateTagOp>,
}

impl FilenameOps {
    pub fn push(&mut self, op: FilenameOp) -> Result<()> {
        match op {
            FilenameOp::Set(value) => {
                if self.set.is_some() {
                    return Err(Error::config("only one filename 'set' operation is allowed"));
                }
                self.set = Some(value);
            }
            FilenameOp::Append(v) => self.appends.push(v),
            FilenameOp::Prefix(v) => self.prefixes.push(v),
            FilenameOp::TrimSuffix(v) => self.trim_suffixes.push(v),
            FilenameOp::TrimPrefix(v) => self.trim_prefixes.push(v),
            FilenameOp::Replace { find, replacement } => self.replaces.push((find, replacement)),
            FilenameOp::ReplacePrefix { find, replacement } => {
                self.replace_prefixes.push((find, replacement))
            }
            FilenameOp::ReplaceSuffix { find, replacement } => {
                self.replace_suffixes.push((find, replacement))
            }
            FilenameOp::DateTag(op) => self.date_tag = Some(op),
            FilenameOp::DeleteDateTag(op) => self.delete_date_tag = Some(op),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == FilenameOps::default()
    }

    pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let mut ops = FilenameOps::default();
        for spec in specs {
            ops.push(parse_filename_op(spec.as_ref())?)?;
        }
        Ok(ops)
    }
}

/// Immutable operation snapshot shared by every record of a run.
#[derive(Debug, Clone, Default)]
pub struct Ops {
    pub meta: MetaOps,
    pub filename: FilenameOps,
    /// Overwrite existing values without consulting the shared policy.
    pub overwrite: bool,
}

impl Ops {
    /// Parse both operation lists from `settings`. `overwrite_all` also
    /// becomes the per-record flag, so a later `N` answer cannot preserve
    /// fields the user asked to overwrite.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            meta: MetaOps::parse_all(&settings.meta_ops[..])?,
            filename: FilenameOps::parse_all(&settings.filename_ops[..])?,
            overwrite: settings.overwrite_all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_ops_group_by_kind() {
        let ops = MetaOps::parse_all(&[
            "title:set:New",
            "title:append: (HD)",
            "artist:copy-to:composer",
            "title:date-tag:suffix:Ymd",
            "title:date-tag:prefix:ymd",
        ])
        .unwrap();
        assert_eq!(ops.set_fields.len(), 1);
        assert_eq!(ops.appends[0].value, " (HD)");
        assert_eq!(ops.copy_to[0].destination, "composer");
        // Second date tag op for the same field replaces the first
        assert_eq!(ops.date_tag_ops.len(), 1);
        assert_eq!(ops.date_tag_ops[0].1.format, DateFormat::ShortYmd);
    }

    #[test]
    fn test_credit_overrides_collect_under_category() {
        let ops = MetaOps::parse_all(&[
            "all-credits:set:Studio X",
            "credits-all:replace:X:Y",
            "all-credits:append:!",
        ])
        .unwrap();
        let credits = ops.override_for(OverrideCategory::Credits).unwrap();
        assert_eq!(credits.set.as_deref(), Some("Studio X"));
        assert_eq!(credits.append.as_deref(), Some("!"));
        assert_eq!(credits.replaces, vec![("X".to_string(), "Y".to_string())]);
        assert!(ops.set_fields.is_empty());
    }

    #[test]
    fn test_filename_set_is_singleton() {
        let err = FilenameOps::parse_all(&["set:a", "set:b"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_settings_carries_overwrite_flag() {
        let settings = Settings {
            meta_ops: vec!["title:set:New".into()],
            filename_ops: vec!["append:!".into()],
            overwrite_all: true,
            ..Settings::default()
        };
        let ops = Ops::from_settings(&settings).unwrap();
        assert!(ops.overwrite);
        assert_eq!(ops.meta.set_fields.len(), 1);
        assert!(!ops.filename.is_empty());

        let ops = Ops::from_settings(&Settings::default()).unwrap();
        assert!(!ops.overwrite);
    }

    #[test]
    fn test_empty_models() {
        assert!(MetaOps::default().is_empty());
        assert!(FilenameOps::default().is_empty());
        let ops = FilenameOps::parse_all(&["date-tag:prefix:ymd"]).unwrap();
        assert!(!ops.is_empty());
    }
}
