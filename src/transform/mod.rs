//! Edits applied to one record: metadata fields, then the file stem.

pub mod filename;
pub mod meta;
pub mod naming;
pub mod prompt;

pub use filename::{compute_tags, sanitize_file_name, transform_stem};
pub use meta::{EditContext, apply_date_tag_edits, apply_meta_edits};
pub use prompt::{LinePrompter, OverwriteState, Prompter};
