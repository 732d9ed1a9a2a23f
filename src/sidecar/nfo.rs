//! Kodi/Jellyfin style `.nfo` documents rooted at `<movie>`.
//!
//! The document is handled as text. Leaf elements (`<tag>text</tag>`) become
//! fields; the first `<actor><name>` becomes `actor`. Writes patch the text
//! one field at a time so unrelated markup survives untouched.

use super::{LockedFile, Sidecar};
use crate::dates::collapse_whitespace;
use crate::error::{Error, Result};
use crate::record::{MetaKind, Metadata};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

static LEAF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z_][\w.\-]*)(?:\s[^<>]*)?>([^<]*)</([A-Za-z_][\w.\-]*)\s*>")
        .expect("valid leaf regex")
});
static ACTOR_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<actor(?:\s[^<>]*)?>.*?<name(?:\s[^<>]*)?>([^<]*)</name\s*>")
        .expect("valid actor regex")
});
static MOVIE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<movie(?:\s[^<>]*)?>").expect("valid movie regex"));
static CAST_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<cast(?:\s[^<>]*)?>").expect("valid cast regex"));
static ELEMENT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w.\-]*$").expect("valid name regex"));

pub struct NfoSidecar {
    file: LockedFile,
    doc: String,
}

impl NfoSidecar {
    pub fn new(file: LockedFile) -> Self {
        Self {
            file,
            doc: String::new(),
        }
    }

    fn load_doc(&mut self) -> Result<()> {
        let text = std::str::from_utf8(self.file.bytes())
            .map_err(|e| Error::format(self.file.path(), format!("not UTF-8: {}", e)))?;
        self.doc = repair(text).map_err(|message| Error::format(self.file.path(), message))?;
        Ok(())
    }
}

/// Add a missing declaration or `<movie>` root. Errors when the root is
/// still unusable.
pub fn repair(text: &str) -> std::result::Result<String, String> {
    let mut doc = text.to_string();
    if !doc.trim_start().starts_with("<?xml") {
        doc = format!("{}\n{}", XML_DECLARATION, doc.trim_start());
    }
    if !MOVIE_OPEN_RE.is_match(&doc) {
        if !doc.ends_with('\n') {
            doc.push('\n');
        }
        doc.push_str("<movie></movie>\n");
    }
    movie_body(&doc).ok_or_else(|| "<movie> root is not closed".to_string())?;
    Ok(doc)
}

/// Byte range between `<movie>` and `</movie>`.
fn movie_body(doc: &str) -> Option<(usize, usize)> {
    let open = MOVIE_OPEN_RE.find(doc)?;
    let close = doc[open.end()..].rfind("</movie>")? + open.end();
    Some((open.end(), close))
}

pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';').filter(|i| *i <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Fields of the `<movie>` body.
pub fn extract_fields(doc: &str) -> Metadata {
    let mut meta = Metadata::new();
    let Some((start, end)) = movie_body(doc) else {
        return meta;
    };
    let body = &doc[start..end];

    for caps in LEAF_RE.captures_iter(body) {
        let (tag, close) = (&caps[1], &caps[3]);
        if tag != close || tag == "name" || meta.contains_key(tag) {
            continue;
        }
        meta.insert(tag.to_string(), Value::String(unescape(caps[2].trim())));
    }
    if !meta.contains_key("actor") {
        if let Some(caps) = ACTOR_NAME_RE.captures(body) {
            meta.insert("actor".to_string(), Value::String(unescape(caps[1].trim())));
        }
    }
    meta
}

fn actor_names(body: &str) -> impl Iterator<Item = String> + '_ {
    ACTOR_NAME_RE
        .captures_iter(body)
        .map(|caps| collapse_whitespace(&unescape(&caps[1])))
}

/// Add `name` as the first actor inside `<cast>` unless already listed.
fn insert_actor(doc: &mut String, name: &str) -> bool {
    let Some((start, end)) = movie_body(doc) else {
        return false;
    };
    let wanted = collapse_whitespace(name);
    if actor_names(&doc[start..end]).any(|existing| existing == wanted) {
        return false;
    }

    let actor = format!("<actor><name>{}</name></actor>", escape(&wanted));
    let cast_end = CAST_OPEN_RE.find(&doc[start..end]).map(|m| start + m.end());
    match cast_end {
        Some(at) => doc.insert_str(at, &actor),
        None => doc.insert_str(start, &format!("<cast>{}</cast>", actor)),
    }
    true
}

/// Replace the first `<field>` leaf's text, or insert one right after
/// `<movie>`.
fn set_leaf(doc: &mut String, field: &str, value: &str) -> bool {
    let Some((start, end)) = movie_body(doc) else {
        return false;
    };
    let name = regex::escape(field);
    let (Ok(paired), Ok(empty)) = (
        Regex::new(&format!(r"<{0}(?:\s[^<>]*)?>([^<]*)</{0}\s*>", name)),
        Regex::new(&format!(r"<{0}(?:\s[^<>]*?)?\s*/>", name)),
    ) else {
        return false;
    };
    let escaped = escape(value);
    let leaf = format!("<{0}>{1}</{0}>", field, escaped);

    let inner = paired
        .captures(&doc[start..end])
        .and_then(|caps| caps.get(1))
        .map(|m| start + m.start()..start + m.end());
    if let Some(range) = inner {
        if doc[range.clone()] == escaped {
            return false;
        }
        doc.replace_range(range, &escaped);
        return true;
    }

    // `<field/>` counts as an empty leaf
    let self_closing = empty
        .find(&doc[start..end])
        .map(|m| start + m.start()..start + m.end());
    match self_closing {
        Some(_) if escaped.is_empty() => return false,
        Some(range) => doc.replace_range(range, &leaf),
        None => doc.insert_str(start, &leaf),
    }
    true
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Sidecar for NfoSidecar {
    fn path(&self) -> &Path {
        self.file.path()
    }

    fn kind(&self) -> MetaKind {
        MetaKind::Nfo
    }

    fn decode(&mut self) -> Result<Metadata> {
        self.load_doc()?;
        Ok(extract_fields(&self.doc))
    }

    fn refresh(&mut self) -> Result<Metadata> {
        self.file.reload()?;
        self.decode()
    }

    /// Each changed field is applied to the result of the previous edit.
    fn write(&mut self, meta: &Metadata) -> Result<()> {
        self.load_doc()?;
        let current = extract_fields(&self.doc);
        let mut doc = std::mem::take(&mut self.doc);
        let mut touched = false;

        for (field, value) in meta {
            if current.get(field) == Some(value) {
                continue;
            }
            if !ELEMENT_NAME_RE.is_match(field) || field == "name" {
                self.doc = doc;
                return Err(Error::format(
                    self.file.path(),
                    format!("'{}' cannot be stored as an NFO element", field),
                ));
            }
            let text = value_text(value);
            touched |= if field == "actor" {
                insert_actor(&mut doc, &text)
            } else {
                set_leaf(&mut doc, field, &text)
            };
        }

        if touched || doc.as_bytes() != self.file.bytes() {
            self.file.replace(doc.as_bytes())?;
        }
        self.doc = doc;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.file.restore_original()
    }
}
