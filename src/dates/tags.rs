use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static DATE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d{2}|\d{4})-(\d{2})(?:-(\d{2}|\d{4}))?\]").expect("valid date tag regex")
});

/// Where a date tag is placed or stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagLocation {
    Prefix,
    Suffix,
    All,
}

impl FromStr for TagLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" | "start" => Ok(TagLocation::Prefix),
            "suffix" | "end" => Ok(TagLocation::Suffix),
            "all" => Ok(TagLocation::All),
            other => Err(Error::config(format!(
                "unknown date tag location '{}' (expected prefix, suffix or all)",
                other
            ))),
        }
    }
}

impl fmt::Display for TagLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TagLocation::Prefix => "prefix",
            TagLocation::Suffix => "suffix",
            TagLocation::All => "all",
        })
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether the inside of a bracketed token is a real calendar date in one of
/// the layouts this tool writes.
fn is_valid_tag_body(body: &str) -> bool {
    use super::is_valid_date as valid;

    let pieces: Vec<&str> = body.split('-').collect();
    let lens: Vec<usize> = pieces.iter().map(|p| p.len()).collect();
    match (pieces.as_slice(), lens.as_slice()) {
        ([y, a, b], [4, 2, 2]) => valid(y, a, b) || valid(y, b, a),
        ([a, b, y], [2, 2, 4]) => valid(y, b, a) || valid(y, a, b),
        ([x, a, b], [2, 2, 2]) => {
            valid(x, a, b) || valid(x, b, a) || valid(b, a, x) || valid(b, x, a)
        }
        ([a, b], [2, 2]) => valid("", a, b) || valid("", b, a),
        _ => false,
    }
}

fn tag_body(tag: &str) -> &str {
    &tag[1..tag.len() - 1]
}

/// Remove date tags: the single leading or trailing tag for `Prefix` and
/// `Suffix`, every valid tag for `All`. Returns the removed tokens and the
/// whitespace-collapsed remainder.
pub fn strip_date_tags(s: &str, loc: TagLocation) -> (Vec<String>, String) {
    let mut removed = Vec::new();
    let mut residue = s.trim().to_string();

    match loc {
        TagLocation::Prefix => {
            let leading = DATE_TAG_RE
                .find(&residue)
                .filter(|m| m.start() == 0 && is_valid_tag_body(tag_body(m.as_str())))
                .map(|m| (m.as_str().to_string(), m.end()));
            if let Some((tag, end)) = leading {
                residue = residue[end..].to_string();
                removed.push(tag);
            }
        }
        TagLocation::Suffix => {
            let trailing = DATE_TAG_RE
                .find_iter(&residue)
                .last()
                .filter(|m| m.end() == residue.len() && is_valid_tag_body(tag_body(m.as_str())))
                .map(|m| (m.as_str().to_string(), m.start()));
            if let Some((tag, start)) = trailing {
                residue.truncate(start);
                removed.push(tag);
            }
        }
        TagLocation::All => {
            let mut kept = String::with_capacity(residue.len());
            let mut last = 0;
            for m in DATE_TAG_RE.find_iter(&residue) {
                if is_valid_tag_body(tag_body(m.as_str())) {
                    kept.push_str(&residue[last..m.start()]);
                    kept.push(' ');
                    removed.push(m.as_str().to_string());
                    last = m.end();
                }
            }
            kept.push_str(&residue[last..]);
            residue = kept;
        }
    }

    (removed, collapse_whitespace(&residue))
}

/// Place `tag` at the start or end of `value` with a single space. Returns
/// `None` when the tag is already present.
pub fn add_date_tag(value: &str, tag: &str, loc: TagLocation) -> Option<String> {
    if value.contains(tag) {
        return None;
    }
    let combined = match loc {
        TagLocation::Suffix => format!("{} {}", value, tag),
        TagLocation::Prefix | TagLocation::All => format!("{} {}", tag, value),
    };
    Some(collapse_whitespace(&combined))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_all_leaves_non_date_brackets() {
        let (removed, residue) = strip_date_tags("[2024-01-07] clip [2023]", TagLocation::All);
        assert_eq!(removed, vec!["[2024-01-07]"]);
        assert_eq!(residue, "clip [2023]");
    }

    #[test]
    fn test_strip_prefix_only_touches_leading_tag() {
        let (removed, residue) = strip_date_tags("[24-01-07] show [24-01-08]", TagLocation::Prefix);
        assert_eq!(removed, vec!["[24-01-07]"]);
        assert_eq!(residue, "show [24-01-08]");
    }

    #[test]
    fn test_strip_prefix_removes_one_stacked_tag() {
        let (removed, residue) = strip_date_tags("[2024-01-07] [24-01-08] Clip", TagLocation::Prefix);
        assert_eq!(removed, vec!["[2024-01-07]"]);
        assert_eq!(residue, "[24-01-08] Clip");

        let (removed, residue) = strip_date_tags("Clip [24-01-08] [2024-01-07]", TagLocation::Suffix);
        assert_eq!(removed, vec!["[2024-01-07]"]);
        assert_eq!(residue, "Clip [24-01-08]");
    }

    #[test]
    fn test_strip_suffix_only_touches_trailing_tag() {
        let (removed, residue) = strip_date_tags("[24-01-07] show  [2024-01-08]", TagLocation::Suffix);
        assert_eq!(removed, vec!["[2024-01-08]"]);
        assert_eq!(residue, "[24-01-07] show");
    }

    #[test]
    fn test_strip_ignores_invalid_calendar_dates() {
        let (removed, residue) = strip_date_tags("[2024-13-45] x", TagLocation::All);
        assert!(removed.is_empty());
        assert_eq!(residue, "[2024-13-45] x");
    }

    #[test]
    fn test_strip_accepts_year_last_and_month_day_tags() {
        let (removed, residue) = strip_date_tags("a [07-01-2024] b [01-07]", TagLocation::All);
        assert_eq!(removed, vec!["[07-01-2024]", "[01-07]"]);
        assert_eq!(residue, "a b");
    }

    #[test]
    fn test_add_then_strip_round_trips() {
        let original = "My  Title";
        let tagged = add_date_tag(original, "[2024-01-07]", TagLocation::Suffix).unwrap();
        assert_eq!(tagged, "My Title [2024-01-07]");
        assert_eq!(add_date_tag(&tagged, "[2024-01-07]", TagLocation::Suffix), None);
        let (_, residue) = strip_date_tags(&tagged, TagLocation::Suffix);
        assert_eq!(residue, collapse_whitespace(original));
    }

    #[test]
    fn test_location_parsing() {
        assert_eq!("Prefix".parse::<TagLocation>().unwrap(), TagLocation::Prefix);
        assert_eq!("all".parse::<TagLocation>().unwrap(), TagLocation::All);
        assert!("middle".parse::<TagLocation>().is_err());
    }
}
