use crate::config::NamingStyle;
use regex::Regex;
use std::sync::LazyLock;

/// Word pairs split by restricted-filename downloads (`don't` -> `don_t`).
/// Matched case-insensitively on whole words; the separator becomes `'`.
const CONTRACTIONS: &[(&str, &str)] = &[
    ("ain", "t"),
    ("aren", "t"),
    ("can", "t"),
    ("couldn", "t"),
    ("didn", "t"),
    ("doesn", "t"),
    ("don", "t"),
    ("hadn", "t"),
    ("hasn", "t"),
    ("haven", "t"),
    ("isn", "t"),
    ("mustn", "t"),
    ("needn", "t"),
    ("shouldn", "t"),
    ("wasn", "t"),
    ("weren", "t"),
    ("won", "t"),
    ("wouldn", "t"),
    ("i", "m"),
    ("i", "ve"),
    ("i", "ll"),
    ("you", "re"),
    ("you", "ve"),
    ("you", "ll"),
    ("we", "re"),
    ("we", "ve"),
    ("we", "ll"),
    ("they", "re"),
    ("they", "ve"),
    ("they", "ll"),
    ("he", "ll"),
    ("she", "ll"),
    ("o", "clock"),
];

static LONE_S_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\p{L}\p{N}])[ _]s([ _'"`.,;!?\-()\[\]{}]|$)"#).expect("valid lone-s regex")
});

pub fn apply_style(stem: &str, style: NamingStyle) -> String {
    match style {
        NamingStyle::Spaces => stem.replace('_', " "),
        NamingStyle::Underscores => stem.replace(' ', "_"),
        NamingStyle::FixesOnly | NamingStyle::Skip => stem.to_string(),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// One left-to-right pass over `stem` turning `don_t` / `don t` into `don't`.
/// Letters keep their case.
pub fn restore_contractions(stem: &str) -> String {
    let chars: Vec<char> = stem.chars().collect();
    let mut out: Vec<char> = chars.clone();

    for i in 0..chars.len() {
        if chars[i] != ' ' && chars[i] != '_' {
            continue;
        }
        let mut start = i;
        while start > 0 && is_word_char(chars[start - 1]) {
            start -= 1;
        }
        let mut end = i + 1;
        while end < chars.len() && is_word_char(chars[end]) {
            end += 1;
        }
        if start == i || end == i + 1 {
            continue;
        }
        let head: String = chars[start..i].iter().collect::<String>().to_lowercase();
        let tail: String = chars[i + 1..end].iter().collect::<String>().to_lowercase();
        if CONTRACTIONS.iter().any(|(h, t)| *h == head && *t == tail) {
            out[i] = '\'';
        }
    }
    out.into_iter().collect()
}

/// Join a stray `s` back onto the preceding word until nothing changes.
pub fn repair_lone_s(stem: &str) -> String {
    let mut current = stem.to_string();
    loop {
        let next = LONE_S_RE.replace_all(&current, "${1}s${2}").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Style translation followed by the repair passes. `skip` returns the stem
/// untouched.
pub fn normalize(stem: &str, style: NamingStyle) -> String {
    if style == NamingStyle::Skip {
        return stem.to_string();
    }
    let styled = apply_style(stem, style);
    repair_lone_s(&restore_contractions(&styled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_styles() {
        assert_eq!(apply_style("a_b c", NamingStyle::Spaces), "a b c");
        assert_eq!(apply_style("a_b c", NamingStyle::Underscores), "a_b_c");
        assert_eq!(apply_style("a_b c", NamingStyle::FixesOnly), "a_b c");
    }

    #[test]
    fn test_contractions_keep_case() {
        assert_eq!(restore_contractions("DON_T Stop"), "DON'T Stop");
        assert_eq!(restore_contractions("We Can t Go"), "We Can't Go");
        assert_eq!(restore_contractions("I_m_here"), "I'm_here");
        assert_eq!(restore_contractions("london tower"), "london tower");
    }

    #[test]
    fn test_lone_s_reaches_fixed_point() {
        assert_eq!(repair_lone_s("Bob s book"), "Bobs book");
        assert_eq!(repair_lone_s("cat_s_s"), "catss");
        assert_eq!(repair_lone_s("mix s (live)"), "mixs (live)");
        assert_eq!(repair_lone_s("it s"), "its");
        assert_eq!(repair_lone_s("a song"), "a song");
    }

    #[test]
    fn test_skip_does_nothing() {
        assert_eq!(normalize("don_t s", NamingStyle::Skip), "don_t s");
        assert_eq!(normalize("don_t_stop", NamingStyle::Spaces), "don't stop");
    }
}
