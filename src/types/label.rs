//! Label rules and the natural label order.

use regex_lite::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

fn spreadsheet_cell_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$?[A-Z]{1,3}\$?[0-9]+$").expect("valid spreadsheet cell pattern"))
}

/// Whether `label` names a spreadsheet cell (`A1`, `$B$12`).
pub fn is_spreadsheet_cell(label: &str) -> bool {
    spreadsheet_cell_regex().is_match(label)
}

/// Whether referencing `label` without defining it creates an element
/// implicitly instead of failing.
pub fn will_auto_create_element(label: &str) -> bool {
    label == "i" || label == "e" || is_spreadsheet_cell(label)
}

/// Whether `label` is a syntactically valid element label.
pub fn is_valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '$' => {}
        _ => return false,
    }
    if label.starts_with('$') && !is_spreadsheet_cell(label) {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '{' | '}' | '\'' | '$'))
}

/// Labels that cannot name an element.
pub fn is_reserved_label(label: &str) -> bool {
    matches!(label, "true" | "false" | "pi" | "e" | "i")
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(label: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = None;
    for (i, c) in label.char_indices() {
        if matches!(c, '{' | '}') {
            if let Some(d) = in_digits.take() {
                out.push(chunk(&label[start..i], d));
            }
            start = i + c.len_utf8();
            continue;
        }
        let is_digit = c.is_ascii_digit();
        match in_digits {
            Some(d) if d == is_digit => {}
            Some(d) => {
                out.push(chunk(&label[start..i], d));
                start = i;
                in_digits = Some(is_digit);
            }
            None => {
                start = i;
                in_digits = Some(is_digit);
            }
        }
    }
    if let Some(d) = in_digits {
        out.push(chunk(&label[start..], d));
    }
    out
}

fn chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits { Chunk::Digits(s) } else { Chunk::Text(s) }
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Natural label order: digit runs compare numerically, so `A_2 < A_10`.
///
/// Braces are ignored for ordering (`A_{12}` sorts like `A_12`); the full
/// string breaks ties so the order is total.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    let ca = chunks(a);
    let cb = chunks(b);
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Digits(p), Chunk::Digits(q)) => compare_digits(p, q),
            (Chunk::Text(p), Chunk::Text(q)) => p.cmp(q),
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}

/// A label ordered by [`compare_labels`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelKey(pub String);

impl LabelKey {
    /// Wrap a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for LabelKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_labels(&self.0, &other.0)
    }
}

impl PartialOrd for LabelKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(labels: &[&str]) -> Vec<String> {
        let mut keys: Vec<LabelKey> = labels.iter().map(|l| LabelKey::new(*l)).collect();
        keys.sort();
        keys.into_iter().map(|k| k.0).collect()
    }

    #[test]
    fn test_natural_order() {
        assert_eq!(sorted(&["A_10", "A_2", "B", "A"]), vec!["A", "A_2", "A_10", "B"]);
        assert_eq!(sorted(&["a10", "a2", "a1"]), vec!["a1", "a2", "a10"]);
    }

    #[test]
    fn test_braces_ignored_for_order() {
        assert_eq!(compare_labels("A_{12}", "A_12"), "A_{12}".cmp("A_12"));
        assert_eq!(compare_labels("A_{3}", "A_12"), Ordering::Less);
    }

    #[test]
    fn test_auto_create() {
        assert!(will_auto_create_element("i"));
        assert!(will_auto_create_element("e"));
        assert!(will_auto_create_element("A1"));
        assert!(will_auto_create_element("$B$12"));
        assert!(!will_auto_create_element("a1"));
        assert!(!will_auto_create_element("ABCD1"));
    }

    #[test]
    fn test_valid_labels() {
        assert!(is_valid_label("A_{12}"));
        assert!(is_valid_label("A'"));
        assert!(is_valid_label("$A$1"));
        assert!(!is_valid_label("1a"));
        assert!(!is_valid_label(""));
        assert!(!is_valid_label("a b"));
        assert!(!is_valid_label("$foo"));
    }
}
