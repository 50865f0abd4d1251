//! Query-language construction for the tracker's search endpoint.

use crate::activity::ActivityQuery;
use crate::flavor::SourceFlavor;

const SPECIAL_CHARS: &[char] = &[
    '"', '\'', '*', '?', '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '~', ':',
];

/// Escape `value` for use inside a quoted literal.
///
/// Backslashes are doubled before anything else so that the escapes added
/// afterwards are not themselves re-escaped.
pub fn escape(value: &str, flavor: SourceFlavor) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if c == '\\' {
            out.push_str("\\\\");
        } else if SPECIAL_CHARS.contains(&c) && (c != '-' || flavor.escapes_hyphen()) {
            out.push('\\');
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

fn quoted_list(values: &[String], flavor: SourceFlavor) -> String {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| format!("\"{}\"", escape(v, flavor)))
        .collect::<Vec<_>>()
        .join(",")
}

/// `assignee in (...) AND updated >= 'start' AND updated <= 'end'`, plus a
/// project filter when the query names projects.
pub fn activity_query(query: &ActivityQuery, flavor: SourceFlavor) -> String {
    let mut jql = format!(
        "assignee in ({}) AND updated >= '{}' AND updated <= '{}'",
        quoted_list(&query.members, flavor),
        query.range.start.format("%Y-%m-%d"),
        query.range.end.format("%Y-%m-%d"),
    );
    if !query.projects.is_empty() {
        jql.push_str(&format!(
            " AND project in ({})",
            quoted_list(&query.projects, flavor)
        ));
    }
    jql.push_str(" ORDER BY updated DESC");
    jql
}

/// `key in (...)` for a batch of issue keys.
pub fn keys_query(keys: &[String], flavor: SourceFlavor) -> String {
    format!("key in ({})", quoted_list(keys, flavor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::DateRange;

    #[test]
    fn test_escape_doubles_backslash_first() {
        assert_eq!(escape(r"a\b", SourceFlavor::Standard), r"a\\b");
        assert_eq!(escape(r#"a\"b"#, SourceFlavor::Standard), r#"a\\\"b"#);
    }

    #[test]
    fn test_escape_special_characters() {
        assert_eq!(escape("o'brien", SourceFlavor::Standard), r"o\'brien");
        assert_eq!(escape("a(b)[c]", SourceFlavor::Standard), r"a\(b\)\[c\]");
        assert_eq!(escape("x:y", SourceFlavor::Standard), r"x\:y");
        assert_eq!(escape("plain.user", SourceFlavor::Standard), "plain.user");
    }

    #[test]
    fn test_hyphen_depends_on_flavor() {
        assert_eq!(escape("jane-doe", SourceFlavor::Standard), r"jane\-doe");
        assert_eq!(escape("jane-doe", SourceFlavor::RedHat), "jane-doe");
    }

    #[test]
    fn test_activity_query() {
        let range = DateRange::parse("2024-01-01", "2024-01-08").unwrap();
        let query = ActivityQuery::new(vec!["alice".into(), "bob".into(), " ".into()], range);
        assert_eq!(
            activity_query(&query, SourceFlavor::Standard),
            "assignee in (\"alice\",\"bob\") AND updated >= '2024-01-01' \
             AND updated <= '2024-01-08' ORDER BY updated DESC"
        );

        let query = query.with_projects(vec!["PROJ".into()]);
        assert!(activity_query(&query, SourceFlavor::Standard)
            .contains(" AND project in (\"PROJ\") ORDER BY"));
    }

    #[test]
    fn test_keys_query() {
        let keys = vec!["EPIC-1".to_string(), "INIT-2".to_string()];
        assert_eq!(
            keys_query(&keys, SourceFlavor::RedHat),
            "key in (\"EPIC-1\",\"INIT-2\")"
        );
    }
}
