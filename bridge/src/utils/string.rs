//! String utility functions

/// Split `value` on `sep`, ignoring separators inside `{...}` groups or
/// escaped with a backslash.
///
/// Entries are trimmed; blank entries are dropped, so `"a,,b,"` yields `["a", "b"]`.
pub fn split_top_level(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&value[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split a `KEY=VALUE` entry at the first `=`.
///
/// Returns `None` when there is no `=` or the key is blank. The value may be empty.
pub fn split_key_value(entry: &str) -> Option<(&str, &str)> {
    let (key, value) = entry.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_top_level_simple() {
        assert_eq!(split_top_level("up,http_*", ','), vec!["up", "http_*"]);
    }

    #[test]
    fn test_split_top_level_drops_blanks() {
        assert_eq!(split_top_level(" a ,, b ,", ','), vec!["a", "b"]);
        assert!(split_top_level("", ',').is_empty());
    }

    #[test]
    fn test_split_top_level_keeps_brace_groups() {
        assert_eq!(
            split_top_level("go_{gc,memstats}_*,up", ','),
            vec!["go_{gc,memstats}_*", "up"]
        );
    }

    #[test]
    fn test_split_top_level_escaped_separator() {
        assert_eq!(split_top_level(r"a\,b,c", ','), vec![r"a\,b", "c"]);
    }

    #[test]
    fn test_split_top_level_semicolons() {
        assert_eq!(
            split_top_level("flink_*=job,host;zk_up=pod;", ';'),
            vec!["flink_*=job,host", "zk_up=pod"]
        );
    }

    #[test]
    fn test_split_key_value() {
        assert_eq!(split_key_value("env=prod"), Some(("env", "prod")));
        assert_eq!(split_key_value("url=a=b"), Some(("url", "a=b")));
        assert_eq!(split_key_value("host="), Some(("host", "")));
        assert_eq!(split_key_value("=prod"), None);
        assert_eq!(split_key_value("prod"), None);
    }
}
