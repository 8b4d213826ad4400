//! `---`-delimited `key: value` metadata blocks.

use std::collections::BTreeMap;

/// Split a leading metadata block from the body.
///
/// The block must start on the first line with `---` and end with a line
/// that is exactly `---`. Lines without a colon are ignored; surrounding
/// quotes on values are removed. Text without a complete block is returned
/// whole as the body.
pub fn split_front_matter(text: &str) -> (BTreeMap<String, String>, &str) {
    let mut metadata = BTreeMap::new();

    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (metadata, text);
    };

    let mut offset = 0;
    let mut closed = None;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            closed = Some(offset + line.len());
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                metadata.insert(key.to_string(), unquote(value.trim()).to_string());
            }
        }
        offset += line.len();
    }

    match closed {
        Some(end) => (metadata, rest[end..].trim_start_matches(['\r', '\n'])),
        None => (BTreeMap::new(), text),
    }
}

fn unquote(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted { &value[1..value.len() - 1] } else { value }
}

/// Render a metadata block. Keys appear in the given order.
pub fn render_front_matter<'a>(entries: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut out = String::from("---\n");
    for (key, value) in entries {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push_str("---\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_metadata_and_body() {
        let text = "---\ntitle: \"Intro\"\nauthor: sam\n---\n\n# Intro\nBody\n";
        let (meta, body) = split_front_matter(text);
        assert_eq!(meta["title"], "Intro");
        assert_eq!(meta["author"], "sam");
        assert_eq!(body, "# Intro\nBody\n");
    }

    #[test]
    fn no_block_returns_whole_text() {
        let text = "# Title\n---\nnot metadata\n";
        let (meta, body) = split_front_matter(text);
        assert!(meta.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn unterminated_block_is_body() {
        let text = "---\ntitle: x\nno end\n";
        let (meta, body) = split_front_matter(text);
        assert!(meta.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn render_keeps_order() {
        let block = render_front_matter([("b", "2".to_string()), ("a", "1".to_string())]);
        assert_eq!(block, "---\nb: 2\na: 1\n---\n");
    }
}
