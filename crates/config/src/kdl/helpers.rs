//! KDL parsing helper functions.

/// Convert a byte offset to line and column numbers (1-indexed)
pub fn offset_to_line_col(content: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in content.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Helper to get a string entry from a KDL node
pub fn get_string_entry(node: &kdl::KdlNode, name: &str) -> Option<String> {
    node.children()
        .and_then(|children| children.get(name))
        .and_then(|n| n.entries().first())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Helper to get an integer entry from a KDL node
pub fn get_int_entry(node: &kdl::KdlNode, name: &str) -> Option<i128> {
    node.children()
        .and_then(|children| children.get(name))
        .and_then(|n| n.entries().first())
        .and_then(|e| e.value().as_integer())
}

/// Helper to get every positional string argument of a child node
pub fn get_string_args(node: &kdl::KdlNode, name: &str) -> Option<Vec<String>> {
    let child = node.children().and_then(|children| children.get(name))?;
    let values: Vec<String> = child
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect();
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_line_col() {
        let content = "a\nbc\nd";
        assert_eq!(offset_to_line_col(content, 0), (1, 1));
        assert_eq!(offset_to_line_col(content, 3), (2, 2));
        assert_eq!(offset_to_line_col(content, 5), (3, 1));
    }

    #[test]
    fn test_get_string_args() {
        let doc: kdl::KdlDocument = r#"vault { master-key-env "A" "B" }"#.parse().unwrap();
        let node = doc.get("vault").unwrap();
        assert_eq!(
            get_string_args(node, "master-key-env"),
            Some(vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(get_string_args(node, "missing"), None);
    }
}
