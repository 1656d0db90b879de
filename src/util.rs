//! Shared utility functions.

/// Extract the first balanced JSON object from text that may contain other
/// content. Braces inside JSON string literals are ignored, so generated code
/// carried in a field does not end the object early.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_simple() {
        let text = r#"{"phase": "discovery"}"#;
        assert_eq!(extract_json_object(text), Some(text.to_string()));
    }

    #[test]
    fn test_extract_json_object_with_surrounding_prose() {
        let text = r#"Here is the result: {"phase": "narrowing"} Let me know if you need more."#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"phase": "narrowing"}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_nested() {
        let text = r#"{"checks": [{"check_name": "a", "passed": true}]}"#;
        assert_eq!(extract_json_object(text), Some(text.to_string()));
    }

    #[test]
    fn test_extract_json_object_braces_in_strings() {
        let text = r#"{"new_code": "client.query({ query: GET_USER }) }", "note": "quote \" and }"} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"new_code": "client.query({ query: GET_USER }) }", "note": "quote \" and }"}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_no_json() {
        assert_eq!(extract_json_object("No usages were found."), None);
    }

    #[test]
    fn test_extract_json_object_unclosed() {
        assert_eq!(extract_json_object(r#"{"phase": "generation""#), None);
    }
}
