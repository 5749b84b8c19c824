// src/tailer/transcript.rs
// NDJSON transcript line parsing: extract cwd (first line), user/assistant
// message text, and tool_use file paths worth feeding to project inference.

use serde_json::Value;

#[derive(Debug, Default)]
pub struct ParsedLine {
    pub cwd: Option<String>,
    pub is_message: bool,
    pub role: Option<String>,
    pub text: Option<String>,
    pub touched_paths: Vec<String>,
}

const PATH_BEARING_TOOLS: &[&str] = &["Read", "Edit", "Write", "Grep", "Glob"];

/// Parse one NDJSON line. Malformed lines are skipped (return `None`) rather
/// than aborting the tail -- a single corrupt line must never stall a session.
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;

    let mut parsed = ParsedLine { cwd: value.get("cwd").and_then(|v| v.as_str()).map(String::from), ..Default::default() };

    let role = value.get("message").and_then(|m| m.get("role")).and_then(|r| r.as_str());
    parsed.role = role.map(String::from);

    if let Some(role) = role {
        if role == "user" || role == "assistant" {
            parsed.is_message = true;
            parsed.text = extract_message_text(&value);
        }
    }

    parsed.touched_paths = extract_tool_paths(&value);

    Some(parsed)
}

fn extract_message_text(value: &Value) -> Option<String> {
    let content = value.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let text: String = items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n");
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        _ => None,
    }
}

fn extract_tool_paths(value: &Value) -> Vec<String> {
    let content = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array());

    let Some(items) = content else { return Vec::new() };

    items
        .iter()
        .filter(|item| {
            item.get("type").and_then(|t| t.as_str()) == Some("tool_use")
                && item
                    .get("name")
                    .and_then(|n| n.as_str())
                    .is_some_and(|n| PATH_BEARING_TOOLS.contains(&n))
        })
        .filter_map(|item| {
            item.get("input")
                .and_then(|i| i.get("file_path").or_else(|| i.get("path")))
                .and_then(|p| p.as_str())
                .map(String::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_line_is_skipped() {
        assert!(parse_line("{not json").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn a_malformed_line_in_a_batch_does_not_drop_its_valid_neighbors() {
        // Mirrors how Tailer::poll_one folds a batch of raw lines: each is fed
        // through parse_line independently, so one corrupt record skips itself
        // without losing the valid messages around it.
        let raw_lines = vec![
            r#"{"message": {"role": "user", "content": "first"}}"#.to_string(),
            "{not json".to_string(),
            r#"{"message": {"role": "assistant", "content": "second"}}"#.to_string(),
        ];

        let messages: Vec<String> = raw_lines
            .iter()
            .filter_map(|line| parse_line(line))
            .filter(|p| p.is_message)
            .filter_map(|p| p.text)
            .collect();

        assert_eq!(messages, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn extracts_cwd_from_first_line() {
        let line = r#"{"cwd": "/home/user/project", "message": {"role": "user", "content": "hi"}}"#;
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.cwd.as_deref(), Some("/home/user/project"));
        assert!(parsed.is_message);
        assert_eq!(parsed.text.as_deref(), Some("hi"));
    }

    #[test]
    fn extracts_tool_use_file_paths() {
        let line = r#"{"message": {"role": "assistant", "content": [
            {"type": "tool_use", "name": "Read", "input": {"file_path": "/a/b.rs"}},
            {"type": "tool_use", "name": "Bash", "input": {"command": "ls"}}
        ]}}"#;
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.touched_paths, vec!["/a/b.rs".to_string()]);
    }
}
