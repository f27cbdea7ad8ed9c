//! Transcript record parsing
//!
//! Records are one JSON object per line with a `type` discriminator. Tool
//! invocations appear either flat (`{"type":"tool_use","name":..,"input":..}`)
//! or nested inside assistant messages (`message.content[]`), and tool results
//! likewise either flat or inside user messages.

use serde_json::Value;

/// A tool invocation found in a record
#[derive(Debug, Clone, Copy)]
pub struct ToolUse<'a> {
    pub name: &'a str,
    pub input: &'a Value,
}

/// A tool result found in a record
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub is_error: bool,
    pub content: String,
}

/// One parsed transcript line
#[derive(Debug, Clone)]
pub struct TranscriptRecord {
    raw: Value,
}

impl TranscriptRecord {
    /// Parse a JSON line; anything but an object is rejected
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_str(line)?;
        if !raw.is_object() {
            return Err(serde::de::Error::custom("transcript record is not a JSON object"));
        }
        Ok(Self { raw })
    }

    /// The `type` discriminator
    pub fn record_type(&self) -> Option<&str> {
        self.raw.get("type").and_then(Value::as_str)
    }

    /// Working directory the agent reported for this record
    pub fn cwd(&self) -> Option<&str> {
        self.raw
            .get("cwd")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Record-level error flag (`is_error` or `isApiErrorMessage`)
    pub fn is_error_flagged(&self) -> bool {
        ["is_error", "isError", "isApiErrorMessage"]
            .iter()
            .any(|key| self.raw.get(*key).and_then(Value::as_bool).unwrap_or(false))
    }

    /// Error text carried by `error`/`message` fields of error records
    pub fn error_text(&self) -> Option<String> {
        for key in ["error", "message", "content"] {
            if let Some(text) = self.raw.get(key).and_then(text_of) {
                if !text.trim().is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    /// All tool invocations in this record
    pub fn tool_uses(&self) -> Vec<ToolUse<'_>> {
        let mut uses = Vec::new();
        if self.record_type() == Some("tool_use") {
            if let Some(tool) = tool_use_of(&self.raw) {
                uses.push(tool);
            }
        }
        for block in self.content_blocks() {
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                if let Some(tool) = tool_use_of(block) {
                    uses.push(tool);
                }
            }
        }
        uses
    }

    /// All tool results in this record
    pub fn tool_results(&self) -> Vec<ToolResult> {
        let mut results = Vec::new();
        if self.record_type() == Some("tool_result") {
            results.push(tool_result_of(&self.raw));
        }
        for block in self.content_blocks() {
            if block.get("type").and_then(Value::as_str) == Some("tool_result") {
                results.push(tool_result_of(block));
            }
        }
        results
    }

    /// Content blocks of a nested `message`, if it carries an array
    fn content_blocks(&self) -> impl Iterator<Item = &Value> {
        self.raw
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
    }
}

fn tool_use_of(value: &Value) -> Option<ToolUse<'_>> {
    let name = value.get("name").and_then(Value::as_str)?;
    let input = value.get("input").unwrap_or(&Value::Null);
    Some(ToolUse { name, input })
}

fn tool_result_of(value: &Value) -> ToolResult {
    ToolResult {
        is_error: value
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        content: value.get("content").and_then(text_of).unwrap_or_default(),
    }
}

/// Flatten a string or an array of `{"type":"text","text":..}` blocks
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// File-path-like keys a tool input may carry
pub const FILE_PATH_KEYS: [&str; 4] = ["file_path", "notebook_path", "filePath", "path"];

/// First file-path-like value in a tool input
pub fn file_path_of(input: &Value) -> Option<&str> {
    FILE_PATH_KEYS
        .iter()
        .find_map(|key| input.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_tool_use() {
        let record = TranscriptRecord::parse(
            r#"{"type":"tool_use","name":"Edit","input":{"file_path":"/a/b.ts"}}"#,
        )
        .unwrap();
        let uses = record.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].name, "Edit");
        assert_eq!(file_path_of(uses[0].input), Some("/a/b.ts"));
    }

    #[test]
    fn test_nested_assistant_tool_uses() {
        let record = TranscriptRecord::parse(
            r#"{"type":"assistant","cwd":"/proj","message":{"content":[
                {"type":"text","text":"editing"},
                {"type":"tool_use","id":"1","name":"Write","input":{"file_path":"/proj/x.rs"}},
                {"type":"tool_use","id":"2","name":"Bash","input":{"command":"ls"}}
            ]}}"#,
        )
        .unwrap();
        let names: Vec<&str> = record.tool_uses().iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["Write", "Bash"]);
        assert_eq!(record.cwd(), Some("/proj"));
    }

    #[test]
    fn test_tool_results_with_block_content() {
        let record = TranscriptRecord::parse(
            r#"{"type":"user","message":{"content":[
                {"type":"tool_result","tool_use_id":"1","is_error":true,
                 "content":[{"type":"text","text":"boom"}]}
            ]}}"#,
        )
        .unwrap();
        let results = record.tool_results();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert_eq!(results[0].content, "boom");
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(TranscriptRecord::parse("[1,2]").is_err());
        assert!(TranscriptRecord::parse("not json").is_err());
    }
}
