//! Structured reply parsing with a fixed fallback.
//!
//! Model output is expected to hold one JSON object with `desc`, `think`
//! and `speak` string fields, usually inside a ```` ```json ```` fence.
//! Anything else resolves to [`ResponseValidator::fallback`]; parsing never
//! fails past this boundary.

use serde_json::Value;
use tracing::warn;

use crate::error::LlmError;
use crate::types::RoleplayReply;

/// Parses replies for one role/user pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseValidator {
    role: String,
    user: String,
}

impl ResponseValidator {
    /// Create a validator whose fallback names `role` and `user`.
    #[must_use]
    pub fn new(role: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            user: user.into(),
        }
    }

    /// Parse `raw`, or return the fallback reply.
    #[must_use]
    pub fn parse(&self, raw: &str) -> RoleplayReply {
        match Self::try_parse(raw) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "unparseable model reply, using fallback");
                self.fallback()
            }
        }
    }

    /// Parse `raw` strictly.
    ///
    /// # Errors
    /// [`LlmError::ParseError`] if no JSON object is found,
    /// [`LlmError::SchemaValidation`] if a field is missing or not a string.
    pub fn try_parse(raw: &str) -> Result<RoleplayReply, LlmError> {
        let candidate = extract_json(raw)
            .ok_or_else(|| LlmError::ParseError("no JSON object in reply".to_string()))?;
        let value: Value = serde_json::from_str(candidate)
            .map_err(|e| LlmError::ParseError(format!("JSON parse error: {e}")))?;

        let field = |name: &str| -> Result<String, LlmError> {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| LlmError::SchemaValidation(format!("missing string field '{name}'")))
        };

        Ok(RoleplayReply {
            desc: field("desc")?,
            think: field("think")?,
            speak: strip_stage_directions(&field("speak")?),
        })
    }

    /// The deterministic reply used when parsing fails.
    #[must_use]
    pub fn fallback(&self) -> RoleplayReply {
        RoleplayReply {
            desc: format!("{}正在困惑", self.role),
            think: format!("我该如何回应{}...", self.user),
            speak: "我需要一些时间来理解你说的话。".to_string(),
        }
    }
}

/// Locate the JSON object in `raw`: a fenced block, the whole text, or the
/// span from the first `{` to the last `}`.
fn extract_json(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let body = &raw[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    let open = raw.find('{')?;
    let close = raw.rfind('}')?;
    (open < close).then(|| &raw[open..=close])
}

/// Remove `(...)` and `（...）` segments, including nested ones.
fn strip_stage_directions(text: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | '（' => depth += 1,
            ')' | '）' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ResponseValidator {
        ResponseValidator::new("艾琳", "旅人")
    }

    #[test]
    fn parses_fenced_reply() {
        let raw = "```json\n{\"desc\": \"旅店里\", \"think\": \"他累了\", \"speak\": \"请坐吧。\"}\n```";
        let reply = validator().parse(raw);
        assert_eq!(reply.desc, "旅店里");
        assert_eq!(reply.think, "他累了");
        assert_eq!(reply.speak, "请坐吧。");
    }

    #[test]
    fn parses_bare_object_with_chatter() {
        let raw = "好的：{\"desc\": \"d\", \"think\": \"t\", \"speak\": \"s\"} 以上";
        assert_eq!(validator().parse(raw).speak, "s");
    }

    #[test]
    fn strips_parenthetical_directions() {
        let raw = r#"{"desc": "d", "think": "t", "speak": "（微笑）欢迎(点头)光临"}"#;
        assert_eq!(validator().parse(raw).speak, "欢迎光临");
    }

    #[test]
    fn missing_speak_yields_fallback() {
        let raw = r#"{"desc": "d", "think": "t"}"#;
        assert!(matches!(
            ResponseValidator::try_parse(raw),
            Err(LlmError::SchemaValidation(_))
        ));
        assert_eq!(validator().parse(raw), validator().fallback());
    }

    #[test]
    fn non_json_yields_fallback() {
        let reply = validator().parse("我拒绝回答。");
        assert_eq!(reply.desc, "艾琳正在困惑");
        assert_eq!(reply.think, "我该如何回应旅人...");
        assert_eq!(reply.speak, "我需要一些时间来理解你说的话。");
    }

    #[test]
    fn unbalanced_close_is_kept() {
        assert_eq!(strip_stage_directions("好)的"), "好)的");
    }
}
