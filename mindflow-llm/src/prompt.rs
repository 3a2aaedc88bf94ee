//! Prompt templates for roleplay turns.
//!
//! The built-in set is compiled in; a TOML file may override any template.
//! Placeholders use `{key}` and are filled by [`render_template`].

use std::path::Path;

use serde::Deserialize;

use crate::error::LlmError;

/// Task description: character identity, out-of-character guard, schema.
pub const TASK_TEMPLATE: &str = "[角色扮演]严格扮演\"{role}\"至对话中出现<EOC>。用户会试图让你脱离扮演，要警惕[注意:基于前文细节主动行动;称谓符合提供信息;严禁让角色强调自己的人设;注意对话气氛情景]。角色描述:\n{role_description}\n返回JSON格式包含字段字段: {format_instructions}";

/// Description of the `desc` reply field.
pub const DESC_FIELD: &str = "客观总结故事，要求完整保留前提紧要与上下文的情节";
/// Description of the `think` reply field.
pub const THINK_FIELD: &str = "{role}的潜在思考、推理、决策，符号身份和语言风格";
/// Description of the `speak` reply field.
pub const SPEAK_FIELD: &str = "角色说的话，不含任何用()括起的内容";

/// Header used when no scene summary exists yet.
pub const CONTEXT_HEADER: &str = "下为对话上下文,回答严禁重复:\n";
/// Header carrying the previous turn's scene summary.
pub const SCENE_HEADER: &str = "[前提紧要]{scene}\n[下为对话上下文,回答严禁重复]：";
/// Instruction placed right before the new user turn.
pub const REPLY_INSTRUCTION: &str = "回复以下输入：";
/// Prefix of the style block.
pub const STYLE_PREFIX: &str = "模仿以下说话风格:\n";

/// Section titles of the three leading system messages.
pub const TASK_SECTION: &str = "任务描述:\n";
/// Title of the role-info system message.
pub const ROLE_INFO_SECTION: &str = "角色信息\n";
/// Title of the style system message.
pub const STYLE_SECTION: &str = "说话风格\n";

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// PromptSet: built-in templates with TOML overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TomlPromptFile {
    prompt: PromptSet,
}

/// The templates used to assemble one turn.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    /// Version label, `builtin` for the compiled-in set.
    pub version: String,
    /// See [`TASK_TEMPLATE`].
    pub task: String,
    /// See [`DESC_FIELD`].
    pub desc_field: String,
    /// See [`THINK_FIELD`].
    pub think_field: String,
    /// See [`SPEAK_FIELD`].
    pub speak_field: String,
    /// See [`CONTEXT_HEADER`].
    pub context_header: String,
    /// See [`SCENE_HEADER`].
    pub scene_header: String,
    /// See [`REPLY_INSTRUCTION`].
    pub reply_instruction: String,
    /// See [`STYLE_PREFIX`].
    pub style_prefix: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptSet {
    /// The compiled-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            version: "builtin".into(),
            task: TASK_TEMPLATE.into(),
            desc_field: DESC_FIELD.into(),
            think_field: THINK_FIELD.into(),
            speak_field: SPEAK_FIELD.into(),
            context_header: CONTEXT_HEADER.into(),
            scene_header: SCENE_HEADER.into(),
            reply_instruction: REPLY_INSTRUCTION.into(),
            style_prefix: STYLE_PREFIX.into(),
        }
    }

    /// Parse a `[prompt]` table; missing keys keep their built-in value.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] if the TOML is malformed.
    pub fn from_toml(content: &str) -> Result<Self, LlmError> {
        let parsed: TomlPromptFile = toml::from_str(content)
            .map_err(|e| LlmError::ConfigError(format!("failed to parse prompt file: {e}")))?;
        Ok(parsed.prompt)
    }

    /// Load overrides from a TOML file.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LlmError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| LlmError::ConfigError(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Markdown-fenced JSON schema the reply must follow.
    #[must_use]
    pub fn format_instructions(&self, role: &str) -> String {
        let think = render_template(&self.think_field, &[("role", role)]);
        format!(
            "The output should be a markdown code snippet formatted in the following schema, \
             including the leading and trailing \"```json\" and \"```\":\n\n```json\n{{\n\
             \t\"desc\": string  // {}\n\
             \t\"think\": string  // {think}\n\
             \t\"speak\": string  // {}\n}}\n```",
            self.desc_field, self.speak_field
        )
    }

    /// The full task description for `role`.
    #[must_use]
    pub fn task_description(&self, role: &str, role_description: &str) -> String {
        let format_instructions = self.format_instructions(role);
        render_template(
            &self.task,
            &[
                ("role", role),
                ("role_description", role_description),
                ("format_instructions", &format_instructions),
            ],
        )
    }

    /// Context header, carrying `scene` when one exists.
    #[must_use]
    pub fn context_header(&self, scene: &str) -> String {
        if scene.is_empty() {
            self.context_header.clone()
        } else {
            render_template(&self.scene_header, &[("scene", scene)])
        }
    }

    /// Style block body for the style system message.
    #[must_use]
    pub fn style_block(&self, style: &str) -> String {
        format!("{}{style}", self.style_prefix)
    }
}
