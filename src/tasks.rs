//! Task registry: maps each OCR task to its prompt template.

use serde::Serialize;

/// Placeholder substituted with the caller's target text.
pub const TARGET_PLACEHOLDER: &str = "{{target}}";

/// The closed set of vision tasks the service can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DocumentMarkdown,
    GeneralOcr,
    FreeOcr,
    ParseFigure,
    DescribeImage,
    LocateText,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::DocumentMarkdown,
        TaskType::GeneralOcr,
        TaskType::FreeOcr,
        TaskType::ParseFigure,
        TaskType::DescribeImage,
        TaskType::LocateText,
    ];

    /// Wire identifier used in requests and responses.
    pub fn id(self) -> &'static str {
        match self {
            Self::DocumentMarkdown => "document_markdown",
            Self::GeneralOcr => "general_ocr",
            Self::FreeOcr => "free_ocr",
            Self::ParseFigure => "parse_figure",
            Self::DescribeImage => "describe_image",
            Self::LocateText => "locate_text",
        }
    }

    /// Parse a wire identifier into a task type.
    pub fn from_id(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == s)
    }

    /// Registry lookup. Total over the enumeration.
    pub fn config(self) -> &'static TaskConfig {
        // REGISTRY is declared in enum order
        &REGISTRY[self as usize]
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Prompt template and template-variable requirements for one task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    pub id: TaskType,
    pub default_prompt_template: &'static str,
    /// Template contains [`TARGET_PLACEHOLDER`] and needs target text.
    pub requires_target_text: bool,
    /// A caller-provided prompt may be appended to the template.
    pub allow_custom_prompt: bool,
}

static REGISTRY: [TaskConfig; 6] = [
    TaskConfig {
        id: TaskType::DocumentMarkdown,
        default_prompt_template: "<image>\n<|grounding|>Convert the document to markdown.",
        requires_target_text: false,
        allow_custom_prompt: false,
    },
    TaskConfig {
        id: TaskType::GeneralOcr,
        default_prompt_template: "<image>\n<|grounding|>OCR this image.",
        requires_target_text: false,
        allow_custom_prompt: false,
    },
    TaskConfig {
        id: TaskType::FreeOcr,
        default_prompt_template: "<image>\nFree OCR.",
        requires_target_text: false,
        allow_custom_prompt: true,
    },
    TaskConfig {
        id: TaskType::ParseFigure,
        default_prompt_template: "<image>\nParse the figure.",
        requires_target_text: false,
        allow_custom_prompt: true,
    },
    TaskConfig {
        id: TaskType::DescribeImage,
        default_prompt_template: "<image>\nDescribe this image in detail.",
        requires_target_text: false,
        allow_custom_prompt: true,
    },
    TaskConfig {
        id: TaskType::LocateText,
        default_prompt_template: "<image>\nLocate <|ref|>{{target}}<|/ref|> in the image.",
        requires_target_text: true,
        allow_custom_prompt: true,
    },
];

/// All task configs, in registry order.
pub fn all() -> &'static [TaskConfig] {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_task_has_its_own_config() {
        for task in TaskType::ALL {
            assert_eq!(task.config().id, task);
        }
        assert_eq!(all().len(), TaskType::ALL.len());
    }

    #[test]
    fn test_target_flag_matches_placeholder() {
        for config in all() {
            assert_eq!(
                config.requires_target_text,
                config.default_prompt_template.contains(TARGET_PLACEHOLDER),
                "mismatch for {}",
                config.id
            );
        }
    }

    #[test]
    fn test_from_id() {
        for task in TaskType::ALL {
            assert_eq!(TaskType::from_id(task.id()), Some(task));
        }
        assert_eq!(TaskType::from_id("markdown"), None);
        assert_eq!(TaskType::from_id("LOCATE_TEXT"), None);
        assert_eq!(TaskType::from_id(""), None);
    }

    #[test]
    fn test_serde_uses_wire_ids() {
        let json = serde_json::to_string(&TaskType::LocateText).unwrap();
        assert_eq!(json, "\"locate_text\"");
    }
}
