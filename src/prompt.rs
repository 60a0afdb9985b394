//! Prompt construction from a task template and caller overrides.

use crate::error::OcrError;
use crate::tasks::{TaskConfig, TARGET_PLACEHOLDER};

/// Build the final prompt for a task.
///
/// Custom prompts are dropped for tasks that don't allow them.
pub fn build_prompt(
    config: &TaskConfig,
    custom_prompt: Option<&str>,
    target_text: Option<&str>,
) -> Result<String, OcrError> {
    let mut prompt = config.default_prompt_template.to_string();

    if config.requires_target_text {
        let target = target_text.ok_or_else(|| OcrError::MissingTargetText(config.id.to_string()))?;
        prompt = prompt.replacen(TARGET_PLACEHOLDER, target, 1);
    }

    if config.allow_custom_prompt {
        if let Some(custom) = custom_prompt {
            prompt.push('\n');
            prompt.push_str(custom);
        }
    }

    Ok(prompt)
}
