//! Service configuration.
//!
//! Values are kept as the raw environment strings. Defaults and parsing are
//! applied by the accessor methods at call time, so a bad value degrades to
//! the documented default instead of failing startup.

use std::env;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";
pub const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-OCR";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_SUPPORTED_FORMATS: [&str; 6] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
    "application/pdf",
];

/// Named environment strings consumed by the OCR pipeline.
#[derive(Debug, Clone, Default)]
pub struct OcrConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_file_size: Option<String>,
    pub supported_formats: Option<String>,
}

impl OcrConfig {
    /// Read configuration from the process environment. Blank values count as unset.
    pub fn from_env() -> Self {
        Self {
            api_key: read_var("OCR_API_KEY"),
            base_url: read_var("OCR_API_BASE_URL"),
            model: read_var("OCR_MODEL"),
            max_file_size: read_var("OCR_MAX_FILE_SIZE"),
            supported_formats: read_var("OCR_SUPPORTED_FORMATS"),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn base_url(&self) -> &str {
        non_blank(self.base_url.as_deref()).unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn model(&self) -> &str {
        non_blank(self.model.as_deref()).unwrap_or(DEFAULT_MODEL)
    }

    /// Maximum upload size in bytes. Unparsable or non-positive values fall back to the default.
    pub fn max_file_size(&self) -> u64 {
        let Some(raw) = non_blank(self.max_file_size.as_deref()) else {
            return DEFAULT_MAX_FILE_SIZE;
        };

        match raw.parse::<i64>() {
            Ok(n) if n > 0 => n as u64,
            _ => {
                warn!(
                    "Ignoring invalid OCR_MAX_FILE_SIZE={:?}, using {} bytes",
                    raw, DEFAULT_MAX_FILE_SIZE
                );
                DEFAULT_MAX_FILE_SIZE
            }
        }
    }

    /// Format allow-list: MIME types and/or file extensions.
    ///
    /// Accepts a JSON array of strings or a comma/whitespace separated list.
    pub fn supported_formats(&self) -> Vec<String> {
        let parsed = non_blank(self.supported_formats.as_deref())
            .map(parse_format_list)
            .unwrap_or_default();

        if parsed.is_empty() {
            DEFAULT_SUPPORTED_FORMATS
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            parsed
        }
    }

    /// Request body ceiling: room for a base64-inflated upload plus form overhead.
    pub fn body_limit(&self) -> usize {
        let max = usize::try_from(self.max_file_size()).unwrap_or(usize::MAX);
        max.saturating_mul(2).saturating_add(1024 * 1024)
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_format_list(raw: &str) -> Vec<String> {
    if raw.starts_with('[') {
        return match serde_json::from_str::<Vec<String>>(raw) {
            Ok(list) => list
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(e) => {
                warn!("Ignoring unparsable OCR_SUPPORTED_FORMATS: {}", e);
                Vec::new()
            }
        };
    }

    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
