//! Converters that need no external tooling.

use std::path::Path;

use async_trait::async_trait;
use docweave_shared::{DocweaveError, Result};

use crate::Converter;

/// Plain text and markdown: validates UTF-8 and normalizes line endings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConverter;

#[async_trait]
impl Converter for TextConverter {
    fn name(&self) -> &str {
        "text"
    }

    fn version(&self) -> &str {
        "1"
    }

    async fn convert(&self, source: &Path, _output_dir: &Path) -> Result<String> {
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| DocweaveError::io(source, e))?;
        let text = String::from_utf8(bytes).map_err(|e| {
            DocweaveError::validation(format!(
                "{} is not valid UTF-8 (byte {})",
                source.display(),
                e.utf8_error().valid_up_to()
            ))
        })?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        Ok(text.replace("\r\n", "\n"))
    }
}

/// JSON documents: validated, pretty-printed, wrapped in a fenced block.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

#[async_trait]
impl Converter for JsonConverter {
    fn name(&self) -> &str {
        "json"
    }

    fn version(&self) -> &str {
        "1"
    }

    async fn convert(&self, source: &Path, _output_dir: &Path) -> Result<String> {
        let content = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| DocweaveError::io(source, e))?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            DocweaveError::validation(format!("{} is not valid JSON: {e}", source.display()))
        })?;
        let pretty = serde_json::to_string_pretty(&value)
            .map_err(|e| DocweaveError::conversion(e.to_string()))?;
        Ok(format!("```json\n{pretty}\n```\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("docweave-builtin-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn text_normalizes_line_endings_and_bom() {
        let tmp = temp_dir();
        let path = tmp.join("a.md");
        std::fs::write(&path, "\u{feff}# A\r\nbody\r\n").unwrap();

        let text = TextConverter.convert(&path, &tmp).await.unwrap();
        assert_eq!(text, "# A\nbody\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn invalid_utf8_is_validation_error() {
        let tmp = temp_dir();
        let path = tmp.join("bad.txt");
        std::fs::write(&path, [0x66, 0x6f, 0xff, 0xfe]).unwrap();

        let err = TextConverter.convert(&path, &tmp).await.unwrap_err();
        assert!(matches!(err, DocweaveError::Validation { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn json_is_fenced_and_pretty() {
        let tmp = temp_dir();
        let path = tmp.join("data.json");
        std::fs::write(&path, r#"{"a":1}"#).unwrap();

        let text = JsonConverter.convert(&path, &tmp).await.unwrap();
        assert!(text.starts_with("```json\n{\n  \"a\": 1\n}"));
        assert!(text.ends_with("```\n"));

        std::fs::write(&path, "{oops").unwrap();
        assert!(JsonConverter.convert(&path, &tmp).await.is_err());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
