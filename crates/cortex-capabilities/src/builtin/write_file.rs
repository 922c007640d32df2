use std::path::{Component, Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use cortex_core::error::{CortexError, Result};
use cortex_core::state::{keys, SharedState};
use cortex_core::traits::Capability;
use cortex_core::types::{NodeOutput, Params};

const NAME: &str = "write_file";

/// Writes a file inside the active project root.
pub struct WriteFileCapability;

impl Capability for WriteFileCapability {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Write content to a file in the active project. Creates parent directories. Overwrites existing content."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filepath": {
                    "type": "string",
                    "description": "Path relative to the project root (also accepted as 'path' or 'filename')"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["filepath", "content"]
        })
    }

    fn invoke<'a>(
        &'a self,
        state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let Some(root) = state.get_str(keys::PROJECT_ROOT).map(PathBuf::from) else {
                return Ok(NodeOutput::reply(
                    "⚠️ No active project – create or open one first.",
                ));
            };

            let Some(relative) = ["filepath", "path", "filename"]
                .iter()
                .find_map(|k| params.get(*k).and_then(Value::as_str))
            else {
                return Ok(NodeOutput::reply("⚠️ No file path provided."));
            };

            let content = params
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| CortexError::validation(NAME, "missing string parameter 'content'"))?;

            let path = resolve_in_root(&root, relative)?;
            debug!(path = %path.display(), "Writing file");

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CortexError::execution(NAME, format!("Failed to create directories: {}", e))
                })?;
            }

            let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false);
            let body = format!("[{}]\n{}\n", stamp, content);
            tokio::fs::write(&path, &body)
                .await
                .map_err(|e| CortexError::execution(NAME, format!("{}: {}", path.display(), e)))?;

            Ok(NodeOutput::reply(format!(
                "📝 Wrote `{}` ({} lines).",
                relative,
                body.lines().count()
            ))
            .with("file_path", Value::String(path.display().to_string())))
        })
    }
}

/// Join `relative` onto `root`, refusing anything that would leave it.
fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    let escapes = candidate.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || relative.trim().is_empty() {
        return Err(CortexError::validation(
            NAME,
            format!("path '{}' is outside the project root", relative),
        ));
    }
    Ok(root.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_in(dir: &Path) -> SharedState {
        let mut state = SharedState::new();
        state.set(keys::PROJECT_ROOT, json!(dir.display().to_string()));
        state
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());

        let out = WriteFileCapability
            .invoke(&mut state, params(&[("filepath", "src/main.py"), ("content", "print(1)")]))
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("src/main.py")).unwrap();
        assert!(written.starts_with('['));
        assert!(written.ends_with("print(1)\n"));
        assert_eq!(out.reply_text(), Some("📝 Wrote `src/main.py` (2 lines)."));
        assert!(out.get("file_path").is_some());
    }

    #[tokio::test]
    async fn test_filename_alias_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        WriteFileCapability
            .invoke(&mut state, params(&[("filename", "notes.txt"), ("content", "a\nb")]))
            .await
            .unwrap();
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_no_project() {
        let mut state = SharedState::new();
        let out = WriteFileCapability
            .invoke(&mut state, params(&[("filepath", "a.txt"), ("content", "x")]))
            .await
            .unwrap();
        assert_eq!(
            out.reply_text(),
            Some("⚠️ No active project – create or open one first.")
        );
    }

    #[tokio::test]
    async fn test_no_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        let out = WriteFileCapability
            .invoke(&mut state, params(&[("content", "x")]))
            .await
            .unwrap();
        assert_eq!(out.reply_text(), Some("⚠️ No file path provided."));
    }

    #[tokio::test]
    async fn test_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        let err = WriteFileCapability
            .invoke(&mut state, params(&[("path", "../evil.txt"), ("content", "x")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CapabilityValidation");
    }

    #[tokio::test]
    async fn test_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        let err = WriteFileCapability
            .invoke(&mut state, params(&[("filepath", "a.txt")]))
            .await
            .unwrap_err();
        assert!(err.message().contains("content"));
    }
}
