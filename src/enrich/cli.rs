// src/enrich/cli.rs
//! Local command-line summarizer, invoked as `<bin> -p "<prompt>\n\n---\n\n<text>"`.
use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::enrich::{looks_like_quota, SummaryBackend};
use crate::error::BackendError;

pub struct CliBackend {
    program: String,
}

impl CliBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

pub fn compose_prompt(prompt: &str, document: &str) -> String {
    format!("{prompt}\n\n---\n\n{document}")
}

#[async_trait]
impl SummaryBackend for CliBackend {
    async fn summarize(&self, prompt: &str, document: &str) -> Result<String, BackendError> {
        let output = Command::new(&self.program)
            .arg("-p")
            .arg(compose_prompt(prompt, document))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => BackendError::Unavailable(
                    format!("cannot run '{}': {e}", self.program),
                ),
                _ => BackendError::Remote(format!("spawning '{}' failed: {e}", self.program)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let detail = format!("{} exited with {code}: {stderr}", self.program);
            return Err(if looks_like_quota(&stderr) {
                BackendError::Quota(detail)
            } else {
                BackendError::Remote(detail)
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_and_document_are_separated() {
        assert_eq!(compose_prompt("P", "D"), "P\n\n---\n\nD");
    }

    #[tokio::test]
    async fn missing_program_is_tool_unavailable() {
        let b = CliBackend::new("definitely-not-an-installed-summarizer");
        let err = b.summarize("p", "d").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_remote_error() {
        let b = CliBackend::new("false");
        let err = b.summarize("p", "d").await.unwrap_err();
        assert!(matches!(err, BackendError::Remote(_)), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_is_the_summary() {
        let b = CliBackend::new("echo");
        let out = b.summarize("Summarize", "AN ACT").await.unwrap();
        assert!(out.starts_with("-p Summarize"));
        assert!(out.ends_with("AN ACT"));
    }
}
