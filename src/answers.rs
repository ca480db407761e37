//! JSON-lines answer files fed to the queue by the `run` command.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::queue::{AnswerMetadata, QuestionId};

/// One answer as recorded by the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub answer: Value,
    #[serde(default)]
    pub metadata: AnswerMetadata,
}

/// Reads one answer per line. Blank lines and `#` comments are skipped.
pub fn load_answers(path: &Path) -> Result<Vec<AnswerRecord>, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::Answers {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_answers(&content).map_err(|message| AppError::Answers {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_answers(content: &str) -> Result<Vec<AnswerRecord>, String> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| format!("line {}: {}", i + 1, e))
        })
        .collect()
}
