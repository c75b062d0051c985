use anyhow::{Context, Result};
use interview_core::question::{QuestionBank, RoleQuestions};
use std::fs;
use std::path::Path;

/// Reads every `*.json` role file in `dir_path` into a question bank.
pub fn load_question_bank(dir_path: &Path) -> Result<QuestionBank> {
    let mut roles = Vec::new();

    let mut paths = fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read questions directory: {}", dir_path.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();

    for path in paths {
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read question file: {}", path.display()))?;
            let role: RoleQuestions = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse question file: {}", path.display()))?;

            tracing::debug!("Loaded {} topics for role '{}'", role.topics.len(), role.role);
            roles.push(role);
        }
    }

    Ok(QuestionBank::new(roles))
}
