//! services/tutor/src/adapters/export.rs
//!
//! Writes the study guide on screen to a markdown file. Implements the
//! `DocumentExporter` port.

use async_trait::async_trait;
use professor_core::domain::AnalysisResult;
use professor_core::ports::{DocumentExporter, PortError, PortResult};
use std::fmt::Write;
use std::path::PathBuf;
use tracing::info;

pub const EXPORT_FILE_NAME: &str = "professor-ai-analysis.md";

pub struct MarkdownExporter {
    dir: PathBuf,
}

impl MarkdownExporter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

/// Renders every chapter and topic, all expanded, under the guide's title block.
pub fn render_study_guide(result: &AnalysisResult) -> String {
    let mut out = String::from("# Professor AI\n\n_Your Personal Study Guide_\n");
    for chapter in &result.chapters {
        let _ = write!(out, "\n## {}\n", chapter.title);
        for topic in &chapter.topics {
            let _ = write!(out, "\n### {}\n\n{}\n", topic.title, topic.explanation.trim_end());
        }
    }
    out
}

#[async_trait]
impl DocumentExporter for MarkdownExporter {
    async fn export(&self, result: &AnalysisResult) -> PortResult<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let path = self.dir.join(EXPORT_FILE_NAME);
        tokio::fs::write(&path, render_study_guide(result))
            .await
            .map_err(|e| PortError::Unexpected(format!("{}: {}", path.display(), e)))?;
        info!("Wrote study guide to {}", path.display());
        Ok(path.display().to_string())
    }
}
