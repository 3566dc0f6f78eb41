//! JSON + Markdown files on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::{ReportSink, RunReport, markdown};
use crate::negotiation::ModeComparison;

/// Writes `<dir>/run-<timestamp>.json` and `<dir>/run-<timestamp>.md`.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    dir: PathBuf,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem for a report, unique to the millisecond.
    pub fn stem(report: &RunReport) -> String {
        format!("run-{}", report.started_at.format("%Y%m%d-%H%M%S-%3f"))
    }

    /// Paths of the JSON and Markdown files for `report`.
    pub fn paths(&self, report: &RunReport) -> (PathBuf, PathBuf) {
        let stem = Self::stem(report);
        (
            self.dir.join(format!("{stem}.json")),
            self.dir.join(format!("{stem}.md")),
        )
    }

    /// Write the comparison table as `<dir>/compare-<timestamp>.md`.
    pub async fn write_comparison(&self, comparison: &ModeComparison) -> Result<PathBuf> {
        self.ensure_dir().await?;
        let path = self.dir.join(format!(
            "compare-{}.md",
            comparison.parallel.started_at.format("%Y%m%d-%H%M%S-%3f")
        ));
        write(&path, &markdown::render_comparison(comparison)).await?;
        Ok(path)
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create report directory {}", self.dir.display()))
    }
}

async fn write(path: &Path, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

#[async_trait]
impl ReportSink for FileReportSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn persist(&self, report: &RunReport) -> Result<()> {
        self.ensure_dir().await?;
        let (json_path, md_path) = self.paths(report);
        write(&json_path, &report.to_json()?).await?;
        write(&md_path, &markdown::render_run(report)).await?;
        info!(json = %json_path.display(), markdown = %md_path.display(), "report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures;

    #[tokio::test]
    async fn persist_writes_json_and_markdown() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(tmp.path().join("reports"));
        let report = fixtures::report();

        sink.persist(&report).await.unwrap();

        let (json_path, md_path) = sink.paths(&report);
        assert_eq!(
            json_path.file_name().unwrap().to_str().unwrap(),
            "run-20260301-120000-000.json"
        );
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json["topic"], "Should the ledger be public?");
        let md = std::fs::read_to_string(md_path).unwrap();
        assert!(md.starts_with("# Negotiation:"));
    }

    #[tokio::test]
    async fn write_comparison_creates_markdown_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(tmp.path());
        let comparison = ModeComparison::new(fixtures::report(), fixtures::report());

        let path = sink.write_comparison(&comparison).await.unwrap();
        let md = std::fs::read_to_string(path).unwrap();
        assert!(md.contains("| Phase | PARALLEL (ms) | SEQUENTIAL (ms) | Speedup |"));
    }
}
