use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

use crate::analysis::AnalysisResult;

/// Writes results as indented JSON, replacing any existing file. Non-ASCII
/// text is written as-is.
pub async fn write_results(path: &Path, results: &[AnalysisResult]) -> Result<()> {
    let serialized =
        serde_json::to_string_pretty(results).context("Failed to serialize analysis results")?;

    tokio::fs::write(path, serialized)
        .await
        .with_context(|| format!("Failed to write results to {}", path.display()))
}

pub async fn read_results(path: &Path) -> Result<Vec<AnalysisResult>> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read results from {}", path.display()))?;

    serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse results in {}", path.display()))
}

pub struct Summary<'a> {
    results: &'a [AnalysisResult],
}

impl<'a> Summary<'a> {
    pub fn of(results: &'a [AnalysisResult]) -> Self {
        Self { results }
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Summary ===")?;

        for result in self.results {
            let analysis = &result.analysis;
            writeln!(f)?;
            writeln!(f, "Dialogue {}:", result.dialogue_id)?;
            writeln!(f, "  Info anchors found: {}", analysis.info_anchors_found.len())?;
            writeln!(f, "  Info anchors missing: {}", analysis.info_anchors_missing.len())?;
            writeln!(f, "  Objections found: {}", analysis.objections_found.len())?;
        }

        let objections: usize = self
            .results
            .iter()
            .map(|result| result.analysis.objections_found.len())
            .sum();
        let handled = self
            .results
            .iter()
            .flat_map(|result| &result.analysis.objections_found)
            .filter(|objection| objection.manager_handled)
            .count();

        writeln!(f)?;
        write!(
            f,
            "{} dialogues, {objections} objections ({handled} handled)",
            self.results.len()
        )
    }
}
