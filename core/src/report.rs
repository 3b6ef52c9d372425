use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_REPORT_TEMPLATE: &str = r"# Denoising Autoencoder Notebook

<!-- SECTION:overview start -->
<!-- What this run is for and how it relates to earlier runs. -->
<!-- SECTION:overview end -->

## Configuration

<!-- SECTION:configuration start -->
<!-- Populated automatically with the parameters from the latest run. -->
<!-- SECTION:configuration end -->

## Metrics

<!-- SECTION:metrics start -->
<!-- Populated automatically with per-epoch reconstruction losses. -->
<!-- SECTION:metrics end -->

## Reconstructions

<!-- SECTION:samples-primary start -->
<!-- Clean, corrupted and reconstructed digits from the final batch. -->
<!-- SECTION:samples-primary end -->

## Encoder Filters

<!-- SECTION:samples-secondary start -->
<!-- First-layer encoder weights rendered as images. -->
<!-- SECTION:samples-secondary end -->

> Only the regions between `<!-- SECTION:name start/end -->` markers are rewritten; notes elsewhere survive reruns.
";

/// Replacement content for one marked region of the report.
#[derive(Clone, Debug)]
pub struct ReportSection {
    id: String,
    content: String,
}

impl ReportSection {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    fn markers(&self) -> (String, String) {
        (
            format!("<!-- SECTION:{} start -->", self.id),
            format!("<!-- SECTION:{} end -->", self.id),
        )
    }

    fn splice(&self, content: &str) -> Result<String> {
        let (start_marker, end_marker) = self.markers();

        let (head, rest) = content
            .split_once(&start_marker)
            .ok_or_else(|| anyhow!("missing start marker: {start_marker}"))?;
        let end_idx = rest
            .find(&end_marker)
            .ok_or_else(|| anyhow!("missing end marker: {end_marker}"))?;
        let tail = &rest[end_idx..];

        let body = self.content.trim_matches('\n');
        let mut updated = String::with_capacity(content.len() + body.len());
        updated.push_str(head);
        updated.push_str(&start_marker);
        updated.push('\n');
        if !body.is_empty() {
            updated.push_str(body);
            updated.push('\n');
        }
        updated.push_str(tail);
        Ok(updated)
    }
}

/// Write `template` to `path` unless a report already exists there.
pub fn ensure_report_file(path: &Path, template: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    if !path.exists() {
        fs::write(path, template)
            .with_context(|| format!("failed to write report template to {}", path.display()))?;
    }

    Ok(())
}

pub fn update_sections(path: &Path, sections: &[ReportSection]) -> Result<()> {
    let mut content = fs::read_to_string(path)
        .with_context(|| format!("failed to read report at {}", path.display()))?;

    for section in sections {
        content = section.splice(&content)?;
    }

    fs::write(path, content)
        .with_context(|| format!("failed to write updated report to {}", path.display()))
}
