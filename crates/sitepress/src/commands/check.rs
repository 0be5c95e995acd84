//! Site audit command.

use std::path::Path;

use anyhow::Result;
use sitepress_static::{audit_site, suggest_links};

use crate::config::Project;

/// Suggestions listed per target page.
const SUGGESTIONS_PER_PAGE: usize = 5;

/// Run the check command.
pub fn run(config_path: &Path, suggest: bool) -> Result<()> {
    let project = Project::load(config_path)?;
    let output_dir = project.output_dir();
    let config = project.audit_config();

    tracing::info!("Checking {}...", output_dir.display());

    let report = audit_site(&output_dir, &config)?;

    if suggest {
        let suggestions = suggest_links(&output_dir, &config)?;
        let mut shown = 0;
        let mut current = None;

        for suggestion in &suggestions {
            if current != Some(&suggestion.target) {
                current = Some(&suggestion.target);
                shown = 0;
                tracing::info!(
                    "Link to {} ({}){}",
                    suggestion.target,
                    suggestion.target_title,
                    if suggestion.orphan { ", currently orphaned" } else { "" }
                );
            }
            if shown == SUGGESTIONS_PER_PAGE {
                continue;
            }
            shown += 1;
            tracing::info!(
                "  from {} [{}] {}",
                suggestion.source,
                suggestion.terms.join(", "),
                suggestion.snippet
            );
        }

        if suggestions.is_empty() {
            tracing::info!("No internal link suggestions");
        }
    }

    if !report.is_clean() {
        anyhow::bail!(
            "Found {} issues in {} pages",
            report.issues.len(),
            report.pages
        );
    }

    tracing::info!("{} pages checked, no issues", report.pages);

    Ok(())
}
