//! Full site build command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use sitepress_static::{write_sitemap, PageAssembler};

use crate::config::Project;

/// Run the build command.
pub fn run(config_path: &Path, output: Option<PathBuf>, sitemap: bool) -> Result<()> {
    tracing::info!("Building static site...");

    let project = Project::load(config_path)?;
    let assembler = PageAssembler::new(project.build_config(output));

    let result = assembler.build()?;

    tracing::info!("Built {} pages in {}ms", result.pages, result.duration_ms);
    tracing::info!("Output: {}", result.output_dir.display());

    if sitemap {
        let Some(base_url) = project.base_url() else {
            anyhow::bail!("Set [site] base_url in {} to write a sitemap", config_path.display());
        };
        write_sitemap(&result.output_dir, base_url)?;
    }

    Ok(())
}
