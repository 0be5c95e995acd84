//! Sitemap command.

use std::path::Path;

use anyhow::Result;

use crate::config::Project;

/// Run the sitemap command.
pub fn run(config_path: &Path, base_url: Option<String>) -> Result<()> {
    let project = Project::load(config_path)?;

    let Some(base_url) = base_url.or_else(|| project.base_url().map(str::to_string)) else {
        anyhow::bail!(
            "No base URL: pass --base-url or set [site] base_url in {}",
            config_path.display()
        );
    };

    let path = sitepress_static::write_sitemap(&project.output_dir(), &base_url)?;
    tracing::info!("Output: {}", path.display());

    Ok(())
}
