//! Single page build command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use sitepress_static::{PageAssembler, PageDescriptor};

use crate::config::Project;

/// Resolve the descriptor for `template`: the listed page if any, otherwise derived.
fn resolve_page(project: &Project, template: &str, output: Option<PathBuf>) -> PageDescriptor {
    match project.find_page(template) {
        Some(mut page) => {
            if let Some(output) = output {
                page.output = output;
            }
            page
        }
        None => PageDescriptor::from_template(template, output.as_deref()),
    }
}

/// Run the page command.
pub fn run(config_path: &Path, template: &str, output: Option<PathBuf>) -> Result<()> {
    tracing::info!("Building page from {}...", template);

    let project = Project::load(config_path)?;
    let page = resolve_page(&project, template, output);

    tracing::debug!(
        "Page {} -> {} (depth {})",
        page.name,
        page.output.display(),
        page.depth()
    );

    let assembler = PageAssembler::new(project.build_config(None));
    let result = assembler.build_pages(std::slice::from_ref(&page))?;

    tracing::info!(
        "Generated {} in {}ms",
        result.output_dir.join(&page.output).display(),
        result.duration_ms
    );

    Ok(())
}
