//! Development server command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use sitepress_server::{DevServer, DevServerConfig, SiteBuilder};
use sitepress_static::{BuildResult, PageAssembler};

use crate::config::Project;

/// Rebuilds from site.toml, re-reading it so config edits apply without a restart.
struct ProjectBuilder {
    config_path: PathBuf,
}

impl SiteBuilder for ProjectBuilder {
    fn rebuild(&self) -> Result<BuildResult, String> {
        let project = Project::load(&self.config_path).map_err(|e| format!("{e:#}"))?;

        PageAssembler::new(project.build_config(None))
            .build()
            .map_err(|e| e.to_string())
    }
}

/// Run the dev server.
pub async fn run(config_path: &Path, port: u16, open: bool) -> Result<()> {
    let project = Project::load(config_path)?;

    tracing::info!("Starting development server on port {}", port);

    let config = DevServerConfig {
        output_dir: project.output_dir(),
        watch: vec![project.templates_dir(), config_path.to_path_buf()],
        port,
        open,
        ..Default::default()
    };

    let builder = ProjectBuilder {
        config_path: config_path.to_path_buf(),
    };

    DevServer::new(config, builder).start().await?;

    Ok(())
}
