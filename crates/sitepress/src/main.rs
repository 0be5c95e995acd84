//! Sitepress CLI - builds static HTML sites from Jinja templates.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "sitepress")]
#[command(about = "Static site builder composing Jinja templates into plain HTML")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to site.toml config file
    #[arg(short, long, default_value = "site.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter site.toml and templates
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Build every page (the default command)
    Build {
        /// Output directory (defaults to config or "public_html")
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write sitemap.xml
        #[arg(long)]
        sitemap: bool,
    },

    /// Build a single page from its content template
    Page {
        /// Content template, e.g. about_content.html
        template: String,

        /// Output path relative to the output directory
        output: Option<PathBuf>,
    },

    /// Write sitemap.xml for the built site
    Sitemap {
        /// Public URL of the site (defaults to config)
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Check built pages for metadata, broken internal links and orphans
    Check {
        /// Also suggest internal links between related pages
        #[arg(long)]
        suggest: bool,
    },

    /// Preview the built site
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// Directory to serve (defaults to the configured output)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Build, serve and rebuild on every template change
    Dev {
        /// Port to listen on
        #[arg(short, long, default_value = "7777")]
        port: u16,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let command = cli.command.unwrap_or(Commands::Build {
        output: None,
        sitemap: false,
    });

    match command {
        Commands::Init { yes } => {
            commands::init::run(&cli.config, yes)?;
        }
        Commands::Build { output, sitemap } => {
            commands::build::run(&cli.config, output, sitemap)?;
        }
        Commands::Page { template, output } => {
            commands::page::run(&cli.config, &template, output)?;
        }
        Commands::Sitemap { base_url } => {
            commands::sitemap::run(&cli.config, base_url)?;
        }
        Commands::Check { suggest } => {
            commands::check::run(&cli.config, suggest)?;
        }
        Commands::Serve { port, dir, no_open } => {
            commands::serve::run(&cli.config, port, dir, !no_open).await?;
        }
        Commands::Dev { port, no_open } => {
            commands::dev::run(&cli.config, port, !no_open).await?;
        }
    }

    Ok(())
}
