//! Initialize a sitepress project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing sitepress...");

    let root = config_path.parent().unwrap_or(Path::new(""));
    let templates_dir = root.join("templates");
    let output_dir = root.join("public_html");

    if templates_dir.exists() && !yes {
        tracing::warn!(
            "{} already exists. Use --yes to overwrite.",
            templates_dir.display()
        );
        return Ok(());
    }

    fs::create_dir_all(&templates_dir).context("Failed to create templates directory")?;
    fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

    let files = [
        (config_path.to_path_buf(), DEFAULT_CONFIG),
        (templates_dir.join("base.html"), DEFAULT_LAYOUT),
        (templates_dir.join("home_content.html"), DEFAULT_HOME),
        (templates_dir.join("about_content.html"), DEFAULT_ABOUT),
        (output_dir.join("style.css"), DEFAULT_CSS),
        (output_dir.join("assets/card.svg"), DEFAULT_CARD),
    ];

    for (path, content) in files {
        if path.exists() && !yes {
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Created {}", path.display());
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'sitepress build' to generate the site.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Sitepress configuration

[site]
# Templates directory (layout and *_content.html fragments)
templates = "templates"

# Output directory for the built site
output = "public_html"

# Layout template and the block that receives page content
layout = "base.html"
slot = "content"

# Undefined template variables fail the build
strict = true

# Public URL, used by 'sitepress sitemap' and 'sitepress check'
base_url = "https://example.com"

[vars]
site_name = "My Site"
site_url = "https://example.com"
author = "Site Author"
keywords = "static site, templates"
description = "A static site assembled from Jinja templates."
image = "assets/card.svg"

[audit]
# Pages other than home should replace the layout description
default_description = "A static site assembled from Jinja templates."

[[pages]]
template = "home_content.html"
title = "Home"

[[pages]]
template = "about_content.html"
title = "About"
[pages.vars]
description = "How this site is put together from templates."
"#;

const DEFAULT_LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }} | {{ site_name }}</title>
  <meta name="description" content="{{ description }}">
  <meta name="author" content="{{ author }}">
  <meta name="keywords" content="{{ keywords }}">
  <link rel="canonical" href="{{ site_url }}/{{ page_path }}">
  <meta property="og:type" content="website">
  <meta property="og:title" content="{{ title }} | {{ site_name }}">
  <meta property="og:description" content="{{ description }}">
  <meta property="og:url" content="{{ site_url }}/{{ page_path }}">
  <meta property="og:image" content="{{ site_url }}/{{ image }}">
  <meta name="twitter:card" content="summary_large_image">
  <meta name="twitter:title" content="{{ title }} | {{ site_name }}">
  <meta name="twitter:description" content="{{ description }}">
  <meta name="twitter:image" content="{{ site_url }}/{{ image }}">
  <link rel="stylesheet" href="{{ css_path }}">
</head>
<body>
  <nav>
    <a href="{{ nav_prefix }}index.html"{% if is_home %} class="active"{% endif %}>Home</a>
    <a href="{{ nav_prefix }}about.html"{% if current_page == "about" %} class="active"{% endif %}>About</a>
  </nav>
  <main>
{% block content %}{% endblock %}
  </main>
</body>
</html>
"#;

const DEFAULT_HOME: &str = r#"<h1>Welcome to {{ site_name }}</h1>
<p>Edit <code>templates/home_content.html</code> to change this page.</p>
"#;

const DEFAULT_ABOUT: &str = r#"<h1>About</h1>
<p>Every <code>*_content.html</code> template is rendered into <code>base.html</code>.</p>
"#;

const DEFAULT_CSS: &str = r#"body {
  font-family: system-ui, sans-serif;
  max-width: 48rem;
  margin: 2rem auto;
  padding: 0 1rem;
  line-height: 1.6;
}

nav a {
  margin-right: 1rem;
}

nav a.active {
  font-weight: 700;
}
"#;

const DEFAULT_CARD: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="1200" height="630">
  <rect width="1200" height="630" fill="#1f2937"/>
</svg>
"##;
