//! Page assembler: renders every page into the layout and writes the output tree.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde_json::Value;
use walkdir::WalkDir;

use crate::context::RenderContext;
use crate::page::{normalize_output, PageDescriptor, CONTENT_SUFFIX};
use crate::templates::{root_cause, TemplateEngine};

/// Configuration for building a site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Templates directory (layout and content fragments)
    pub templates_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Layout template every fragment renders into
    pub layout: String,

    /// Block in the layout that receives page content
    pub slot: String,

    /// Stylesheet path exposed to pages as `css_path`
    pub stylesheet: String,

    /// Treat undefined template variables as errors
    pub strict: bool,

    /// Site-wide render variables
    pub vars: BTreeMap<String, Value>,

    /// Pages to build; discovered from the templates directory when empty
    pub pages: Vec<PageDescriptor>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            output_dir: PathBuf::from("public_html"),
            layout: "base.html".to_string(),
            slot: "content".to_string(),
            stylesheet: "style.css".to_string(),
            strict: true,
            vars: BTreeMap::new(),
            pages: vec![],
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of pages generated
    pub pages: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to read templates directory: {0}")]
    ReadError(String),

    #[error("Template not found: {name} (page {page})")]
    TemplateNotFound { page: String, name: String },

    #[error("Failed to render page {page}: {message}")]
    RenderError { page: String, message: String },

    #[error("Output path {} is claimed by both {first} and {second}", .path.display())]
    PathCollision {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("Failed to write {}: {message}", .path.display())]
    WriteError { path: PathBuf, message: String },
}

/// A rendered page waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputArtifact {
    /// Name of the page it was rendered from
    pub page: String,

    /// Normalised path relative to the output directory
    pub path: PathBuf,

    /// Rendered HTML
    pub html: String,
}

impl OutputArtifact {
    /// Write the artifact under `output_root`, replacing any existing file.
    ///
    /// The HTML lands in a sibling temporary file first and is renamed into
    /// place, so a failed write never leaves a truncated page behind.
    pub fn write(&self, output_root: &Path) -> Result<PathBuf, BuildError> {
        let target = output_root.join(&self.path);
        let write_error = |e: std::io::Error| BuildError::WriteError {
            path: target.clone(),
            message: e.to_string(),
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = target.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&staging, &self.html).map_err(write_error)?;

        if let Err(e) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(write_error(e));
        }

        Ok(target)
    }
}

/// Assembles pages from content fragments and a shared layout.
pub struct PageAssembler {
    config: BuildConfig,
    templates: TemplateEngine,
}

impl PageAssembler {
    /// Create a new assembler bound to the configured templates directory.
    pub fn new(config: BuildConfig) -> Self {
        let templates = TemplateEngine::new(
            &config.templates_dir,
            config.layout.clone(),
            config.slot.clone(),
            config.strict,
        );

        Self { config, templates }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build every configured (or discovered) page.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        let pages = self.pages()?;
        self.build_pages(&pages)
    }

    /// Build the given pages.
    ///
    /// Nothing is written unless every page validates and renders.
    pub fn build_pages(&self, pages: &[PageDescriptor]) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        let artifacts = self.assemble(pages)?;

        fs::create_dir_all(&self.config.output_dir).map_err(|e| BuildError::WriteError {
            path: self.config.output_dir.clone(),
            message: e.to_string(),
        })?;

        for artifact in &artifacts {
            let path = artifact.write(&self.config.output_dir)?;
            tracing::info!("Generated {}", path.display());
        }

        Ok(BuildResult {
            pages: artifacts.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: self.config.output_dir.clone(),
        })
    }

    /// Pages from the configuration, or discovered ones when none are configured.
    pub fn pages(&self) -> Result<Vec<PageDescriptor>, BuildError> {
        if self.config.pages.is_empty() {
            self.discover_pages()
        } else {
            Ok(self.config.pages.clone())
        }
    }

    /// Discover `*_content.html` fragments in the templates directory.
    pub fn discover_pages(&self) -> Result<Vec<PageDescriptor>, BuildError> {
        let root = &self.config.templates_dir;

        if !root.is_dir() {
            return Err(BuildError::ReadError(format!(
                "Templates directory not found: {}",
                root.display()
            )));
        }

        let mut pages = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };

            let template = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if !template.ends_with(CONTENT_SUFFIX) {
                continue;
            }

            tracing::debug!("Discovered page template {}", template);
            pages.push(PageDescriptor::from_template(&template, None));
        }

        Ok(pages)
    }

    /// Check output paths and template resolution for every page.
    ///
    /// Returns the normalised output path of each page, in order.
    pub fn validate(&self, pages: &[PageDescriptor]) -> Result<Vec<PathBuf>, BuildError> {
        let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
        let mut outputs = Vec::with_capacity(pages.len());
        let mut layout_checked = false;

        for page in pages {
            let output = normalize_output(&page.output).map_err(|e| BuildError::WriteError {
                path: page.output.clone(),
                message: e.to_string(),
            })?;

            if let Some(first) = claimed.insert(output.clone(), &page.name) {
                return Err(BuildError::PathCollision {
                    path: output,
                    first: first.to_string(),
                    second: page.name.clone(),
                });
            }

            self.templates
                .check(&page.template)
                .map_err(|e| template_error(&page.name, &page.template, e))?;

            let fragment = self
                .templates
                .is_fragment(&page.template)
                .map_err(|e| template_error(&page.name, &page.template, e))?;

            if fragment && !layout_checked {
                self.templates
                    .check_layout()
                    .map_err(|e| template_error(&page.name, self.templates.layout(), e))?;
                layout_checked = true;
            }

            outputs.push(output);
        }

        Ok(outputs)
    }

    /// Render one page in memory.
    pub fn render_page(&self, page: &PageDescriptor) -> Result<OutputArtifact, BuildError> {
        let path = page
            .normalized_output()
            .map_err(|e| BuildError::WriteError {
                path: page.output.clone(),
                message: e.to_string(),
            })?;

        let ctx = RenderContext::for_page(page, &self.config.vars, &self.config.stylesheet);
        tracing::debug!("Rendering {} with {} variables", page.name, ctx.len());

        let html = self
            .templates
            .render_page(&page.template, &ctx)
            .map_err(|e| template_error(&page.name, &page.template, e))?;

        Ok(OutputArtifact {
            page: page.name.clone(),
            path,
            html,
        })
    }

    /// Validate and render all pages, in parallel, without writing anything.
    pub fn assemble(&self, pages: &[PageDescriptor]) -> Result<Vec<OutputArtifact>, BuildError> {
        self.validate(pages)?;

        let results: Vec<Result<OutputArtifact, BuildError>> =
            pages.par_iter().map(|page| self.render_page(page)).collect();

        results.into_iter().collect()
    }
}

/// Map a template engine error onto the build error taxonomy.
///
/// Errors raised inside included templates arrive wrapped; the innermost
/// cause decides the variant and supplies the message.
fn template_error(page: &str, template: &str, err: minijinja::Error) -> BuildError {
    let cause = root_cause(&err);

    if cause.kind() == minijinja::ErrorKind::TemplateNotFound {
        let name = missing_template_name(cause).unwrap_or_else(|| template.to_string());
        return BuildError::TemplateNotFound {
            page: page.to_string(),
            name,
        };
    }

    BuildError::RenderError {
        page: page.to_string(),
        message: cause.to_string(),
    }
}

/// Extract the template name from a minijinja "does not exist" error.
fn missing_template_name(err: &minijinja::Error) -> Option<String> {
    let detail = err.detail()?;
    let quoted = detail
        .strip_prefix("template ")?
        .strip_suffix(" does not exist")?;
    Some(quoted.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const LAYOUT: &str = "<!DOCTYPE html>\n<html>\n<head><title>{{ title }}</title>\
<link rel=\"stylesheet\" href=\"{{ css_path }}\"></head>\n\
<body>{% block content %}{% endblock %}</body>\n</html>\n";

    struct Site {
        _temp: tempfile::TempDir,
        templates: PathBuf,
        out: PathBuf,
    }

    fn site(files: &[(&str, &str)]) -> Site {
        let temp = tempdir().unwrap();
        let templates = temp.path().join("templates");
        let out = temp.path().join("public_html");

        for (name, source) in files {
            let path = templates.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, source).unwrap();
        }

        Site {
            _temp: temp,
            templates,
            out,
        }
    }

    fn assembler(site: &Site, pages: Vec<PageDescriptor>) -> PageAssembler {
        PageAssembler::new(BuildConfig {
            templates_dir: site.templates.clone(),
            output_dir: site.out.clone(),
            pages,
            ..Default::default()
        })
    }

    #[test]
    fn builds_home_page_into_layout() {
        let site = site(&[("base.html", LAYOUT), ("home_content.html", "<p>Welcome</p>")]);
        let home = PageDescriptor::new("home", "home_content.html", "index.html").with_title("Home");

        let result = assembler(&site, vec![home]).build().unwrap();

        assert_eq!(result.pages, 1);
        let html = fs::read_to_string(site.out.join("index.html")).unwrap();
        assert!(html.contains("<title>Home</title>"));
        assert!(html.contains("<p>Welcome</p>"));
    }

    #[test]
    fn writes_one_file_per_page() {
        let site = site(&[
            ("base.html", LAYOUT),
            ("home_content.html", "<p>Home</p>"),
            ("ensino_content.html", "<p>Ensino</p>"),
            ("pesquisa_content.html", "<p>Pesquisa</p>"),
        ]);
        let pages = vec![
            PageDescriptor::new("home", "home_content.html", "index.html").with_title("Home"),
            PageDescriptor::new("ensino", "ensino_content.html", "ensino/index.html")
                .with_title("Ensino"),
            PageDescriptor::new("pesquisa", "pesquisa_content.html", "pesquisa/index.html")
                .with_title("Pesquisa"),
        ];

        let result = assembler(&site, pages).build().unwrap();

        assert_eq!(result.pages, 3);
        assert!(site.out.join("index.html").is_file());
        assert!(site.out.join("ensino/index.html").is_file());
        let nested = fs::read_to_string(site.out.join("pesquisa/index.html")).unwrap();
        assert!(nested.contains("<p>Pesquisa</p>"));
        assert!(nested.contains("style.css"));
        assert!(!nested.contains("href=\"style.css\""));
    }

    #[test]
    fn rebuild_is_byte_identical() {
        let site = site(&[
            ("base.html", LAYOUT),
            ("home_content.html", "<p>{{ current_page }} {{ is_home }}</p>"),
        ]);
        let pages = vec![PageDescriptor::from_template("home_content.html", None).with_title("Home")];
        let assembler = assembler(&site, pages);

        assembler.build().unwrap();
        let first = fs::read(site.out.join("index.html")).unwrap();
        assembler.build().unwrap();
        let second = fs::read(site.out.join("index.html")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn overwrites_existing_output() {
        let site = site(&[("base.html", LAYOUT), ("home_content.html", "<p>New</p>")]);
        fs::create_dir_all(&site.out).unwrap();
        fs::write(site.out.join("index.html"), "stale").unwrap();

        let pages = vec![PageDescriptor::from_template("home_content.html", None).with_title("Home")];
        assembler(&site, pages).build().unwrap();

        let html = fs::read_to_string(site.out.join("index.html")).unwrap();
        assert!(html.contains("<p>New</p>"));
        assert!(!site.out.join(".index.html.tmp").exists());
    }

    #[test]
    fn missing_template_fails_without_writing() {
        let site = site(&[("base.html", LAYOUT), ("home_content.html", "<p>Home</p>")]);
        let pages = vec![
            PageDescriptor::new("home", "home_content.html", "index.html").with_title("Home"),
            PageDescriptor::new("gone", "gone_content.html", "gone.html"),
        ];

        let err = assembler(&site, pages).build().unwrap_err();

        match err {
            BuildError::TemplateNotFound { page, name } => {
                assert_eq!(page, "gone");
                assert_eq!(name, "gone_content.html");
            }
            other => panic!("expected TemplateNotFound, got {other:?}"),
        }
        assert!(!site.out.join("gone.html").exists());
        assert!(!site.out.join("index.html").exists());
    }

    #[test]
    fn missing_layout_is_template_not_found() {
        let site = site(&[("home_content.html", "<p>Home</p>")]);
        let pages = vec![PageDescriptor::from_template("home_content.html", None)];

        let err = assembler(&site, pages).build().unwrap_err();

        assert!(
            matches!(err, BuildError::TemplateNotFound { ref name, .. } if name == "base.html"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn undefined_variable_is_render_error() {
        let site = site(&[("base.html", LAYOUT), ("home_content.html", "{{ tagline }}")]);
        let pages = vec![PageDescriptor::from_template("home_content.html", None).with_title("Home")];

        let err = assembler(&site, pages).build().unwrap_err();

        assert!(matches!(err, BuildError::RenderError { ref page, .. } if page == "home"));
        assert!(!site.out.join("index.html").exists());
    }

    #[test]
    fn undefined_variable_message_names_variable_source() {
        let site = site(&[("base.html", LAYOUT), ("home_content.html", "{{ tagline }}")]);
        let pages = vec![PageDescriptor::from_template("home_content.html", None).with_title("Home")];

        let err = assembler(&site, pages).build().unwrap_err();

        match err {
            BuildError::RenderError { message, .. } => {
                assert!(message.contains("undefined"), "message: {message}");
                assert!(message.contains("home_content.html"), "message: {message}");
            }
            other => panic!("expected RenderError, got {other:?}"),
        }
    }

    #[test]
    fn missing_partial_is_template_not_found() {
        let site = site(&[
            ("base.html", LAYOUT),
            ("home_content.html", "{% include \"partials/nav.html\" %}<p>Home</p>"),
        ]);
        let pages = vec![PageDescriptor::from_template("home_content.html", None).with_title("Home")];

        let err = assembler(&site, pages).build().unwrap_err();

        match err {
            BuildError::TemplateNotFound { page, name } => {
                assert_eq!(page, "home");
                assert_eq!(name, "partials/nav.html");
            }
            other => panic!("expected TemplateNotFound, got {other:?}"),
        }
        assert!(!site.out.join("index.html").exists());
    }

    #[test]
    fn layout_variables_are_escaped() {
        let site = site(&[
            ("base.html", "<title>{{ title }}</title>{% block content %}{% endblock %}"),
            ("home_content.html", "<p>{{ title }}</p>"),
        ]);
        let pages = vec![PageDescriptor::from_template("home_content.html", None).with_title("<b>")];

        assembler(&site, pages).build().unwrap();

        let html = fs::read_to_string(site.out.join("index.html")).unwrap();
        assert_eq!(html, "<title>&lt;b&gt;</title><p>&lt;b&gt;</p>");
    }

    #[test]
    fn redundant_output_components_keep_nav_prefix() {
        let site = site(&[
            ("base.html", "[{{ nav_prefix|safe }}]{% block content %}{% endblock %}"),
            ("ensino_content.html", "x"),
        ]);
        let pages = vec![PageDescriptor::new(
            "ensino",
            "ensino_content.html",
            "./ensino/index.html",
        )];

        assembler(&site, pages).build().unwrap();

        let html = fs::read_to_string(site.out.join("ensino/index.html")).unwrap();
        assert_eq!(html, "[../]x");
    }

    #[test]
    fn colliding_outputs_fail() {
        let site = site(&[
            ("base.html", LAYOUT),
            ("home_content.html", "<p>Home</p>"),
            ("inicio_content.html", "<p>Inicio</p>"),
        ]);
        let pages = vec![
            PageDescriptor::new("home", "home_content.html", "index.html"),
            PageDescriptor::new("inicio", "inicio_content.html", "./index.html"),
        ];

        let err = assembler(&site, pages).build().unwrap_err();

        match err {
            BuildError::PathCollision {
                path,
                first,
                second,
            } => {
                assert_eq!(path, PathBuf::from("index.html"));
                assert_eq!(first, "home");
                assert_eq!(second, "inicio");
            }
            other => panic!("expected PathCollision, got {other:?}"),
        }
        assert!(!site.out.exists());
    }

    #[test]
    fn escaping_output_path_is_write_error() {
        let site = site(&[("base.html", LAYOUT), ("home_content.html", "<p>Home</p>")]);
        let pages = vec![PageDescriptor::new(
            "home",
            "home_content.html",
            "../outside.html",
        )];

        let err = assembler(&site, pages).build().unwrap_err();

        assert!(matches!(err, BuildError::WriteError { .. }));
    }

    #[test]
    fn unwritable_destination_is_write_error() {
        let site = site(&[("base.html", LAYOUT), ("home_content.html", "<p>Home</p>")]);
        fs::create_dir_all(&site.out).unwrap();
        // A file where a directory is needed.
        fs::write(site.out.join("blog"), "not a directory").unwrap();
        let pages = vec![
            PageDescriptor::new("home", "home_content.html", "blog/index.html").with_title("Blog"),
        ];

        let err = assembler(&site, pages).build().unwrap_err();

        assert!(matches!(err, BuildError::WriteError { .. }));
    }

    #[test]
    fn discovers_content_templates() {
        let site = site(&[
            ("base.html", LAYOUT),
            ("home_content.html", "<p>Home</p>"),
            ("sobre_projeto_content.html", "<p>Sobre</p>"),
            ("partials/footer.html", "<footer></footer>"),
        ]);
        let assembler = PageAssembler::new(BuildConfig {
            templates_dir: site.templates.clone(),
            output_dir: site.out.clone(),
            vars: BTreeMap::from([("title".to_string(), json!("Site"))]),
            ..Default::default()
        });

        let pages = assembler.pages().unwrap();
        let outputs: Vec<_> = pages.iter().map(|p| p.output.clone()).collect();
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("index.html"),
                PathBuf::from("sobre-projeto.html")
            ]
        );

        let result = assembler.build().unwrap();
        assert_eq!(result.pages, 2);
        let html = fs::read_to_string(site.out.join("sobre-projeto.html")).unwrap();
        assert!(html.contains("<title>Site</title>"));
    }

    #[test]
    fn discovery_requires_templates_dir() {
        let temp = tempdir().unwrap();
        let assembler = PageAssembler::new(BuildConfig {
            templates_dir: temp.path().join("missing"),
            output_dir: temp.path().join("out"),
            ..Default::default()
        });

        assert!(matches!(
            assembler.build().unwrap_err(),
            BuildError::ReadError(_)
        ));
    }

    #[test]
    fn assemble_keeps_descriptor_order() {
        let site = site(&[
            ("base.html", LAYOUT),
            ("a_content.html", "a"),
            ("b_content.html", "b"),
            ("c_content.html", "c"),
        ]);
        let pages: Vec<_> = ["c", "a", "b"]
            .iter()
            .map(|n| {
                PageDescriptor::from_template(&format!("{n}_content.html"), None).with_title(*n)
            })
            .collect();

        let artifacts = assembler(&site, vec![]).assemble(&pages).unwrap();

        let names: Vec<_> = artifacts.iter().map(|a| a.page.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert!(!site.out.exists());
    }
}
