//! Project configuration (site.toml).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use sitepress_static::{AuditConfig, BuildConfig, PageDescriptor};

/// Configuration file structure (site.toml).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub site: SiteConfig,

    /// Site-wide render variables
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,

    #[serde(default)]
    pub pages: Vec<PageEntry>,

    #[serde(default)]
    pub audit: AuditSection,
}

#[derive(Debug, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_templates")]
    pub templates: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default = "default_slot")]
    pub slot: String,
    #[serde(default = "default_stylesheet")]
    pub stylesheet: String,
    #[serde(default = "default_strict")]
    pub strict: bool,
    /// Public URL of the site, used for the sitemap
    pub base_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            templates: default_templates(),
            output: default_output(),
            layout: default_layout(),
            slot: default_slot(),
            stylesheet: default_stylesheet(),
            strict: default_strict(),
            base_url: None,
        }
    }
}

fn default_templates() -> PathBuf {
    PathBuf::from("templates")
}
fn default_output() -> PathBuf {
    PathBuf::from("public_html")
}
fn default_layout() -> String {
    "base.html".to_string()
}
fn default_slot() -> String {
    "content".to_string()
}
fn default_stylesheet() -> String {
    "style.css".to_string()
}
fn default_strict() -> bool {
    true
}

/// `[audit]`: expectations for `sitepress check`.
#[derive(Debug, Deserialize)]
pub struct AuditSection {
    /// Require canonical, Open Graph, Twitter card, author and keywords tags
    #[serde(default = "default_social")]
    pub social: bool,
    /// Expected author; falls back to the `author` site variable
    pub author: Option<String>,
    /// Layout description that pages other than home should override
    pub default_description: Option<String>,
    #[serde(default = "default_og_type")]
    pub og_type: String,
    #[serde(default = "default_twitter_card")]
    pub twitter_card: String,
    /// Extra words ignored by link suggestions
    #[serde(default)]
    pub stopwords: Vec<String>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            social: default_social(),
            author: None,
            default_description: None,
            og_type: default_og_type(),
            twitter_card: default_twitter_card(),
            stopwords: vec![],
        }
    }
}

fn default_social() -> bool {
    true
}
fn default_og_type() -> String {
    "website".to_string()
}
fn default_twitter_card() -> String {
    "summary_large_image".to_string()
}

/// A `[[pages]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageEntry {
    /// Content template
    pub template: String,
    /// Page name; derived from the template when absent
    pub name: Option<String>,
    /// Output path; derived from the page name when absent
    pub output: Option<PathBuf>,
    pub title: Option<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
}

impl PageEntry {
    pub fn to_descriptor(&self) -> PageDescriptor {
        let mut page = match &self.name {
            Some(name) => PageDescriptor::named(name, &self.template, self.output.as_deref()),
            None => PageDescriptor::from_template(&self.template, self.output.as_deref()),
        };
        page.title = self.title.clone();
        page.vars = self.vars.clone();
        page
    }
}

/// A loaded project: the config file plus the directory its paths are relative to.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub file: ConfigFile,
}

impl Project {
    /// Load configuration from `config_path` if it exists.
    ///
    /// Returns an error if the config file exists but is malformed.
    pub fn load(config_path: &Path) -> Result<Self> {
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if !config_path.exists() {
            tracing::debug!("No {} found, using defaults", config_path.display());
            return Ok(Self {
                root,
                file: ConfigFile::default(),
            });
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        tracing::info!("Loaded config from {}", config_path.display());

        Ok(Self { root, file })
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(&self.file.site.templates)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.file.site.output)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.file.site.base_url.as_deref()
    }

    /// Descriptors of the pages listed in the config file.
    pub fn pages(&self) -> Vec<PageDescriptor> {
        self.file.pages.iter().map(PageEntry::to_descriptor).collect()
    }

    /// Descriptor of a listed page using `template`.
    pub fn find_page(&self, template: &str) -> Option<PageDescriptor> {
        self.file
            .pages
            .iter()
            .find(|p| p.template == template)
            .map(PageEntry::to_descriptor)
    }

    /// Assembler configuration for this project.
    pub fn build_config(&self, output: Option<PathBuf>) -> BuildConfig {
        let site = &self.file.site;

        BuildConfig {
            templates_dir: self.templates_dir(),
            output_dir: output.unwrap_or_else(|| self.output_dir()),
            layout: site.layout.clone(),
            slot: site.slot.clone(),
            stylesheet: site.stylesheet.clone(),
            strict: site.strict,
            vars: self.file.vars.clone(),
            pages: self.pages(),
        }
    }

    /// Audit expectations for this project.
    pub fn audit_config(&self) -> AuditConfig {
        let audit = &self.file.audit;
        let author = audit.author.clone().or_else(|| {
            self.file
                .vars
                .get("author")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        AuditConfig {
            site_url: self.base_url().map(str::to_string),
            social: audit.social,
            author,
            default_description: audit.default_description.clone(),
            og_type: audit.og_type.clone(),
            twitter_card: audit.twitter_card.clone(),
            stopwords: audit.stopwords.clone(),
        }
    }
}
