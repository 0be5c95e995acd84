//! Page descriptors and output path rules.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

/// File name suffix marking a template as a page content fragment.
pub const CONTENT_SUFFIX: &str = "_content.html";

/// Name of the page that maps to the site root.
const HOME_PAGE: &str = "home";

/// A page to be built.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDescriptor {
    /// Logical page name (also exposed as `current_page`)
    pub name: String,

    /// Content template, relative to the templates directory
    pub template: String,

    /// Target path, relative to the output directory
    pub output: PathBuf,

    /// Page title bound as `title`
    pub title: Option<String>,

    /// Page-level render variables
    pub vars: BTreeMap<String, Value>,
}

impl PageDescriptor {
    /// Create a descriptor with no title or page variables.
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            output: output.into(),
            title: None,
            vars: BTreeMap::new(),
        }
    }

    /// Derive a descriptor from a content template name.
    ///
    /// `home_content.html` maps to `index.html`; any other name maps to a
    /// hyphenated file at the root (`about_me_content.html` -> `about-me.html`).
    /// An explicit `output` overrides the derived path.
    pub fn from_template(template: &str, output: Option<&Path>) -> Self {
        Self::named(page_name(template), template, output)
    }

    /// Descriptor for a page whose name is given rather than taken from the template.
    ///
    /// Without an explicit `output` the path is derived from `name` as in
    /// [`PageDescriptor::from_template`].
    pub fn named(name: impl Into<String>, template: &str, output: Option<&Path>) -> Self {
        let name = name.into();

        let output = match output {
            Some(path) => path.to_path_buf(),
            None if name == HOME_PAGE => PathBuf::from("index.html"),
            None => PathBuf::from(format!("{}.html", name.replace('_', "-"))),
        };

        Self::new(name, template, output)
    }

    /// Set the page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a page-level variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Whether this page is the site home page.
    pub fn is_home(&self) -> bool {
        self.name == HOME_PAGE
    }

    /// Output path after lexical normalisation.
    pub fn normalized_output(&self) -> Result<PathBuf, PathError> {
        normalize_output(&self.output)
    }

    /// Number of directories between the output root and this page.
    pub fn depth(&self) -> usize {
        self.resolved_output()
            .components()
            .count()
            .saturating_sub(1)
    }

    /// Output path with forward slashes, as it appears in URLs.
    pub fn url_path(&self) -> String {
        self.resolved_output()
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Normalised output, or the raw path when it does not normalise.
    fn resolved_output(&self) -> PathBuf {
        self.normalized_output()
            .unwrap_or_else(|_| self.output.clone())
    }
}

/// Logical page name for a content template file name.
fn page_name(template: &str) -> String {
    template
        .strip_suffix(CONTENT_SUFFIX)
        .or_else(|| template.strip_suffix(".html"))
        .unwrap_or(template)
        .to_string()
}

/// Reasons an output path is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("output path is empty")]
    Empty,

    #[error("output path must be relative to the output directory")]
    Absolute,

    #[error("output path escapes the output directory")]
    EscapesRoot,
}

/// Lexically normalise an output path so equivalent spellings compare equal.
pub fn normalize_output(path: &Path) -> Result<PathBuf, PathError> {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return Err(PathError::Absolute),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(PathError::EscapesRoot);
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }

    Ok(normalized)
}
