//! Offline audit of a built site: page metadata, internal links and orphans.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;
use walkdir::WalkDir;

const MIN_TITLE_LENGTH: usize = 5;
const MIN_DESCRIPTION_LENGTH: usize = 20;

/// `rel` values of `<link>` tags whose targets are checked.
const CHECKED_RELS: &[&str] = &["stylesheet", "icon", "apple-touch-icon", "manifest"];

/// Link schemes that are never checked.
const SKIPPED_SCHEMES: &[&str] = &["mailto:", "tel:", "data:", "javascript:"];

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static META: LazyLock<Selector> = LazyLock::new(|| selector("meta"));
static LINK_REL: LazyLock<Selector> = LazyLock::new(|| selector("link[rel][href]"));
static REFERENCES: LazyLock<Selector> =
    LazyLock::new(|| selector("a[href], link[rel][href], img[src], script[src]"));
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("[id], a[name]"));

/// Errors that prevent the audit from running.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Output directory not found: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("Failed to read {}: {message}", .path.display())]
    ReadError { path: PathBuf, message: String },
}

/// Expectations the audit holds pages to.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Public URL of the site; canonical and `og:url` links must live under it
    pub site_url: Option<String>,

    /// Check canonical, Open Graph, Twitter card, author and keywords tags
    pub social: bool,

    /// Expected `<meta name="author">` content
    pub author: Option<String>,

    /// Layout default description, flagged when reused on pages other than the home page
    pub default_description: Option<String>,

    /// Expected `og:type`
    pub og_type: String,

    /// Expected `twitter:card`
    pub twitter_card: String,

    /// Extra words ignored when suggesting links
    pub stopwords: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            site_url: None,
            social: true,
            author: None,
            default_description: None,
            og_type: "website".to_string(),
            twitter_card: "summary_large_image".to_string(),
            stopwords: vec![],
        }
    }
}

/// What is wrong with a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    MissingTitle,
    ShortTitle(String),
    MissingDescription,
    ShortDescription(String),
    DefaultDescription,
    MissingTag(String),
    ShortContent {
        tag: String,
        content: String,
        min: usize,
    },
    UnexpectedContent {
        tag: String,
        expected: String,
        found: String,
    },
    InvalidUrl {
        tag: String,
        url: String,
        reason: String,
    },
    Mismatch {
        first: String,
        second: String,
    },
    BrokenLink {
        href: String,
        reason: String,
    },
    Orphaned,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::MissingTitle => write!(f, "missing <title>"),
            IssueKind::ShortTitle(title) => write!(
                f,
                "title {title:?} is shorter than {MIN_TITLE_LENGTH} characters"
            ),
            IssueKind::MissingDescription => write!(f, "missing <meta name=\"description\">"),
            IssueKind::ShortDescription(desc) => write!(
                f,
                "description {desc:?} is shorter than {MIN_DESCRIPTION_LENGTH} characters"
            ),
            IssueKind::DefaultDescription => {
                write!(f, "description is the layout default, not specific to this page")
            }
            IssueKind::MissingTag(tag) => write!(f, "missing <{tag}>"),
            IssueKind::ShortContent { tag, content, .. } if content.is_empty() => {
                write!(f, "<{tag}> is empty")
            }
            IssueKind::ShortContent { tag, content, min } => {
                write!(f, "<{tag}> {content:?} is shorter than {min} characters")
            }
            IssueKind::UnexpectedContent {
                tag,
                expected,
                found,
            } => write!(f, "<{tag}> is {found:?}, expected {expected:?}"),
            IssueKind::InvalidUrl { tag, url, reason } => write!(f, "<{tag}> {url}: {reason}"),
            IssueKind::Mismatch { first, second } => write!(f, "{first} and {second} differ"),
            IssueKind::BrokenLink { href, reason } => write!(f, "broken link {href}: {reason}"),
            IssueKind::Orphaned => write!(f, "no other page links here"),
        }
    }
}

/// A problem found on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditIssue {
    /// Page path relative to the output directory, with `/` separators
    pub page: String,
    pub kind: IssueKind,
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.page, self.kind)
    }
}

/// Result of auditing a site.
#[derive(Debug, Default)]
pub struct AuditReport {
    /// Number of HTML pages inspected
    pub pages: usize,
    pub issues: Vec<AuditIssue>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A parsed page of the built site.
pub(crate) struct SitePage {
    pub relative: PathBuf,
    pub doc: Html,
}

impl SitePage {
    pub fn is_home(&self) -> bool {
        self.relative == Path::new("index.html")
    }

    /// Internal HTML pages this page links to with `<a href>`.
    pub fn linked_pages(&self, root: &Path) -> BTreeSet<PathBuf> {
        static ANCHOR_LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

        self.doc
            .select(&ANCHOR_LINKS)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| resolve_link(href, &self.relative))
            .filter_map(|target| locate(root, &target).ok())
            .filter(|path| is_html(path))
            .collect()
    }
}

/// Audit every HTML page under `output_dir`.
pub fn audit_site(output_dir: &Path, config: &AuditConfig) -> Result<AuditReport, AuditError> {
    let pages = load_pages(output_dir)?;
    let anchors: BTreeMap<PathBuf, BTreeSet<String>> = pages
        .iter()
        .map(|page| (page.relative.clone(), collect_anchors(&page.doc)))
        .collect();

    let mut report = AuditReport {
        pages: pages.len(),
        issues: Vec::new(),
    };
    let mut inbound: BTreeSet<PathBuf> = BTreeSet::new();

    for page in &pages {
        let name = url_path(&page.relative);

        for kind in check_metadata(&page.doc, config, output_dir, page.is_home()) {
            report.issues.push(AuditIssue {
                page: name.clone(),
                kind,
            });
        }

        for href in references(&page.doc) {
            let Some(target) = resolve_link(&href, &page.relative) else {
                continue;
            };

            match check_target(output_dir, &target, &anchors) {
                Ok(Some(file)) => {
                    if file != page.relative {
                        inbound.insert(file);
                    }
                }
                Ok(None) => {}
                Err(reason) => report.issues.push(AuditIssue {
                    page: name.clone(),
                    kind: IssueKind::BrokenLink { href, reason },
                }),
            }
        }
    }

    for page in &pages {
        if !page.is_home() && !inbound.contains(&page.relative) {
            report.issues.push(AuditIssue {
                page: url_path(&page.relative),
                kind: IssueKind::Orphaned,
            });
        }
    }

    for issue in &report.issues {
        tracing::warn!("{}", issue);
    }

    Ok(report)
}

/// Parse every `.html` file under `output_dir`, in path order.
pub(crate) fn load_pages(output_dir: &Path) -> Result<Vec<SitePage>, AuditError> {
    if !output_dir.is_dir() {
        return Err(AuditError::MissingOutput(output_dir.to_path_buf()));
    }

    let mut pages = Vec::new();

    for entry in WalkDir::new(output_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_html(path) {
            continue;
        }

        let html = fs::read_to_string(path).map_err(|e| AuditError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        pages.push(SitePage {
            relative: path.strip_prefix(output_dir).unwrap_or(path).to_path_buf(),
            doc: Html::parse_document(&html),
        });
    }

    tracing::debug!("Parsed {} pages under {}", pages.len(), output_dir.display());

    Ok(pages)
}

/// Content of the first `<meta>` whose `name` or `property` is `key`.
///
/// `Some(None)` means the tag exists without a `content` attribute.
pub(crate) fn meta<'a>(doc: &'a Html, key: &str) -> Option<Option<&'a str>> {
    doc.select(&META)
        .find(|tag| {
            let element = tag.value();
            element
                .attr("name")
                .or_else(|| element.attr("property"))
                .is_some_and(|k| k.trim().eq_ignore_ascii_case(key))
        })
        .map(|tag| tag.value().attr("content"))
}

/// Text of the page `<title>`.
pub(crate) fn title(doc: &Html) -> Option<String> {
    doc.select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
}

/// Run the metadata checks for one page.
fn check_metadata(doc: &Html, config: &AuditConfig, root: &Path, is_home: bool) -> Vec<IssueKind> {
    let mut check = MetadataCheck {
        doc,
        config,
        root,
        issues: Vec::new(),
    };
    check.run(is_home);
    check.issues
}

struct MetadataCheck<'a> {
    doc: &'a Html,
    config: &'a AuditConfig,
    root: &'a Path,
    issues: Vec<IssueKind>,
}

impl MetadataCheck<'_> {
    fn run(&mut self, is_home: bool) {
        let config = self.config;

        let page_title = match title(self.doc) {
            None => {
                self.issues.push(IssueKind::MissingTitle);
                None
            }
            Some(text) => {
                if text.chars().count() < MIN_TITLE_LENGTH {
                    self.issues.push(IssueKind::ShortTitle(text.clone()));
                }
                Some(text)
            }
        };

        let description = match meta(self.doc, "description") {
            None => {
                self.issues.push(IssueKind::MissingDescription);
                None
            }
            Some(content) => {
                let desc = content.unwrap_or_default().trim().to_string();
                if desc.chars().count() < MIN_DESCRIPTION_LENGTH {
                    self.issues.push(IssueKind::ShortDescription(desc.clone()));
                }
                Some(desc)
            }
        };

        if let (Some(desc), Some(default)) = (&description, &config.default_description) {
            if !is_home && desc == default.trim() {
                self.issues.push(IssueKind::DefaultDescription);
            }
        }

        if !config.social {
            return;
        }

        match &config.author {
            Some(author) => self.expect("author", author),
            None => {
                self.content("author", 1);
            }
        }

        if let Some(keywords) = self.content("keywords", 1) {
            if !keywords.split(',').any(|k| !k.trim().is_empty()) {
                self.issues.push(IssueKind::ShortContent {
                    tag: "meta keywords".to_string(),
                    content: keywords,
                    min: 1,
                });
            }
        }

        let canonical = self.canonical();

        let og_title = self.content("og:title", 1);
        let og_description = self.content("og:description", MIN_DESCRIPTION_LENGTH);
        let og_url = self.content("og:url", 1);
        if let Some(url) = &og_url {
            self.check_url("meta og:url", url, false);
        }
        let og_image = self.content("og:image", 1);
        if let Some(url) = &og_image {
            self.check_url("meta og:image", url, true);
        }
        self.expect("og:type", &config.og_type);

        self.expect("twitter:card", &config.twitter_card);
        let twitter_title = self.content("twitter:title", 1);
        let twitter_description = self.content("twitter:description", MIN_DESCRIPTION_LENGTH);
        let twitter_image = self.content("twitter:image", 1);
        if let Some(url) = &twitter_image {
            self.check_url("meta twitter:image", url, true);
        }

        self.agree("<title>", &page_title, "og:title", &og_title);
        self.agree("<title>", &page_title, "twitter:title", &twitter_title);
        self.agree("description", &description, "og:description", &og_description);
        self.agree(
            "description",
            &description,
            "twitter:description",
            &twitter_description,
        );
        self.agree("og:image", &og_image, "twitter:image", &twitter_image);
        self.agree("canonical", &canonical, "og:url", &og_url);
    }

    /// Trimmed content of a required meta tag.
    fn content(&mut self, key: &str, min: usize) -> Option<String> {
        let tag = format!("meta {key}");

        match meta(self.doc, key) {
            None => {
                self.issues.push(IssueKind::MissingTag(tag));
                None
            }
            Some(content) => {
                let content = content.unwrap_or_default().trim().to_string();
                if content.chars().count() < min.max(1) {
                    self.issues.push(IssueKind::ShortContent {
                        tag,
                        content: content.clone(),
                        min,
                    });
                }
                Some(content)
            }
        }
    }

    /// Require a meta tag with exactly `expected` as content.
    fn expect(&mut self, key: &str, expected: &str) {
        let tag = format!("meta {key}");

        match meta(self.doc, key) {
            None => self.issues.push(IssueKind::MissingTag(tag)),
            Some(found) if found.map(str::trim) != Some(expected) => {
                self.issues.push(IssueKind::UnexpectedContent {
                    tag,
                    expected: expected.to_string(),
                    found: found.unwrap_or_default().to_string(),
                })
            }
            Some(_) => {}
        }
    }

    fn canonical(&mut self) -> Option<String> {
        let href = self
            .doc
            .select(&LINK_REL)
            .find(|link| {
                link.value().attr("rel").is_some_and(|rel| {
                    rel.split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("canonical"))
                })
            })
            .and_then(|link| link.value().attr("href"))
            .map(|href| href.trim().to_string());

        match &href {
            None => self
                .issues
                .push(IssueKind::MissingTag("link rel=canonical".to_string())),
            Some(url) => self.check_url("link rel=canonical", url, false),
        }

        href
    }

    /// Check that `raw` is absolute and belongs to the site.
    ///
    /// Images may live on other hosts; those on the site must exist in the output.
    fn check_url(&mut self, tag: &str, raw: &str, image: bool) {
        let config = self.config;
        let invalid = |reason: String| IssueKind::InvalidUrl {
            tag: tag.to_string(),
            url: raw.to_string(),
            reason,
        };

        if !Url::parse(raw).is_ok_and(|url| url.has_host()) {
            self.issues.push(invalid("not an absolute URL".to_string()));
            return;
        }

        let Some(site) = &config.site_url else {
            return;
        };
        let site = site.trim_end_matches('/');

        let Some(rest) = raw.strip_prefix(site) else {
            if !image {
                self.issues.push(invalid(format!("not under {site}")));
            }
            return;
        };

        if image {
            let path = rest.split(['?', '#']).next().unwrap_or_default();
            let relative = decode(path.trim_start_matches('/'));
            if !self.root.join(&relative).is_file() {
                self.issues
                    .push(invalid(format!("{relative} is not in the output")));
            }
        }
    }

    fn agree(&mut self, first: &str, a: &Option<String>, second: &str, b: &Option<String>) {
        if let (Some(a), Some(b)) = (a, b) {
            if a != b {
                self.issues.push(IssueKind::Mismatch {
                    first: first.to_string(),
                    second: second.to_string(),
                });
            }
        }
    }
}

/// Link targets of `a`, `img`, `script` and asset `link` tags.
fn references(doc: &Html) -> Vec<String> {
    doc.select(&REFERENCES)
        .filter_map(|tag| {
            let element = tag.value();
            let target = match element.name() {
                "img" | "script" => element.attr("src"),
                "link" => {
                    let rel = element.attr("rel")?.to_ascii_lowercase();
                    if !rel.split_whitespace().any(|r| CHECKED_RELS.contains(&r)) {
                        return None;
                    }
                    element.attr("href")
                }
                _ => element.attr("href"),
            };
            target.map(str::to_string)
        })
        .collect()
}

/// Values of `id` attributes and `name` attributes of anchors.
fn collect_anchors(doc: &Html) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();

    for tag in doc.select(&ANCHORS) {
        let element = tag.value();
        if let Some(id) = element.attr("id") {
            ids.insert(id.to_string());
        }
        if element.name() == "a" {
            if let Some(name) = element.attr("name") {
                ids.insert(name.to_string());
            }
        }
    }

    ids
}

/// A resolved internal link.
pub(crate) struct LinkTarget {
    /// Path relative to the output root, `None` when it escapes the root
    path: Option<PathBuf>,
    fragment: Option<String>,
    /// Whether the link explicitly names a directory
    directory: bool,
}

/// Resolve an internal link from a page; `None` for links that are not checked.
pub(crate) fn resolve_link(href: &str, page: &Path) -> Option<LinkTarget> {
    let href = href.trim();
    let lowered = href.to_ascii_lowercase();

    if href.is_empty()
        || SKIPPED_SCHEMES.iter().any(|s| lowered.starts_with(s))
        || href.starts_with("//")
        || href.contains("://")
    {
        return None;
    }

    let (without_fragment, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(decode(fragment)).filter(|f| !f.is_empty())),
        None => (href, None),
    };
    let path_part = decode(
        without_fragment
            .split_once('?')
            .map_or(without_fragment, |(p, _)| p),
    );

    if path_part.is_empty() {
        return Some(LinkTarget {
            path: Some(page.to_path_buf()),
            fragment,
            directory: false,
        });
    }

    let base = if path_part.starts_with('/') {
        PathBuf::new()
    } else {
        page.parent().map(Path::to_path_buf).unwrap_or_default()
    };

    Some(LinkTarget {
        path: join_within_root(&base, path_part.trim_start_matches('/')),
        fragment,
        directory: path_part.ends_with('/'),
    })
}

/// Percent-decode a URL component, keeping it as is when it is not valid UTF-8.
fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

/// Lexically join `link` onto `base`, refusing to leave the root.
fn join_within_root(base: &Path, link: &str) -> Option<PathBuf> {
    let mut joined = base.to_path_buf();

    for component in Path::new(link).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::ParentDir => {
                if !joined.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(joined)
}

/// Find the file a link points to; directories resolve to their `index.html`.
pub(crate) fn locate(root: &Path, target: &LinkTarget) -> Result<PathBuf, String> {
    let mut relative = target
        .path
        .clone()
        .ok_or_else(|| "points outside the site".to_string())?;

    if target.directory || root.join(&relative).is_dir() {
        relative.push("index.html");
        if !root.join(&relative).is_file() {
            return Err(format!(
                "directory has no index.html: {}",
                url_path(relative.parent().unwrap_or(Path::new("")))
            ));
        }
    } else if !root.join(&relative).is_file() {
        return Err(format!("file not found: {}", url_path(&relative)));
    }

    Ok(relative)
}

/// Check that a link target and its anchor exist; returns the HTML page it points to, if any.
fn check_target(
    root: &Path,
    target: &LinkTarget,
    anchors: &BTreeMap<PathBuf, BTreeSet<String>>,
) -> Result<Option<PathBuf>, String> {
    let relative = locate(root, target)?;

    if !is_html(&relative) {
        return Ok(None);
    }

    if let Some(fragment) = &target.fragment {
        if !anchors
            .get(&relative)
            .is_some_and(|ids| ids.contains(fragment))
        {
            return Err(format!(
                "anchor #{} not found in {}",
                fragment,
                url_path(&relative)
            ));
        }
    }

    Ok(Some(relative))
}

fn is_html(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("html")
}

pub(crate) fn url_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
