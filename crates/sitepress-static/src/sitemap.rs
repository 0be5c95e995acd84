//! Sitemap generation for the built output tree.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use walkdir::WalkDir;

const CHANGE_FREQUENCY: &str = "monthly";

/// One `<url>` entry of the sitemap.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    /// Last modification date (`YYYY-MM-DD`)
    pub lastmod: String,
    pub priority: &'static str,
}

/// Errors that can occur while generating a sitemap.
#[derive(Debug, thiserror::Error)]
pub enum SitemapError {
    #[error("Output directory not found: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("Failed to read {}: {message}", .path.display())]
    ReadError { path: PathBuf, message: String },

    #[error("Failed to write sitemap: {0}")]
    WriteError(String),
}

/// Public URL of a page, given its path relative to the output directory.
///
/// `index.html` maps to its directory and the site root maps to `base_url`
/// itself, without a trailing slash.
pub fn page_url(base_url: &str, relative: &Path) -> String {
    let base = base_url.trim_end_matches('/');
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let path = relative.strip_suffix("index.html").unwrap_or(&relative);

    format!("{}/{}", base, path).trim_end_matches('/').to_string()
}

/// Collect an entry for every `.html` file under `output_dir`, sorted by URL.
pub fn collect_entries(output_dir: &Path, base_url: &str) -> Result<Vec<SitemapEntry>, SitemapError> {
    if !output_dir.is_dir() {
        return Err(SitemapError::MissingOutput(output_dir.to_path_buf()));
    }

    let root = base_url.trim_end_matches('/');
    let mut entries = Vec::new();

    for entry in WalkDir::new(output_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();

        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("html")
        {
            continue;
        }

        let relative = path.strip_prefix(output_dir).unwrap_or(path);
        let modified = entry
            .metadata()
            .map_err(|e| e.to_string())
            .and_then(|m| m.modified().map_err(|e| e.to_string()))
            .map_err(|message| SitemapError::ReadError {
                path: path.to_path_buf(),
                message,
            })?;

        let loc = page_url(base_url, relative);
        let priority = if loc == root { "1.0" } else { "0.8" };

        entries.push(SitemapEntry {
            loc,
            lastmod: DateTime::<Local>::from(modified)
                .format("%Y-%m-%d")
                .to_string(),
            priority,
        });
    }

    entries.sort_by(|a, b| a.loc.cmp(&b.loc));

    Ok(entries)
}

/// Render sitemap XML.
pub fn render_sitemap(entries: &[SitemapEntry]) -> String {
    let urls: Vec<String> = entries
        .iter()
        .map(|entry| {
            format!(
                "  <url>\n    <loc>{}</loc>\n    <lastmod>{}</lastmod>\n    <changefreq>{}</changefreq>\n    <priority>{}</priority>\n  </url>",
                escape_xml(&entry.loc),
                entry.lastmod,
                CHANGE_FREQUENCY,
                entry.priority
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{}
</urlset>
"#,
        urls.join("\n")
    )
}

/// Write `sitemap.xml` into the output directory.
pub fn write_sitemap(output_dir: &Path, base_url: &str) -> Result<PathBuf, SitemapError> {
    let entries = collect_entries(output_dir, base_url)?;
    let path = output_dir.join("sitemap.xml");

    fs::write(&path, render_sitemap(&entries))
        .map_err(|e| SitemapError::WriteError(e.to_string()))?;

    tracing::info!("Sitemap with {} URLs written to {}", entries.len(), path.display());

    Ok(path)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn maps_paths_to_urls() {
        let base = "https://example.com/";

        assert_eq!(page_url(base, Path::new("index.html")), "https://example.com");
        assert_eq!(
            page_url(base, Path::new("ensino/index.html")),
            "https://example.com/ensino"
        );
        assert_eq!(
            page_url(base, Path::new("eletronica-potencia.html")),
            "https://example.com/eletronica-potencia.html"
        );
    }

    #[test]
    fn collects_html_pages_only() {
        let temp = tempdir().unwrap();
        let out = temp.path();
        fs::create_dir_all(out.join("ensino")).unwrap();
        fs::write(out.join("index.html"), "home").unwrap();
        fs::write(out.join("ensino/index.html"), "ensino").unwrap();
        fs::write(out.join("about.html"), "about").unwrap();
        fs::write(out.join("style.css"), "body {}").unwrap();

        let entries = collect_entries(out, "https://example.com").unwrap();

        let locs: Vec<_> = entries.iter().map(|e| e.loc.as_str()).collect();
        assert_eq!(
            locs,
            vec![
                "https://example.com",
                "https://example.com/about.html",
                "https://example.com/ensino"
            ]
        );
        assert_eq!(entries[0].priority, "1.0");
        assert_eq!(entries[1].priority, "0.8");
        assert_eq!(entries[0].lastmod.len(), 10);
    }

    #[test]
    fn writes_sitemap_xml() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("index.html"), "home").unwrap();

        let path = write_sitemap(temp.path(), "https://example.com").unwrap();

        let xml = fs::read_to_string(path).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<loc>https://example.com</loc>"));
        assert!(xml.contains("<changefreq>monthly</changefreq>"));
        assert!(xml.contains("<priority>1.0</priority>"));
    }

    #[test]
    fn missing_output_is_an_error() {
        let temp = tempdir().unwrap();

        let err = collect_entries(&temp.path().join("nope"), "https://example.com").unwrap_err();

        assert!(matches!(err, SitemapError::MissingOutput(_)));
    }
}
