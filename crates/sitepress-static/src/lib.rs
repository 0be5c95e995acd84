//! Static page assembly for sitepress.
//!
//! Renders content fragments into a shared minijinja layout and writes the
//! resulting HTML tree for static hosting.

pub mod assembler;
pub mod audit;
pub mod context;
pub mod page;
pub mod sitemap;
pub mod suggest;
pub mod templates;

pub use assembler::{BuildConfig, BuildError, BuildResult, OutputArtifact, PageAssembler};
pub use audit::{audit_site, AuditConfig, AuditError, AuditIssue, AuditReport, IssueKind};
pub use context::RenderContext;
pub use page::{PageDescriptor, PathError, CONTENT_SUFFIX};
pub use sitemap::{write_sitemap, SitemapEntry, SitemapError};
pub use suggest::{suggest_links, LinkSuggestion};
pub use templates::TemplateEngine;
