//! Render context passed to page templates.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::page::PageDescriptor;

/// Variable bindings for rendering one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderContext {
    vars: BTreeMap<String, Value>,
}

impl RenderContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for a page.
    ///
    /// Navigation variables derived from the output path are bound first,
    /// then overridden by site variables, page variables and the page title.
    pub fn for_page(
        page: &PageDescriptor,
        site_vars: &BTreeMap<String, Value>,
        stylesheet: &str,
    ) -> Self {
        let nav_prefix = "../".repeat(page.depth());

        let mut ctx = Self::new();
        ctx.insert("current_page", page.name.as_str());
        ctx.insert("is_home", page.is_home());
        ctx.insert("css_path", format!("{nav_prefix}{stylesheet}"));
        ctx.insert("assets_prefix", format!("{nav_prefix}assets/"));
        ctx.insert("page_path", page.url_path());
        ctx.insert("nav_prefix", nav_prefix);

        ctx.extend(site_vars);
        ctx.extend(&page.vars);

        if let Some(title) = &page.title {
            ctx.insert("title", title.as_str());
        }

        ctx
    }

    /// Bind a variable, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Bind every variable in `vars`.
    pub fn extend(&mut self, vars: &BTreeMap<String, Value>) {
        self.vars
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
