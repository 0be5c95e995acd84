//! Template engine for composing pages into the shared layout.

use std::path::Path;
use std::sync::LazyLock;

use minijinja::{path_loader, Environment, Error, ErrorKind, UndefinedBehavior};
use regex::Regex;

use crate::context::RenderContext;

/// Matches a template whose first tag is `{% extends ... %}`.
static EXTENDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*(?:\{#.*?#\}\s*)*\{%[-+]?\s*extends\b").expect("valid extends pattern")
});

/// Captures the parent of a template that starts with a literal `{% extends "..." %}`.
static EXTENDS_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\A\s*(?:\{#.*?#\}\s*)*\{%[-+]?\s*extends\s+(?:"([^"]+)"|'([^']+)')"#)
        .expect("valid extends target pattern")
});

/// Longest `extends` chain followed when looking for the slot block.
const MAX_LAYOUT_DEPTH: usize = 16;

/// Template engine using minijinja, bound to a templates directory.
pub struct TemplateEngine {
    env: Environment<'static>,
    layout: String,
    slot: String,
    slot_pattern: Regex,
}

impl TemplateEngine {
    /// Create an engine loading templates from `templates_dir`.
    ///
    /// Content fragments are rendered into `slot`, a `{% block %}` of the
    /// `layout` template. With `strict` set, undefined variables are errors.
    pub fn new(
        templates_dir: &Path,
        layout: impl Into<String>,
        slot: impl Into<String>,
        strict: bool,
    ) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(templates_dir));
        env.set_undefined_behavior(if strict {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Lenient
        });

        let slot = slot.into();
        let slot_pattern = Regex::new(&format!(
            r"\{{%[-+]?\s*block\s+{}\s*[-+]?%\}}",
            regex::escape(&slot)
        ))
        .expect("escaped slot pattern");

        Self {
            env,
            layout: layout.into(),
            slot,
            slot_pattern,
        }
    }

    /// Name of the layout template.
    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// Load and compile a template without rendering it.
    pub fn check(&self, name: &str) -> Result<(), Error> {
        self.env.get_template(name).map(|_| ())
    }

    /// Whether `name` is a bare fragment that needs the layout wrapped around it.
    pub fn is_fragment(&self, name: &str) -> Result<bool, Error> {
        let tmpl = self.env.get_template(name)?;
        Ok(!EXTENDS.is_match(tmpl.source()))
    }

    /// Ensure the layout exists, compiles and declares the slot block.
    ///
    /// The block may come from the layout itself or from any template it
    /// extends. A parent chosen by an expression cannot be followed and is
    /// accepted as is.
    pub fn check_layout(&self) -> Result<(), Error> {
        let mut name = self.layout.clone();

        for _ in 0..MAX_LAYOUT_DEPTH {
            let tmpl = self.env.get_template(&name)?;
            let source = tmpl.source();

            if self.slot_pattern.is_match(source) {
                return Ok(());
            }

            if !EXTENDS.is_match(source) {
                break;
            }

            match EXTENDS_TARGET
                .captures(source)
                .and_then(|c| c.get(1).or_else(|| c.get(2)))
            {
                Some(parent) => name = parent.as_str().to_string(),
                None => return Ok(()),
            }
        }

        Err(Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "layout {} has no {{% block {} %}} to receive page content",
                self.layout, self.slot
            ),
        ))
    }

    /// Render a page from its content template.
    ///
    /// Templates that extend a layout themselves render as-is; fragments are
    /// included into the slot of the configured layout.
    pub fn render_page(&self, template: &str, ctx: &RenderContext) -> Result<String, Error> {
        let tmpl = self.env.get_template(template)?;

        if EXTENDS.is_match(tmpl.source()) {
            return tmpl.render(ctx);
        }

        let wrapper = format!(
            "{{% extends {} %}}{{% block {} %}}{{% include {} %}}{{% endblock %}}",
            quote(&self.layout),
            self.slot,
            quote(template)
        );

        // The wrapper name ends in the layout's name so auto-escaping follows
        // the layout's extension.
        self.env
            .render_named_str(&format!("{} in {}", template, self.layout), &wrapper, ctx)
    }
}

/// Innermost template error behind include and extends wrappers.
pub fn root_cause(err: &Error) -> &Error {
    let mut current = err;
    while let Some(inner) =
        std::error::Error::source(current).and_then(|e| e.downcast_ref::<Error>())
    {
        current = inner;
    }
    current
}

/// Quote a template name as a template string literal.
fn quote(name: &str) -> String {
    serde_json::Value::from(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const LAYOUT: &str = "<html><head><title>{{ title }}</title></head>\
<body>{% block content %}{% endblock %}</body></html>";

    fn engine_with(files: &[(&str, &str)], strict: bool) -> (tempfile::TempDir, TemplateEngine) {
        let temp = tempdir().unwrap();
        for (name, source) in files {
            let path = temp.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, source).unwrap();
        }
        let engine = TemplateEngine::new(temp.path(), "base.html", "content", strict);
        (temp, engine)
    }

    fn titled(title: &str) -> RenderContext {
        let mut ctx = RenderContext::new();
        ctx.insert("title", title);
        ctx
    }

    #[test]
    fn renders_fragment_into_layout() {
        let (_temp, engine) = engine_with(
            &[("base.html", LAYOUT), ("home_content.html", "<p>Welcome</p>")],
            true,
        );

        let html = engine.render_page("home_content.html", &titled("Home")).unwrap();

        assert!(html.contains("<title>Home</title>"));
        assert!(html.contains("<body><p>Welcome</p></body>"));
    }

    #[test]
    fn renders_extending_template_directly() {
        let (_temp, engine) = engine_with(
            &[
                ("base.html", LAYOUT),
                ("site.html", "<main>{% block content %}{% endblock %}</main>"),
                (
                    "about_content.html",
                    "{# about page #}{% extends \"site.html\" %}{% block content %}About {{ title }}{% endblock %}",
                ),
            ],
            true,
        );

        assert!(!engine.is_fragment("about_content.html").unwrap());

        let html = engine.render_page("about_content.html", &titled("Me")).unwrap();

        assert!(html.contains("<main>About Me</main>"));
        assert!(!html.contains("<title>"));
    }

    #[test]
    fn escapes_variables_in_html_templates() {
        let (_temp, engine) = engine_with(
            &[("base.html", LAYOUT), ("home_content.html", "{{ title }}")],
            true,
        );

        let html = engine
            .render_page("home_content.html", &titled("<b>"))
            .unwrap();

        assert!(html.contains("<title>&lt;b&gt;</title>"));
        assert!(html.contains("<body>&lt;b&gt;</body>"));
    }

    #[test]
    fn plain_text_layout_is_not_escaped() {
        let (_temp, engine) = engine_with(
            &[
                ("base.txt", "{{ title }}|{% block content %}{% endblock %}"),
                ("notes_content.html", "x"),
            ],
            true,
        );
        let engine = TemplateEngine {
            layout: "base.txt".to_string(),
            ..engine
        };

        let html = engine.render_page("notes_content.html", &titled("<b>")).unwrap();

        assert_eq!(html, "<b>|x");
    }

    #[test]
    fn strict_mode_rejects_undefined() {
        let (_temp, engine) = engine_with(
            &[("base.html", LAYOUT), ("home_content.html", "{{ missing }}")],
            true,
        );

        let err = engine
            .render_page("home_content.html", &titled("Home"))
            .unwrap_err();

        assert_eq!(root_cause(&err).kind(), ErrorKind::UndefinedError);
    }

    #[test]
    fn missing_partial_surfaces_as_not_found() {
        let (_temp, engine) = engine_with(
            &[
                ("base.html", LAYOUT),
                ("home_content.html", "{% include \"partials/nav.html\" %}"),
            ],
            true,
        );

        let err = engine
            .render_page("home_content.html", &titled("Home"))
            .unwrap_err();

        let cause = root_cause(&err);
        assert_eq!(cause.kind(), ErrorKind::TemplateNotFound);
        assert!(cause.to_string().contains("partials/nav.html"));
    }

    #[test]
    fn lenient_mode_renders_undefined_as_empty() {
        let (_temp, engine) = engine_with(
            &[("base.html", LAYOUT), ("home_content.html", "[{{ missing }}]")],
            false,
        );

        let html = engine
            .render_page("home_content.html", &titled("Home"))
            .unwrap();

        assert!(html.contains("<body>[]</body>"));
    }

    #[test]
    fn reports_missing_template() {
        let (_temp, engine) = engine_with(&[("base.html", LAYOUT)], true);

        let err = engine.check("nope_content.html").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    }

    #[test]
    fn layout_without_slot_is_rejected() {
        let (_temp, engine) = engine_with(&[("base.html", "<html>{{ title }}</html>")], true);

        let err = engine.check_layout().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn layout_may_inherit_slot() {
        let (_temp, engine) = engine_with(
            &[
                (
                    "skeleton.html",
                    "<html>{% block head %}{% endblock %}<body>{% block content %}{% endblock %}</body></html>",
                ),
                (
                    "base.html",
                    "{% extends \"skeleton.html\" %}{% block head %}<title>{{ title }}</title>{% endblock %}",
                ),
                ("home_content.html", "<p>Hi</p>"),
            ],
            true,
        );

        engine.check_layout().unwrap();
        let html = engine.render_page("home_content.html", &titled("Home")).unwrap();

        assert!(html.contains("<title>Home</title>"));
        assert!(html.contains("<body><p>Hi</p></body>"));
    }

    #[test]
    fn inherited_layout_without_slot_is_rejected() {
        let (_temp, engine) = engine_with(
            &[
                ("skeleton.html", "<html>{% block head %}{% endblock %}</html>"),
                ("base.html", "{% extends 'skeleton.html' %}"),
            ],
            true,
        );

        let err = engine.check_layout().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn finds_templates_in_subdirectories() {
        let (_temp, engine) = engine_with(
            &[("base.html", LAYOUT), ("pages/blog_content.html", "<p>Blog</p>")],
            true,
        );

        let html = engine
            .render_page("pages/blog_content.html", &titled("Blog"))
            .unwrap();

        assert!(html.contains("<p>Blog</p>"));
    }
}
