// Liquid Templates
// Snippets and page templates compiled once with the `liquid` crate. Snippets
// are also registered as partials, so `{% include %}` and `{% esi_include %}`
// resolve them by name.

pub mod tags;

use liquid::partials::{EagerCompiler, InMemorySource};
use liquid::{Object, ParserBuilder, Template};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::middleware::store::STORE_ASSIGN;
use crate::models::request_context::{RequestContext, MAINTENANCE_ASSIGN};

pub use tags::{snippet_path, EsiIncludeTag, SITE_GLOBAL};

/// File extensions recognised as template sources
const TEMPLATE_EXTENSIONS: [&str; 2] = ["liquid", "html"];

type Partials = EagerCompiler<InMemorySource>;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Snippet not found: {0}")]
    SnippetNotFound(String),

    #[error("Liquid error: {0}")]
    Liquid(#[from] liquid::Error),

    #[error("Template IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;

// ============================================================================
// Sources
// ============================================================================

/// Raw snippet and page sources, compiled into a [`TemplateLibrary`]
#[derive(Debug, Clone, Default)]
pub struct TemplateSources {
    snippets: HashMap<String, String>,
    pages: HashMap<String, String>,
}

impl TemplateSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snippet(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.snippets.insert(name.into(), source.into());
        self
    }

    /// Page template for a handle (`index`, `product`, `account/register`)
    pub fn with_page(mut self, handle: impl Into<String>, source: impl Into<String>) -> Self {
        self.pages.insert(handle.into(), source.into());
        self
    }

    /// Load snippets and pages from disk. Names are the path relative to the
    /// directory without extension; a missing directory loads nothing.
    pub fn from_dirs(snippets_dir: impl AsRef<Path>, pages_dir: impl AsRef<Path>) -> Result<Self> {
        let mut sources = Self::new();
        load_dir(snippets_dir.as_ref(), &mut sources.snippets)?;
        load_dir(pages_dir.as_ref(), &mut sources.pages)?;

        tracing::info!(
            snippets = sources.snippets.len(),
            pages = sources.pages.len(),
            "Templates loaded"
        );
        Ok(sources)
    }

    /// Parse every source. Syntax errors and unknown tags fail here, not per request.
    pub fn compile(self) -> Result<TemplateLibrary> {
        let mut partials = Partials::empty();
        for (name, source) in &self.snippets {
            partials.add(name.clone(), source.clone());
        }

        let parser = ParserBuilder::with_stdlib()
            .tag(EsiIncludeTag::new())
            .partials(partials)
            .build()?;

        let parse_all = |sources: HashMap<String, String>| -> Result<HashMap<String, Template>> {
            sources
                .into_iter()
                .map(|(name, source)| {
                    parser
                        .parse(&source)
                        .map(|template| (name, template))
                        .map_err(RenderError::from)
                })
                .collect()
        };

        Ok(TemplateLibrary {
            snippets: parse_all(self.snippets)?,
            pages: parse_all(self.pages)?,
        })
    }
}

fn load_dir(dir: &Path, into: &mut HashMap<String, String>) -> Result<()> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "Template directory not found, nothing loaded");
        return Ok(());
    }

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }

            let is_template = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext));
            if !is_template {
                continue;
            }

            if let Some(name) = path
                .strip_prefix(dir)
                .ok()
                .map(|relative| relative.with_extension(""))
                .and_then(|relative| relative.to_str().map(|s| s.replace('\\', "/")))
            {
                into.insert(name, std::fs::read_to_string(&path)?);
            }
        }
    }

    Ok(())
}

// ============================================================================
// Library
// ============================================================================

#[derive(Default)]
pub struct TemplateLibrary {
    snippets: HashMap<String, Template>,
    pages: HashMap<String, Template>,
}

impl TemplateLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn snippet_count(&self) -> usize {
        self.snippets.len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn render_snippet(&self, name: &str, ctx: &RequestContext) -> Result<String> {
        let template = self
            .snippets
            .get(name)
            .ok_or_else(|| RenderError::SnippetNotFound(name.to_string()))?;
        Ok(template.render(&globals(ctx)?)?)
    }

    /// `None` when the site has no template for this handle
    pub fn render_page(&self, handle: &str, ctx: &RequestContext) -> Option<Result<String>> {
        let template = self.pages.get(handle)?;
        Some(globals(ctx).and_then(|globals| template.render(&globals).map_err(RenderError::from)))
    }
}

/// Liquid globals for a request: its assigns plus `locale`, `site` and the
/// store defaults every template may rely on
pub fn globals(ctx: &RequestContext) -> Result<Object> {
    let mut assigns = ctx.liquid_assigns.clone();

    assigns
        .entry(MAINTENANCE_ASSIGN)
        .or_insert(Value::Bool(false));
    assigns
        .entry(STORE_ASSIGN)
        .or_insert_with(|| Value::Object(Map::new()));
    assigns.insert("locale".to_string(), Value::String(ctx.locale.clone()));
    assigns.insert(
        SITE_GLOBAL.to_string(),
        json!({
            "handle": ctx.site.handle,
            "default_locale": ctx.site.default_locale,
            "locales": ctx.site.locales,
            "prefix_default_locale": ctx.site.prefix_default_locale,
            "edge_side_includes": ctx.site.edge_side_includes,
        }),
    );

    Ok(liquid::model::to_object(&Value::Object(assigns))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Site;
    use axum::http::Method;
    use std::sync::Arc;

    fn site(edge_side_includes: bool) -> Site {
        serde_json::from_value(json!({
            "handle": "shop",
            "default_locale": "en",
            "locales": ["en", "fr"],
            "edge_side_includes": edge_side_includes
        }))
        .unwrap()
    }

    fn request(edge_side_includes: bool) -> RequestContext {
        let mut ctx = RequestContext::new(Arc::new(site(edge_side_includes)), Method::GET, "/");
        ctx.assign("store", json!({"cart": {"count": 3}}));
        ctx.assign("title", "Shoes");
        ctx
    }

    #[test]
    fn test_variables_are_resolved_from_assigns() {
        let library = TemplateSources::new()
            .with_snippet("summary", "{{ title }}: {{ store.cart.count }} in {{ locale }}")
            .compile()
            .unwrap();

        let output = library.render_snippet("summary", &request(false)).unwrap();
        assert_eq!(output, "Shoes: 3 in en");
    }

    #[test]
    fn test_nested_includes() {
        let library = TemplateSources::new()
            .with_snippet("header", "<h1>{{ title }}</h1>{% include 'cart' %}")
            .with_snippet("cart", "<span>{{ store.cart.count }}</span>")
            .compile()
            .unwrap();

        let output = library.render_snippet("header", &request(false)).unwrap();
        assert_eq!(output, "<h1>Shoes</h1><span>3</span>");
    }

    #[test]
    fn test_assign_values_are_rendered_verbatim() {
        let library = TemplateSources::new()
            .with_snippet("hello", "Hi {{ name }}")
            .with_snippet("page", "{% include 'hello' %}")
            .compile()
            .unwrap();

        let mut ctx = request(false);
        ctx.assign("name", "{{ secret }}");
        ctx.assign("secret", "LEAKED");

        let output = library.render_snippet("page", &ctx).unwrap();
        assert_eq!(output, "Hi {{ secret }}");
    }

    #[test]
    fn test_esi_include_emits_esi_element() {
        let library = TemplateSources::new()
            .with_snippet("header", "<h1>inline</h1>")
            .with_snippet("layout", "{% esi_include 'header' %}")
            .compile()
            .unwrap();

        let mut ctx = request(true);
        assert_eq!(
            library.render_snippet("layout", &ctx).unwrap(),
            "<esi:include src=\"/snippet/header\"/>"
        );

        ctx.locale = "fr".to_string();
        assert_eq!(
            library.render_snippet("layout", &ctx).unwrap(),
            "<esi:include src=\"/fr/snippet/header\"/>"
        );
    }

    #[test]
    fn test_esi_include_falls_back_to_inline() {
        let library = TemplateSources::new()
            .with_snippet("header", "<h1>{{ title }}</h1>")
            .with_snippet("layout", "{% esi_include 'header' %}")
            .compile()
            .unwrap();

        let output = library.render_snippet("layout", &request(false)).unwrap();
        assert_eq!(output, "<h1>Shoes</h1>");
    }

    #[test]
    fn test_unknown_tag_fails_at_compile_time() {
        let result = TemplateSources::new()
            .with_snippet("broken", "{% section 'x' %}")
            .compile();
        assert!(matches!(result, Err(RenderError::Liquid(_))));
    }

    #[test]
    fn test_unknown_snippet() {
        let library = TemplateLibrary::empty();
        assert!(matches!(
            library.render_snippet("missing", &request(false)),
            Err(RenderError::SnippetNotFound(_))
        ));
    }

    #[test]
    fn test_page_sees_store_defaults() {
        let library = TemplateSources::new()
            .with_page("index", "{% if store_maintenance %}closed{% else %}open{% endif %}")
            .compile()
            .unwrap();

        let mut ctx = request(false);
        assert_eq!(library.render_page("index", &ctx).unwrap().unwrap(), "open");

        ctx.assign(MAINTENANCE_ASSIGN, true);
        assert_eq!(library.render_page("index", &ctx).unwrap().unwrap(), "closed");

        assert!(library.render_page("product", &ctx).is_none());
    }

    #[test]
    fn test_from_missing_dirs_is_empty() {
        let library = TemplateSources::from_dirs("/definitely/not/here", "/nor/here")
            .unwrap()
            .compile()
            .unwrap();
        assert_eq!(library.snippet_count(), 0);
        assert_eq!(library.page_count(), 0);
    }
}
