// Liquid Tags
// `esi_include` defers a snippet to the edge cache with an `<esi:include/>`
// element when the site enables ESI, and renders it inline otherwise.
// Plain `{% include %}` is the liquid stdlib tag over the same partials.

use std::io::Write;

use liquid_core::error::ResultLiquidReplaceExt;
use liquid_core::model::ScalarCow;
use liquid_core::{
    Error, Expression, Language, ParseTag, Renderable, Result, Runtime, TagReflection,
    TagTokenIter, ValueView,
};

use crate::config::Site;

/// Global carrying the site flags the tags read at render time
pub const SITE_GLOBAL: &str = "site";

/// Public path of a snippet for the given locale
pub fn snippet_path(site: &Site, locale: &str, name: &str) -> String {
    localized_snippet_path(site.prefix_default_locale, &site.default_locale, locale, name)
}

fn localized_snippet_path(
    prefix_default_locale: bool,
    default_locale: &str,
    locale: &str,
    name: &str,
) -> String {
    if prefix_default_locale || locale != default_locale {
        format!("/{}/snippet/{}", locale, name)
    } else {
        format!("/snippet/{}", name)
    }
}

/// Snippet names are path segments: no dots, no leading slash
fn validate_snippet_name(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && !name.starts_with('/')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/'));

    if valid {
        Ok(name)
    } else {
        Err(Error::with_msg(format!("Invalid snippet name: {:?}", name)))
    }
}

fn global_str(runtime: &dyn Runtime, path: &[&str]) -> Option<String> {
    let path: Vec<ScalarCow<'_>> = path.iter().map(|segment| ScalarCow::new(*segment)).collect();
    runtime.try_get(&path).map(|value| value.render().to_string())
}

fn global_flag(runtime: &dyn Runtime, path: &[&str]) -> bool {
    let path: Vec<ScalarCow<'_>> = path.iter().map(|segment| ScalarCow::new(*segment)).collect();
    runtime
        .try_get(&path)
        .and_then(|value| value.as_scalar().and_then(|scalar| scalar.to_bool()))
        .unwrap_or(false)
}

// ============================================================================
// esi_include
// ============================================================================

#[derive(Clone, Copy, Debug, Default)]
pub struct EsiIncludeTag;

impl EsiIncludeTag {
    pub fn new() -> Self {
        Self
    }
}

impl TagReflection for EsiIncludeTag {
    fn tag(&self) -> &str {
        "esi_include"
    }

    fn description(&self) -> &str {
        "Include a snippet through an edge side include when the site enables them."
    }
}

impl ParseTag for EsiIncludeTag {
    fn parse(
        &self,
        mut arguments: TagTokenIter<'_>,
        _options: &Language,
    ) -> Result<Box<dyn Renderable>> {
        let name = arguments.expect_next("Snippet name expected.")?;
        let name = name.expect_value().into_result()?;
        arguments.expect_nothing()?;

        Ok(Box::new(EsiInclude { name }))
    }

    fn reflection(&self) -> &dyn TagReflection {
        self
    }
}

#[derive(Debug)]
struct EsiInclude {
    name: Expression,
}

impl Renderable for EsiInclude {
    fn render_to(&self, writer: &mut dyn Write, runtime: &dyn Runtime) -> Result<()> {
        let name = self.name.evaluate(runtime)?.render().to_string();
        let name = validate_snippet_name(&name)?;

        if !global_flag(runtime, &[SITE_GLOBAL, "edge_side_includes"]) {
            let partial = runtime.partials().get(name)?;
            return partial.render_to(writer, runtime);
        }

        let default_locale = global_str(runtime, &[SITE_GLOBAL, "default_locale"]).unwrap_or_default();
        let locale = global_str(runtime, &["locale"]).unwrap_or_else(|| default_locale.clone());
        let prefix = global_flag(runtime, &[SITE_GLOBAL, "prefix_default_locale"]);

        write!(
            writer,
            "<esi:include src=\"{}\"/>",
            localized_snippet_path(prefix, &default_locale, &locale, name)
        )
        .replace("Failed to render")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site(prefix_default_locale: bool) -> Site {
        serde_json::from_value(json!({
            "handle": "shop",
            "default_locale": "en",
            "locales": ["en", "fr"],
            "prefix_default_locale": prefix_default_locale
        }))
        .unwrap()
    }

    #[test]
    fn test_snippet_path() {
        let plain = site(false);
        assert_eq!(snippet_path(&plain, "en", "header"), "/snippet/header");
        assert_eq!(snippet_path(&plain, "fr", "header"), "/fr/snippet/header");

        let prefixed = site(true);
        assert_eq!(snippet_path(&prefixed, "en", "header"), "/en/snippet/header");
    }

    #[test]
    fn test_snippet_name_validation() {
        assert_eq!(validate_snippet_name("mini-cart").unwrap(), "mini-cart");
        assert_eq!(validate_snippet_name("blocks/footer").unwrap(), "blocks/footer");
        assert!(validate_snippet_name("").is_err());
        assert!(validate_snippet_name("../secret").is_err());
        assert!(validate_snippet_name("/etc/passwd").is_err());
    }
}
