use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::dom::Document;

/// Matches the distribution name in a script path, e.g. `cake-spa.js`,
/// `cake_spa_bg.wasm` or `cake_s_p_a/js/...`.
static DISTRIBUTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*?)cake[_-]?s[_-]?p[_-]?a").expect("distribution name pattern")
});

/// Determines the root URL action paths are resolved against.
///
/// Sources in priority order: a `<base href>` element, a
/// `<meta name="base-url">` tag, the path the runtime's own script was served
/// from, and finally the page origin. The result always ends with exactly one
/// trailing slash. With `debug` set, the winning source is traced.
pub fn detect(document: &Document, location: &Url, debug: bool) -> String {
    let (detected, source) = from_base_element(document, location)
        .map(|base| (base, "<base> tag"))
        .or_else(|| from_meta(document, location).map(|base| (base, "meta tag")))
        .or_else(|| from_script_src(document, location).map(|base| (base, "script src")))
        .unwrap_or_else(|| (format!("{}/", origin(location)), "origin fallback"));

    let base_url = with_trailing_slash(detected);
    if debug {
        debug!(target = "cake_spa", %base_url, source, "detected base URL");
    }
    base_url
}

fn from_base_element(document: &Document, location: &Url) -> Option<String> {
    let href = document.query("base[href]")?.attr("href")?;
    location.join(&href).ok().map(String::from)
}

fn from_meta(document: &Document, location: &Url) -> Option<String> {
    let content = document
        .query(r#"meta[name="base-url"]"#)?
        .attr("content")
        .filter(|content| !content.is_empty())?;
    if content.starts_with("http") {
        Some(content)
    } else {
        Some(format!("{}{content}", origin(location)))
    }
}

fn from_script_src(document: &Document, location: &Url) -> Option<String> {
    document.query_all("script[src]").into_iter().find_map(|script| {
        let src = location.join(&script.attr("src")?).ok()?;
        let captures = DISTRIBUTION_NAME.captures(src.path())?;
        let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        Some(format!("{}{prefix}", origin(&src)))
    })
}

fn origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(head: &str) -> Document {
        Document::parse(&format!("<!DOCTYPE html><html><head>{head}</head><body></body></html>"))
    }

    fn location() -> Url {
        Url::parse("https://example.test/app/posts/index?page=2").unwrap()
    }

    #[test]
    fn base_element_wins() {
        let document = page(
            r#"<base href="/app/"><meta name="base-url" content="/other/"><script src="/x/cake-spa.js"></script>"#,
        );
        assert_eq!(detect(&document, &location(), false), "https://example.test/app/");
    }

    #[test]
    fn meta_relative_and_absolute() {
        let relative = page(r#"<meta name="base-url" content="/sub">"#);
        assert_eq!(detect(&relative, &location(), false), "https://example.test/sub/");

        let absolute = page(r#"<meta name="base-url" content="https://cdn.test/root/">"#);
        assert_eq!(detect(&absolute, &location(), false), "https://cdn.test/root/");
    }

    #[test]
    fn script_src_prefix() {
        let document = page(
            r#"<script src="/vendor/app.js"></script><script src="/cakephp/Cake_S_P_A/js/cake-spa.js"></script>"#,
        );
        assert_eq!(detect(&document, &location(), false), "https://example.test/cakephp/");

        let wasm = page(r#"<script src="pkg/cake_spa.js"></script>"#);
        assert_eq!(detect(&wasm, &location(), false), "https://example.test/app/posts/pkg/");
    }

    #[test]
    fn falls_back_to_origin() {
        let document = page("");
        assert_eq!(detect(&document, &location(), false), "https://example.test/");
    }

    #[test]
    fn detection_is_stable() {
        let document = page(r#"<meta name="base-url" content="/sub">"#);
        let first = detect(&document, &location(), false);
        let second = detect(&document, &location(), false);
        assert_eq!(first, second);
        assert!(first.ends_with('/') && !first.ends_with("//"));
    }
}
