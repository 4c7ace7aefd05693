use crate::config::SpaConfig;
use crate::dom::Document;

/// Reads the CSRF token from the configured meta tag, falling back to the
/// hidden form input.
pub fn extract(document: &Document, config: &SpaConfig) -> Option<String> {
    if let Some(meta) = document.query(&format!(r#"meta[name="{}"]"#, config.csrf_meta_name)) {
        return meta.attr("content");
    }

    document
        .query(&format!(r#"input[name="{}"]"#, config.csrf_input_name))
        .map(|input| input.value())
}
