use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::task::spawn_local;
use tokio::time::sleep;

use crate::config::{AttributeNames, SpaConfig};
use crate::dom::{Document, Element};
use crate::net::Payload;

/// Form controls whose `value` receives patched data.
const VALUE_TAGS: &[&str] = &["input", "textarea", "select"];

/// Writes response data into bound elements.
#[derive(Debug, Clone)]
pub struct Patcher {
    model_attr: String,
    unsafe_html_attr: String,
    class_attr: String,
    updating_class: String,
    pulse: Duration,
}

impl Patcher {
    pub fn new(config: &SpaConfig, names: &AttributeNames) -> Self {
        Self {
            model_attr: names.model.clone(),
            unsafe_html_attr: names.unsafe_html.clone(),
            class_attr: names.class.clone(),
            updating_class: config.updating_class.clone(),
            pulse: Duration::from_millis(config.update_pulse),
        }
    }

    /// Writes `value` into `element` and pulses the updating class.
    ///
    /// Elements marked with the unsafe-html attribute receive the value as
    /// raw markup with no escaping; only trusted, pre-sanitized content may
    /// be bound to them.
    pub fn update_element(&self, element: &Element, value: &JsonValue) {
        let rendered = render_value(value);
        element.add_class(&self.updating_class);

        if element.has_attr(&self.unsafe_html_attr) {
            element.set_inner_html(&rendered);
        } else if element.has_attr(&self.class_attr) {
            element.set_attr("class", &rendered);
            element.add_class(&self.updating_class);
        } else if element.is_tag(VALUE_TAGS) {
            element.set_value(&rendered);
        } else {
            element.set_text(&rendered);
        }

        let element = element.clone();
        let class = self.updating_class.clone();
        let pulse = self.pulse;
        spawn_local(async move {
            sleep(pulse).await;
            element.remove_class(&class);
        });
    }

    /// Updates bound elements matching `selector`. Returns how many were written.
    pub fn scoped_update(&self, document: &Document, selector: &str, payload: &Payload) -> usize {
        let mut updated = 0;
        for target in document.query_all(selector) {
            let Some(key) = target.attr(&self.model_attr) else {
                continue;
            };
            if let Some(value) = payload.get(&key) {
                self.update_element(&target, value);
                updated += 1;
            }
        }
        updated
    }

    /// Updates every element in the document bound to a payload key.
    pub fn broadcast_update(&self, document: &Document, payload: &Payload) -> usize {
        let mut updated = 0;
        for (key, value) in payload {
            for target in document.query_all(&format!("[{}]", self.model_attr)) {
                if target.attr(&self.model_attr).as_deref() == Some(key.as_str()) {
                    self.update_element(&target, value);
                    updated += 1;
                }
            }
        }
        updated
    }
}

/// String form of a payload value as written into the DOM.
pub fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(text) => text.clone(),
        JsonValue::Bool(flag) => flag.to_string(),
        JsonValue::Number(number) => number.to_string(),
        JsonValue::Array(items) => items.iter().map(render_value).collect::<Vec<_>>().join(","),
        JsonValue::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::task::LocalSet;

    fn patcher() -> Patcher {
        let config = SpaConfig::default();
        Patcher::new(&config, &config.attribute_names())
    }

    fn payload(value: JsonValue) -> Payload {
        match value {
            JsonValue::Object(map) => map,
            _ => unreachable!("test payloads are objects"),
        }
    }

    #[test]
    fn renders_values_like_dom_string_conversion() {
        assert_eq!(render_value(&json!(null)), "");
        assert_eq!(render_value(&json!(5)), "5");
        assert_eq!(render_value(&json!(1.5)), "1.5");
        assert_eq!(render_value(&json!(true)), "true");
        assert_eq!(render_value(&json!(["a", 1])), "a,1");
        assert_eq!(render_value(&json!({"k": 1})), r#"{"k":1}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn write_modes_follow_markers() {
        LocalSet::new()
            .run_until(async {
                let document = Document::parse(
                    r#"<html><body>
                        <div id="raw" data-spa-model="html" data-spa-unsafe-html></div>
                        <div id="text" data-spa-model="html"></div>
                        <span id="badge" data-spa-model="state" data-spa-class></span>
                        <input id="field" data-spa-model="name">
                    </body></html>"#,
                );
                let patcher = patcher();
                let data = payload(json!({
                    "html": "<b>hi</b>",
                    "state": "badge ok",
                    "name": "Ada"
                }));

                assert_eq!(patcher.broadcast_update(&document, &data), 4);

                let raw = document.query("#raw").unwrap();
                assert_eq!(raw.inner_html(), "<b>hi</b>");
                assert!(raw.query("b").is_some());
                let text = document.query("#text").unwrap();
                assert_eq!(text.text(), "<b>hi</b>");
                assert!(text.query("b").is_none());
                assert_eq!(document.query("#field").unwrap().value(), "Ada");

                let badge = document.query("#badge").unwrap();
                assert!(badge.has_class("ok"));
                assert!(badge.has_class("spa-updating"));

                sleep(Duration::from_millis(350)).await;
                assert_eq!(badge.attr("class").as_deref(), Some("badge ok"));
                assert!(!raw.has_class("spa-updating"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_update_only_touches_selection() {
        LocalSet::new()
            .run_until(async {
                let document = Document::parse(
                    r#"<html><body>
                        <p id="count" class="stat" data-spa-model="count">0</p>
                        <p id="name" data-spa-model="name">-</p>
                    </body></html>"#,
                );
                let patcher = patcher();
                let data = payload(json!({"count": 5, "name": "x"}));

                assert_eq!(patcher.scoped_update(&document, ".stat", &data), 1);
                assert_eq!(document.query("#count").unwrap().text(), "5");
                assert_eq!(document.query("#name").unwrap().text(), "-");

                patcher.broadcast_update(&document, &data);
                assert_eq!(document.query("#name").unwrap().text(), "x");
            })
            .await;
    }
}
