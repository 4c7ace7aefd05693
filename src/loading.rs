use std::cell::RefCell;
use std::collections::HashMap;

use crate::dom::Element;

/// Attribute holding an element's text while loading text replaces it.
pub const ORIGINAL_TEXT_ATTR: &str = "data-original-text";

/// Elements that keep focus-sensitive input and are never disabled.
const TEXT_INPUT_TAGS: &[&str] = &["input", "textarea"];

#[derive(Debug, Clone, Copy)]
struct LoadingEntry {
    depth: usize,
    disabled_here: bool,
}

/// Tracks elements with an in-flight request and toggles their visual state.
///
/// Overlapping requests from the same element nest: the element leaves the
/// loading state when the last of them finishes.
#[derive(Debug)]
pub struct LoadingState {
    elements: RefCell<HashMap<Element, LoadingEntry>>,
    loading_class: String,
}

impl LoadingState {
    pub fn new(loading_class: impl Into<String>) -> Self {
        Self {
            elements: RefCell::new(HashMap::new()),
            loading_class: loading_class.into(),
        }
    }

    pub fn set_loading(&self, element: &Element, is_loading: bool, loading_text: Option<&str>) {
        if is_loading {
            self.enter(element, loading_text);
        } else {
            self.exit(element);
        }
    }

    pub fn is_loading(&self, element: &Element) -> bool {
        self.elements.borrow().contains_key(element)
    }

    pub fn len(&self) -> usize {
        self.elements.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.borrow().is_empty()
    }

    fn enter(&self, element: &Element, loading_text: Option<&str>) {
        let mut elements = self.elements.borrow_mut();
        if let Some(entry) = elements.get_mut(element) {
            entry.depth += 1;
            return;
        }

        let disabled_here = !element.is_tag(TEXT_INPUT_TAGS) && !element.is_disabled();
        if disabled_here {
            element.set_disabled(true);
        }
        element.add_class(&self.loading_class);

        if let Some(text) = loading_text.filter(|text| !text.is_empty()) {
            element.set_attr(ORIGINAL_TEXT_ATTR, &element.text());
            element.set_text(text);
        }

        elements.insert(
            element.clone(),
            LoadingEntry {
                depth: 1,
                disabled_here,
            },
        );
    }

    fn exit(&self, element: &Element) {
        let mut elements = self.elements.borrow_mut();
        let Some(entry) = elements.get_mut(element) else {
            return;
        };
        entry.depth -= 1;
        if entry.depth > 0 {
            return;
        }
        let disabled_here = entry.disabled_here;
        elements.remove(element);

        if disabled_here {
            element.set_disabled(false);
        }
        element.remove_class(&self.loading_class);

        if let Some(original) = element.attr(ORIGINAL_TEXT_ATTR) {
            element.set_text(&original);
            element.remove_attr(ORIGINAL_TEXT_ATTR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn document() -> Document {
        Document::parse(
            r#"<html><body>
                <button id="save" class="btn">Save</button>
                <input id="q" value="x">
                <button id="off" disabled>Off</button>
            </body></html>"#,
        )
    }

    #[test]
    fn button_is_disabled_and_relabelled_while_loading() {
        let document = document();
        let button = document.query("#save").unwrap();
        let before = button.outer_html();
        let loading = LoadingState::new("spa-loading");

        loading.set_loading(&button, true, Some("Saving..."));
        assert!(button.is_disabled());
        assert!(button.has_class("spa-loading"));
        assert_eq!(button.text(), "Saving...");
        assert!(loading.is_loading(&button));
        assert_eq!(loading.len(), 1);

        loading.set_loading(&button, false, Some("Saving..."));
        assert_eq!(button.outer_html(), before);
        assert!(loading.is_empty());
    }

    #[test]
    fn text_inputs_keep_enabled() {
        let document = document();
        let input = document.query("#q").unwrap();
        let loading = LoadingState::new("spa-loading");

        loading.set_loading(&input, true, None);
        assert!(!input.is_disabled());
        assert!(input.has_class("spa-loading"));
        loading.set_loading(&input, false, None);
        assert!(!input.has_class("spa-loading"));
    }

    #[test]
    fn nested_requests_restore_once() {
        let document = document();
        let button = document.query("#save").unwrap();
        let loading = LoadingState::new("spa-loading");

        loading.set_loading(&button, true, Some("Saving..."));
        loading.set_loading(&button, true, Some("Saving..."));
        loading.set_loading(&button, false, None);
        assert!(button.is_disabled());
        assert_eq!(button.text(), "Saving...");
        loading.set_loading(&button, false, None);
        assert!(!button.is_disabled());
        assert_eq!(button.text(), "Save");
    }

    #[test]
    fn already_disabled_element_stays_disabled() {
        let document = document();
        let button = document.query("#off").unwrap();
        let loading = LoadingState::new("spa-loading");

        loading.set_loading(&button, true, None);
        loading.set_loading(&button, false, None);
        assert!(button.is_disabled());
    }
}
