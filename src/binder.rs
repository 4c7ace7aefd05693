use crate::config::AttributeNames;
use crate::dom::{Document, Element};
use crate::events::{DomEvent, DomEventKind};

/// Tags whose action attribute is driven by input/change/submit instead of clicks.
const CLICK_SKIP_TAGS: &[&str] = &["form", "input", "textarea", "select"];
/// Keyboard shortcuts are suspended while typing into these.
const TYPING_TAGS: &[&str] = &["input", "textarea"];
/// Input types that behave like buttons and never debounce.
const BUTTON_INPUT_TYPES: &[&str] = &["submit", "button"];

/// What a DOM event should trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Action(Element),
    DebouncedAction(Element),
    Navigate(String),
    Form(Element),
    /// Programmatic click on a keyboard-shortcut element.
    Activate(Element),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub dispatches: Vec<Dispatch>,
    pub default_prevented: bool,
}

impl Classification {
    fn push(&mut self, dispatch: Dispatch, prevent_default: bool) {
        self.dispatches.push(dispatch);
        self.default_prevented |= prevent_default;
    }
}

/// Delegated dispatch table: one classifier per listened event type, each
/// matching the nearest ancestor of the event target.
#[derive(Debug, Clone)]
pub struct EventBinder {
    action_selector: String,
    nav_selector: String,
    form_selector: String,
    input_selector: String,
    select_selector: String,
    key_attr: String,
}

impl EventBinder {
    pub fn new(names: &AttributeNames) -> Self {
        Self {
            action_selector: format!("[{}]", names.action),
            nav_selector: format!("a[{}]", names.nav),
            form_selector: format!("form[{}]", names.form),
            input_selector: format!("input[{0}], textarea[{0}]", names.action),
            select_selector: format!("select[{}]", names.action),
            key_attr: names.key.clone(),
        }
    }

    pub fn classify(&self, document: &Document, event: &DomEvent) -> Classification {
        let mut outcome = Classification::default();
        let target = &event.target;

        match &event.kind {
            DomEventKind::Click => {
                if let Some(element) = target.closest(&self.action_selector) {
                    if !element.is_tag(CLICK_SKIP_TAGS) && !element.is_disabled() {
                        outcome.push(Dispatch::Action(element), true);
                    }
                }
                if let Some(link) = target.closest(&self.nav_selector) {
                    match link.attr("href") {
                        Some(href) => outcome.push(Dispatch::Navigate(href), true),
                        None => outcome.default_prevented = true,
                    }
                }
            }
            DomEventKind::Submit => {
                if let Some(form) = target.closest(&self.form_selector) {
                    outcome.push(Dispatch::Form(form), true);
                }
            }
            DomEventKind::Input => {
                if let Some(element) = target.closest(&self.input_selector) {
                    let kind = element.attr("type").unwrap_or_default().to_ascii_lowercase();
                    if !BUTTON_INPUT_TYPES.contains(&kind.as_str()) {
                        outcome.push(Dispatch::DebouncedAction(element), false);
                    }
                }
            }
            DomEventKind::Change => {
                if let Some(element) = target.closest(&self.select_selector) {
                    outcome.push(Dispatch::Action(element), true);
                }
            }
            DomEventKind::KeyDown { key } => {
                if target.is_tag(TYPING_TAGS) {
                    return outcome;
                }
                for element in document.query_all(&format!("[{}]", self.key_attr)) {
                    if element.attr(&self.key_attr).as_deref() == Some(key.as_str()) && !element.is_disabled() {
                        outcome.push(Dispatch::Activate(element), true);
                    }
                }
            }
        }

        outcome
    }
}
