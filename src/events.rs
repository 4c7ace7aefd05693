use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{json, Value as JsonValue};

use crate::dom::Element;
use crate::net::{Payload, RequestError};

pub const INIT: &str = "spa:init";
pub const ACTION: &str = "spa:action";
pub const FORM_SUBMIT: &str = "spa:formSubmit";
pub const NAVIGATE: &str = "spa:navigate";
pub const ERROR: &str = "spa:error";

/// DOM event kinds the runtime listens for at document scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEventKind {
    Click,
    Submit,
    Input,
    Change,
    KeyDown { key: String },
}

impl DomEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            DomEventKind::Click => "click",
            DomEventKind::Submit => "submit",
            DomEventKind::Input => "input",
            DomEventKind::Change => "change",
            DomEventKind::KeyDown { .. } => "keydown",
        }
    }
}

/// A user interaction delivered by the embedding shell.
#[derive(Debug, Clone)]
pub struct DomEvent {
    pub kind: DomEventKind,
    pub target: Element,
}

impl DomEvent {
    pub fn new(kind: DomEventKind, target: Element) -> Self {
        Self { kind, target }
    }

    pub fn click(target: Element) -> Self {
        Self::new(DomEventKind::Click, target)
    }

    pub fn submit(target: Element) -> Self {
        Self::new(DomEventKind::Submit, target)
    }

    pub fn input(target: Element) -> Self {
        Self::new(DomEventKind::Input, target)
    }

    pub fn change(target: Element) -> Self {
        Self::new(DomEventKind::Change, target)
    }

    pub fn key_down(target: Element, key: impl Into<String>) -> Self {
        Self::new(DomEventKind::KeyDown { key: key.into() }, target)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
}

/// Lifecycle events emitted on the document for external listeners.
#[derive(Debug, Clone)]
pub enum SpaEvent {
    Init,
    Action {
        action: String,
        data: Payload,
        element: Element,
    },
    FormSubmit {
        action: String,
        data: Payload,
        form: Element,
    },
    Navigate {
        url: String,
        container: Element,
    },
    Error {
        error: RequestError,
        element: Element,
    },
}

impl SpaEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SpaEvent::Init => INIT,
            SpaEvent::Action { .. } => ACTION,
            SpaEvent::FormSubmit { .. } => FORM_SUBMIT,
            SpaEvent::Navigate { .. } => NAVIGATE,
            SpaEvent::Error { .. } => ERROR,
        }
    }

    /// The event detail as it would be exposed to script listeners.
    pub fn detail(&self) -> JsonValue {
        match self {
            SpaEvent::Init => json!({}),
            SpaEvent::Action {
                action,
                data,
                element,
            } => json!({
                "action": action,
                "data": data,
                "element": describe(element),
            }),
            SpaEvent::FormSubmit { action, data, form } => json!({
                "action": action,
                "data": data,
                "form": describe(form),
            }),
            SpaEvent::Navigate { url, container } => json!({
                "url": url,
                "container": describe(container),
            }),
            SpaEvent::Error { error, element } => json!({
                "error": {
                    "message": error.to_string(),
                    "status": error.status(),
                },
                "element": describe(element),
            }),
        }
    }
}

fn describe(element: &Element) -> JsonValue {
    json!({
        "tagName": element.tag_name(),
        "id": element.attr("id"),
    })
}

pub type ListenerId = u64;

type Listener = Rc<dyn Fn(&SpaEvent)>;

struct Registration {
    id: ListenerId,
    name: Option<String>,
    listener: Listener,
}

/// Synchronous dispatcher for [`SpaEvent`]s.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<Vec<Registration>>,
    next_id: Cell<ListenerId>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events named `name` (e.g. [`ACTION`]).
    pub fn on(&self, name: &str, listener: impl Fn(&SpaEvent) + 'static) -> ListenerId {
        self.register(Some(name.to_string()), Rc::new(listener))
    }

    /// Registers `listener` for every lifecycle event.
    pub fn on_any(&self, listener: impl Fn(&SpaEvent) + 'static) -> ListenerId {
        self.register(None, Rc::new(listener))
    }

    pub fn off(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|entry| entry.id != id);
    }

    pub fn dispatch(&self, event: &SpaEvent) {
        // Listeners may register or remove listeners while running.
        let matching: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|entry| entry.name.as_deref().map_or(true, |name| name == event.name()))
            .map(|entry| Rc::clone(&entry.listener))
            .collect();

        for listener in matching {
            listener(event);
        }
    }

    fn register(&self, name: Option<String>, listener: Listener) -> ListenerId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.listeners.borrow_mut().push(Registration { id, name, listener });
        id
    }
}
