//! The runtime instance that owns all client state and drives the binder,
//! the orchestrators and the navigation controller.

use std::cell::{Cell, Ref, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use reqwest::Method;
use tokio::task::spawn_local;
use tracing::{debug, error, warn};
use url::Url;

use crate::base_url;
use crate::binder::{Dispatch, EventBinder};
use crate::config::{AttributeNames, SpaConfig};
use crate::csrf;
use crate::dom::{Document, Element};
use crate::events::{DispatchOutcome, DomEvent, EventBus, ListenerId, SpaEvent};
use crate::loading::LoadingState;
use crate::navigation::{NavigationController, NavigationOutcome};
use crate::net::{append_query, ActionClient, FormBody, Params, Payload, RequestError, Transport};
use crate::patcher::Patcher;
use crate::timers::{Debouncer, TaskTracker};
use crate::window::{HistoryState, Window};

/// Handle to a running client instance. Clones share the same state.
///
/// Everything here is `!Send`: the runtime must be driven from inside a
/// `tokio::task::LocalSet`.
#[derive(Clone)]
pub struct SpaRuntime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    config: SpaConfig,
    names: AttributeNames,
    document: Document,
    client: Rc<ActionClient>,
    window: Rc<RefCell<Window>>,
    events: Rc<EventBus>,
    loading: LoadingState,
    tracker: Rc<TaskTracker>,
    debouncer: Debouncer,
    patcher: Patcher,
    binder: EventBinder,
    navigation: NavigationController,
    initialized: Cell<bool>,
}

impl SpaRuntime {
    pub fn new(document: Document, location: Url, config: SpaConfig, transport: Rc<dyn Transport>) -> Self {
        let names = config.attribute_names();
        let base_url = base_url::detect(&document, &location, config.debug);

        let client = Rc::new(ActionClient::new(transport, base_url, &config));
        let window = Rc::new(RefCell::new(Window::new(location)));
        let events = Rc::new(EventBus::new());
        let tracker = TaskTracker::new();
        let navigation = NavigationController::new(
            document.clone(),
            Rc::clone(&client),
            Rc::clone(&window),
            Rc::clone(&events),
            &config,
            &names,
        );

        let inner = RuntimeInner {
            loading: LoadingState::new(config.loading_class.clone()),
            debouncer: Debouncer::new(Rc::clone(&tracker)),
            patcher: Patcher::new(&config, &names),
            binder: EventBinder::new(&names),
            names,
            document,
            client,
            window,
            events,
            tracker,
            navigation,
            config,
            initialized: Cell::new(false),
        };
        Self {
            inner: Rc::new(inner),
        }
    }

    /// Extracts the CSRF token, starts handling events, tags the initial
    /// history entry and emits `spa:init`. Later calls are ignored.
    pub fn init(&self) {
        let inner = &self.inner;
        if inner.initialized.replace(true) {
            warn!(target = "cake_spa", "runtime already initialized");
            return;
        }

        let token = csrf::extract(&inner.document, &inner.config);
        self.log(format_args!("CSRF token found: {}", token.is_some()));
        inner.client.set_csrf_token(token);

        if let Err(err) = inner.window.borrow_mut().replace_state(HistoryState::SPA, None) {
            warn!(target = "cake_spa", error = %err, "cannot tag initial history entry");
        }

        self.log(format_args!("initialized with base URL {}", inner.client.base_url()));
        inner.events.dispatch(&SpaEvent::Init);
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.get()
    }

    /// Routes a user interaction through the dispatch table. The returned
    /// outcome says whether the default action was prevented; the triggered
    /// work runs as background tasks (see [`SpaRuntime::idle`]).
    pub fn dispatch_event(&self, event: DomEvent) -> DispatchOutcome {
        if !self.is_initialized() {
            return DispatchOutcome::default();
        }

        let classification = self.inner.binder.classify(&self.inner.document, &event);
        self.log(format_args!(
            "{} event matched {} handler(s)",
            event.kind.name(),
            classification.dispatches.len()
        ));
        let mut outcome = DispatchOutcome {
            default_prevented: classification.default_prevented,
        };

        for dispatch in classification.dispatches {
            match dispatch {
                Dispatch::Action(element) => {
                    let runtime = self.clone();
                    self.spawn(async move { runtime.handle_action(&element).await });
                }
                Dispatch::DebouncedAction(element) => {
                    let runtime = self.clone();
                    let target = element.clone();
                    let delay = Duration::from_millis(self.inner.config.debounce_time);
                    self.inner.debouncer.schedule(&element, delay, move || async move {
                        runtime.handle_action(&target).await;
                    });
                }
                Dispatch::Navigate(url) => {
                    let runtime = self.clone();
                    self.spawn(async move {
                        runtime.navigate(&url).await;
                    });
                }
                Dispatch::Form(form) => {
                    let runtime = self.clone();
                    self.spawn(async move { runtime.handle_form(&form).await });
                }
                Dispatch::Activate(element) => {
                    let click = self.dispatch_event(DomEvent::click(element));
                    outcome.default_prevented |= click.default_prevented;
                }
            }
        }

        outcome
    }

    /// Runs the action bound to `element` and patches the document with the
    /// response.
    pub async fn handle_action(&self, element: &Element) {
        let inner = &self.inner;
        let names = &inner.names;
        let Some(action) = element.attr(&names.action).filter(|action| !action.is_empty()) else {
            return;
        };

        let mut params = self.extract_params(element);
        if element.is_tag(&["select", "input", "textarea"]) {
            let name = element
                .attr("name")
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "value".to_string());
            params.insert(name, element.value());
        }

        let target = element.attr(&names.target).filter(|target| !target.is_empty());
        let loading_text = element.attr(&names.loading);
        let push_url = element.attr(&names.push_url).filter(|push| !push.is_empty());

        inner.loading.set_loading(element, true, loading_text.as_deref());
        self.log(format_args!("action {action} with {} params", params.len()));

        match inner.client.call(&action, &params, Method::GET, None).await {
            Ok(data) => {
                if let Some(push_url) = push_url {
                    let path = if push_url == "true" { &action } else { &push_url };
                    let url = append_query(path, &params);
                    if let Err(err) = inner.window.borrow_mut().push_state(HistoryState::SPA, &url) {
                        warn!(target = "cake_spa", %url, error = %err, "cannot push history entry");
                    }
                }

                let updated = match &target {
                    Some(selector) => inner.patcher.scoped_update(&inner.document, selector, &data),
                    None => inner.patcher.broadcast_update(&inner.document, &data),
                };
                self.log(format_args!("action {action} updated {updated} elements"));

                inner.events.dispatch(&SpaEvent::Action {
                    action,
                    data,
                    element: element.clone(),
                });
            }
            Err(err) => self.handle_error(err, element),
        }

        inner.loading.set_loading(element, false, loading_text.as_deref());
    }

    /// Submits `form` through the action endpoint named by its `action`
    /// attribute and broadcasts the response.
    pub async fn handle_form(&self, form: &Element) {
        let inner = &self.inner;
        let action = form
            .attr("action")
            .filter(|action| !action.is_empty())
            .unwrap_or_else(|| inner.window.borrow().location().path().to_string());
        let method = form
            .attr("method")
            .filter(|method| !method.is_empty())
            .unwrap_or_else(|| "POST".to_string())
            .to_ascii_uppercase();
        let method = match Method::from_bytes(method.as_bytes()) {
            Ok(method) => method,
            Err(err) => {
                warn!(target = "cake_spa", %method, error = %err, "unsupported form method, using POST");
                Method::POST
            }
        };
        let entries = form.form_entries();
        let loading_text = form.attr(&inner.names.loading);

        let submit = form.query(r#"[type="submit"]"#);
        if let Some(submit) = &submit {
            inner.loading.set_loading(submit, true, loading_text.as_deref());
        }

        let (params, body) = if method == Method::GET {
            (entries.into_iter().collect::<Params>(), None)
        } else {
            (Params::new(), Some(FormBody::new(entries)))
        };
        self.log(format_args!("form submit {method} {action}"));

        match inner.client.call(&action, &params, method, body).await {
            Ok(data) => {
                inner.patcher.broadcast_update(&inner.document, &data);
                inner.events.dispatch(&SpaEvent::FormSubmit {
                    action,
                    data,
                    form: form.clone(),
                });
            }
            Err(err) => self.handle_error(err, form),
        }

        if let Some(submit) = &submit {
            inner.loading.set_loading(submit, false, loading_text.as_deref());
        }
    }

    pub async fn navigate(&self, url: &str) -> NavigationOutcome {
        self.inner.navigation.navigate(url).await
    }

    pub async fn load_page(&self, url: &str, push: bool) -> NavigationOutcome {
        self.inner.navigation.load_page(url, push).await
    }

    /// Moves back one history entry, as the browser back button would.
    pub fn history_back(&self) {
        self.history_go(-1);
    }

    pub fn history_forward(&self) {
        self.history_go(1);
    }

    pub fn history_go(&self, delta: isize) {
        let Some(event) = self.inner.window.borrow_mut().go(delta) else {
            return;
        };
        let runtime = self.clone();
        self.spawn(async move {
            runtime.inner.navigation.handle_pop_state(event).await;
        });
    }

    /// Requests an action and broadcasts the response, returning the payload.
    pub async fn call(&self, action: &str, params: &Params) -> Result<Payload, RequestError> {
        let data = self.inner.client.call(action, params, Method::GET, None).await?;
        self.inner.patcher.broadcast_update(&self.inner.document, &data);
        Ok(data)
    }

    /// Resolves once no orchestrator task or debounce timer is pending.
    pub async fn idle(&self) {
        self.inner.tracker.idle().await;
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.tracker.pending()
    }

    /// Drains the full page loads requested since the last call.
    pub fn take_location_changes(&self) -> Vec<Url> {
        self.inner.window.borrow_mut().take_location_changes()
    }

    pub fn on(&self, name: &str, listener: impl Fn(&SpaEvent) + 'static) -> ListenerId {
        self.inner.events.on(name, listener)
    }

    pub fn on_any(&self, listener: impl Fn(&SpaEvent) + 'static) -> ListenerId {
        self.inner.events.on_any(listener)
    }

    pub fn off(&self, id: ListenerId) {
        self.inner.events.off(id);
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn config(&self) -> &SpaConfig {
        &self.inner.config
    }

    pub fn attribute_names(&self) -> &AttributeNames {
        &self.inner.names
    }

    pub fn base_url(&self) -> &str {
        self.inner.client.base_url()
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.inner.client.csrf_token()
    }

    pub fn window(&self) -> Ref<'_, Window> {
        self.inner.window.borrow()
    }

    pub fn loading(&self) -> &LoadingState {
        &self.inner.loading
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.inner.debouncer
    }

    pub fn patcher(&self) -> &Patcher {
        &self.inner.patcher
    }

    fn extract_params(&self, element: &Element) -> Params {
        let prefix = &self.inner.names.param_prefix;
        element
            .attributes()
            .into_iter()
            .filter_map(|(name, value)| {
                let key = name.strip_prefix(prefix.as_str())?;
                Some((key.to_string(), value))
            })
            .collect()
    }

    fn handle_error(&self, err: RequestError, element: &Element) {
        self.log(format_args!("error: {err}"));
        self.inner.events.dispatch(&SpaEvent::Error {
            error: err.clone(),
            element: element.clone(),
        });
        error!(target = "cake_spa", error = %err, element = ?element, "request failed");
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let pending = self.inner.tracker.track();
        spawn_local(async move {
            let _pending = pending;
            task.await;
        });
    }

    fn log(&self, message: std::fmt::Arguments<'_>) {
        if self.inner.config.debug {
            debug!(target = "cake_spa", "{message}");
        }
    }
}
