use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{AttributeNames, SpaConfig};
use crate::csrf;
use crate::dom::{Document, Element};
use crate::events::{EventBus, SpaEvent};
use crate::net::{ActionClient, RequestError};
use crate::window::{HistoryState, PopStateEvent, Window};

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("invalid history URL: {0}")]
    History(#[from] url::ParseError),
}

/// What a navigation attempt ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The content container now holds the fetched fragment.
    Swapped,
    /// A full page load was requested from the window.
    FullLoad,
    /// Nothing happened (no container for a history reload).
    Skipped,
}

/// Swaps the content container with server-rendered fragments and keeps the
/// session history in step.
pub struct NavigationController {
    document: Document,
    client: Rc<ActionClient>,
    window: Rc<RefCell<Window>>,
    events: Rc<EventBus>,
    config: SpaConfig,
    content_selector: String,
}

impl NavigationController {
    pub fn new(
        document: Document,
        client: Rc<ActionClient>,
        window: Rc<RefCell<Window>>,
        events: Rc<EventBus>,
        config: &SpaConfig,
        names: &AttributeNames,
    ) -> Self {
        Self {
            document,
            client,
            window,
            events,
            config: config.clone(),
            content_selector: format!("[{}]", names.content),
        }
    }

    /// The designated content container, if the page has one.
    pub fn container(&self) -> Option<Element> {
        self.document.query(&self.content_selector)
    }

    /// Pseudo-navigates to `url`, or asks for a full load when the page has no
    /// content container.
    pub async fn navigate(&self, url: &str) -> NavigationOutcome {
        if self.container().is_none() {
            self.full_load(url);
            return NavigationOutcome::FullLoad;
        }
        self.load_page(url, true).await
    }

    /// Fetches `url` as a fragment into the content container. Any failure
    /// falls back to a full page load of `url`.
    pub async fn load_page(&self, url: &str, push: bool) -> NavigationOutcome {
        let Some(container) = self.container() else {
            return NavigationOutcome::Skipped;
        };

        container.add_class(&self.config.loading_class);
        let result = self.swap(&container, url, push).await;
        container.remove_class(&self.config.loading_class);

        match result {
            Ok(()) => {
                self.events.dispatch(&SpaEvent::Navigate {
                    url: url.to_string(),
                    container,
                });
                NavigationOutcome::Swapped
            }
            Err(err) => {
                if self.config.debug {
                    debug!(target = "cake_spa", url, error = %err, "navigation failed, falling back to full load");
                }
                self.full_load(url);
                NavigationOutcome::FullLoad
            }
        }
    }

    /// Reloads the current location for history entries this runtime created.
    /// Pushed entries hold the absolute fragment URL, so the reload is fetched
    /// as-is.
    pub async fn handle_pop_state(&self, event: PopStateEvent) -> NavigationOutcome {
        if !event.state.is_some_and(|state| state.spa) {
            return NavigationOutcome::Skipped;
        }
        let location = self.window.borrow().location().to_string();
        self.load_page(&location, false).await
    }

    async fn swap(&self, container: &Element, url: &str, push: bool) -> Result<(), NavigationError> {
        let html = self.client.fetch_fragment(url).await?;
        container.set_inner_html(&html);

        // The entry records the fetched URL so a pop-state reload hits the same page.
        if push {
            let fetched = self.client.page_url(url);
            self.window.borrow_mut().push_state(HistoryState::SPA, &fetched)?;
        }

        let token = csrf::extract(&self.document, &self.config);
        if self.config.debug {
            debug!(target = "cake_spa", found = token.is_some(), "re-extracted CSRF token");
        }
        self.client.set_csrf_token(token);
        Ok(())
    }

    fn full_load(&self, url: &str) {
        if let Err(err) = self.window.borrow_mut().assign(url) {
            error!(target = "cake_spa", url, error = %err, "cannot load page");
            return;
        }
        warn!(target = "cake_spa", url, "requested full page load");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{HttpRequest, HttpResponse, Transport, TransportError};
    use futures_util::future::LocalBoxFuture;
    use url::Url;

    struct StaticTransport {
        status: u16,
        body: &'static str,
        requests: RefCell<Vec<HttpRequest>>,
    }

    impl Transport for StaticTransport {
        fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, TransportError>> {
            self.requests.borrow_mut().push(request);
            let response = HttpResponse::new(self.status, self.body);
            Box::pin(async move { Ok::<_, TransportError>(response) })
        }
    }

    fn controller(page: &str, status: u16, body: &'static str) -> (NavigationController, Rc<StaticTransport>) {
        let config = SpaConfig::default();
        let transport = Rc::new(StaticTransport {
            status,
            body,
            requests: RefCell::new(Vec::new()),
        });
        let client = Rc::new(ActionClient::new(
            transport.clone(),
            "https://shop.test/".to_string(),
            &config,
        ));
        let window = Window::new(Url::parse("https://shop.test/").unwrap());
        let controller = NavigationController::new(
            Document::parse(page),
            client,
            Rc::new(RefCell::new(window)),
            Rc::new(EventBus::new()),
            &config,
            &config.attribute_names(),
        );
        (controller, transport)
    }

    #[tokio::test]
    async fn swaps_container_and_pushes_history() {
        let (nav, transport) = controller(
            r#"<html><body><main data-spa-content>home</main></body></html>"#,
            200,
            r#"<h1>Posts</h1><meta name="csrf-token" content="fresh">"#,
        );

        assert_eq!(nav.navigate("/posts").await, NavigationOutcome::Swapped);

        let container = nav.container().unwrap();
        assert_eq!(container.query("h1").unwrap().text(), "Posts");
        assert!(!container.has_class("spa-loading"));
        assert_eq!(nav.window.borrow().location().as_str(), "https://shop.test/posts");
        assert!(nav.window.borrow().current_entry().is_spa());
        assert_eq!(nav.client.csrf_token().as_deref(), Some("fresh"));

        let requests = transport.requests.borrow();
        assert_eq!(requests[0].url.as_str(), "https://shop.test/posts");
        assert_eq!(requests[0].header("X-Live-Nav"), Some("true"));
        assert_eq!(requests[0].header("Accept"), Some("text/html"));
    }

    #[tokio::test]
    async fn missing_container_requests_full_load() {
        let (nav, transport) = controller("<html><body>plain</body></html>", 200, "");

        assert_eq!(nav.navigate("/about").await, NavigationOutcome::FullLoad);
        assert!(transport.requests.borrow().is_empty());
        let changes = nav.window.borrow_mut().take_location_changes();
        assert_eq!(changes[0].as_str(), "https://shop.test/about");
    }

    #[tokio::test]
    async fn http_error_falls_back_and_clears_loading() {
        let (nav, _transport) = controller(
            r#"<html><body><main data-spa-content>home</main></body></html>"#,
            404,
            "missing",
        );

        assert_eq!(nav.load_page("/gone", true).await, NavigationOutcome::FullLoad);
        let container = nav.container().unwrap();
        assert_eq!(container.text(), "home");
        assert!(!container.has_class("spa-loading"));
        assert_eq!(nav.window.borrow().history_len(), 1);
        assert_eq!(nav.window.borrow_mut().take_location_changes().len(), 1);
    }

    #[tokio::test]
    async fn pop_state_without_spa_tag_is_ignored() {
        let (nav, transport) = controller(
            r#"<html><body><main data-spa-content>home</main></body></html>"#,
            200,
            "x",
        );
        let outcome = nav.handle_pop_state(PopStateEvent { state: None }).await;
        assert_eq!(outcome, NavigationOutcome::Skipped);
        assert!(transport.requests.borrow().is_empty());
    }
}
