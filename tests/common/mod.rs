#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use cake_spa::net::{HttpRequest, HttpResponse, Transport, TransportError};
use cake_spa::{Document, SpaConfig, SpaEvent, SpaRuntime};
use futures_util::future::LocalBoxFuture;
use url::Url;

pub const ORIGIN: &str = "https://shop.test/";

#[derive(Clone)]
enum Reply {
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    Fail(String),
}

/// Transport that answers by request path and records every request.
#[derive(Default)]
pub struct MockTransport {
    routes: RefCell<HashMap<String, Reply>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: impl Into<String>) {
        self.respond_after(path, Duration::ZERO, status, body);
    }

    pub fn respond_after(&self, path: &str, delay: Duration, status: u16, body: impl Into<String>) {
        self.routes.borrow_mut().insert(
            path.to_string(),
            Reply::Respond {
                status,
                body: body.into(),
                delay,
            },
        );
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.routes
            .borrow_mut()
            .insert(path.to_string(), Reply::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_urls(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.url.to_string())
            .collect()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, TransportError>> {
        let reply = self.routes.borrow().get(request.url.path()).cloned();
        self.requests.borrow_mut().push(request);
        Box::pin(async move {
            match reply {
                Some(Reply::Respond { status, body, delay }) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(HttpResponse::new(status, body))
                }
                Some(Reply::Fail(message)) => Err(TransportError::Network(message)),
                None => Ok(HttpResponse::new(404, "not found")),
            }
        })
    }
}

pub fn runtime(page: &str, transport: &Rc<MockTransport>) -> SpaRuntime {
    runtime_at(page, ORIGIN, SpaConfig::default(), transport)
}

pub fn runtime_at(page: &str, location: &str, config: SpaConfig, transport: &Rc<MockTransport>) -> SpaRuntime {
    let location = Url::parse(location).expect("test location");
    let transport: Rc<dyn Transport> = transport.clone();
    SpaRuntime::new(Document::parse(page), location, config, transport)
}

/// Records the names of lifecycle events as they are emitted.
pub fn record_events(runtime: &SpaRuntime) -> Rc<RefCell<Vec<SpaEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    runtime.on_any(move |event| sink.borrow_mut().push(event.clone()));
    seen
}

pub fn event_names(events: &Rc<RefCell<Vec<SpaEvent>>>) -> Vec<&'static str> {
    events.borrow().iter().map(SpaEvent::name).collect()
}
