//! Server side of the header contract: recognises requests sent by the
//! client runtime and marks their responses.

use std::convert::Infallible;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::HeaderValue;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;
use tracing::debug;

use crate::config::SpaConfig;

/// Response header added to every request recognised as an SPA request.
pub const SPA_RESPONSE_HEADER: &str = "X-SPA-Request";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    pub enabled: bool,
    pub navigation_header: String,
    pub ajax_header: String,
    pub ajax_header_value: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&SpaConfig::default())
    }
}

impl ServerSettings {
    /// Settings matching the headers a client with `config` sends.
    pub fn from_config(config: &SpaConfig) -> Self {
        Self {
            enabled: true,
            navigation_header: config.navigation_header.clone(),
            ajax_header: config.ajax_header.clone(),
            ajax_header_value: config.ajax_header_value.clone(),
        }
    }
}

/// How the client runtime sent a request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RequestKind {
    pub navigation: bool,
    pub ajax: bool,
}

impl RequestKind {
    pub fn classify(headers: &HeaderMap, settings: &ServerSettings) -> Self {
        let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
        Self {
            navigation: header(&settings.navigation_header) == Some("true"),
            ajax: header(&settings.ajax_header) == Some(settings.ajax_header_value.as_str()),
        }
    }

    pub fn is_spa(&self) -> bool {
        self.navigation || self.ajax
    }
}

/// Middleware storing the [`RequestKind`] as a request extension and marking
/// responses to SPA requests. Install with
/// `axum::middleware::from_fn_with_state(Arc::new(settings), classify_requests)`.
pub async fn classify_requests(
    State(settings): State<Arc<ServerSettings>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !settings.enabled {
        return next.run(request).await;
    }

    let kind = RequestKind::classify(request.headers(), &settings);
    debug!(
        target = "cake_spa",
        path = %request.uri().path(),
        navigation = kind.navigation,
        ajax = kind.ajax,
        "classified request"
    );
    request.extensions_mut().insert(kind);

    let mut response = next.run(request).await;
    if kind.is_spa() {
        response
            .headers_mut()
            .insert(SPA_RESPONSE_HEADER, HeaderValue::from_static("true"));
    }
    response
}

/// Handlers can take the classification directly. Without the middleware it
/// is derived from the headers using default settings.
#[async_trait]
impl<S> FromRequestParts<S> for RequestKind
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestKind>()
            .copied()
            .unwrap_or_else(|| RequestKind::classify(&parts.headers, &ServerSettings::default())))
    }
}
