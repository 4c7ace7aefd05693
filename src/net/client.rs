use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Method;
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::transport::{FormBody, HttpRequest, Transport, TransportError};
use crate::config::SpaConfig;

/// Collapses repeated slashes that do not directly follow a scheme's `:`.
static DOUBLE_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^:]/)/+").expect("double slash pattern"));

/// Decoded body of an action response.
pub type Payload = JsonMap<String, JsonValue>;

/// Request parameters. Keys are unique; later inserts replace earlier ones.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status(status) => Some(*status),
            _ => None,
        }
    }
}

impl From<TransportError> for RequestError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => RequestError::Network(message),
        }
    }
}

/// Builds and sends action and navigation requests.
///
/// Owns the CSRF token slot: whatever token was last stored is attached to
/// every action request.
pub struct ActionClient {
    transport: Rc<dyn Transport>,
    base_url: String,
    ajax_header: String,
    ajax_header_value: String,
    navigation_header: String,
    csrf_header: String,
    csrf_token: RefCell<Option<String>>,
    debug: bool,
}

impl ActionClient {
    pub fn new(transport: Rc<dyn Transport>, base_url: String, config: &SpaConfig) -> Self {
        Self {
            transport,
            base_url,
            ajax_header: config.ajax_header.clone(),
            ajax_header_value: config.ajax_header_value.clone(),
            navigation_header: config.navigation_header.clone(),
            csrf_header: config.csrf_header_name.clone(),
            csrf_token: RefCell::new(None),
            debug: config.debug,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.csrf_token.borrow().clone()
    }

    pub fn set_csrf_token(&self, token: Option<String>) {
        *self.csrf_token.borrow_mut() = token;
    }

    /// Calls an action endpoint and decodes its JSON object response.
    ///
    /// For `GET`, `params` are sent as the query string; for any other
    /// method `body` is sent unchanged and `params` are not encoded.
    pub async fn call(
        &self,
        action: &str,
        params: &Params,
        method: Method,
        body: Option<FormBody>,
    ) -> Result<Payload, RequestError> {
        let mut url = action_url(&self.base_url, action);
        if method == Method::GET && !params.is_empty() {
            url = append_query(&url, params);
        }

        let mut headers = vec![
            (self.ajax_header.clone(), self.ajax_header_value.clone()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if let Some(token) = self.csrf_token() {
            headers.push((self.csrf_header.clone(), token));
        }

        let request = HttpRequest {
            method,
            url: parse_url(&url)?,
            headers,
            body,
        };
        if self.debug {
            debug!(target = "cake_spa", method = %request.method, url = %request.url, "sending action request");
        }

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(RequestError::Status(response.status));
        }

        match serde_json::from_str::<JsonValue>(&response.body) {
            Ok(JsonValue::Object(payload)) => Ok(payload),
            Ok(other) => Err(RequestError::Decode(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(err) => Err(RequestError::Decode(err.to_string())),
        }
    }

    /// Fetches an HTML fragment for the navigation controller.
    pub async fn fetch_fragment(&self, url: &str) -> Result<String, RequestError> {
        let request = HttpRequest {
            method: Method::GET,
            url: parse_url(&self.page_url(url))?,
            headers: vec![
                (self.ajax_header.clone(), self.ajax_header_value.clone()),
                (self.navigation_header.clone(), "true".to_string()),
                ("Accept".to_string(), "text/html".to_string()),
            ],
            body: None,
        };
        if self.debug {
            debug!(target = "cake_spa", url = %request.url, "fetching page fragment");
        }

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(RequestError::Status(response.status));
        }
        Ok(response.body)
    }

    /// Absolute form of a navigation URL: URLs starting with `http` are kept,
    /// anything else is resolved under the base URL.
    pub fn page_url(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url.strip_prefix('/').unwrap_or(url))
        }
    }
}

/// Absolute URL for an action path, with doubled separators collapsed.
pub fn action_url(base_url: &str, action: &str) -> String {
    let url = if action.starts_with("http") {
        action.to_string()
    } else {
        format!("{base_url}{action}")
    };
    DOUBLE_SLASH.replace_all(&url, "$1").into_owned()
}

/// Appends `params` as a query string, joining with `?` or `&` as needed.
pub fn append_query(url: &str, params: &Params) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    match serde_urlencoded::to_string(params) {
        Ok(query) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}{query}")
        }
        Err(err) => {
            warn!(target = "cake_spa", error = %err, "failed to encode query parameters");
            url.to_string()
        }
    }
}

fn parse_url(url: &str) -> Result<Url, RequestError> {
    Url::parse(url).map_err(|err| RequestError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })
}
