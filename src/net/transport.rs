use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use reqwest::multipart;
use reqwest::Method;
use thiserror::Error;
use url::Url;

/// Form fields sent as a request body, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody {
    pub fields: Vec<(String, String)>,
}

impl FormBody {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<FormBody>,
}

impl HttpRequest {
    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
}

/// Issues HTTP requests for the runtime. Implementations run on the page's
/// event loop, so the returned future need not be `Send`.
pub trait Transport {
    fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, TransportError>>;
}

/// [`Transport`] backed by a shared `reqwest` client. Form bodies are sent
/// as `multipart/form-data`, like a browser submitting `FormData`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, TransportError>> {
        async move {
            let mut builder = self.client.request(request.method, request.url);
            for (name, value) in request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                let form = body
                    .fields
                    .into_iter()
                    .fold(multipart::Form::new(), |form, (name, value)| form.text(name, value));
                builder = builder.multipart(form);
            }

            let response = builder
                .send()
                .await
                .map_err(|err| TransportError::Network(err.to_string()))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|err| TransportError::Network(err.to_string()))?;

            Ok(HttpResponse { status, body })
        }
        .boxed_local()
    }
}
