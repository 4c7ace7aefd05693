mod client;
mod transport;

pub use client::{action_url, append_query, ActionClient, Params, Payload, RequestError};
pub use transport::{
    FormBody, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError,
};
