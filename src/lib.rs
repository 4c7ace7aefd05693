//! Server-driven SPA-lite client runtime.
//!
//! Binds elements of an HTML document to server actions through
//! `data-spa-*` attributes, patches the document with JSON responses and
//! swaps a content container for pseudo-navigation with history support.
//! [`SpaRuntime`] is the entry point; [`server`] holds the matching axum
//! middleware for the serving side.

pub mod base_url;
pub mod binder;
pub mod config;
pub mod csrf;
pub mod dom;
pub mod events;
pub mod helpers;
pub mod loading;
pub mod navigation;
pub mod net;
pub mod patcher;
pub mod runtime;
pub mod server;
pub mod timers;
pub mod window;

pub use config::{AttributeNames, ConfigError, SpaConfig};
pub use dom::{Document, Element};
pub use events::{DispatchOutcome, DomEvent, SpaEvent};
pub use navigation::NavigationOutcome;
pub use net::{ActionClient, Params, Payload, RequestError, ReqwestTransport, Transport};
pub use runtime::SpaRuntime;
pub use window::{HistoryState, Window};
