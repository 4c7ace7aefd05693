//! Free-function entry points for embedders that hold a runtime reference
//! instead of calling methods on it.

use serde_json::Value as JsonValue;

use crate::navigation::NavigationOutcome;
use crate::net::{Params, Payload, RequestError};
use crate::runtime::SpaRuntime;

/// Calls `action` with `params` and broadcasts the response into the document.
pub async fn call(runtime: &SpaRuntime, action: &str, params: &Params) -> Result<Payload, RequestError> {
    runtime.call(action, params).await
}

pub async fn navigate(runtime: &SpaRuntime, url: &str) -> NavigationOutcome {
    runtime.navigate(url).await
}

/// Writes `value` into the first element matching `selector`. Returns whether
/// an element matched.
pub fn update(runtime: &SpaRuntime, selector: &str, value: &JsonValue) -> bool {
    match runtime.document().query(selector) {
        Some(element) => {
            runtime.patcher().update_element(&element, value);
            true
        }
        None => false,
    }
}
