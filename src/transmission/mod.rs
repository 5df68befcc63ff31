mod cache;
mod parser;
mod store;
mod txt;

pub use cache::ResponseCache;
pub use parser::{ApiRequest, parse_api_request};
pub use store::{EndOutcome, TransmissionStore};
pub use txt::{ANSWER_TTL, render_txt_answers};

use crate::session::SessionHandler;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Rendered outcome of one transmission API call. Attribute order is fixed so
/// cached replays are byte-identical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub success: bool,
    pub transmission_id: Option<String>,
    pub contents: Option<String>,
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            transmission_id: None,
            contents: None,
            error: None,
        }
    }

    pub fn begun(transmission_id: String) -> Self {
        Self {
            transmission_id: Some(transmission_id),
            ..Self::ok()
        }
    }

    pub fn contents(contents: String) -> Self {
        Self {
            contents: Some(contents),
            ..Self::ok()
        }
    }

    pub fn failed(error: &str) -> Self {
        Self {
            success: false,
            transmission_id: None,
            contents: None,
            error: Some(error.to_string()),
        }
    }

    /// RFC 1464 attribute strings, `$count` last. Booleans render as `True` /
    /// `False`, which is what deployed clients parse.
    pub fn to_attributes(&self) -> Vec<String> {
        let mut attributes = Vec::with_capacity(4);
        attributes.push(format!(
            "success={}",
            if self.success { "True" } else { "False" }
        ));
        if let Some(id) = &self.transmission_id {
            attributes.push(format!("transmission_id={}", id));
        }
        if let Some(contents) = &self.contents {
            attributes.push(format!("contents={}", contents));
        }
        if let Some(error) = &self.error {
            attributes.push(format!("error={}", error));
        }
        attributes.push(format!("$count={}", attributes.len()));
        attributes
    }
}

/// True when every character may travel inside a DNS label unescaped. The
/// alphabet is the session layer's full reply vocabulary: base64, the hyphen
/// separator and the underscore used in error text.
pub fn is_domain_safe(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '/' | '_'))
}

/// Transmission API dispatch: drives the store and, at `end`, hands the
/// assembled payload to the session layer.
pub struct ApiHandler {
    store: TransmissionStore,
    sessions: Arc<SessionHandler>,
}

impl ApiHandler {
    pub fn new(store: TransmissionStore, sessions: Arc<SessionHandler>) -> Self {
        Self { store, sessions }
    }

    pub fn handle(&self, request: ApiRequest) -> ApiResponse {
        match request {
            ApiRequest::Failure { name } => {
                debug!("Malformed API request: {}", name);
                ApiResponse::failed("You used the API incorrectly.")
            }
            ApiRequest::Other { name } => {
                debug!("Not an API endpoint: {}", name);
                ApiResponse::failed("This is not an API endpoint")
            }
            ApiRequest::Begin { prefix: _ } => {
                let id = self.store.begin();
                ApiResponse::begun(id)
            }
            ApiRequest::Continue { data, index, id } => {
                if self.store.add(&id, index, data) {
                    debug!("Continuing transmission {}", id);
                    ApiResponse::ok()
                } else {
                    warn!("Continue for unknown transmission {}", id);
                    ApiResponse::failed("Tried to continue a transmission that doesn't exist.")
                }
            }
            ApiRequest::End { length, id } => match self.store.end(&id, length) {
                EndOutcome::Assembled(payload) => {
                    debug!(
                        "Ended transmission {} with {} byte payload",
                        id,
                        payload.len()
                    );
                    let reply = self.sessions.handle_message(&payload);
                    if !is_domain_safe(&reply) {
                        error!("Session reply not domain-safe, dropping: {:?}", reply);
                        return ApiResponse::failed("Internal_error");
                    }
                    ApiResponse::contents(reply)
                }
                EndOutcome::Incomplete => {
                    warn!("End for transmission {} missing fragments", id);
                    ApiResponse::failed(
                        ".end called with length that didn't match number of .continue's received.",
                    )
                }
                EndOutcome::UnknownId => {
                    warn!("End for unknown transmission {}", id);
                    ApiResponse::failed("Tried to end a transmission that doesn't exist.")
                }
            },
        }
    }

    pub fn store(&self) -> &TransmissionStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_carry_count_of_real_keys() {
        assert_eq!(
            ApiResponse::ok().to_attributes(),
            vec!["success=True", "$count=1"]
        );
        assert_eq!(
            ApiResponse::failed("nope").to_attributes(),
            vec!["success=False", "error=nope", "$count=2"]
        );
    }

    #[test]
    fn domain_safety_is_match_all() {
        assert!(is_domain_safe("s-0123abcd"));
        assert!(is_domain_safe("AB+/-9"));
        assert!(is_domain_safe("f-0-Packet_is_Invalid"));
        assert!(is_domain_safe(""));
        // One bad character taints the whole string
        assert!(!is_domain_safe("ok=padding"));
        assert!(!is_domain_safe("back`tick"));
        assert!(!is_domain_safe("dot.ted"));
        assert!(!is_domain_safe("white space"));
    }
}
