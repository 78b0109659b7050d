//! Per-request context threaded explicitly through every call.

use std::fmt;

use uuid::Uuid;

/// Request-scoped values supplied by the transport layer.
///
/// The request identifier is optional: a missing id is rendered as
/// `unknown` in log fields rather than treated as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
        }
    }

    /// A context with a freshly generated request id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// A context whose request id was never supplied.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.request_id().unwrap_or("unknown"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_id_displays_unknown() {
        let ctx = RequestContext::unknown();
        assert_eq!(ctx.request_id(), None);
        assert_eq!(ctx.to_string(), "unknown");
    }

    #[test]
    fn generated_ids_differ() {
        let a = RequestContext::generate();
        let b = RequestContext::generate();
        assert_ne!(a, b);
        assert!(a.request_id().is_some());
    }
}
