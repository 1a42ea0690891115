//! Handler failures and their translation into responses.
//!
//! # Responsibilities
//! - `Failure`: tagged (explicit status) or opaque handler errors
//! - `ErrorTranslator`: ordered rule chain mapping a failure to a reply
//!
//! # Design Decisions
//! - Rules are evaluated first-match-wins; the built-in default always answers
//! - Tagged failures keep their status; everything else is a generic 500
//! - The translator returns a `Reply`, so it cannot fail by returning an error

use std::borrow::Cow;
use std::error::Error as StdError;
use std::sync::Arc;

use axum::http::StatusCode;

use crate::body::BodyError;
use crate::http::response::Reply;
use crate::multipart::MultipartError;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// A failure raised by a handler.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    /// Tagged failure carrying the status to answer with.
    #[error("{message}")]
    Http {
        status: StatusCode,
        code: Cow<'static, str>,
        message: String,
    },
    /// Anything else. Translated to 500 unless a rule says otherwise.
    #[error(transparent)]
    Opaque(BoxError),
}

impl Failure {
    /// Tagged failure; the wire code is derived from the status reason.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Failure::Http {
            status,
            code: Cow::Owned(default_code(status)),
            message: message.into(),
        }
    }

    pub fn opaque(error: impl Into<BoxError>) -> Self {
        Failure::Opaque(error.into())
    }

    /// Replace the wire code of a tagged failure. No-op for opaque failures.
    pub fn with_code(mut self, new_code: impl Into<Cow<'static, str>>) -> Self {
        if let Failure::Http { code, .. } = &mut self {
            *code = new_code.into();
        }
        self
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, Failure::Http { .. })
    }

    /// Status this failure resolves to without any translator rules.
    pub fn status(&self) -> StatusCode {
        match self {
            Failure::Http { status, .. } => *status,
            Failure::Opaque(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Borrow the wrapped error of an opaque failure as a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Failure::Opaque(inner) => inner.downcast_ref::<E>(),
            Failure::Http { .. } => None,
        }
    }

    /// Debug rendering plus the source chain, for diagnostics.
    pub fn detail(&self) -> String {
        let mut detail = format!("{self:?}");
        let mut source = StdError::source(self);
        while let Some(cause) = source {
            detail.push_str("\ncaused by: ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        detail
    }
}

fn default_code(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(|reason| reason.to_ascii_lowercase().replace([' ', '-'], "_"))
        .unwrap_or_else(|| "error".to_string())
}

impl From<BodyError> for Failure {
    fn from(err: BodyError) -> Self {
        match err.status() {
            Some(status) => Failure::Http {
                status,
                code: Cow::Borrowed(err.code()),
                message: err.to_string(),
            },
            None => Failure::opaque(err),
        }
    }
}

impl From<MultipartError> for Failure {
    fn from(err: MultipartError) -> Self {
        match err {
            MultipartError::AlreadyConsumed => Failure::Http {
                status: StatusCode::BAD_REQUEST,
                code: Cow::Borrowed("body_already_consumed"),
                message: err.to_string(),
            },
            other => Failure::opaque(other),
        }
    }
}

/// A translator rule: `Some(reply)` handles the failure, `None` passes.
pub type TranslatorRule = Arc<dyn Fn(&Failure) -> Option<Reply> + Send + Sync>;

/// Maps handler failures to replies.
#[derive(Clone, Default)]
pub struct ErrorTranslator {
    rules: Vec<TranslatorRule>,
}

impl ErrorTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; earlier rules take precedence.
    pub fn rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Failure) -> Option<Reply> + Send + Sync + 'static,
    {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Append a rule that only sees opaque failures wrapping `E`.
    pub fn rule_for<E, F>(self, rule: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> Option<Reply> + Send + Sync + 'static,
    {
        self.rule(move |failure| failure.downcast_ref::<E>().and_then(&rule))
    }

    pub fn translate(&self, failure: &Failure) -> Reply {
        self.rules
            .iter()
            .find_map(|rule| rule(failure))
            .unwrap_or_else(|| Self::default_reply(failure))
    }

    /// Built-in translation used when no rule matches.
    pub fn default_reply(failure: &Failure) -> Reply {
        match failure {
            Failure::Http {
                status,
                code,
                message,
            } => Reply::wire_error(*status, code, message),
            Failure::Opaque(_) => Reply::wire_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal Server Error",
            ),
        }
    }
}

impl std::fmt::Debug for ErrorTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorTranslator")
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("quota exhausted")]
    struct QuotaError;

    #[test]
    fn tagged_failure_keeps_status() {
        let failure = Failure::http(StatusCode::UNAUTHORIZED, "missing token");
        let reply = ErrorTranslator::new().translate(&failure);
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            reply.body.to_json(),
            serde_json::json!({ "error": "unauthorized", "message": "missing token" })
        );
    }

    #[test]
    fn opaque_failure_is_generic_500() {
        let failure = Failure::opaque(QuotaError);
        let reply = ErrorTranslator::new().translate(&failure);
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body.to_json()["error"], "internal_error");
    }

    #[test]
    fn first_matching_rule_wins() {
        let translator = ErrorTranslator::new()
            .rule(|_| None)
            .rule_for::<QuotaError, _>(|_| {
                Some(Reply::text("slow down").with_status(StatusCode::TOO_MANY_REQUESTS))
            })
            .rule(|_| Some(Reply::text("fallback")));

        let reply = translator.translate(&Failure::opaque(QuotaError));
        assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);

        let reply = translator.translate(&Failure::http(StatusCode::CONFLICT, "dup"));
        assert_eq!(reply.body, crate::http::response::ReplyBody::Text("fallback".into()));
    }

    #[test]
    fn body_errors_map_to_tagged_statuses() {
        let failure: Failure = BodyError::TooLarge { limit: 10 }.into();
        assert_eq!(failure.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let failure: Failure = BodyError::AlreadyConsumed.into();
        assert_eq!(failure.status(), StatusCode::BAD_REQUEST);

        let malformed = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let failure: Failure = BodyError::Malformed(malformed).into();
        assert!(!failure.is_tagged());
    }

    #[test]
    fn multipart_errors_are_opaque_except_consumed() {
        let failure: Failure = MultipartError::FieldsMustPrecedeFile.into();
        assert_eq!(failure.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(failure.downcast_ref::<MultipartError>().is_some());

        let failure: Failure = MultipartError::AlreadyConsumed.into();
        assert_eq!(failure.status(), StatusCode::BAD_REQUEST);
    }
}
