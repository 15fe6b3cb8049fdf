use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

pub const E_MANIFEST_INVALID: &str = "E_MANIFEST_INVALID";
pub const E_OVERRIDE_INVALID: &str = "E_OVERRIDE_INVALID";
pub const E_GPU_UNAVAILABLE: &str = "E_GPU_UNAVAILABLE";
pub const E_OUTPUT_WRITE: &str = "E_OUTPUT_WRITE";
pub const E_SESSION_CLOSED: &str = "E_SESSION_CLOSED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedErrorKind {
    /// Bad input from the caller: manifest, overrides, CLI flags.
    Usage,
    /// The environment could not provide what was asked for.
    Runtime,
}

impl CodedErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Usage => 2,
            Self::Runtime => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind: CodedErrorKind::Usage,
        }
    }

    pub fn runtime(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind: CodedErrorKind::Runtime,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

/// Wrap an untyped failure with a stable code, keeping the full cause chain
/// in `message`.
pub fn classify(error: Error, code: &'static str, kind: CodedErrorKind) -> Error {
    if find_coded_error(&error).is_some() {
        return error;
    }
    let message = format!("{error:#}");
    let coded = CodedError {
        code,
        message,
        details: None,
        kind,
    };
    Error::new(coded)
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_serializes_without_empty_details() {
        let error = CodedError::usage(E_OVERRIDE_INVALID, "bad override");
        let value = serde_json::to_value(error.envelope()).expect("envelope should serialize");
        assert_eq!(
            value,
            json!({"ok": false, "error": {"code": "E_OVERRIDE_INVALID", "message": "bad override"}})
        );
    }

    #[test]
    fn coded_error_is_found_through_context() {
        let error = Error::new(CodedError::runtime(E_GPU_UNAVAILABLE, "no adapter"))
            .context("starting renderer");
        let coded = find_coded_error(&error).expect("coded error should be in chain");
        assert_eq!(coded.code, E_GPU_UNAVAILABLE);
        assert_eq!(coded.kind.exit_code(), 1);
    }

    #[test]
    fn classify_keeps_existing_codes() {
        let inner = Error::new(CodedError::usage(E_MANIFEST_INVALID, "missing fps"));
        let classified = classify(inner, E_OUTPUT_WRITE, CodedErrorKind::Runtime);
        assert_eq!(
            find_coded_error(&classified).map(|coded| coded.code),
            Some(E_MANIFEST_INVALID)
        );

        let plain = Err::<(), _>(anyhow!("disk full")).context("writing frame 3");
        let classified = classify(
            plain.expect_err("should be an error"),
            E_OUTPUT_WRITE,
            CodedErrorKind::Runtime,
        );
        let coded = find_coded_error(&classified).expect("coded");
        assert_eq!(coded.code, E_OUTPUT_WRITE);
        assert!(coded.message.contains("disk full"));
        assert!(coded.message.contains("writing frame 3"));
    }
}
