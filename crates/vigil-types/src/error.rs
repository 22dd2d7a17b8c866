//! Normalized error shape embedded in log records and wide events.

use serde::{Deserialize, Serialize};

/// Maximum depth of the `cause` chain retained by [`SerializedError`].
pub const MAX_CAUSE_DEPTH: usize = 10;

/// A serialized, transport-agnostic error: name, message, stack, and a
/// depth-bounded `cause` chain, plus the handful of OS-level fields
/// commonly attached to I/O errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<SerializedError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "statusCode")]
    pub status_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syscall: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl SerializedError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Serialize a `std::error::Error`, walking its `source()` chain up to
    /// [`MAX_CAUSE_DEPTH`] levels deep. Deeper causes are silently dropped,
    /// never truncated mid-struct and never panicking.
    pub fn from_std_error(err: &(dyn std::error::Error + 'static)) -> Self {
        fn build(err: &(dyn std::error::Error + 'static), depth: usize) -> SerializedError {
            let mut out = SerializedError::new(
                std::any::type_name_of_val(err).rsplit("::").next().unwrap_or("Error"),
                err.to_string(),
            );
            if depth < MAX_CAUSE_DEPTH {
                if let Some(source) = err.source() {
                    out.cause = Some(Box::new(build(source, depth + 1)));
                }
            }
            out
        }
        build(err, 0)
    }

    pub fn cause_depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.cause.as_deref();
        while let Some(c) = cur {
            depth += 1;
            cur = c.cause.as_deref();
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Chained {
        msg: &'static str,
        source: Option<Box<Chained>>,
    }

    impl fmt::Display for Chained {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.msg)
        }
    }

    impl std::error::Error for Chained {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.source.as_deref().map(|b| b as &(dyn std::error::Error + 'static))
        }
    }

    #[test]
    fn cause_chain_is_bounded() {
        let mut chain = Chained { msg: "root", source: None };
        for i in 0..(MAX_CAUSE_DEPTH + 5) {
            chain = Chained { msg: Box::leak(format!("level{i}").into_boxed_str()), source: Some(Box::new(chain)) };
        }
        let serialized = SerializedError::from_std_error(&chain);
        assert!(serialized.cause_depth() <= MAX_CAUSE_DEPTH);
    }
}
