//! fOS JavaScript Bindings
//!
//! Safe, reference-counted handles over the QuickJS C API.
//!
//! Features:
//! - Shared runtimes and execution contexts
//! - Values that retain their engine reference on construction and release it on drop
//! - Host closures callable from script as functions and constructors
//! - Property descriptors, array buffers and JSON interop
//! - Console API forwarded to `tracing`
//!
//! Every operation works on the raw engine API, so host callbacks may
//! evaluate script or touch any value while the engine is running them.

mod array_buffer;
mod config;
mod console;
mod context;
mod convert;
mod descriptor;
mod function;
mod object;
mod runtime;
mod value;

pub use config::RuntimeConfig;
pub use console::install_console;
pub use context::JsContext;
pub use convert::{FromJsValue, IntoJsValue};
pub use descriptor::{Accessor, PropertyDescriptor};
pub use function::HostFunction;
pub use runtime::JsRuntime;
pub use value::JsValue;

/// Result type used across the bindings
pub type Result<T> = std::result::Result<T, JsError>;

/// Evaluate JavaScript code in a fresh context
pub fn eval(code: &str) -> Result<JsValue> {
    let context = JsContext::standalone()?;
    context.evaluate(code, None, None, 0)
}

/// JavaScript error
#[derive(Debug, thiserror::Error)]
pub enum JsError {
    /// A value thrown by the engine.
    #[error("JavaScript exception: {0}")]
    Exception(JsValue),

    /// An error returned by a host closure.
    #[error("{0}")]
    Host(String),

    #[error("Type error: expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("Value belongs to a different runtime")]
    ForeignValue,

    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] rquickjs::Error),
}

impl JsError {
    /// Error raised by host code, thrown into script as an `Error`
    pub fn host(message: impl Into<String>) -> Self {
        JsError::Host(message.into())
    }

    /// The thrown value, when this error came from the engine
    pub fn exception(&self) -> Option<&JsValue> {
        match self {
            JsError::Exception(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_simple() {
        let result = eval("1 + 1").unwrap();
        assert_eq!(result.as_f64(), Some(2.0));
    }

    #[test]
    fn test_eval_error_is_exception() {
        let err = eval("throw new TypeError('nope')").unwrap_err();
        let thrown = err.exception().expect("engine exception");
        assert!(thrown.is_error());
        assert_eq!(thrown.get("message").unwrap().as_string().as_deref(), Some("nope"));
    }

    #[test]
    fn test_host_error_display() {
        assert_eq!(JsError::host("broken pipe").to_string(), "broken pipe");
        let err = JsError::TypeMismatch { expected: "string" };
        assert_eq!(err.to_string(), "Type error: expected string");
    }
}
