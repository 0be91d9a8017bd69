//! Console API
//!
//! Implements console.log, console.warn, console.error, etc. on top of
//! host functions, forwarding output to `tracing`.

use crate::{JsContext, JsValue, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

const METHODS: [(&str, Level); 5] = [
    ("log", Level::Log),
    ("info", Level::Info),
    ("warn", Level::Warn),
    ("error", Level::Error),
    ("debug", Level::Debug),
];

/// Install console API into the global object
pub fn install_console(context: &JsContext) -> Result<()> {
    let console = JsValue::new_object(context);

    for (name, level) in METHODS {
        let method = JsValue::new_function(context, name, move |ctx, _this, args| {
            log_with_level(level, args);
            Ok(JsValue::undefined(ctx))
        })?;
        console.set(name, method)?;
    }

    context.set_global("console", console)
}

/// Log values with a specific level
fn log_with_level(level: Level, values: &[JsValue]) {
    let output = format_values(values);

    match level {
        Level::Error => tracing::error!("[JS] {}", output),
        Level::Warn => tracing::warn!("[JS] {}", output),
        Level::Debug => tracing::debug!("[JS] {}", output),
        Level::Log | Level::Info => tracing::info!("[JS] {}", output),
    }
}

/// Space separated `Display` forms
fn format_values(values: &[JsValue]) -> String {
    let mut output = String::new();

    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        output.push_str(&value.to_string());
    }

    output
}
