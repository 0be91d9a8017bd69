//! JavaScript Values
//!
//! [`JsValue`] owns one engine reference for its whole lifetime.

use std::collections::HashMap;
use std::fmt::{self, Write};
use std::mem::ManuallyDrop;
use std::ptr;

use chrono::{DateTime, SecondsFormat, Utc};
use rquickjs::qjs;

use crate::{JsContext, Result};

/// Nesting depth at which `Display` stops descending into containers
const MAX_DISPLAY_DEPTH: usize = 8;

/// Elements shown per array before `Display` elides the rest
const MAX_DISPLAY_ITEMS: usize = 100;

/// A JavaScript value bound to the context it was created in.
///
/// Construction retains the engine value and drop releases it. Two
/// wrappers may hold the same engine value; the engine counts the
/// references. Each wrapper keeps its context alive.
pub struct JsValue {
    context: JsContext,
    raw: qjs::JSValue,
}

impl JsValue {
    /// Wrap an engine value, taking over one reference.
    ///
    /// # Safety
    /// `raw` must belong to the runtime of `context` and the caller must
    /// own the reference it hands over.
    pub(crate) unsafe fn from_owned(context: &JsContext, raw: qjs::JSValue) -> Self {
        Self {
            context: context.clone(),
            raw,
        }
    }

    /// Wrap an engine value, taking a new reference.
    ///
    /// # Safety
    /// `raw` must be a live value of the runtime of `context`.
    pub(crate) unsafe fn from_borrowed(context: &JsContext, raw: qjs::JSValue) -> Self {
        let raw = unsafe { qjs::JS_DupValue(context.as_raw(), raw) };
        unsafe { Self::from_owned(context, raw) }
    }

    /// Borrow the engine value without touching its reference count
    pub(crate) fn as_raw(&self) -> qjs::JSValue {
        self.raw
    }

    /// Give up this wrapper's reference to the caller
    pub(crate) fn into_raw(self) -> qjs::JSValue {
        let this = ManuallyDrop::new(self);
        let raw = this.raw;
        // The context handle still has to be released.
        drop(unsafe { ptr::read(&this.context) });
        raw
    }

    /// Context this value is bound to
    pub fn context(&self) -> &JsContext {
        &self.context
    }

    pub(crate) fn ctx_ptr(&self) -> *mut qjs::JSContext {
        self.context.as_raw()
    }

    /// Wrap an owned result, falling back to `undefined` after routing any
    /// exception ambiently.
    pub(crate) fn ambient(context: &JsContext, raw: qjs::JSValue) -> Self {
        context
            .catch(unsafe { context.wrap_result(raw) })
            .unwrap_or_else(|| Self::undefined(context))
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn undefined(context: &JsContext) -> Self {
        unsafe { Self::from_owned(context, qjs::JS_UNDEFINED) }
    }

    pub fn null(context: &JsContext) -> Self {
        unsafe { Self::from_owned(context, qjs::JS_NULL) }
    }

    pub fn bool(context: &JsContext, value: bool) -> Self {
        let raw = if value { qjs::JS_TRUE } else { qjs::JS_FALSE };
        unsafe { Self::from_owned(context, raw) }
    }

    pub fn number(context: &JsContext, value: f64) -> Self {
        unsafe { Self::from_owned(context, qjs::JS_NewFloat64(value)) }
    }

    pub fn string(context: &JsContext, value: &str) -> Self {
        let raw = unsafe { qjs::JS_NewStringLen(context.as_raw(), value.as_ptr().cast(), value.len() as _) };
        Self::ambient(context, raw)
    }

    /// A `Date` built by the global `Date` constructor from an RFC 3339 timestamp
    pub fn new_date(context: &JsContext, date: &DateTime<Utc>) -> Result<Self> {
        let stamp = date.to_rfc3339_opts(SecondsFormat::Millis, true);
        context
            .global("Date")?
            .construct(&[Self::string(context, &stamp)])
    }

    /// A `RegExp` built by the global `RegExp` constructor
    pub fn new_regexp(context: &JsContext, pattern: &str, flags: &str) -> Result<Self> {
        context.global("RegExp")?.construct(&[
            Self::string(context, pattern),
            Self::string(context, flags),
        ])
    }

    /// An `Error` with the given message
    pub fn new_error(context: &JsContext, message: &str) -> Self {
        let error = Self::ambient(context, unsafe { qjs::JS_NewError(context.as_raw()) });
        if error.is_object() {
            let flags = qjs::JS_PROP_WRITABLE | qjs::JS_PROP_CONFIGURABLE;
            let message = Self::string(context, message);
            context.catch(error.define_raw(c"message", message, flags));
        }
        error
    }

    pub fn new_object(context: &JsContext) -> Self {
        Self::ambient(context, unsafe { qjs::JS_NewObject(context.as_raw()) })
    }

    /// A plain object whose prototype is `prototype` (an object or `null`)
    pub fn new_object_with_prototype(context: &JsContext, prototype: &JsValue) -> Result<Self> {
        context.check_owner(prototype)?;
        unsafe { context.wrap_result(qjs::JS_NewObjectProto(context.as_raw(), prototype.raw)) }
    }

    pub fn new_array(context: &JsContext) -> Self {
        Self::ambient(context, unsafe { qjs::JS_NewArray(context.as_raw()) })
    }

    // ------------------------------------------------------------------
    // Type predicates
    // ------------------------------------------------------------------

    fn tag(&self) -> i32 {
        unsafe { qjs::JS_VALUE_GET_TAG(self.raw) }
    }

    pub fn is_undefined(&self) -> bool {
        self.tag() == qjs::JS_TAG_UNDEFINED
    }

    pub fn is_null(&self) -> bool {
        self.tag() == qjs::JS_TAG_NULL
    }

    pub fn is_bool(&self) -> bool {
        self.tag() == qjs::JS_TAG_BOOL
    }

    pub fn is_number(&self) -> bool {
        unsafe { qjs::JS_IsNumber(self.raw) }
    }

    pub fn is_string(&self) -> bool {
        self.tag() == qjs::JS_TAG_STRING
    }

    pub fn is_symbol(&self) -> bool {
        self.tag() == qjs::JS_TAG_SYMBOL
    }

    pub fn is_object(&self) -> bool {
        self.tag() == qjs::JS_TAG_OBJECT
    }

    pub fn is_function(&self) -> bool {
        unsafe { qjs::JS_IsFunction(self.ctx_ptr(), self.raw) }
    }

    pub fn is_constructor(&self) -> bool {
        unsafe { qjs::JS_IsConstructor(self.ctx_ptr(), self.raw) }
    }

    /// `instanceof` the current global `Array`
    pub fn is_array(&self) -> bool {
        self.is_instance_of_global("Array")
    }

    /// `instanceof` the current global `Date`
    pub fn is_date(&self) -> bool {
        self.is_instance_of_global("Date")
    }

    /// `instanceof` the current global `Error`
    pub fn is_error(&self) -> bool {
        self.is_instance_of_global("Error")
    }

    /// Looked up on every call so a replaced global constructor is honoured.
    pub(crate) fn is_instance_of_global(&self, name: &str) -> bool {
        if !self.is_object() {
            return false;
        }
        match self.context.global(name) {
            Ok(constructor) if constructor.is_object() => self.is_instance_of(&constructor),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Extraction
    // ------------------------------------------------------------------

    pub fn as_bool(&self) -> Option<bool> {
        if !self.is_bool() {
            return None;
        }
        Some(unsafe { qjs::JS_ToBool(self.ctx_ptr(), self.raw) } > 0)
    }

    pub fn as_f64(&self) -> Option<f64> {
        if !self.is_number() {
            return None;
        }
        let mut number = 0.0;
        let status = unsafe { qjs::JS_ToFloat64(self.ctx_ptr(), &mut number, self.raw) };
        (status == 0).then_some(number)
    }

    pub fn as_string(&self) -> Option<String> {
        if !self.is_string() {
            return None;
        }
        self.coerce_string()
    }

    /// Time value of a `Date`, `None` for other values and invalid dates
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        if !self.is_date() {
            return None;
        }
        let mut millis = f64::NAN;
        let status = unsafe { qjs::JS_ToFloat64(self.ctx_ptr(), &mut millis, self.raw) };
        if status < 0 {
            self.context.discard_engine_exception();
            return None;
        }
        if !millis.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis(millis as i64)
    }

    /// Engine `ToString`, `None` when it throws
    pub(crate) fn coerce_string(&self) -> Option<String> {
        let ctx = self.ctx_ptr();
        let mut len = 0;
        let ptr = unsafe { qjs::JS_ToCStringLen2(ctx, &mut len, self.raw, false) };
        if ptr.is_null() {
            self.context.discard_engine_exception();
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize) };
        let text = String::from_utf8_lossy(bytes).into_owned();
        unsafe { qjs::JS_FreeCString(ctx, ptr) };
        Some(text)
    }

    /// Snapshot of the elements at `0..length`, `length` capped at `u32::MAX`
    pub fn to_vec(&self) -> Result<Vec<JsValue>> {
        self.elements(u32::MAX as usize)
    }

    fn elements(&self, limit: usize) -> Result<Vec<JsValue>> {
        let len = self.length().min(limit).min(u32::MAX as usize) as u32;
        (0..len).map(|index| self.get_index(index)).collect()
    }

    /// Snapshot of the enumerable properties
    pub fn to_map(&self) -> Result<HashMap<String, JsValue>> {
        self.property_names()?
            .into_iter()
            .map(|name| {
                let value = self.get(&name)?;
                Ok((name, value))
            })
            .collect()
    }

    fn describe(&self, out: &mut impl Write, depth: usize) -> fmt::Result {
        if self.is_undefined() {
            return out.write_str("undefined");
        }
        if self.is_null() {
            return out.write_str("null");
        }
        if let Some(value) = self.as_bool() {
            return write!(out, "{value}");
        }
        if let Some(value) = self.as_f64() {
            return write!(out, "{value}");
        }
        if let Some(value) = self.as_string() {
            return out.write_str(&value);
        }

        if self.is_array() {
            if depth >= MAX_DISPLAY_DEPTH {
                return out.write_str("[...]");
            }
            out.write_char('[')?;
            let items = self.elements(MAX_DISPLAY_ITEMS).unwrap_or_default();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                item.describe(out, depth + 1)?;
            }
            if self.length() > MAX_DISPLAY_ITEMS {
                out.write_str(", ...")?;
            }
            return out.write_char(']');
        }

        if self.is_object() && !self.is_function() && !self.is_error() && !self.is_date() {
            if depth >= MAX_DISPLAY_DEPTH {
                return out.write_str("{...}");
            }
            out.write_char('{')?;
            for (i, name) in self.property_names().unwrap_or_default().iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write!(out, "{name}: ")?;
                match self.get(name) {
                    Ok(value) => value.describe(out, depth + 1)?,
                    Err(_) => out.write_str("?")?,
                }
            }
            return out.write_char('}');
        }

        match self.coerce_string() {
            Some(text) => out.write_str(&text),
            None => out.write_str("unknown"),
        }
    }
}

impl Clone for JsValue {
    fn clone(&self) -> Self {
        unsafe { Self::from_borrowed(&self.context, self.raw) }
    }
}

impl Drop for JsValue {
    fn drop(&mut self) {
        unsafe { qjs::JS_FreeValue(self.context.as_raw(), self.raw) };
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.describe(f, 0)
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsValue({self})")
    }
}
