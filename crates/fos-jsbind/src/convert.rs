//! Conversion Protocol
//!
//! Host types into engine values and back, plus the JSON bridge.

use std::collections::HashMap;
use std::ffi::CString;

use chrono::{DateTime, Utc};
use rquickjs::qjs;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{JsContext, JsError, JsValue, Result};

/// Conversion of a host value into an engine value
pub trait IntoJsValue {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue>;
}

/// Conversion of an engine value into a host value.
///
/// Fails with [`JsError::TypeMismatch`] when the engine type does not
/// match; no coercion beyond the engine's own is applied.
pub trait FromJsValue: Sized {
    fn from_js_value(value: &JsValue) -> Result<Self>;
}

impl JsValue {
    /// Parse JSON text with the engine's parser
    pub fn from_json(context: &JsContext, text: &str) -> Result<JsValue> {
        let input = CString::new(text)?;
        let len = input.as_bytes().len();
        let raw = unsafe { qjs::JS_ParseJSON(context.as_raw(), input.as_ptr(), len as _, c"<json>".as_ptr()) };
        unsafe { context.wrap_result(raw) }
    }

    /// Serialize with `JSON.stringify`; `None` for values without a JSON form
    pub fn to_json(&self, indent: Option<u32>) -> Result<Option<String>> {
        let context = self.context();
        let space = match indent {
            Some(width) => JsValue::number(context, width as f64),
            None => JsValue::undefined(context),
        };
        let raw = unsafe {
            qjs::JS_JSONStringify(context.as_raw(), self.as_raw(), qjs::JS_UNDEFINED, space.as_raw())
        };
        let text = unsafe { context.wrap_result(raw)? };
        Ok(text.as_string())
    }

    /// Any `Serialize` type, by way of JSON
    pub fn from_serde<T: Serialize + ?Sized>(context: &JsContext, value: &T) -> Result<JsValue> {
        let text = serde_json::to_string(value)?;
        Self::from_json(context, &text)
    }

    /// Any `DeserializeOwned` type, by way of JSON; `undefined` reads as `null`
    pub fn to_serde<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self.to_json(None)?.unwrap_or_else(|| "null".to_string());
        Ok(serde_json::from_str(&text)?)
    }
}

// ----------------------------------------------------------------------------
// Host -> engine
// ----------------------------------------------------------------------------

impl IntoJsValue for JsValue {
    fn into_js_value(self, _context: &JsContext) -> Result<JsValue> {
        Ok(self)
    }
}

impl IntoJsValue for &JsValue {
    fn into_js_value(self, _context: &JsContext) -> Result<JsValue> {
        Ok(self.clone())
    }
}

impl IntoJsValue for () {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        Ok(JsValue::undefined(context))
    }
}

impl IntoJsValue for bool {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        Ok(JsValue::bool(context, self))
    }
}

macro_rules! number_into_js {
    ($($ty:ty),*) => {
        $(
            impl IntoJsValue for $ty {
                fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
                    Ok(JsValue::number(context, self as f64))
                }
            }
        )*
    };
}

number_into_js!(f64, f32, i32, u32, i64, u64, usize);

impl IntoJsValue for &str {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        Ok(JsValue::string(context, self))
    }
}

impl IntoJsValue for String {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        Ok(JsValue::string(context, &self))
    }
}

impl IntoJsValue for &String {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        Ok(JsValue::string(context, self))
    }
}

/// `None` becomes `null`
impl<T: IntoJsValue> IntoJsValue for Option<T> {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        match self {
            Some(value) => value.into_js_value(context),
            None => Ok(JsValue::null(context)),
        }
    }
}

impl<T: IntoJsValue> IntoJsValue for Vec<T> {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        let array = JsValue::new_array(context);
        for (index, item) in self.into_iter().enumerate() {
            array.set_index(index as u32, item)?;
        }
        Ok(array)
    }
}

impl<T: IntoJsValue> IntoJsValue for HashMap<String, T> {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        let object = JsValue::new_object(context);
        for (key, value) in self {
            object.set(&key, value)?;
        }
        Ok(object)
    }
}

impl IntoJsValue for DateTime<Utc> {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        JsValue::new_date(context, &self)
    }
}

impl IntoJsValue for serde_json::Value {
    fn into_js_value(self, context: &JsContext) -> Result<JsValue> {
        JsValue::from_serde(context, &self)
    }
}

// ----------------------------------------------------------------------------
// Engine -> host
// ----------------------------------------------------------------------------

impl FromJsValue for JsValue {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromJsValue for bool {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        value.as_bool().ok_or(JsError::TypeMismatch { expected: "boolean" })
    }
}

impl FromJsValue for f64 {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        value.as_f64().ok_or(JsError::TypeMismatch { expected: "number" })
    }
}

macro_rules! number_from_js {
    ($($ty:ty),*) => {
        $(
            impl FromJsValue for $ty {
                fn from_js_value(value: &JsValue) -> Result<Self> {
                    f64::from_js_value(value).map(|number| number as $ty)
                }
            }
        )*
    };
}

number_from_js!(f32, i32, u32, i64);

impl FromJsValue for String {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        value.as_string().ok_or(JsError::TypeMismatch { expected: "string" })
    }
}

/// `null` and `undefined` read as `None`
impl<T: FromJsValue> FromJsValue for Option<T> {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        if value.is_null() || value.is_undefined() {
            Ok(None)
        } else {
            T::from_js_value(value).map(Some)
        }
    }
}

impl<T: FromJsValue> FromJsValue for Vec<T> {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        if !value.is_array() {
            return Err(JsError::TypeMismatch { expected: "array" });
        }
        value.to_vec()?.iter().map(T::from_js_value).collect()
    }
}

impl<T: FromJsValue> FromJsValue for HashMap<String, T> {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        if !value.is_object() {
            return Err(JsError::TypeMismatch { expected: "object" });
        }
        value
            .to_map()?
            .into_iter()
            .map(|(key, item)| Ok((key, T::from_js_value(&item)?)))
            .collect()
    }
}

impl FromJsValue for DateTime<Utc> {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        value.as_date().ok_or(JsError::TypeMismatch { expected: "date" })
    }
}

impl FromJsValue for serde_json::Value {
    fn from_js_value(value: &JsValue) -> Result<Self> {
        value.to_serde()
    }
}

impl JsValue {
    /// Convert into a host type, see [`FromJsValue`]
    pub fn get_as<T: FromJsValue>(&self) -> Result<T> {
        T::from_js_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn context() -> JsContext {
        JsContext::standalone().unwrap()
    }

    #[test]
    fn test_vec_into_array() {
        let ctx = context();
        let array = vec![1, 2, 3].into_js_value(&ctx).unwrap();
        assert!(array.is_array());
        assert_eq!(array.length(), 3);
        assert_eq!(array.get_as::<Vec<i32>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_map_into_object() {
        let ctx = context();
        let mut map = HashMap::new();
        map.insert("a".to_string(), "x");
        map.insert("b".to_string(), "y");
        let object = map.into_js_value(&ctx).unwrap();

        let back: HashMap<String, String> = object.get_as().unwrap();
        assert_eq!(back.get("a").map(String::as_str), Some("x"));
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_option_conversion() {
        let ctx = context();
        assert!(None::<i32>.into_js_value(&ctx).unwrap().is_null());
        assert_eq!(JsValue::undefined(&ctx).get_as::<Option<String>>().unwrap(), None);
        assert_eq!(JsValue::number(&ctx, 4.0).get_as::<Option<f64>>().unwrap(), Some(4.0));
    }

    #[test]
    fn test_type_mismatch() {
        let ctx = context();
        let err = JsValue::string(&ctx, "3").get_as::<f64>().unwrap_err();
        assert!(matches!(err, JsError::TypeMismatch { expected: "number" }));
        assert!(JsValue::new_object(&ctx).get_as::<Vec<i32>>().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let ctx = context();
        let value = JsValue::from_json(&ctx, r#"{"name":"fOS","tags":["a","b"],"n":1.5}"#).unwrap();
        assert_eq!(value.get("name").unwrap().as_string().as_deref(), Some("fOS"));
        assert_eq!(value.get("tags").unwrap().length(), 2);
        assert_eq!(
            value.to_json(None).unwrap().as_deref(),
            Some(r#"{"name":"fOS","tags":["a","b"],"n":1.5}"#)
        );
    }

    #[test]
    fn test_json_indent() {
        let ctx = context();
        let value = JsValue::from_json(&ctx, "[1]").unwrap();
        assert_eq!(value.to_json(Some(2)).unwrap().as_deref(), Some("[\n  1\n]"));
    }

    #[test]
    fn test_json_invalid() {
        let ctx = context();
        let err = JsValue::from_json(&ctx, "{ nope").unwrap_err();
        assert_eq!(err.exception().unwrap().get("name").unwrap().as_string().as_deref(), Some("SyntaxError"));
    }

    #[test]
    fn test_to_json_undefined() {
        let ctx = context();
        assert_eq!(JsValue::undefined(&ctx).to_json(None).unwrap(), None);
        assert!(ctx.evaluate_script("({ f() {} }).f").to_json(None).unwrap().is_none());
    }

    #[test]
    fn test_serde_bridge() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Page {
            url: String,
            depth: u32,
        }

        let ctx = context();
        let page = Page { url: "about:blank".into(), depth: 2 };
        let value = JsValue::from_serde(&ctx, &page).unwrap();
        assert_eq!(value.get("depth").unwrap().as_f64(), Some(2.0));
        assert_eq!(value.to_serde::<Page>().unwrap(), page);
    }

    #[test]
    fn test_serde_json_value() {
        let ctx = context();
        let value = json!({ "ok": true, "items": [null, 3] }).into_js_value(&ctx).unwrap();
        let back: serde_json::Value = value.get_as().unwrap();
        assert_eq!(back, json!({ "ok": true, "items": [null, 3] }));
    }
}
