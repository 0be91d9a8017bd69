//! Object Operations
//!
//! Property access, invocation, equality and integrity levels on [`JsValue`].

use std::ffi::CStr;

use rquickjs::qjs;

use crate::{IntoJsValue, JsContext, JsValue, Result};

/// Interned property key, released on drop
pub(crate) struct Atom<'a> {
    context: &'a JsContext,
    raw: qjs::JSAtom,
}

impl<'a> Atom<'a> {
    pub(crate) fn new(context: &'a JsContext, name: &str) -> Result<Self> {
        let raw = unsafe { qjs::JS_NewAtomLen(context.as_raw(), name.as_ptr().cast(), name.len() as _) };
        if raw == qjs::JS_ATOM_NULL {
            return Err(context.take_engine_exception());
        }
        Ok(Self { context, raw })
    }

    /// Key for a symbol or any other property key value
    pub(crate) fn from_value(context: &'a JsContext, key: &JsValue) -> Result<Self> {
        let raw = unsafe { qjs::JS_ValueToAtom(context.as_raw(), key.as_raw()) };
        if raw == qjs::JS_ATOM_NULL {
            return Err(context.take_engine_exception());
        }
        Ok(Self { context, raw })
    }

    pub(crate) fn raw(&self) -> qjs::JSAtom {
        self.raw
    }
}

impl Drop for Atom<'_> {
    fn drop(&mut self) {
        unsafe { qjs::JS_FreeAtom(self.context.as_raw(), self.raw) };
    }
}

impl JsValue {
    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Enumerable property names, own and inherited, in engine `for-in` order
    pub fn property_names(&self) -> Result<Vec<String>> {
        if !self.is_object() {
            return Ok(Vec::new());
        }
        let keys = self.context().enumerator()?.call(None, std::slice::from_ref(self))?;
        Ok(keys
            .to_vec()?
            .iter()
            .filter_map(JsValue::as_string)
            .collect())
    }

    /// Whether `name` is reachable on this object or its prototype chain
    pub fn has_property(&self, name: &str) -> bool {
        if !self.is_object() {
            return false;
        }
        let context = self.context();
        let found = Atom::new(context, name).and_then(|atom| {
            let status = unsafe { qjs::JS_HasProperty(context.as_raw(), self.as_raw(), atom.raw()) };
            context.check_status(status)
        });
        context.catch(found).is_some_and(|status| status > 0)
    }

    /// Delete an own property.
    ///
    /// `false` when there is no such own property or it cannot be deleted.
    /// Never throws.
    pub fn remove_property(&self, name: &str) -> bool {
        let context = self.context();
        let Ok(atom) = Atom::new(context, name) else {
            return false;
        };
        let ctx = context.as_raw();
        let own = unsafe { qjs::JS_GetOwnProperty(ctx, std::ptr::null_mut(), self.as_raw(), atom.raw()) };
        if own <= 0 {
            if own < 0 {
                context.discard_engine_exception();
            }
            return false;
        }
        let status = unsafe { qjs::JS_DeleteProperty(ctx, self.as_raw(), atom.raw(), 0) };
        if status < 0 {
            context.discard_engine_exception();
        }
        status > 0
    }

    pub fn get(&self, name: &str) -> Result<JsValue> {
        let context = self.context();
        let atom = Atom::new(context, name)?;
        unsafe { context.wrap_result(qjs::JS_GetProperty(context.as_raw(), self.as_raw(), atom.raw())) }
    }

    pub fn set(&self, name: &str, value: impl IntoJsValue) -> Result<()> {
        let context = self.context();
        let value = value.into_js_value(context)?;
        context.check_owner(&value)?;
        let atom = Atom::new(context, name)?;
        let status = unsafe {
            qjs::JS_SetProperty(context.as_raw(), self.as_raw(), atom.raw(), value.into_raw())
        };
        context.check_status(status).map(drop)
    }

    /// Element at `index`, the property named by the decimal index
    pub fn get_index(&self, index: u32) -> Result<JsValue> {
        let context = self.context();
        unsafe { context.wrap_result(qjs::JS_GetPropertyUint32(context.as_raw(), self.as_raw(), index)) }
    }

    pub fn set_index(&self, index: u32, value: impl IntoJsValue) -> Result<()> {
        let context = self.context();
        let value = value.into_js_value(context)?;
        context.check_owner(&value)?;
        let status = unsafe {
            qjs::JS_SetPropertyUint32(context.as_raw(), self.as_raw(), index, value.into_raw())
        };
        context.check_status(status).map(drop)
    }

    /// The `length` property as an integer, 0 when absent or not a number
    pub fn length(&self) -> usize {
        match self.get("length").ok().and_then(|length| length.as_f64()) {
            Some(length) if length.is_finite() && length > 0.0 => length as usize,
            _ => 0,
        }
    }

    /// Own data property with explicit `JS_PROP_*` flags, bypassing setters
    pub(crate) fn define_raw(&self, name: &CStr, value: JsValue, flags: u32) -> Result<()> {
        let context = self.context();
        context.check_owner(&value)?;
        let status = unsafe {
            qjs::JS_DefinePropertyValueStr(
                context.as_raw(),
                self.as_raw(),
                name.as_ptr(),
                value.into_raw(),
                flags as _,
            )
        };
        context.check_status(status).map(drop)
    }

    pub fn prototype(&self) -> Result<JsValue> {
        let context = self.context();
        unsafe { context.wrap_result(qjs::JS_GetPrototype(context.as_raw(), self.as_raw())) }
    }

    pub fn set_prototype(&self, prototype: &JsValue) -> Result<()> {
        let context = self.context();
        context.check_owner(prototype)?;
        let status = unsafe { qjs::JS_SetPrototype(context.as_raw(), self.as_raw(), prototype.as_raw()) };
        context.check_status(status).map(drop)
    }

    // ------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------

    /// Call as a function, with `this` bound to `undefined` when `None`
    pub fn call(&self, this: Option<&JsValue>, args: &[JsValue]) -> Result<JsValue> {
        let context = self.context();
        let mut argv = marshal(context, args)?;
        let this = match this {
            Some(this) => {
                context.check_owner(this)?;
                this.as_raw()
            }
            None => qjs::JS_UNDEFINED,
        };

        let _entry = context.enter();
        let raw = unsafe {
            qjs::JS_Call(context.as_raw(), self.as_raw(), this, argv.len() as _, argv.as_mut_ptr())
        };
        unsafe { context.wrap_result(raw) }
    }

    /// Call as a constructor, like `new f(...args)`
    pub fn construct(&self, args: &[JsValue]) -> Result<JsValue> {
        let context = self.context();
        let mut argv = marshal(context, args)?;

        let _entry = context.enter();
        let raw = unsafe {
            qjs::JS_CallConstructor(context.as_raw(), self.as_raw(), argv.len() as _, argv.as_mut_ptr())
        };
        unsafe { context.wrap_result(raw) }
    }

    /// Look up `name` and call it with this value as `this`
    pub fn invoke_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue> {
        self.get(name)?.call(Some(self), args)
    }

    // ------------------------------------------------------------------
    // Equality
    // ------------------------------------------------------------------

    /// `===`
    pub fn is_equal(&self, other: &JsValue) -> bool {
        if self.context().check_owner(other).is_err() {
            return false;
        }
        unsafe { qjs::JS_IsStrictEqual(self.ctx_ptr(), self.as_raw(), other.as_raw()) }
    }

    /// `==`; a throwing conversion is routed ambiently and compares unequal
    pub fn is_equal_with_coercion(&self, other: &JsValue) -> bool {
        let context = self.context();
        let equal = context.check_owner(other).and_then(|()| {
            let status = unsafe { qjs::JS_IsEqual(context.as_raw(), self.as_raw(), other.as_raw()) };
            context.check_status(status)
        });
        context.catch(equal).is_some_and(|status| status > 0)
    }

    /// `instanceof`; a throwing check is routed ambiently and reports `false`
    pub fn is_instance_of(&self, constructor: &JsValue) -> bool {
        let context = self.context();
        let result = context.check_owner(constructor).and_then(|()| {
            let status =
                unsafe { qjs::JS_IsInstanceOf(context.as_raw(), self.as_raw(), constructor.as_raw()) };
            context.check_status(status)
        });
        context.catch(result).is_some_and(|status| status > 0)
    }

    // ------------------------------------------------------------------
    // Integrity levels
    // ------------------------------------------------------------------

    pub fn freeze(&self) -> Result<()> {
        self.object_builtin("freeze").map(drop)
    }

    pub fn seal(&self) -> Result<()> {
        self.object_builtin("seal").map(drop)
    }

    pub fn prevent_extensions(&self) -> Result<()> {
        self.object_builtin("preventExtensions").map(drop)
    }

    pub fn is_frozen(&self) -> Result<bool> {
        Ok(self.object_builtin("isFrozen")?.as_bool().unwrap_or(false))
    }

    pub fn is_sealed(&self) -> Result<bool> {
        Ok(self.object_builtin("isSealed")?.as_bool().unwrap_or(false))
    }

    pub fn is_extensible(&self) -> Result<bool> {
        Ok(self.object_builtin("isExtensible")?.as_bool().unwrap_or(false))
    }

    /// `Object[method](this)` on the current global `Object`
    fn object_builtin(&self, method: &str) -> Result<JsValue> {
        self.context()
            .global("Object")?
            .invoke_method(method, std::slice::from_ref(self))
    }
}

/// Borrowed argument vector; the engine copies what it keeps
fn marshal(context: &JsContext, args: &[JsValue]) -> Result<Vec<qjs::JSValue>> {
    args.iter()
        .map(|arg| context.check_owner(arg).map(|()| arg.as_raw()))
        .collect()
}
