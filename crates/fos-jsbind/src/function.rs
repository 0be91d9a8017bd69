//! Host Functions
//!
//! Rust closures exposed to script as callable, constructible functions.
//!
//! Every host function is an object of one engine class whose `call` hook
//! serves both plain calls and `new`. The closure lives in a heap record
//! attached as the object's opaque data; the class finalizer frees it.

use std::ffi::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Weak;

use rquickjs::qjs;

use crate::context::ContextInner;
use crate::object::Atom;
use crate::{JsContext, JsError, JsValue, Result};

/// Signature of a host closure: context, `this` (absent for `undefined`
/// and for construction) and the exact arguments passed by the caller
pub type HostFunction = dyn Fn(&JsContext, Option<&JsValue>, &[JsValue]) -> Result<JsValue>;

struct CallbackRecord {
    context: Weak<ContextInner>,
    callback: Box<HostFunction>,
}

impl JsValue {
    /// Wrap `callback` as a script function named `name`.
    ///
    /// The closure receives its context on every call and should not
    /// capture values or contexts itself: the collector cannot see such
    /// captures, so a cycle through them is never freed.
    pub fn new_function<F>(context: &JsContext, name: &str, callback: F) -> Result<JsValue>
    where
        F: Fn(&JsContext, Option<&JsValue>, &[JsValue]) -> Result<JsValue> + 'static,
    {
        let class_id = host_class_id(context)?;
        let ctx = context.as_raw();

        let function_proto = unsafe { JsValue::from_owned(context, qjs::JS_GetFunctionProto(ctx)) };
        let function = unsafe {
            context.wrap_result(qjs::JS_NewObjectProtoClass(ctx, function_proto.as_raw(), class_id))?
        };

        let record = Box::new(CallbackRecord {
            context: context.downgrade(),
            callback: Box::new(callback),
        });
        unsafe {
            qjs::JS_SetOpaque(function.as_raw(), Box::into_raw(record).cast());
            qjs::JS_SetConstructorBit(ctx, function.as_raw(), true);
        }

        function.define_raw(c"length", JsValue::number(context, 0.0), qjs::JS_PROP_CONFIGURABLE)?;
        function.define_raw(c"name", JsValue::string(context, name), qjs::JS_PROP_CONFIGURABLE)?;

        let prototype = JsValue::new_object(context);
        prototype.define_raw(
            c"constructor",
            function.clone(),
            qjs::JS_PROP_WRITABLE | qjs::JS_PROP_CONFIGURABLE,
        )?;
        function.define_raw(c"prototype", prototype, qjs::JS_PROP_WRITABLE)?;

        install_has_instance(context, &function)?;

        tracing::trace!(name, "Created host function");
        Ok(function)
    }

    /// Compile a script function from its parts.
    ///
    /// `starting_line` is the line reported for the first line of `body`;
    /// 0 and 1 both mean line 1. The parts are script source and are
    /// trusted like any evaluated code.
    pub fn new_function_from_source(
        context: &JsContext,
        name: Option<&str>,
        params: &[&str],
        body: &str,
        source_url: Option<&str>,
        starting_line: u32,
    ) -> Result<JsValue> {
        // The header shares the first line with the body.
        let source = format!(
            "(function {}({}) {{ {}\n}})",
            name.unwrap_or(""),
            params.join(", "),
            body
        );
        let function = context.evaluate(&source, None, source_url, starting_line)?;
        if !function.is_function() {
            return Err(JsError::TypeMismatch { expected: "function" });
        }
        Ok(function)
    }
}

/// Class id of host functions for this runtime, registering it on first use
fn host_class_id(context: &JsContext) -> Result<qjs::JSClassID> {
    let runtime = context.runtime();
    if let Some(id) = runtime.host_class() {
        return Ok(id);
    }

    let rt = unsafe { qjs::JS_GetRuntime(context.as_raw()) };
    let mut id: qjs::JSClassID = 0;
    let class = qjs::JSClassDef {
        class_name: c"HostFunction".as_ptr(),
        finalizer: Some(finalize_host_function),
        gc_mark: None,
        call: Some(call_host_function),
        exotic: ptr::null_mut(),
    };
    unsafe {
        qjs::JS_NewClassID(rt, &mut id);
        if qjs::JS_NewClass(rt, id, &class) != 0 {
            return Err(JsError::Engine(rquickjs::Error::Allocation));
        }
    }

    tracing::trace!(class_id = id, "Registered host function class");
    runtime.set_host_class(id);
    Ok(id)
}

/// Own `Symbol.hasInstance`, so `instanceof` compares prototypes directly
fn install_has_instance(context: &JsContext, function: &JsValue) -> Result<()> {
    let ctx = context.as_raw();
    let symbol = context.global("Symbol")?.get("hasInstance")?;
    let atom = Atom::from_value(context, &symbol)?;
    let hook = unsafe {
        context.wrap_result(qjs::JS_NewCFunction2(
            ctx,
            Some(host_has_instance),
            c"[Symbol.hasInstance]".as_ptr(),
            1,
            qjs::JSCFunctionEnum_JS_CFUNC_generic,
            0,
        ))?
    };
    let status = unsafe { qjs::JS_DefinePropertyValue(ctx, function.as_raw(), atom.raw(), hook.into_raw(), 0) };
    context.check_status(status).map(drop)
}

/// `call` hook of the host function class
unsafe extern "C" fn call_host_function(
    ctx: *mut qjs::JSContext,
    func_obj: qjs::JSValue,
    this_val: qjs::JSValue,
    argc: c_int,
    argv: *mut qjs::JSValue,
    flags: c_int,
) -> qjs::JSValue {
    let constructing = flags & qjs::JS_CALL_FLAG_CONSTRUCTOR as c_int != 0;

    let record = unsafe { qjs::JS_GetOpaque(func_obj, qjs::JS_GetClassID(func_obj)) }
        .cast::<CallbackRecord>()
        .cast_const();
    if record.is_null() {
        return unsafe { throw_internal(ctx, c"host function has no callback") };
    }
    // The opaque record lives until the finalizer, and `function` below
    // keeps the object alive for the duration of the call.
    let record = unsafe { &*record };
    let Some(inner) = record.context.upgrade() else {
        tracing::debug!("Host function called after its context was released");
        return unsafe { throw_internal(ctx, c"host function context was released") };
    };
    let context = JsContext::from_inner(inner);

    let function = unsafe { JsValue::from_borrowed(&context, func_obj) };
    let args: Vec<JsValue> = (0..argc.max(0) as usize)
        .map(|i| unsafe { JsValue::from_borrowed(&context, *argv.add(i)) })
        .collect();
    let this = (!constructing && !unsafe { qjs::JS_IsUndefined(this_val) })
        .then(|| unsafe { JsValue::from_borrowed(&context, this_val) });

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        (record.callback)(&context, this.as_ref(), &args)
    }));
    let Ok(result) = outcome else {
        tracing::error!("Host function panicked");
        return unsafe { throw_internal(ctx, c"host function panicked") };
    };
    let result = result.and_then(|value| {
        context.check_owner(&value)?;
        if constructing {
            finish_construct(&function, value)
        } else {
            Ok(value)
        }
    });

    match result {
        Ok(value) => value.into_raw(),
        Err(err) => {
            tracing::debug!(error = %err, "Host function threw");
            context.throw(err)
        }
    }
}

/// A constructed result is always an object whose prototype is the
/// constructor's `prototype` property
fn finish_construct(function: &JsValue, value: JsValue) -> Result<JsValue> {
    let context = function.context();
    let object = if value.is_object() {
        value
    } else {
        JsValue::new_object(context)
    };
    let prototype = function.get("prototype")?;
    if prototype.is_object() || prototype.is_null() {
        object.set_prototype(&prototype)?;
    }
    Ok(object)
}

/// `Symbol.hasInstance` of host functions: strict equality between the
/// constructor's `prototype` and the candidate's prototype
unsafe extern "C" fn host_has_instance(
    ctx: *mut qjs::JSContext,
    this_val: qjs::JSValue,
    argc: c_int,
    argv: *mut qjs::JSValue,
) -> qjs::JSValue {
    if argc < 1 {
        return qjs::JS_FALSE;
    }
    let candidate = unsafe { *argv };
    if unsafe { qjs::JS_VALUE_GET_TAG(candidate) } != qjs::JS_TAG_OBJECT {
        return qjs::JS_FALSE;
    }

    unsafe {
        let expected = qjs::JS_GetPropertyStr(ctx, this_val, c"prototype".as_ptr());
        if qjs::JS_IsException(expected) {
            return expected;
        }
        let actual = qjs::JS_GetPrototype(ctx, candidate);
        if qjs::JS_IsException(actual) {
            qjs::JS_FreeValue(ctx, expected);
            return actual;
        }
        let same = qjs::JS_IsStrictEqual(ctx, expected, actual);
        qjs::JS_FreeValue(ctx, expected);
        qjs::JS_FreeValue(ctx, actual);
        if same { qjs::JS_TRUE } else { qjs::JS_FALSE }
    }
}

unsafe extern "C" fn finalize_host_function(_rt: *mut qjs::JSRuntime, value: qjs::JSValue) {
    let record = unsafe { qjs::JS_GetOpaque(value, qjs::JS_GetClassID(value)) }.cast::<CallbackRecord>();
    if record.is_null() {
        return;
    }
    let record = unsafe { Box::from_raw(record) };
    if panic::catch_unwind(AssertUnwindSafe(move || drop(record))).is_err() {
        tracing::error!("Host function callback panicked while dropping");
    } else {
        tracing::trace!("Released host function callback");
    }
}

unsafe fn throw_internal(ctx: *mut qjs::JSContext, message: &std::ffi::CStr) -> qjs::JSValue {
    unsafe { qjs::JS_ThrowInternalError(ctx, c"%s".as_ptr(), message.as_ptr()) }
}
