//! Execution Context
//!
//! One engine context plus its exception state.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::ffi::CString;
use std::fmt;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use rquickjs::qjs;

use crate::runtime::EngineEntry;
use crate::{IntoJsValue, JsError, JsRuntime, JsValue, Result};

const DEFAULT_SOURCE_URL: &str = "<input>";

/// Collects for-in keys, which covers inherited enumerable names
const ENUMERATE_SOURCE: &str =
    "(function (o) { var k = []; for (var p in o) k[k.length] = p; return k; })";

type ExceptionHandler = Rc<dyn Fn(&JsContext, JsValue)>;

/// JavaScript execution context
///
/// Errors surface in one of two ways. Methods returning [`Result`] hand the
/// thrown value back directly. The ambient methods (`evaluate_script`,
/// `check_syntax`, `define_property`, [`JsContext::catch`]) instead route it
/// to the exception handler when one is set, or store it in a single slot
/// that [`JsContext::exception`] empties.
#[derive(Clone)]
pub struct JsContext {
    inner: Rc<ContextInner>,
}

pub(crate) struct ContextInner {
    raw: NonNull<qjs::JSContext>,
    /// Owns the engine context behind `raw`; released after the slots
    _context: rquickjs::Context,
    runtime: JsRuntime,
    exception: Cell<Option<qjs::JSValue>>,
    handler: RefCell<Option<ExceptionHandler>>,
    enumerate: Cell<Option<qjs::JSValue>>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let ctx = self.raw.as_ptr();
        for slot in [self.exception.take(), self.enumerate.take()] {
            if let Some(raw) = slot {
                unsafe { qjs::JS_FreeValue(ctx, raw) };
            }
        }
        tracing::debug!("Releasing JavaScript context");
    }
}

impl JsContext {
    /// Create a context on an existing runtime
    pub fn new(runtime: &JsRuntime) -> Result<Self> {
        let context = rquickjs::Context::full(runtime.engine())?;
        tracing::debug!("Creating JavaScript context");

        Ok(Self {
            inner: Rc::new(ContextInner {
                raw: context.as_raw(),
                _context: context,
                runtime: runtime.clone(),
                exception: Cell::new(None),
                handler: RefCell::new(None),
                enumerate: Cell::new(None),
            }),
        })
    }

    /// Create a context on its own default runtime
    pub fn standalone() -> Result<Self> {
        Self::new(&JsRuntime::new()?)
    }

    /// Runtime this context belongs to
    pub fn runtime(&self) -> &JsRuntime {
        &self.inner.runtime
    }

    /// Whether both handles refer to the same context
    pub fn same_context(&self, other: &JsContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The global object
    pub fn global_object(&self) -> JsValue {
        unsafe { JsValue::from_owned(self, qjs::JS_GetGlobalObject(self.as_raw())) }
    }

    /// Read a global binding
    pub fn global(&self, name: &str) -> Result<JsValue> {
        self.global_object().get(name)
    }

    /// Assign a global binding
    pub fn set_global(&self, name: &str, value: impl IntoJsValue) -> Result<()> {
        self.global_object().set(name, value)
    }

    /// Evaluate a program.
    ///
    /// `this` binds the program's `this` (the global object when `None`),
    /// `source_url` names the script in stack traces and `starting_line`
    /// is the 1-based line number reported for the first line.
    pub fn evaluate(
        &self,
        source: &str,
        this: Option<&JsValue>,
        source_url: Option<&str>,
        starting_line: u32,
    ) -> Result<JsValue> {
        self.eval_with_flags(
            source,
            this,
            source_url,
            starting_line,
            qjs::JS_EVAL_TYPE_GLOBAL,
        )
    }

    /// Evaluate a program, routing any exception ambiently.
    ///
    /// Returns `undefined` when evaluation fails.
    pub fn evaluate_script(&self, source: &str) -> JsValue {
        self.catch(self.evaluate(source, None, None, 0))
            .unwrap_or_else(|| JsValue::undefined(self))
    }

    /// Compile without running. A syntax error is routed ambiently.
    pub fn check_syntax(&self, source: &str, source_url: Option<&str>, starting_line: u32) -> bool {
        let compiled = self.eval_with_flags(
            source,
            None,
            source_url,
            starting_line,
            qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_COMPILE_ONLY,
        );
        self.catch(compiled).is_some()
    }

    /// Advisory collection; protected values are never collected
    pub fn collect_garbage(&self) {
        self.inner.runtime.run_gc();
    }

    /// Take the pending exception, leaving the slot empty
    pub fn exception(&self) -> Option<JsValue> {
        self.inner
            .exception
            .take()
            .map(|raw| unsafe { JsValue::from_owned(self, raw) })
    }

    /// Report an exception: to the handler if one is set, else into the slot.
    ///
    /// A value of another runtime is replaced by an `Error` of this context.
    pub fn set_exception(&self, value: JsValue) {
        let value = self.adopt(value);
        let handler = self.inner.handler.borrow().clone();
        match handler {
            Some(handler) => handler(self, value),
            None => {
                let previous = self.inner.exception.replace(Some(value.into_raw()));
                if let Some(raw) = previous {
                    unsafe { qjs::JS_FreeValue(self.as_raw(), raw) };
                }
            }
        }
    }

    /// Route exceptions to `handler` instead of the slot, replacing any previous handler
    pub fn set_exception_handler<F>(&self, handler: F)
    where
        F: Fn(&JsContext, JsValue) + 'static,
    {
        *self.inner.handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Go back to storing exceptions in the slot
    pub fn clear_exception_handler(&self) {
        self.inner.handler.borrow_mut().take();
    }

    /// Turn an explicit result into the ambient protocol
    pub fn catch<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(error = %err, "Captured JavaScript exception");
                self.set_exception(self.error_value(err));
                None
            }
        }
    }

    /// Engine value for an error: thrown values as-is, anything else as an `Error`.
    ///
    /// The result always belongs to this context's runtime.
    pub fn error_value(&self, err: JsError) -> JsValue {
        match err {
            JsError::Exception(value) => self.adopt(value),
            JsError::Host(message) => JsValue::new_error(self, &message),
            other => JsValue::new_error(self, &other.to_string()),
        }
    }

    /// `value` when it may enter this runtime, else a `ForeignValue` error
    fn adopt(&self, value: JsValue) -> JsValue {
        match self.check_owner(&value) {
            Ok(()) => value,
            Err(err) => JsValue::new_error(self, &err.to_string()),
        }
    }

    pub(crate) fn as_raw(&self) -> *mut qjs::JSContext {
        self.inner.raw.as_ptr()
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn enter(&self) -> EngineEntry<'_> {
        let rt = unsafe { qjs::JS_GetRuntime(self.as_raw()) };
        self.inner.runtime.enter(rt)
    }

    /// Fails with [`JsError::ForeignValue`] for values of another runtime
    pub(crate) fn check_owner(&self, value: &JsValue) -> Result<()> {
        if value.context().runtime().same_runtime(&self.inner.runtime) {
            Ok(())
        } else {
            Err(JsError::ForeignValue)
        }
    }

    /// Wrap an owned engine result, turning `JS_EXCEPTION` into the thrown value
    pub(crate) unsafe fn wrap_result(&self, raw: qjs::JSValue) -> Result<JsValue> {
        if unsafe { qjs::JS_IsException(raw) } {
            Err(self.take_engine_exception())
        } else {
            Ok(unsafe { JsValue::from_owned(self, raw) })
        }
    }

    /// Check a status code where negative means an exception is pending
    pub(crate) fn check_status(&self, status: std::os::raw::c_int) -> Result<std::os::raw::c_int> {
        if status < 0 {
            Err(self.take_engine_exception())
        } else {
            Ok(status)
        }
    }

    pub(crate) fn take_engine_exception(&self) -> JsError {
        let raw = unsafe { qjs::JS_GetException(self.as_raw()) };
        JsError::Exception(unsafe { JsValue::from_owned(self, raw) })
    }

    /// Drop a pending engine exception nobody will observe
    pub(crate) fn discard_engine_exception(&self) {
        unsafe {
            let raw = qjs::JS_GetException(self.as_raw());
            qjs::JS_FreeValue(self.as_raw(), raw);
        }
    }

    /// Throw `err` into the engine and return `JS_EXCEPTION`
    pub(crate) fn throw(&self, err: JsError) -> qjs::JSValue {
        let value = self.error_value(err);
        unsafe { qjs::JS_Throw(self.as_raw(), value.into_raw()) }
    }

    /// Private for-in helper, compiled on first use
    pub(crate) fn enumerator(&self) -> Result<JsValue> {
        if let Some(raw) = self.inner.enumerate.get() {
            return Ok(unsafe { JsValue::from_borrowed(self, raw) });
        }
        let function = self.evaluate(ENUMERATE_SOURCE, None, Some("<enumerate>"), 0)?;
        let previous = self.inner.enumerate.replace(Some(function.clone().into_raw()));
        if let Some(raw) = previous {
            unsafe { qjs::JS_FreeValue(self.as_raw(), raw) };
        }
        Ok(function)
    }

    fn eval_with_flags(
        &self,
        source: &str,
        this: Option<&JsValue>,
        source_url: Option<&str>,
        starting_line: u32,
        flags: u32,
    ) -> Result<JsValue> {
        let input = CString::new(offset_lines(source, starting_line).into_owned())?;
        let filename = CString::new(source_url.unwrap_or(DEFAULT_SOURCE_URL))?;
        let len = input.as_bytes().len();
        let ctx = self.as_raw();

        let _entry = self.enter();
        let raw = match this {
            Some(this) => {
                self.check_owner(this)?;
                unsafe {
                    qjs::JS_EvalThis(
                        ctx,
                        this.as_raw(),
                        input.as_ptr(),
                        len as _,
                        filename.as_ptr(),
                        flags as _,
                    )
                }
            }
            None => unsafe {
                qjs::JS_Eval(ctx, input.as_ptr(), len as _, filename.as_ptr(), flags as _)
            },
        };
        unsafe { self.wrap_result(raw) }
    }
}

impl fmt::Debug for JsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsContext")
            .field("runtime", &self.inner.runtime)
            .finish_non_exhaustive()
    }
}

/// QuickJS has no line offset parameter; pad with newlines instead.
fn offset_lines(source: &str, starting_line: u32) -> Cow<'_, str> {
    if starting_line <= 1 {
        Cow::Borrowed(source)
    } else {
        let mut padded = "\n".repeat(starting_line as usize - 1);
        padded.push_str(source);
        Cow::Owned(padded)
    }
}
