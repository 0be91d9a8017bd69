//! Array Buffers
//!
//! Copying and zero-copy `ArrayBuffer` construction and byte access.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use rquickjs::qjs;

use crate::{JsContext, JsValue, Result};

/// Host storage lent to the engine until its buffer is finalized
struct External<B, F> {
    bytes: B,
    release: F,
}

impl JsValue {
    /// Zero-filled buffer built by the global `ArrayBuffer` constructor
    pub fn new_array_buffer(context: &JsContext, len: usize) -> Result<JsValue> {
        let constructor = context.global("ArrayBuffer")?;
        constructor.construct(&[JsValue::number(context, len as f64)])
    }

    /// Buffer holding a copy of `bytes`
    pub fn new_array_buffer_copy(context: &JsContext, bytes: &[u8]) -> Result<JsValue> {
        let raw = unsafe { qjs::JS_NewArrayBufferCopy(context.as_raw(), bytes.as_ptr(), bytes.len() as _) };
        unsafe { context.wrap_result(raw) }
    }

    /// Buffer over host memory, without copying.
    ///
    /// `deallocator` receives `bytes` back exactly once: when the engine
    /// finalizes the buffer, or before returning if creation fails. It may
    /// run during a collection and must not call into the engine.
    pub fn new_array_buffer_no_copy<B, F>(context: &JsContext, bytes: B, deallocator: F) -> Result<JsValue>
    where
        B: AsMut<[u8]> + Send + 'static,
        F: FnOnce(B) + Send + 'static,
    {
        let mut external = Box::new(External {
            bytes,
            release: deallocator,
        });
        let data = external.bytes.as_mut();
        let (ptr, len) = (data.as_mut_ptr(), data.len());
        let opaque = Box::into_raw(external);

        let raw = unsafe {
            qjs::JS_NewArrayBuffer(
                context.as_raw(),
                ptr,
                len as _,
                Some(release_external::<B, F>),
                opaque.cast(),
                false,
            )
        };
        if unsafe { qjs::JS_IsException(raw) } {
            // The engine only takes ownership on success.
            let external = unsafe { Box::from_raw(opaque) };
            (external.release)(external.bytes);
        }
        unsafe { context.wrap_result(raw) }
    }

    /// `instanceof` the current global `ArrayBuffer`
    pub fn is_array_buffer(&self) -> bool {
        self.is_instance_of_global("ArrayBuffer")
    }

    /// Size in bytes, `None` for non-buffers and detached buffers
    pub fn byte_length(&self) -> Option<usize> {
        self.buffer_bytes().map(<[u8]>::len)
    }

    /// Snapshot of the buffer contents
    pub fn copy_bytes(&self) -> Option<Vec<u8>> {
        self.buffer_bytes().map(<[u8]>::to_vec)
    }

    fn buffer_bytes(&self) -> Option<&[u8]> {
        if !self.is_object() {
            return None;
        }
        let mut len = 0;
        let ptr = unsafe { qjs::JS_GetArrayBuffer(self.ctx_ptr(), &mut len, self.as_raw()) };
        if ptr.is_null() {
            self.context().discard_engine_exception();
            return None;
        }
        // The slice borrows `self`, which keeps the buffer alive.
        Some(unsafe { std::slice::from_raw_parts(ptr, len as usize) })
    }
}

unsafe extern "C" fn release_external<B, F>(_rt: *mut qjs::JSRuntime, opaque: *mut c_void, _ptr: *mut c_void)
where
    F: FnOnce(B),
{
    let external = unsafe { Box::from_raw(opaque.cast::<External<B, F>>()) };
    let released = panic::catch_unwind(AssertUnwindSafe(move || {
        let External { bytes, release } = *external;
        release(bytes);
    }));
    if released.is_err() {
        tracing::error!("Array buffer deallocator panicked");
    } else {
        tracing::trace!("Released external array buffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_array_buffer_zeroed() {
        let ctx = JsContext::standalone().unwrap();
        let buffer = JsValue::new_array_buffer(&ctx, 4).unwrap();
        assert!(buffer.is_array_buffer());
        assert_eq!(buffer.byte_length(), Some(4));
        assert_eq!(buffer.copy_bytes(), Some(vec![0; 4]));
    }

    #[test]
    fn test_copy_preserves_bytes() {
        let ctx = JsContext::standalone().unwrap();
        let buffer = JsValue::new_array_buffer_copy(&ctx, &[1, 2, 3]).unwrap();
        assert_eq!(buffer.copy_bytes(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_non_buffers() {
        let ctx = JsContext::standalone().unwrap();
        let array = ctx.evaluate_script("[1, 2]");
        assert!(!array.is_array_buffer());
        assert_eq!(array.byte_length(), None);
        assert_eq!(JsValue::number(&ctx, 1.0).copy_bytes(), None);
        assert!(ctx.exception().is_none());
    }

    #[test]
    fn test_no_copy_shares_memory() {
        let ctx = JsContext::standalone().unwrap();
        let buffer = JsValue::new_array_buffer_no_copy(&ctx, vec![9u8, 8, 7], drop).unwrap();
        ctx.set_global("buf", buffer).unwrap();
        assert_eq!(ctx.evaluate_script("new Uint8Array(buf)[2]").as_f64(), Some(7.0));

        ctx.evaluate_script("new Uint8Array(buf)[0] = 1");
        let buffer = ctx.global("buf").unwrap();
        assert_eq!(buffer.copy_bytes(), Some(vec![1, 8, 7]));
    }

    #[test]
    fn test_no_copy_deallocates_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        {
            let ctx = JsContext::standalone().unwrap();
            let buffer = JsValue::new_array_buffer_no_copy(&ctx, [0u8; 16], move |bytes| {
                assert_eq!(bytes.len(), 16);
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
            let alias = buffer.clone();
            drop(buffer);
            assert_eq!(released.load(Ordering::SeqCst), 0);
            drop(alias);
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
