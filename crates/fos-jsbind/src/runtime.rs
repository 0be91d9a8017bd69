//! JavaScript Runtime
//!
//! Engine handle shared by every context created from it.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use rquickjs::qjs;

use crate::{Result, RuntimeConfig};

/// QuickJS runtime handle
///
/// Cloning is cheap and every clone refers to the same engine runtime.
/// Contexts hold a clone, so the runtime is released after the last
/// context built from it.
#[derive(Clone)]
pub struct JsRuntime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    runtime: rquickjs::Runtime,
    config: RuntimeConfig,
    /// Class id of host functions, 0 until first registered
    host_class: Cell<qjs::JSClassID>,
    /// Nesting of host-driven engine entries
    depth: Cell<usize>,
}

impl JsRuntime {
    /// Create a new JavaScript runtime with default limits
    pub fn new() -> Result<Self> {
        Self::with_config(&RuntimeConfig::default())
    }

    /// Create a new JavaScript runtime
    pub fn with_config(config: &RuntimeConfig) -> Result<Self> {
        tracing::info!("Creating JavaScript runtime");
        let runtime = rquickjs::Runtime::new()?;
        config.apply(&runtime);

        Ok(Self {
            inner: Rc::new(RuntimeInner {
                runtime,
                config: config.clone(),
                host_class: Cell::new(0),
                depth: Cell::new(0),
            }),
        })
    }

    /// Limits this runtime was created with
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Force a garbage collection cycle
    pub fn run_gc(&self) {
        self.inner.runtime.run_gc();
    }

    /// Whether both handles refer to the same engine runtime
    pub fn same_runtime(&self, other: &JsRuntime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn engine(&self) -> &rquickjs::Runtime {
        &self.inner.runtime
    }

    pub(crate) fn host_class(&self) -> Option<qjs::JSClassID> {
        match self.inner.host_class.get() {
            0 => None,
            id => Some(id),
        }
    }

    pub(crate) fn set_host_class(&self, id: qjs::JSClassID) {
        self.inner.host_class.set(id);
    }

    /// Mark an entry into the engine.
    ///
    /// The stack-overflow guard is re-anchored only at the outermost
    /// entry, so nested callbacks keep the limit of their caller.
    pub(crate) fn enter(&self, rt: *mut qjs::JSRuntime) -> EngineEntry<'_> {
        let depth = &self.inner.depth;
        if depth.get() == 0 {
            unsafe { qjs::JS_UpdateStackTop(rt) };
        }
        depth.set(depth.get() + 1);
        EngineEntry { depth }
    }
}

impl fmt::Debug for JsRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsRuntime")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`JsRuntime::enter`]
pub(crate) struct EngineEntry<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for EngineEntry<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_clone_shares_engine() {
        let runtime = JsRuntime::new().unwrap();
        let other = runtime.clone();
        assert!(runtime.same_runtime(&other));
        assert!(!runtime.same_runtime(&JsRuntime::new().unwrap()));
    }

    #[test]
    fn test_runtime_keeps_config() {
        let config = RuntimeConfig {
            gc_threshold: Some(1024 * 1024),
            ..RuntimeConfig::unlimited()
        };
        let runtime = JsRuntime::with_config(&config).unwrap();
        assert_eq!(runtime.config(), &config);
        runtime.run_gc();
    }

    #[test]
    fn test_host_class_unregistered() {
        let runtime = JsRuntime::new().unwrap();
        assert_eq!(runtime.host_class(), None);
        runtime.set_host_class(7);
        assert_eq!(runtime.host_class(), Some(7));
    }
}
