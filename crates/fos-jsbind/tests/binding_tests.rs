//! Integration tests for fos-jsbind
//!
//! Tests for evaluation, host functions, accessors, array buffers and
//! object operations through the public API.

use fos_jsbind::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn context() -> JsContext {
    init_tracing();
    JsContext::standalone().unwrap()
}

fn sum(ctx: &JsContext, _this: Option<&JsValue>, args: &[JsValue]) -> Result<JsValue> {
    let a = args.first().and_then(JsValue::as_f64).unwrap_or(0.0);
    let b = args.get(1).and_then(JsValue::as_f64).unwrap_or(0.0);
    Ok(JsValue::number(ctx, a + b))
}

// ============================================================================
// EVALUATION
// ============================================================================

#[test]
fn test_evaluate_arithmetic() {
    let ctx = context();
    let result = ctx.evaluate("1 + 1", None, None, 0).unwrap();
    assert!(result.is_number());
    assert_eq!(result.as_f64(), Some(2.0));
}

#[test]
fn test_evaluate_array() {
    let ctx = context();
    let array = ctx.evaluate_script(r#"[3, "BMW", "Volvo"]"#);
    assert!(array.is_array());
    assert_eq!(array.length(), 3);

    let items = array.to_vec().unwrap();
    assert_eq!(items[0].as_f64(), Some(3.0));
    assert_eq!(items[1].as_string().as_deref(), Some("BMW"));
    assert_eq!(items[2].as_string().as_deref(), Some("Volvo"));
    assert_eq!(array.to_string(), "[3, BMW, Volvo]");
}

#[test]
fn test_syntax_check_leaves_no_trace() {
    let ctx = context();
    assert!(!ctx.check_syntax("function (", Some("broken.js"), 1));
    let exception = ctx.exception().unwrap();
    assert_eq!(exception.get("name").unwrap().as_string().as_deref(), Some("SyntaxError"));
    assert!(ctx.exception().is_none());
}

#[test]
fn test_uncaught_exception_does_not_abort() {
    let ctx = context();
    for _ in 0..3 {
        assert!(ctx.evaluate_script("undefinedFunction()").is_undefined());
    }
    assert!(ctx.exception().unwrap().is_error());
    assert_eq!(ctx.evaluate_script("40 + 2").as_f64(), Some(42.0));
}

// ============================================================================
// HOST FUNCTIONS
// ============================================================================

#[test]
fn test_call_matches_script_call() {
    let ctx = context();
    let function = JsValue::new_function(&ctx, "myFunction", sum).unwrap();
    ctx.set_global("myFunction", &function).unwrap();

    let direct = function
        .call(None, &[JsValue::number(&ctx, 1.0), JsValue::number(&ctx, 2.0)])
        .unwrap();
    let scripted = ctx.evaluate_script("myFunction(1, 2)");
    assert_eq!(direct.as_f64(), Some(3.0));
    assert!(direct.is_equal(&scripted));
}

#[test]
fn test_host_constructor() {
    let ctx = context();
    let class = JsValue::new_function(&ctx, "myClass", |ctx, _this, args| {
        let object = JsValue::new_object(ctx);
        object.set("result", sum(ctx, None, args)?)?;
        Ok(object)
    })
    .unwrap();
    assert!(class.is_constructor());
    ctx.set_global("myClass", &class).unwrap();

    let instance = ctx.evaluate_script("new myClass(1, 2)");
    assert!(instance.is_object());
    assert_eq!(instance.get("result").unwrap().as_f64(), Some(3.0));
    assert!(instance.is_instance_of(&class));
    assert_eq!(ctx.evaluate_script("new myClass(1, 2) instanceof myClass").as_bool(), Some(true));

    let constructed = class
        .construct(&[JsValue::number(&ctx, 4.0), JsValue::number(&ctx, 5.0)])
        .unwrap();
    assert_eq!(constructed.get("result").unwrap().as_f64(), Some(9.0));
}

#[test]
fn test_script_catches_host_error() {
    let ctx = context();
    let parse = JsValue::new_function(&ctx, "parse", |ctx, _this, args| {
        let text = args
            .first()
            .and_then(JsValue::as_string)
            .ok_or_else(|| JsError::host("expected a string"))?;
        JsValue::from_json(ctx, &text)
    })
    .unwrap();
    ctx.set_global("parse", parse).unwrap();

    assert_eq!(ctx.evaluate_script("parse('[1, 2]').length").as_f64(), Some(2.0));
    let message = ctx.evaluate_script("try { parse(1) } catch (e) { e.message }");
    assert_eq!(message.as_string().as_deref(), Some("expected a string"));
    let name = ctx.evaluate_script("try { parse('{') } catch (e) { e.name }");
    assert_eq!(name.as_string().as_deref(), Some("SyntaxError"));
}

// ============================================================================
// ACCESSORS
// ============================================================================

#[test]
fn test_getter_from_script() {
    let ctx = context();
    let object = JsValue::new_object(&ctx);
    let getter = PropertyDescriptor::new().with_getter(|ctx, _this| Ok(JsValue::number(ctx, 3.0)));
    assert!(object.define_property("value", &getter));
    ctx.set_global("obj", &object).unwrap();

    assert_eq!(ctx.evaluate_script("obj.value").as_f64(), Some(3.0));
}

#[test]
fn test_getter_and_setter() {
    let ctx = context();
    let object = JsValue::new_object(&ctx);
    object.set("number", 5).unwrap();

    let accessor = PropertyDescriptor::new()
        .with_getter(|ctx, this| match this {
            Some(this) => this.get("number"),
            None => Ok(JsValue::undefined(ctx)),
        })
        .with_setter(|_ctx, this, value| match this {
            Some(this) => this.set("number", value),
            None => Ok(()),
        })
        .with_enumerable(true);
    assert!(object.define_property("number_container", &accessor));
    ctx.set_global("obj", &object).unwrap();

    assert_eq!(ctx.evaluate_script("obj.number_container").as_f64(), Some(5.0));
    ctx.evaluate_script("obj.number_container = 3");
    assert_eq!(ctx.evaluate_script("obj.number_container").as_f64(), Some(3.0));
    assert_eq!(object.get("number").unwrap().as_f64(), Some(3.0));

    let read = object.property_descriptor("number_container").unwrap().unwrap();
    assert!(read.is_accessor());
    assert_eq!(read.enumerable(), Some(true));
}

// ============================================================================
// ARRAY BUFFERS
// ============================================================================

#[test]
fn test_array_buffer_from_script() {
    let ctx = context();
    let buffer = ctx.evaluate_script(
        "var buffer = new ArrayBuffer(5);
         var view = new DataView(buffer);
         for (var i = 0; i < 5; i++) view.setUint8(i, i + 1);
         buffer",
    );
    assert!(buffer.is_array_buffer());
    assert_eq!(buffer.byte_length(), Some(5));
    assert_eq!(buffer.copy_bytes(), Some(vec![1, 2, 3, 4, 5]));

    let slice = buffer
        .invoke_method("slice", &[JsValue::number(&ctx, 2.0), JsValue::number(&ctx, 4.0)])
        .unwrap();
    assert_eq!(slice.copy_bytes(), Some(vec![3, 4]));
}

#[test]
fn test_no_copy_deallocator_after_release() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    {
        let runtime = JsRuntime::new().unwrap();
        let ctx = JsContext::new(&runtime).unwrap();
        let buffer = JsValue::new_array_buffer_no_copy(&ctx, vec![1u8, 2, 3, 4], move |bytes| {
            assert_eq!(bytes, vec![1, 2, 3, 4]);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        ctx.set_global("external", &buffer).unwrap();
        assert_eq!(ctx.evaluate_script("external.byteLength").as_f64(), Some(4.0));

        drop(buffer);
        ctx.collect_garbage();
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

// ============================================================================
// OBJECT OPERATIONS
// ============================================================================

#[test]
fn test_delete_properties() {
    let ctx = context();
    let object = JsValue::new_object(&ctx);
    assert!(!object.remove_property("missing"));
    assert!(ctx.exception().is_none());

    object.set("present", true).unwrap();
    assert!(object.has_property("present"));
    assert!(object.remove_property("present"));
    assert!(!object.has_property("present"));
}

#[test]
fn test_equality() {
    let ctx = context();
    let three = JsValue::number(&ctx, 3.0);
    let again = ctx.evaluate_script("3");
    let text = JsValue::string(&ctx, "3");

    assert!(three.is_equal(&again));
    assert!(text.is_equal_with_coercion(&three));
    assert!(!text.is_equal(&three));
}

#[test]
fn test_values_across_contexts_of_one_runtime() {
    init_tracing();
    let runtime = JsRuntime::new().unwrap();
    let first = JsContext::new(&runtime).unwrap();
    let second = JsContext::new(&runtime).unwrap();

    let list = first.evaluate_script("[1, 2, 3]");
    second.set_global("list", &list).unwrap();
    assert_eq!(second.evaluate_script("list.length").as_f64(), Some(3.0));
}

#[test]
fn test_console_round_trip() {
    let ctx = context();
    install_console(&ctx).unwrap();
    let result = ctx.evaluate_script("console.log('value', { a: [1, 2] }); 'done'");
    assert_eq!(result.as_string().as_deref(), Some("done"));
    assert!(ctx.exception().is_none());
}
