//! Property Descriptors
//!
//! Host-side descriptor records, defined with `Object.defineProperty` and
//! read back with `Object.getOwnPropertyDescriptor`.

use std::fmt;
use std::rc::Rc;

use crate::function::HostFunction;
use crate::{JsContext, JsValue, Result};

/// Getter or setter of an accessor descriptor
#[derive(Clone)]
pub enum Accessor {
    /// Host closure, wrapped as a script function when defined
    Host(Rc<HostFunction>),
    /// Existing script function
    Function(JsValue),
}

impl Accessor {
    fn to_function(&self, context: &JsContext, name: &str) -> Result<JsValue> {
        match self {
            Accessor::Function(function) => Ok(function.clone()),
            Accessor::Host(callback) => {
                let callback = callback.clone();
                JsValue::new_function(context, name, move |ctx, this, args| callback(ctx, this, args))
            }
        }
    }
}

fn host_accessor<F>(callback: F) -> Accessor
where
    F: Fn(&JsContext, Option<&JsValue>, &[JsValue]) -> Result<JsValue> + 'static,
{
    Accessor::Host(Rc::new(callback))
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Host(_) => f.write_str("Accessor::Host(..)"),
            Accessor::Function(function) => f.debug_tuple("Accessor::Function").field(function).finish(),
        }
    }
}

/// A data, accessor or generic property descriptor.
///
/// Omitted fields are left to the engine's defaults. Setting a data field
/// (`value`, `writable`) on a descriptor with an accessor field (`get`,
/// `set`), or the reverse, panics.
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    value: Option<JsValue>,
    writable: Option<bool>,
    getter: Option<Accessor>,
    setter: Option<Accessor>,
    configurable: Option<bool>,
    enumerable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, value: JsValue) -> Self {
        self.assert_not_accessor();
        self.value = Some(value);
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.assert_not_accessor();
        self.writable = Some(writable);
        self
    }

    /// Host getter, called with the receiver as `this`
    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&JsContext, Option<&JsValue>) -> Result<JsValue> + 'static,
    {
        self.assert_not_data();
        self.getter = Some(host_accessor(move |ctx, this, _args| getter(ctx, this)));
        self
    }

    /// Host setter, called with the receiver as `this` and the assigned value
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&JsContext, Option<&JsValue>, &JsValue) -> Result<()> + 'static,
    {
        self.assert_not_data();
        self.setter = Some(host_accessor(move |ctx, this, args| {
            let undefined;
            let value = match args.first() {
                Some(value) => value,
                None => {
                    undefined = JsValue::undefined(ctx);
                    &undefined
                }
            };
            setter(ctx, this, value)?;
            Ok(JsValue::undefined(ctx))
        }));
        self
    }

    /// # Panics
    /// When `getter` is not a function.
    pub fn with_getter_function(mut self, getter: JsValue) -> Self {
        assert!(getter.is_function(), "getter must be a function");
        self.assert_not_data();
        self.getter = Some(Accessor::Function(getter));
        self
    }

    /// # Panics
    /// When `setter` is not a function.
    pub fn with_setter_function(mut self, setter: JsValue) -> Self {
        assert!(setter.is_function(), "setter must be a function");
        self.assert_not_data();
        self.setter = Some(Accessor::Function(setter));
        self
    }

    pub fn with_configurable(mut self, configurable: bool) -> Self {
        self.configurable = Some(configurable);
        self
    }

    pub fn with_enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = Some(enumerable);
        self
    }

    pub fn value(&self) -> Option<&JsValue> {
        self.value.as_ref()
    }

    pub fn writable(&self) -> Option<bool> {
        self.writable
    }

    pub fn getter(&self) -> Option<&Accessor> {
        self.getter.as_ref()
    }

    pub fn setter(&self) -> Option<&Accessor> {
        self.setter.as_ref()
    }

    pub fn configurable(&self) -> Option<bool> {
        self.configurable
    }

    pub fn enumerable(&self) -> Option<bool> {
        self.enumerable
    }

    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }

    /// Neither data nor accessor: only `configurable` and `enumerable`
    pub fn is_generic(&self) -> bool {
        !self.is_data() && !self.is_accessor()
    }

    fn assert_not_accessor(&self) {
        assert!(
            !self.is_accessor(),
            "property descriptor cannot mix value/writable with get/set"
        );
    }

    fn assert_not_data(&self) {
        assert!(
            !self.is_data(),
            "property descriptor cannot mix get/set with value/writable"
        );
    }

    /// Engine descriptor object with only the fields that are set
    fn to_object(&self, context: &JsContext, name: &str) -> Result<JsValue> {
        let object = JsValue::new_object(context);
        if let Some(value) = &self.value {
            object.set("value", value)?;
        }
        if let Some(writable) = self.writable {
            object.set("writable", writable)?;
        }
        if let Some(getter) = &self.getter {
            object.set("get", getter.to_function(context, &format!("get {name}"))?)?;
        }
        if let Some(setter) = &self.setter {
            object.set("set", setter.to_function(context, &format!("set {name}"))?)?;
        }
        if let Some(configurable) = self.configurable {
            object.set("configurable", configurable)?;
        }
        if let Some(enumerable) = self.enumerable {
            object.set("enumerable", enumerable)?;
        }
        Ok(object)
    }

    fn from_object(object: &JsValue) -> Result<Self> {
        let flag = |name: &str| -> Result<Option<bool>> {
            Ok(if object.has_property(name) { object.get(name)?.as_bool() } else { None })
        };
        let accessor = |name: &str| -> Result<Option<Accessor>> {
            let function = object.get(name)?;
            Ok(function.is_function().then_some(Accessor::Function(function)))
        };

        let mut descriptor = Self {
            writable: flag("writable")?,
            getter: accessor("get")?,
            setter: accessor("set")?,
            configurable: flag("configurable")?,
            enumerable: flag("enumerable")?,
            ..Self::default()
        };
        if object.has_property("value") {
            descriptor.value = Some(object.get("value")?);
        }
        Ok(descriptor)
    }
}

impl JsValue {
    /// Define or reconfigure a property, routing failure ambiently
    pub fn define_property(&self, name: &str, descriptor: &PropertyDescriptor) -> bool {
        let defined = self.try_define_property(name, descriptor);
        self.context().catch(defined).is_some()
    }

    /// Define or reconfigure a property
    pub fn try_define_property(&self, name: &str, descriptor: &PropertyDescriptor) -> Result<()> {
        let context = self.context();
        let record = descriptor.to_object(context, name)?;
        let object = context.global("Object")?;
        object
            .invoke_method("defineProperty", &[self.clone(), JsValue::string(context, name), record])
            .map(drop)
    }

    /// Own property descriptor, `None` when there is no such own property
    pub fn property_descriptor(&self, name: &str) -> Result<Option<PropertyDescriptor>> {
        let context = self.context();
        let object = context.global("Object")?;
        let record = object.invoke_method(
            "getOwnPropertyDescriptor",
            &[self.clone(), JsValue::string(context, name)],
        )?;
        if record.is_undefined() {
            return Ok(None);
        }
        PropertyDescriptor::from_object(&record).map(Some)
    }
}
