use classbind_core::callable::{self, Callable, ConnectFlags, SignalArgs};
use classbind_core::{
    BindError, BindResult, EngineClass, EngineStatus, EngineString, FromVariant, InstanceId, ToVariant,
    Variant, engine_class,
};

engine_class! {
    /// Root of the engine class hierarchy.
    pub struct Object: "Object";
}

/// Direct marshaling of `Object` methods.
pub mod raw {
    use super::Object;
    use classbind_core::{BindResult, EngineClass, EngineString, Frame, Variant};
    use classbind_sys::{CallableRaw, StringRaw, VariantRaw};

    pub fn get_class(this: &Object) -> BindResult<EngineString> {
        let handle = this.handle();
        let rt = handle.runtime();
        let mut frame = Frame::new();
        let ret = frame.ret::<StringRaw>()?;
        rt.bind("Object", "get_class")?.ptrcall(handle.checked()?, &mut frame)?;
        Ok(unsafe { EngineString::from_raw(rt.api(), frame.get(ret)?) })
    }

    pub fn get_instance_id(this: &Object) -> BindResult<i64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<i64>()?;
        handle
            .runtime()
            .bind("Object", "get_instance_id")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn is_connected(this: &Object, signal: &EngineString, callable: CallableRaw) -> BindResult<bool> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(signal.as_raw())?;
        frame.arg(callable)?;
        let ret = frame.ret::<bool>()?;
        handle
            .runtime()
            .bind("Object", "is_connected")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn set(this: &Object, property: &EngineString, value: &Variant) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(property.as_raw())?;
        frame.arg(value.as_raw())?;
        handle
            .runtime()
            .bind("Object", "set")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    pub fn get(this: &Object, property: &EngineString) -> BindResult<Variant> {
        let handle = this.handle();
        let rt = handle.runtime();
        let mut frame = Frame::new();
        frame.arg(property.as_raw())?;
        let ret = frame.ret::<VariantRaw>()?;
        rt.bind("Object", "get")?.ptrcall(handle.checked()?, &mut frame)?;
        Ok(unsafe { Variant::from_raw(rt.api(), frame.get(ret)?) })
    }
}

impl Object {
    /// Engine class name of this object's dynamic type.
    pub fn get_class(&self) -> BindResult<String> {
        raw::get_class(self)?.to_rust_string()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.handle().instance_id()
    }

    /// Whether the engine object behind this wrapper still exists.
    pub fn is_alive(&self) -> bool {
        self.handle().is_alive()
    }

    pub fn is_class(&self, class: &str) -> BindResult<bool> {
        self.handle().is_class(class)
    }

    pub fn connect(&self, signal: &str, callable: &Callable, flags: ConnectFlags) -> BindResult<EngineStatus> {
        callable::connect(self.handle(), signal, callable, flags)
    }

    pub fn disconnect(&self, signal: &str, callable: &Callable) -> BindResult<()> {
        callable::disconnect(self.handle(), signal, callable)
    }

    pub fn is_connected(&self, signal: &str, callable: &Callable) -> BindResult<bool> {
        let name = EngineString::new(self.handle().runtime().api(), signal);
        raw::is_connected(self, &name, callable.as_raw())
    }

    /// Sets a property by name; setting nil clears it.
    pub fn set_property<T: ToVariant + ?Sized>(&self, name: &str, value: &T) -> BindResult<()> {
        let api = self.handle().runtime().api();
        let value = value.to_variant(api)?;
        raw::set(self, &EngineString::new(api, name), &value)
    }

    /// The property as a variant; nil when unset.
    pub fn property_variant(&self, name: &str) -> BindResult<Variant> {
        let api = self.handle().runtime().api();
        raw::get(self, &EngineString::new(api, name))
    }

    pub fn property<T: FromVariant>(&self, name: &str) -> BindResult<T> {
        self.property_variant(name)?.to()
    }

    /// Runs `callback` every time `signal` is emitted.
    ///
    /// The signal must be declared on this object's class or one of its
    /// ancestors, without arguments. The closure lives as long as the
    /// connection.
    pub fn on<F>(&self, signal: &str, flags: ConnectFlags, mut callback: F) -> BindResult<EngineStatus>
    where
        F: FnMut() + 'static,
    {
        self.on_args(signal, flags, move |()| callback())
    }

    /// Runs `callback` with the decoded arguments every time `signal` is
    /// emitted.
    ///
    /// `A` must match the argument kinds the signal declares. Emissions
    /// whose arguments do not decode are reported to the engine and skip
    /// the callback.
    pub fn on_args<A, F>(&self, signal: &str, flags: ConnectFlags, callback: F) -> BindResult<EngineStatus>
    where
        A: SignalArgs,
        F: FnMut(A) + 'static,
    {
        let rt = self.handle().runtime();
        let class = self.get_class()?;
        let Some(info) = rt.classdb().find_signal(&class, signal) else {
            return Err(BindError::UnknownSignal {
                class,
                signal: signal.to_string(),
            });
        };
        let callback_kinds = A::kinds();
        if info.arguments != callback_kinds {
            return Err(BindError::SignalSignature {
                class,
                signal: signal.to_string(),
                declared: info.arguments.clone(),
                callback: callback_kinds,
            });
        }
        let callable = Callable::from_typed(rt, callback);
        self.connect(signal, &callable, flags)
    }
}
