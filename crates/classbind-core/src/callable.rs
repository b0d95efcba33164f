//! Host closures exposed to the engine as callables, and signal wiring.
//!
//! The engine calls a callable with an array of variant arguments. Each
//! call copies them into owned [`Variant`]s before the closure runs; typed
//! callbacks decode those copies with [`SignalArgs`].

use crate::abi::AbiKind;
use crate::error::{BindError, BindResult};
use crate::frame::Frame;
use crate::handle::ObjectHandle;
use crate::interface::EngineApi;
use crate::runtime::Runtime;
use crate::status::EngineStatus;
use crate::string::EngineString;
use crate::variant::{FromVariant, Variant};
use bitflags::bitflags;
use classbind_sys::{CallableCustomInfo, CallableRaw, ConstTypePtr, TypePtr, VariantRaw};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{error, trace};

bitflags! {
    /// Options for [`connect`], matching the engine's connect flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConnectFlags: u32 {
        /// Invoke the callback at idle time instead of during emission.
        const DEFERRED = 1;
        /// Keep the connection when the scene is saved.
        const PERSIST = 2;
        /// Disconnect after the first emission.
        const ONE_SHOT = 4;
        /// Allow connecting the same callable more than once.
        const REFERENCE_COUNTED = 8;
    }
}

/// A host closure the engine can call.
///
/// The closure is boxed and handed to the engine as userdata; the engine
/// frees it through the registered free callback once its last copy of
/// the callable is gone. Dropping this value only releases the host's copy.
///
/// Not `Send`: the closure may hold thread-bound state and is freed on
/// whichever thread drops the last copy.
pub struct Callable {
    raw: CallableRaw,
    api: &'static EngineApi,
    _thread_bound: PhantomData<*const ()>,
}

struct Closure<F> {
    callback: F,
    api: &'static EngineApi,
}

unsafe extern "C" fn call_closure<F>(
    userdata: *mut c_void,
    args: *const ConstTypePtr,
    arg_count: i64,
    ret: TypePtr,
) where
    F: FnMut(&[Variant]) -> BindResult<Option<Variant>> + 'static,
{
    let closure = unsafe { &mut *userdata.cast::<Closure<F>>() };
    let api = closure.api;
    let args = (0..usize::try_from(arg_count).unwrap_or(0))
        .map(|index| unsafe { Variant::from_borrowed(api, (*args.add(index)).cast()) })
        .collect::<Vec<_>>();

    match catch_unwind(AssertUnwindSafe(|| (closure.callback)(&args))) {
        Ok(Ok(Some(value))) if !ret.is_null() => unsafe {
            let ret = ret.cast::<VariantRaw>();
            (api.variant_destroy)(ret);
            ret.write(value.into_raw());
        },
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            error!(error = %err, "callable failed");
            api.report_error(&err.to_string(), "call_closure", file!(), line!());
        }
        Err(_) => {
            error!("callable panicked; the panic was contained at the engine boundary");
            api.report_error("host callable panicked", "call_closure", file!(), line!());
        }
    }
}

unsafe extern "C" fn free_closure<F>(userdata: *mut c_void) {
    drop(unsafe { Box::from_raw(userdata.cast::<Closure<F>>()) });
    trace!("callable userdata freed");
}

impl Callable {
    /// Wraps `callback` in an engine callable that ignores its arguments.
    pub fn from_fn<F>(rt: &'static Runtime, mut callback: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::from_variadic(rt, move |_| {
            callback();
            Ok(None)
        })
    }

    /// Wraps a callback that decodes its arguments as `A`.
    ///
    /// Calls with arguments that do not decode are reported to the engine
    /// and never reach `callback`.
    pub fn from_typed<A, F>(rt: &'static Runtime, mut callback: F) -> Self
    where
        A: SignalArgs,
        F: FnMut(A) + 'static,
    {
        Self::from_variadic(rt, move |args| {
            callback(A::from_args(args)?);
            Ok(None)
        })
    }

    /// Wraps a callback that sees the raw argument list and may return a
    /// value to the engine.
    ///
    /// An `Err` is reported through the engine's error channel and the
    /// call returns nil.
    pub fn from_variadic<F>(rt: &'static Runtime, callback: F) -> Self
    where
        F: FnMut(&[Variant]) -> BindResult<Option<Variant>> + 'static,
    {
        let api = rt.api();
        let userdata = Box::into_raw(Box::new(Closure { callback, api }));
        let info = CallableCustomInfo {
            userdata: userdata.cast(),
            object_id: 0,
            call: Some(call_closure::<F>),
            free: Some(free_closure::<F>),
        };
        let mut raw = CallableRaw::zeroed();
        unsafe { (api.callable_custom_create)(&mut raw, &info) };
        Callable {
            raw,
            api,
            _thread_bound: PhantomData,
        }
    }

    pub fn as_raw(&self) -> CallableRaw {
        self.raw
    }
}

impl Drop for Callable {
    fn drop(&mut self) {
        unsafe { (self.api.callable_destroy)(&mut self.raw) };
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callable").field(&self.raw).finish()
    }
}

/// Argument list of a signal, decoded from the variants of one emission.
pub trait SignalArgs: Sized + 'static {
    /// Declared ABI kinds, in order.
    fn kinds() -> Vec<AbiKind>;

    fn from_args(args: &[Variant]) -> BindResult<Self>;
}

impl SignalArgs for () {
    fn kinds() -> Vec<AbiKind> {
        Vec::new()
    }

    fn from_args(args: &[Variant]) -> BindResult<Self> {
        match args.len() {
            0 => Ok(()),
            found => Err(BindError::ArgumentCount { expected: 0, found }),
        }
    }
}

macro_rules! signal_args {
    ($($name:ident $var:ident),+) => {
        impl<$($name: FromVariant + 'static),+> SignalArgs for ($($name,)+) {
            fn kinds() -> Vec<AbiKind> {
                vec![$(<$name as FromVariant>::ABI_KIND),+]
            }

            fn from_args(args: &[Variant]) -> BindResult<Self> {
                let [$($var),+] = args else {
                    return Err(BindError::ArgumentCount {
                        expected: Self::kinds().len(),
                        found: args.len(),
                    });
                };
                Ok(($($name::from_variant($var)?,)+))
            }
        }
    };
}

signal_args!(A a);
signal_args!(A a, B b);
signal_args!(A a, B b, C c);
signal_args!(A a, B b, C c, D d);

/// Connects `callable` to `signal` on `object` through `Object.connect`.
///
/// # Returns
/// The engine's status code, passed through unchanged.
pub fn connect(
    object: &ObjectHandle,
    signal: &str,
    callable: &Callable,
    flags: ConnectFlags,
) -> BindResult<EngineStatus> {
    let rt = object.runtime();
    let receiver = object.checked()?;
    let name = EngineString::new(rt.api(), signal);

    let mut frame = Frame::new();
    frame.arg(name.as_raw())?;
    frame.arg(callable.as_raw())?;
    frame.arg(i64::from(flags.bits()))?;
    let ret = frame.ret::<i64>()?;
    rt.core().connect.ptrcall(receiver, &mut frame)?;

    let status = EngineStatus::from(frame.get(ret)?);
    trace!(id = %object.instance_id(), %signal, ?status, "signal connected");
    Ok(status)
}

/// Removes a connection made with [`connect`].
pub fn disconnect(object: &ObjectHandle, signal: &str, callable: &Callable) -> BindResult<()> {
    let rt = object.runtime();
    let receiver = object.checked()?;
    let name = EngineString::new(rt.api(), signal);

    let mut frame = Frame::new();
    frame.arg(name.as_raw())?;
    frame.arg(callable.as_raw())?;
    rt.core().disconnect.ptrcall(receiver, &mut frame)
}
