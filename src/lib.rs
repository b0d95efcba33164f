//! Typed bindings over an engine ClassDB.
//!
//! The marshaling layer lives in [`classbind_core`]; this crate adds the
//! class wrappers built on it and a prelude.
//!
//! ```ignore
//! use classbind::prelude::*;
//!
//! classbind::runtime::initialize(&interface, ClassDb::from_json(&dump)?, BindConfig::default())?;
//!
//! let timer = Timer::new()?;
//! timer.set_wait_time(Duration::from_millis(250))?;
//! timer.on_timeout(|| println!("tick"))?;
//! timer.start()?;
//! ```

pub mod classes;

pub use classbind_core::{
    abi, builtin, callable, class, config, engine_class, error, frame, handle, interface,
    introspection, method_table, runtime, status, string, variant,
};
pub use classbind_sys as sys;

pub mod prelude {
    pub use crate::classes::*;
    pub use classbind_core::{
        AbiKind, AbiValue, BindConfig, BindError, BindResult, Bound, Callable, ClassDb, ClassInfo,
        Color, ConnectFlags, EngineClass, EngineStatus, EngineString, Frame, FrameError, FromVariant,
        Inherits, InstanceId, MemoryModel, MethodInfo, ObjectHandle, OwnershipTag, Rect2,
        ReturnOwnership, Runtime, SignalArgs, SignalInfo, ToVariant, Transform2D, Variant,
        VariantType, Vector2, Vector2i, Vector3,
    };
}
