//! Call-frame marshaling, method binds and object ownership for an engine
//! ClassDB reached through a C function table.
//!
//! The pieces, leaves first:
//!
//! - [`frame`]: builds the argument buffer of one native call and decodes
//!   its return value.
//! - [`method_table`]: resolves every (class, method) pair to a native bind
//!   once, at startup.
//! - [`handle`]: wraps returned objects with the ownership tag that decides
//!   whether dropping them releases anything.
//! - [`class`]: the typed wrapper pattern built on the three above.
//!
//! [`runtime::initialize`] ties them together.

pub mod abi;
pub mod builtin;
pub mod callable;
pub mod class;
pub mod config;
pub mod error;
pub mod frame;
pub mod handle;
pub mod interface;
pub mod introspection;
pub mod method_table;
pub mod runtime;
pub mod status;
pub mod string;
pub mod variant;

#[cfg(test)]
mod test_support;

pub use abi::{AbiKind, AbiValue};
pub use builtin::{Color, Rect2, Transform2D, Vector2, Vector2i, Vector3};
pub use callable::{Callable, ConnectFlags, SignalArgs};
pub use class::{EngineClass, Inherits};
pub use config::BindConfig;
pub use error::{BindError, BindResult, FrameError};
pub use frame::{Frame, RetSlot};
pub use handle::{Bound, InstanceId, MemoryModel, ObjectHandle, OwnershipTag};
pub use interface::EngineApi;
pub use introspection::{ClassDb, ClassInfo, MethodInfo, ReturnOwnership, SignalInfo};
pub use method_table::{MethodBind, MethodHash, MethodKey, MethodSignature, MethodTable};
pub use runtime::Runtime;
pub use status::EngineStatus;
pub use string::EngineString;
pub use variant::{FromVariant, ToVariant, Variant, VariantType};
