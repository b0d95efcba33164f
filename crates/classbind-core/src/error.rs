use crate::abi::AbiKind;
use crate::handle::InstanceId;
use crate::method_table::MethodKey;
use crate::variant::VariantType;
use std::ffi::NulError;
use std::string::FromUtf8Error;
use std::sync::{MutexGuard, PoisonError};
use thiserror::Error;

pub type BindResult<T> = anyhow::Result<T, BindError>;

/// Errors raised by the binding layer itself.
///
/// Status codes returned by engine methods are ordinary return values and
/// never show up here; see [`crate::status::EngineStatus`].
#[derive(Error, Debug)]
pub enum BindError {
    #[error("binding runtime has not been initialized")]
    NotInitialized,

    #[error("binding runtime is already initialized")]
    AlreadyInitialized,

    #[error("engine interface does not provide `{0}`")]
    MissingInterfaceFunction(&'static str),

    #[error("{} method bind(s) could not be resolved: {}", .0.len(), format_keys(.0))]
    MissingMethodBinds(Vec<MethodKey>),

    #[error("core method `{0}` is required but was not resolved")]
    MissingCoreBind(MethodKey),

    #[error("method `{class}.{method}` is declared more than once")]
    DuplicateMethod { class: String, method: String },

    #[error("method keys `{0}` and `{1}` hash to the same slot")]
    MethodHashCollision(MethodKey, MethodKey),

    #[error("method `{class}.{method}` returns an object but declares no ownership contract")]
    MissingOwnershipContract { class: String, method: String },

    #[error("class `{0}` is not described by the introspection table")]
    UnknownClass(String),

    #[error("method `{class}.{method}` is not in the method table")]
    UnknownMethod { class: String, method: String },

    #[error("class `{class}` has no signal `{signal}`")]
    UnknownSignal { class: String, signal: String },

    #[error("signal `{class}.{signal}` carries {declared:?}, callback takes {callback:?}")]
    SignalSignature {
        class: String,
        signal: String,
        declared: Vec<AbiKind>,
        callback: Vec<AbiKind>,
    },

    #[error("callable expects {expected} argument(s), got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("ABI kind {0} has no variant type")]
    NoVariantType(AbiKind),

    #[error("engine cannot convert variants of type {0:?}")]
    NoVariantConversion(VariantType),

    #[error("variant holds {found:?}, expected {expected:?}")]
    VariantTypeMismatch {
        expected: VariantType,
        found: VariantType,
    },

    #[error("unknown ABI type name `{0}`")]
    UnknownAbiType(String),

    #[error("call frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("null pointer encountered")]
    NullPointer,

    #[error("method `{0}` needs a receiver but was called on a null object")]
    NullReceiver(MethodKey),

    #[error("object {0} is no longer alive")]
    DeadInstance(InstanceId),

    #[error("engine failed to construct an instance of `{0}`")]
    ConstructFailed(String),

    #[error("introspection table could not be parsed: {0}")]
    Introspection(#[from] serde_json::Error),

    #[error("string conversion error: {0}")]
    StringConversion(#[from] NulError),

    #[error("UTF-8 conversion error: {0}")]
    Utf8Conversion(#[from] FromUtf8Error),

    #[error("mutex poisoned")]
    MutexPoisoned,
}

impl<T> From<PoisonError<MutexGuard<'_, T>>> for BindError {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        BindError::MutexPoisoned
    }
}

fn format_keys(keys: &[MethodKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Misuse of a [`crate::frame::Frame`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame was already submitted to a native call")]
    AlreadySubmitted,

    #[error("frame has not been submitted yet")]
    NotSubmitted,

    #[error("frame holds at most {max} arguments")]
    TooManyArguments { max: usize },

    #[error("argument of {needed} words does not fit ({available} words left)")]
    Overflow { needed: usize, available: usize },

    #[error("return slot was already reserved")]
    ReturnAlreadyReserved,

    #[error("return slot was not reserved")]
    ReturnNotReserved,

    #[error("return value of kind {0:?} does not fit the return slot")]
    ReturnTooLarge(AbiKind),

    #[error("signature mismatch for `{method}`: expected {expected:?}, frame holds {found:?}")]
    SignatureMismatch {
        method: String,
        expected: Vec<AbiKind>,
        found: Vec<AbiKind>,
    },

    #[error("return type mismatch for `{method}`: method returns {expected:?}, slot typed {found:?}")]
    ReturnMismatch {
        method: String,
        expected: AbiKind,
        found: AbiKind,
    },
}
