//! ABI layout table and value encoding for call frames.
//!
//! Every argument crosses the boundary as a pointer to storage laid out
//! exactly as the engine's C++ type. [`AbiKind`] is the layout table used
//! to verify frames against method signatures; [`AbiValue`] ties a Rust
//! type to one of its entries.

use crate::builtin::{Color, Rect2, Transform2D, Vector2, Vector2i, Vector3};
use crate::error::BindError;
use classbind_sys::{CallableRaw, ObjectPtr, StringRaw, VariantRaw, WORD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ABI shape of an argument or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AbiKind {
    #[default]
    #[serde(rename = "Nil")]
    Nil,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int")]
    Int64,
    #[serde(rename = "float32")]
    Float32,
    #[serde(rename = "float")]
    Float64,
    #[serde(rename = "Vector2")]
    Vector2,
    #[serde(rename = "Vector2i")]
    Vector2i,
    #[serde(rename = "Vector3")]
    Vector3,
    #[serde(rename = "Rect2")]
    Rect2,
    #[serde(rename = "Color")]
    Color,
    #[serde(rename = "Transform2D")]
    Transform2D,
    #[serde(rename = "Object")]
    Object,
    #[serde(rename = "String")]
    String,
    #[serde(rename = "Callable")]
    Callable,
    /// Any engine value, tagged with its type.
    #[serde(rename = "Variant")]
    Variant,
}

impl AbiKind {
    /// Size of the native representation in bytes.
    pub const fn size(self) -> usize {
        match self {
            AbiKind::Nil => 0,
            AbiKind::Bool => 1,
            AbiKind::Int32 | AbiKind::Float32 => 4,
            AbiKind::Int64 | AbiKind::Float64 => 8,
            AbiKind::Vector2 | AbiKind::Vector2i => 8,
            AbiKind::Vector3 => 12,
            AbiKind::Rect2 | AbiKind::Color => 16,
            AbiKind::Transform2D => 24,
            AbiKind::Object => std::mem::size_of::<ObjectPtr>(),
            AbiKind::String => std::mem::size_of::<StringRaw>(),
            AbiKind::Callable => std::mem::size_of::<CallableRaw>(),
            AbiKind::Variant => std::mem::size_of::<VariantRaw>(),
        }
    }

    /// Required alignment of the native representation.
    pub const fn align(self) -> usize {
        match self {
            AbiKind::Nil | AbiKind::Bool => 1,
            AbiKind::Int32 | AbiKind::Float32 => 4,
            AbiKind::Vector2 | AbiKind::Vector2i | AbiKind::Vector3 => 4,
            AbiKind::Rect2 | AbiKind::Color | AbiKind::Transform2D => 4,
            AbiKind::Int64 | AbiKind::Float64 => std::mem::align_of::<u64>(),
            AbiKind::Object | AbiKind::String | AbiKind::Callable | AbiKind::Variant => WORD,
        }
    }

    /// Whether a value of this kind returned by the engine is owned by the
    /// caller and must be released, so the return slot cannot be skipped.
    pub const fn returns_owned_storage(self) -> bool {
        matches!(self, AbiKind::String | AbiKind::Callable | AbiKind::Variant)
    }

    /// Number of frame words the value occupies.
    pub const fn words(self) -> usize {
        self.size().div_ceil(WORD)
    }

    /// Name used by the introspection table.
    pub const fn name(self) -> &'static str {
        match self {
            AbiKind::Nil => "Nil",
            AbiKind::Bool => "bool",
            AbiKind::Int32 => "int32",
            AbiKind::Int64 => "int",
            AbiKind::Float32 => "float32",
            AbiKind::Float64 => "float",
            AbiKind::Vector2 => "Vector2",
            AbiKind::Vector2i => "Vector2i",
            AbiKind::Vector3 => "Vector3",
            AbiKind::Rect2 => "Rect2",
            AbiKind::Color => "Color",
            AbiKind::Transform2D => "Transform2D",
            AbiKind::Object => "Object",
            AbiKind::String => "String",
            AbiKind::Callable => "Callable",
            AbiKind::Variant => "Variant",
        }
    }

    pub const ALL: [AbiKind; 16] = [
        AbiKind::Nil,
        AbiKind::Bool,
        AbiKind::Int32,
        AbiKind::Int64,
        AbiKind::Float32,
        AbiKind::Float64,
        AbiKind::Vector2,
        AbiKind::Vector2i,
        AbiKind::Vector3,
        AbiKind::Rect2,
        AbiKind::Color,
        AbiKind::Transform2D,
        AbiKind::Object,
        AbiKind::String,
        AbiKind::Callable,
        AbiKind::Variant,
    ];
}

impl fmt::Display for AbiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AbiKind {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AbiKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| BindError::UnknownAbiType(s.to_string()))
    }
}

/// A Rust type whose in-memory representation matches an [`AbiKind`].
///
/// # Safety
///
/// Implementors must be plain data whose bit pattern is exactly what the
/// engine reads and writes for `KIND`, with `size_of::<Self>() == KIND.size()`.
pub unsafe trait AbiValue: Copy + 'static {
    const KIND: AbiKind;

    /// Writes the value to `dst`.
    ///
    /// # Safety
    /// `dst` must be valid for `KIND.size()` bytes and aligned to `KIND.align()`.
    #[inline]
    unsafe fn encode(self, dst: *mut u8) {
        unsafe { dst.cast::<Self>().write(self) }
    }

    /// Reads a value from `src`.
    ///
    /// # Safety
    /// `src` must hold a valid bit pattern for `Self` written by the engine.
    #[inline]
    unsafe fn decode(src: *const u8) -> Self {
        unsafe { src.cast::<Self>().read() }
    }
}

macro_rules! abi_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            unsafe impl AbiValue for $ty {
                const KIND: AbiKind = AbiKind::$kind;
            }

            const _: () = {
                assert!(std::mem::size_of::<$ty>() == AbiKind::$kind.size());
                assert!(std::mem::align_of::<$ty>() <= AbiKind::$kind.align());
            };
        )*
    };
}

abi_value! {
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Vector2 => Vector2,
    Vector2i => Vector2i,
    Vector3 => Vector3,
    Rect2 => Rect2,
    Color => Color,
    Transform2D => Transform2D,
    ObjectPtr => Object,
    StringRaw => String,
    CallableRaw => Callable,
    VariantRaw => Variant,
}

// Engine booleans are one byte; anything non-zero reads as true.
unsafe impl AbiValue for bool {
    const KIND: AbiKind = AbiKind::Bool;

    #[inline]
    unsafe fn encode(self, dst: *mut u8) {
        unsafe { dst.write(self as u8) }
    }

    #[inline]
    unsafe fn decode(src: *const u8) -> Self {
        unsafe { src.read() != 0 }
    }
}
