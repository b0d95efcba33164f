//! Engine variants: dynamically typed values owned by the host.
//!
//! A [`Variant`] owns its engine storage and destroys it when dropped.
//! Building one from a Rust value copies the value into the engine's
//! representation, so the source stays owned by the caller. Values handed
//! back to the engine, such as callable return values, give up their
//! storage with [`Variant::into_raw`] instead of destroying it.

use crate::abi::{AbiKind, AbiValue};
use crate::builtin::{Color, Rect2, Transform2D, Vector2, Vector2i, Vector3};
use crate::error::{BindError, BindResult};
use crate::interface::EngineApi;
use crate::string::EngineString;
use classbind_sys::{
    StringRaw, TypeFromVariantConstructorFunc, VariantFromTypeConstructorFunc, VariantRaw,
};
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use std::ptr;

/// Type tag of a variant, matching the engine's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum VariantType {
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    Vector2 = 5,
    Vector2i = 6,
    Rect2 = 7,
    Vector3 = 9,
    Transform2D = 11,
    Color = 20,
    Object = 24,
    Callable = 25,
    /// A type this build has no conversions for.
    #[num_enum(catch_all)]
    Other(u32),
}

impl VariantType {
    /// The variant type whose native payload has exactly the layout of
    /// `kind`. Narrow numbers have none; widen them first.
    pub const fn of(kind: AbiKind) -> Option<VariantType> {
        match kind {
            AbiKind::Bool => Some(VariantType::Bool),
            AbiKind::Int64 => Some(VariantType::Int),
            AbiKind::Float64 => Some(VariantType::Float),
            AbiKind::String => Some(VariantType::String),
            AbiKind::Vector2 => Some(VariantType::Vector2),
            AbiKind::Vector2i => Some(VariantType::Vector2i),
            AbiKind::Rect2 => Some(VariantType::Rect2),
            AbiKind::Vector3 => Some(VariantType::Vector3),
            AbiKind::Transform2D => Some(VariantType::Transform2D),
            AbiKind::Color => Some(VariantType::Color),
            AbiKind::Object => Some(VariantType::Object),
            AbiKind::Callable => Some(VariantType::Callable),
            AbiKind::Nil | AbiKind::Int32 | AbiKind::Float32 | AbiKind::Variant => None,
        }
    }
}

// Large enough for every payload `VariantType::of` maps to.
type Scratch = [u64; 3];

fn from_type_constructor(api: &EngineApi, ty: VariantType) -> BindResult<VariantFromTypeConstructorFunc> {
    unsafe { (api.get_variant_from_type_constructor)(ty.into()) }
        .ok_or(BindError::NoVariantConversion(ty))
}

fn to_type_constructor(api: &EngineApi, ty: VariantType) -> BindResult<TypeFromVariantConstructorFunc> {
    unsafe { (api.get_variant_to_type_constructor)(ty.into()) }
        .ok_or(BindError::NoVariantConversion(ty))
}

/// An engine variant owned by the host.
pub struct Variant {
    raw: VariantRaw,
    api: &'static EngineApi,
}

impl Variant {
    pub fn nil(api: &'static EngineApi) -> Self {
        let mut raw = VariantRaw::zeroed();
        unsafe { (api.variant_new_nil)(&mut raw) };
        Variant { raw, api }
    }

    /// Converts `value` with its [`ToVariant`] impl.
    pub fn new<T: ToVariant + ?Sized>(api: &'static EngineApi, value: &T) -> BindResult<Self> {
        value.to_variant(api)
    }

    /// Copies a native value into a new variant of the matching type.
    pub fn from_abi<T: AbiValue>(api: &'static EngineApi, value: T) -> BindResult<Self> {
        let ty = VariantType::of(T::KIND).ok_or(BindError::NoVariantType(T::KIND))?;
        let construct = from_type_constructor(api, ty)?;

        let mut scratch: Scratch = [0; 3];
        let mut raw = VariantRaw::zeroed();
        unsafe {
            value.encode(scratch.as_mut_ptr().cast());
            construct(&mut raw, scratch.as_mut_ptr().cast());
        }
        Ok(Variant { raw, api })
    }

    /// Copies the payload out as `T`. The variant must hold exactly the
    /// type `T` maps to; engine-owned payloads such as strings come out
    /// as new storage owned by the caller.
    pub fn to_abi<T: AbiValue>(&self) -> BindResult<T> {
        let expected = VariantType::of(T::KIND).ok_or(BindError::NoVariantType(T::KIND))?;
        let found = self.get_type();
        if found != expected {
            return Err(BindError::VariantTypeMismatch { expected, found });
        }
        let convert = to_type_constructor(self.api, expected)?;

        let mut scratch: Scratch = [0; 3];
        unsafe {
            convert(scratch.as_mut_ptr().cast(), ptr::addr_of!(self.raw).cast_mut());
            Ok(T::decode(scratch.as_ptr().cast()))
        }
    }

    /// Converts with the target's [`FromVariant`] impl.
    pub fn to<T: FromVariant>(&self) -> BindResult<T> {
        T::from_variant(self)
    }

    pub fn get_type(&self) -> VariantType {
        VariantType::from(unsafe { (self.api.variant_get_type)(&self.raw) })
    }

    pub fn is_nil(&self) -> bool {
        self.get_type() == VariantType::Nil
    }

    /// Takes ownership of storage written by the engine, such as a return
    /// slot.
    ///
    /// # Safety
    /// `raw` must be an initialized variant nothing else will destroy.
    pub unsafe fn from_raw(api: &'static EngineApi, raw: VariantRaw) -> Self {
        Variant { raw, api }
    }

    /// Copies a variant the engine keeps ownership of.
    ///
    /// # Safety
    /// `src` must point to an initialized variant.
    pub unsafe fn from_borrowed(api: &'static EngineApi, src: *const VariantRaw) -> Self {
        let mut raw = VariantRaw::zeroed();
        unsafe { (api.variant_new_copy)(&mut raw, src) };
        Variant { raw, api }
    }

    /// The storage, for passing as a call argument. Ownership is unchanged.
    pub fn as_raw(&self) -> VariantRaw {
        self.raw
    }

    /// Pointer to the storage, for argument arrays.
    pub fn as_ptr(&self) -> *const VariantRaw {
        &self.raw
    }

    /// Gives the storage up without destroying it; whoever receives it
    /// owns the payload.
    pub fn into_raw(self) -> VariantRaw {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    pub fn api(&self) -> &'static EngineApi {
        self.api
    }
}

impl Clone for Variant {
    fn clone(&self) -> Self {
        unsafe { Variant::from_borrowed(self.api, &self.raw) }
    }
}

impl Drop for Variant {
    fn drop(&mut self) {
        unsafe { (self.api.variant_destroy)(&mut self.raw) };
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("type", &self.get_type())
            .field("raw", &self.raw)
            .finish()
    }
}

/// A Rust value that can be copied into a variant.
pub trait ToVariant {
    fn to_variant(&self, api: &'static EngineApi) -> BindResult<Variant>;
}

/// A Rust value that can be read back out of a variant.
pub trait FromVariant: Sized {
    /// ABI kind this value is declared as in signal and method signatures.
    const ABI_KIND: AbiKind;

    fn from_variant(variant: &Variant) -> BindResult<Self>;
}

macro_rules! native_variant {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToVariant for $ty {
                fn to_variant(&self, api: &'static EngineApi) -> BindResult<Variant> {
                    Variant::from_abi(api, *self)
                }
            }

            impl FromVariant for $ty {
                const ABI_KIND: AbiKind = <$ty as AbiValue>::KIND;

                fn from_variant(variant: &Variant) -> BindResult<Self> {
                    variant.to_abi()
                }
            }
        )*
    };
}

native_variant!(bool, i64, f64, Vector2, Vector2i, Vector3, Rect2, Color, Transform2D);

impl ToVariant for i32 {
    fn to_variant(&self, api: &'static EngineApi) -> BindResult<Variant> {
        i64::from(*self).to_variant(api)
    }
}

impl ToVariant for f32 {
    fn to_variant(&self, api: &'static EngineApi) -> BindResult<Variant> {
        f64::from(*self).to_variant(api)
    }
}

impl ToVariant for EngineString {
    fn to_variant(&self, api: &'static EngineApi) -> BindResult<Variant> {
        Variant::from_abi(api, self.as_raw())
    }
}

impl ToVariant for str {
    fn to_variant(&self, api: &'static EngineApi) -> BindResult<Variant> {
        EngineString::new(api, self).to_variant(api)
    }
}

impl ToVariant for String {
    fn to_variant(&self, api: &'static EngineApi) -> BindResult<Variant> {
        self.as_str().to_variant(api)
    }
}

impl FromVariant for String {
    const ABI_KIND: AbiKind = AbiKind::String;

    fn from_variant(variant: &Variant) -> BindResult<Self> {
        let raw: StringRaw = variant.to_abi()?;
        unsafe { EngineString::from_raw(variant.api, raw) }.to_rust_string()
    }
}

impl ToVariant for Variant {
    fn to_variant(&self, _api: &'static EngineApi) -> BindResult<Variant> {
        Ok(self.clone())
    }
}

impl FromVariant for Variant {
    const ABI_KIND: AbiKind = AbiKind::Variant;

    fn from_variant(variant: &Variant) -> BindResult<Self> {
        Ok(variant.clone())
    }
}

impl<T: ToVariant + ?Sized> ToVariant for &T {
    fn to_variant(&self, api: &'static EngineApi) -> BindResult<Variant> {
        (**self).to_variant(api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn api() -> &'static EngineApi {
        Box::leak(Box::new(EngineApi::from_raw(&test_support::interface()).unwrap()))
    }

    #[test]
    fn ints_round_trip() {
        let value = Variant::new(api(), &42i64).unwrap();
        assert_eq!(value.get_type(), VariantType::Int);
        assert_eq!(value.to::<i64>().unwrap(), 42);

        let widened = Variant::new(api(), &-7i32).unwrap();
        assert_eq!(widened.to::<i64>().unwrap(), -7);
    }

    #[test]
    fn reading_the_wrong_type_is_an_error() {
        let value = Variant::new(api(), &1i64).unwrap();
        assert!(matches!(
            value.to::<f64>(),
            Err(BindError::VariantTypeMismatch {
                expected: VariantType::Float,
                found: VariantType::Int
            })
        ));

        let nil = Variant::nil(api());
        assert!(nil.is_nil());
        assert!(matches!(
            nil.to::<i64>(),
            Err(BindError::VariantTypeMismatch { found: VariantType::Nil, .. })
        ));
    }

    #[test]
    fn narrow_kinds_have_no_variant_type() {
        assert!(matches!(
            Variant::from_abi(api(), 1.5f32),
            Err(BindError::NoVariantType(AbiKind::Float32))
        ));
        assert_eq!(VariantType::of(AbiKind::Variant), None);
    }

    #[test]
    fn missing_engine_conversions_are_reported() {
        assert!(matches!(
            Variant::new(api(), &true),
            Err(BindError::NoVariantConversion(VariantType::Bool))
        ));
    }

    #[test]
    fn unknown_type_ids_are_kept() {
        assert_eq!(VariantType::from(27), VariantType::Other(27));
        assert_eq!(u32::from(VariantType::Color), 20);
    }
}
