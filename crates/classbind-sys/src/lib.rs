//! Raw C ABI of the engine interface.
//!
//! Everything in this crate mirrors the layout the native engine expects:
//! opaque pointer aliases, fixed-size opaque value types, and a table of
//! `unsafe extern "C"` function pointers handed to the extension at load
//! time. No safe wrappers live here; see `classbind-core` for those.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_void};

/// Size in bytes of one call-frame word.
pub const WORD: usize = std::mem::size_of::<usize>();

/// Opaque pointer to an engine object.
pub type ObjectPtr = *mut c_void;
/// Opaque pointer to an engine object that must not be mutated.
pub type ConstObjectPtr = *const c_void;
/// Resolved native method bind.
pub type MethodBindPtr = *const c_void;
/// Pointer to storage of some engine type, written by the callee.
pub type TypePtr = *mut c_void;
/// Pointer to storage of some engine type, read by the callee.
pub type ConstTypePtr = *const c_void;
/// Engine-wide object identity.
pub type InstanceIdRaw = u64;
/// Engine boolean as passed through function pointers.
pub type Bool = u8;

pub const FALSE: Bool = 0;
pub const TRUE: Bool = 1;

/// Storage of an engine string. The engine owns whatever `opaque` points to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringRaw {
    pub opaque: [usize; 1],
}

impl StringRaw {
    pub const fn zeroed() -> Self {
        Self { opaque: [0; 1] }
    }
}

/// Storage of an engine callable (two words: id and payload).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallableRaw {
    pub opaque: [usize; 2],
}

impl CallableRaw {
    pub const fn zeroed() -> Self {
        Self { opaque: [0; 2] }
    }
}

/// Storage of an engine variant: a type tag plus an inline payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantRaw {
    pub opaque: [usize; 3],
}

impl VariantRaw {
    /// Bit pattern of a nil variant.
    pub const fn zeroed() -> Self {
        Self { opaque: [0; 3] }
    }
}

/// Engine variant type id, see `GDExtensionVariantType`.
pub type VariantTypeRaw = u32;

/// Invoked by the engine when a custom callable is called.
///
/// `args` points to `arg_count` pointers to [`VariantRaw`] arguments the
/// engine keeps ownership of. `ret` points to a nil variant the callee may
/// overwrite, or is null when the caller discards the result.
pub type CallableCustomCall = unsafe extern "C" fn(
    userdata: *mut c_void,
    args: *const ConstTypePtr,
    arg_count: i64,
    ret: TypePtr,
);

/// Invoked by the engine exactly once when the last copy of a custom
/// callable is destroyed.
pub type CallableCustomFree = unsafe extern "C" fn(userdata: *mut c_void);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallableCustomInfo {
    pub userdata: *mut c_void,
    pub object_id: InstanceIdRaw,
    pub call: Option<CallableCustomCall>,
    pub free: Option<CallableCustomFree>,
}

pub type ClassdbGetMethodBind = unsafe extern "C" fn(
    class_name: *const c_char,
    method_name: *const c_char,
    hash: i64,
) -> MethodBindPtr;

pub type ObjectMethodBindPtrcall = unsafe extern "C" fn(
    method_bind: MethodBindPtr,
    object: ObjectPtr,
    args: *const ConstTypePtr,
    ret: TypePtr,
);

pub type ClassdbConstructObject = unsafe extern "C" fn(class_name: *const c_char) -> ObjectPtr;

pub type ObjectDestroy = unsafe extern "C" fn(object: ObjectPtr);

pub type ObjectGetInstanceId = unsafe extern "C" fn(object: ConstObjectPtr) -> InstanceIdRaw;

pub type ObjectGetInstanceFromId = unsafe extern "C" fn(instance_id: InstanceIdRaw) -> ObjectPtr;

pub type StringNewWithUtf8CharsAndLen =
    unsafe extern "C" fn(dest: *mut StringRaw, contents: *const c_char, size: i64);

/// Copies at most `max_len` bytes into `buffer` and returns the full length
/// in bytes. `buffer` may be null to query the length only.
pub type StringToUtf8Chars =
    unsafe extern "C" fn(string: *const StringRaw, buffer: *mut c_char, max_len: i64) -> i64;

pub type StringDestroy = unsafe extern "C" fn(string: *mut StringRaw);

pub type CallableCustomCreate =
    unsafe extern "C" fn(dest: *mut CallableRaw, info: *const CallableCustomInfo);

pub type CallableDestroy = unsafe extern "C" fn(callable: *mut CallableRaw);

pub type VariantNewCopy = unsafe extern "C" fn(dest: *mut VariantRaw, src: *const VariantRaw);

pub type VariantNewNil = unsafe extern "C" fn(dest: *mut VariantRaw);

pub type VariantDestroy = unsafe extern "C" fn(variant: *mut VariantRaw);

pub type VariantGetType = unsafe extern "C" fn(variant: *const VariantRaw) -> VariantTypeRaw;

/// Builds a variant from the native representation at `value`, copying it.
pub type VariantFromTypeConstructorFunc = unsafe extern "C" fn(dest: *mut VariantRaw, value: TypePtr);

/// Writes the native representation of `variant` to `dest`. Engine-owned
/// payloads such as strings are copied into `dest`.
pub type TypeFromVariantConstructorFunc = unsafe extern "C" fn(dest: TypePtr, variant: *mut VariantRaw);

/// `None` when the engine cannot convert to or from this type.
pub type GetVariantFromTypeConstructor =
    unsafe extern "C" fn(ty: VariantTypeRaw) -> Option<VariantFromTypeConstructorFunc>;

pub type GetVariantToTypeConstructor =
    unsafe extern "C" fn(ty: VariantTypeRaw) -> Option<TypeFromVariantConstructorFunc>;

pub type PrintError = unsafe extern "C" fn(
    description: *const c_char,
    function: *const c_char,
    file: *const c_char,
    line: i32,
    notify_editor: Bool,
);

/// Function table provided by the engine when the extension is loaded.
///
/// Entries are optional because older engine builds may not export all of
/// them; the safe layer validates the table once during initialization.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineInterface {
    pub version_major: u32,
    pub version_minor: u32,
    pub classdb_get_method_bind: Option<ClassdbGetMethodBind>,
    pub object_method_bind_ptrcall: Option<ObjectMethodBindPtrcall>,
    pub classdb_construct_object: Option<ClassdbConstructObject>,
    pub object_destroy: Option<ObjectDestroy>,
    pub object_get_instance_id: Option<ObjectGetInstanceId>,
    pub object_get_instance_from_id: Option<ObjectGetInstanceFromId>,
    pub string_new_with_utf8_chars_and_len: Option<StringNewWithUtf8CharsAndLen>,
    pub string_to_utf8_chars: Option<StringToUtf8Chars>,
    pub string_destroy: Option<StringDestroy>,
    pub callable_custom_create: Option<CallableCustomCreate>,
    pub callable_destroy: Option<CallableDestroy>,
    pub variant_new_copy: Option<VariantNewCopy>,
    pub variant_new_nil: Option<VariantNewNil>,
    pub variant_destroy: Option<VariantDestroy>,
    pub variant_get_type: Option<VariantGetType>,
    pub get_variant_from_type_constructor: Option<GetVariantFromTypeConstructor>,
    pub get_variant_to_type_constructor: Option<GetVariantToTypeConstructor>,
    pub print_error: Option<PrintError>,
}
