//! Minimal loopback engine for this crate's unit tests.
//!
//! Binds resolve to plain Rust functions; objects and strings are boxed on
//! the Rust heap. The full mock engine lives in `classbind-testkit`.

use crate::abi::AbiKind;
use crate::introspection::{ClassDb, ClassInfo, MethodInfo, ReturnOwnership};
use classbind_sys::*;
use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

type StubFn = unsafe fn(ObjectPtr, *const ConstTypePtr, TypePtr);

static ADD: StubFn = add;
static NOOP: StubFn = noop;
static UNREFERENCE: StubFn = unreference;

static DESTROYED: AtomicUsize = AtomicUsize::new(0);
static UNREFERENCED: AtomicUsize = AtomicUsize::new(0);

/// Number of `object_destroy` calls so far.
pub(crate) fn destroyed() -> usize {
    DESTROYED.load(Ordering::SeqCst)
}

/// Number of `RefCounted.unreference` calls so far.
pub(crate) fn unreferenced() -> usize {
    UNREFERENCED.load(Ordering::SeqCst)
}

unsafe fn add(_: ObjectPtr, args: *const ConstTypePtr, ret: TypePtr) {
    unsafe {
        let a = *(*args).cast::<i64>();
        let b = *(*args.add(1)).cast::<i64>();
        ret.cast::<i64>().write(a + b);
    }
}

unsafe fn noop(_: ObjectPtr, _: *const ConstTypePtr, _: TypePtr) {}

unsafe fn unreference(_: ObjectPtr, _: *const ConstTypePtr, _: TypePtr) {
    UNREFERENCED.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn get_method_bind(
    _class: *const c_char,
    method: *const c_char,
    _hash: i64,
) -> MethodBindPtr {
    let method = unsafe { CStr::from_ptr(method) }.to_string_lossy();
    match method.as_ref() {
        "add" => (&ADD as *const StubFn).cast(),
        "unreference" => (&UNREFERENCE as *const StubFn).cast(),
        name if name.starts_with("missing_") => ptr::null(),
        _ => (&NOOP as *const StubFn).cast(),
    }
}

unsafe extern "C" fn ptrcall(
    bind: MethodBindPtr,
    object: ObjectPtr,
    args: *const ConstTypePtr,
    ret: TypePtr,
) {
    unsafe {
        let func = *bind.cast::<StubFn>();
        func(object, args, ret)
    }
}

/// Only `Calc` is constructible. Its `reference` bind is a no-op that
/// reports failure.
unsafe extern "C" fn construct_object(class: *const c_char) -> ObjectPtr {
    match unsafe { CStr::from_ptr(class) }.to_bytes() {
        b"Calc" => Box::into_raw(Box::new(0u64)).cast(),
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn object_destroy(object: ObjectPtr) {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
    if !object.is_null() {
        drop(unsafe { Box::from_raw(object.cast::<u64>()) });
    }
}

unsafe extern "C" fn instance_id(_object: ConstObjectPtr) -> InstanceIdRaw {
    0
}

unsafe extern "C" fn instance_from_id(_id: InstanceIdRaw) -> ObjectPtr {
    ptr::null_mut()
}

unsafe extern "C" fn string_new(dest: *mut StringRaw, contents: *const c_char, size: i64) {
    let bytes = unsafe { std::slice::from_raw_parts(contents.cast::<u8>(), size as usize) };
    let boxed = Box::new(String::from_utf8_lossy(bytes).into_owned());
    unsafe { (*dest).opaque[0] = Box::into_raw(boxed) as usize };
}

unsafe extern "C" fn string_to_utf8(string: *const StringRaw, buffer: *mut c_char, max_len: i64) -> i64 {
    let addr = unsafe { (*string).opaque[0] };
    if addr == 0 {
        return 0;
    }
    let text = unsafe { &*(addr as *const String) };
    if !buffer.is_null() {
        let len = text.len().min(max_len as usize);
        unsafe { ptr::copy_nonoverlapping(text.as_ptr(), buffer.cast::<u8>(), len) };
    }
    text.len() as i64
}

unsafe extern "C" fn string_destroy(string: *mut StringRaw) {
    let addr = unsafe { (*string).opaque[0] };
    if addr != 0 {
        drop(unsafe { Box::from_raw(addr as *mut String) });
        unsafe { (*string).opaque[0] = 0 };
    }
}

unsafe extern "C" fn callable_create(dest: *mut CallableRaw, info: *const CallableCustomInfo) {
    unsafe {
        (*dest).opaque[0] = (*info).userdata as usize;
        (*dest).opaque[1] = (*info).free.map_or(0, |f| f as usize);
    }
}

unsafe extern "C" fn callable_destroy(callable: *mut CallableRaw) {
    unsafe {
        let [userdata, free] = (*callable).opaque;
        if free != 0 {
            let free: CallableCustomFree = std::mem::transmute(free);
            free(userdata as *mut c_void);
        }
        (*callable).opaque = [0; 2];
    }
}

// Variants: word 0 is the type id, word 1 an inline int payload. Only
// ints convert.

const INT_TYPE: VariantTypeRaw = 2;

unsafe extern "C" fn variant_new_copy(dest: *mut VariantRaw, src: *const VariantRaw) {
    unsafe { dest.write(*src) }
}

unsafe extern "C" fn variant_new_nil(dest: *mut VariantRaw) {
    unsafe { dest.write(VariantRaw::zeroed()) }
}

unsafe extern "C" fn variant_destroy(variant: *mut VariantRaw) {
    unsafe { variant.write(VariantRaw::zeroed()) }
}

unsafe extern "C" fn variant_get_type(variant: *const VariantRaw) -> VariantTypeRaw {
    unsafe { (*variant).opaque[0] as VariantTypeRaw }
}

unsafe extern "C" fn int_to_variant(dest: *mut VariantRaw, value: TypePtr) {
    let value = unsafe { *value.cast::<i64>() };
    unsafe {
        dest.write(VariantRaw {
            opaque: [INT_TYPE as usize, value as usize, 0],
        })
    }
}

unsafe extern "C" fn variant_to_int(dest: TypePtr, variant: *mut VariantRaw) {
    unsafe { dest.cast::<i64>().write((*variant).opaque[1] as i64) }
}

unsafe extern "C" fn from_type_constructor(ty: VariantTypeRaw) -> Option<VariantFromTypeConstructorFunc> {
    (ty == INT_TYPE).then_some(int_to_variant as VariantFromTypeConstructorFunc)
}

unsafe extern "C" fn to_type_constructor(ty: VariantTypeRaw) -> Option<TypeFromVariantConstructorFunc> {
    (ty == INT_TYPE).then_some(variant_to_int as TypeFromVariantConstructorFunc)
}

unsafe extern "C" fn print_error(
    _description: *const c_char,
    _function: *const c_char,
    _file: *const c_char,
    _line: i32,
    _notify_editor: Bool,
) {
}

pub(crate) fn interface() -> EngineInterface {
    EngineInterface {
        version_major: 4,
        version_minor: 3,
        classdb_get_method_bind: Some(get_method_bind),
        object_method_bind_ptrcall: Some(ptrcall),
        classdb_construct_object: Some(construct_object),
        object_destroy: Some(object_destroy),
        object_get_instance_id: Some(instance_id),
        object_get_instance_from_id: Some(instance_from_id),
        string_new_with_utf8_chars_and_len: Some(string_new),
        string_to_utf8_chars: Some(string_to_utf8),
        string_destroy: Some(string_destroy),
        callable_custom_create: Some(callable_create),
        callable_destroy: Some(callable_destroy),
        variant_new_copy: Some(variant_new_copy),
        variant_new_nil: Some(variant_new_nil),
        variant_destroy: Some(variant_destroy),
        variant_get_type: Some(variant_get_type),
        get_variant_from_type_constructor: Some(from_type_constructor),
        get_variant_to_type_constructor: Some(to_type_constructor),
        print_error: Some(print_error),
    }
}

/// Core classes plus a `Calc` class whose `add(int, int) -> int` really adds.
pub(crate) fn classdb() -> ClassDb {
    ClassDb::new(vec![
        ClassInfo::new("Object")
            .method(MethodInfo::new("get_class").returns(AbiKind::String))
            .method(
                MethodInfo::new("connect")
                    .args([AbiKind::String, AbiKind::Callable, AbiKind::Int64])
                    .returns(AbiKind::Int64),
            )
            .method(MethodInfo::new("disconnect").args([AbiKind::String, AbiKind::Callable])),
        ClassInfo::new("RefCounted")
            .inherits("Object")
            .method(MethodInfo::new("reference").returns(AbiKind::Bool))
            .method(MethodInfo::new("unreference").returns(AbiKind::Bool))
            .method(MethodInfo::new("get_reference_count").returns(AbiKind::Int64)),
        ClassInfo::new("Calc")
            .inherits("RefCounted")
            .method(
                MethodInfo::new("add")
                    .args([AbiKind::Int64, AbiKind::Int64])
                    .returns(AbiKind::Int64)
                    .static_method(),
            )
            .method(MethodInfo::new("twin").returns_object("Calc", ReturnOwnership::Owned)),
    ])
}
