//! State of the mock engine and its C entry points.

use crate::classes::{self, Call};
use classbind_sys::*;
use rustc_hash::FxHashMap;
use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{trace, warn};

/// Call counters for one object, kept after the object is destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectStats {
    pub constructed: usize,
    pub references: usize,
    pub unreferences: usize,
    pub destroyed: usize,
}

/// What the pointer handed to the host points at. Headers are never freed,
/// so a stale pointer still yields its id.
#[repr(C)]
pub(crate) struct MockHeader {
    pub id: u64,
}

#[derive(Debug, Default)]
pub(crate) struct TimerState {
    pub wait_time: f64,
    pub time_left: f64,
    pub one_shot: bool,
    pub running: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ImageState {
    pub width: i64,
    pub height: i64,
    pub format: i64,
    pub pixels: Vec<[f32; 4]>,
    pub saved_to: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Connection {
    pub signal: String,
    pub callable: u64,
    pub one_shot: bool,
}

/// Payload of a mock variant. The storage's first word holds the type id,
/// the second a boxed payload; nil has neither.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockVariant {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Plain-data math types, kept as their native bytes.
    Plain { ty: VariantTypeRaw, bytes: Vec<u8> },
}

impl MockVariant {
    fn type_id(&self) -> VariantTypeRaw {
        match self {
            MockVariant::Bool(_) => BOOL,
            MockVariant::Int(_) => INT,
            MockVariant::Float(_) => FLOAT,
            MockVariant::Str(_) => STRING,
            MockVariant::Plain { ty, .. } => *ty,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MockObject {
    pub ptr: usize,
    pub class: String,
    pub refcount: i64,
    pub name: String,
    pub children: Vec<u64>,
    pub parent: Option<u64>,
    pub timer: TimerState,
    pub image: ImageState,
    pub connections: Vec<Connection>,
    pub properties: FxHashMap<String, MockVariant>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CallableEntry {
    pub userdata: usize,
    pub call: Option<CallableCustomCall>,
    pub free: Option<CallableCustomFree>,
    pub copies: usize,
}

/// Userdata whose free callback must run once the engine lock is dropped.
pub(crate) type PendingFree = (CallableCustomFree, usize);

#[derive(Debug, Default)]
pub(crate) struct MockEngine {
    next_id: u64,
    pub objects: FxHashMap<u64, MockObject>,
    pub stats: FxHashMap<u64, ObjectStats>,
    pub callables: FxHashMap<u64, CallableEntry>,
    pub use_after_free: usize,
    pub errors: Vec<String>,
}

static ENGINE: OnceLock<Mutex<MockEngine>> = OnceLock::new();

/// Locks the mock engine. A panicking test must not wedge the others, so
/// poisoning is ignored.
pub(crate) fn engine() -> MutexGuard<'static, MockEngine> {
    ENGINE
        .get_or_init(|| Mutex::new(MockEngine::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn id_of(object: ConstObjectPtr) -> u64 {
    if object.is_null() {
        return 0;
    }
    unsafe { (*object.cast::<MockHeader>()).id }
}

impl MockEngine {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Creates an object of `class`; refcount starts at `refcount`.
    pub fn create(&mut self, class: &str, refcount: i64) -> ObjectPtr {
        let id = self.next_id();
        let header: &'static mut MockHeader = Box::leak(Box::new(MockHeader { id }));
        let ptr: ObjectPtr = (header as *mut MockHeader).cast();
        self.objects.insert(
            id,
            MockObject {
                ptr: ptr as usize,
                class: class.to_string(),
                refcount,
                name: String::new(),
                children: Vec::new(),
                parent: None,
                timer: TimerState {
                    wait_time: 1.0,
                    ..TimerState::default()
                },
                image: ImageState::default(),
                connections: Vec::new(),
                properties: FxHashMap::default(),
            },
        );
        self.stats.entry(id).or_default().constructed += 1;
        trace!(id, %class, "mock object created");
        ptr
    }

    pub fn object(&mut self, id: u64) -> Option<&mut MockObject> {
        self.objects.get_mut(&id)
    }

    /// Removes `id` and, for nodes, every descendant.
    pub fn destroy(&mut self, id: u64, pending: &mut Vec<PendingFree>) {
        let Some(object) = self.objects.remove(&id) else {
            self.use_after_free += 1;
            warn!(id, "destroy of a dead mock object");
            return;
        };
        self.stats.entry(id).or_default().destroyed += 1;

        if let Some(parent) = object.parent.and_then(|p| self.objects.get_mut(&p)) {
            parent.children.retain(|&child| child != id);
        }
        for connection in &object.connections {
            self.release_callable(connection.callable, pending);
        }
        for child in object.children {
            if let Some(child_object) = self.objects.get_mut(&child) {
                child_object.parent = None;
            }
            self.destroy(child, pending);
        }
    }

    pub fn register_callable(&mut self, info: &CallableCustomInfo) -> u64 {
        let id = self.next_id();
        self.callables.insert(
            id,
            CallableEntry {
                userdata: info.userdata as usize,
                call: info.call,
                free: info.free,
                copies: 1,
            },
        );
        id
    }

    pub fn retain_callable(&mut self, id: u64) -> bool {
        match self.callables.get_mut(&id) {
            Some(entry) => {
                entry.copies += 1;
                true
            }
            None => false,
        }
    }

    pub fn release_callable(&mut self, id: u64, pending: &mut Vec<PendingFree>) {
        let Some(entry) = self.callables.get_mut(&id) else {
            return;
        };
        entry.copies -= 1;
        if entry.copies == 0 {
            let entry = self.callables.remove(&id);
            if let Some(CallableEntry {
                free: Some(free),
                userdata,
                ..
            }) = entry
            {
                pending.push((free, userdata));
            }
        }
    }
}

pub(crate) fn run_pending(pending: Vec<PendingFree>) {
    for (free, userdata) in pending {
        unsafe { free(userdata as *mut c_void) };
    }
}

// ---------------------------------------------------------------------------
// Strings: the opaque word holds a boxed Rust string.

pub(crate) fn read_string(raw: *const StringRaw) -> String {
    let addr = unsafe { (*raw).opaque[0] };
    if addr == 0 {
        return String::new();
    }
    unsafe { (*(addr as *const String)).clone() }
}

pub(crate) fn new_string(text: &str) -> StringRaw {
    StringRaw {
        opaque: [Box::into_raw(Box::new(text.to_string())) as usize],
    }
}

// ---------------------------------------------------------------------------
// Variants.

const NIL: VariantTypeRaw = 0;
const BOOL: VariantTypeRaw = 1;
const INT: VariantTypeRaw = 2;
const FLOAT: VariantTypeRaw = 3;
const STRING: VariantTypeRaw = 4;
const VECTOR2: VariantTypeRaw = 5;
const VECTOR2I: VariantTypeRaw = 6;
const RECT2: VariantTypeRaw = 7;
const VECTOR3: VariantTypeRaw = 9;
const TRANSFORM2D: VariantTypeRaw = 11;
const COLOR: VariantTypeRaw = 20;

pub(crate) fn store_variant(value: Option<MockVariant>) -> VariantRaw {
    match value {
        None => VariantRaw::zeroed(),
        Some(value) => VariantRaw {
            opaque: [value.type_id() as usize, Box::into_raw(Box::new(value)) as usize, 0],
        },
    }
}

/// A copy of the payload behind `raw`; `None` for nil.
pub(crate) fn load_variant(raw: *const VariantRaw) -> Option<MockVariant> {
    let addr = unsafe { (*raw).opaque[1] };
    if addr == 0 {
        return None;
    }
    Some(unsafe { (*(addr as *const MockVariant)).clone() })
}

pub(crate) unsafe extern "C" fn variant_destroy(variant: *mut VariantRaw) {
    let addr = unsafe { (*variant).opaque[1] };
    if addr != 0 {
        drop(unsafe { Box::from_raw(addr as *mut MockVariant) });
    }
    unsafe { variant.write(VariantRaw::zeroed()) };
}

unsafe extern "C" fn variant_new_copy(dest: *mut VariantRaw, src: *const VariantRaw) {
    unsafe { dest.write(store_variant(load_variant(src))) };
}

unsafe extern "C" fn variant_new_nil(dest: *mut VariantRaw) {
    unsafe { dest.write(VariantRaw::zeroed()) };
}

unsafe extern "C" fn variant_get_type(variant: *const VariantRaw) -> VariantTypeRaw {
    match unsafe { (*variant).opaque[1] } {
        0 => NIL,
        _ => unsafe { (*variant).opaque[0] as VariantTypeRaw },
    }
}

unsafe extern "C" fn bool_to_variant(dest: *mut VariantRaw, value: TypePtr) {
    let value = unsafe { value.cast::<u8>().read() } != 0;
    unsafe { dest.write(store_variant(Some(MockVariant::Bool(value)))) };
}

unsafe extern "C" fn int_to_variant(dest: *mut VariantRaw, value: TypePtr) {
    let value = unsafe { value.cast::<i64>().read() };
    unsafe { dest.write(store_variant(Some(MockVariant::Int(value)))) };
}

unsafe extern "C" fn float_to_variant(dest: *mut VariantRaw, value: TypePtr) {
    let value = unsafe { value.cast::<f64>().read() };
    unsafe { dest.write(store_variant(Some(MockVariant::Float(value)))) };
}

unsafe extern "C" fn string_to_variant(dest: *mut VariantRaw, value: TypePtr) {
    let text = read_string(value.cast::<StringRaw>());
    unsafe { dest.write(store_variant(Some(MockVariant::Str(text)))) };
}

unsafe extern "C" fn plain_to_variant<const TY: VariantTypeRaw, const SIZE: usize>(
    dest: *mut VariantRaw,
    value: TypePtr,
) {
    let bytes = unsafe { std::slice::from_raw_parts(value.cast::<u8>(), SIZE) }.to_vec();
    unsafe { dest.write(store_variant(Some(MockVariant::Plain { ty: TY, bytes }))) };
}

unsafe extern "C" fn variant_to_bool(dest: TypePtr, variant: *mut VariantRaw) {
    let value = matches!(load_variant(variant), Some(MockVariant::Bool(true)));
    unsafe { dest.cast::<u8>().write(value as u8) };
}

unsafe extern "C" fn variant_to_int(dest: TypePtr, variant: *mut VariantRaw) {
    let value = match load_variant(variant) {
        Some(MockVariant::Int(value)) => value,
        _ => 0,
    };
    unsafe { dest.cast::<i64>().write(value) };
}

unsafe extern "C" fn variant_to_float(dest: TypePtr, variant: *mut VariantRaw) {
    let value = match load_variant(variant) {
        Some(MockVariant::Float(value)) => value,
        _ => 0.0,
    };
    unsafe { dest.cast::<f64>().write(value) };
}

unsafe extern "C" fn variant_to_string(dest: TypePtr, variant: *mut VariantRaw) {
    let text = match load_variant(variant) {
        Some(MockVariant::Str(text)) => text,
        _ => String::new(),
    };
    unsafe { dest.cast::<StringRaw>().write(new_string(&text)) };
}

unsafe extern "C" fn variant_to_plain<const SIZE: usize>(dest: TypePtr, variant: *mut VariantRaw) {
    if let Some(MockVariant::Plain { bytes, .. }) = load_variant(variant) {
        let len = bytes.len().min(SIZE);
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), dest.cast::<u8>(), len) };
    }
}

unsafe extern "C" fn from_type_constructor(ty: VariantTypeRaw) -> Option<VariantFromTypeConstructorFunc> {
    let construct: VariantFromTypeConstructorFunc = match ty {
        BOOL => bool_to_variant,
        INT => int_to_variant,
        FLOAT => float_to_variant,
        STRING => string_to_variant,
        VECTOR2 => plain_to_variant::<VECTOR2, 8>,
        VECTOR2I => plain_to_variant::<VECTOR2I, 8>,
        RECT2 => plain_to_variant::<RECT2, 16>,
        VECTOR3 => plain_to_variant::<VECTOR3, 12>,
        TRANSFORM2D => plain_to_variant::<TRANSFORM2D, 24>,
        COLOR => plain_to_variant::<COLOR, 16>,
        _ => return None,
    };
    Some(construct)
}

unsafe extern "C" fn to_type_constructor(ty: VariantTypeRaw) -> Option<TypeFromVariantConstructorFunc> {
    let convert: TypeFromVariantConstructorFunc = match ty {
        BOOL => variant_to_bool,
        INT => variant_to_int,
        FLOAT => variant_to_float,
        STRING => variant_to_string,
        VECTOR2 | VECTOR2I => variant_to_plain::<8>,
        RECT2 | COLOR => variant_to_plain::<16>,
        VECTOR3 => variant_to_plain::<12>,
        TRANSFORM2D => variant_to_plain::<24>,
        _ => return None,
    };
    Some(convert)
}

// ---------------------------------------------------------------------------
// Interface entry points.

unsafe extern "C" fn get_method_bind(
    class: *const c_char,
    method: *const c_char,
    _hash: i64,
) -> MethodBindPtr {
    let class = unsafe { CStr::from_ptr(class) }.to_string_lossy();
    let method = unsafe { CStr::from_ptr(method) }.to_string_lossy();
    match classes::lookup(&class, &method) {
        Some(bind) => (bind as *const classes::MockMethod).cast(),
        None => ptr::null(),
    }
}

unsafe extern "C" fn ptrcall(
    bind: MethodBindPtr,
    object: ObjectPtr,
    args: *const ConstTypePtr,
    ret: TypePtr,
) {
    let method = unsafe { &*bind.cast::<classes::MockMethod>() };
    if !object.is_null() {
        let mut engine = engine();
        if !engine.objects.contains_key(&id_of(object)) {
            engine.use_after_free += 1;
            warn!(method = method.name, "call on a dead mock object");
            return;
        }
    }
    (method.func)(Call::new(object, args, ret));
}

unsafe extern "C" fn construct_object(class: *const c_char) -> ObjectPtr {
    let class = unsafe { CStr::from_ptr(class) }.to_string_lossy();
    if !classes::is_known_class(&class) {
        return ptr::null_mut();
    }
    engine().create(&class, 0)
}

unsafe extern "C" fn object_destroy(object: ObjectPtr) {
    let mut pending = Vec::new();
    engine().destroy(id_of(object), &mut pending);
    run_pending(pending);
}

unsafe extern "C" fn object_get_instance_id(object: ConstObjectPtr) -> InstanceIdRaw {
    id_of(object)
}

unsafe extern "C" fn object_get_instance_from_id(id: InstanceIdRaw) -> ObjectPtr {
    engine()
        .objects
        .get(&id)
        .map_or(ptr::null_mut(), |object| object.ptr as ObjectPtr)
}

unsafe extern "C" fn string_new(dest: *mut StringRaw, contents: *const c_char, size: i64) {
    let bytes = unsafe { std::slice::from_raw_parts(contents.cast::<u8>(), size as usize) };
    let text = String::from_utf8_lossy(bytes);
    unsafe { dest.write(new_string(&text)) };
}

unsafe extern "C" fn string_to_utf8(string: *const StringRaw, buffer: *mut c_char, max_len: i64) -> i64 {
    let text = read_string(string);
    if !buffer.is_null() {
        let len = text.len().min(max_len.max(0) as usize);
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
    let id = engine().register_callable(unsafe { &*info });
    unsafe { dest.write(CallableRaw { opaque: [id as usize, 0] }) };
}

unsafe extern "C" fn callable_destroy(callable: *mut CallableRaw) {
    let id = unsafe { (*callable).opaque[0] } as u64;
    let mut pending = Vec::new();
    engine().release_callable(id, &mut pending);
    run_pending(pending);
    unsafe { (*callable).opaque = [0; 2] };
}

unsafe extern "C" fn print_error(
    description: *const c_char,
    _function: *const c_char,
    _file: *const c_char,
    _line: i32,
    _notify_editor: Bool,
) {
    let message = unsafe { CStr::from_ptr(description) }.to_string_lossy().into_owned();
    engine().errors.push(message);
}

/// The mock's function table.
pub fn interface() -> EngineInterface {
    EngineInterface {
        version_major: 4,
        version_minor: 3,
        classdb_get_method_bind: Some(get_method_bind),
        object_method_bind_ptrcall: Some(ptrcall),
        classdb_construct_object: Some(construct_object),
        object_destroy: Some(object_destroy),
        object_get_instance_id: Some(object_get_instance_id),
        object_get_instance_from_id: Some(object_get_instance_from_id),
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
