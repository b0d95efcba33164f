//! Method implementations of the mock classes.
//!
//! Each entry in [`METHODS`] is what a resolved bind points at. The
//! argument and return layouts match [`crate::CLASSDB_JSON`], and the host
//! verifies every frame against that table before calling, so the readers
//! here trust the layout they are given.

use crate::engine::{
    self, Connection, MockVariant, PendingFree, engine, id_of, load_variant, new_string, read_string,
    store_variant,
};
use classbind_sys::*;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::ptr;
use std::sync::OnceLock;

/// Engine error codes used by the mock.
const OK: i64 = 0;
const ERR_FILE_CANT_WRITE: i64 = 13;
const ERR_INVALID_PARAMETER: i64 = 31;

pub(crate) type MockFn = fn(Call);

pub(crate) struct MockMethod {
    pub name: &'static str,
    pub func: MockFn,
}

/// One native call as the mock sees it.
pub(crate) struct Call {
    this: ObjectPtr,
    args: *const ConstTypePtr,
    ret: TypePtr,
}

impl Call {
    pub fn new(this: ObjectPtr, args: *const ConstTypePtr, ret: TypePtr) -> Self {
        Call { this, args, ret }
    }

    fn id(&self) -> u64 {
        id_of(self.this)
    }

    fn arg_ptr(&self, index: usize) -> ConstTypePtr {
        unsafe { *self.args.add(index) }
    }

    fn arg<T: Copy>(&self, index: usize) -> T {
        unsafe { self.arg_ptr(index).cast::<T>().read() }
    }

    fn arg_bool(&self, index: usize) -> bool {
        self.arg::<u8>(index) != 0
    }

    fn arg_string(&self, index: usize) -> String {
        read_string(self.arg_ptr(index).cast())
    }

    fn ret<T>(&self, value: T) {
        unsafe { self.ret.cast::<T>().write(value) }
    }

    fn ret_bool(&self, value: bool) {
        self.ret(value as u8)
    }

    fn ret_string(&self, text: &str) {
        self.ret(new_string(text))
    }

    fn arg_variant(&self, index: usize) -> Option<MockVariant> {
        load_variant(self.arg_ptr(index).cast())
    }

    fn ret_variant(&self, value: Option<MockVariant>) {
        self.ret(store_variant(value))
    }

    /// Runs `f` on the receiver's state.
    fn with<R: Default>(&self, f: impl FnOnce(&mut engine::MockObject) -> R) -> R {
        engine().object(self.id()).map(f).unwrap_or_default()
    }
}

// Byte offsets of the last `Probe.layout` call's arguments, relative to
// the first argument.
thread_local! {
    static LAST_LAYOUT: RefCell<Option<[usize; 3]>> = const { RefCell::new(None) };
}

pub(crate) fn last_layout() -> Option<[usize; 3]> {
    LAST_LAYOUT.with(|layout| *layout.borrow())
}

// Object

fn object_get_class(call: Call) {
    let class = call.with(|o| o.class.clone());
    call.ret_string(&class);
}

fn object_get_instance_id(call: Call) {
    call.ret(call.id() as i64);
}

fn object_connect(call: Call) {
    let signal = call.arg_string(0);
    let callable = call.arg::<CallableRaw>(1).opaque[0] as u64;
    let flags = call.arg::<i64>(2);

    let mut engine = engine();
    let duplicate = engine
        .object(call.id())
        .is_some_and(|o| o.connections.iter().any(|c| c.signal == signal && c.callable == callable));
    if duplicate || !engine.retain_callable(callable) {
        call.ret(ERR_INVALID_PARAMETER);
        return;
    }
    if let Some(object) = engine.object(call.id()) {
        object.connections.push(Connection {
            signal,
            callable,
            one_shot: flags & 4 != 0,
        });
    }
    call.ret(OK);
}

fn object_disconnect(call: Call) {
    let signal = call.arg_string(0);
    let callable = call.arg::<CallableRaw>(1).opaque[0] as u64;

    let mut pending = Vec::new();
    {
        let mut engine = engine();
        let removed = engine.object(call.id()).is_some_and(|o| {
            let before = o.connections.len();
            o.connections
                .retain(|c| !(c.signal == signal && c.callable == callable));
            o.connections.len() != before
        });
        if removed {
            engine.release_callable(callable, &mut pending);
        }
    }
    engine::run_pending(pending);
}

fn object_is_connected(call: Call) {
    let signal = call.arg_string(0);
    let callable = call.arg::<CallableRaw>(1).opaque[0] as u64;
    let connected = call.with(|o| {
        o.connections
            .iter()
            .any(|c| c.signal == signal && c.callable == callable)
    });
    call.ret_bool(connected);
}

// Properties are free-form; setting nil removes one.

fn object_set(call: Call) {
    let name = call.arg_string(0);
    let value = call.arg_variant(1);
    call.with(|o| match value {
        Some(value) => {
            o.properties.insert(name, value);
        }
        None => {
            o.properties.remove(&name);
        }
    });
}

fn object_get(call: Call) {
    let name = call.arg_string(0);
    let value = call.with(|o| o.properties.get(&name).cloned());
    call.ret_variant(value);
}

// RefCounted

fn ref_counted_reference(call: Call) {
    let id = call.id();
    let mut engine = engine();
    if let Some(object) = engine.object(id) {
        object.refcount += 1;
    }
    engine.stats.entry(id).or_default().references += 1;
    call.ret_bool(true);
}

fn ref_counted_unreference(call: Call) {
    let id = call.id();
    let mut engine = engine();
    let remaining = engine.object(id).map_or(0, |object| {
        object.refcount -= 1;
        object.refcount
    });
    engine.stats.entry(id).or_default().unreferences += 1;
    call.ret_bool(remaining <= 0);
}

fn ref_counted_get_reference_count(call: Call) {
    call.ret(call.with(|o| o.refcount));
}

// Node

fn node_get_name(call: Call) {
    let name = call.with(|o| o.name.clone());
    call.ret_string(&name);
}

fn node_set_name(call: Call) {
    let name = call.arg_string(0);
    call.with(|o| o.name = name);
}

fn node_add_child(call: Call) {
    let child = id_of(call.arg::<ObjectPtr>(0));
    let parent = call.id();
    let mut engine = engine();
    if let Some(object) = engine.object(child) {
        object.parent = Some(parent);
    }
    if let Some(object) = engine.object(parent) {
        object.children.push(child);
    }
}

fn node_get_child_count(call: Call) {
    call.ret(call.with(|o| o.children.len() as i64));
}

fn node_get_child(call: Call) {
    let index = call.arg::<i64>(0);
    let mut engine = engine();
    let child = engine
        .object(call.id())
        .and_then(|o| usize::try_from(index).ok().and_then(|i| o.children.get(i).copied()));
    let ptr = child
        .and_then(|id| engine.object(id))
        .map_or(std::ptr::null_mut(), |o| o.ptr as ObjectPtr);
    call.ret(ptr);
}

fn node_get_parent(call: Call) {
    let mut engine = engine();
    let parent = engine.object(call.id()).and_then(|o| o.parent);
    let ptr = parent
        .and_then(|id| engine.object(id))
        .map_or(std::ptr::null_mut(), |o| o.ptr as ObjectPtr);
    call.ret(ptr);
}

// Timer

fn timer_set_wait_time(call: Call) {
    let seconds = call.arg::<f64>(0);
    call.with(|o| o.timer.wait_time = seconds);
}

fn timer_get_wait_time(call: Call) {
    call.ret(call.with(|o| o.timer.wait_time));
}

fn timer_set_one_shot(call: Call) {
    let one_shot = call.arg_bool(0);
    call.with(|o| o.timer.one_shot = one_shot);
}

fn timer_is_one_shot(call: Call) {
    call.ret_bool(call.with(|o| o.timer.one_shot));
}

fn timer_start(call: Call) {
    let seconds = call.arg::<f64>(0);
    call.with(|o| {
        if seconds > 0.0 {
            o.timer.wait_time = seconds;
        }
        o.timer.time_left = o.timer.wait_time;
        o.timer.running = true;
    });
}

fn timer_stop(call: Call) {
    call.with(|o| {
        o.timer.running = false;
        o.timer.time_left = 0.0;
    });
}

fn timer_is_stopped(call: Call) {
    call.ret_bool(call.with(|o| !o.timer.running));
}

fn timer_get_time_left(call: Call) {
    call.ret(call.with(|o| o.timer.time_left));
}

// Image

fn image_create(call: Call) {
    let width = call.arg::<i64>(0);
    let height = call.arg::<i64>(1);
    let _mipmaps = call.arg_bool(2);
    let format = call.arg::<i64>(3);
    if width <= 0 || height <= 0 {
        call.ret(std::ptr::null_mut::<std::ffi::c_void>());
        return;
    }

    let mut engine = engine();
    // The factory hands its caller the only reference.
    let ptr = engine.create("Image", 1);
    if let Some(object) = engine.object(id_of(ptr)) {
        object.image.width = width;
        object.image.height = height;
        object.image.format = format;
        object.image.pixels = vec![[0.0; 4]; (width * height) as usize];
    }
    call.ret(ptr);
}

fn image_get_width(call: Call) {
    call.ret(call.with(|o| o.image.width));
}

fn image_get_height(call: Call) {
    call.ret(call.with(|o| o.image.height));
}

fn image_get_size(call: Call) {
    let (w, h) = call.with(|o| (o.image.width as i32, o.image.height as i32));
    call.ret([w, h]);
}

fn image_get_format(call: Call) {
    call.ret(call.with(|o| o.image.format));
}

fn image_fill(call: Call) {
    let color = call.arg::<[f32; 4]>(0);
    call.with(|o| o.image.pixels.fill(color));
}

fn image_fill_rect(call: Call) {
    let [x, y, w, h] = call.arg::<[f32; 4]>(0);
    let color = call.arg::<[f32; 4]>(1);
    call.with(|o| {
        let image = &mut o.image;
        let x0 = (x.max(0.0) as i64).min(image.width);
        let y0 = (y.max(0.0) as i64).min(image.height);
        let x1 = ((x + w).max(0.0) as i64).min(image.width);
        let y1 = ((y + h).max(0.0) as i64).min(image.height);
        for row in y0..y1 {
            for col in x0..x1 {
                image.pixels[(row * image.width + col) as usize] = color;
            }
        }
    });
}

fn image_get_pixel(call: Call) {
    let x = call.arg::<i64>(0);
    let y = call.arg::<i64>(1);
    let color = call.with(|o| {
        let image = &o.image;
        if x < 0 || y < 0 || x >= image.width || y >= image.height {
            return [0.0; 4];
        }
        image.pixels[(y * image.width + x) as usize]
    });
    call.ret(color);
}

fn image_set_pixel(call: Call) {
    let x = call.arg::<i64>(0);
    let y = call.arg::<i64>(1);
    let color = call.arg::<[f32; 4]>(2);
    call.with(|o| {
        let image = &mut o.image;
        if x >= 0 && y >= 0 && x < image.width && y < image.height {
            image.pixels[(y * image.width + x) as usize] = color;
        }
    });
}

fn image_save_png(call: Call) {
    let path = call.arg_string(0);
    let status = call.with(|o| {
        if path.is_empty() || path.starts_with("/forbidden") {
            ERR_FILE_CANT_WRITE
        } else {
            o.image.saved_to = Some(path);
            OK
        }
    });
    call.ret(status);
}

// Probe: static loopback methods that return their argument.

fn echo<T: Copy>(call: Call) {
    call.ret(call.arg::<T>(0));
}

fn probe_echo_bool(call: Call) {
    call.ret_bool(call.arg_bool(0));
}

fn probe_echo_string(call: Call) {
    let text = call.arg_string(0);
    call.ret_string(&text);
}

fn probe_echo_variant(call: Call) {
    call.ret_variant(call.arg_variant(0));
}

fn probe_layout(call: Call) {
    let base = call.arg_ptr(0) as usize;
    let offsets = [0, call.arg_ptr(1) as usize - base, call.arg_ptr(2) as usize - base];
    LAST_LAYOUT.with(|layout| *layout.borrow_mut() = Some(offsets));
}

type Entry = (&'static str, &'static str, MockFn);

const METHODS: &[Entry] = &[
    ("Object", "get_class", object_get_class),
    ("Object", "get_instance_id", object_get_instance_id),
    ("Object", "connect", object_connect),
    ("Object", "disconnect", object_disconnect),
    ("Object", "is_connected", object_is_connected),
    ("Object", "set", object_set),
    ("Object", "get", object_get),
    ("RefCounted", "reference", ref_counted_reference),
    ("RefCounted", "unreference", ref_counted_unreference),
    ("RefCounted", "get_reference_count", ref_counted_get_reference_count),
    ("Node", "get_name", node_get_name),
    ("Node", "set_name", node_set_name),
    ("Node", "add_child", node_add_child),
    ("Node", "get_child_count", node_get_child_count),
    ("Node", "get_child", node_get_child),
    ("Node", "get_parent", node_get_parent),
    ("Timer", "set_wait_time", timer_set_wait_time),
    ("Timer", "get_wait_time", timer_get_wait_time),
    ("Timer", "set_one_shot", timer_set_one_shot),
    ("Timer", "is_one_shot", timer_is_one_shot),
    ("Timer", "start", timer_start),
    ("Timer", "stop", timer_stop),
    ("Timer", "is_stopped", timer_is_stopped),
    ("Timer", "get_time_left", timer_get_time_left),
    ("Image", "create", image_create),
    ("Image", "get_width", image_get_width),
    ("Image", "get_height", image_get_height),
    ("Image", "get_size", image_get_size),
    ("Image", "get_format", image_get_format),
    ("Image", "fill", image_fill),
    ("Image", "fill_rect", image_fill_rect),
    ("Image", "get_pixel", image_get_pixel),
    ("Image", "set_pixel", image_set_pixel),
    ("Image", "save_png", image_save_png),
    ("Probe", "echo_bool", probe_echo_bool),
    ("Probe", "echo_int32", echo::<i32>),
    ("Probe", "echo_int", echo::<i64>),
    ("Probe", "echo_float32", echo::<f32>),
    ("Probe", "echo_float", echo::<f64>),
    ("Probe", "echo_vector2", echo::<[f32; 2]>),
    ("Probe", "echo_vector2i", echo::<[i32; 2]>),
    ("Probe", "echo_vector3", echo::<[f32; 3]>),
    ("Probe", "echo_rect2", echo::<[f32; 4]>),
    ("Probe", "echo_color", echo::<[f32; 4]>),
    ("Probe", "echo_transform2d", echo::<[f32; 6]>),
    ("Probe", "echo_string", probe_echo_string),
    ("Probe", "echo_variant", probe_echo_variant),
    ("Probe", "layout", probe_layout),
];

const CLASSES: &[&str] = &["Object", "RefCounted", "Node", "Timer", "Image", "Probe"];

fn binds() -> &'static FxHashMap<String, MockMethod> {
    static BINDS: OnceLock<FxHashMap<String, MockMethod>> = OnceLock::new();
    BINDS.get_or_init(|| {
        METHODS
            .iter()
            .map(|&(class, name, func)| (format!("{class}.{name}"), MockMethod { name, func }))
            .collect()
    })
}

/// The bind for `class.method`, if the mock implements it.
pub(crate) fn lookup(class: &str, method: &str) -> Option<&'static MockMethod> {
    binds().get(&format!("{class}.{method}"))
}

pub(crate) fn is_known_class(class: &str) -> bool {
    CLASSES.contains(&class)
}

/// Invokes every callable connected to `signal` on `object` with `args`
/// and returns how many ran.
///
/// Callables run without the engine lock held, so they may call back into
/// the engine. One-shot connections are removed before anything runs and
/// their callables are released afterwards. Whatever a callable returns is
/// destroyed.
pub(crate) fn emit(object: u64, signal: &str, args: &[*const VariantRaw]) -> usize {
    let mut targets = Vec::new();
    let mut one_shots = Vec::new();
    let calls = {
        let mut engine = engine();
        let Some(state) = engine.object(object) else {
            return 0;
        };
        state.connections.retain(|c| {
            if c.signal != signal {
                return true;
            }
            targets.push(c.callable);
            if c.one_shot {
                one_shots.push(c.callable);
            }
            !c.one_shot
        });
        targets
            .iter()
            .filter_map(|id| engine.callables.get(id).copied())
            .collect::<Vec<_>>()
    };

    for entry in &calls {
        if let Some(call) = entry.call {
            let mut ret = VariantRaw::zeroed();
            unsafe {
                call(
                    entry.userdata as *mut std::ffi::c_void,
                    args.as_ptr().cast(),
                    args.len() as i64,
                    ptr::addr_of_mut!(ret).cast(),
                );
                engine::variant_destroy(&mut ret);
            }
        }
    }

    let mut pending: Vec<PendingFree> = Vec::new();
    {
        let mut engine = engine();
        for id in one_shots {
            engine.release_callable(id, &mut pending);
        }
    }
    engine::run_pending(pending);
    calls.len()
}
