//! An in-process mock of the engine side of the binding boundary.
//!
//! The mock implements every entry of the engine interface with
//! `extern "C"` functions, keeps objects in a process-wide table, and
//! counts the lifecycle calls each object receives so tests can check the
//! ownership discipline of handles:
//!
//! ```ignore
//! let rt = classbind_testkit::runtime();
//! let image = Image::create(rt, 4, 4, false, ImageFormat::Rgba8)?.unwrap();
//! let ptr = image.as_ptr();
//! drop(image);
//! assert_eq!(classbind_testkit::stats(ptr).unreferences, 1);
//! ```
//!
//! Classes: `Object` (with free-form properties through `get`/`set`),
//! `RefCounted`, `Node`, `Timer`, `Image`, and `Probe`, a class of static
//! loopback methods that return their argument. Variants live on the heap
//! of the mock and are freed by `variant_destroy`.

mod classes;
mod engine;

use classbind_core::{BindConfig, BindError, Callable, ClassDb, Runtime, Variant};
use classbind_sys::{ObjectPtr, VariantRaw};
use tracing::debug;

pub use engine::{ObjectStats, interface};

/// Introspection table describing exactly the mock's classes.
pub const CLASSDB_JSON: &str = r#"{
  "classes": [
    {
      "name": "Object",
      "methods": [
        { "name": "get_class", "hash": 201670096, "return": "String" },
        { "name": "get_instance_id", "hash": 3905245786, "return": "int" },
        { "name": "connect", "hash": 1518946055,
          "arguments": ["String", "Callable", "int"], "return": "int" },
        { "name": "disconnect", "hash": 1874754934, "arguments": ["String", "Callable"] },
        { "name": "is_connected", "hash": 768136979,
          "arguments": ["String", "Callable"], "return": "bool" },
        { "name": "set", "hash": 3776071444, "arguments": ["String", "Variant"] },
        { "name": "get", "hash": 2760726917, "arguments": ["String"], "return": "Variant" }
      ]
    },
    {
      "name": "RefCounted",
      "inherits": "Object",
      "methods": [
        { "name": "reference", "hash": 2240911060, "return": "bool" },
        { "name": "unreference", "hash": 2240911060, "return": "bool" },
        { "name": "get_reference_count", "hash": 3905245786, "return": "int" }
      ]
    },
    {
      "name": "Node",
      "inherits": "Object",
      "signals": [
        { "name": "ready" },
        { "name": "renamed" },
        { "name": "message_received", "arguments": ["String", "int"] }
      ],
      "methods": [
        { "name": "get_name", "hash": 2002593661, "return": "String" },
        { "name": "set_name", "hash": 3304788590, "arguments": ["String"] },
        { "name": "add_child", "hash": 3863233950, "arguments": ["Object"] },
        { "name": "get_child_count", "hash": 894402480, "return": "int" },
        { "name": "get_child", "hash": 541253412, "arguments": ["int"],
          "return": "Object", "return_class": "Node", "return_ownership": "lifetime_bound" },
        { "name": "get_parent", "hash": 3160264692,
          "return": "Object", "return_class": "Node", "return_ownership": "borrowed" }
      ]
    },
    {
      "name": "Timer",
      "inherits": "Node",
      "signals": [ { "name": "timeout" } ],
      "methods": [
        { "name": "set_wait_time", "hash": 373806689, "arguments": ["float"] },
        { "name": "get_wait_time", "hash": 1740695150, "return": "float" },
        { "name": "set_one_shot", "hash": 2586408642, "arguments": ["bool"] },
        { "name": "is_one_shot", "hash": 36873697, "return": "bool" },
        { "name": "start", "hash": 1392008558, "arguments": ["float"] },
        { "name": "stop", "hash": 3218959716 },
        { "name": "is_stopped", "hash": 36873697, "return": "bool" },
        { "name": "get_time_left", "hash": 1740695150, "return": "float" }
      ]
    },
    {
      "name": "Image",
      "inherits": "RefCounted",
      "methods": [
        { "name": "create", "hash": 986942177, "is_static": true,
          "arguments": ["int", "int", "bool", "int"],
          "return": "Object", "return_class": "Image", "return_ownership": "owned" },
        { "name": "get_width", "hash": 3905245786, "return": "int" },
        { "name": "get_height", "hash": 3905245786, "return": "int" },
        { "name": "get_size", "hash": 3690982128, "return": "Vector2i" },
        { "name": "get_format", "hash": 3847873762, "return": "int" },
        { "name": "fill", "hash": 2920490490, "arguments": ["Color"] },
        { "name": "fill_rect", "hash": 514693913, "arguments": ["Rect2", "Color"] },
        { "name": "get_pixel", "hash": 2165839948, "arguments": ["int", "int"], "return": "Color" },
        { "name": "set_pixel", "hash": 3733378741, "arguments": ["int", "int", "Color"] },
        { "name": "save_png", "hash": 2113323047, "arguments": ["String"], "return": "int" }
      ]
    },
    {
      "name": "Probe",
      "inherits": "Object",
      "is_instantiable": false,
      "methods": [
        { "name": "echo_bool", "is_static": true, "arguments": ["bool"], "return": "bool" },
        { "name": "echo_int32", "is_static": true, "arguments": ["int32"], "return": "int32" },
        { "name": "echo_int", "is_static": true, "arguments": ["int"], "return": "int" },
        { "name": "echo_float32", "is_static": true, "arguments": ["float32"], "return": "float32" },
        { "name": "echo_float", "is_static": true, "arguments": ["float"], "return": "float" },
        { "name": "echo_vector2", "is_static": true, "arguments": ["Vector2"], "return": "Vector2" },
        { "name": "echo_vector2i", "is_static": true, "arguments": ["Vector2i"], "return": "Vector2i" },
        { "name": "echo_vector3", "is_static": true, "arguments": ["Vector3"], "return": "Vector3" },
        { "name": "echo_rect2", "is_static": true, "arguments": ["Rect2"], "return": "Rect2" },
        { "name": "echo_color", "is_static": true, "arguments": ["Color"], "return": "Color" },
        { "name": "echo_transform2d", "is_static": true,
          "arguments": ["Transform2D"], "return": "Transform2D" },
        { "name": "echo_string", "is_static": true, "arguments": ["String"], "return": "String" },
        { "name": "echo_variant", "is_static": true, "arguments": ["Variant"], "return": "Variant" },
        { "name": "layout", "is_static": true, "arguments": ["bool", "int", "Rect2"] }
      ]
    }
  ]
}"#;

/// The parsed [`CLASSDB_JSON`].
pub fn classdb() -> ClassDb {
    ClassDb::from_json(CLASSDB_JSON).expect("mock introspection table is valid")
}

/// The process-wide runtime, initialized against the mock on first use.
pub fn runtime() -> &'static Runtime {
    if let Ok(rt) = classbind_core::runtime::get() {
        return rt;
    }
    match classbind_core::runtime::initialize(&interface(), classdb(), BindConfig::default()) {
        Ok(rt) => {
            debug!("mock runtime initialized");
            rt
        }
        Err(BindError::AlreadyInitialized) => {
            classbind_core::runtime::get().expect("runtime published by another thread")
        }
        Err(err) => panic!("mock runtime failed to initialize: {err}"),
    }
}

/// A private runtime over the mock with its own configuration.
///
/// Leaked so handles can borrow it for `'static`; meant for tests only.
pub fn runtime_with(config: BindConfig) -> &'static Runtime {
    let runtime = Runtime::new(&interface(), classdb(), config)
        .unwrap_or_else(|err| panic!("mock runtime failed to initialize: {err}"));
    Box::leak(Box::new(runtime))
}

/// Lifecycle counters of the object behind `object`.
pub fn stats(object: ObjectPtr) -> ObjectStats {
    let id = engine::id_of(object);
    engine::engine().stats.get(&id).copied().unwrap_or_default()
}

pub fn is_alive(object: ObjectPtr) -> bool {
    let id = engine::id_of(object);
    engine::engine().objects.contains_key(&id)
}

/// Current engine-side reference count, or `None` once destroyed.
pub fn refcount(object: ObjectPtr) -> Option<i64> {
    let id = engine::id_of(object);
    engine::engine().objects.get(&id).map(|o| o.refcount)
}

/// Number of calls made on objects that were already destroyed.
pub fn use_after_free_count() -> usize {
    engine::engine().use_after_free
}

/// Messages passed to the engine's error printer.
pub fn reported_errors() -> Vec<String> {
    engine::engine().errors.clone()
}

/// Where `Image.save_png` last wrote this image.
pub fn saved_path(image: ObjectPtr) -> Option<String> {
    let id = engine::id_of(image);
    engine::engine()
        .objects
        .get(&id)
        .and_then(|o| o.image.saved_to.clone())
}

/// Emits `signal` on `object`; returns how many callables ran.
pub fn emit_signal(object: ObjectPtr, signal: &str) -> usize {
    classes::emit(engine::id_of(object), signal, &[])
}

/// Emits `signal` on `object` with `args`, which stay owned by the caller.
pub fn emit_signal_with(object: ObjectPtr, signal: &str, args: &[Variant]) -> usize {
    let args = args.iter().map(Variant::as_ptr).collect::<Vec<_>>();
    classes::emit(engine::id_of(object), signal, &args)
}

/// Calls `callable` the way the engine would and returns its result, nil
/// when it returned nothing.
pub fn call_callable(rt: &'static Runtime, callable: &Callable, args: &[Variant]) -> Variant {
    let id = callable.as_raw().opaque[0] as u64;
    let entry = engine::engine().callables.get(&id).copied();
    let mut ret = VariantRaw::zeroed();
    if let Some(engine::CallableEntry { userdata, call: Some(call), .. }) = entry {
        let args = args.iter().map(Variant::as_ptr).collect::<Vec<_>>();
        unsafe {
            call(
                userdata as *mut std::ffi::c_void,
                args.as_ptr().cast(),
                args.len() as i64,
                std::ptr::addr_of_mut!(ret).cast(),
            )
        };
    }
    unsafe { Variant::from_raw(rt.api(), ret) }
}

/// Advances a running timer by `seconds`, emitting `timeout` when it
/// expires. Repeating timers restart; one-shot timers stop.
pub fn advance_timer(timer: ObjectPtr, seconds: f64) -> usize {
    let id = engine::id_of(timer);
    let fired = {
        let mut engine = engine::engine();
        let Some(object) = engine.object(id) else {
            return 0;
        };
        let state = &mut object.timer;
        if !state.running {
            return 0;
        }
        state.time_left -= seconds;
        if state.time_left > 0.0 {
            false
        } else {
            if state.one_shot {
                state.running = false;
                state.time_left = 0.0;
            } else {
                state.time_left = state.wait_time;
            }
            true
        }
    };
    if fired { classes::emit(id, "timeout", &[]) } else { 0 }
}

/// Byte offsets observed by the last `Probe.layout` call on this thread.
pub fn last_layout() -> Option<[usize; 3]> {
    classes::last_layout()
}
