//! Process-wide binding state, initialized exactly once.
//!
//! [`initialize`] validates the engine interface, resolves the method table
//! and publishes the result. Everything afterwards reads it through
//! [`get`] without locking.

use crate::abi::AbiValue;
use crate::config::BindConfig;
use crate::error::{BindError, BindResult};
use crate::frame::{self, Frame};
use crate::handle::MemoryModel;
use crate::interface::EngineApi;
use crate::introspection::{ClassDb, OBJECT_CLASS, REF_COUNTED_CLASS};
use crate::method_table::{MethodBind, MethodKey, MethodTable};
use crate::string::EngineString;
use classbind_sys::{EngineInterface, ObjectPtr, StringRaw};
use rustc_hash::FxHashMap;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static INIT: Mutex<()> = Mutex::new(());

/// Initializes the process-wide runtime.
///
/// # Arguments
/// * `interface` - Function table received from the engine.
/// * `classdb` - Introspection table describing every bound class.
/// * `config` - Options fixed for the life of the process.
///
/// # Returns
/// The published runtime, `AlreadyInitialized` on a second successful
/// call, or the resolution error. A failed attempt publishes nothing and
/// may be retried.
pub fn initialize(
    interface: &EngineInterface,
    classdb: ClassDb,
    config: BindConfig,
) -> BindResult<&'static Runtime> {
    let _guard = INIT.lock()?;
    if RUNTIME.get().is_some() {
        return Err(BindError::AlreadyInitialized);
    }
    let runtime = Runtime::new(interface, classdb, config)?;
    frame::set_pool_limit(runtime.config.frame_pool_size);
    Ok(RUNTIME.get_or_init(|| runtime))
}

/// The runtime published by [`initialize`].
pub fn get() -> BindResult<&'static Runtime> {
    RUNTIME.get().ok_or(BindError::NotInitialized)
}

pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}

/// Per-class data derived from the introspection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMeta {
    pub model: MemoryModel,
    pub instantiable: bool,
}

/// Binds the ownership tracker and signal helpers need on every object.
#[derive(Debug)]
pub struct CoreBinds {
    pub reference: MethodBind,
    pub unreference: MethodBind,
    pub get_reference_count: MethodBind,
    pub connect: MethodBind,
    pub disconnect: MethodBind,
    pub get_class: MethodBind,
}

impl CoreBinds {
    fn resolve(methods: &MethodTable) -> BindResult<Self> {
        let core = |class: &str, method: &str| {
            methods
                .get(class, method)
                .cloned()
                .map_err(|_| BindError::MissingCoreBind(MethodKey::new(class, method)))
        };
        Ok(CoreBinds {
            reference: core(REF_COUNTED_CLASS, "reference")?,
            unreference: core(REF_COUNTED_CLASS, "unreference")?,
            get_reference_count: core(REF_COUNTED_CLASS, "get_reference_count")?,
            connect: core(OBJECT_CLASS, "connect")?,
            disconnect: core(OBJECT_CLASS, "disconnect")?,
            get_class: core(OBJECT_CLASS, "get_class")?,
        })
    }
}

/// Everything resolved at startup.
#[derive(Debug)]
pub struct Runtime {
    api: EngineApi,
    classdb: ClassDb,
    methods: MethodTable,
    classes: FxHashMap<String, ClassMeta>,
    core: CoreBinds,
    config: BindConfig,
}

impl Runtime {
    /// Builds a runtime without publishing it.
    ///
    /// [`initialize`] is the normal entry point; tests and embedders that
    /// manage their own lifetime can leak the result to get `&'static`.
    pub fn new(interface: &EngineInterface, classdb: ClassDb, config: BindConfig) -> BindResult<Self> {
        let api = EngineApi::from_raw(interface)?;
        classdb.validate()?;
        let methods = MethodTable::resolve(&api, &classdb, &config)?;
        let core = CoreBinds::resolve(&methods)?;

        let classes = classdb
            .classes()
            .filter_map(|class| {
                let model = classdb.memory_model(&class.name)?;
                Some((
                    class.name.clone(),
                    ClassMeta {
                        model,
                        instantiable: class.is_instantiable,
                    },
                ))
            })
            .collect::<FxHashMap<_, _>>();

        info!(
            classes = classes.len(),
            binds = methods.len(),
            engine = %format_args!("{}.{}", api.version_major, api.version_minor),
            "binding runtime initialized"
        );

        Ok(Runtime {
            api,
            classdb,
            methods,
            classes,
            core,
            config,
        })
    }

    pub fn api(&self) -> &EngineApi {
        &self.api
    }

    pub fn classdb(&self) -> &ClassDb {
        &self.classdb
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    pub fn core(&self) -> &CoreBinds {
        &self.core
    }

    pub fn bind(&self, class: &str, method: &str) -> BindResult<&MethodBind> {
        self.methods.get(class, method)
    }

    pub fn class_meta(&self, class: &str) -> BindResult<&ClassMeta> {
        self.classes
            .get(class)
            .ok_or_else(|| BindError::UnknownClass(class.to_string()))
    }

    pub fn memory_model(&self, class: &str) -> BindResult<MemoryModel> {
        Ok(self.class_meta(class)?.model)
    }

    /// Calls a core method with no arguments and a scalar return value.
    fn call_core<T: AbiValue>(&self, bind: &MethodBind, object: ObjectPtr) -> BindResult<T> {
        let mut frame = Frame::new();
        let ret = frame.ret::<T>()?;
        bind.ptrcall(object, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    /// `RefCounted.reference`; true if the count was incremented.
    pub fn reference(&self, object: ObjectPtr) -> BindResult<bool> {
        self.call_core(&self.core.reference, object)
    }

    /// `RefCounted.unreference`; true once the last reference is gone and
    /// the object must be destroyed.
    pub fn unreference(&self, object: ObjectPtr) -> BindResult<bool> {
        self.call_core(&self.core.unreference, object)
    }

    pub fn reference_count(&self, object: ObjectPtr) -> BindResult<i64> {
        self.call_core(&self.core.get_reference_count, object)
    }

    /// Dynamic class name of `object` as reported by the engine.
    pub fn class_name_of(&'static self, object: ObjectPtr) -> BindResult<String> {
        let raw: StringRaw = self.call_core(&self.core.get_class, object)?;
        let name = unsafe { EngineString::from_raw(&self.api, raw) };
        name.to_rust_string()
    }

    /// Memory model of the object's dynamic class.
    ///
    /// Classes the introspection table does not describe are treated as
    /// manually managed.
    pub fn memory_model_of(&'static self, object: ObjectPtr) -> BindResult<MemoryModel> {
        let class = self.class_name_of(object)?;
        let model = self.memory_model(&class).unwrap_or(MemoryModel::Manual);
        debug!(%class, ?model, "resolved dynamic memory model");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::{ClassInfo, MethodInfo};
    use crate::test_support;

    #[test]
    fn core_binds_are_required() {
        let db = ClassDb::new(vec![
            ClassInfo::new("Object").method(MethodInfo::new("get_class")),
        ]);
        let err = Runtime::new(&test_support::interface(), db, BindConfig::default()).unwrap_err();
        assert!(matches!(err, BindError::MissingCoreBind(_)));
    }

    #[test]
    fn class_metadata_follows_the_table() {
        let runtime =
            Runtime::new(&test_support::interface(), test_support::classdb(), BindConfig::default())
                .unwrap();
        assert_eq!(runtime.memory_model("Calc").unwrap(), MemoryModel::RefCounted);
        assert_eq!(runtime.memory_model("Object").unwrap(), MemoryModel::Manual);
        assert!(matches!(
            runtime.memory_model("Sprite2D"),
            Err(BindError::UnknownClass(_))
        ));
        assert_eq!(runtime.methods().len(), test_support::classdb().method_count());
    }

    #[test]
    fn second_initialization_is_rejected() {
        let first = initialize(
            &test_support::interface(),
            test_support::classdb(),
            BindConfig::default(),
        );
        assert!(first.is_ok());
        assert!(is_initialized());

        let second = initialize(
            &test_support::interface(),
            test_support::classdb(),
            BindConfig::default(),
        );
        assert!(matches!(second, Err(BindError::AlreadyInitialized)));
        assert!(std::ptr::eq(get().unwrap(), first.unwrap()));
    }
}
