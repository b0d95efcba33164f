//! Resolved method binds, keyed by class and method name.
//!
//! The table is built once from the introspection table and never mutated
//! afterwards, so lookups need no locking.

use crate::abi::AbiKind;
use crate::config::BindConfig;
use crate::error::{BindError, BindResult, FrameError};
use crate::frame::Frame;
use crate::interface::EngineApi;
use crate::introspection::{ClassDb, MethodInfo, ReturnOwnership};
use classbind_sys::{MethodBindPtr, ObjectMethodBindPtrcall, ObjectPtr};
use rustc_hash::FxHashMap;
use std::fmt;
use tracing::{error, warn};
use xxhash_rust::xxh64::xxh64;

const CLASS_SEED: u64 = 0x2fac10b63a6cc57c;
const METHOD_SEED: u64 = 0x7d3c8b4a92e15f6d;

/// Deterministic hash of a (class, method) pair.
///
/// Lets lookups by `&str` hit the map without building an owned key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MethodHash(pub u64);

impl MethodHash {
    pub fn of(class: &str, method: &str) -> Self {
        let class_hash = xxh64(class.as_bytes(), CLASS_SEED);
        MethodHash(xxh64(method.as_bytes(), class_hash ^ METHOD_SEED))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub class: String,
    pub method: String,
}

impl MethodKey {
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }

    pub fn hash(&self) -> MethodHash {
        MethodHash::of(&self.class, &self.method)
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.method)
    }
}

/// Parameter and return layout of a method, plus the ownership contract
/// of its object return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub arguments: Vec<AbiKind>,
    pub return_type: AbiKind,
    pub return_class: Option<String>,
    pub return_ownership: ReturnOwnership,
    pub is_static: bool,
}

impl From<&MethodInfo> for MethodSignature {
    fn from(info: &MethodInfo) -> Self {
        Self {
            arguments: info.arguments.clone(),
            return_type: info.return_type,
            return_class: info.return_class.clone(),
            return_ownership: info.return_ownership,
            is_static: info.is_static,
        }
    }
}

/// A resolved native method.
#[derive(Debug, Clone)]
pub struct MethodBind {
    raw: MethodBindPtr,
    key: MethodKey,
    signature: MethodSignature,
    call: ObjectMethodBindPtrcall,
    verify: bool,
}

// SAFETY: the bind pointer is an immutable engine-side descriptor valid for
// the lifetime of the process.
unsafe impl Send for MethodBind {}
unsafe impl Sync for MethodBind {}

impl MethodBind {
    pub fn raw(&self) -> MethodBindPtr {
        self.raw
    }

    pub fn key(&self) -> &MethodKey {
        &self.key
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// Whether the caller receives storage it must release, so the return
    /// value cannot be discarded.
    pub fn returns_owned(&self) -> bool {
        let signature = &self.signature;
        signature.return_type.returns_owned_storage()
            || (signature.return_type == AbiKind::Object
                && signature.return_ownership == ReturnOwnership::Owned)
    }

    /// Compares the frame's argument kinds and reserved return kind with
    /// the signature.
    ///
    /// A frame without a reserved return slot is accepted when the return
    /// value is plain data; the value is written to the return region and
    /// discarded.
    pub fn verify(&self, frame: &Frame) -> Result<(), FrameError> {
        if frame.kinds() != self.signature.arguments.as_slice() {
            return Err(FrameError::SignatureMismatch {
                method: self.key.to_string(),
                expected: self.signature.arguments.clone(),
                found: frame.kinds().to_vec(),
            });
        }
        match frame.ret_kind() {
            Some(found) if found != self.signature.return_type => Err(FrameError::ReturnMismatch {
                method: self.key.to_string(),
                expected: self.signature.return_type,
                found,
            }),
            Some(_) => Ok(()),
            None if self.returns_owned() => Err(FrameError::ReturnNotReserved),
            None => Ok(()),
        }
    }

    /// Submits `frame` and invokes the method on `receiver`.
    ///
    /// # Arguments
    /// * `receiver` - The object the method runs on; null for static methods.
    /// * `frame` - Arguments in signature order, with the return slot reserved
    ///   if the caller wants the result.
    ///
    /// # Returns
    /// `Ok(())` once the native call has returned. Engine status codes are
    /// part of the return value, not of this result.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn ptrcall(&self, receiver: ObjectPtr, frame: &mut Frame) -> BindResult<()> {
        if self.verify {
            self.verify(frame)?;
        } else if frame.ret_kind().is_none() && self.returns_owned() {
            return Err(FrameError::ReturnNotReserved.into());
        }
        if receiver.is_null() && !self.signature.is_static {
            return Err(BindError::NullReceiver(self.key.clone()));
        }
        frame.submit()?;
        let ret = frame.ret_ptr();
        unsafe { (self.call)(self.raw, receiver, frame.args_ptr(), ret) };
        Ok(())
    }
}

/// Every method bind of the introspection table, resolved once.
#[derive(Debug, Default)]
pub struct MethodTable {
    binds: FxHashMap<MethodHash, MethodBind>,
}

impl MethodTable {
    /// Resolves every method of every class in `classdb`.
    ///
    /// All unresolved binds are collected and reported in one
    /// `MissingMethodBinds` error. Methods of classes listed in
    /// [`BindConfig::optional_classes`] are skipped instead.
    pub fn resolve(api: &EngineApi, classdb: &ClassDb, config: &BindConfig) -> BindResult<Self> {
        let mut binds: FxHashMap<MethodHash, MethodBind> = FxHashMap::default();
        binds.reserve(classdb.method_count());
        let mut missing = Vec::new();

        for class in classdb.classes() {
            let optional = config.is_optional(&class.name);
            for method in &class.methods {
                let key = MethodKey::new(&class.name, &method.name);
                let raw = api.method_bind(&class.name, &method.name, method.hash)?;
                if raw.is_null() {
                    if optional {
                        warn!(method = %key, "skipping unavailable method of optional class");
                    } else {
                        error!(method = %key, hash = method.hash, "engine has no bind for method");
                        missing.push(key);
                    }
                    continue;
                }

                let hash = key.hash();
                if let Some(existing) = binds.get(&hash) {
                    return Err(if existing.key == key {
                        BindError::DuplicateMethod {
                            class: key.class,
                            method: key.method,
                        }
                    } else {
                        BindError::MethodHashCollision(existing.key.clone(), key)
                    });
                }
                binds.insert(
                    hash,
                    MethodBind {
                        raw,
                        signature: MethodSignature::from(method),
                        key,
                        call: api.object_method_bind_ptrcall,
                        verify: config.verify_signatures,
                    },
                );
            }
        }

        if !missing.is_empty() {
            return Err(BindError::MissingMethodBinds(missing));
        }
        Ok(MethodTable { binds })
    }

    pub fn get(&self, class: &str, method: &str) -> BindResult<&MethodBind> {
        self.binds
            .get(&MethodHash::of(class, method))
            .filter(|bind| bind.key.class == class && bind.key.method == method)
            .ok_or_else(|| BindError::UnknownMethod {
                class: class.to_string(),
                method: method.to_string(),
            })
    }

    pub fn contains(&self, class: &str, method: &str) -> bool {
        self.get(class, method).is_ok()
    }

    pub fn len(&self) -> usize {
        self.binds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MethodBind> {
        self.binds.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::ClassInfo;
    use crate::test_support;
    use std::ptr;

    fn api() -> EngineApi {
        EngineApi::from_raw(&test_support::interface()).unwrap()
    }

    #[test]
    fn method_hash_depends_on_both_names() {
        assert_eq!(MethodHash::of("Node", "get_name"), MethodHash::of("Node", "get_name"));
        assert_ne!(MethodHash::of("Node", "get_name"), MethodHash::of("Timer", "get_name"));
        assert_ne!(MethodHash::of("ab", "c"), MethodHash::of("a", "bc"));
    }

    #[test]
    fn every_method_resolves_to_one_cached_bind() {
        let db = test_support::classdb();
        let table = MethodTable::resolve(&api(), &db, &BindConfig::default()).unwrap();
        assert_eq!(table.len(), db.method_count());

        let first = table.get("Calc", "add").unwrap();
        let second = table.get("Calc", "add").unwrap();
        assert!(ptr::eq(first, second));
        assert!(!first.raw().is_null());
    }

    #[test]
    fn missing_binds_are_reported_together() {
        let db = test_support::classdb().with_class(
            ClassInfo::new("Legacy")
                .inherits("Object")
                .method(MethodInfo::new("missing_a"))
                .method(MethodInfo::new("missing_b")),
        );
        let err = MethodTable::resolve(&api(), &db, &BindConfig::default()).unwrap_err();
        match err {
            BindError::MissingMethodBinds(keys) => assert_eq!(
                keys,
                vec![MethodKey::new("Legacy", "missing_a"), MethodKey::new("Legacy", "missing_b")]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_methods_fail_resolution() {
        let db = test_support::classdb().with_class(
            ClassInfo::new("Legacy")
                .inherits("Object")
                .method(MethodInfo::new("tick"))
                .method(MethodInfo::new("tick")),
        );
        assert!(matches!(
            MethodTable::resolve(&api(), &db, &BindConfig::default()),
            Err(BindError::DuplicateMethod { class, method }) if class == "Legacy" && method == "tick"
        ));
    }

    #[test]
    fn optional_classes_are_skipped() {
        let db = test_support::classdb().with_class(
            ClassInfo::new("Legacy")
                .inherits("Object")
                .method(MethodInfo::new("missing_a")),
        );
        let config = BindConfig::default().with_optional_class("Legacy");
        let table = MethodTable::resolve(&api(), &db, &config).unwrap();
        assert!(!table.contains("Legacy", "missing_a"));
        assert!(table.contains("Calc", "add"));
    }

    #[test]
    fn ptrcall_runs_the_native_function() {
        let table =
            MethodTable::resolve(&api(), &test_support::classdb(), &BindConfig::default()).unwrap();
        let bind = table.get("Calc", "add").unwrap();

        let mut frame = Frame::new();
        frame.arg(40i64).unwrap();
        frame.arg(2i64).unwrap();
        let sum = frame.ret::<i64>().unwrap();
        bind.ptrcall(ptr::null_mut(), &mut frame).unwrap();
        assert_eq!(frame.get(sum).unwrap(), 42);
    }

    #[test]
    fn mismatched_frames_never_reach_the_engine() {
        let table =
            MethodTable::resolve(&api(), &test_support::classdb(), &BindConfig::default()).unwrap();
        let bind = table.get("Calc", "add").unwrap();

        let mut frame = Frame::new();
        frame.arg(40i64).unwrap();
        frame.arg(2.0f64).unwrap();
        let err = bind.ptrcall(ptr::null_mut(), &mut frame).unwrap_err();
        assert!(matches!(
            err,
            BindError::Frame(FrameError::SignatureMismatch { .. })
        ));
        assert!(!frame.is_submitted());

        let mut frame = Frame::new();
        frame.arg(1i64).unwrap();
        frame.arg(2i64).unwrap();
        frame.ret::<f64>().unwrap();
        assert!(matches!(
            bind.ptrcall(ptr::null_mut(), &mut frame),
            Err(BindError::Frame(FrameError::ReturnMismatch { .. }))
        ));
    }

    #[test]
    fn owned_returns_cannot_be_discarded() {
        let table =
            MethodTable::resolve(&api(), &test_support::classdb(), &BindConfig::default()).unwrap();
        let twin = table.get("Calc", "twin").unwrap();
        assert!(twin.returns_owned());

        let mut frame = Frame::new();
        assert!(matches!(
            twin.ptrcall(ptr::null_mut(), &mut frame),
            Err(BindError::Frame(FrameError::ReturnNotReserved))
        ));
        assert!(!frame.is_submitted());

        let get_class = table.get("Object", "get_class").unwrap();
        assert!(get_class.returns_owned());
        let add = table.get("Calc", "add").unwrap();
        assert!(!add.returns_owned());
    }

    #[test]
    fn owned_returns_are_checked_without_verification() {
        let config = BindConfig::default().with_verify_signatures(false);
        let table = MethodTable::resolve(&api(), &test_support::classdb(), &config).unwrap();
        let mut frame = Frame::new();
        assert!(matches!(
            table.get("Object", "get_class").unwrap().ptrcall(ptr::null_mut(), &mut frame),
            Err(BindError::Frame(FrameError::ReturnNotReserved))
        ));
    }

    #[test]
    fn instance_methods_need_a_receiver() {
        let table =
            MethodTable::resolve(&api(), &test_support::classdb(), &BindConfig::default()).unwrap();
        let bind = table.get("RefCounted", "reference").unwrap();
        let mut frame = Frame::new();
        assert!(matches!(
            bind.ptrcall(ptr::null_mut(), &mut frame),
            Err(BindError::NullReceiver(key)) if key == MethodKey::new("RefCounted", "reference")
        ));
    }

    #[test]
    fn unknown_methods_are_errors() {
        let table =
            MethodTable::resolve(&api(), &test_support::classdb(), &BindConfig::default()).unwrap();
        assert!(matches!(
            table.get("Calc", "divide"),
            Err(BindError::UnknownMethod { .. })
        ));
    }
}
