//! Object handles and the ownership discipline attached to them.
//!
//! Every engine object that crosses into the host is wrapped in an
//! [`ObjectHandle`] carrying an [`OwnershipTag`]. The tag is fixed when the
//! pointer arrives, from the returning method's ownership contract, and is
//! consulted exactly once when the handle is dropped:
//!
//! | Tag               | Ref-counted drop           | Manual drop      |
//! |-------------------|----------------------------|------------------|
//! | `Owned`           | one `unreference` (+ free) | one destroy      |
//! | `Borrowed`        | nothing                    | nothing          |
//! | `LifetimeBoundTo` | nothing                    | nothing          |
//!
//! A handle passed into a call that takes ownership is consumed with
//! [`ObjectHandle::end`] and never releases anything.

use crate::error::{BindError, BindResult};
use crate::introspection::{OBJECT_CLASS, ReturnOwnership};
use crate::method_table::MethodBind;
use crate::runtime::Runtime;
use classbind_sys::ObjectPtr;
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use tracing::{debug, trace, warn};

/// The engine's stable identity for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the engine manages an object's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryModel {
    /// Freed by the engine once its reference count drops to zero.
    RefCounted,
    /// Freed only by an explicit destroy call.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipTag {
    /// The host holds a reference (or sole ownership) and releases it on drop.
    Owned,
    /// The engine owns the object; the host only observes it.
    Borrowed,
    /// Valid only while the object with this id is alive.
    LifetimeBoundTo(InstanceId),
}

/// A raw engine object plus the knowledge of who releases it.
///
/// Not `Send`: whether an engine object may be touched from another thread
/// is a property of its class, so wrappers decide that, not the handle.
pub struct ObjectHandle {
    raw: NonNull<c_void>,
    instance_id: InstanceId,
    model: MemoryModel,
    tag: OwnershipTag,
    rt: &'static Runtime,
    _thread_bound: PhantomData<*const ()>,
}

impl ObjectHandle {
    fn wrap(rt: &'static Runtime, raw: ObjectPtr, model: MemoryModel, tag: OwnershipTag) -> BindResult<Self> {
        let raw = NonNull::new(raw).ok_or(BindError::NullPointer)?;
        let instance_id = InstanceId(unsafe { rt.api().instance_id(raw.as_ptr()) });
        Ok(ObjectHandle {
            raw,
            instance_id,
            model,
            tag,
            rt,
            _thread_bound: PhantomData,
        })
    }

    /// Classifies a pointer just returned by `bind`, using the method's
    /// ownership contract.
    ///
    /// # Arguments
    /// * `rt` - The runtime the bind came from.
    /// * `bind` - The method that returned `raw`.
    /// * `raw` - The returned pointer; null yields `None`.
    /// * `receiver` - The object the method ran on, if any. A lifetime-bound
    ///   result of a static method is treated as borrowed.
    ///
    /// # Returns
    /// `MissingOwnershipContract` if the method declares no contract.
    pub fn acquire(
        rt: &'static Runtime,
        bind: &MethodBind,
        raw: ObjectPtr,
        receiver: Option<&ObjectHandle>,
    ) -> BindResult<Option<ObjectHandle>> {
        if raw.is_null() {
            return Ok(None);
        }
        let signature = bind.signature();
        let model = match signature.return_class.as_deref() {
            Some(class) if class != OBJECT_CLASS => rt.memory_model(class)?,
            _ => rt.memory_model_of(raw)?,
        };

        let handle = match (signature.return_ownership, receiver) {
            (ReturnOwnership::Owned, _) => Self::acquire_owned(rt, raw, model)?,
            (ReturnOwnership::Borrowed, _) | (ReturnOwnership::LifetimeBound, None) => {
                Self::acquire_borrowed(rt, raw, model)?
            }
            (ReturnOwnership::LifetimeBound, Some(parent)) => {
                Self::acquire_bound(rt, raw, model, parent)?
            }
            (ReturnOwnership::None, _) => {
                return Err(BindError::MissingOwnershipContract {
                    class: bind.key().class.clone(),
                    method: bind.key().method.clone(),
                });
            }
        };
        Ok(Some(handle))
    }

    /// Takes ownership of `raw`. For ref-counted objects the reference
    /// already transferred by the engine becomes the handle's reference.
    pub fn acquire_owned(rt: &'static Runtime, raw: ObjectPtr, model: MemoryModel) -> BindResult<Self> {
        let handle = Self::wrap(rt, raw, model, OwnershipTag::Owned)?;
        trace!(id = %handle.instance_id, ?model, "acquired owned handle");
        Ok(handle)
    }

    /// Observes `raw` without taking ownership.
    pub fn acquire_borrowed(rt: &'static Runtime, raw: ObjectPtr, model: MemoryModel) -> BindResult<Self> {
        Self::wrap(rt, raw, model, OwnershipTag::Borrowed)
    }

    /// Observes `raw` for as long as `parent` is alive.
    pub fn acquire_bound(
        rt: &'static Runtime,
        raw: ObjectPtr,
        model: MemoryModel,
        parent: &ObjectHandle,
    ) -> BindResult<Self> {
        Self::wrap(rt, raw, model, OwnershipTag::LifetimeBoundTo(parent.instance_id))
    }

    /// Creates a new instance of `class` through the engine's constructor.
    ///
    /// Ref-counted objects come out of the constructor without references;
    /// the initial one is taken here and owned by the returned handle. If
    /// the engine refuses it, the object is destroyed directly.
    pub fn construct(rt: &'static Runtime, class: &str) -> BindResult<Self> {
        let meta = rt.class_meta(class)?;
        if !meta.instantiable {
            return Err(BindError::ConstructFailed(class.to_string()));
        }
        let raw = rt.api().construct_object(class)?;
        if raw.is_null() {
            return Err(BindError::ConstructFailed(class.to_string()));
        }
        if meta.model == MemoryModel::RefCounted {
            match rt.reference(raw) {
                Ok(true) => {}
                outcome => {
                    unsafe { rt.api().destroy_object(raw) };
                    warn!(%class, "initial reference refused, object destroyed");
                    outcome?;
                    return Err(BindError::ConstructFailed(class.to_string()));
                }
            }
        }
        let handle = Self::wrap(rt, raw, meta.model, OwnershipTag::Owned)?;
        debug!(%class, id = %handle.instance_id, "constructed object");
        Ok(handle)
    }

    /// The raw pointer, for passing as a call argument. Ownership is
    /// unchanged.
    pub fn get(&self) -> ObjectPtr {
        self.raw.as_ptr()
    }

    /// Like [`get`](Self::get), but first verifies that a non-owned
    /// object is still alive when instance-id checks are enabled.
    pub fn checked(&self) -> BindResult<ObjectPtr> {
        if self.tag != OwnershipTag::Owned && self.rt.config().check_instance_ids {
            if let OwnershipTag::LifetimeBoundTo(parent) = self.tag
                && self.rt.api().instance_from_id(parent.0).is_null()
            {
                return Err(BindError::DeadInstance(parent));
            }
            if !self.is_alive() {
                return Err(BindError::DeadInstance(self.instance_id));
            }
        }
        Ok(self.get())
    }

    /// Hands ownership to the engine. Nothing is released, now or later.
    pub fn end(self) -> ObjectPtr {
        let raw = self.get();
        trace!(id = %self.instance_id, tag = ?self.tag, "ownership transferred to engine");
        std::mem::forget(self);
        raw
    }

    /// A second owned handle to the same ref-counted object, backed by one
    /// new reference. Manually managed objects cannot be co-owned, so they
    /// yield a borrowed view instead.
    pub fn share(&self) -> BindResult<ObjectHandle> {
        match self.model {
            MemoryModel::RefCounted => {
                let raw = self.checked()?;
                self.rt.reference(raw)?;
                trace!(id = %self.instance_id, "shared reference taken");
                Ok(self.with_tag(OwnershipTag::Owned))
            }
            MemoryModel::Manual => Ok(self.view()),
        }
    }

    /// A borrowed handle to the same object. Releases nothing when dropped.
    pub fn view(&self) -> ObjectHandle {
        self.with_tag(OwnershipTag::Borrowed)
    }

    fn with_tag(&self, tag: OwnershipTag) -> ObjectHandle {
        ObjectHandle {
            raw: self.raw,
            instance_id: self.instance_id,
            model: self.model,
            tag,
            rt: self.rt,
            _thread_bound: PhantomData,
        }
    }

    /// True while the engine still maps this handle's instance id to it.
    pub fn is_alive(&self) -> bool {
        self.rt.api().instance_from_id(self.instance_id.0) == self.get()
    }

    /// Whether the object's dynamic class is `class` or derives from it.
    pub fn is_class(&self, class: &str) -> BindResult<bool> {
        let actual = self.rt.class_name_of(self.checked()?)?;
        Ok(self.rt.classdb().inherits(&actual, class))
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn model(&self) -> MemoryModel {
        self.model
    }

    pub fn tag(&self) -> OwnershipTag {
        self.tag
    }

    pub fn runtime(&self) -> &'static Runtime {
        self.rt
    }

    fn release(&self) -> BindResult<()> {
        let raw = self.get();
        match self.model {
            MemoryModel::RefCounted => {
                if self.rt.unreference(raw)? {
                    unsafe { self.rt.api().destroy_object(raw) };
                    debug!(id = %self.instance_id, "last reference released, object destroyed");
                } else {
                    trace!(id = %self.instance_id, "reference released");
                }
            }
            MemoryModel::Manual => {
                unsafe { self.rt.api().destroy_object(raw) };
                debug!(id = %self.instance_id, "object destroyed");
            }
        }
        Ok(())
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        if self.tag != OwnershipTag::Owned {
            return;
        }
        if let Err(err) = self.release() {
            warn!(id = %self.instance_id, error = %err, "failed to release engine object");
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("raw", &self.raw)
            .field("instance_id", &self.instance_id)
            .field("model", &self.model)
            .field("tag", &self.tag)
            .finish()
    }
}

/// A view of `T` that cannot outlive the parent it was obtained from.
///
/// Wrappers return this for lifetime-bound results so the borrow checker
/// rejects keeping the child after the parent is gone.
pub struct Bound<'p, T> {
    value: T,
    _parent: PhantomData<&'p ()>,
}

impl<'p, T> Bound<'p, T> {
    pub fn new<P: ?Sized>(value: T, _parent: &'p P) -> Self {
        Bound {
            value,
            _parent: PhantomData,
        }
    }
}

impl<T> Deref for Bound<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Bound<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Bound").field(&self.value).finish()
    }
}
