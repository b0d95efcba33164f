//! The typed wrapper pattern.
//!
//! Each engine class is a `#[repr(transparent)]` newtype over one
//! [`ObjectHandle`], declared with [`engine_class!`](crate::engine_class).
//! Wrappers dereference to their parent class, so inherited methods are
//! available without casts.

use crate::handle::ObjectHandle;
use classbind_sys::ObjectPtr;

/// A typed wrapper around an engine object.
///
/// # Safety
///
/// Implementors must be `#[repr(transparent)]` over [`ObjectHandle`] and
/// `CLASS_NAME` must be the engine name of the class they wrap.
pub unsafe trait EngineClass: Sized {
    const CLASS_NAME: &'static str;

    /// Wraps a handle without checking its class.
    ///
    /// # Safety
    /// The object behind `handle` must be an instance of `CLASS_NAME` or a
    /// class derived from it; methods are dispatched on that assumption.
    unsafe fn from_handle(handle: ObjectHandle) -> Self;

    fn handle(&self) -> &ObjectHandle;

    fn into_handle(self) -> ObjectHandle;

    fn as_ptr(&self) -> ObjectPtr {
        self.handle().get()
    }

    /// Wraps `handle` after asking the engine for its dynamic class.
    ///
    /// The handle is given back unchanged if the class does not match or
    /// cannot be determined.
    fn try_from_handle(handle: ObjectHandle) -> Result<Self, ObjectHandle> {
        match handle.is_class(Self::CLASS_NAME) {
            Ok(true) => Ok(unsafe { Self::from_handle(handle) }),
            _ => Err(handle),
        }
    }

    fn upcast<B: EngineClass>(self) -> B
    where
        Self: Inherits<B>,
    {
        unsafe { B::from_handle(self.into_handle()) }
    }

    fn upcast_ref<B: EngineClass>(&self) -> &B
    where
        Self: Inherits<B>,
    {
        // Both types are transparent over ObjectHandle.
        unsafe { &*(self as *const Self).cast::<B>() }
    }

    /// Tries to view this object as a derived class `D`.
    fn try_cast<D: EngineClass + Inherits<Self>>(self) -> Result<D, Self> {
        D::try_from_handle(self.into_handle()).map_err(|handle| unsafe { Self::from_handle(handle) })
    }
}

/// Marks `Self` as derived from `B`.
///
/// # Safety
/// Every instance of `Self`'s class must also be an instance of `B`'s.
pub unsafe trait Inherits<B: EngineClass>: EngineClass {}

/// Declares a wrapper class.
///
/// ```ignore
/// engine_class! {
///     /// A countdown timer node.
///     pub struct Timer: "Timer" => Node, inherits [Object];
/// }
/// ```
///
/// `=> Parent` adds `Deref<Target = Parent>` and `Inherits<Parent>`;
/// `inherits [..]` lists the remaining ancestors.
#[macro_export]
macro_rules! engine_class {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $class:literal
            $(=> $parent:ident)?
            $(, inherits [$($base:ident),* $(,)?])? ;
    ) => {
        $(#[$meta])*
        #[repr(transparent)]
        $vis struct $name($crate::ObjectHandle);

        unsafe impl $crate::EngineClass for $name {
            const CLASS_NAME: &'static str = $class;

            unsafe fn from_handle(handle: $crate::ObjectHandle) -> Self {
                $name(handle)
            }

            fn handle(&self) -> &$crate::ObjectHandle {
                &self.0
            }

            fn into_handle(self) -> $crate::ObjectHandle {
                self.0
            }
        }

        impl $name {
            /// Constructs a new engine instance owned by the host.
            pub fn new() -> $crate::BindResult<Self> {
                let rt = $crate::runtime::get()?;
                $crate::ObjectHandle::construct(rt, $class).map($name)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0).finish()
            }
        }

        $(
            unsafe impl $crate::Inherits<$parent> for $name {}

            impl ::std::ops::Deref for $name {
                type Target = $parent;

                fn deref(&self) -> &$parent {
                    <$name as $crate::EngineClass>::upcast_ref(self)
                }
            }
        )?

        $($(
            unsafe impl $crate::Inherits<$base> for $name {}
        )*)?
    };
}
