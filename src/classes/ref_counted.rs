use super::Object;
use classbind_core::{BindResult, EngineClass, Inherits, engine_class};

engine_class! {
    /// Base of every reference-counted class.
    ///
    /// Owned wrappers hold exactly one engine reference, released when the
    /// wrapper is dropped.
    pub struct RefCounted: "RefCounted" => Object;
}

pub mod raw {
    use super::RefCounted;
    use classbind_core::{BindResult, EngineClass, Frame};

    pub fn get_reference_count(this: &RefCounted) -> BindResult<i64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<i64>()?;
        handle
            .runtime()
            .bind("RefCounted", "get_reference_count")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }
}

impl RefCounted {
    pub fn reference_count(&self) -> BindResult<usize> {
        Ok(raw::get_reference_count(self)?.max(0) as usize)
    }

    /// Another owned wrapper for the same object, holding its own reference.
    pub fn share(&self) -> BindResult<RefCounted> {
        Ok(RefCounted(self.handle().share()?))
    }
}

/// Sharing for every class derived from [`RefCounted`].
pub trait Shared: EngineClass + Inherits<RefCounted> {
    /// Another owned wrapper for the same object, holding its own reference.
    fn share(&self) -> BindResult<Self> {
        let handle = self.handle().share()?;
        Ok(unsafe { Self::from_handle(handle) })
    }
}

impl<T: EngineClass + Inherits<RefCounted>> Shared for T {}
