//! Typed wrappers for engine classes.
//!
//! Every class module has a `raw` submodule that marshals engine-typed
//! values straight into call frames, and friendly methods on the wrapper
//! that convert to and from Rust types and delegate to it.

pub mod image;
pub mod node;
pub mod object;
pub mod ref_counted;
pub mod timer;

pub use image::{Image, ImageFormat};
pub use node::Node;
pub use object::Object;
pub use ref_counted::{RefCounted, Shared};
pub use timer::Timer;
