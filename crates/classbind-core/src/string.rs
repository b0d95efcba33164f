//! Engine strings owned by the host.
//!
//! The engine allocates string storage; the host copies text in and out as
//! UTF-8 and destroys what it owns when the wrapper is dropped.

use crate::error::BindResult;
use crate::interface::EngineApi;
use classbind_sys::StringRaw;
use std::fmt;

/// An engine-side string owned by the host.
///
/// Passed to methods with [`EngineString::as_raw`], which leaves ownership
/// here; the engine copies what it keeps.
pub struct EngineString {
    raw: StringRaw,
    api: &'static EngineApi,
}

impl EngineString {
    pub fn new(api: &'static EngineApi, text: &str) -> Self {
        let mut raw = StringRaw::zeroed();
        unsafe {
            (api.string_new_with_utf8_chars_and_len)(&mut raw, text.as_ptr().cast(), text.len() as i64)
        };
        EngineString { raw, api }
    }

    /// Takes ownership of a string written by the engine into a return slot.
    ///
    /// # Safety
    /// `raw` must be a string the caller owns and nothing else will destroy.
    pub unsafe fn from_raw(api: &'static EngineApi, raw: StringRaw) -> Self {
        EngineString { raw, api }
    }

    pub fn as_raw(&self) -> StringRaw {
        self.raw
    }

    /// Copies the contents out as UTF-8.
    pub fn to_rust_string(&self) -> BindResult<String> {
        let len = unsafe { (self.api.string_to_utf8_chars)(&self.raw, std::ptr::null_mut(), 0) };
        let mut buffer = vec![0u8; len.max(0) as usize];
        unsafe {
            (self.api.string_to_utf8_chars)(&self.raw, buffer.as_mut_ptr().cast(), buffer.len() as i64)
        };
        Ok(String::from_utf8(buffer)?)
    }
}

impl Drop for EngineString {
    fn drop(&mut self) {
        unsafe { (self.api.string_destroy)(&mut self.raw) };
    }
}

impl fmt::Debug for EngineString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rust_string() {
            Ok(text) => f.debug_tuple("EngineString").field(&text).finish(),
            Err(_) => f.debug_tuple("EngineString").field(&self.raw).finish(),
        }
    }
}
