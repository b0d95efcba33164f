//! Validated view of the engine's function table.

use crate::error::{BindError, BindResult};
use classbind_sys::*;
use std::ffi::CString;
use tracing::debug;

/// The engine interface with every entry checked for presence.
///
/// Built once from the raw [`EngineInterface`] handed over at load time;
/// afterwards each entry can be called without re-checking for null.
#[derive(Debug, Clone, Copy)]
pub struct EngineApi {
    pub version_major: u32,
    pub version_minor: u32,
    pub classdb_get_method_bind: ClassdbGetMethodBind,
    pub object_method_bind_ptrcall: ObjectMethodBindPtrcall,
    pub classdb_construct_object: ClassdbConstructObject,
    pub object_destroy: ObjectDestroy,
    pub object_get_instance_id: ObjectGetInstanceId,
    pub object_get_instance_from_id: ObjectGetInstanceFromId,
    pub string_new_with_utf8_chars_and_len: StringNewWithUtf8CharsAndLen,
    pub string_to_utf8_chars: StringToUtf8Chars,
    pub string_destroy: StringDestroy,
    pub callable_custom_create: CallableCustomCreate,
    pub callable_destroy: CallableDestroy,
    pub variant_new_copy: VariantNewCopy,
    pub variant_new_nil: VariantNewNil,
    pub variant_destroy: VariantDestroy,
    pub variant_get_type: VariantGetType,
    pub get_variant_from_type_constructor: GetVariantFromTypeConstructor,
    pub get_variant_to_type_constructor: GetVariantToTypeConstructor,
    pub print_error: PrintError,
}

macro_rules! require {
    ($raw:expr, $field:ident) => {
        $raw.$field
            .ok_or(BindError::MissingInterfaceFunction(stringify!($field)))?
    };
}

impl EngineApi {
    /// Checks that every function the binding layer calls is present.
    ///
    /// # Returns
    /// `MissingInterfaceFunction` naming the first absent entry.
    pub fn from_raw(raw: &EngineInterface) -> BindResult<Self> {
        let api = EngineApi {
            version_major: raw.version_major,
            version_minor: raw.version_minor,
            classdb_get_method_bind: require!(raw, classdb_get_method_bind),
            object_method_bind_ptrcall: require!(raw, object_method_bind_ptrcall),
            classdb_construct_object: require!(raw, classdb_construct_object),
            object_destroy: require!(raw, object_destroy),
            object_get_instance_id: require!(raw, object_get_instance_id),
            object_get_instance_from_id: require!(raw, object_get_instance_from_id),
            string_new_with_utf8_chars_and_len: require!(raw, string_new_with_utf8_chars_and_len),
            string_to_utf8_chars: require!(raw, string_to_utf8_chars),
            string_destroy: require!(raw, string_destroy),
            callable_custom_create: require!(raw, callable_custom_create),
            callable_destroy: require!(raw, callable_destroy),
            variant_new_copy: require!(raw, variant_new_copy),
            variant_new_nil: require!(raw, variant_new_nil),
            variant_destroy: require!(raw, variant_destroy),
            variant_get_type: require!(raw, variant_get_type),
            get_variant_from_type_constructor: require!(raw, get_variant_from_type_constructor),
            get_variant_to_type_constructor: require!(raw, get_variant_to_type_constructor),
            print_error: require!(raw, print_error),
        };
        debug!(
            major = api.version_major,
            minor = api.version_minor,
            "engine interface validated"
        );
        Ok(api)
    }

    /// Asks the engine for the bind of `class.method`. A null result means
    /// the engine does not know the method under that hash.
    pub fn method_bind(&self, class: &str, method: &str, hash: i64) -> BindResult<MethodBindPtr> {
        let class = CString::new(class)?;
        let method = CString::new(method)?;
        Ok(unsafe { (self.classdb_get_method_bind)(class.as_ptr(), method.as_ptr(), hash) })
    }

    pub fn construct_object(&self, class: &str) -> BindResult<ObjectPtr> {
        let class = CString::new(class)?;
        Ok(unsafe { (self.classdb_construct_object)(class.as_ptr()) })
    }

    /// # Safety
    /// `object` must be a live engine object that nothing else will destroy.
    pub unsafe fn destroy_object(&self, object: ObjectPtr) {
        unsafe { (self.object_destroy)(object) }
    }

    /// # Safety
    /// `object` must be a live engine object.
    pub unsafe fn instance_id(&self, object: ConstObjectPtr) -> InstanceIdRaw {
        unsafe { (self.object_get_instance_id)(object) }
    }

    /// Null when no live object has this id.
    pub fn instance_from_id(&self, id: InstanceIdRaw) -> ObjectPtr {
        unsafe { (self.object_get_instance_from_id)(id) }
    }

    /// Reports an error through the engine's own error channel.
    pub fn report_error(&self, message: &str, function: &str, file: &str, line: u32) {
        let (Ok(message), Ok(function), Ok(file)) =
            (CString::new(message), CString::new(function), CString::new(file))
        else {
            return;
        };
        unsafe {
            (self.print_error)(
                message.as_ptr(),
                function.as_ptr(),
                file.as_ptr(),
                line as i32,
                FALSE,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn missing_entries_are_named() {
        let mut raw = test_support::interface();
        raw.string_destroy = None;
        assert!(matches!(
            EngineApi::from_raw(&raw),
            Err(BindError::MissingInterfaceFunction("string_destroy"))
        ));
    }

    #[test]
    fn complete_table_validates() {
        let api = EngineApi::from_raw(&test_support::interface()).unwrap();
        assert_eq!(api.version_major, 4);
        assert!(!api.method_bind("Calc", "add", 0).unwrap().is_null());
    }

    #[test]
    fn interior_nul_is_a_conversion_error() {
        let api = EngineApi::from_raw(&test_support::interface()).unwrap();
        assert!(matches!(
            api.method_bind("Ca\0lc", "add", 0),
            Err(BindError::StringConversion(_))
        ));
    }
}
