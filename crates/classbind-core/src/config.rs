use crate::error::BindResult;
use crate::frame::DEFAULT_POOL_SIZE;
use serde::{Deserialize, Serialize};

/// Runtime options fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Compare each frame against the method signature before calling.
    pub verify_signatures: bool,
    /// Check that non-owned handles still point at a live object before use.
    pub check_instance_ids: bool,
    /// Classes whose methods may be absent from the engine build.
    pub optional_classes: Vec<String>,
    /// Idle frame buffers kept per thread.
    pub frame_pool_size: usize,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            verify_signatures: true,
            check_instance_ids: true,
            optional_classes: Vec::new(),
            frame_pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl BindConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> BindResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_verify_signatures(mut self, enabled: bool) -> Self {
        self.verify_signatures = enabled;
        self
    }

    pub fn with_instance_id_checks(mut self, enabled: bool) -> Self {
        self.check_instance_ids = enabled;
        self
    }

    pub fn with_optional_class(mut self, class: impl Into<String>) -> Self {
        self.optional_classes.push(class.into());
        self
    }

    pub fn with_frame_pool_size(mut self, size: usize) -> Self {
        self.frame_pool_size = size;
        self
    }

    pub fn is_optional(&self, class: &str) -> bool {
        self.optional_classes.iter().any(|c| c == class)
    }
}
