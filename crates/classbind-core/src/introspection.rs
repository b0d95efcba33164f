//! The engine's class database as seen by the binding layer.
//!
//! The introspection table lists every class, its parent, its methods with
//! their parameter and return ABI types, the ownership contract of object
//! return values, and its signals. It is either parsed from the JSON dump
//! the engine produces or assembled in code with the builder methods.

use crate::abi::AbiKind;
use crate::error::{BindError, BindResult};
use crate::handle::MemoryModel;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Root class of every engine object.
pub const OBJECT_CLASS: &str = "Object";
/// Classes inheriting this one are reference counted by the engine.
pub const REF_COUNTED_CLASS: &str = "RefCounted";

/// Ownership contract of an object returned by a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnOwnership {
    /// The method returns no object.
    #[default]
    None,
    /// Ownership moves to the host, which must release the object.
    Owned,
    /// The engine keeps ownership; the host may only observe the object
    /// while the engine keeps it alive.
    Borrowed,
    /// The object is valid only while the receiver is alive.
    LifetimeBound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    /// Compatibility hash the engine uses to pick among method versions.
    #[serde(default)]
    pub hash: i64,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub arguments: Vec<AbiKind>,
    #[serde(rename = "return", default)]
    pub return_type: AbiKind,
    /// Declared class of an object return value.
    #[serde(default)]
    pub return_class: Option<String>,
    #[serde(default)]
    pub return_ownership: ReturnOwnership,
}

impl MethodInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: 0,
            is_static: false,
            arguments: Vec::new(),
            return_type: AbiKind::Nil,
            return_class: None,
            return_ownership: ReturnOwnership::None,
        }
    }

    pub fn arg(mut self, kind: AbiKind) -> Self {
        self.arguments.push(kind);
        self
    }

    pub fn args(mut self, kinds: impl IntoIterator<Item = AbiKind>) -> Self {
        self.arguments.extend(kinds);
        self
    }

    pub fn returns(mut self, kind: AbiKind) -> Self {
        self.return_type = kind;
        self
    }

    /// Declares an object return value of `class` with the given contract.
    pub fn returns_object(mut self, class: impl Into<String>, ownership: ReturnOwnership) -> Self {
        self.return_type = AbiKind::Object;
        self.return_class = Some(class.into());
        self.return_ownership = ownership;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn with_hash(mut self, hash: i64) -> Self {
        self.hash = hash;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<AbiKind>,
}

impl SignalInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn arg(mut self, kind: AbiKind) -> Self {
        self.arguments.push(kind);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub inherits: Option<String>,
    #[serde(default = "default_instantiable")]
    pub is_instantiable: bool,
    #[serde(default)]
    pub methods: Vec<MethodInfo>,
    #[serde(default)]
    pub signals: Vec<SignalInfo>,
}

fn default_instantiable() -> bool {
    true
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherits: None,
            is_instantiable: true,
            methods: Vec::new(),
            signals: Vec::new(),
        }
    }

    pub fn inherits(mut self, parent: impl Into<String>) -> Self {
        self.inherits = Some(parent.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_instantiable = false;
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn signal(mut self, signal: SignalInfo) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn find_signal(&self, name: &str) -> Option<&SignalInfo> {
        self.signals.iter().find(|s| s.name == name)
    }
}

#[derive(Deserialize)]
struct ClassDbDocument {
    classes: Vec<ClassInfo>,
}

/// Indexed collection of [`ClassInfo`] entries.
#[derive(Debug, Clone, Default)]
pub struct ClassDb {
    classes: Vec<ClassInfo>,
    index: FxHashMap<String, usize>,
}

impl ClassDb {
    pub fn new(classes: Vec<ClassInfo>) -> Self {
        let mut db = ClassDb::default();
        for class in classes {
            db.insert(class);
        }
        db
    }

    /// Parses the JSON form of the introspection table.
    pub fn from_json(json: &str) -> BindResult<Self> {
        let document: ClassDbDocument = serde_json::from_str(json)?;
        Ok(Self::new(document.classes))
    }

    pub fn from_reader(reader: impl Read) -> BindResult<Self> {
        let document: ClassDbDocument = serde_json::from_reader(reader)?;
        Ok(Self::new(document.classes))
    }

    /// Adds a class, replacing any previous entry with the same name.
    pub fn insert(&mut self, class: ClassInfo) {
        match self.index.get(&class.name) {
            Some(&slot) => self.classes[slot] = class,
            None => {
                self.index.insert(class.name.clone(), self.classes.len());
                self.classes.push(class);
            }
        }
    }

    pub fn with_class(mut self, class: ClassInfo) -> Self {
        self.insert(class);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.index.get(name).map(|&slot| &self.classes[slot])
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.iter()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn method_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }

    /// Walks from `name` up to the root class, starting with `name` itself.
    ///
    /// Stops early at a parent missing from the table; a cyclic table is
    /// cut off after visiting every class once.
    pub fn ancestors<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ClassInfo> + use<'a> {
        let mut current = self.class(name);
        let mut remaining = self.classes.len();
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let class = current?;
            current = class.inherits.as_deref().and_then(|parent| self.class(parent));
            Some(class)
        })
    }

    /// Whether `class` is `base` or derives from it.
    pub fn inherits(&self, class: &str, base: &str) -> bool {
        self.ancestors(class).any(|c| c.name == base)
    }

    pub fn memory_model(&self, class: &str) -> Option<MemoryModel> {
        self.class(class)?;
        if self.inherits(class, REF_COUNTED_CLASS) {
            Some(MemoryModel::RefCounted)
        } else {
            Some(MemoryModel::Manual)
        }
    }

    /// Looks up a signal declared on `class` or any of its ancestors.
    pub fn find_signal(&self, class: &str, signal: &str) -> Option<&SignalInfo> {
        self.ancestors(class).find_map(|c| c.find_signal(signal))
    }

    /// Checks the table for problems that would otherwise surface per call.
    ///
    /// Every parent must be described, method names must be unique within
    /// a class, and every method returning an object must carry an
    /// ownership contract naming a described class.
    pub fn validate(&self) -> BindResult<()> {
        for class in &self.classes {
            if let Some(parent) = &class.inherits
                && self.class(parent).is_none()
            {
                return Err(BindError::UnknownClass(parent.clone()));
            }

            let mut seen = FxHashSet::default();
            for method in &class.methods {
                if !seen.insert(method.name.as_str()) {
                    return Err(BindError::DuplicateMethod {
                        class: class.name.clone(),
                        method: method.name.clone(),
                    });
                }
                if method.return_type != AbiKind::Object {
                    continue;
                }
                if method.return_ownership == ReturnOwnership::None {
                    return Err(BindError::MissingOwnershipContract {
                        class: class.name.clone(),
                        method: method.name.clone(),
                    });
                }
                if let Some(return_class) = &method.return_class
                    && self.class(return_class).is_none()
                {
                    return Err(BindError::UnknownClass(return_class.clone()));
                }
            }
        }
        Ok(())
    }
}
