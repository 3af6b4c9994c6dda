use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::ScopeError;
use crate::value::Value;

#[derive(Default)]
struct NamespaceInner {
    label: String,
    attrs: RefCell<IndexMap<String, Value>>,
}

/// The object that receives the bindings captured by a scoped block.
///
/// A `Namespace` is a cheap handle: clones refer to the same attribute
/// table. Attributes keep the order in which the block first bound them.
#[derive(Clone, Default)]
pub struct Namespace {
    inner: Rc<NamespaceInner>,
}

impl Namespace {
    pub fn new(label: impl Into<String>) -> Self {
        Namespace {
            inner: Rc::new(NamespaceInner {
                label: label.into(),
                attrs: RefCell::new(IndexMap::new()),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Read an attribute, sharing the bound value.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.attrs.borrow().get(name).cloned()
    }

    /// Like [`Namespace::get`], but a missing attribute is an error.
    pub fn attr(&self, name: &str) -> Result<Value, ScopeError> {
        self.get(name)
            .ok_or_else(|| ScopeError::NoSuchAttribute(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.attrs.borrow().contains_key(name)
    }

    /// Bind an attribute. Rebinding keeps the attribute's original position.
    pub fn set(&self, name: &str, value: Value) {
        self.inner.attrs.borrow_mut().insert(name.to_string(), value);
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.attrs.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .attrs
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.attrs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.attrs.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// Only names are printed: attributes may hold the namespace itself.
impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("label", &self.inner.label)
            .field("names", &self.names())
            .finish()
    }
}
