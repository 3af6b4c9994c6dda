use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::namespace::Namespace;

/// A value bound to a name in a frame.
///
/// Cloning a `Value` shares the underlying object: a cloned list is the same
/// list, so in-place mutation is visible through every binding that holds it.
#[derive(Clone)]
pub enum Value {
    Unit,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    /// Shared, mutable list.
    List(Rc<RefCell<Vec<Value>>>),
    /// Handle to a namespace object produced by a scoped block.
    Namespace(Namespace),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Boolean(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Namespace(_) => "Namespace",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&Namespace> {
        match self {
            Value::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    /// Object identity. Scalars are compared by value, as if interned;
    /// lists and namespaces are the same object only if they share storage.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// A new list holding the items of both operands. Neither operand is modified.
    pub fn concat(&self, other: &Value) -> Option<Value> {
        let (a, b) = (self.as_list()?, other.as_list()?);
        let mut items = a.borrow().clone();
        items.extend(b.borrow().iter().cloned());
        Some(Value::list(items))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<Namespace> for Value {
    fn from(ns: Namespace) -> Self {
        Value::Namespace(ns)
    }
}

type ListPtr = *const RefCell<Vec<Value>>;

// Lists may contain themselves; `seen` holds the lists currently being
// walked so a cycle prints as `[...]`.
fn write_value(
    value: &Value,
    f: &mut fmt::Formatter<'_>,
    seen: &mut Vec<ListPtr>,
) -> fmt::Result {
    match value {
        Value::Unit => write!(f, "()"),
        Value::Boolean(b) => write!(f, "{}", b),
        Value::Number(n) => {
            if n.is_finite() && *n == n.floor() && n.abs() < 1e15 {
                write!(f, "{}", *n as i64)
            } else {
                write!(f, "{}", n)
            }
        }
        Value::String(s) => write!(f, "{}", s),
        Value::List(items) => {
            let ptr = Rc::as_ptr(items);
            if seen.contains(&ptr) {
                return write!(f, "[...]");
            }
            seen.push(ptr);
            write!(f, "[")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_value(item, f, seen)?;
            }
            seen.pop();
            write!(f, "]")
        }
        Value::Namespace(ns) => write!(f, "namespace({})", ns.names().join(", ")),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(self, f, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::Boolean(b) => write!(f, "Boolean({:?})", b),
            Value::Number(n) => write!(f, "Number({:?})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::List(_) => {
                write!(f, "List(")?;
                write_value(self, f, &mut Vec::new())?;
                write!(f, ")")
            }
            Value::Namespace(ns) => write!(f, "{:?}", ns),
        }
    }
}

// Pairs of lists already being compared count as equal, so cyclic lists
// compare without recursing forever.
fn eq_value(a: &Value, b: &Value, seen: &mut Vec<(ListPtr, ListPtr)>) -> bool {
    match (a, b) {
        (Value::Unit, Value::Unit) => true,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b, // NaN != NaN per IEEE 754
        (Value::String(a), Value::String(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let pair = (Rc::as_ptr(a), Rc::as_ptr(b));
            if seen.contains(&pair) {
                return true;
            }
            seen.push(pair);
            let (left, right) = (a.borrow(), b.borrow());
            let equal = left.len() == right.len()
                && left.iter().zip(right.iter()).all(|(l, r)| eq_value(l, r, seen));
            seen.pop();
            equal
        }
        (Value::Namespace(a), Value::Namespace(b)) => a.ptr_eq(b),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        eq_value(self, other, &mut Vec::new())
    }
}
