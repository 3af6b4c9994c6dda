use indexmap::IndexMap;

use crate::error::ScopeError;
use crate::snapshot::Snapshot;
use crate::value::Value;

/// Stable identity of a frame for as long as it stays on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Top-level frame. Its bindings can be rewritten freely.
    Module,
    /// Function locals. Readable, but not rewritable after the fact.
    Function,
    /// Transparent block frame: lookups fall through to the enclosing frame.
    Block,
}

impl FrameKind {
    /// Whether bindings in a frame of this kind may be rewritten by a
    /// scoped block after its statements have run.
    pub fn supports_rewrite(self) -> bool {
        !matches!(self, FrameKind::Function)
    }
}

/// A single binding table on the frame stack.
#[derive(Debug)]
pub struct Frame {
    id: FrameId,
    kind: FrameKind,
    name: String,
    /// Bindings in the order they were first made.
    variables: IndexMap<String, Value>,
    /// Set while a scoped block is active on this frame.
    pub(crate) capture_active: bool,
}

impl Frame {
    fn new(id: FrameId, kind: FrameKind, name: String) -> Self {
        Frame {
            id,
            kind,
            name,
            variables: IndexMap::new(),
            capture_active: false,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub(crate) fn bindings(&self) -> &IndexMap<String, Value> {
        &self.variables
    }

    pub(crate) fn into_bindings(self) -> IndexMap<String, Value> {
        self.variables
    }

    pub(crate) fn insert(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Value> {
        self.variables.shift_remove(name)
    }

    /// Put names held in `snapshot` back in the snapshot's order. Names the
    /// snapshot does not know keep their relative order after them.
    pub(crate) fn reorder_like(&mut self, snapshot: &Snapshot) {
        let rank = |name: &str| snapshot.index_of(name).unwrap_or(usize::MAX);
        self.variables
            .sort_by(|a, _, b, _| rank(a.as_str()).cmp(&rank(b.as_str())));
    }
}

/// Result of looking up a variable in the environment.
pub enum VariableLookup<'a> {
    Found {
        value: &'a Value,
        /// Number of frames between the current frame and the one holding
        /// the binding (0 = current frame).
        depth: usize,
    },
    NotFound,
}

/// The stack of frames caller code runs against. The bottom frame is the
/// module frame and is never popped.
#[derive(Debug)]
pub struct Environment {
    frames: Vec<Frame>,
    next_id: u64,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            frames: vec![Frame::new(FrameId(0), FrameKind::Module, "<module>".into())],
            next_id: 1,
        }
    }

    pub fn push_frame(&mut self, kind: FrameKind, name: &str) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.frames.push(Frame::new(id, kind, name.to_string()));
        id
    }

    /// Pop the innermost frame. The module frame stays.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&self) -> &Frame {
        self.frames.last().expect("module frame is never popped")
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("module frame is never popped")
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.id == id)
    }

    pub(crate) fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.iter_mut().rev().find(|f| f.id == id)
    }

    /// Look up a variable with frame information.
    ///
    /// Search runs from the current frame outward. Block frames are
    /// transparent; a function frame is a boundary past which only the
    /// module frame is visible.
    pub fn get_info(&self, name: &str) -> VariableLookup<'_> {
        let last = self.frames.len() - 1;
        let mut idx = last;
        loop {
            let frame = &self.frames[idx];
            if let Some(value) = frame.get(name) {
                return VariableLookup::Found {
                    value,
                    depth: last - idx,
                };
            }
            if idx == 0 {
                return VariableLookup::NotFound;
            }
            idx = if frame.kind == FrameKind::Function { 0 } else { idx - 1 };
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.get_info(name) {
            VariableLookup::Found { value, .. } => Some(value),
            VariableLookup::NotFound => None,
        }
    }

    /// Like [`Environment::get`], but an unresolved name is an error.
    pub fn lookup(&self, name: &str) -> Result<&Value, ScopeError> {
        self.get(name)
            .ok_or_else(|| ScopeError::UndefinedVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bind a variable in the current (innermost) frame.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.current_frame_mut().insert(name, value.into());
    }

    /// Remove a binding from the current frame.
    pub fn delete(&mut self, name: &str) -> Result<Value, ScopeError> {
        self.current_frame_mut()
            .remove(name)
            .ok_or_else(|| ScopeError::UndefinedVariable(name.to_string()))
    }

    /// Access a frame's binding table for rewriting after the fact.
    ///
    /// Only the current frame may be rewritten, and only if its kind
    /// supports it.
    pub(crate) fn reflect_mut(&mut self, id: FrameId) -> Result<&mut Frame, ScopeError> {
        let current = self.current_frame_mut();
        if current.id != id {
            let frame = current.name.clone();
            return Err(ScopeError::capability(
                &frame,
                "the block's frame is no longer the active frame",
            ));
        }
        if !current.kind.supports_rewrite() {
            let frame = current.name.clone();
            return Err(ScopeError::capability(
                &frame,
                "function locals cannot be rewritten after the fact",
            ));
        }
        Ok(current)
    }
}
