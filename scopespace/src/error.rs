use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ScopeError {
    /// The frame's bindings cannot be rewritten after the fact.
    Capability { frame: String, reason: String },
    /// A scoped block is already active on this frame.
    AlreadyActive { frame: String },
    /// Pre-existing names were rebound inside a block that rejects shadowing.
    ShadowedBindings { names: Vec<String> },
    UndefinedVariable(String),
    NoSuchAttribute(String),
    Config(String),
    Io(String),
}

impl ScopeError {
    pub(crate) fn capability(frame: &str, reason: impl Into<String>) -> Self {
        ScopeError::Capability {
            frame: frame.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that mean the isolation guarantee could not be upheld.
    pub fn is_capability(&self) -> bool {
        matches!(self, ScopeError::Capability { .. })
    }
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::Capability { frame, reason } => {
                write!(f, "cannot isolate bindings of frame '{}': {}", frame, reason)
            }
            ScopeError::AlreadyActive { frame } => {
                write!(f, "a scoped block is already active on frame '{}'", frame)
            }
            ScopeError::ShadowedBindings { names } => {
                write!(f, "block rebinds existing names: {}", names.join(", "))
            }
            ScopeError::UndefinedVariable(name) => write!(f, "name '{}' is not defined", name),
            ScopeError::NoSuchAttribute(name) => {
                write!(f, "namespace has no attribute '{}'", name)
            }
            ScopeError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            ScopeError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ScopeError {}

impl From<std::io::Error> for ScopeError {
    fn from(error: std::io::Error) -> Self {
        ScopeError::Io(error.to_string())
    }
}

impl From<toml::de::Error> for ScopeError {
    fn from(error: toml::de::Error) -> Self {
        ScopeError::Config(error.message().to_string())
    }
}
