pub mod config;
pub mod environment;
pub mod error;
pub mod namespace;
pub mod snapshot;
pub mod space;
pub mod value;

pub use config::{CaptureMode, Comparison, ShadowPolicy, SpaceConfig};
pub use environment::{Environment, Frame, FrameId, FrameKind, VariableLookup};
pub use error::ScopeError;
pub use namespace::Namespace;
pub use snapshot::{BindingChange, Delta, Snapshot};
pub use space::{ActiveSpace, ScopeSpace};
pub use value::Value;
