use std::path::Path;

use serde::Deserialize;

use crate::error::ScopeError;

/// How a scoped block keeps its bindings out of the caller's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    /// Run in the caller's frame, then diff against the entry snapshot and
    /// revert.
    #[default]
    Diff,
    /// Run in a private block frame pushed on entry and popped on exit.
    ChildFrame,
}

/// What happens when a block rebinds a name that existed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShadowPolicy {
    /// Capture the new value and restore the old one in the caller's frame.
    #[default]
    Restore,
    /// Restore as above, then fail the exit with the rebound names.
    Reject,
}

/// When a pre-existing binding counts as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Comparison {
    /// Changed if it now refers to a different object.
    #[default]
    Identity,
    /// Changed if it is no longer structurally equal.
    Equality,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpaceConfig {
    pub mode: CaptureMode,
    pub shadowing: ShadowPolicy,
    pub comparison: Comparison,
    /// Put back names the block deleted from the caller's frame.
    pub restore_deleted: bool,
    /// Names the block may touch without them being captured or reverted.
    pub exclude: Vec<String>,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        SpaceConfig {
            mode: CaptureMode::Diff,
            shadowing: ShadowPolicy::Restore,
            comparison: Comparison::Identity,
            restore_deleted: true,
            exclude: Vec::new(),
        }
    }
}

impl SpaceConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ScopeError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScopeError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ScopeError::Io(format!("cannot read '{}': {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub(crate) fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|n| n == name)
    }
}
