use std::ops::{Deref, DerefMut};

use tracing::{debug, error, trace, warn};

use crate::config::{CaptureMode, ShadowPolicy, SpaceConfig};
use crate::environment::{Environment, FrameId, FrameKind};
use crate::error::ScopeError;
use crate::namespace::Namespace;
use crate::snapshot::{BindingChange, Snapshot, differs};
use crate::value::Value;

const DEFAULT_LABEL: &str = "scopespace";

/// A scoped namespace: a block that runs like a function called once, whose
/// new bindings end up on a [`Namespace`] instead of in the caller's frame.
///
/// ```
/// use scopespace::{Environment, ScopeError, ScopeSpace, Value};
///
/// let mut env = Environment::new();
/// let (v1, ()) = ScopeSpace::new().run(&mut env, |env| {
///     env.set("df", 42);
///     Ok::<_, ScopeError>(())
/// })?;
///
/// assert!(env.lookup("df").is_err());
/// assert_eq!(v1.attr("df")?, Value::from(42));
/// # Ok::<_, ScopeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ScopeSpace {
    label: String,
    config: SpaceConfig,
}

impl Default for ScopeSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeSpace {
    pub fn new() -> Self {
        ScopeSpace {
            label: DEFAULT_LABEL.to_string(),
            config: SpaceConfig::default(),
        }
    }

    /// A space whose namespace (and block frame, in child-frame mode) carries `label`.
    pub fn named(label: impl Into<String>) -> Self {
        ScopeSpace {
            label: label.into(),
            ..Self::new()
        }
    }

    pub fn with_config(mut self, config: SpaceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// Start a block in the current frame. The block's statements run
    /// against the returned guard, which derefs to the environment.
    pub fn enter(self, env: &mut Environment) -> Result<ActiveSpace<'_>, ScopeError> {
        self.open(env, None)
    }

    /// Like [`ScopeSpace::enter`], also binding the namespace in the caller's
    /// frame under `alias`. The alias binding outlives the block.
    pub fn enter_as<'a>(
        self,
        env: &'a mut Environment,
        alias: &str,
    ) -> Result<ActiveSpace<'a>, ScopeError> {
        self.open(env, Some(alias))
    }

    /// Run `block` as a scoped block.
    ///
    /// Cleanup always happens, including when `block` fails or panics. A
    /// block error is returned unchanged; errors of the space itself are
    /// converted into `E`.
    pub fn run<T, E, F>(self, env: &mut Environment, block: F) -> Result<(Namespace, T), E>
    where
        F: FnOnce(&mut Environment) -> Result<T, E>,
        E: From<ScopeError>,
    {
        let mut active = self.enter(env)?;
        let outcome = block(&mut *active);
        active.exit(outcome)
    }

    fn open<'a>(
        self,
        env: &'a mut Environment,
        alias: Option<&str>,
    ) -> Result<ActiveSpace<'a>, ScopeError> {
        let owner = env.current_frame().id();
        let namespace = Namespace::new(self.label.clone());

        let (frame, before) = match self.config.mode {
            CaptureMode::Diff => {
                let frame = env.reflect_mut(owner)?;
                if frame.capture_active {
                    return Err(ScopeError::AlreadyActive {
                        frame: frame.name().to_string(),
                    });
                }
                frame.capture_active = true;
                if let Some(alias) = alias {
                    frame.insert(alias, Value::Namespace(namespace.clone()));
                }
                (owner, Snapshot::of(frame))
            }
            CaptureMode::ChildFrame => {
                let caller = env.current_frame();
                if caller.capture_active {
                    return Err(ScopeError::AlreadyActive {
                        frame: caller.name().to_string(),
                    });
                }
                if let Some(alias) = alias {
                    env.set(alias, Value::Namespace(namespace.clone()));
                }
                let frame = env.push_frame(FrameKind::Block, &self.label);
                if let Some(caller) = env.frame_mut(owner) {
                    caller.capture_active = true;
                }
                (frame, Snapshot::default())
            }
        };

        debug!(
            space = %self.label,
            mode = ?self.config.mode,
            bindings = before.len(),
            "entered scoped block"
        );

        Ok(ActiveSpace {
            env,
            namespace,
            state: Some(BlockState {
                config: self.config,
                owner,
                frame,
                before,
            }),
        })
    }
}

/// A scoped block that has been entered and not yet exited.
///
/// The guard derefs to the [`Environment`] the block runs against. Calling
/// [`ActiveSpace::exit`] reports the block's outcome; dropping the guard
/// instead (an early `?`, a panic) still captures and reverts the block's
/// bindings, but any rejected shadowing goes unreported.
#[must_use = "an entered scoped block should be exited to report its outcome"]
#[derive(Debug)]
pub struct ActiveSpace<'a> {
    env: &'a mut Environment,
    namespace: Namespace,
    /// `None` once the block has been closed.
    state: Option<BlockState>,
}

impl ActiveSpace<'_> {
    /// The namespace the block's bindings will be moved to. Empty until exit.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Finish the block: capture its bindings, revert the caller's frame,
    /// then report `outcome`.
    ///
    /// If `outcome` is an error it is returned as is, after cleanup. If
    /// cleanup itself fails while the block also failed, the block's error
    /// wins and the cleanup failure is logged.
    pub fn exit<T, E>(mut self, outcome: Result<T, E>) -> Result<(Namespace, T), E>
    where
        E: From<ScopeError>,
    {
        let label = self.namespace.label().to_string();
        match (outcome, self.close()) {
            (Err(block_error), Ok(_)) => {
                debug!(space = %label, "scoped block failed, bindings isolated");
                Err(block_error)
            }
            (Err(block_error), Err(cleanup_error)) => {
                error!(space = %label, error = %cleanup_error, "isolation failed while block failed");
                Err(block_error)
            }
            (Ok(_), Err(cleanup_error)) => Err(cleanup_error.into()),
            (Ok(value), Ok(shadowed)) => {
                if !shadowed.is_empty() {
                    warn!(space = %label, names = ?shadowed, "block rebinds existing names");
                    return Err(ScopeError::ShadowedBindings { names: shadowed }.into());
                }
                Ok((self.namespace.clone(), value))
            }
        }
    }

    /// Capture and revert. Returns the rebound names to report, which is
    /// empty unless shadowing is rejected.
    fn close(&mut self) -> Result<Vec<String>, ScopeError> {
        let Some(state) = self.state.take() else {
            return Ok(Vec::new());
        };
        let result = match state.config.mode {
            CaptureMode::Diff => state.close_diff(self.env, &self.namespace),
            CaptureMode::ChildFrame => state.close_child(self.env, &self.namespace),
        };
        if let Err(e) = &result {
            warn!(error = %e, "scoped block could not be closed");
        }
        result
    }
}

impl Deref for ActiveSpace<'_> {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        self.env
    }
}

impl DerefMut for ActiveSpace<'_> {
    fn deref_mut(&mut self) -> &mut Environment {
        self.env
    }
}

impl Drop for ActiveSpace<'_> {
    fn drop(&mut self) {
        if self.state.is_none() {
            return;
        }
        debug!(space = %self.namespace.label(), "scoped block dropped without exit");
        if let Err(e) = self.close() {
            error!(space = %self.namespace.label(), error = %e, "cleanup of dropped block failed");
        }
    }
}

#[derive(Debug)]
struct BlockState {
    config: SpaceConfig,
    /// Frame the block was entered from.
    owner: FrameId,
    /// Frame the block's statements write to.
    frame: FrameId,
    before: Snapshot,
}

impl BlockState {
    fn close_diff(
        self,
        env: &mut Environment,
        namespace: &Namespace,
    ) -> Result<Vec<String>, ScopeError> {
        let frame = match env.reflect_mut(self.frame) {
            Ok(frame) => frame,
            Err(e) => {
                release(env, self.owner);
                return Err(e);
            }
        };

        let after = Snapshot::of(frame);
        let mut delta = self.before.diff(&after, self.config.comparison);
        delta.retain(|name| !self.config.is_excluded(name));

        for name in delta.captured() {
            if let Some(value) = after.get(name) {
                capture(namespace, name, value);
            }
        }

        let mut shadowed = Vec::new();
        for (name, change) in delta.iter() {
            match change {
                BindingChange::Added => {
                    frame.remove(name);
                }
                BindingChange::Changed => {
                    if let Some(old) = self.before.get(name) {
                        frame.insert(name, old.clone());
                    }
                    shadowed.push(name.to_string());
                }
                BindingChange::Removed => {
                    if self.config.restore_deleted {
                        if let Some(old) = self.before.get(name) {
                            frame.insert(name, old.clone());
                        }
                    }
                }
            }
            trace!(binding = name, ?change, "reverted binding");
        }
        // Restored and re-added names go back to their original positions.
        frame.reorder_like(&self.before);
        frame.capture_active = false;

        debug!(
            space = %namespace.label(),
            captured = namespace.len(),
            reverted = delta.len(),
            "exited scoped block"
        );
        Ok(self.reportable(shadowed))
    }

    fn close_child(
        self,
        env: &mut Environment,
        namespace: &Namespace,
    ) -> Result<Vec<String>, ScopeError> {
        if env.current_frame().id() != self.frame {
            release(env, self.owner);
            return Err(ScopeError::capability(
                namespace.label(),
                "the block's frame is no longer the active frame",
            ));
        }
        let Some(frame) = env.pop_frame() else {
            return Err(ScopeError::capability(
                namespace.label(),
                "the block's frame cannot be popped",
            ));
        };
        release(env, self.owner);

        let mut shadowed = Vec::new();
        for (name, value) in frame.into_bindings() {
            if self.config.is_excluded(&name) {
                // Excluded names are shared with the caller.
                env.set(&name, value);
                continue;
            }
            if env
                .get(&name)
                .is_some_and(|outer| differs(outer, &value, self.config.comparison))
            {
                shadowed.push(name.clone());
            }
            capture(namespace, &name, &value);
        }

        debug!(
            space = %namespace.label(),
            captured = namespace.len(),
            "exited scoped block"
        );
        Ok(self.reportable(shadowed))
    }

    fn reportable(&self, shadowed: Vec<String>) -> Vec<String> {
        match self.config.shadowing {
            ShadowPolicy::Restore => Vec::new(),
            ShadowPolicy::Reject => shadowed,
        }
    }
}

/// Put a binding on the namespace. A binding of the namespace itself is
/// dropped rather than stored inside it.
fn capture(namespace: &Namespace, name: &str, value: &Value) {
    if value.as_namespace().is_some_and(|ns| ns.ptr_eq(namespace)) {
        trace!(binding = name, "skipped self-reference");
        return;
    }
    trace!(binding = name, value = %value, "captured binding");
    namespace.set(name, value.clone());
}

fn release(env: &mut Environment, owner: FrameId) {
    if let Some(frame) = env.frame_mut(owner) {
        frame.capture_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Comparison;

    fn run_ok(
        space: ScopeSpace,
        env: &mut Environment,
        block: impl FnOnce(&mut Environment),
    ) -> Namespace {
        let (ns, ()) = space
            .run(env, |env| {
                block(env);
                Ok::<_, ScopeError>(())
            })
            .unwrap();
        ns
    }

    #[test]
    fn new_names_move_to_the_namespace() {
        let mut env = Environment::new();
        let ns = run_ok(ScopeSpace::new(), &mut env, |env| env.set("n", 7));
        assert!(!env.contains("n"));
        assert_eq!(ns.get("n"), Some(Value::from(7)));
    }

    #[test]
    fn rebinding_is_captured_and_restored() {
        let mut env = Environment::new();
        env.set("x", 5);
        let ns = run_ok(ScopeSpace::new(), &mut env, |env| {
            let x = env.lookup("x").unwrap().as_number().unwrap();
            env.set("x", x + 1.0);
            env.set("y", 10);
        });
        assert_eq!(env.lookup("x"), Ok(&Value::from(5)));
        assert!(env.lookup("y").is_err());
        assert_eq!(ns.attr("x"), Ok(Value::from(6)));
        assert_eq!(ns.attr("y"), Ok(Value::from(10)));
    }

    #[test]
    fn guard_exposes_the_namespace_before_exit() {
        let mut env = Environment::new();
        let mut active = ScopeSpace::named("v1").enter(&mut env).unwrap();
        let early = active.namespace().clone();
        active.set("a", 1);
        assert!(early.is_empty());
        let (ns, ()) = active.exit::<_, ScopeError>(Ok(())).unwrap();
        assert!(ns.ptr_eq(&early));
        assert_eq!(early.names(), vec!["a"]);
        assert_eq!(ns.label(), "v1");
        assert!(!env.contains("a"));
    }

    #[test]
    fn dropped_guard_still_reverts() {
        let mut env = Environment::new();
        {
            let mut active = ScopeSpace::new().enter(&mut env).unwrap();
            active.set("tmp", 1);
        }
        assert!(!env.contains("tmp"));
        assert!(!env.current_frame().capture_active);
    }

    #[test]
    fn nested_blocks_on_one_frame_are_rejected() {
        let mut env = Environment::new();
        let mut outer = ScopeSpace::new().enter(&mut env).unwrap();
        let err = ScopeSpace::new().enter(&mut outer).unwrap_err();
        assert!(matches!(err, ScopeError::AlreadyActive { .. }));
        outer.exit::<_, ScopeError>(Ok(())).unwrap();
        assert!(ScopeSpace::new().enter(&mut env).is_ok());
    }

    #[test]
    fn alias_binding_survives_and_is_not_captured() {
        let mut env = Environment::new();
        let mut active = ScopeSpace::named("v1").enter_as(&mut env, "v1").unwrap();
        active.set("b", 10);
        let copy = active.lookup("v1").unwrap().clone();
        active.set("same", copy);
        let (ns, ()) = active.exit::<_, ScopeError>(Ok(())).unwrap();

        let bound = env.lookup("v1").unwrap().as_namespace().unwrap().clone();
        assert!(bound.ptr_eq(&ns));
        assert_eq!(ns.names(), vec!["b"]);
        assert!(!env.contains("same"));
    }

    #[test]
    fn config_is_carried_by_the_space() {
        let config = SpaceConfig {
            shadowing: ShadowPolicy::Reject,
            ..SpaceConfig::default()
        };
        let space = ScopeSpace::named("cell").with_config(config.clone());
        assert_eq!(space.config(), &config);
        assert_eq!(ScopeSpace::default().config(), &SpaceConfig::default());
    }

    #[test]
    fn excluded_names_are_left_alone() {
        let mut env = Environment::new();
        let config = SpaceConfig {
            exclude: vec!["_".into()],
            ..SpaceConfig::default()
        };
        let ns = run_ok(ScopeSpace::new().with_config(config), &mut env, |env| {
            env.set("_", 3);
            env.set("df", 4);
        });
        assert_eq!(env.lookup("_"), Ok(&Value::from(3)));
        assert_eq!(ns.names(), vec!["df"]);
    }

    #[test]
    fn deleted_names_come_back_unless_disabled() {
        let mut env = Environment::new();
        env.set("tmp", 1);
        let ns = run_ok(ScopeSpace::new(), &mut env, |env| {
            env.delete("tmp").unwrap();
        });
        assert_eq!(env.lookup("tmp"), Ok(&Value::from(1)));
        assert!(ns.is_empty());

        let config = SpaceConfig {
            restore_deleted: false,
            ..SpaceConfig::default()
        };
        run_ok(ScopeSpace::new().with_config(config), &mut env, |env| {
            env.delete("tmp").unwrap();
        });
        assert!(!env.contains("tmp"));
    }

    #[test]
    fn reverted_frame_keeps_its_binding_order() {
        let mut env = Environment::new();
        env.set("a", 1);
        env.set("b", 2);
        env.set("c", 3);
        let ns = run_ok(ScopeSpace::new(), &mut env, |env| {
            env.delete("a").unwrap();
            env.delete("b").unwrap();
            env.set("b", 20);
            env.set("d", 4);
        });
        let names: Vec<&str> = env.current_frame().names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(env.lookup("b"), Ok(&Value::from(2)));
        assert_eq!(ns.names(), vec!["b", "d"]);
    }

    #[test]
    fn equality_comparison_ignores_equal_rebinding() {
        let mut env = Environment::new();
        env.set("xs", Value::list(vec![1.into()]));
        let config = SpaceConfig {
            comparison: Comparison::Equality,
            ..SpaceConfig::default()
        };
        let ns = run_ok(ScopeSpace::new().with_config(config), &mut env, |env| {
            env.set("xs", Value::list(vec![1.into()]));
        });
        assert!(ns.is_empty());
    }

    #[test]
    fn child_frame_reads_through_and_captures_everything() {
        let mut env = Environment::new();
        env.set("x", 5);
        let config = SpaceConfig {
            mode: CaptureMode::ChildFrame,
            ..SpaceConfig::default()
        };
        let ns = run_ok(ScopeSpace::named("cell").with_config(config), &mut env, |env| {
            assert_eq!(env.current_frame().name(), "cell");
            let x = env.lookup("x").unwrap().as_number().unwrap();
            env.set("x", x + 1.0);
            env.set("y", 10);
        });
        assert_eq!(env.depth(), 1);
        assert_eq!(env.lookup("x"), Ok(&Value::from(5)));
        assert!(!env.contains("y"));
        assert_eq!(ns.names(), vec!["x", "y"]);
        assert_eq!(ns.attr("x"), Ok(Value::from(6)));
    }

    #[test]
    fn dropped_child_frame_guard_pops_its_frame() {
        let mut env = Environment::new();
        let config = SpaceConfig {
            mode: CaptureMode::ChildFrame,
            ..SpaceConfig::default()
        };
        {
            let mut active = ScopeSpace::new().with_config(config).enter(&mut env).unwrap();
            active.set("tmp", 1);
            assert_eq!(active.depth(), 2);
        }
        assert_eq!(env.depth(), 1);
        assert!(!env.contains("tmp"));
    }
}
