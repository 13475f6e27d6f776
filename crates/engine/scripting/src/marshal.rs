//! Marshaller front end shared by the pop and push engines

use crate::logger::{Logger, TracingLogger};
use crate::registry::HandleRegistry;
use crate::schema::DEFAULT_MAX_DEPTH;
use crate::value::Key;
use std::fmt;
use std::rc::Rc;

static DEFAULT_LOGGER: TracingLogger = TracingLogger;

/// Error policy for pop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// The first type mismatch or missing key aborts the call
    #[default]
    Strict,
    /// Mismatches are logged and the affected leaves get default values
    Lenient,
}

/// Location of a value inside the marshalled tree, e.g. `camera.position[2]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// 1-based position in a multi-directive sequence
    Arg(usize),
    Key(Key),
}

impl KeyPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of the `n`-th (1-based) value of a sequence
    pub fn arg(n: usize) -> Self {
        Self {
            segments: vec![Segment::Arg(n)],
        }
    }

    pub fn child(&self, key: Key) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key));
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Arg(n) => write!(f, "#{}", n)?,
                Segment::Key(Key::Named(name)) if i == 0 => write!(f, "{}", name)?,
                Segment::Key(Key::Named(name)) => write!(f, ".{}", name)?,
                Segment::Key(Key::Index(index)) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Drives schema-directed conversion in both directions.
///
/// Borrows the runtime's [`HandleRegistry`], which receives every callable
/// popped through an `l` leaf.
pub struct Marshaller<'a> {
    pub(crate) registry: &'a HandleRegistry,
    pub(crate) logger: &'a dyn Logger,
    pub(crate) policy: Policy,
    pub(crate) max_depth: usize,
}

impl<'a> Marshaller<'a> {
    /// Strict marshaller logging through `tracing`
    pub fn new(registry: &'a HandleRegistry) -> Self {
        Self {
            registry,
            logger: &DEFAULT_LOGGER,
            policy: Policy::Strict,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_logger(mut self, logger: &'a dyn Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn registry(&self) -> &'a HandleRegistry {
        self.registry
    }
}

impl fmt::Debug for Marshaller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Marshaller")
            .field("policy", &self.policy)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// Owned marshaller settings for host functions that outlive a borrow of
/// the runtime
#[derive(Clone)]
pub struct MarshalContext {
    registry: Rc<HandleRegistry>,
    logger: Rc<dyn Logger>,
    policy: Policy,
    max_depth: usize,
}

impl MarshalContext {
    pub fn new(registry: Rc<HandleRegistry>, logger: Rc<dyn Logger>) -> Self {
        Self {
            registry,
            logger,
            policy: Policy::Strict,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Marshaller borrowing these settings
    pub fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(&self.registry)
            .with_policy(self.policy)
            .with_logger(&*self.logger)
            .with_max_depth(self.max_depth)
    }
}

impl fmt::Debug for MarshalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshalContext")
            .field("policy", &self.policy)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_path_display() {
        let path = KeyPath::root()
            .child(Key::from("camera"))
            .child(Key::from("position"))
            .child(Key::Index(2));
        assert_eq!(path.to_string(), "camera.position[2]");

        let path = KeyPath::arg(2).child(Key::from("color")).child(Key::Index(1));
        assert_eq!(path.to_string(), "#2.color[1]");

        assert_eq!(KeyPath::root().to_string(), "");
        assert!(KeyPath::root().is_root());
    }

    #[test]
    fn test_builder() {
        let registry = HandleRegistry::new();
        let m = Marshaller::new(&registry)
            .with_policy(Policy::Lenient)
            .with_max_depth(4);
        assert_eq!(m.policy(), Policy::Lenient);
        assert_eq!(m.max_depth, 4);
        assert_eq!(Policy::default(), Policy::Strict);
    }

    #[test]
    fn test_context_carries_settings() {
        let context = MarshalContext::new(
            Rc::new(HandleRegistry::new()),
            Rc::new(crate::RecordingLogger::new()),
        )
        .with_policy(Policy::Lenient)
        .with_max_depth(3);

        assert_eq!(context.marshaller().max_depth, 3);
        assert_eq!(context.clone().marshaller().policy(), Policy::Lenient);
    }
}
