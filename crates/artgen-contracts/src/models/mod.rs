mod registry;
mod resolver;
mod signals;

pub use registry::{ModelFamily, ModelIdentity, ModelRegistry, ModelSpec};
pub use resolver::{ModelResolution, ModelResolver, ResolutionRule, ResolveInput, ResolverState};
pub use signals::{HeuristicSignalDetector, MentionedCharacter, Signal, SignalDetector, SignalInput};
