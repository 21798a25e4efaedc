pub mod observe;
pub mod parser;
pub mod resolver;
pub mod types;

pub use observe::{BadgeDelta, BadgeRule, ChangeDimension, ChangeSet, FocusChange, UiObservation};
pub use parser::{parse, parse_bounds};
pub use resolver::{Match, ResolveError, Selector, Strategy, resolve};
pub use types::{Bounds, Node, Snapshot};
