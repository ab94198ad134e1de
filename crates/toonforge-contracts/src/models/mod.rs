mod registry;
mod selectors;

pub use registry::{ModeRegistry, ModeSpec, PLACEHOLDER_PROVIDER};
pub use selectors::{ModeSelection, ModeSelector};
