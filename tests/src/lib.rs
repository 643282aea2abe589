//! hotweave testing utilities
//!
//! Fixtures for exercising the reload engine against real files without
//! depending on wall-clock modification times.

pub mod events;
pub mod tree;

pub use events::EventRecorder;
pub use tree::SourceTree;

/// Assert the generation currently published for an artifact.
#[macro_export]
macro_rules! assert_generation {
    ($engine:expr, $key:expr, $expected:expr) => {
        let current = $engine.loader().current_id(&$key).map(|g| g.get());
        assert_eq!(
            current,
            Some($expected),
            "unexpected generation for {}",
            $key
        );
    };
}
