use std::collections::HashMap;

/// Adjusts the process environment used to invoke the bundled engine
/// binaries.
///
/// Self-contained application bundles (AppImage and friends) ship
/// their own copies of the engine's shared libraries; the bundle
/// integration implements this trait to prepend the bundled library
/// search paths before any engine tool is spawned.
pub trait EnvironmentAdjuster: Send + Sync {
    /// Given the inherited environment, return the environment the
    /// engine binaries should run with.
    fn adjusted(&self, base: HashMap<String, String>) -> HashMap<String, String>;

    /// Convenience: adjusted copy of the current process environment.
    fn current(&self) -> HashMap<String, String> {
        self.adjusted(std::env::vars().collect())
    }
}

/// Pass-through adjuster for installations that use system libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct InheritedEnvironment;

impl EnvironmentAdjuster for InheritedEnvironment {
    fn adjusted(&self, base: HashMap<String, String>) -> HashMap<String, String> {
        base
    }
}
