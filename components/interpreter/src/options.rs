//! Runtime options.

/// Host-settable options carried by the execution context.
///
/// There is no global mutable state; hosts construct the options and hand
/// them to [`crate::Context::new`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Whether promoting search-path slots to multi-context storage forces
    /// promise bindings first.
    pub search_path_force_promises: bool,
    /// Whether multiple logical contexts share this interpreter.
    pub shared_contexts: bool,
}

impl RuntimeOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from the process environment.
    ///
    /// `SearchPathForcePromises` set to `true` or `1` enables promise
    /// forcing at promotion.
    pub fn from_env() -> Self {
        let force = std::env::var("SearchPathForcePromises")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Self {
            search_path_force_promises: force,
            shared_contexts: false,
        }
    }
}
