use thiserror::Error;

/// Errors raised by the resolution engine.
///
/// All variants are fatal programmer errors: none are retried internally and
/// no partial instance is ever cached on failure. The enum is `Clone` so a
/// cached deferred-build failure can be re-raised on every later access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("unknown service '{id}'")]
    UnknownService { id: String },

    #[error("cyclic dependency between services: {cycle}")]
    CyclicDependency { cycle: String },

    #[error("recursively instantiating service '{id}'")]
    RecursiveInstantiation { id: String },

    #[error("service accessor is only valid during the invocation of its target function")]
    StaleAccessor,

    #[error("deferred build of service '{id}' failed: {message}")]
    DeferredBuildFailure { id: String, message: String },

    #[error("failed to construct '{type_name}': {message}")]
    ConstructionFailed { type_name: String, message: String },

    #[error("service instance is not a '{expected}'")]
    TypeMismatch { expected: &'static str },

    #[error("invalid dependency declaration for '{type_name}': {reason}")]
    InvalidDeclaration { type_name: String, reason: String },
}

impl ResolutionError {
    pub fn unknown(id: impl Into<String>) -> Self {
        ResolutionError::UnknownService { id: id.into() }
    }

    pub fn construction(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        ResolutionError::ConstructionFailed {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Whether this error is the unregistered-service case a lenient
    /// container may substitute with an absent dependency slot.
    pub fn is_unknown_service(&self) -> bool {
        matches!(self, ResolutionError::UnknownService { .. })
    }
}
