//! Renderer error types.

use std::fmt;

/// Errors surfaced by the renderer core and its device backends.
///
/// There are no retryable conditions here: capability and creation errors
/// abort prepare, recording errors drop the frame, and everything else is a
/// programming error caught by debug assertions rather than a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A mandatory dynamic-state capability is absent on this device.
    MissingCapability(String),
    /// Pipeline, layout, descriptor, or buffer creation failed.
    ResourceCreation(String),
    /// Emitting or executing a frame's command sequence failed.
    /// The frame must not be submitted.
    Recording(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// No usable device could be constructed.
    BackendUnavailable(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCapability(msg) => write!(f, "missing device capability: {msg}"),
            Self::ResourceCreation(msg) => write!(f, "resource creation failed: {msg}"),
            Self::Recording(msg) => write!(f, "command recording failed: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::BackendUnavailable(msg) => write!(f, "backend unavailable: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::MissingCapability("dynamic logic op".to_string());
        assert_eq!(
            err.to_string(),
            "missing device capability: dynamic logic op"
        );

        let err = RenderError::Recording("unknown buffer id".to_string());
        assert_eq!(err.to_string(), "command recording failed: unknown buffer id");
    }
}
