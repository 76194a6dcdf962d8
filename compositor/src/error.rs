use thiserror::Error;

/// Library error type for compositor operations.
///
/// Expected per-frame outcomes (tracking loss, off-surface rays, no new
/// bitmap) are never errors; everything here is either fatal or a
/// best-effort failure the caller logs.
#[derive(Debug, Error)]
pub enum CompositorError {
    /// An XR runtime call failed.
    #[error("XR runtime call {call} failed: {reason}")]
    Runtime { call: &'static str, reason: String },

    /// A GPU texture update, copy, or submission failed.
    #[error("GPU {op} failed: {reason}")]
    Gpu { op: &'static str, reason: String },

    /// The UI engine rejected a call.
    #[error("UI engine {op} failed: {reason}")]
    Engine { op: &'static str, reason: String },
}

pub type Result<T, E = CompositorError> = std::result::Result<T, E>;

impl CompositorError {
    pub fn runtime(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Runtime {
            call,
            reason: reason.into(),
        }
    }

    pub fn gpu(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Gpu {
            op,
            reason: reason.into(),
        }
    }

    pub fn engine(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Engine {
            op,
            reason: reason.into(),
        }
    }
}

/// Background command failures. The `Display` text is what follows
/// `error:` on the background command channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackgroundError {
    #[error("background command is empty.")]
    EmptyCommand,

    #[error("Background file path is empty.")]
    EmptyPath,

    #[error("Background file was not found: {0}")]
    NotFound(String),

    #[error("Only .dds files are supported for this command.")]
    UnsupportedExtension,

    #[error(".glb background is not supported yet.")]
    GlbUnsupported,

    #[error("Failed to read background file: {0}")]
    Read(String),

    #[error("Failed to decode background image: {0}")]
    Decode(String),

    #[error("Unknown background command. Use none, grid, dds|<path>, or glb|<path>.")]
    UnknownCommand,
}
