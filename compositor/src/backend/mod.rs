//! Backend selection. Only the headless backend ships in this crate; real
//! OpenXR/GPU/UI-engine integrations implement the same three traits.

pub mod headless;

/// Backend type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Headless,
}

impl BackendType {
    /// Parse a `--backend` value. `auto` resolves to the best available
    /// backend.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "headless" | "auto" => Some(Self::Headless),
            _ => None,
        }
    }
}

/// Run the compositor with the selected backend.
pub fn run(backend: BackendType, config: headless::HeadlessConfig) -> anyhow::Result<()> {
    match backend {
        BackendType::Headless => headless::run(config),
    }
}
