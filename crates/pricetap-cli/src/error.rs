use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] pricetap_core::ValidationError),

    #[error(transparent)]
    Config(#[from] pricetap_core::ConfigError),

    #[error(transparent)]
    Core(#[from] pricetap_core::CoreError),

    #[error(transparent)]
    Store(#[from] pricetap_core::StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Core(_) => 3,
            Self::Store(_) => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
