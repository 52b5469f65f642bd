use thiserror::Error;

/// All failure modes of a seed run.
///
/// `Configuration` and `Bootstrap` are always fatal. `ReferenceData` marks a
/// structural failure (e.g. a collection parent the store cannot resolve) and
/// is escalated to fatal by the pipeline; every other error hit while creating
/// an individual reference entity is tolerated, logged and skipped.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("product table unreadable: {0}")]
    Parse(String),

    #[error("reference data '{entity}' failed: {reason}")]
    ReferenceData { entity: String, reason: String },

    #[error("store rejected operation: {0}")]
    Store(String),

    #[error("shutdown failed: {0}")]
    Shutdown(String),

    #[error("run aborted by signal")]
    Aborted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SeedError {
    /// Structural reference-data failures abort the run; everything else hit
    /// while seeding a single reference entity is skippable.
    pub fn is_structural(&self) -> bool {
        matches!(self, SeedError::ReferenceData { .. })
    }
}
