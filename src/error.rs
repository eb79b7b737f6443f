use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    /// No column signature matched the file header; the whole file is rejected.
    #[error("Unrecognized schema for header [{}]", header.join(", "))]
    SchemaUnrecognized { header: Vec<String> },

    #[error("File contains a header but no data rows")]
    EmptyFile,

    /// Optimistic commit lost a race against another writer of the same partition.
    #[error("Stale snapshot for {table}: expected version {expected}, found {found}")]
    StaleSnapshotConflict {
        table: String,
        expected: u64,
        found: u64,
    },

    #[error("Gave up committing {table} after {attempts} conflicting attempts")]
    CommitRetriesExhausted { table: String, attempts: u32 },

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, PulseError>;
