use thiserror::Error;

pub type MetaResult<T> = Result<T, MetaError>;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("Failed to read metadata: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid metadata JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Field [{field}] of [{document}] references unknown document [{target}]")]
    DanglingReference {
        document: String,
        field: String,
        target: String,
    },
}
