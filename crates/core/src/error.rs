use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HmsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid text: {0}")]
    Text(#[from] hms_types::TextError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },
    #[error("database connection lock was poisoned")]
    ConnectionPoisoned,

    #[error("admission number capacity exhausted for prefix {prefix}")]
    AdmissionCapacityExhausted { prefix: String },
    #[error("patient not found: {0}")]
    PatientNotFound(String),
    #[error("a patient with national id {0} is already registered")]
    AlreadyRegistered(String),
    #[error("inpatient record not found: {0}")]
    InpatientNotFound(i64),
    #[error("bed {0} is already occupied")]
    BedOccupied(u32),

    #[error("failed to read count series {path}: {source}", path = path.display())]
    SeriesRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid count series row in {path} (line {line}): {reason}", path = path.display())]
    SeriesRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

pub type HmsResult<T> = std::result::Result<T, HmsError>;
