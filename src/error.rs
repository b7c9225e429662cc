use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },

    #[error("unknown unichar id {0}")]
    UnknownUnichar(usize),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),
}
