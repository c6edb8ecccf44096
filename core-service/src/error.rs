use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),
}

impl CoreError {
    /// The underlying library error, if this error came from the catalog
    pub fn as_library(&self) -> Option<&core_library::LibraryError> {
        match self {
            CoreError::Library(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
