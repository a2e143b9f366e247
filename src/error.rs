use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartwiseError {
    #[error("Invalid argument: {param} = {value}, expected {constraint}")]
    InvalidArgument {
        param: String,
        value: String,
        constraint: String,
    },
    #[error("Internal invariant violated: {0}")]
    InternalConsistency(String),
    #[error("Analysis cancelled")]
    Cancelled,
    #[error("Config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Worker error: {0}")]
    Worker(String),
}

impl CartwiseError {
    pub fn invalid_argument(
        param: impl Into<String>,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            param: param.into(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CartwiseError>;

// Helper conversions
impl From<::config::ConfigError> for CartwiseError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
impl From<std::io::Error> for CartwiseError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
