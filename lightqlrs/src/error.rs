use thiserror::Error;

pub type Result<T> = std::result::Result<T, LightqlError>;

#[derive(Debug, Error)]
pub enum LightqlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    /// A field id in the request (or a template placeholder) does not resolve.
    #[error("field reference error: {0}")]
    FieldReference(String),
    /// Malformed join graph: unknown, unreachable or cyclic tables.
    #[error("join error: {0}")]
    Join(String),
    /// Structurally invalid request.
    #[error("compile error: {0}")]
    Compile(String),
    /// Invalid row limit or nothing to select.
    #[error("parameter error: {0}")]
    Parameter(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
