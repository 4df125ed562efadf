//! Error types for ilorm operations.

use std::fmt;

/// The primary error type for all ilorm operations.
#[derive(Debug)]
pub enum Error {
    /// The connector failed to serve a request
    Connector(ConnectorError),
    /// A linked query could not be resolved (ResolutionFailure)
    Resolution(ResolutionError),
    /// A raw record could not be projected into a model (ProjectionFailure)
    Projection(ProjectionError),
    /// A streaming contract was broken (ProtocolViolation)
    Protocol(ProtocolError),
    /// Type conversion errors
    Type(TypeError),
    /// Schema lookup errors
    Schema(SchemaError),
    /// Configuration errors
    Config(ConfigError),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectorError {
    pub kind: ConnectorErrorKind,
    pub connector: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorErrorKind {
    /// The backend could not open a cursor for the query
    Stream,
    /// The target model/table is unknown to the backend
    UnknownModel,
    /// The backend does not implement the requested operation
    Unsupported,
    /// The backend is temporarily unavailable (retry may succeed)
    Unavailable,
    /// Other backend failure
    Backend,
}

#[derive(Debug)]
pub struct ResolutionError {
    pub kind: ResolutionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    /// The connector failed to produce the inner cursor
    CursorUnavailable,
    /// The resolution procedure itself failed
    ProcedureFailed,
    /// The resolution procedure panicked
    Panicked,
}

#[derive(Debug)]
pub struct ProjectionError {
    /// Model the record was projected into
    pub model: &'static str,
    /// Zero-based position of the failing record in the stream
    pub position: usize,
    pub message: String,
    pub source: Option<Box<Error>>,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// The resolution procedure was released twice
    DoubleRelease,
    /// The resolution procedure finished without invoking its continuation
    MissingContinuation,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub model: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Field is not declared by the schema
    UnknownField,
    /// NULL given for a non-nullable field
    NotNullable,
    /// Primary key value missing or malformed
    PrimaryKey,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Is this a retryable error? ilorm never retries by itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connector(c) => matches!(c.kind, ConnectorErrorKind::Unavailable),
            Error::Resolution(r) => r
                .source
                .as_deref()
                .and_then(|s| s.downcast_ref::<Error>())
                .is_some_and(Error::is_retryable),
            _ => false,
        }
    }

    /// Did a linked query fail to resolve?
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Error::Resolution(_))
    }

    /// Did a record fail to project into its model?
    pub fn is_projection_failure(&self) -> bool {
        matches!(self, Error::Projection(_))
    }

    /// Was a streaming contract broken?
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Wrap an error raised while resolving a linked query.
    ///
    /// Errors that already are resolution failures are returned unchanged.
    pub fn into_resolution(self, kind: ResolutionErrorKind) -> Self {
        match self {
            Error::Resolution(_) => self,
            other => Error::Resolution(ResolutionError {
                kind,
                message: other.to_string(),
                source: Some(Box::new(other)),
            }),
        }
    }

    /// The schema of `model` does not declare `field`.
    pub fn unknown_field(model: &'static str, field: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::UnknownField,
            model: Some(model),
            message: format!("The property {field} does not exists in the defined schema."),
        })
    }
}

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connector(e) => match &e.connector {
                Some(name) => write!(f, "Connector error ({}): {}", name, e.message),
                None => write!(f, "Connector error: {}", e.message),
            },
            Error::Resolution(e) => write!(f, "Resolution failure: {}", e.message),
            Error::Projection(e) => write!(f, "Projection failure: {}", e),
            Error::Protocol(e) => write!(f, "Protocol violation: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connector(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Resolution(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Projection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record #{} could not be projected into {}: {}",
            self.position, self.model, self.message
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectorError> for Error {
    fn from(err: ConnectorError) -> Self {
        Error::Connector(err)
    }
}

impl From<ResolutionError> for Error {
    fn from(err: ResolutionError) -> Self {
        Error::Resolution(err)
    }
}

impl From<ProjectionError> for Error {
    fn from(err: ProjectionError) -> Self {
        Error::Projection(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for ilorm operations.
pub type Result<T> = std::result::Result<T, Error>;
