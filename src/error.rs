//! Error types for PDF Filler MCP Server

use thiserror::Error;

/// Result type alias for PDF Filler MCP Server
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for PDF Filler MCP Server
#[derive(Error, Debug)]
pub enum Error {
    /// Tool name is not in the catalog
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// A required tool argument is absent
    #[error("Missing required argument '{field}' for tool '{tool}'")]
    MissingArgument { tool: String, field: String },

    /// Tool arguments do not match the declared schema
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Directory to list does not exist
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// PDF is password protected and no (or a wrong) password was provided
    #[error("PDF is password-protected. Please provide the correct password using the 'password' parameter.")]
    PasswordRequired,

    /// Any other document load failure
    #[error("Failed to load PDF: {reason}")]
    LoadFailure { reason: String },

    /// Named form field does not exist
    #[error("Field '{name}' not found in PDF. Check field name or use 'read_pdf_fields' to see available fields.")]
    FieldNotFound { name: String },

    /// Value is not one of the field's options
    #[error("Field '{name}': '{value}' is not a valid option (expected one of: {options})")]
    InvalidOption {
        name: String,
        value: String,
        options: String,
    },

    /// Field exists but could not be written
    #[error("Field '{name}': {reason}")]
    FieldWrite { name: String, reason: String },

    /// Profile does not exist in the profile directory
    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    /// Profile name cannot be used as a file name
    #[error("Invalid profile name '{name}': must be non-empty, without path separators or a leading '.'")]
    InvalidProfileName { name: String },

    /// Resource URI scheme not served by this server
    #[error("Unsupported resource URI: {uri}")]
    UnsupportedUri { uri: String },

    /// Optional capability could not be initialised at startup
    #[error("{capability} is not available on this system")]
    CapabilityUnavailable { capability: String },

    /// Page rendering error
    #[error("Failed to render page: {reason}")]
    Render { reason: String },

    /// Blocking tool task panicked or was cancelled
    #[error("Tool task failed: {reason}")]
    TaskJoin { reason: String },

    /// lopdf error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// qpdf error
    #[error("qpdf error: {reason}")]
    QpdfError { reason: String },

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error belongs to a single field and should be collected
    /// instead of aborting the surrounding fill.
    pub fn is_field_error(&self) -> bool {
        matches!(
            self,
            Error::FieldNotFound { .. } | Error::InvalidOption { .. } | Error::FieldWrite { .. }
        )
    }
}

/// Classify a document load failure by its message.
///
/// Messages that mention a password or encryption become
/// [`Error::PasswordRequired`]; everything else is a [`Error::LoadFailure`].
pub fn classify_load_error(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        Error::PasswordRequired
    } else {
        Error::LoadFailure {
            reason: message.to_string(),
        }
    }
}
