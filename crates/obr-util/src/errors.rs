use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for parsing, loading and indexing repositories.
#[derive(Debug, Error, Diagnostic)]
pub enum ObrError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed LDAP filter string.
    #[error("Invalid filter at position {position}: {message}")]
    #[diagnostic(help(
        "Filters use LDAP syntax, e.g. (&(osgi.wiring.package=org.foo)(version>=1.0.0))"
    ))]
    FilterSyntax {
        message: String,
        filter: String,
        position: usize,
    },

    /// Malformed version or version range.
    #[error("Invalid version '{input}': {message}")]
    #[diagnostic(help("Versions look like 1.2.3.qualifier; ranges like [1.0,2.0)"))]
    VersionSyntax { input: String, message: String },

    /// Malformed bundle manifest or manifest header.
    #[error("Invalid manifest header {header}: {message}")]
    #[diagnostic(help(
        "Header clauses look like name;attr=value;directive:=value, separated by commas"
    ))]
    ManifestSyntax { header: String, message: String },

    /// Fetching a repository document failed (network, file, or timeout).
    #[error("Failed to fetch repository {uri}: {message}")]
    RepositoryIo { uri: String, message: String },

    /// The repository document does not match a known schema.
    #[error("Unrecognized repository content in {uri}: {message}")]
    RepositoryFormat { uri: String, message: String },

    /// Invalid or unreadable configuration file.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check ~/.obr/config.toml for syntax errors"))]
    Config { message: String },
}

impl ObrError {
    pub fn filter_syntax(filter: &str, position: usize, message: impl Into<String>) -> Self {
        let position = position.min(filter.len());
        let remainder = filter.get(position..).unwrap_or_default();
        Self::FilterSyntax {
            message: format!("{}: {remainder}", message.into()),
            filter: filter.to_string(),
            position,
        }
    }

    pub fn version_syntax(input: &str, message: impl Into<String>) -> Self {
        Self::VersionSyntax {
            input: input.to_string(),
            message: message.into(),
        }
    }

    pub fn manifest_syntax(header: &str, message: impl Into<String>) -> Self {
        Self::ManifestSyntax {
            header: header.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error came from fetching rather than from the content.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::RepositoryIo { .. })
    }
}

/// Convenience alias used throughout the OBR crates.
pub type ObrResult<T> = std::result::Result<T, ObrError>;
