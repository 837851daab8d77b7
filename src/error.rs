/// Crate-level error types for grammar-sync diagnostics.
use std::path::PathBuf;

/// All errors in grammar-sync carry enough context to reproduce the failure
/// by hand. Each variant names the origin, file, or command that failed.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An external process could not be spawned or exited non-zero.
    #[error("`{program}` failed: {detail}")]
    CommandFailed {
        /// Exit status and trimmed stderr of the process.
        detail: String,
        /// Program name as it was invoked.
        program: String,
    },

    /// Config file parsed but holds a value that cannot be used.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// Description of the offending value.
        reason: String,
    },

    /// A decoder rejected the file content.
    #[error("failed to decode grammar {}: {reason}", path.display())]
    DecodeFailed {
        /// Grammar file that could not be decoded.
        path: PathBuf,
        /// Decoder-specific failure description.
        reason: String,
    },

    /// The file extension is not one of the supported grammar formats.
    #[error("Invalid document type {}", path.display())]
    InvalidDocumentType {
        /// File with the unsupported extension.
        path: PathBuf,
    },

    /// The declared scope name cannot be used as an output file name.
    #[error("invalid scope name `{scope}` in {}", path.display())]
    InvalidScope {
        /// Grammar file declaring the scope.
        path: PathBuf,
        /// The rejected scope name.
        scope: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization of a grammar document failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// Refresh mode needs a manifest and none exists.
    #[error("manifest not found: {}", path.display())]
    ManifestNotFound {
        /// Path where the manifest was expected.
        path: PathBuf,
    },

    /// The grammar document declares neither `scopeName` nor `scope`.
    #[error("grammar has no scope name: {}", path.display())]
    MissingScope {
        /// Grammar file without a scope.
        path: PathBuf,
    },

    /// Fetching a package source failed.
    #[error("failed to fetch {origin}: {reason}")]
    RetrievalFailed {
        /// Origin identifier of the package source.
        origin: String,
        /// Underlying failure, usually a command error.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// TOML serialization failed.
    #[error("toml serialize: {0}")]
    TomlSer(
        /// The wrapped TOML serialization error.
        #[from]
        toml::ser::Error,
    ),

    /// The descriptor matches no package source rule.
    #[error("Unsupported source: {descriptor}")]
    UnsupportedSource {
        /// The descriptor as given in the manifest or on the command line.
        descriptor: String,
    },

    /// A dispatcher worker thread panicked before finishing its queue.
    #[error("worker thread panicked")]
    WorkerPanicked,
}
