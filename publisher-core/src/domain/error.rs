// publisher-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum DomainError {
    // --- NOT FOUND ---
    #[error("Project '{0}' not found")]
    #[diagnostic(code(publisher::domain::project_not_found))]
    ProjectNotFound(String),

    #[error("Package not found: {0}")]
    #[diagnostic(code(publisher::domain::package_not_found))]
    PackageNotFound(String),

    #[error("Connection '{connection}' not found in project '{project}'")]
    #[diagnostic(code(publisher::domain::connection_not_found))]
    ConnectionNotFound { project: String, connection: String },

    #[error("Model '{path}' not found in package '{package}'")]
    #[diagnostic(code(publisher::domain::model_not_found))]
    ModelNotFound { package: String, path: String },

    #[error("Failed to compile model '{path}': {message}")]
    #[diagnostic(code(publisher::domain::model_compilation))]
    ModelCompilation { path: String, message: String },

    // --- FROZEN ---
    #[error("Publisher configuration is frozen: projects and connections cannot be modified")]
    #[diagnostic(
        code(publisher::domain::frozen),
        help("Set \"frozenConfig\": false in publisher.config.json and restart to allow changes.")
    )]
    FrozenConfig,

    // --- LIFECYCLE ---
    #[error("Project '{0}' is still loading")]
    #[diagnostic(
        code(publisher::domain::project_loading),
        help("Retry once the project reports ready or failed.")
    )]
    ProjectLoading(String),

    // --- MANIFEST VALIDATION ---
    #[error("Project '{project}' declares package '{package}' more than once")]
    #[diagnostic(code(publisher::domain::duplicate_package))]
    DuplicatePackage { project: String, package: String },

    #[error("Project '{0}' is declared more than once")]
    #[diagnostic(code(publisher::domain::duplicate_project))]
    DuplicateProject(String),

    // --- CONNECTION VALIDATION ---
    #[error("Connection name '{0}' is declared more than once")]
    #[diagnostic(code(publisher::domain::connection_conflict))]
    ConnectionNameConflict(String),

    #[error("Connection name '{0}' is reserved for the embedded engine")]
    #[diagnostic(
        code(publisher::domain::reserved_name),
        help("Every package already gets a default embedded connection under this name.")
    )]
    ReservedConnectionName(String),

    #[error("Attached database '{attachment}' conflicts with another name in connection '{connection}'")]
    #[diagnostic(
        code(publisher::domain::attachment_conflict),
        help("Attachment names must differ from the connection name and from each other.")
    )]
    AttachmentNameConflict {
        connection: String,
        attachment: String,
    },

    #[error("Connection '{0}' declares an empty attachedDatabases list")]
    #[diagnostic(code(publisher::domain::empty_attachments))]
    EmptyAttachments(String),

    #[error("'{0}' is not a valid identifier (expected letters, digits and underscores)")]
    #[diagnostic(code(publisher::domain::invalid_identifier))]
    InvalidIdentifier(String),

    #[error("Connection '{connection}' is missing required field '{field}'")]
    #[diagnostic(code(publisher::domain::required_field))]
    RequiredField { connection: String, field: String },

    #[error("Invalid credential for connection '{connection}': {reason}")]
    #[diagnostic(code(publisher::domain::invalid_credential))]
    InvalidCredential { connection: String, reason: String },
}
