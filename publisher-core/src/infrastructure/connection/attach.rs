// publisher-core/src/infrastructure/connection/attach.rs

// Turns an attached-database declaration into the statements the embedded
// engine runs. Credentials only ever appear inside CREATE SECRET bodies, as
// escaped literals.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::connection::{
    AttachedDatabase, AttachmentSource, BigQueryConfig, ObjectStorageCredentials, PostgresConfig,
    Secret, SnowflakeConfig,
};
use crate::domain::error::DomainError;
use crate::error::PublisherError;
use crate::infrastructure::connection::credentials::{validate_project_id, validate_service_account_key};
use crate::infrastructure::connection::sql::{quote_identifier, quote_literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Postgres,
    BigQuery,
    Snowflake,
    Httpfs,
}

impl Extension {
    pub fn name(&self) -> &'static str {
        match self {
            Extension::Postgres => "postgres",
            Extension::BigQuery => "bigquery",
            Extension::Snowflake => "snowflake",
            Extension::Httpfs => "httpfs",
        }
    }

    pub fn install_sql(&self) -> &'static str {
        match self {
            Extension::Postgres => "INSTALL postgres; LOAD postgres;",
            Extension::BigQuery => "INSTALL bigquery FROM community; LOAD bigquery;",
            Extension::Snowflake => "INSTALL snowflake FROM community; LOAD snowflake;",
            Extension::Httpfs => "INSTALL httpfs; LOAD httpfs;",
        }
    }
}

/// A key file the engine reads from disk.
#[derive(Clone)]
pub struct CredentialFile {
    pub path: PathBuf,
    pub contents: Secret,
}

/// Everything needed to register one attachment. Statements may carry
/// credentials, so `Debug` only shows their count.
#[derive(Clone)]
pub struct AttachStep {
    pub name: String,
    pub extension: Extension,
    pub credential_file: Option<CredentialFile>,
    statements: Vec<String>,
}

impl AttachStep {
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl fmt::Debug for AttachStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachStep")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .field(
                "credential_file",
                &self.credential_file.as_ref().map(|c| c.path.display().to_string()),
            )
            .field("statements", &self.statements.len())
            .finish()
    }
}

fn required<'a, T: ?Sized>(
    attachment: &str,
    field: &str,
    value: Option<&'a T>,
) -> Result<&'a T, DomainError> {
    value.ok_or_else(|| DomainError::RequiredField {
        connection: attachment.to_string(),
        field: field.to_string(),
    })
}

/// Builds `NAME value` pairs for a CREATE SECRET body, skipping absent values.
struct SecretBody(Vec<String>);

impl SecretBody {
    fn new(secret_type: &str) -> Self {
        SecretBody(vec![format!("TYPE {}", secret_type)])
    }

    fn text(mut self, key: &str, value: Option<&str>) -> Result<Self, PublisherError> {
        if let Some(value) = value {
            self.0.push(format!("{} {}", key, quote_literal(value)?));
        }
        Ok(self)
    }

    fn number(mut self, key: &str, value: Option<u16>) -> Self {
        if let Some(value) = value {
            self.0.push(format!("{} {}", key, value));
        }
        self
    }

    fn create(self, secret_name: &str) -> Result<String, PublisherError> {
        Ok(format!(
            "CREATE OR REPLACE SECRET {} ({})",
            quote_identifier(secret_name)?,
            self.0.join(", ")
        ))
    }
}

fn secret_name(attachment: &str) -> String {
    format!("{}_secret", attachment)
}

fn attach_via_secret(attachment: &str, engine: &str) -> Result<String, PublisherError> {
    Ok(format!(
        "ATTACH '' AS {} (TYPE {}, SECRET {}, READ_ONLY)",
        quote_identifier(attachment)?,
        engine,
        quote_identifier(&secret_name(attachment))?
    ))
}

/// Plans one attachment. Key files are placed under `credentials_dir`.
pub fn plan_attachment(
    attachment: &AttachedDatabase,
    credentials_dir: &Path,
) -> Result<AttachStep, PublisherError> {
    let name = attachment.name.as_str();
    match &attachment.source {
        AttachmentSource::Postgres { config } => plan_postgres(name, config),
        AttachmentSource::Bigquery { config } => plan_bigquery(name, config, credentials_dir),
        AttachmentSource::Snowflake { config } => plan_snowflake(name, config),
        AttachmentSource::S3 { config } => plan_object_storage(name, "s3", config, true),
        AttachmentSource::Gcs { config } => plan_object_storage(name, "gcs", config, false),
    }
}

fn plan_postgres(name: &str, config: &PostgresConfig) -> Result<AttachStep, PublisherError> {
    // A caller-supplied connection string is used as-is, as a single literal.
    let statements = if let Some(dsn) = &config.connection_string {
        vec![format!(
            "ATTACH {} AS {} (TYPE postgres, READ_ONLY)",
            quote_literal(dsn.expose())?,
            quote_identifier(name)?
        )]
    } else {
        let body = SecretBody::new("postgres")
            .text("HOST", config.host.as_deref())?
            .number("PORT", config.port)
            .text("DATABASE", config.database_name.as_deref())?
            .text("USER", config.user_name.as_deref())?
            .text("PASSWORD", config.password.as_ref().map(Secret::expose))?;
        vec![
            body.create(&secret_name(name))?,
            attach_via_secret(name, "postgres")?,
        ]
    };

    Ok(AttachStep {
        name: name.to_string(),
        extension: Extension::Postgres,
        credential_file: None,
        statements,
    })
}

fn plan_bigquery(
    name: &str,
    config: &BigQueryConfig,
    credentials_dir: &Path,
) -> Result<AttachStep, PublisherError> {
    let project_id = required(name, "defaultProjectId", config.default_project_id.as_deref())?;
    validate_project_id(name, project_id)?;

    let mut statements = Vec::new();
    let mut credential_file = None;
    if let Some(key) = &config.service_account_key_json {
        validate_service_account_key(name, key)?;
        let path = credentials_dir.join(format!("{}-service-account.json", name));
        let body = SecretBody::new("bigquery").text("KEY_FILE", path.to_str())?;
        statements.push(body.create(&secret_name(name))?);
        credential_file = Some(CredentialFile {
            path,
            contents: key.clone(),
        });
    }

    statements.push(format!(
        "ATTACH {} AS {} (TYPE bigquery, READ_ONLY)",
        quote_literal(&format!("project={}", project_id))?,
        quote_identifier(name)?
    ));

    Ok(AttachStep {
        name: name.to_string(),
        extension: Extension::BigQuery,
        credential_file,
        statements,
    })
}

fn plan_snowflake(name: &str, config: &SnowflakeConfig) -> Result<AttachStep, PublisherError> {
    let body = SecretBody::new("snowflake")
        .text("ACCOUNT", Some(required(name, "account", config.account.as_deref())?))?
        .text("USER", Some(required(name, "username", config.username.as_deref())?))?
        .text(
            "PASSWORD",
            Some(required(name, "password", config.password.as_ref())?.expose()),
        )?
        .text(
            "WAREHOUSE",
            Some(required(name, "warehouse", config.warehouse.as_deref())?),
        )?
        .text("DATABASE", config.database.as_deref())?
        .text("SCHEMA", config.schema.as_deref())?;

    Ok(AttachStep {
        name: name.to_string(),
        extension: Extension::Snowflake,
        credential_file: None,
        statements: vec![
            body.create(&secret_name(name))?,
            attach_via_secret(name, "snowflake")?,
        ],
    })
}

/// Object storage is registered as a scoped secret named after the
/// attachment. Nothing is attached as a catalog.
fn plan_object_storage(
    name: &str,
    secret_type: &str,
    config: &ObjectStorageCredentials,
    region_required: bool,
) -> Result<AttachStep, PublisherError> {
    let region = if region_required {
        Some(required(name, "region", config.region.as_deref())?)
    } else {
        config.region.as_deref()
    };
    let body = SecretBody::new(secret_type)
        .text(
            "KEY_ID",
            Some(required(name, "accessKeyId", config.access_key_id.as_deref())?),
        )?
        .text(
            "SECRET",
            Some(required(name, "secretAccessKey", config.secret_access_key.as_ref())?.expose()),
        )?
        .text("REGION", region)?
        .text("ENDPOINT", config.endpoint.as_deref())?;

    Ok(AttachStep {
        name: name.to_string(),
        extension: Extension::Httpfs,
        credential_file: None,
        statements: vec![body.create(name)?],
    })
}
