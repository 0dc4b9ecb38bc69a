// publisher-core/src/infrastructure/connection/validate.rs

use std::collections::HashSet;
use tracing::debug;
use validator::{Validate, ValidationErrors};

use crate::domain::connection::{
    AttachedDatabase, AttachmentSource, BigQueryConfig, ConnectionConfig, ConnectionDecl,
    EMBEDDED_ENGINE_NAME, PostgresConfig,
};
use crate::domain::error::DomainError;
use crate::infrastructure::connection::credentials::{validate_project_id, validate_service_account_key};
use crate::infrastructure::connection::sql::is_identifier;

/// A declaration that passed every check. Identical duplicate attachments
/// have been collapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConnection {
    pub name: String,
    pub config: ConnectionConfig,
}

impl ValidatedConnection {
    pub fn attachments(&self) -> &[AttachedDatabase] {
        match &self.config {
            ConnectionConfig::Duckdb { config } => {
                config.attached_databases.as_deref().unwrap_or_default()
            }
            _ => &[],
        }
    }
}

/// Checks a scope's declarations before anything is built.
///
/// Order: names present, no duplicate names, no reserved name, attachment
/// names, empty attachment blocks, identifiers, required fields, credentials.
pub fn validate_connections(
    decls: &[ConnectionDecl],
) -> Result<Vec<ValidatedConnection>, DomainError> {
    // 0. Names
    let mut named = Vec::with_capacity(decls.len());
    for decl in decls {
        let name = decl.name.clone().ok_or_else(|| DomainError::RequiredField {
            connection: decl.display_name().to_string(),
            field: "name".to_string(),
        })?;
        named.push(ValidatedConnection {
            name,
            config: decl.config.clone(),
        });
    }

    // 1. Duplicates
    let mut seen = HashSet::new();
    for conn in &named {
        if !seen.insert(conn.name.as_str()) {
            return Err(DomainError::ConnectionNameConflict(conn.name.clone()));
        }
    }

    // 2. Reserved name, whatever the kind
    if let Some(conn) = named.iter().find(|c| c.name == EMBEDDED_ENGINE_NAME) {
        return Err(DomainError::ReservedConnectionName(conn.name.clone()));
    }

    // 3. Attachment names
    for conn in &mut named {
        dedupe_attachments(conn)?;
    }

    // 4. Explicitly empty attachment blocks
    for conn in &named {
        if let ConnectionConfig::Duckdb { config } = &conn.config {
            if config.attached_databases.as_ref().is_some_and(Vec::is_empty) {
                return Err(DomainError::EmptyAttachments(conn.name.clone()));
            }
        }
    }

    // 5. Identifiers
    for conn in &named {
        if !is_identifier(&conn.name) {
            return Err(DomainError::InvalidIdentifier(conn.name.clone()));
        }
        if let Some(bad) = conn.attachments().iter().find(|a| !is_identifier(&a.name)) {
            return Err(DomainError::InvalidIdentifier(bad.name.clone()));
        }
    }

    // 6. Required fields, 7. credentials
    for conn in &named {
        check_config(&conn.name, &conn.config)?;
        for attachment in conn.attachments() {
            check_attachment(attachment)?;
        }
    }

    Ok(named)
}

fn dedupe_attachments(conn: &mut ValidatedConnection) -> Result<(), DomainError> {
    let ConnectionConfig::Duckdb { config } = &mut conn.config else {
        return Ok(());
    };
    let Some(attachments) = config.attached_databases.take() else {
        return Ok(());
    };

    let mut kept: Vec<AttachedDatabase> = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        if attachment.name == conn.name {
            return Err(attachment_conflict(&conn.name, &attachment.name));
        }
        match kept.iter().position(|k| k.name == attachment.name) {
            Some(i) if kept[i] == attachment => {
                debug!(connection = %conn.name, attachment = %attachment.name, "Ignoring repeated attachment");
            }
            Some(_) => return Err(attachment_conflict(&conn.name, &attachment.name)),
            None => kept.push(attachment),
        }
    }

    config.attached_databases = Some(kept);
    Ok(())
}

fn attachment_conflict(connection: &str, attachment: &str) -> DomainError {
    DomainError::AttachmentNameConflict {
        connection: connection.to_string(),
        attachment: attachment.to_string(),
    }
}

fn check_config(name: &str, config: &ConnectionConfig) -> Result<(), DomainError> {
    match config {
        ConnectionConfig::Postgres { config } => check_postgres(name, config),
        ConnectionConfig::Bigquery { config } => {
            check_bigquery(name, config)
        }
        ConnectionConfig::Snowflake { config } => check_required(name, config),
        ConnectionConfig::Trino { config } => check_required(name, config),
        ConnectionConfig::Duckdb { .. } => Ok(()),
    }
}

fn check_attachment(attachment: &AttachedDatabase) -> Result<(), DomainError> {
    let name = attachment.name.as_str();
    match &attachment.source {
        AttachmentSource::Postgres { config } => check_postgres(name, config),
        AttachmentSource::Bigquery { config } => {
            check_bigquery(name, config)
        }
        AttachmentSource::Snowflake { config } => check_required(name, config),
        AttachmentSource::S3 { config } => {
            check_required(name, config)?;
            if config.region.is_none() {
                return Err(required_field(name, "region"));
            }
            Ok(())
        }
        AttachmentSource::Gcs { config } => check_required(name, config),
    }
}

fn check_bigquery(name: &str, config: &BigQueryConfig) -> Result<(), DomainError> {
    check_required(name, config)?;
    if let Some(project_id) = &config.default_project_id {
        validate_project_id(name, project_id)?;
    }
    if let Some(key) = &config.service_account_key_json {
        validate_service_account_key(name, key)?;
    }
    Ok(())
}

fn check_postgres(name: &str, config: &PostgresConfig) -> Result<(), DomainError> {
    if config.connection_string.is_none() && config.host.is_none() {
        return Err(required_field(name, "host"));
    }
    Ok(())
}

fn check_required<T: Validate>(name: &str, config: &T) -> Result<(), DomainError> {
    config
        .validate()
        .map_err(|errors| required_field(name, &first_field(&errors)))
}

fn required_field(connection: &str, field: &str) -> DomainError {
    DomainError::RequiredField {
        connection: connection.to_string(),
        field: field.to_string(),
    }
}

// Field names come back in Rust case; report them the way they are declared.
fn first_field(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .keys()
        .map(|k| to_camel_case(k))
        .collect();
    fields.sort();
    fields.into_iter().next().unwrap_or_default()
}

fn to_camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
