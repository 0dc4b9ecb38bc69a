// publisher-core/src/domain/connection.rs

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use validator::Validate;

/// Name of the default embedded connection every package receives.
pub const EMBEDDED_ENGINE_NAME: &str = "duckdb";

const REDACTED: &str = "********";

// =============================================================================
//  1. CREDENTIALS
// =============================================================================

/// Credential material. Never printed, never serialized back out.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

// =============================================================================
//  2. DECLARATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDecl {
    /// Optional at parse time so interactive validation can report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub config: ConnectionConfig,
}

impl ConnectionDecl {
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            name: Some(name.into()),
            config,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Postgres {
        #[serde(rename = "postgresConnection", default)]
        config: PostgresConfig,
    },
    Bigquery {
        #[serde(rename = "bigqueryConnection", default)]
        config: BigQueryConfig,
    },
    Snowflake {
        #[serde(rename = "snowflakeConnection", default)]
        config: SnowflakeConfig,
    },
    Trino {
        #[serde(rename = "trinoConnection", default)]
        config: TrinoConfig,
    },
    Duckdb {
        #[serde(rename = "duckdbConnection", default)]
        config: DuckDbConfig,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Postgres,
    Bigquery,
    Snowflake,
    Trino,
    Duckdb,
}

impl ConnectionKind {
    pub fn dialect_name(&self) -> &'static str {
        match self {
            ConnectionKind::Postgres => "postgres",
            ConnectionKind::Bigquery => "standardsql",
            ConnectionKind::Snowflake => "snowflake",
            ConnectionKind::Trino => "trino",
            ConnectionKind::Duckdb => "duckdb",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionKind::Postgres => "postgres",
            ConnectionKind::Bigquery => "bigquery",
            ConnectionKind::Snowflake => "snowflake",
            ConnectionKind::Trino => "trino",
            ConnectionKind::Duckdb => "duckdb",
        };
        f.write_str(label)
    }
}

impl ConnectionConfig {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            ConnectionConfig::Postgres { .. } => ConnectionKind::Postgres,
            ConnectionConfig::Bigquery { .. } => ConnectionKind::Bigquery,
            ConnectionConfig::Snowflake { .. } => ConnectionKind::Snowflake,
            ConnectionConfig::Trino { .. } => ConnectionKind::Trino,
            ConnectionConfig::Duckdb { .. } => ConnectionKind::Duckdb,
        }
    }
}

// --- Kind-specific blocks ---

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BigQueryConfig {
    #[validate(required)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_key_json: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SnowflakeConfig {
    #[validate(required)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[validate(required)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[validate(required)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    #[validate(required)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrinoConfig {
    #[validate(required)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuckDbConfig {
    /// `None` (no block) and `Some(vec![])` (empty block) are distinct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_databases: Option<Vec<AttachedDatabase>>,
}

// =============================================================================
//  3. ATTACHED DATABASES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedDatabase {
    pub name: String,

    #[serde(flatten)]
    pub source: AttachmentSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttachmentSource {
    Postgres {
        #[serde(rename = "postgresConnection", default)]
        config: PostgresConfig,
    },
    Bigquery {
        #[serde(rename = "bigqueryConnection", default)]
        config: BigQueryConfig,
    },
    Snowflake {
        #[serde(rename = "snowflakeConnection", default)]
        config: SnowflakeConfig,
    },
    S3 {
        #[serde(rename = "s3Connection", default)]
        config: ObjectStorageCredentials,
    },
    Gcs {
        #[serde(rename = "gcsConnection", default)]
        config: ObjectStorageCredentials,
    },
}

impl AttachmentSource {
    pub fn label(&self) -> &'static str {
        match self {
            AttachmentSource::Postgres { .. } => "postgres",
            AttachmentSource::Bigquery { .. } => "bigquery",
            AttachmentSource::Snowflake { .. } => "snowflake",
            AttachmentSource::S3 { .. } => "s3",
            AttachmentSource::Gcs { .. } => "gcs",
        }
    }

    /// Object storage is registered as an engine secret, not a catalog.
    pub fn is_catalog(&self) -> bool {
        !matches!(
            self,
            AttachmentSource::S3 { .. } | AttachmentSource::Gcs { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageCredentials {
    #[validate(required)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[validate(required)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

// =============================================================================
//  4. PUBLIC API SHAPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConnection {
    pub name: String,

    #[serde(flatten)]
    pub config: ConnectionConfig,

    pub attributes: ConnectionAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAttributes {
    pub dialect_name: String,
    pub is_pool: bool,
    pub can_persist: bool,
    pub can_stream: bool,
}

impl ApiConnection {
    pub fn from_decl(name: &str, config: &ConnectionConfig) -> Self {
        let kind = config.kind();
        Self {
            name: name.to_string(),
            config: config.clone(),
            attributes: ConnectionAttributes {
                dialect_name: kind.dialect_name().to_string(),
                is_pool: kind == ConnectionKind::Postgres,
                can_persist: matches!(kind, ConnectionKind::Duckdb | ConnectionKind::Bigquery),
                can_stream: kind != ConnectionKind::Trino,
            },
        }
    }
}

/// Result of an interactive connection check. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub status: ConnectionTestOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionTestOutcome {
    Ok,
    Failed,
}

impl ConnectionStatus {
    pub fn ok() -> Self {
        Self {
            status: ConnectionTestOutcome::Ok,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ConnectionTestOutcome::Failed,
            error_message: Some(message.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"********\"");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_duckdb_decl_with_attachments() {
        let json = r#"{
            "name": "analytics",
            "type": "duckdb",
            "duckdbConnection": {
                "attachedDatabases": [
                    {"name": "pg", "type": "postgres",
                     "postgresConnection": {"host": "db", "port": 5432, "password": "p"}},
                    {"name": "lake", "type": "s3",
                     "s3Connection": {"accessKeyId": "AK", "secretAccessKey": "SK", "region": "eu-west-1"}}
                ]
            }
        }"#;
        let decl: ConnectionDecl = serde_json::from_str(json).unwrap();
        assert_eq!(decl.name.as_deref(), Some("analytics"));
        let ConnectionConfig::Duckdb { config } = &decl.config else {
            panic!("expected duckdb");
        };
        let attached = config.attached_databases.as_ref().unwrap();
        assert_eq!(attached.len(), 2);
        assert!(attached[0].source.is_catalog());
        assert!(!attached[1].source.is_catalog());
    }

    #[test]
    fn test_empty_and_missing_attachment_blocks_differ() {
        let missing: ConnectionDecl =
            serde_json::from_str(r#"{"name": "a", "type": "duckdb"}"#).unwrap();
        let empty: ConnectionDecl = serde_json::from_str(
            r#"{"name": "a", "type": "duckdb", "duckdbConnection": {"attachedDatabases": []}}"#,
        )
        .unwrap();
        assert_ne!(missing, empty);
    }

    #[test]
    fn test_api_connection_hides_password() {
        let decl: ConnectionDecl = serde_json::from_str(
            r#"{"name": "pg", "type": "postgres",
                "postgresConnection": {"host": "db", "password": "hunter2"}}"#,
        )
        .unwrap();
        let api = ApiConnection::from_decl("pg", &decl.config);
        let json = serde_json::to_string(&api).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"dialectName\":\"postgres\""));
        assert!(json.contains("\"type\":\"postgres\""));
    }
}
