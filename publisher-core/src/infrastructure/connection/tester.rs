// publisher-core/src/infrastructure/connection/tester.rs

use tracing::{debug, instrument};

use crate::domain::connection::{ConnectionDecl, ConnectionStatus};
use crate::error::PublisherError;
use crate::infrastructure::connection::factory::create_project_connections;

/// Builds a single declaration in a throwaway directory and runs a live
/// round-trip. Every failure is folded into the returned status.
#[instrument(skip(decl), fields(connection = decl.display_name()))]
pub async fn test_connection_config(decl: &ConnectionDecl) -> ConnectionStatus {
    if decl.name.is_none() {
        return ConnectionStatus::failed("connection name is required");
    }

    match try_connection(decl).await {
        Ok(()) => ConnectionStatus::ok(),
        Err(e) => {
            debug!(error = %e, "Connection test failed");
            ConnectionStatus::failed(e.to_string())
        }
    }
}

async fn try_connection(decl: &ConnectionDecl) -> Result<(), PublisherError> {
    let scratch = tempfile::tempdir()?;
    let built =
        create_project_connections(std::slice::from_ref(decl), scratch.path(), scratch.path())
            .await?;
    for connection in built.connections.values() {
        connection.test().await?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionTestOutcome;

    fn decl(json: &str) -> ConnectionDecl {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_missing_name_is_a_status() {
        let status = test_connection_config(&decl(r#"{"type": "duckdb"}"#)).await;
        assert_eq!(status, ConnectionStatus::failed("connection name is required"));
    }

    #[tokio::test]
    async fn test_embedded_connection_ok() {
        let status = test_connection_config(&decl(r#"{"name": "scratch", "type": "duckdb"}"#)).await;
        assert_eq!(status.status, ConnectionTestOutcome::Ok);
        assert!(status.error_message.is_none());
    }

    #[tokio::test]
    async fn test_validation_error_becomes_failed() {
        let status = test_connection_config(&decl(r#"{"name": "duckdb", "type": "duckdb"}"#)).await;
        assert_eq!(status.status, ConnectionTestOutcome::Failed);
        assert!(status.error_message.unwrap().contains("reserved"));
    }

    #[tokio::test]
    async fn test_unreachable_server_becomes_failed() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let status = test_connection_config(&decl(&format!(
            r#"{{"name": "pg", "type": "postgres", "postgresConnection": {{"host": "127.0.0.1", "port": {}}}}}"#,
            port
        )))
        .await;
        assert_eq!(status.status, ConnectionTestOutcome::Failed);
        assert!(!status.error_message.unwrap_or_default().is_empty());
    }
}
