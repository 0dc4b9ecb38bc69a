// publisher-core/src/infrastructure/adapters/git.rs

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::PublisherError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::source::GitClient;

/// Clones through the system `git` binary so that the operator's credential
/// helpers and SSH agent apply.
#[derive(Debug, Default, Clone)]
pub struct GitCli;

#[async_trait]
impl GitClient for GitCli {
    #[instrument(skip(self, dest))]
    async fn clone_repo(
        &self,
        url: &str,
        git_ref: Option<&str>,
        dest: &Path,
    ) -> Result<(), PublisherError> {
        let mut command = Command::new("git");
        command
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(git_ref) = git_ref {
            command.arg("--branch").arg(git_ref);
        }
        // "--" keeps a hostile URL from being read as an option.
        command.arg("--").arg(url).arg(dest);

        let output = command
            .output()
            .await
            .map_err(|e| InfrastructureError::Git(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InfrastructureError::Git(format!(
                "git clone of {} failed: {}",
                url,
                stderr.trim()
            ))
            .into());
        }

        debug!(url, dest = %dest.display(), "Cloned repository");
        Ok(())
    }
}
