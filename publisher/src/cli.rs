// publisher/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "publisher")]
#[command(about = "Serves semantic-model packages from local, git and object-store sources", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Directory holding publisher.config.json (or one folder per project)
    #[arg(long, global = true, env = "PUBLISHER_SERVER_ROOT", default_value = ".")]
    pub server_root: PathBuf,

    /// Working directory for materialized packages (cleared on start)
    #[arg(long, global = true, env = "PUBLISHER_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Fail when a git subpath does not exist instead of serving the whole clone
    #[arg(long, global = true)]
    pub strict_subpaths: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 📦 Loads every project and reports its status
    Projects {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// 📚 Lists the packages of a project
    Packages { project: String },

    /// 🧩 Lists the models of a package
    Models { project: String, package: String },

    /// ⚙️  Compiles one model and prints its outline
    Compile {
        project: String,
        package: String,
        /// Model path relative to the package root
        model: String,
    },

    /// 🗄️  Lists embedded data files of a package
    Databases { project: String, package: String },

    /// 🔌 Lists the connections of a project
    Connections { project: String },

    /// 🩺 Tests a connection declaration read from a JSON file
    TestConnection {
        /// Path to a JSON file holding one connection object
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use clap::Parser;

    #[test]
    fn test_cli_parse_projects_defaults() -> Result<()> {
        let args = Cli::try_parse_from(["publisher", "projects"])?;
        assert!(!args.store.strict_subpaths);
        match args.command {
            Commands::Projects { json } => {
                assert!(!json);
                Ok(())
            }
            _ => bail!("Expected Projects command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() -> Result<()> {
        let args = Cli::try_parse_from([
            "publisher",
            "compile",
            "home",
            "faa",
            "flights.malloy",
            "--server-root",
            "/srv/publisher",
            "--strict-subpaths",
        ])?;
        assert_eq!(args.store.server_root.to_string_lossy(), "/srv/publisher");
        assert!(args.store.strict_subpaths);
        match args.command {
            Commands::Compile {
                project,
                package,
                model,
            } => {
                assert_eq!(project, "home");
                assert_eq!(package, "faa");
                assert_eq!(model, "flights.malloy");
                Ok(())
            }
            _ => bail!("Expected Compile command"),
        }
    }

    #[test]
    fn test_cli_parse_test_connection() -> Result<()> {
        let args = Cli::try_parse_from(["publisher", "test-connection", "pg.json"])?;
        match args.command {
            Commands::TestConnection { file } => {
                assert_eq!(file.to_string_lossy(), "pg.json");
                Ok(())
            }
            _ => bail!("Expected TestConnection command"),
        }
    }

    #[test]
    fn test_cli_requires_package_for_models() {
        assert!(Cli::try_parse_from(["publisher", "models", "home"]).is_err());
    }
}
