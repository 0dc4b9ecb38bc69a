// publisher/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use publisher_core::PublisherError;

#[tokio::main]
async fn main() {
    // Logs go to stderr so table and JSON output stay clean on stdout.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        // Store errors carry codes and help text; render them with miette.
        match e.downcast_ref::<PublisherError>() {
            Some(err) => eprintln!("{:?}", miette::Report::new(err.clone())),
            None => eprintln!("❌ {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Projects { json } => commands::projects::execute(&cli.store, json).await,
        Commands::Packages { project } => commands::packages::execute(&cli.store, &project).await,
        Commands::Models { project, package } => {
            commands::models::list(&cli.store, &project, &package).await
        }
        Commands::Compile {
            project,
            package,
            model,
        } => commands::models::compile(&cli.store, &project, &package, &model).await,
        Commands::Databases { project, package } => {
            commands::databases::execute(&cli.store, &project, &package).await
        }
        Commands::Connections { project } => {
            commands::connections::list(&cli.store, &project).await
        }
        Commands::TestConnection { file } => commands::connections::test(&file).await,
    }
}
