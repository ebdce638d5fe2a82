mod cli;
mod committer;
mod db;
mod error;
mod fmt;
mod importer;
mod logging;
mod mapper;
mod models;
mod normalizer;
mod ofx;
mod session;
mod settings;
mod validator;

use clap::Parser;

use cli::{AccountsCommands, Cli, Commands};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Init {
            data_dir,
            tenant,
            branch,
        } => cli::init::run(data_dir, tenant, branch),
        Commands::Accounts { command } => match command {
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Inspect {
            source,
            account,
            rows,
        } => cli::inspect::run(&source, account.as_deref(), rows),
        Commands::Import(args) => cli::import::run(&args),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
