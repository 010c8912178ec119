mod cli;
mod db;
mod dedup;
mod error;
mod fmt;
mod importer;
mod models;
mod parse;
mod prices;
mod reconcile;
mod settings;
mod snapshot;
mod storage;

use clap::Parser;

use cli::{AccountsCommands, Cli, Commands, PricesCommands, ReviewCommands, SnapshotCommands};

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_level.to_string()),
    )
    .init();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                account_type,
                institution,
                last_four,
                balance,
                user,
            } => cli::accounts::add(
                &name,
                &account_type,
                institution.as_deref(),
                last_four.as_deref(),
                balance,
                user,
            ),
            AccountsCommands::List { user } => cli::accounts::list(user),
        },
        Commands::Import {
            file,
            institution,
            account,
            user,
        } => cli::import::run(&file, &institution, account, user),
        Commands::Snapshot { command } => match command {
            SnapshotCommands::Run {
                date,
                user,
                skip_weekends,
                with_prices,
                delay_ms,
            } => cli::snapshot::run(date.as_deref(), user, skip_weekends, with_prices, delay_ms),
        },
        Commands::Prices { command } => match command {
            PricesCommands::Refresh { user, delay_ms } => cli::prices::refresh(user, delay_ms),
        },
        Commands::Review { command } => match command {
            ReviewCommands::List { user } => cli::review::list(user),
        },
        Commands::Networth { from, to, user } => {
            cli::networth::run(from.as_deref(), to.as_deref(), user)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
