use clap::Parser;
use tracing_subscriber::EnvFilter;
use twokc::cli::{commands, output, Cli, Commands, ConfigAction, SecretsAction, ServerAction, TokenAction};

fn main() {
    // Diagnostics go to stderr and are off unless RUST_LOG asks.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Secrets { action } => match action {
            SecretsAction::List => commands::secrets::list(&cli).map(|()| 0),
            SecretsAction::Add {
                reference,
                value,
                tags,
            } => commands::secrets::add(&cli, reference, value.as_deref(), tags).map(|()| 0),
            SecretsAction::Remove { uuid } => commands::secrets::remove(&cli, uuid).map(|()| 0),
        },
        Commands::Request(args) => commands::request::execute(&cli, args),
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init(&cli).map(|()| 0),
            ConfigAction::Show => commands::config_cmd::show(&cli).map(|()| 0),
        },
        Commands::Server { action } => match action {
            ServerAction::Start { foreground } => {
                commands::server_cmd::start(&cli, *foreground).map(|()| 0)
            }
            ServerAction::Stop => commands::server_cmd::stop(&cli).map(|()| 0),
            ServerAction::Status => commands::server_cmd::status(&cli).map(|()| 0),
            ServerAction::Token { action } => match action {
                TokenAction::Generate => commands::server_cmd::token_generate(&cli).map(|()| 0),
            },
        },
        Commands::Audit { last, since } => {
            commands::audit_cmd::execute(&cli, *last, since.as_deref()).map(|()| 0)
        }
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    }
}
