use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "vitalink-cli", version, about = "Vitalink CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patient management
    Patient {
        #[command(subcommand)]
        action: commands::patient::PatientAction,
    },
    /// Inbound message handling
    Inbound {
        #[command(subcommand)]
        action: commands::inbound::InboundAction,
    },
    /// Daily check-in control
    Checkin {
        #[command(subcommand)]
        action: commands::checkin::CheckinAction,
    },
    /// Scheduled message dispatch
    Dispatch {
        #[command(subcommand)]
        action: commands::dispatch::DispatchAction,
    },
    /// Community activity recording
    Community {
        #[command(subcommand)]
        action: commands::community::CommunityAction,
    },
    /// Protocol assignment management
    Protocol {
        #[command(subcommand)]
        action: commands::protocol::ProtocolAction,
    },
    /// Streak maintenance
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Patient { action } => commands::patient::run(action),
        Commands::Inbound { action } => commands::inbound::run(action),
        Commands::Checkin { action } => commands::checkin::run(action),
        Commands::Dispatch { action } => commands::dispatch::run(action),
        Commands::Community { action } => commands::community::run(action),
        Commands::Protocol { action } => commands::protocol::run(action),
        Commands::Streak { action } => commands::streak::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
