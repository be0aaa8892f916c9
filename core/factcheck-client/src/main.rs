//! factcheck: command-line client for the factcheck daemon.
//!
//! ## Subcommands
//!
//! - `check`: Submit a selection (argument or stdin) for fact-checking
//! - `watch`: Selection detector bridge, JSON lines on stdin and stdout
//! - `popup`: Render the current check and follow it to completion
//! - `theme`: Switch the presenter theme
//! - `status`: Show daemon health and the current check
//! - `selected`: Print the text of the current check

mod check;
mod daemon_client;
mod logging;
mod popup;
mod status;
mod watch;

use clap::{Parser, Subcommand, ValueEnum};
use factcheck_core::config;
use factcheck_protocol::Theme;
use std::io;

use daemon_client::DaemonClient;
use popup::PopupOptions;

#[derive(Parser)]
#[command(name = "factcheck")]
#[command(about = "Fact-check highlighted text")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit text for fact-checking (reads stdin when TEXT is omitted)
    Check {
        #[arg(value_name = "TEXT")]
        text: Option<String>,

        /// Stay attached and print the result when it arrives
        #[arg(long)]
        wait: bool,

        /// Disable colored output while waiting
        #[arg(long)]
        plain: bool,
    },

    /// Turn selection events on stdin into check requests
    Watch,

    /// Show the current check and follow it until it finishes
    Popup {
        /// Keep following after the check finishes
        #[arg(long)]
        follow: bool,

        /// Disable colored output
        #[arg(long)]
        plain: bool,
    },

    /// Set the presenter theme
    Theme {
        #[arg(value_enum)]
        theme: ThemeArg,
    },

    /// Show daemon health and the current check
    Status,

    /// Print the text of the current check
    Selected,
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Dark,
    Light,
}

impl From<ThemeArg> for Theme {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Light => Theme::Light,
        }
    }
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli.command) {
        tracing::error!(error = %err, "factcheck command failed");
        eprintln!("factcheck: {}", err);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), String> {
    let client = DaemonClient::from_env().map_err(|err| err.to_string())?;

    match command {
        Commands::Check { text, wait, plain } => {
            let request_id = check::run(&client, text, io::stdin().lock())?;
            if !wait {
                println!("Fact-check submitted (request {})", request_id);
                return Ok(());
            }
            let presenter = load_presenter_config();
            popup::run(
                client,
                &presenter,
                PopupOptions {
                    follow: false,
                    plain,
                },
            )
        }
        Commands::Watch => watch::run(&client, io::stdin().lock(), io::stdout().lock()),
        Commands::Popup { follow, plain } => {
            let presenter = load_presenter_config();
            popup::run(client, &presenter, PopupOptions { follow, plain })
        }
        Commands::Theme { theme } => status::set_theme(&client, theme.into(), io::stdout().lock()),
        Commands::Status => status::run(&client, io::stdout().lock()),
        Commands::Selected => status::print_selected(&client, io::stdout().lock()),
    }
}

fn load_presenter_config() -> config::PresenterConfig {
    match config::load_config(None) {
        Ok(settings) => settings.presenter,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load config; using presenter defaults");
            config::PresenterConfig::default()
        }
    }
}
