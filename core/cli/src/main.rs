//! playwatch: command-line client for the playwatch daemon.
//!
//! Every subcommand is one (or, for `alerts set`, two) IPC calls. The
//! response `data` is printed as pretty JSON on stdout; failures go to stderr
//! as `code: message` with exit status 1.

mod commands;
mod daemon_client;
mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use commands::AlertOverrides;
use daemon_client::ClientError;
use playwatch_daemon_protocol::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "playwatch")]
#[command(about = "Game-play time monitor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or resume monitoring
    Start {
        #[arg(long = "user", value_name = "ID")]
        user: Option<i64>,
    },

    /// Pause monitoring, keeping elapsed time
    Pause,

    /// Stop monitoring and record the session
    Stop {
        #[arg(long = "user", value_name = "ID")]
        user: Option<i64>,
    },

    /// Show live monitor state and lifetime totals
    Status {
        #[arg(long = "user", value_name = "ID")]
        user: Option<i64>,
    },

    /// List recent game sessions
    History {
        #[arg(long = "user", value_name = "ID")]
        user: i64,

        #[arg(long, value_name = "N")]
        limit: Option<u32>,
    },

    /// Alert settings, log and test delivery
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },

    /// Show whether outbound mail is configured
    MailStatus,

    /// Check that the daemon is up
    Health,
}

#[derive(Subcommand)]
enum AlertCommands {
    /// Show alert settings
    Settings {
        #[arg(long = "user", value_name = "ID")]
        user: i64,
    },

    /// Change alert settings; unspecified fields are kept
    Set {
        #[arg(long = "user", value_name = "ID")]
        user: i64,

        #[arg(long)]
        email: Option<Toggle>,

        #[arg(long)]
        sms: Option<Toggle>,

        #[arg(long, value_name = "P")]
        phone: Option<String>,

        #[arg(long = "on-detect")]
        on_detect: Option<Toggle>,

        /// Minutes of play before a threshold alert (0 disables)
        #[arg(long, value_name = "MIN")]
        threshold: Option<u32>,
    },

    /// Show sent alerts, newest first
    Log {
        #[arg(long = "user", value_name = "ID")]
        user: i64,

        #[arg(long, value_name = "N")]
        limit: Option<u32>,
    },

    /// Send a test alert over the enabled channels
    Test {
        #[arg(long = "user", value_name = "ID")]
        user: i64,

        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(value: Toggle) -> Self {
        value == Toggle::On
    }
}

fn run(command: Commands) -> Result<Value, ClientError> {
    match command {
        Commands::Start { user } => commands::monitor(Method::MonitorStart, user),
        Commands::Pause => commands::monitor(Method::MonitorPause, None),
        Commands::Stop { user } => commands::monitor(Method::MonitorStop, user),
        Commands::Status { user } => commands::monitor(Method::MonitorStatus, user),
        Commands::History { user, limit } => commands::history(user, limit),
        Commands::Alerts { command } => match command {
            AlertCommands::Settings { user } => commands::alert_settings(user),
            AlertCommands::Set {
                user,
                email,
                sms,
                phone,
                on_detect,
                threshold,
            } => {
                let overrides = AlertOverrides {
                    email_enabled: email.map(bool::from),
                    sms_enabled: sms.map(bool::from),
                    phone_number: phone,
                    alert_on_detect: on_detect.map(bool::from),
                    threshold_minutes: threshold,
                };
                commands::set_alert_settings(user, &overrides)
            }
            AlertCommands::Log { user, limit } => commands::alert_log(user, limit),
            AlertCommands::Test { user, name } => commands::test_alert(user, name),
        },
        Commands::MailStatus => commands::mail_status(),
        Commands::Health => commands::health(),
    }
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(data) => match serde_json::to_string_pretty(&data) {
            Ok(text) => println!("{}", text),
            Err(err) => {
                eprintln!("invalid_response: {}", err);
                std::process::exit(1);
            }
        },
        Err(err) => {
            tracing::error!(error = %err, "playwatch command failed");
            match &err {
                ClientError::Daemon { .. } => eprintln!("{}", err),
                _ => eprintln!("daemon_unavailable: {}", err),
            }
            std::process::exit(1);
        }
    }
}
