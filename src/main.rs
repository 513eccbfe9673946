use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};
use xwords_session::configuration::config::Config;
use xwords_session::configuration::types::DeviceRole;
use xwords_session::controller::controller_handler::{Action, Controller};
use xwords_session::storage::RowId;

#[derive(Parser)]
#[command(name = "xwords-session")]
#[command(version = "0.0.2")]
#[command(about = "Runs crossword game sessions against saved games")]
struct Args {
    config_file: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Make a new game and store it
    Create {
        rowid: RowId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "English")]
        dict: String,
        #[arg(long, default_value = "standalone")]
        role: DeviceRole,
    },
    /// Open a game, run commands against it (e.g. `pen_down:5,5 pen_up:5,5 commit`), then close it
    Play {
        rowid: RowId,
        #[arg(required = true)]
        cmds: Vec<String>,
    },
    /// Print a game's stored summary as JSON
    Status { rowid: RowId },
    /// Route a push payload read from a JSON file
    Push { file: PathBuf },
}

impl From<Cmd> for Action {
    fn from(cmd: Cmd) -> Self {
        match cmd {
            Cmd::Create {
                rowid,
                name,
                dict,
                role,
            } => Action::Create {
                rowid,
                name,
                dict,
                role,
            },
            Cmd::Play { rowid, cmds } => Action::Play { rowid, cmds },
            Cmd::Status { rowid } => Action::Status { rowid },
            Cmd::Push { file } => Action::Push { file },
        }
    }
}

#[tokio::main]
async fn main() {
    // Get command-line arguments
    let args = Args::parse();

    if args.config_file.is_empty() {
        eprintln!("No configuration file given");
        std::process::exit(1);
    }

    let config = match Config::from_file(Path::new(args.config_file.as_str())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG still wins over the configured level
    let level = config.level_filter().unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .init();

    info!("Configuration imported successfully");

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run(args.command.into()).await {
        error!("Error occured in the controller process: {}", e);
        std::process::exit(1);
    }
}
