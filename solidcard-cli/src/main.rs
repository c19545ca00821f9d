use clap::{Parser, Subcommand};
use colored::Colorize;
use solidcard_lib::{CoreConfig, Error, FileSessionStore, Identifier, StoreError};
use sysexits::ExitCode;
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod profile;
mod session;

#[derive(Parser, Debug)]
#[command(name = "solidcard")]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Operate on this WebID instead of the logged in one
    #[arg(short, long, global = true)]
    webid: Option<Identifier>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Store the credentials for a WebID
    Login {
        #[arg(value_name = "WEBID")]
        user: Identifier,
        /// Access token issued by the identity provider
        #[arg(long)]
        token: Option<String>,
    },
    /// Forget the stored credentials
    Logout,
    /// Operate on the profile
    #[command(subcommand)]
    Profile(profile::Command),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Human friendly panicking in release mode
    human_panic::setup_panic!();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set up logging");
    }

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::Ok,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            exit_code(&e)
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let cfg = CoreConfig::load()?;
    let sessions = FileSessionStore::new()?;
    debug!("Using session file {}", sessions.path().display());

    match cli.command {
        Command::Login { user, token } => session::login(&sessions, user, token),
        Command::Logout => session::logout(&sessions).await,
        Command::Profile(cmd) => profile::handle(&cfg, &sessions, cli.webid, cmd).await,
    }
}

fn exit_code(e: &Error) -> ExitCode {
    match e {
        Error::Store(store) => match store {
            StoreError::Network(_) => ExitCode::Unavailable,
            StoreError::Permission(_) => ExitCode::NoPerm,
            StoreError::NotFound(_) => ExitCode::NoInput,
            StoreError::Validation(_) | StoreError::Malformed(_) => ExitCode::DataErr,
            StoreError::Server(_) => ExitCode::Protocol,
        },
        Error::Identifier(_) => ExitCode::Usage,
        Error::NoSession => ExitCode::NoUser,
        Error::Deserialize { .. } | Error::Serialize(_) => ExitCode::Config,
        Error::Io(_) => ExitCode::IoErr,
        Error::Http(_) => ExitCode::Software,
    }
}
