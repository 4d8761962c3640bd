//! Courier client binary.
//!
//! # Usage
//!
//! ```bash
//! # One message
//! courier -url localhost:4500 -eid client-1 -msg hello
//!
//! # Interactive session with key exchange
//! courier -int true -url localhost:4500 -eid client-1 -kx JWE_LADDER -kxm PSK
//!
//! # Print the manual
//! courier help
//! ```

use std::process::ExitCode;

use clap::Parser;
use courier_client::{Console, SystemEnv, TcpSessionFactory, run};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Courier messaging client
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Courier secure messaging client")]
#[command(version)]
#[command(disable_help_flag = true)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Client options as `-name value` pairs, or `help`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    options: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let factory = TcpSessionFactory::new(SystemEnv::new());
    let stdin = BufReader::new(tokio::io::stdin());
    let status = run(args.options, factory, Console::stdio(), stdin).await;

    ExitCode::from(status.code())
}
