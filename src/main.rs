//! gunnel command line.
//!
//! One binary, one subcommand per tunnel mode:
//! - `gunnel plain-to-tls` - accept plaintext, forward over TLS
//! - `gunnel tls-to-plain` - terminate TLS, forward plaintext
//! - `gunnel plain-to-plain` - forward plaintext unchanged
//!
//! Without a subcommand the list of modes is printed.

use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use gunnel_config::TunnelMode;
use gunnel_tunnel::{TlsTunnelArgs, TunnelArgs, TunnelError};

#[derive(Parser)]
#[command(
    name = "gunnel",
    version,
    about = "TCP tunnel daemons relaying plain or TLS traffic",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept plaintext connections and forward them over TLS.
    #[command(name = "plain-to-tls", disable_help_flag = true)]
    PlainToTls(Box<TlsTunnelArgs>),

    /// Terminate TLS connections and forward the plaintext.
    #[command(name = "tls-to-plain", disable_help_flag = true)]
    TlsToPlain(Box<TlsTunnelArgs>),

    /// Forward plaintext connections unchanged.
    #[command(name = "plain-to-plain", disable_help_flag = true)]
    PlainToPlain(TunnelArgs),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Unknown options count as a usage request.
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let result = match &cli.command {
        Some(Commands::PlainToTls(args)) => {
            gunnel_tunnel::run(TunnelMode::PlainToTls, &args.tunnel, Some(&args.tls))
        }
        Some(Commands::TlsToPlain(args)) => {
            gunnel_tunnel::run(TunnelMode::TlsToPlain, &args.tunnel, Some(&args.tls))
        }
        Some(Commands::PlainToPlain(args)) => {
            gunnel_tunnel::run(TunnelMode::PlainToPlain, args, None)
        }
        None => {
            let _ = Cli::command().print_help();
            return ExitCode::SUCCESS;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(TunnelError::Usage(text)) => {
            print!("{}", text);
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
