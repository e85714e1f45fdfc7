//! `kanshictl`: the control-plane CLI. Talks to a running `kanshid` over the
//! RPC socket (spec.md §6's control CLI).

use clap::{error::ErrorKind, Parser};
use tracing::error;
use tracing_subscriber::EnvFilter;

use kanshi::error::RpcError;
use kanshi::rpc::{self, Request, Response};
use kanshi::{parser, socket};

mod cli;

fn main() {
    let args = match cli::Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            let code = if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                0
            } else {
                1
            };
            std::process::exit(code);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    std::process::exit(run(args));
}

fn run(args: cli::Args) -> i32 {
    match args.command {
        cli::Command::Dump => dump(),
        cli::Command::Reload => send(args.socket.as_deref(), Request::Reload),
        cli::Command::SetProfile { name } => send(args.socket.as_deref(), Request::SetProfile(name)),
    }
}

fn dump() -> i32 {
    let path = match parser::default_config_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "could not determine config path");
            return 1;
        }
    };
    match parser::parse_config(&path) {
        Ok(config) => {
            print!("{}", config);
            0
        }
        Err(err) => {
            error!(error = %err, "failed to parse config");
            1
        }
    }
}

fn send(socket_override: Option<&str>, request: Request) -> i32 {
    let path = match socket::socket_addr(socket_override) {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "could not determine rpc socket address");
            return 1;
        }
    };

    match rpc::call(&path, &request) {
        Ok(Response::Ok) => 0,
        Ok(Response::Err(message)) => {
            error!(message, "daemon reported an error");
            1
        }
        Err(RpcError::Connect { path, source }) => {
            error!(path = %path.display(), error = %source, "failed to reach daemon");
            1
        }
        Err(err) => {
            error!(error = %err, "rpc call failed");
            1
        }
    }
}
