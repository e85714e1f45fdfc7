//! `kanshid`: the daemon binary.

use clap::{error::ErrorKind, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wayland_client::Connection;
use wayland_protocols_wlr::output_management::v1::client::zwlr_output_manager_v1;

use kanshi::daemon::Daemon;
use kanshi::error::{KanshiError, ProtocolError};
use kanshi::parser;
use kanshi::rpc::RpcServer;
use kanshi::{eventloop, socket};

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
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    std::process::exit(run(args));
}

fn run(args: cli::Args) -> i32 {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => match parser::default_config_path() {
            Ok(path) => path,
            Err(err) => {
                error!(error = %err, "could not determine config path");
                return 1;
            }
        },
    };

    let config = match parser::parse_config(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to parse config");
            return 1;
        }
    };

    let connection = match Connection::connect_to_env() {
        Ok(conn) => conn,
        Err(err) => {
            let err = KanshiError::from(ProtocolError::from(err));
            error!(error = %err, "failed to connect to the Wayland display");
            return 1;
        }
    };

    let (globals, mut event_queue) = match wayland_client::globals::registry_queue_init::<Daemon>(&connection) {
        Ok(pair) => pair,
        Err(err) => {
            let err = KanshiError::from(ProtocolError::from(err));
            error!(error = %err, "failed to enumerate Wayland globals");
            return 1;
        }
    };
    let qh = event_queue.handle();
    let display = connection.display();

    let manager = match globals.bind::<zwlr_output_manager_v1::ZwlrOutputManagerV1, _, _>(&qh, 1..=4, ()) {
        Ok(manager) => manager,
        Err(_) => {
            let err = KanshiError::from(ProtocolError::MissingOutputManagement);
            error!(error = %err, "compositor does not support zwlr_output_manager_v1");
            return 1;
        }
    };

    let socket_path = match socket::socket_addr(args.socket.as_deref()) {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "could not determine rpc socket address");
            return 1;
        }
    };
    let rpc = match RpcServer::bind(socket_path) {
        Ok(rpc) => rpc,
        Err(err) => {
            error!(error = %err, "failed to bind rpc socket");
            return 1;
        }
    };
    let rpc_reply_socket = match rpc.try_clone_sender() {
        Ok(socket) => socket,
        Err(err) => {
            error!(error = %err, "failed to clone rpc socket for deferred replies");
            return 1;
        }
    };

    let mut daemon = Daemon::new(config, config_path, qh, display, rpc_reply_socket);
    daemon.heads.set_manager(manager);
    daemon.engine.forced_profile = args.profile.clone();
    daemon.engine.one_shot = args.once;

    if let Err(err) = event_queue.roundtrip(&mut daemon) {
        let err = KanshiError::from(ProtocolError::from(err));
        error!(error = %err, "initial Wayland roundtrip failed");
        return 1;
    }

    info!("kanshid starting");
    eventloop::run(connection, event_queue, daemon, rpc)
}
