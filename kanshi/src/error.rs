//! Error types for every fallible subsystem, aggregated into [`KanshiError`].

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}:{line}:{column}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to expand include pattern {pattern:?}: {source}")]
    WordExpand {
        pattern: String,
        source: wordexp::WordexpError,
    },

    #[error("HOME is not set and XDG_CONFIG_HOME is not set")]
    NoHome,

    #[error("include depth limit ({limit}) exceeded")]
    IncludeDepth { limit: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to connect to the Wayland display: {0}")]
    Connect(#[from] wayland_client::ConnectError),

    #[error("failed to enumerate Wayland globals: {0}")]
    Enumerate(#[from] wayland_client::globals::GlobalError),

    #[error("the compositor does not advertise zwlr_output_manager_v1")]
    MissingOutputManagement,

    #[error("wire transport error: {0}")]
    Transport(#[from] wayland_client::backend::WaylandError),

    #[error("event dispatch failed: {0}")]
    Dispatch(#[from] wayland_client::DispatchError),

    #[error("unsupported mode requested: {width}x{height}@{refresh}mHz")]
    UnsupportedMode {
        width: i32,
        height: i32,
        refresh: i32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("could not determine RPC socket address: {0}")]
    Address(String),

    #[error("failed to connect to daemon socket {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    #[error("transport error talking to daemon: {0}")]
    Transport(#[from] io::Error),

    #[error("malformed RPC message: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("daemon reported an error: {0}")]
    Remote(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("failed to fork for hook execution: {0}")]
    Fork(#[source] nix::Error),

    #[error("failed to exec hook shell: {0}")]
    Exec(#[source] nix::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum KanshiError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
