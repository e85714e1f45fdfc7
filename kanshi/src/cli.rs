//! Command line argument parsing for `kanshid`.

use std::path::PathBuf;

use clap::Parser;

/// Automatically apply output configuration profiles.
#[derive(Parser, Debug)]
#[clap(about = "An automatic output configuration daemon", author, version)]
pub struct Args {
    /// Force this profile on the first match attempt.
    #[clap(short = 'p', long = "profile")]
    pub profile: Option<String>,

    /// Configure once and exit instead of running as a daemon.
    #[clap(short = '1', long = "once")]
    pub once: bool,

    /// Use this config file instead of the default search path.
    #[clap(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Override the RPC socket path instead of deriving it from the environment.
    #[clap(short = 's', long = "socket")]
    pub socket: Option<String>,
}
