//! Command line argument parsing for `kanshictl`.

use clap::{Parser, Subcommand};

/// Control a running kanshid daemon.
#[derive(Parser, Debug)]
#[clap(about = "Control a running kanshi daemon", author, version)]
pub struct Args {
    /// Override the RPC socket path instead of deriving it from the environment.
    #[clap(short = 's', long = "socket", global = true)]
    pub socket: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reparse the config and re-apply the matching profile.
    Reload,

    /// Force a profile by name on the next match attempt.
    SetProfile {
        /// Name of the profile to force.
        name: String,
    },

    /// Print the currently loaded config in kanshi's own syntax.
    Dump,
}
