//! Top-level daemon state: ties the head registry, config, and transaction
//! engine together. The `Dispatch` impls in [`crate::head`] and
//! [`crate::transaction`] all mutate `Daemon` directly.

use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

use tracing::{info, warn};
use wayland_client::globals::GlobalListContents;
use wayland_client::protocol::{wl_display, wl_registry};
use wayland_client::{Connection, Dispatch, QueueHandle};

use crate::config::Config;
use crate::head::HeadRegistry;
use crate::matcher::{self, Candidate};
use crate::transaction::Engine;

pub struct Daemon {
    pub heads: HeadRegistry,
    pub config: Config,
    pub config_path: PathBuf,
    pub engine: Engine,
    pub qh: QueueHandle<Daemon>,
    /// The connection's display object, used to queue a `sync` request so a
    /// deferred RPC reply (spec.md §4.6's `Reload`) can wait for a
    /// compositor round trip. See [`crate::rpc::PendingReloadReply`].
    pub display: wl_display::WlDisplay,
    /// A sender-only clone of the RPC socket, used to answer a reply that
    /// was deferred behind a `wl_display.sync` round trip.
    pub rpc_reply_socket: UnixDatagram,
    /// Set once the daemon has decided to exit; the event loop checks this
    /// after every dispatch and terminates with this code (spec.md §6).
    pub exit_code: Option<i32>,
}

impl Daemon {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        qh: QueueHandle<Daemon>,
        display: wl_display::WlDisplay,
        rpc_reply_socket: UnixDatagram,
    ) -> Self {
        Daemon {
            heads: HeadRegistry::new(),
            config,
            config_path,
            engine: Engine::new(),
            qh,
            display,
            rpc_reply_socket,
            exit_code: None,
        }
    }

    /// Called from the `zwlr_output_manager_v1` `done` handler: the head
    /// registry now reflects a consistent snapshot at `serial`.
    pub fn on_topology_settled(&mut self, serial: u32) {
        if self.engine.pending.is_some() {
            // A transaction is already in flight; spec.md §4.4 allows at
            // most one at a time. It will re-match once that one resolves.
            return;
        }
        self.try_match_and_apply(serial);
    }

    /// Re-runs the matcher and, if it selects a new profile, builds and
    /// submits a transaction. Consumes `engine.forced_profile` regardless of
    /// whether it actually matched (spec.md §4.6: "on the next match
    /// attempt").
    pub fn try_match_and_apply(&mut self, serial: u32) {
        let candidates: Vec<Candidate<crate::head::HeadId>> = self
            .heads
            .heads()
            .map(|(id, head)| Candidate {
                id,
                name: &head.name,
                description: &head.description,
            })
            .collect();

        let forced = self.engine.forced_profile.take();
        let matched = if let Some(name) = &forced {
            self.config
                .profiles
                .iter()
                .find(|p| &p.name == name)
                .and_then(|p| matcher::find_profile(std::slice::from_ref(p), &candidates))
        } else {
            matcher::find_profile(&self.config.profiles, &candidates)
        };

        let Some((matched_profile, _)) = matched else {
            info!("no profile matched");
            if self.engine.one_shot {
                self.exit_code = Some(1);
            }
            return;
        };

        // Re-match against an owned clone so `assignment` below doesn't keep
        // `self.config` borrowed across the `&mut self` call to `submit`.
        let profile = matched_profile.clone();
        let (_, assignment) = matcher::find_profile(std::slice::from_ref(&profile), &candidates)
            .expect("a profile that just matched must match again against its own clone");

        if !self.engine.should_apply(&profile.name, &assignment, &self.heads) {
            return;
        }

        match crate::transaction::submit(self, &assignment, serial) {
            Ok(()) => {
                self.engine.pending = Some(crate::transaction::Pending {
                    profile: profile.clone(),
                });
            }
            Err(err) => {
                warn!(profile = %profile.name, error = %err, "transaction aborted before apply");
                if self.engine.one_shot {
                    self.exit_code = Some(1);
                }
            }
        }
    }

    /// SIGHUP / RPC `Reload`: reparse the config and re-run the matcher
    /// against the unchanged head set (spec.md §8 scenario S6).
    pub fn reload(&mut self) {
        match crate::parser::parse_config(&self.config_path) {
            Ok(config) => {
                self.config = config;
                self.engine.current = None;
                self.engine.pending = None;
                info!(path = %self.config_path.display(), "config reloaded");
                if let Some(serial) = self.heads.serial() {
                    self.try_match_and_apply(serial);
                }
            }
            Err(err) => warn!(error = %err, "failed to reload config"),
        }
    }
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for Daemon {
    fn event(
        _state: &mut Self,
        _proxy: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Output management globals don't come and go at runtime in
        // practice; the initial registry snapshot from
        // `registry_queue_init` is all this daemon needs.
    }
}
