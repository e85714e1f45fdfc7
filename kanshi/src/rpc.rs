//! RPC service (C7): `Reload` and `SetProfile`, spec.md §4.6. Wire format is
//! a `serde`+`bincode`-encoded enum over a `UnixDatagram`; `kanshictl` is
//! the client half, `RpcServer` the daemon's half.

use std::io;
use std::os::unix::io::{AsFd, BorrowedFd};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wayland_client::protocol::wl_callback;
use wayland_client::{Connection, Dispatch, QueueHandle};

use crate::daemon::Daemon;
use crate::error::RpcError;

const MAX_MESSAGE: usize = 4096;
const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    Reload,
    SetProfile(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Err(String),
}

/// The client half, used by `kanshictl`. Binds an ephemeral reply socket
/// (datagram sockets need an address to receive a reply at) next to the
/// daemon's, since kanshi's RPC isn't connection-oriented.
pub fn call(socket_path: &Path, request: &Request) -> Result<Response, RpcError> {
    let reply_path = PathBuf::from(format!("{}.reply.{}", socket_path.display(), std::process::id()));
    let _ = std::fs::remove_file(&reply_path);
    let socket = UnixDatagram::bind(&reply_path).map_err(|source| RpcError::Connect {
        path: reply_path.clone(),
        source,
    })?;
    socket
        .set_read_timeout(Some(CLIENT_TIMEOUT))
        .map_err(RpcError::Transport)?;

    let payload = bincode::serialize(request)?;
    let result = (|| -> Result<Response, RpcError> {
        socket.send_to(&payload, socket_path).map_err(|source| RpcError::Connect {
            path: socket_path.to_path_buf(),
            source,
        })?;
        let mut buf = [0u8; MAX_MESSAGE];
        let n = socket.recv(&mut buf).map_err(RpcError::Transport)?;
        Ok(bincode::deserialize(&buf[..n])?)
    })();

    let _ = std::fs::remove_file(&reply_path);
    result
}

/// The daemon's half: a bound, non-blocking datagram socket the event loop
/// polls directly (spec.md §4.7 step 5).
pub struct RpcServer {
    socket: UnixDatagram,
    path: PathBuf,
}

impl RpcServer {
    pub fn bind(path: PathBuf) -> Result<Self, RpcError> {
        let _ = std::fs::remove_file(&path);
        let socket = UnixDatagram::bind(&path).map_err(|source| RpcError::Connect {
            path: path.clone(),
            source,
        })?;
        socket.set_nonblocking(true).map_err(RpcError::Transport)?;
        Ok(RpcServer { socket, path })
    }

    pub fn socket(&self) -> &UnixDatagram {
        &self.socket
    }

    /// A sender-only clone of this socket, given to [`Daemon`] so a reply
    /// deferred behind a `wl_display.sync` round trip (see
    /// [`PendingReloadReply`]) can be sent from its callback, independent of
    /// the event loop's `drain`-owned handle.
    pub fn try_clone_sender(&self) -> Result<UnixDatagram, RpcError> {
        self.socket.try_clone().map_err(RpcError::Transport)
    }

    /// Drains every pending datagram, dispatching each to `daemon` and
    /// replying on the sender's (bound) address. Call when the socket is
    /// reported readable.
    pub fn drain(&self, daemon: &mut Daemon) {
        let mut buf = [0u8; MAX_MESSAGE];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, addr)) => self.handle(daemon, &buf[..n], addr.as_pathname()),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(error = %err, "rpc socket read error");
                    break;
                }
            }
        }
    }

    fn handle(&self, daemon: &mut Daemon, payload: &[u8], reply_to: Option<&Path>) {
        let Some(reply_to) = reply_to else {
            warn!("rpc client did not bind a reply address");
            return;
        };

        match bincode::deserialize::<Request>(payload) {
            Ok(Request::Reload) => {
                info!("rpc: reload requested");
                daemon.reload();
                // Spec.md §4.6: reply only after the reconfigure attempt
                // reload() may have just submitted has made a round trip to
                // the compositor, mirroring original_source/ipc.c's
                // wl_display_sync + reload_config_done. The reply is sent
                // from PendingReloadReply's Dispatch impl below once this
                // callback fires, not here.
                daemon
                    .display
                    .sync(&daemon.qh, PendingReloadReply(reply_to.to_path_buf()));
            }
            Ok(Request::SetProfile(name)) => {
                info!(profile = %name, "rpc: set-profile requested");
                daemon.engine.forced_profile = Some(name);
                if let Some(serial) = daemon.heads.serial() {
                    daemon.try_match_and_apply(serial);
                }
                self.reply(reply_to, &Response::Ok);
            }
            Err(err) => self.reply(reply_to, &Response::Err(format!("malformed request: {err}"))),
        }
    }

    fn reply(&self, reply_to: &Path, response: &Response) {
        if let Ok(bytes) = bincode::serialize(response) {
            if let Err(err) = self.socket.send_to(&bytes, reply_to) {
                warn!(error = %err, "failed to send rpc reply");
            }
        }
    }
}

/// User data tagging a `wl_display.sync` callback queued for a deferred
/// `Reload` reply. When its `done` event fires, the compositor has
/// processed every request `reload()` submitted, so the reply goes out
/// through [`Daemon::rpc_reply_socket`] rather than the [`RpcServer`]'s
/// `drain`-owned socket.
pub struct PendingReloadReply(PathBuf);

impl Dispatch<wl_callback::WlCallback, PendingReloadReply> for Daemon {
    fn event(
        state: &mut Self,
        _proxy: &wl_callback::WlCallback,
        event: wl_callback::Event,
        data: &PendingReloadReply,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let wl_callback::Event::Done { .. } = event else {
            return;
        };
        let Ok(bytes) = bincode::serialize(&Response::Ok) else {
            return;
        };
        if let Err(err) = state.rpc_reply_socket.send_to(&bytes, &data.0) {
            warn!(error = %err, "failed to send deferred reload rpc reply");
        }
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl AsFd for RpcServer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.socket.as_fd()
    }
}
