/*
 * Created on Mon Nov 06 2023
 *
 * This file is a part of Pharos
 * Pharos is a free and open-source real-time publish/subscribe server that
 * exposes a hierarchical namespace of binary resources to many concurrent
 * clients, with periodic on-disk snapshots of the full tree.
 *
 * Copyright (c) 2023, The Pharos authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The transport
//!
//! A plain TCP listener speaking length-prefixed msgpack frames: a 4-byte
//! big-endian length followed by one request map. Each accepted connection
//! gets a reader task (which drives dispatch, one request at a time, in
//! arrival order) and a writer task owning the write half, so response
//! frames from the dispatcher and from stream forwarders interleave
//! atomically frame-at-a-time.
//!
//! Shutdown is two channels wide: a broadcast tells every long-running task
//! to wind down, and a drain channel — one clone per connection — lets
//! [`Listener::shut_down`] wait until the last handler has finished its
//! final request.

mod connection;


use self::connection::ConnectionHandler;
use crate::config::ConfigurationSet;
use crate::dispatch::DispatchContext;
use crate::util::{Error, PharosResult};
use crate::IoResult;
use std::{sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc, Semaphore},
    time,
};

/// How many connections may be open at once
pub const MAX_CONNECTIONS: usize = 50000;

/// A handle on the shutdown broadcast that remembers having heard it, so a
/// task can keep asking after the channel is spent
pub struct Shutdown {
    fired: bool,
    signal: broadcast::Receiver<()>,
}

impl Shutdown {
    pub const fn new(signal: broadcast::Receiver<()>) -> Self {
        Shutdown {
            fired: false,
            signal,
        }
    }
    pub const fn already_requested(&self) -> bool {
        self.fired
    }
    /// Resolve once shutdown is requested, immediately if it already was.
    /// The last sender going away counts as a request too
    pub async fn wait(&mut self) {
        if self.fired {
            return;
        }
        let _ = self.signal.recv().await;
        self.fired = true;
    }
}

/// Pacing for a failing accept loop: each miss doubles the pause, and once
/// the pause outgrows [`AcceptRetry::GIVE_UP_AT`] the socket is considered
/// hopeless
struct AcceptRetry {
    pause: Duration,
}

impl AcceptRetry {
    const FIRST_PAUSE: Duration = Duration::from_secs(1);
    const GIVE_UP_AT: Duration = Duration::from_secs(128);
    const fn new() -> Self {
        Self {
            pause: Self::FIRST_PAUSE,
        }
    }
    async fn pause(&mut self) {
        time::sleep(self.pause).await;
        self.pause *= 2;
    }
    fn hopeless(&self) -> bool {
        self.pause > Self::GIVE_UP_AT
    }
}

/// Framing and buffering knobs handed to every connection
#[derive(Debug, Clone, Copy)]
pub struct NetOpts {
    pub read_buffer: usize,
    pub write_buffer: usize,
    pub read_limit: usize,
}

impl NetOpts {
    fn from_config(cfg: &ConfigurationSet) -> Self {
        Self {
            read_buffer: if cfg.read_buffer == 0 {
                libpharos::BUF_CAP
            } else {
                cfg.read_buffer
            },
            write_buffer: if cfg.write_buffer == 0 {
                libpharos::BUF_CAP
            } else {
                cfg.write_buffer
            },
            read_limit: cfg.read_limit,
        }
    }
}

/// The server's one listener: the bound socket plus everything a connection
/// handler is born with
pub struct Listener {
    ctx: Arc<DispatchContext>,
    socket: TcpListener,
    /// connection slots; a handler gives its slot back on drop
    climit: Arc<Semaphore>,
    /// the shutdown broadcaster connections subscribe to
    signal: broadcast::Sender<()>,
    /// every connection carries a clone of `drain_tx`; once shutdown begins
    /// and the last clone drops, `drain_rx` resolves
    drain_tx: mpsc::Sender<()>,
    drain_rx: mpsc::Receiver<()>,
    opts: NetOpts,
}

impl Listener {
    /// The address the listener actually bound; differs from the configured
    /// one when the port was 0
    pub fn local_addr(&self) -> IoResult<std::net::SocketAddr> {
        self.socket.local_addr()
    }
    /// Accept one connection, riding out transient socket errors with a
    /// growing pause
    async fn accept(&mut self) -> IoResult<(TcpStream, std::net::SocketAddr)> {
        let mut retry = AcceptRetry::new();
        loop {
            match self.socket.accept().await {
                Ok(conn) => return Ok(conn),
                Err(e) if retry.hopeless() => return Err(e),
                Err(_) => retry.pause().await,
            }
        }
    }
    /// Run the accept loop until shutdown begins
    pub async fn run_server(&mut self) -> IoResult<()> {
        loop {
            // claim a connection slot up front and leak the permit: the
            // handler's Drop hands it back, panics included
            self.climit
                .acquire()
                .await
                .expect("the connection semaphore is never closed")
                .forget();
            // a hopeless socket is not a reason to kill the server, and
            // per-accept error logging would drown the log on a flaky
            // interface; quietly try again
            let Ok((stream, addr)) = self.accept().await else {
                continue;
            };
            log::debug!("incoming connection from {addr}");
            let mut chandle = ConnectionHandler::new(
                self.ctx.clone(),
                stream,
                addr,
                self.opts,
                self.climit.clone(),
                Shutdown::new(self.signal.subscribe()),
                self.drain_tx.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = chandle.run().await {
                    log::error!("connection {addr} ended with an I/O error: {e}");
                }
            });
        }
    }
    /// Stop accepting and wait for every connection handler to finish its
    /// last request. The caller has already dropped its own shutdown
    /// sender; this drops the listener's and then sits on the drain channel
    /// until the final connection lets go
    pub async fn shut_down(self) {
        let Self {
            signal,
            drain_tx,
            mut drain_rx,
            ..
        } = self;
        drop(signal);
        drop(drain_tx);
        let _ = drain_rx.recv().await;
    }
}

/// Bind the transport and hand back the listener, ready to run
pub async fn connect(
    cfg: &ConfigurationSet,
    ctx: Arc<DispatchContext>,
    signal: broadcast::Sender<()>,
) -> PharosResult<Listener> {
    let (drain_tx, drain_rx) = mpsc::channel(1);
    let socket = TcpListener::bind((cfg.host, cfg.port))
        .await
        .map_err(|e| Error::ioerror_extra(e, format!("binding to port {}", cfg.port)))?;
    let server = Listener {
        ctx,
        socket,
        climit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        signal,
        drain_tx,
        drain_rx,
        opts: NetOpts::from_config(cfg),
    };
    log::info!("Server started on pharos://{}", server.local_addr()?);
    Ok(server)
}
