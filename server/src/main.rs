/*
 * Created on Mon Nov 20 2023
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

//! # Pharos
//!
//! The `pharosd` crate is the Pharos server: a hierarchical namespace of
//! binary resources served over a framed msgpack protocol with streaming
//! subscriptions, resource links and periodic snapshots. See the individual
//! modules for their documentation.

use crate::config::ConfigurationSet;
use crate::dispatch::{DispatchContext, DispatchOpts};
use crate::namespace::Namespace;
use crate::net::Shutdown;
use crate::services::snapshot::SnapshotService;
use crate::util::PharosResult;
use env_logger::Builder;
use libpharos::util::terminal;
use std::{env, process, sync::Arc};
use tokio::sync::broadcast;

mod actions;
mod auth;
mod client;
mod config;
mod dispatch;
mod namespace;
mod net;
mod protocol;
mod resource;
mod services;
mod storage;
mod util;
#[cfg(test)]
mod tests;

/// A generic I/O result
pub type IoResult<T> = std::io::Result<T>;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
use jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
#[global_allocator]
/// Jemallocator - the default memory allocator for platforms other than msvc
static GLOBAL: Jemalloc = Jemalloc;

fn main() {
    Builder::new()
        .parse_filters(&env::var("PHAROS_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    println!("Pharos v{} | {}", libpharos::VERSION, libpharos::URL);
    let cfg = match config::get_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("{}", e);
            process::exit(0x100);
        }
    };
    util::set_verbose(cfg.verbose);
    // Start the server which asynchronously waits for a termination signal
    // and then safely shuts everything down
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("server")
        .enable_all()
        .build()
        .expect("failed to build the runtime");
    let result = runtime.block_on(run(cfg));
    // make sure all background workers terminate
    drop(runtime);
    if let Err(e) = result {
        log::error!("Server failed with: {}", e);
        process::exit(0x100);
    }
    terminal::write_info("Goodbye :)\n").unwrap();
}

#[cfg(unix)]
use core::{future::Future, pin::Pin, task::Context, task::Poll};
#[cfg(unix)]
use tokio::signal::unix::{signal as fnsignal, Signal, SignalKind};
#[cfg(unix)]
/// Object to bind to unix-specific signals
pub struct UnixTerminationSignal {
    sigterm: Signal,
}

#[cfg(unix)]
impl UnixTerminationSignal {
    pub fn init() -> PharosResult<Self> {
        let sigterm = fnsignal(SignalKind::terminate())
            .map_err(|e| util::Error::ioerror_extra(e, "binding to SIGTERM"))?;
        Ok(Self { sigterm })
    }
}

#[cfg(unix)]
impl Future for UnixTerminationSignal {
    type Output = Option<()>;

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        self.sigterm.poll_recv(ctx)
    }
}

/// Start the server, wait for incoming connections or a termsig, then shut
/// down in order: stop accepting, drain connections, final snapshot
async fn run(cfg: ConfigurationSet) -> PharosResult<()> {
    // initialize the broadcast channel
    let (signal, _) = broadcast::channel(1);

    let namespace = Arc::new(Namespace::new());
    if storage::unflush::restore(&namespace, &cfg.snapshot.path)? {
        log::info!("Restored namespace from {}", cfg.snapshot.path);
        if util::verbose() {
            match namespace.pretty_print(&[]) {
                Ok(rendered) => log::info!("restored tree:\n{rendered}"),
                Err(e) => log::warn!("could not render the restored tree: {e}"),
            }
        }
    } else {
        log::info!("No snapshot found, starting with an empty namespace");
    }

    let auth = auth::new_provider(&cfg.auth, &signal)?;
    let ctx = DispatchContext::new(
        namespace.clone(),
        auth,
        DispatchOpts {
            stream_queue_size: cfg.stream_queue_size,
        },
    );

    // initialize the background services
    let snapshotter = SnapshotService::spawn(
        namespace.clone(),
        cfg.snapshot.clone(),
        Shutdown::new(signal.subscribe()),
    );
    log::info!(
        "Started automatic snapshotting to {} every {:?}",
        cfg.snapshot.path,
        cfg.snapshot.every
    );

    // bind the ctrlc handler
    let sig = tokio::signal::ctrl_c();

    // start the listener
    let mut server = net::connect(&cfg, ctx, signal.clone()).await?;

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = server.run_server() => {}
            _ = sig => {}
        }
    }
    #[cfg(unix)]
    {
        // apart from ctrl-c, the only other thing we care about is SIGTERM
        let sigterm = UnixTerminationSignal::init()?;
        tokio::select! {
            _ = server.run_server() => {},
            _ = sig => {},
            _ = sigterm => {}
        }
    }

    log::info!("Signalling all workers to shut down");
    // drop the signal and let the others exit
    drop(signal);
    server.shut_down().await;
    log::info!("Stopped accepting incoming connections");

    // the snapshotter takes its final snapshot on the way out
    snapshotter.stop_and_wait().await;
    Ok(())
}
