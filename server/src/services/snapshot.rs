/*
 * Created on Thu Nov 16 2023
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

//! The snapshot scheduler: dumps the tree to disk on a fixed interval and
//! once more, synchronously, at shutdown. A failed periodic dump is logged
//! and the loop keeps going; the final dump is retried until it lands,
//! since it is the last chance the data gets.

use crate::config::SnapshotConfig;
use crate::namespace::Namespace;
use crate::net::Shutdown;
use crate::storage::flush;
use std::{fs::File, sync::Arc};
use tokio::{task::JoinHandle, time};

const FINAL_SNAPSHOT_RETRY: time::Duration = time::Duration::from_secs(10);

pub struct SnapshotService {
    handle: JoinHandle<()>,
}

impl SnapshotService {
    /// Start the scheduler. It stops once the shutdown broadcast fires (or
    /// every sender is gone)
    pub fn spawn(namespace: Arc<Namespace>, cfg: SnapshotConfig, shutdown: Shutdown) -> Self {
        Self {
            handle: tokio::spawn(snapshot_loop(namespace, cfg, shutdown)),
        }
    }
    /// Wait until the service has performed its final snapshot and exited.
    /// Termination must already have been requested through the shutdown
    /// broadcast this service was spawned with
    pub async fn stop_and_wait(self) {
        let _ = self.handle.await;
    }
}

async fn snapshot_loop(namespace: Arc<Namespace>, cfg: SnapshotConfig, mut shutdown: Shutdown) {
    let mut file = match flush::open_snapshot_file(&cfg.path) {
        Ok(file) => file,
        Err(e) => {
            log::error!("could not open the snapshot file: {e}; snapshots are disabled");
            return;
        }
    };
    loop {
        tokio::select! {
            // sleep until `every` from the current time instant
            _ = time::sleep_until(time::Instant::now() + cfg.every) => {
                let (returned, result) = write_snapshot(file, &namespace).await;
                file = returned;
                if let Err(e) = result {
                    log::error!("snapshot failed: {e}");
                }
            }
            // otherwise wait for a notification to quit
            _ = shutdown.wait() => break,
        }
    }
    // the last snapshot before shutdown; keep trying until it lands
    loop {
        let (returned, result) = write_snapshot(file, &namespace).await;
        file = returned;
        match result {
            Ok(()) => {
                log::info!("Created snapshot before shutdown");
                break;
            }
            Err(e) => {
                log::error!(
                    "Failed to write the final snapshot: {e}. Attempting to retry in {}s",
                    FINAL_SNAPSHOT_RETRY.as_secs()
                );
                time::sleep(FINAL_SNAPSHOT_RETRY).await;
            }
        }
    }
    log::info!("snapshot service has exited");
}

/// Run one dump on the blocking pool so disk I/O never stalls the runtime's
/// async workers
async fn write_snapshot(
    file: File,
    namespace: &Arc<Namespace>,
) -> (File, crate::util::PharosResult<()>) {
    let tree = namespace.clone();
    tokio::task::spawn_blocking(move || {
        let mut file = file;
        let result = flush::flush_to(&mut file, &tree);
        (file, result)
    })
    .await
    .expect("something caused the snapshot task to panic")
}
