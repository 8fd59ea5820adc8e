/*
 * Created on Thu Oct 19 2023
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

//! # Client sessions
//!
//! A [`Client`] is the per-connection state the dispatcher works against: a
//! way to send response frames back (serialized, one frame at a time) and
//! the table of active subscriptions keyed by (correlation id, path). The
//! same client may stream the same resource under different correlation
//! ids; the pair is the identity.

use crate::protocol::Response;
use crate::resource::Broker;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};
use tokio::sync::mpsc;

/// A send failure: the connection's writer is gone
#[derive(Debug)]
pub struct SendError;

type SubKey = (Bytes, Vec<String>);

/// One registered subscription: enough to stop the stream on the broker
/// without keeping the broker alive
pub struct StreamHandle {
    pub stream_id: u64,
    pub broker: Weak<Broker>,
}

pub struct Client {
    /// origin address, for logs
    addr: String,
    /// encoded frames travel through here to the connection's writer; the
    /// writer owns the socket, which serializes writes frame-at-a-time
    tx: mpsc::Sender<Bytes>,
    streams: Mutex<HashMap<SubKey, StreamHandle>>,
}

impl Client {
    pub fn new(addr: String, tx: mpsc::Sender<Bytes>) -> Arc<Self> {
        Arc::new(Self {
            addr,
            tx,
            streams: Mutex::new(HashMap::new()),
        })
    }
    pub fn addr(&self) -> &str {
        &self.addr
    }
    /// Encode and send one response frame. Fails once the connection's
    /// writer has gone away
    pub async fn send(&self, response: Response) -> Result<(), SendError> {
        self.tx
            .send(response.into_bytes())
            .await
            .map_err(|_| SendError)
    }
    /// Register a subscription under (correlation id, path)
    pub fn add_stream(&self, reid: Bytes, path: Vec<String>, handle: StreamHandle) {
        self.streams.lock().insert((reid, path), handle);
    }
    pub fn has_stream(&self, reid: &Bytes, path: &[String]) -> bool {
        self.streams
            .lock()
            .contains_key(&(reid.clone(), path.to_vec()))
    }
    /// Remove and return a subscription, if registered
    pub fn remove_stream(&self, reid: &Bytes, path: &[String]) -> Option<StreamHandle> {
        self.streams.lock().remove(&(reid.clone(), path.to_vec()))
    }
    /// Drop a subscription entry without stopping the broker stream. Used by
    /// forwarding tasks that noticed the stream end on their own; the id
    /// check keeps a finished task from evicting a successor registered
    /// under the same (correlation id, path) pair
    pub fn forget_stream(&self, reid: &Bytes, path: &[String], stream_id: u64) {
        let mut streams = self.streams.lock();
        let key = (reid.clone(), path.to_vec());
        if streams.get(&key).is_some_and(|h| h.stream_id == stream_id) {
            streams.remove(&key);
        }
    }
    /// Stop every remaining subscription. Called exactly once when the
    /// transport reports end-of-connection
    pub fn disconnect(&self) {
        let drained: Vec<StreamHandle> = {
            let mut streams = self.streams.lock();
            streams.drain().map(|(_, handle)| handle).collect()
        };
        for handle in drained {
            if let Some(broker) = handle.broker.upgrade() {
                let _ = broker.stop_stream(handle.stream_id);
            }
        }
    }
    /// Number of live subscriptions; used by tests and the disconnect path
    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }
}
