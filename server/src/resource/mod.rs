/*
 * Created on Thu Oct 12 2023
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

//! # Resource brokers
//!
//! A [`Broker`] owns one resource: the latest value, the set of subscriber
//! queues and the resource's position in the link graph. Each broker
//! serializes its own state with short mutexes instead of a task per broker,
//! so a tree with thousands of leaves costs nothing while idle.
//!
//! ## Links
//!
//! A link `source -> destination` replays every value put into the source
//! onto the destination. Each broker keeps its downstream set (`sinks`,
//! strong references — who receives my puts) and its upstream set (`sources`,
//! weak references — who feeds me). The strong direction follows the
//! acyclic link relation, so no reference cycle can form. Link topology
//! changes serialize on one process-wide graph lock, which makes the
//! reachability check and the edge install atomic with respect to every
//! other link operation.


use bytes::Bytes;
use parking_lot::{const_mutex, Mutex, RwLock};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol;
use crate::util::join_path;

/// A resource value: one opaque, already-encoded msgpack frame
pub type Value = Bytes;

/// The process-wide link graph lock. Held across the cycle check and the
/// edge install, and by anything that removes edges
static LINK_GRAPH: Mutex<()> = const_mutex(());

/// Result of a [`Broker::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    /// at least one bounded subscriber queue was full and skipped
    pub skipped: bool,
}

/// Result of a successful [`Broker::link`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// the edge was already present; reported as a warning, not an error
    AlreadyLinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// installing the edge would close a directed cycle
    Loop,
    /// unlink of an edge that does not exist
    LinkNotFound,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loop => write!(f, "link would create a loop"),
            Self::LinkNotFound => write!(f, "link not found"),
        }
    }
}

/// Stop of a stream handle that is not registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamNotFound;

impl fmt::Display for StreamNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream not found")
    }
}

enum SubscriberTx {
    /// bounded queue; a full queue drops the update for this subscriber
    Bounded(mpsc::Sender<Value>),
    /// unbounded stage; delivery is guaranteed, memory is not
    Lossless(mpsc::UnboundedSender<Value>),
}

struct Subscriber {
    id: u64,
    tx: SubscriberTx,
}

enum SubscriptionRx {
    Bounded(mpsc::Receiver<Value>),
    Lossless(mpsc::UnboundedReceiver<Value>),
}

/// The consumer half of a stream. Dropping it (or stopping the stream on the
/// broker) ends delivery; [`Subscription::recv`] returns `None` once the
/// stream is closed and drained
pub struct Subscription {
    id: u64,
    rx: SubscriptionRx,
}

impl Subscription {
    pub const fn id(&self) -> u64 {
        self.id
    }
    pub async fn recv(&mut self) -> Option<Value> {
        match &mut self.rx {
            SubscriptionRx::Bounded(rx) => rx.recv().await,
            SubscriptionRx::Lossless(rx) => rx.recv().await,
        }
    }
}

/// The broker for one resource
pub struct Broker {
    id: Uuid,
    path: Vec<String>,
    closed: AtomicBool,
    value: RwLock<Value>,
    subscribers: Mutex<Vec<Subscriber>>,
    /// downstream: brokers that receive this broker's puts
    sinks: Mutex<HashMap<Uuid, Arc<Broker>>>,
    /// upstream: brokers whose puts this broker receives
    sources: Mutex<HashMap<Uuid, Weak<Broker>>>,
    next_stream_id: AtomicU64,
}

impl Broker {
    /// Create a broker. An empty initial value is replaced with the
    /// encoded-nil sentinel so `get` always returns a decodable frame
    pub fn new(path: Vec<String>, initial: Value) -> Arc<Self> {
        let initial = if initial.is_empty() {
            protocol::nil_value()
        } else {
            initial
        };
        Arc::new(Self {
            id: Uuid::new_v4(),
            path,
            closed: AtomicBool::new(false),
            value: RwLock::new(initial),
            subscribers: Mutex::new(Vec::new()),
            sinks: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU64::new(0),
        })
    }
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
    /// Store a new value and fan it out: first to every local subscriber,
    /// then to every downstream linked broker. Bounded subscribers with a
    /// full queue are skipped and the outcome records it
    pub fn put(&self, value: Value) -> PutOutcome {
        if self.is_closed() {
            return PutOutcome { skipped: false };
        }
        // the subscriber lock doubles as the put serialization point: it
        // pins the value write, the local fan-out and the downstream
        // forwarding into one ordered step per broker
        let subscribers = self.subscribers.lock();
        *self.value.write() = value.clone();
        let mut skipped = false;
        for subscriber in subscribers.iter() {
            match &subscriber.tx {
                SubscriberTx::Bounded(tx) => {
                    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(value.clone()) {
                        skipped = true;
                        if crate::util::verbose() {
                            log::warn!(
                                "a stream of {} is full and was skipped by the broker",
                                join_path(&self.path)
                            );
                        }
                    }
                }
                SubscriberTx::Lossless(tx) => {
                    let _ = tx.send(value.clone());
                }
            }
        }
        let sinks: Vec<Arc<Broker>> = self.sinks.lock().values().cloned().collect();
        for sink in sinks {
            sink.put(value.clone());
        }
        PutOutcome { skipped }
    }
    /// The current value. Works on closed brokers too, so a snapshot taken
    /// after a close still sees the final state
    pub fn get(&self) -> Value {
        self.value.read().clone()
    }
    /// Register a bounded subscriber with the given queue capacity
    pub fn stream(&self, queue_size: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let id = self.register(SubscriberTx::Bounded(tx));
        Subscription {
            id,
            rx: SubscriptionRx::Bounded(rx),
        }
    }
    /// Register a lossless subscriber: the producer never blocks and no
    /// update is dropped, at the cost of unbounded memory if the consumer
    /// stalls
    pub fn stream_lossless(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register(SubscriberTx::Lossless(tx));
        Subscription {
            id,
            rx: SubscriptionRx::Lossless(rx),
        }
    }
    fn register(&self, tx: SubscriberTx) -> u64 {
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        if !self.is_closed() {
            self.subscribers.lock().push(Subscriber { id, tx });
        }
        // on a closed broker the sender is dropped right here and the
        // subscription observes immediate end-of-stream
        id
    }
    /// Deregister a subscriber. The consumer observes end-of-stream after
    /// draining
    pub fn stop_stream(&self, stream_id: u64) -> Result<(), StreamNotFound> {
        if self.is_closed() {
            return Ok(());
        }
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter().position(|s| s.id == stream_id) {
            Some(idx) => {
                subscribers.swap_remove(idx);
                Ok(())
            }
            None => Err(StreamNotFound),
        }
    }
    /// Install the link `source -> self`: every value put into `source` is
    /// also put into `self`. Rejected with [`LinkError::Loop`] if the edge
    /// would close a directed cycle
    pub fn link(self: &Arc<Self>, source: &Arc<Self>) -> Result<LinkOutcome, LinkError> {
        if self.is_closed() || source.is_closed() {
            return Ok(LinkOutcome::Linked);
        }
        let _graph = LINK_GRAPH.lock();
        if source.sinks.lock().contains_key(&self.id) {
            return Ok(LinkOutcome::AlreadyLinked);
        }
        if reaches(self, &source.id) {
            return Err(LinkError::Loop);
        }
        source.sinks.lock().insert(self.id, self.clone());
        self.sources.lock().insert(source.id, Arc::downgrade(source));
        log::debug!(
            "linked {} -> {}",
            join_path(&source.path),
            join_path(&self.path)
        );
        Ok(LinkOutcome::Linked)
    }
    /// Remove the link `source -> self`
    pub fn unlink(self: &Arc<Self>, source: &Arc<Self>) -> Result<(), LinkError> {
        if self.is_closed() || source.is_closed() {
            return Ok(());
        }
        let _graph = LINK_GRAPH.lock();
        if source.sinks.lock().remove(&self.id).is_none() {
            return Err(LinkError::LinkNotFound);
        }
        self.sources.lock().remove(&source.id);
        Ok(())
    }
    /// Close the broker: sever every link in both directions and close all
    /// subscriber queues. Reads keep working; all further mutations are
    /// no-ops that report success
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let _graph = LINK_GRAPH.lock();
            for (_, sink) in self.sinks.lock().drain() {
                sink.sources.lock().remove(&self.id);
            }
            for (_, source) in self.sources.lock().drain() {
                if let Some(source) = source.upgrade() {
                    source.sinks.lock().remove(&self.id);
                }
            }
        }
        // dropping the senders closes every subscriber queue
        self.subscribers.lock().clear();
        log::debug!("resource {} closed", join_path(&self.path));
    }
}

/// Is `target` reachable from `from` following downstream links? Plain
/// depth-first search; the graph is a DAG so this terminates, and link
/// operations are rare enough that O(E) per link is fine
fn reaches(from: &Arc<Broker>, target: &Uuid) -> bool {
    if from.id == *target {
        return true;
    }
    let children: Vec<Arc<Broker>> = from.sinks.lock().values().cloned().collect();
    children.iter().any(|child| reaches(child, target))
}
