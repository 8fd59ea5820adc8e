/*
 * Created on Tue Oct 03 2023
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

//! # The wire protocol
//!
//! Every frame on the wire is a single self-describing msgpack map. Requests
//! carry an opaque correlation id (`REID`), credentials (`AUTH`), the verb,
//! the resource path and an opaque payload (`PAYL`). Responses echo the
//! correlation id and carry an HTTP-style status code, a textual phrase, a
//! payload and a list of warnings.
//!
//! The server treats `REID` and `PAYL` as raw msgpack subtrees: they are
//! validated, sliced out of the incoming frame and spliced back into outgoing
//! frames byte-for-byte, never re-encoded.

pub mod wire;

#[cfg(test)]
mod tests;

use bytes::Bytes;
use std::collections::HashMap;

/// The encoded-nil sentinel. A fresh resource holds this value so that a
/// reader always receives a decodable frame, never an empty byte string
pub const NIL_VALUE: &[u8] = &[0xC0];

/// Warning emitted when a bounded subscriber queue was full and an update
/// was dropped for it
pub const WARN_STREAM_SKIPPED: &str = "stream-skipped";
/// Warning emitted when a requested link already exists
pub const WARN_LINK_EXISTS: &str = "link-already-exists";
/// Warning emitted when a STREAM request hits an already-registered
/// (correlation id, path) pair
pub const WARN_ALREADY_STREAMING: &str = "already-streaming";

/// Returns the encoded-nil sentinel as an owned value
pub fn nil_value() -> Bytes {
    Bytes::from_static(NIL_VALUE)
}

/// The canonical textual phrase for a status code
pub const fn status_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown Status",
    }
}

/// The request verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Post,
    Create,
    Mkdir,
    Delete,
    List,
    Get,
    Put,
    Stream,
    Stop,
    Link,
    Unlink,
}

impl Verb {
    pub fn parse(verb: &str) -> Option<Self> {
        let verb = match verb {
            "POST" => Self::Post,
            "CREATE" => Self::Create,
            "MKDIR" => Self::Mkdir,
            "DELETE" => Self::Delete,
            "LIST" => Self::List,
            "GET" => Self::Get,
            "PUT" => Self::Put,
            "STREAM" => Self::Stream,
            "STOP" => Self::Stop,
            "LINK" => Self::Link,
            "UNLINK" => Self::Unlink,
            _ => return None,
        };
        Some(verb)
    }
    /// The read-only verbs are exactly {LIST, GET, STREAM, STOP}
    pub const fn is_read_only(&self) -> bool {
        matches!(self, Self::List | Self::Get | Self::Stream | Self::Stop)
    }
}

/// A decoded request frame. Absent keys decode to their empty values, the
/// dispatcher rejects whatever combination turns out to be meaningless
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// opaque correlation id (raw msgpack subtree)
    pub reid: Bytes,
    /// credentials, commonly `USER` and `TOKEN`
    pub auth: HashMap<String, String>,
    /// the verb as sent; parsed by the dispatcher
    pub verb: String,
    /// the resource path
    pub path: Vec<String>,
    /// recognized meta flags
    pub meta: Meta,
    /// opaque application payload (raw msgpack subtree)
    pub payl: Bytes,
}

/// Meta flags the server understands. Unknown meta entries are skipped
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Meta {
    /// `NONRECURSIVE`: switches LIST to a flat listing of immediate children
    pub nonrecursive: bool,
    /// `LOSSLESS`: switches STREAM to guaranteed delivery. The producer
    /// still never blocks; memory is the price if the consumer stalls
    pub lossless: bool,
}

/// A response frame builder in the builder-chain style of the protocol: set
/// what you have, [`Response::into_bytes`] fills in the rest
#[derive(Debug, Clone)]
pub struct Response {
    pub reid: Bytes,
    pub rnum: u16,
    pub payl: Option<Bytes>,
    pub warnings: Vec<String>,
}

impl Response {
    pub fn new(reid: Bytes) -> Self {
        Self {
            reid,
            rnum: 0,
            payl: None,
            warnings: Vec::new(),
        }
    }
    pub fn rnum(mut self, rnum: u16) -> Self {
        self.rnum = rnum;
        self
    }
    pub fn payload(mut self, payl: Bytes) -> Self {
        self.payl = Some(payl);
        self
    }
    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
    /// Encode the response into a single msgpack frame
    pub fn into_bytes(self) -> Bytes {
        wire::encode_response(&self)
    }
}

/// A directory listing. Resources encode as msgpack nil, directories as maps;
/// the non-recursive form uses an empty map as the subdirectory placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Directory(HashMap<String, Listing>),
    Resource,
}
