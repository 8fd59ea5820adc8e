/*
 * Created on Mon Oct 23 2023
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

//! # Actions
//!
//! One module per verb. An action consults the namespace and/or a broker
//! handle and returns either the finished response or an [`ActionError`];
//! the dispatcher turns errors into status codes and warning strings with a
//! single mapping, so no action ever hand-rolls its own failure response.

pub mod create;
pub mod delete;
pub mod get;
pub mod link;
pub mod list;
pub mod mkdir;
pub mod post;
pub mod put;
pub mod stop;
pub mod stream;
pub mod unlink;

use crate::namespace::TreeError;
use crate::protocol::wire::DecodeError;
use crate::resource::{LinkError, StreamNotFound};
use std::fmt;

/// A generic result for actions
pub type ActionResult<T> = Result<T, ActionError>;

/// Everything that can go wrong while running an action. Each kind maps to
/// one HTTP-style status code; the display text becomes a response warning
#[derive(Debug, PartialEq, Eq)]
pub enum ActionError {
    NotFound(String),
    AlreadyExists(String),
    NotADirectory(String),
    NotALeaf(String),
    InvalidPath(String),
    Loop,
    LinkNotFound,
    StreamNotFound,
    Decode(String),
    UnknownVerb(String),
    Internal(String),
}

impl ActionError {
    pub const fn status(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::LinkNotFound | Self::StreamNotFound => 404,
            Self::AlreadyExists(_)
            | Self::NotADirectory(_)
            | Self::NotALeaf(_)
            | Self::InvalidPath(_)
            | Self::Decode(_) => 400,
            Self::Loop => 409,
            Self::UnknownVerb(_) => 405,
            Self::Internal(_) => 500,
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "{what} not found"),
            Self::AlreadyExists(what) => write!(f, "{what} already exists"),
            Self::NotADirectory(what) => write!(f, "{what} is not a directory"),
            Self::NotALeaf(what) => write!(f, "{what} is not a resource"),
            Self::InvalidPath(what) => write!(f, "invalid path: {what}"),
            Self::Loop => write!(f, "link would create a loop"),
            Self::LinkNotFound => write!(f, "link not found"),
            Self::StreamNotFound => write!(f, "no open stream for this resource"),
            Self::Decode(what) => write!(f, "{what}"),
            Self::UnknownVerb(verb) => write!(f, "unknown verb '{verb}'"),
            Self::Internal(what) => write!(f, "{what}"),
        }
    }
}

impl From<TreeError> for ActionError {
    fn from(terr: TreeError) -> Self {
        match terr {
            TreeError::NotFound(what) => Self::NotFound(what),
            TreeError::AlreadyExists(what) => Self::AlreadyExists(what),
            TreeError::NotADirectory(what) => Self::NotADirectory(what),
            TreeError::NotALeaf(what) => Self::NotALeaf(what),
            TreeError::InvalidPath(what) => Self::InvalidPath(what),
        }
    }
}

impl From<DecodeError> for ActionError {
    fn from(derr: DecodeError) -> Self {
        Self::Decode(derr.to_string())
    }
}

impl From<LinkError> for ActionError {
    fn from(lerr: LinkError) -> Self {
        match lerr {
            LinkError::Loop => Self::Loop,
            LinkError::LinkNotFound => Self::LinkNotFound,
        }
    }
}

impl From<StreamNotFound> for ActionError {
    fn from(_: StreamNotFound) -> Self {
        Self::StreamNotFound
    }
}
