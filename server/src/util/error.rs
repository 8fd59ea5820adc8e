/*
 * Created on Mon Oct 02 2023
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

use crate::protocol::wire::DecodeError;
use std::{fmt, io::Error as IoError};

pub type PharosResult<T> = Result<T, Error>;

/// A server-level error. These cover startup, I/O and storage failures; the
/// per-request protocol errors live in [`crate::actions::ActionError`]
#[derive(Debug)]
pub enum Error {
    IoError(IoError),
    IoErrorExtra(IoError, String),
    Decode(DecodeError),
    ConfigError(String),
    OtherError(String),
}

impl Error {
    pub fn ioerror_extra(ioe: IoError, extra: impl ToString) -> Self {
        Self::IoErrorExtra(ioe, extra.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(nerr) => write!(f, "I/O error: {}", nerr),
            Self::IoErrorExtra(ioe, extra) => write!(f, "I/O error while {extra}: {ioe}"),
            Self::Decode(derr) => write!(f, "Decode error: {}", derr),
            Self::ConfigError(cerr) => write!(f, "Configuration error: {}", cerr),
            Self::OtherError(oerr) => write!(f, "Error: {}", oerr),
        }
    }
}

impl From<IoError> for Error {
    fn from(ioe: IoError) -> Self {
        Self::IoError(ioe)
    }
}

impl From<DecodeError> for Error {
    fn from(derr: DecodeError) -> Self {
        Self::Decode(derr)
    }
}
