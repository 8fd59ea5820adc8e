/*
 * Created on Wed Sep 20 2023
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

//! The shared library for Pharos
//!
//! This crate contains the small set of definitions that are shared between the
//! `server` crate and external tooling: version metadata, the generic result
//! alias and terminal helpers used by the startup and shutdown paths.

pub mod util;

use std::error::Error;

/// The current version of the project
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// The project's upstream URL
pub const URL: &str = "https://github.com/pharos-rt/pharos";
/// A generic result
pub type TResult<T> = Result<T, Box<dyn Error>>;
/// The size of the per-connection read buffer in bytes
pub const BUF_CAP: usize = 8 * 1024; // 8 KB per-connection
