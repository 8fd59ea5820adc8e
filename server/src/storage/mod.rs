/*
 * Created on Tue Nov 14 2023
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

//! # Snapshot storage
//!
//! The on-disk format is one msgpack map: `/`-joined leaf paths to the raw
//! value bytes of each leaf, exactly what `get` returns. Path components can
//! never contain the separator, so the joined keys are unambiguous.
//! `flush` dumps the live tree into that map; `unflush` rebuilds a fresh
//! tree from it and swaps it in atomically.

pub mod flush;
pub mod unflush;
