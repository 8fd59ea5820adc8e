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

use crate::namespace::Namespace;
use crate::protocol::wire;
use crate::resource::Value;
use crate::util::{Error, PharosResult};
use std::{
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom, Write},
};

/// Walk every leaf into (joined path, raw value) pairs. Each read is
/// individually atomic; the collection as a whole is not a consistent cut,
/// which is fine for a snapshot taken every second
pub fn collect(namespace: &Namespace) -> PharosResult<Vec<(String, Value)>> {
    let mut entries = Vec::new();
    namespace.for_each(&[], &mut |path, broker| {
        entries.push((path.join("/"), broker.get()));
        Ok(true)
    })?;
    Ok(entries)
}

/// Open (or create) the snapshot file for rewriting
pub fn open_snapshot_file(path: &str) -> PharosResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| Error::ioerror_extra(e, format!("opening snapshot file {path}")))
}

/// Dump the tree into the file: truncate to zero, seek to the start, write
/// the encoded map
pub fn flush_to(file: &mut File, namespace: &Namespace) -> PharosResult<()> {
    let entries = collect(namespace)?;
    let blob = wire::encode_snapshot(&entries);
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&blob)?;
    Ok(())
}
