/*
 * Created on Wed Nov 15 2023
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
use crate::util::{Error, PharosResult};
use std::{fs, io::ErrorKind, sync::Arc};

/// Restore the namespace from the snapshot file. The replacement tree is
/// built fully off to the side and only swapped in once everything decoded
/// cleanly, so a broken snapshot leaves the running namespace untouched.
/// Returns whether anything was restored
pub fn restore(namespace: &Arc<Namespace>, path: &str) -> PharosResult<bool> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::ioerror_extra(e, format!("reading snapshot {path}"))),
    };
    if raw.is_empty() {
        return Ok(false);
    }
    let pairs = wire::decode_snapshot(&raw)?;
    let fresh = Namespace::new();
    for (joined, value) in pairs {
        let leaf_path: Vec<String> = joined.split('/').map(str::to_owned).collect();
        if leaf_path.iter().any(String::is_empty) {
            log::warn!("skipping snapshot entry with a malformed path '{joined}'");
            continue;
        }
        // an empty value becomes the nil sentinel inside the broker
        fresh.create_leaf(&leaf_path, value)?;
    }
    namespace.chroot(fresh);
    Ok(true)
}
