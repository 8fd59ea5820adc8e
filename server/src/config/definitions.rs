/*
 * Created on Thu Nov 02 2023
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

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

// server defaults
pub const DEFAULT_IPV4: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
pub const DEFAULT_PORT: u16 = 3100;
/// maximum accepted frame size in bytes; larger frames close the connection
pub const DEFAULT_READ_LIMIT: usize = 2048;
// snapshot defaults
pub const DEFAULT_SNAPSHOT_PATH: &str = "./snapshot.pharos";
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);
// stream defaults
pub const DEFAULT_STREAM_QUEUE_SIZE: usize = 10;
// auth provider poll defaults
pub const DEFAULT_QUERY_INTERVAL: Duration = Duration::from_secs(1);

/// The fully resolved server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSet {
    /// transport bind address
    pub host: IpAddr,
    pub port: u16,
    /// read buffer capacity in bytes; 0 selects the built-in default
    pub read_buffer: usize,
    /// write buffer capacity in bytes; 0 selects the built-in default
    pub write_buffer: usize,
    /// maximum size of one request frame
    pub read_limit: usize,
    /// bounded per-stream queue capacity
    pub stream_queue_size: usize,
    /// per-event debug logging
    pub verbose: bool,
    pub snapshot: SnapshotConfig,
    pub auth: AuthSettings,
}

impl Default for ConfigurationSet {
    fn default() -> Self {
        Self {
            host: DEFAULT_IPV4,
            port: DEFAULT_PORT,
            read_buffer: 0,
            write_buffer: 0,
            read_limit: DEFAULT_READ_LIMIT,
            stream_queue_size: DEFAULT_STREAM_QUEUE_SIZE,
            verbose: false,
            snapshot: SnapshotConfig::default(),
            auth: AuthSettings::AllowNone,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotConfig {
    /// where the snapshot file lives
    pub path: String,
    /// how often the tree is dumped
    pub every: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_SNAPSHOT_PATH.to_owned(),
            every: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

/// Which authorization provider to run. The default denies everything: an
/// operator has to make an explicit choice before any client gets in
#[derive(Debug, Clone, PartialEq)]
pub enum AuthSettings {
    AllowAll,
    AllowNone,
    StaticTable {
        users_json: String,
        admins_json: String,
    },
    SignedToken {
        secret: String,
    },
    ExternalIdentity {
        url: String,
        bearer_token: String,
        query_interval: Duration,
    },
    LegacySql {
        host: String,
        port: u16,
        user: String,
        password: String,
        dbname: String,
        query_interval: Duration,
    },
}

impl AuthSettings {
    pub const fn mode_name(&self) -> &'static str {
        match self {
            Self::AllowAll => "allow-all",
            Self::AllowNone => "allow-none",
            Self::StaticTable { .. } => "static-table",
            Self::SignedToken { .. } => "signed-token",
            Self::ExternalIdentity { .. } => "external-identity",
            Self::LegacySql { .. } => "legacy-sql",
        }
    }
}
