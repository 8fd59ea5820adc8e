/*
 * Created on Fri Nov 03 2023
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

//! The YAML configuration file layer. Every key is optional; whatever is
//! present overrides the defaults, and environment variables override both

use serde::Deserialize;

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct ConfigFile {
    pub server: Option<ServerSection>,
    pub snapshot: Option<SnapshotSection>,
    pub stream: Option<StreamSection>,
    pub auth: Option<AuthSection>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub read_buffer: Option<usize>,
    pub write_buffer: Option<usize>,
    pub read_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct SnapshotSection {
    pub path: Option<String>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct StreamSection {
    pub queue_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct AuthSection {
    /// one of: allow-all, allow-none, static-table, signed-token,
    /// external-identity, legacy-sql
    pub mode: Option<String>,
    // static-table
    pub users_json: Option<String>,
    pub admins_json: Option<String>,
    // signed-token
    pub token_secret: Option<String>,
    // external-identity
    pub identity_url: Option<String>,
    pub identity_token: Option<String>,
    // legacy-sql
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    // poll interval for the refreshing providers
    pub query_interval_secs: Option<u64>,
}

pub fn from_file(raw: &str) -> Result<ConfigFile, serde_yaml::Error> {
    serde_yaml::from_str(raw)
}
