/*
 * Created on Thu Nov 09 2023
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

//! The account-table provider: a username to token map plus an admin set.
//! The static variant parses both from JSON once at startup; the refreshing
//! providers replace the table contents from their backing store

use super::{path_policy, Authorizer, Decision};
use crate::protocol::Request;
use crate::util::{Error, PharosResult};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// A swappable account table. Checks are plain lookups; the refreshing
/// providers replace the whole contents atomically on every poll
#[derive(Default)]
pub struct AccountTable {
    /// username -> token
    users: RwLock<HashMap<String, String>>,
    /// usernames with the admin flag
    admins: RwLock<HashSet<String>>,
}

impl AccountTable {
    pub fn replace(&self, users: HashMap<String, String>, admins: HashSet<String>) {
        *self.users.write() = users;
        *self.admins.write() = admins;
    }
    /// Credential check first (401), then the path policy (403)
    pub fn decide(&self, request: &Request) -> Decision {
        let Some(username) = request.auth.get("USER") else {
            return Decision::deny(401);
        };
        let Some(token) = request.auth.get("TOKEN") else {
            return Decision::deny(401);
        };
        match self.users.read().get(username) {
            Some(expected) if expected == token => {}
            _ => return Decision::deny(401),
        }
        let is_admin = self.admins.read().contains(username);
        path_policy(username, is_admin, request)
    }
}

/// The static user/token table, parsed from the JSON strings in the
/// configuration
pub struct StaticTable {
    table: AccountTable,
}

impl StaticTable {
    pub fn from_json(users_json: &str, admins_json: &str) -> PharosResult<Self> {
        let users: HashMap<String, String> = serde_json::from_str(users_json)
            .map_err(|e| Error::ConfigError(format!("bad users JSON: {e}")))?;
        // the admins document maps usernames to a flag; only the set ones
        // count
        let admins: HashMap<String, bool> = serde_json::from_str(admins_json)
            .map_err(|e| Error::ConfigError(format!("bad admins JSON: {e}")))?;
        let admins: HashSet<String> = admins
            .into_iter()
            .filter_map(|(name, is_admin)| is_admin.then_some(name))
            .collect();
        log::info!(
            "static account table loaded: {} users, {} admins",
            users.len(),
            admins.len()
        );
        let table = AccountTable::default();
        table.replace(users, admins);
        Ok(Self { table })
    }
}

impl Authorizer for StaticTable {
    fn authorize(&self, request: &Request) -> Decision {
        self.table.decide(request)
    }
}
