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

//! # Authorization
//!
//! One trait, six providers. The dispatcher consults the provider exactly
//! once per request and stops on a denial, so a provider's answer is both
//! authentication (401) and authorization (403) in one step.
//!
//! The table-backed providers share a policy: admins may do anything, an
//! authenticated user owns the subtree `user/<name>` and may read
//! everywhere else. The refreshing providers (external identity service,
//! legacy SQL) only differ in where the account table comes from.

pub mod identity;
pub mod legacy;
pub mod provider;
pub mod token;


pub use provider::{AccountTable, StaticTable};

use crate::config::AuthSettings;
use crate::net::Shutdown;
use crate::protocol::{Request, Verb};
use crate::util::PharosResult;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The authorizer's verdict: allowed or not, plus the status code to send
/// when not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub code: u16,
}

impl Decision {
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            code: 200,
        }
    }
    pub const fn deny(code: u16) -> Self {
        Self {
            allowed: false,
            code,
        }
    }
}

/// Decides per-request whether a client may perform a verb on a path.
/// The lifecycle hooks are keyed by the client's origin address: the
/// transport attaches a client when its connection arrives and the
/// dispatcher detaches it on disconnect, so a provider that keeps
/// per-client state (session caches, upstream subscriptions) has a place
/// to set it up and a guaranteed place to cancel it. The shipped providers
/// are stateless per client and keep the default no-ops
pub trait Authorizer: Send + Sync {
    fn authorize(&self, request: &Request) -> Decision;
    fn attach(&self, _client: &str) {}
    fn detach(&self, _client: &str) {}
}

/// Allows every request
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _request: &Request) -> Decision {
        Decision::allow()
    }
}

/// Denies every request
pub struct AllowNone;

impl Authorizer for AllowNone {
    fn authorize(&self, _request: &Request) -> Decision {
        Decision::deny(401)
    }
}

/// The shared path policy for authenticated, non-admin users: read/write
/// below `user/<name>`, read-only verbs anywhere else
pub(self) fn path_policy(username: &str, is_admin: bool, request: &Request) -> Decision {
    if is_admin {
        return Decision::allow();
    }
    let owns_path = request.path.len() >= 2
        && request.path[0] == "user"
        && request.path[1] == username;
    if owns_path {
        return Decision::allow();
    }
    match Verb::parse(&request.verb) {
        Some(verb) if verb.is_read_only() => Decision::allow(),
        _ => Decision::deny(403),
    }
}

/// Build the configured provider. The refreshing providers spawn their poll
/// task against the server's shutdown broadcast
pub fn new_provider(
    settings: &AuthSettings,
    signal: &broadcast::Sender<()>,
) -> PharosResult<Arc<dyn Authorizer>> {
    log::info!("Authorization mode: {}", settings.mode_name());
    let provider: Arc<dyn Authorizer> = match settings {
        AuthSettings::AllowAll => Arc::new(AllowAll),
        AuthSettings::AllowNone => Arc::new(AllowNone),
        AuthSettings::StaticTable {
            users_json,
            admins_json,
        } => Arc::new(StaticTable::from_json(users_json, admins_json)?),
        AuthSettings::SignedToken { secret } => Arc::new(token::SignedToken::new(secret)),
        AuthSettings::ExternalIdentity {
            url,
            bearer_token,
            query_interval,
        } => identity::spawn(
            url.clone(),
            bearer_token.clone(),
            *query_interval,
            Shutdown::new(signal.subscribe()),
        ),
        AuthSettings::LegacySql {
            host,
            port,
            user,
            password,
            dbname,
            query_interval,
        } => legacy::spawn(
            legacy::ConnectionFields {
                host: host.clone(),
                port: *port,
                user: user.clone(),
                password: password.clone(),
                dbname: dbname.clone(),
            },
            *query_interval,
            Shutdown::new(signal.subscribe()),
        )?,
    };
    Ok(provider)
}
