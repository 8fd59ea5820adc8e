/*
 * Created on Fri Nov 10 2023
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

//! The external identity service provider. A background task polls the
//! service on a fixed interval and mirrors its accounts into the in-memory
//! table, so the per-request check stays a local lookup. A failed poll is
//! logged and retried on the next tick; the stale table keeps serving in
//! the meantime

use super::{AccountTable, Authorizer, Decision};
use crate::net::Shutdown;
use crate::protocol::Request;
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::time;

/// One account as the identity service reports it
#[derive(Debug, Deserialize)]
struct IdentityRecord {
    username: String,
    token: String,
    #[serde(default)]
    roles: Vec<String>,
}

pub struct ExternalIdentity {
    table: Arc<AccountTable>,
}

impl Authorizer for ExternalIdentity {
    fn authorize(&self, request: &Request) -> Decision {
        self.table.decide(request)
    }
}

/// Start the poll task and hand back the provider
pub fn spawn(
    url: String,
    bearer_token: String,
    query_interval: Duration,
    mut shutdown: Shutdown,
) -> Arc<ExternalIdentity> {
    let table = Arc::new(AccountTable::default());
    let poll_table = table.clone();
    tokio::spawn(async move {
        let http = reqwest::Client::new();
        loop {
            tokio::select! {
                _ = time::sleep_until(time::Instant::now() + query_interval) => {
                    if let Err(e) = refresh(&http, &url, &bearer_token, &poll_table).await {
                        log::error!("identity service poll failed: {e}");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        log::info!("identity service poller has exited");
    });
    Arc::new(ExternalIdentity { table })
}

async fn refresh(
    http: &reqwest::Client,
    url: &str,
    bearer_token: &str,
    table: &AccountTable,
) -> Result<(), reqwest::Error> {
    let records: Vec<IdentityRecord> = http
        .get(url)
        .bearer_auth(bearer_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let mut users = HashMap::with_capacity(records.len());
    let mut admins = HashSet::new();
    for record in records {
        if record.roles.iter().any(|role| role == "admin") {
            admins.insert(record.username.clone());
        }
        users.insert(record.username, record.token);
    }
    table.replace(users, admins);
    Ok(())
}
