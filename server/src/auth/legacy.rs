/*
 * Created on Sat Nov 11 2023
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

//! The legacy SQL provider: the same polling shape as the identity service,
//! but the accounts come out of an existing PostgreSQL database. The pool
//! connects lazily, so the server starts even while the database is down
//! and the table fills in once it comes back

use super::{AccountTable, Authorizer, Decision};
use crate::net::Shutdown;
use crate::protocol::Request;
use crate::util::{Error, PharosResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::time;

const USER_QUERY: &str = "SELECT username, token FROM api_tokens \
     WHERE permanent OR issued >= LOCALTIMESTAMP - INTERVAL '2 days'";
const ADMIN_QUERY: &str = "SELECT username FROM users WHERE is_admin";

#[derive(Debug, Clone)]
pub struct ConnectionFields {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

pub struct LegacySql {
    table: Arc<AccountTable>,
}

impl Authorizer for LegacySql {
    fn authorize(&self, request: &Request) -> Decision {
        self.table.decide(request)
    }
}

/// Start the poll task and hand back the provider
pub fn spawn(
    fields: ConnectionFields,
    query_interval: Duration,
    mut shutdown: Shutdown,
) -> PharosResult<Arc<LegacySql>> {
    let dsn = format!(
        "postgres://{}:{}@{}:{}/{}",
        fields.user, fields.password, fields.host, fields.port, fields.dbname
    );
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect_lazy(&dsn)
        .map_err(|e| Error::ConfigError(format!("bad database settings: {e}")))?;
    let table = Arc::new(AccountTable::default());
    let poll_table = table.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = time::sleep_until(time::Instant::now() + query_interval) => {
                    if let Err(e) = refresh(&pool, &poll_table).await {
                        log::error!("legacy database poll failed: {e}");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        log::info!("legacy database poller has exited");
    });
    Ok(Arc::new(LegacySql { table }))
}

async fn refresh(pool: &PgPool, table: &AccountTable) -> Result<(), sqlx::Error> {
    let users: Vec<(String, String)> = sqlx::query_as(USER_QUERY).fetch_all(pool).await?;
    let admins: Vec<(String,)> = sqlx::query_as(ADMIN_QUERY).fetch_all(pool).await?;
    table.replace(
        users.into_iter().collect::<HashMap<String, String>>(),
        admins
            .into_iter()
            .map(|(name,)| name)
            .collect::<HashSet<String>>(),
    );
    Ok(())
}
