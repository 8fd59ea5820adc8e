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

//! The environment layer. `PHAROS_*` variables override whatever the file
//! layer produced; they are snapshotted into a struct first so evaluation
//! is a pure function that the tests can drive

use std::env;

macro_rules! envvars {
    ($($field:ident => $var:literal),* $(,)?) => {
        #[derive(Debug, Default)]
        pub struct EnvVars {
            $(pub $field: Option<String>,)*
        }
        impl EnvVars {
            pub fn load() -> Self {
                Self {
                    $($field: env::var($var).ok(),)*
                }
            }
        }
    };
}

envvars! {
    host => "PHAROS_HOST",
    port => "PHAROS_PORT",
    read_buffer => "PHAROS_READ_BUFFER_SIZE",
    write_buffer => "PHAROS_WRITE_BUFFER_SIZE",
    read_limit => "PHAROS_READ_LIMIT",
    snapshot_path => "PHAROS_SNAPSHOT_PATH",
    snapshot_interval => "PHAROS_SNAPSHOT_INTERVAL_SECS",
    stream_queue_size => "PHAROS_STREAM_QUEUE_SIZE",
    verbose => "PHAROS_VERBOSE",
    auth_mode => "PHAROS_AUTH",
    users_json => "PHAROS_USERS_JSON",
    admins_json => "PHAROS_ADMINS_JSON",
    token_secret => "PHAROS_TOKEN_SECRET",
    identity_url => "PHAROS_IDENTITY_URL",
    identity_token => "PHAROS_IDENTITY_TOKEN",
    query_interval => "PHAROS_QUERY_INTERVAL_SECS",
    db_host => "PHAROS_DB_HOST",
    db_port => "PHAROS_DB_PORT",
    db_user => "PHAROS_DB_USER",
    db_password => "PHAROS_DB_PASSWORD",
    db_name => "PHAROS_DB_NAME",
}
