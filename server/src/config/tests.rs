/*
 * Created on Sat Nov 04 2023
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

use super::cfgenv::EnvVars;
use super::cfgfile::{self, ConfigFile};
use super::feedback::{ErrorStack, WarningStack};
use super::*;
use std::net::{IpAddr, Ipv4Addr};

fn run(file: ConfigFile, environment: EnvVars) -> (ConfigurationSet, ErrorStack, WarningStack) {
    let mut estack = ErrorStack::default();
    let mut wstack = WarningStack::default();
    let cfg = evaluate(file, &environment, &mut estack, &mut wstack);
    (cfg, estack, wstack)
}

#[test]
fn defaults_hold_without_any_source() {
    let (cfg, estack, _) = run(ConfigFile::default(), EnvVars::default());
    assert!(estack.is_empty());
    assert_eq!(cfg, ConfigurationSet::default());
    assert_eq!(cfg.auth, AuthSettings::AllowNone);
}

#[test]
fn file_layer_overrides_defaults() {
    let file = cfgfile::from_file(
        "
server:
  host: 0.0.0.0
  port: 4000
  read_limit: 65536
snapshot:
  path: /var/lib/pharos/snapshot.pharos
  interval_secs: 30
stream:
  queue_size: 64
verbose: true
",
    )
    .unwrap();
    let (cfg, estack, _) = run(file, EnvVars::default());
    assert!(estack.is_empty());
    assert_eq!(cfg.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    assert_eq!(cfg.port, 4000);
    assert_eq!(cfg.read_limit, 65536);
    assert_eq!(cfg.snapshot.path, "/var/lib/pharos/snapshot.pharos");
    assert_eq!(cfg.snapshot.every.as_secs(), 30);
    assert_eq!(cfg.stream_queue_size, 64);
    assert!(cfg.verbose);
}

#[test]
fn environment_overrides_the_file_layer() {
    let file = cfgfile::from_file("server:\n  port: 4000\n").unwrap();
    let environment = EnvVars {
        port: Some("5000".to_owned()),
        ..Default::default()
    };
    let (cfg, estack, _) = run(file, environment);
    assert!(estack.is_empty());
    assert_eq!(cfg.port, 5000);
}

#[test]
fn bad_values_land_on_the_error_stack() {
    let environment = EnvVars {
        port: Some("not-a-port".to_owned()),
        read_limit: Some("-3".to_owned()),
        ..Default::default()
    };
    let (_, estack, _) = run(ConfigFile::default(), environment);
    assert!(!estack.is_empty());
    let report = estack.to_string();
    assert!(report.contains("PHAROS_PORT"));
    assert!(report.contains("PHAROS_READ_LIMIT"));
}

#[test]
fn zero_queue_size_is_bumped_with_a_warning() {
    let file = cfgfile::from_file("stream:\n  queue_size: 0\n").unwrap();
    let (cfg, estack, wstack) = run(file, EnvVars::default());
    assert!(estack.is_empty());
    assert!(!wstack.is_empty());
    assert_eq!(cfg.stream_queue_size, 1);
}

#[test]
fn static_table_mode_collects_its_tables() {
    let environment = EnvVars {
        auth_mode: Some("static-table".to_owned()),
        users_json: Some(r#"{"alice":"tok"}"#.to_owned()),
        ..Default::default()
    };
    let (cfg, estack, _) = run(ConfigFile::default(), environment);
    assert!(estack.is_empty());
    assert_eq!(
        cfg.auth,
        AuthSettings::StaticTable {
            users_json: r#"{"alice":"tok"}"#.to_owned(),
            admins_json: "{}".to_owned(),
        }
    );
}

#[test]
fn signed_token_mode_requires_a_secret() {
    let environment = EnvVars {
        auth_mode: Some("signed-token".to_owned()),
        ..Default::default()
    };
    let (_, estack, _) = run(ConfigFile::default(), environment);
    assert!(!estack.is_empty());
}

#[test]
fn external_identity_mode_requires_a_url() {
    let environment = EnvVars {
        auth_mode: Some("external-identity".to_owned()),
        ..Default::default()
    };
    let (_, estack, _) = run(ConfigFile::default(), environment);
    assert!(!estack.is_empty());

    let environment = EnvVars {
        auth_mode: Some("external-identity".to_owned()),
        identity_url: Some("http://localhost:9000/api/accounts".to_owned()),
        identity_token: Some("bearer-tok".to_owned()),
        query_interval: Some("5".to_owned()),
        ..Default::default()
    };
    let (cfg, estack, _) = run(ConfigFile::default(), environment);
    assert!(estack.is_empty());
    assert_eq!(
        cfg.auth,
        AuthSettings::ExternalIdentity {
            url: "http://localhost:9000/api/accounts".to_owned(),
            bearer_token: "bearer-tok".to_owned(),
            query_interval: std::time::Duration::from_secs(5),
        }
    );
}

#[test]
fn legacy_sql_mode_fills_connection_fields() {
    let file = cfgfile::from_file(
        "
auth:
  mode: legacy-sql
  db_host: db.internal
  db_port: 5433
  db_user: reader
  db_password: hunter2
  db_name: accounts
  query_interval_secs: 2
",
    )
    .unwrap();
    let (cfg, estack, _) = run(file, EnvVars::default());
    assert!(estack.is_empty());
    assert_eq!(
        cfg.auth,
        AuthSettings::LegacySql {
            host: "db.internal".to_owned(),
            port: 5433,
            user: "reader".to_owned(),
            password: "hunter2".to_owned(),
            dbname: "accounts".to_owned(),
            query_interval: std::time::Duration::from_secs(2),
        }
    );
}

#[test]
fn unknown_auth_mode_is_an_error() {
    let environment = EnvVars {
        auth_mode: Some("open-sesame".to_owned()),
        ..Default::default()
    };
    let (_, estack, _) = run(ConfigFile::default(), environment);
    assert!(!estack.is_empty());
}

#[test]
fn allow_all_warns() {
    let environment = EnvVars {
        auth_mode: Some("allow-all".to_owned()),
        ..Default::default()
    };
    let (cfg, _, wstack) = run(ConfigFile::default(), environment);
    assert_eq!(cfg.auth, AuthSettings::AllowAll);
    assert!(!wstack.is_empty());
}
