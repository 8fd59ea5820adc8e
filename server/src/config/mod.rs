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

//! # Configuration
//!
//! Three layers, least specific first: built-in defaults, an optional YAML
//! file (`--config <file>` or `PHAROS_CONFIG`), then `PHAROS_*` environment
//! variables. Parse problems accumulate instead of failing fast; the server
//! either starts with a fully evaluated [`ConfigurationSet`] or prints the
//! whole list of problems and refuses to start

mod cfgenv;
mod cfgfile;
mod definitions;
mod feedback;
#[cfg(test)]
mod tests;

pub use definitions::*;

use self::cfgenv::EnvVars;
use self::cfgfile::{AuthSection, ConfigFile};
use self::feedback::{ErrorStack, WarningStack};
use crate::util::{Error, PharosResult};
use std::{env, fs, process, str::FromStr, time::Duration};

/// Resolve the full configuration or die with a report. Also owns the tiny
/// argument surface: `--config <file>`, `--version`, `--help`
pub fn get_config() -> PharosResult<ConfigurationSet> {
    let explicit_file = parse_args()?;
    let file_path = explicit_file.or_else(|| env::var("PHAROS_CONFIG").ok());
    let file = match &file_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| Error::ioerror_extra(e, format!("reading config file {path}")))?;
            cfgfile::from_file(&raw)
                .map_err(|e| Error::ConfigError(format!("bad config file {path}: {e}")))?
        }
        None => ConfigFile::default(),
    };
    let mut estack = ErrorStack::default();
    let mut wstack = WarningStack::default();
    let cfg = evaluate(file, &EnvVars::load(), &mut estack, &mut wstack);
    if !wstack.is_empty() {
        wstack.print_warnings();
    }
    if !estack.is_empty() {
        return Err(Error::ConfigError(estack.to_string()));
    }
    if let Some(path) = file_path {
        log::info!("Using settings from {path} (environment overrides applied)");
    }
    Ok(cfg)
}

fn parse_args() -> PharosResult<Option<String>> {
    let mut args = env::args().skip(1);
    let mut file = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => file = Some(path),
                None => {
                    return Err(Error::ConfigError(
                        "--config expects a file path".to_owned(),
                    ))
                }
            },
            "--version" | "-v" => {
                println!("pharosd v{}", libpharos::VERSION);
                process::exit(0x00);
            }
            "--help" | "-h" => {
                println!(
                    "pharosd v{}\n\nUSAGE:\n    pharosd [--config <file>]\n\n\
                     All options can also be set through PHAROS_* environment\n\
                     variables; see {} for the full list",
                    libpharos::VERSION,
                    libpharos::URL
                );
                process::exit(0x00);
            }
            unknown => {
                return Err(Error::ConfigError(format!(
                    "unknown argument '{unknown}'"
                )))
            }
        }
    }
    Ok(file)
}

/// Pure evaluation of (file layer, environment layer) into a configuration.
/// Every problem lands on one of the stacks
pub(self) fn evaluate(
    file: ConfigFile,
    environment: &EnvVars,
    estack: &mut ErrorStack,
    wstack: &mut WarningStack,
) -> ConfigurationSet {
    let mut cfg = ConfigurationSet::default();

    // file layer
    if let Some(server) = &file.server {
        if let Some(host) = &server.host {
            apply_parsed(host, "server.host", &mut cfg.host, estack);
        }
        apply_opt(server.port, &mut cfg.port);
        apply_opt(server.read_buffer, &mut cfg.read_buffer);
        apply_opt(server.write_buffer, &mut cfg.write_buffer);
        apply_opt(server.read_limit, &mut cfg.read_limit);
    }
    if let Some(snapshot) = &file.snapshot {
        if let Some(path) = &snapshot.path {
            cfg.snapshot.path = path.clone();
        }
        if let Some(secs) = snapshot.interval_secs {
            cfg.snapshot.every = Duration::from_secs(secs);
        }
    }
    if let Some(stream) = &file.stream {
        apply_opt(stream.queue_size, &mut cfg.stream_queue_size);
    }
    apply_opt(file.verbose, &mut cfg.verbose);

    // environment layer
    apply_env(&environment.host, "PHAROS_HOST", &mut cfg.host, estack);
    apply_env(&environment.port, "PHAROS_PORT", &mut cfg.port, estack);
    apply_env(
        &environment.read_buffer,
        "PHAROS_READ_BUFFER_SIZE",
        &mut cfg.read_buffer,
        estack,
    );
    apply_env(
        &environment.write_buffer,
        "PHAROS_WRITE_BUFFER_SIZE",
        &mut cfg.write_buffer,
        estack,
    );
    apply_env(
        &environment.read_limit,
        "PHAROS_READ_LIMIT",
        &mut cfg.read_limit,
        estack,
    );
    if let Some(path) = &environment.snapshot_path {
        cfg.snapshot.path = path.clone();
    }
    let mut snapshot_secs = cfg.snapshot.every.as_secs();
    apply_env(
        &environment.snapshot_interval,
        "PHAROS_SNAPSHOT_INTERVAL_SECS",
        &mut snapshot_secs,
        estack,
    );
    cfg.snapshot.every = Duration::from_secs(snapshot_secs);
    apply_env(
        &environment.stream_queue_size,
        "PHAROS_STREAM_QUEUE_SIZE",
        &mut cfg.stream_queue_size,
        estack,
    );
    apply_env(
        &environment.verbose,
        "PHAROS_VERBOSE",
        &mut cfg.verbose,
        estack,
    );
    if cfg.stream_queue_size == 0 {
        wstack.push("stream.queue_size of 0 is bumped to 1");
        cfg.stream_queue_size = 1;
    }

    cfg.auth = evaluate_auth(file.auth.unwrap_or_default(), environment, estack, wstack);
    cfg
}

/// Resolve the auth mode and collect whatever settings that mode needs.
/// Field resolution order matches the rest: environment beats file
fn evaluate_auth(
    file: AuthSection,
    environment: &EnvVars,
    estack: &mut ErrorStack,
    wstack: &mut WarningStack,
) -> AuthSettings {
    let mode = environment
        .auth_mode
        .clone()
        .or(file.mode)
        .unwrap_or_else(|| "allow-none".to_owned());
    let query_interval = {
        let mut secs = file
            .query_interval_secs
            .unwrap_or(DEFAULT_QUERY_INTERVAL.as_secs());
        apply_env(
            &environment.query_interval,
            "PHAROS_QUERY_INTERVAL_SECS",
            &mut secs,
            estack,
        );
        Duration::from_secs(secs)
    };
    let pick = |env_value: &Option<String>, file_value: Option<String>| {
        env_value.clone().or(file_value)
    };
    match mode.as_str() {
        "allow-all" => {
            wstack.push("authorization is disabled: every request is allowed");
            AuthSettings::AllowAll
        }
        "allow-none" => AuthSettings::AllowNone,
        "static-table" => AuthSettings::StaticTable {
            users_json: pick(&environment.users_json, file.users_json)
                .unwrap_or_else(|| "{}".to_owned()),
            admins_json: pick(&environment.admins_json, file.admins_json)
                .unwrap_or_else(|| "{}".to_owned()),
        },
        "signed-token" => match pick(&environment.token_secret, file.token_secret) {
            Some(secret) if !secret.is_empty() => AuthSettings::SignedToken { secret },
            _ => {
                estack.push("auth mode signed-token needs a non-empty token secret");
                AuthSettings::AllowNone
            }
        },
        "external-identity" => match pick(&environment.identity_url, file.identity_url) {
            Some(url) => AuthSettings::ExternalIdentity {
                url,
                bearer_token: pick(&environment.identity_token, file.identity_token)
                    .unwrap_or_default(),
                query_interval,
            },
            None => {
                estack.push("auth mode external-identity needs an identity service URL");
                AuthSettings::AllowNone
            }
        },
        "legacy-sql" => {
            let mut port = file.db_port.unwrap_or(5432);
            apply_env(&environment.db_port, "PHAROS_DB_PORT", &mut port, estack);
            AuthSettings::LegacySql {
                host: pick(&environment.db_host, file.db_host)
                    .unwrap_or_else(|| "localhost".to_owned()),
                port,
                user: pick(&environment.db_user, file.db_user)
                    .unwrap_or_else(|| "postgres".to_owned()),
                password: pick(&environment.db_password, file.db_password)
                    .unwrap_or_else(|| "postgres".to_owned()),
                dbname: pick(&environment.db_name, file.db_name)
                    .unwrap_or_else(|| "pharos".to_owned()),
                query_interval,
            }
        }
        unknown => {
            estack.push(format!("unknown auth mode '{unknown}'"));
            AuthSettings::AllowNone
        }
    }
}

fn apply_opt<T>(value: Option<T>, target: &mut T) {
    if let Some(value) = value {
        *target = value;
    }
}

fn apply_parsed<T: FromStr>(raw: &str, key: &str, target: &mut T, estack: &mut ErrorStack) {
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => estack.push(format!("could not parse the value of {key}")),
    }
}

fn apply_env<T: FromStr>(
    raw: &Option<String>,
    key: &str,
    target: &mut T,
    estack: &mut ErrorStack,
) {
    if let Some(raw) = raw {
        apply_parsed(raw, key, target, estack);
    }
}
