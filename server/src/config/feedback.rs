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

//! Warning and error accumulation for configuration evaluation. Problems are
//! collected across every source and reported together instead of dying on
//! the first bad key

use std::fmt;

#[derive(Debug, Default, PartialEq)]
pub struct WarningStack {
    warnings: Vec<String>,
}

impl WarningStack {
    pub fn push(&mut self, warning: impl ToString) {
        self.warnings.push(warning.to_string());
    }
    /// Log every warning collected so far
    pub fn print_warnings(&self) {
        for warning in &self.warnings {
            log::warn!("{}", warning);
        }
    }
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ErrorStack {
    errors: Vec<String>,
}

impl ErrorStack {
    pub fn push(&mut self, error: impl ToString) {
        self.errors.push(error.to_string());
    }
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ErrorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "the configuration did not evaluate cleanly:")?;
        for error in &self.errors {
            writeln!(f, " - {error}")?;
        }
        Ok(())
    }
}
