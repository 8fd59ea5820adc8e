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

//! Stateless signed-token verification: `AUTH.TOKEN` carries an HS256 JWT
//! whose claims name the account and the admin flag. No table, no polling;
//! revocation is expiry

use super::{path_policy, Authorizer, Decision};
use crate::protocol::Request;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    /// the account name
    sub: String,
    #[serde(default)]
    admin: bool,
}

pub struct SignedToken {
    key: DecodingKey,
    validation: Validation,
}

impl SignedToken {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl Authorizer for SignedToken {
    fn authorize(&self, request: &Request) -> Decision {
        let Some(token) = request.auth.get("TOKEN") else {
            return Decision::deny(401);
        };
        let claims = match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                log::debug!("token verification failed: {e}");
                return Decision::deny(401);
            }
        };
        // a USER field, if present, must agree with the token
        if let Some(user) = request.auth.get("USER") {
            if *user != claims.sub {
                return Decision::deny(401);
            }
        }
        path_policy(&claims.sub, claims.admin, request)
    }
}
