/*
 * Created on Mon Oct 23 2023
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

//! Run a `LIST`: recursive by default, flat when the request carries the
//! `NONRECURSIVE` meta flag. Older clients rely on the recursive default

use super::ActionResult;
use crate::client::Client;
use crate::dispatch::DispatchContext;
use crate::protocol::{wire, Request, Response};
use std::sync::Arc;

pub async fn run(
    ctx: &DispatchContext,
    _client: &Arc<Client>,
    request: &Request,
) -> ActionResult<Response> {
    let listing = if request.meta.nonrecursive {
        ctx.namespace.list(&request.path)?
    } else {
        ctx.namespace.list_recursive(&request.path)?
    };
    Ok(Response::new(request.reid.clone())
        .rnum(200)
        .payload(wire::encode_listing(&listing)))
}
