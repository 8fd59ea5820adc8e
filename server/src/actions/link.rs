/*
 * Created on Tue Oct 24 2023
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

//! Run a `LINK`: the request path names the destination, the payload
//! decodes to the source path. Afterwards every value put into the source
//! is also put into the destination

use super::{ActionError, ActionResult};
use crate::client::Client;
use crate::dispatch::DispatchContext;
use crate::protocol::{wire, Request, Response, WARN_LINK_EXISTS};
use crate::resource::LinkOutcome;
use std::sync::Arc;

pub async fn run(
    ctx: &DispatchContext,
    _client: &Arc<Client>,
    request: &Request,
) -> ActionResult<Response> {
    let destination = ctx.namespace.get_leaf(&request.path)?;
    let source_path = wire::decode_path(&request.payl)
        .map_err(|_| ActionError::Decode("payload is not an array of strings".to_owned()))?;
    let source = ctx.namespace.get_leaf(&source_path)?;
    match destination.link(&source)? {
        LinkOutcome::Linked => Ok(Response::new(request.reid.clone()).rnum(200)),
        LinkOutcome::AlreadyLinked => Ok(Response::new(request.reid.clone())
            .rnum(200)
            .warning(WARN_LINK_EXISTS)),
    }
}
