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

//! Run a `STOP`: cancel the subscription registered under this request's
//! (correlation id, path) pair. The broker closes the queue, so the
//! forwarding task drains and exits on its own

use super::{ActionError, ActionResult};
use crate::client::Client;
use crate::dispatch::DispatchContext;
use crate::protocol::{Request, Response};
use std::sync::Arc;

pub async fn run(
    _ctx: &DispatchContext,
    client: &Arc<Client>,
    request: &Request,
) -> ActionResult<Response> {
    match client.remove_stream(&request.reid, &request.path) {
        Some(handle) => {
            // a gone broker means the resource was deleted; the stream
            // already observed end-of-stream, the registration just lagged
            if let Some(broker) = handle.broker.upgrade() {
                let _ = broker.stop_stream(handle.stream_id);
            }
            Ok(Response::new(request.reid.clone()).rnum(200))
        }
        None => Err(ActionError::StreamNotFound),
    }
}
