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

//! Run a `STREAM`: subscribe to a resource. The immediate response carries
//! the current value; a background task then forwards every update to the
//! client under the original correlation id until the stream ends.
//!
//! A second STREAM with an already-registered (correlation id, path) pair
//! does not open a second subscription: it answers with the current value
//! and a warning, matching what older clients expect on accidental re-sends.

use super::ActionResult;
use crate::client::{Client, StreamHandle};
use crate::dispatch::DispatchContext;
use crate::protocol::{Request, Response, WARN_ALREADY_STREAMING};
use std::sync::Arc;

pub async fn run(
    ctx: &DispatchContext,
    client: &Arc<Client>,
    request: &Request,
) -> ActionResult<Response> {
    let broker = ctx.namespace.get_leaf(&request.path)?;
    if client.has_stream(&request.reid, &request.path) {
        return Ok(Response::new(request.reid.clone())
            .rnum(200)
            .payload(broker.get())
            .warning(WARN_ALREADY_STREAMING));
    }
    let mut subscription = if request.meta.lossless {
        broker.stream_lossless()
    } else {
        broker.stream(ctx.opts.stream_queue_size)
    };
    let stream_id = subscription.id();
    client.add_stream(
        request.reid.clone(),
        request.path.clone(),
        StreamHandle {
            stream_id,
            broker: Arc::downgrade(&broker),
        },
    );
    let forwarder = client.clone();
    let reid = request.reid.clone();
    let path = request.path.clone();
    let weak = Arc::downgrade(&broker);
    tokio::spawn(async move {
        while let Some(value) = subscription.recv().await {
            let frame = Response::new(reid.clone()).rnum(200).payload(value);
            if forwarder.send(frame).await.is_err() {
                // transport gone: release the broker-side subscription
                if let Some(broker) = weak.upgrade() {
                    let _ = broker.stop_stream(stream_id);
                }
                break;
            }
        }
        // queue closed (STOP, delete or broker close) or send failure:
        // either way this subscription is finished
        forwarder.forget_stream(&reid, &path, stream_id);
    });
    Ok(Response::new(request.reid.clone())
        .rnum(200)
        .payload(broker.get()))
}
