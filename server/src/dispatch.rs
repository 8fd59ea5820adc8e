/*
 * Created on Wed Oct 25 2023
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

//! # The request dispatcher
//!
//! Takes one decoded request at a time, validates the path, consults the
//! authorizer exactly once, runs the verb's action and sends exactly one
//! immediate response. Each request runs inside its own task so that a
//! panicking handler degrades into a 500 response instead of taking the
//! connection (or the process) down with it.

use crate::actions::{self, ActionError};
use crate::auth::Authorizer;
use crate::client::{Client, SendError};
use crate::namespace::Namespace;
use crate::protocol::{Request, Response, Verb};
use std::sync::Arc;

/// Dispatch tunables that come out of the configuration
#[derive(Debug, Clone)]
pub struct DispatchOpts {
    /// per-stream bounded queue capacity
    pub stream_queue_size: usize,
}

/// Everything a request handler needs: the tree, the authorizer and the
/// tunables. One of these is shared by every connection
pub struct DispatchContext {
    pub namespace: Arc<Namespace>,
    pub auth: Arc<dyn Authorizer>,
    pub opts: DispatchOpts,
}

impl DispatchContext {
    pub fn new(
        namespace: Arc<Namespace>,
        auth: Arc<dyn Authorizer>,
        opts: DispatchOpts,
    ) -> Arc<Self> {
        Arc::new(Self {
            namespace,
            auth,
            opts,
        })
    }
}

/// Handle one request to completion: run it fault-isolated, then send the
/// immediate response. The returned error is a transport error; protocol
/// failures never surface here
pub async fn handle_request(
    ctx: &Arc<DispatchContext>,
    client: &Arc<Client>,
    request: Request,
) -> Result<(), SendError> {
    let reid = request.reid.clone();
    let task_ctx = ctx.clone();
    let task_client = client.clone();
    let outcome = tokio::spawn(async move { process(task_ctx, task_client, request).await }).await;
    let response = match outcome {
        Ok(response) => response,
        Err(join_err) => {
            log::error!("request handler failed unexpectedly: {join_err}");
            let aerr = ActionError::Internal("the request could not be handled".to_owned());
            Response::new(reid)
                .rnum(aerr.status())
                .warning(aerr.to_string())
        }
    };
    client.send(response).await
}

async fn process(ctx: Arc<DispatchContext>, client: Arc<Client>, request: Request) -> Response {
    // path components may not be empty and may not contain the separator;
    // anything else would make snapshot keys ambiguous
    for component in &request.path {
        if component.is_empty() || component.contains('/') {
            let aerr = ActionError::InvalidPath(format!("bad path component '{component}'"));
            return Response::new(request.reid.clone())
                .rnum(aerr.status())
                .warning(aerr.to_string());
        }
    }
    // the authorizer is consulted exactly once per request
    let decision = ctx.auth.authorize(&request);
    if !decision.allowed {
        return Response::new(request.reid.clone()).rnum(decision.code);
    }
    let Some(verb) = Verb::parse(&request.verb) else {
        let aerr = ActionError::UnknownVerb(request.verb.clone());
        return Response::new(request.reid.clone())
            .rnum(aerr.status())
            .warning(aerr.to_string());
    };
    let result = match verb {
        Verb::Post => actions::post::run(&ctx, &client, &request).await,
        Verb::Create => actions::create::run(&ctx, &client, &request).await,
        Verb::Mkdir => actions::mkdir::run(&ctx, &client, &request).await,
        Verb::Delete => actions::delete::run(&ctx, &client, &request).await,
        Verb::List => actions::list::run(&ctx, &client, &request).await,
        Verb::Get => actions::get::run(&ctx, &client, &request).await,
        Verb::Put => actions::put::run(&ctx, &client, &request).await,
        Verb::Stream => actions::stream::run(&ctx, &client, &request).await,
        Verb::Stop => actions::stop::run(&ctx, &client, &request).await,
        Verb::Link => actions::link::run(&ctx, &client, &request).await,
        Verb::Unlink => actions::unlink::run(&ctx, &client, &request).await,
    };
    match result {
        Ok(response) => response,
        Err(aerr) => Response::new(request.reid.clone())
            .rnum(aerr.status())
            .warning(aerr.to_string()),
    }
}

/// The transport reported end-of-connection: force-stop every subscription
/// this client still owns and detach whatever state the authorizer holds
/// for it
pub fn disconnect(ctx: &Arc<DispatchContext>, client: &Arc<Client>) {
    let open_streams = client.stream_count();
    client.disconnect();
    ctx.auth.detach(client.addr());
    log::debug!(
        "client {} disconnected ({open_streams} open streams stopped)",
        client.addr()
    );
}
