/*
 * Created on Tue Nov 07 2023
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

//! Per-connection plumbing. The reader half drives dispatch one frame at a
//! time; the writer half lives in its own task behind a channel, which is
//! what serializes response frames from the dispatcher and from stream
//! forwarding tasks. A frame that fails to decode earns a `Bad Request`
//! with a zero correlation id and closes the connection.

use super::{NetOpts, Shutdown};
use crate::client::Client;
use crate::dispatch::{self, DispatchContext};
use crate::protocol::{wire, Response};
use crate::IoResult;
use bytes::Bytes;
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{mpsc, Semaphore},
};

/// What one attempt at reading a frame produced
enum FrameResult {
    Frame(Vec<u8>),
    /// announced length beyond the configured read limit
    TooLarge,
    /// clean end of stream
    Disconnected,
}

pub(super) struct ConnectionHandler {
    ctx: Arc<DispatchContext>,
    stream: Option<TcpStream>,
    addr: SocketAddr,
    opts: NetOpts,
    climit: Arc<Semaphore>,
    shutdown: Shutdown,
    /// held for its lifetime only: the listener's drain channel resolves
    /// once every clone of this is gone
    _drain_tx: mpsc::Sender<()>,
}

impl ConnectionHandler {
    pub fn new(
        ctx: Arc<DispatchContext>,
        stream: TcpStream,
        addr: SocketAddr,
        opts: NetOpts,
        climit: Arc<Semaphore>,
        shutdown: Shutdown,
        _drain_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            ctx,
            stream: Some(stream),
            addr,
            opts,
            climit,
            shutdown,
            _drain_tx,
        }
    }
    pub async fn run(&mut self) -> IoResult<()> {
        let stream = self
            .stream
            .take()
            .expect("a connection handler only runs once");
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel::<Bytes>(64);
        tokio::spawn(write_loop(write_half, rx, self.opts.write_buffer));
        let client = Client::new(self.addr.to_string(), tx);
        self.ctx.auth.attach(client.addr());
        let mut reader = BufReader::with_capacity(self.opts.read_buffer, read_half);
        let result = self.read_loop(&mut reader, &client).await;
        // exactly one disconnect per connection, on every exit path
        dispatch::disconnect(&self.ctx, &client);
        result
    }
    async fn read_loop(
        &mut self,
        reader: &mut BufReader<OwnedReadHalf>,
        client: &Arc<Client>,
    ) -> IoResult<()> {
        while !self.shutdown.already_requested() {
            let frame = tokio::select! {
                frame = read_frame(reader, self.opts.read_limit) => frame,
                _ = self.shutdown.wait() => return Ok(()),
            };
            match frame? {
                FrameResult::Frame(buf) => match wire::decode_request(&buf) {
                    Ok(request) => {
                        if dispatch::handle_request(&self.ctx, client, request)
                            .await
                            .is_err()
                        {
                            // the writer is gone; nothing sensible left to do
                            return Ok(());
                        }
                    }
                    Err(derr) => {
                        log::debug!("client {} sent an undecodable frame: {derr}", self.addr);
                        let _ = client.send(bad_frame_response()).await;
                        return Ok(());
                    }
                },
                FrameResult::TooLarge => {
                    log::debug!(
                        "client {} exceeded the read limit of {} bytes",
                        self.addr,
                        self.opts.read_limit
                    );
                    let _ = client.send(bad_frame_response()).await;
                    return Ok(());
                }
                FrameResult::Disconnected => return Ok(()),
            }
        }
        Ok(())
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        // make sure that the permit is returned to the semaphore even if
        // the handler panicked
        self.climit.add_permits(1);
    }
}

/// The unreadable frame could not tell us its correlation id, so the echo
/// is the literal zero
fn bad_frame_response() -> Response {
    Response::new(Bytes::from_static(&[0x00]))
        .rnum(400)
        .warning("could not decode the request frame")
}

async fn read_frame(
    reader: &mut BufReader<OwnedReadHalf>,
    read_limit: usize,
) -> IoResult<FrameResult> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(FrameResult::Disconnected)
        }
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > read_limit {
        return Ok(FrameResult::TooLarge);
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(FrameResult::Frame(buf))
}

/// Owns the write half. Ends when every sender is gone or the first write
/// fails; either way, pending senders observe the send error
async fn write_loop(write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<Bytes>, buffer: usize) {
    let mut writer = BufWriter::with_capacity(buffer, write_half);
    while let Some(frame) = rx.recv().await {
        let len = (frame.len() as u32).to_be_bytes();
        if writer.write_all(&len).await.is_err()
            || writer.write_all(&frame).await.is_err()
            || writer.flush().await.is_err()
        {
            break;
        }
    }
}
