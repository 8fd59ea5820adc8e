/*
 * Created on Wed Nov 22 2023
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

//! End-to-end scenarios against an in-process dispatcher: everything a real
//! connection does minus the socket. Frames that clients would receive are
//! captured from the session's outgoing channel and decoded with the test
//! codec.

use crate::auth::{AllowAll, AllowNone};
use crate::client::Client;
use crate::dispatch::{self, DispatchContext, DispatchOpts};
use crate::namespace::Namespace;
use crate::protocol::wire::{decode_response, encode_path, DecodedResponse};
use crate::protocol::Request;
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio::time::timeout;

const RECV_PATIENCE: Duration = Duration::from_millis(500);

fn test_ctx() -> Arc<DispatchContext> {
    DispatchContext::new(
        Arc::new(Namespace::new()),
        Arc::new(AllowAll),
        DispatchOpts {
            stream_queue_size: 4,
        },
    )
}

fn test_conn(name: &str) -> (Arc<Client>, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(64);
    (Client::new(name.to_owned(), tx), rx)
}

fn req(reid: u8, verb: &str, path: &[&str]) -> Request {
    Request {
        reid: Bytes::copy_from_slice(&[reid]),
        verb: verb.to_owned(),
        path: path.iter().map(|c| (*c).to_owned()).collect(),
        ..Default::default()
    }
}

fn req_payl(reid: u8, verb: &str, path: &[&str], payl: &[u8]) -> Request {
    Request {
        payl: Bytes::copy_from_slice(payl),
        ..req(reid, verb, path)
    }
}

/// Run one request through the dispatcher and decode the immediate response
async fn roundtrip(
    ctx: &Arc<DispatchContext>,
    client: &Arc<Client>,
    rx: &mut mpsc::Receiver<Bytes>,
    request: Request,
) -> DecodedResponse {
    dispatch::handle_request(ctx, client, request)
        .await
        .expect("the test connection never closes its receiver");
    next_frame(rx).await
}

async fn next_frame(rx: &mut mpsc::Receiver<Bytes>) -> DecodedResponse {
    let frame = timeout(RECV_PATIENCE, rx.recv())
        .await
        .expect("expected a frame before the timeout")
        .expect("the channel must stay open");
    decode_response(&frame).unwrap()
}

async fn expect_silence(rx: &mut mpsc::Receiver<Bytes>) {
    assert!(
        timeout(Duration::from_millis(150), rx.recv()).await.is_err(),
        "no frame should have arrived"
    );
}

#[tokio::test]
async fn create_write_read() {
    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    let resp = roundtrip(&ctx, &client, &mut rx, req_payl(0x01, "POST", &["live"], &[0xA2, b'h', b'i'])).await;
    assert_eq!(resp.rnum, 201);
    assert_eq!(resp.reid, [0x01]);

    let resp = roundtrip(&ctx, &client, &mut rx, req(0x02, "GET", &["live"])).await;
    assert_eq!(resp.rnum, 200);
    assert_eq!(resp.reid, [0x02]);
    assert_eq!(resp.payl, [0xA2, b'h', b'i']);

    // a second POST overwrites and reports 200
    let resp = roundtrip(&ctx, &client, &mut rx, req_payl(0x03, "POST", &["live"], &[0x2A])).await;
    assert_eq!(resp.rnum, 200);
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x04, "GET", &["live"])).await;
    assert_eq!(resp.payl, [0x2A]);
}

#[tokio::test]
async fn stream_fan_out_reaches_only_subscribers() {
    let ctx = test_ctx();
    let (alice, mut alice_rx) = test_conn("alice");
    let (bob, mut bob_rx) = test_conn("bob");

    roundtrip(&ctx, &alice, &mut alice_rx, req(0x01, "POST", &["r"])).await;
    let resp = roundtrip(&ctx, &alice, &mut alice_rx, req(0x10, "STREAM", &["r"])).await;
    assert_eq!(resp.rnum, 200);
    assert_eq!(resp.payl, [0xC0], "the immediate response carries the current value");

    let resp = roundtrip(&ctx, &bob, &mut bob_rx, req_payl(0x20, "PUT", &["r"], &[0x01])).await;
    assert_eq!(resp.rnum, 200);

    // the follow-on frame reuses the STREAM's correlation id
    let update = next_frame(&mut alice_rx).await;
    assert_eq!(update.reid, [0x10]);
    assert_eq!(update.rnum, 200);
    assert_eq!(update.payl, [0x01]);

    // the writer hears nothing beyond its own response
    expect_silence(&mut bob_rx).await;
}

#[tokio::test]
async fn duplicate_stream_does_not_double_subscribe() {
    let ctx = test_ctx();
    let (subscriber, mut sub_rx) = test_conn("subscriber");
    let (writer, mut writer_rx) = test_conn("writer");
    roundtrip(&ctx, &subscriber, &mut sub_rx, req(0x01, "POST", &["r"])).await;
    roundtrip(&ctx, &subscriber, &mut sub_rx, req(0x10, "STREAM", &["r"])).await;
    let resp = roundtrip(&ctx, &subscriber, &mut sub_rx, req(0x10, "STREAM", &["r"])).await;
    assert_eq!(resp.rnum, 200);
    assert_eq!(resp.warnings, ["already-streaming"]);

    roundtrip(&ctx, &writer, &mut writer_rx, req_payl(0x02, "PUT", &["r"], &[0x05])).await;
    let update = next_frame(&mut sub_rx).await;
    assert_eq!(update.payl, [0x05]);
    // exactly one subscription, so exactly one follow-on frame
    expect_silence(&mut sub_rx).await;
}

#[tokio::test]
async fn link_cycle_rejection_and_recovery() {
    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    roundtrip(&ctx, &client, &mut rx, req(0x01, "CREATE", &["a"])).await;
    roundtrip(&ctx, &client, &mut rx, req(0x02, "CREATE", &["b"])).await;

    let link_b_into_a = req_payl(0x03, "LINK", &["a"], &encode_path(&["b".to_owned()]));
    assert_eq!(roundtrip(&ctx, &client, &mut rx, link_b_into_a).await.rnum, 200);

    let link_a_into_b = req_payl(0x04, "LINK", &["b"], &encode_path(&["a".to_owned()]));
    let resp = roundtrip(&ctx, &client, &mut rx, link_a_into_b.clone()).await;
    assert_eq!(resp.rnum, 409);
    assert_eq!(resp.response, "Conflict");

    let unlink = req_payl(0x05, "UNLINK", &["a"], &encode_path(&["b".to_owned()]));
    assert_eq!(roundtrip(&ctx, &client, &mut rx, unlink).await.rnum, 200);

    // with the first edge gone the reverse direction is legal
    assert_eq!(roundtrip(&ctx, &client, &mut rx, link_a_into_b).await.rnum, 200);
}

#[tokio::test]
async fn linked_puts_propagate_and_duplicate_links_warn() {
    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    roundtrip(&ctx, &client, &mut rx, req(0x01, "CREATE", &["dst"])).await;
    roundtrip(&ctx, &client, &mut rx, req(0x02, "CREATE", &["src"])).await;
    let link = req_payl(0x03, "LINK", &["dst"], &encode_path(&["src".to_owned()]));
    assert_eq!(roundtrip(&ctx, &client, &mut rx, link.clone()).await.rnum, 200);

    let resp = roundtrip(&ctx, &client, &mut rx, link).await;
    assert_eq!(resp.rnum, 200);
    assert_eq!(resp.warnings, ["link-already-exists"]);

    roundtrip(&ctx, &client, &mut rx, req_payl(0x04, "PUT", &["src"], &[0x2A])).await;
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x05, "GET", &["dst"])).await;
    assert_eq!(resp.payl, [0x2A]);
}

#[tokio::test]
async fn delete_cascades_into_streams() {
    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    roundtrip(&ctx, &client, &mut rx, req(0x01, "POST", &["d", "leaf"])).await;
    roundtrip(&ctx, &client, &mut rx, req(0x10, "STREAM", &["d", "leaf"])).await;

    let resp = roundtrip(&ctx, &client, &mut rx, req(0x02, "DELETE", &["d"])).await;
    assert_eq!(resp.rnum, 200);

    // the forwarding task drains out; no further frames arrive
    expect_silence(&mut rx).await;
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x03, "GET", &["d", "leaf"])).await;
    assert_eq!(resp.rnum, 404);

    // the registration disappears once the forwarder notices the close
    for _ in 0..100 {
        if client.stream_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.stream_count(), 0);
}

#[tokio::test]
async fn stop_ends_the_stream_and_requires_a_match() {
    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    roundtrip(&ctx, &client, &mut rx, req(0x01, "POST", &["r"])).await;

    // STOP with nothing registered
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x10, "STOP", &["r"])).await;
    assert_eq!(resp.rnum, 404);

    roundtrip(&ctx, &client, &mut rx, req(0x10, "STREAM", &["r"])).await;
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x10, "STOP", &["r"])).await;
    assert_eq!(resp.rnum, 200);

    roundtrip(&ctx, &client, &mut rx, req_payl(0x02, "PUT", &["r"], &[0x07])).await;
    expect_silence(&mut rx).await;
}

#[tokio::test]
async fn disconnect_releases_every_subscription() {
    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    roundtrip(&ctx, &client, &mut rx, req(0x01, "POST", &["r1"])).await;
    roundtrip(&ctx, &client, &mut rx, req(0x02, "POST", &["r2"])).await;
    roundtrip(&ctx, &client, &mut rx, req(0x10, "STREAM", &["r1"])).await;
    roundtrip(&ctx, &client, &mut rx, req(0x11, "STREAM", &["r2"])).await;
    assert_eq!(client.stream_count(), 2);

    dispatch::disconnect(&ctx, &client);
    assert_eq!(client.stream_count(), 0);

    // the brokers no longer hold live subscribers for this client
    roundtrip(&ctx, &client, &mut rx, req_payl(0x03, "PUT", &["r1"], &[0x01])).await;
    roundtrip(&ctx, &client, &mut rx, req_payl(0x04, "PUT", &["r2"], &[0x02])).await;
    expect_silence(&mut rx).await;
}

#[tokio::test]
async fn snapshot_and_restore_through_the_dispatcher() {
    let snapshot_path = std::env::temp_dir().join(format!(
        "pharos-test-dispatch-{}.snapshot",
        std::process::id()
    ));
    let snapshot_path = snapshot_path.to_string_lossy().into_owned();

    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    roundtrip(&ctx, &client, &mut rx, req_payl(0x01, "POST", &["x"], &[0x01])).await;
    roundtrip(&ctx, &client, &mut rx, req_payl(0x02, "POST", &["y", "z"], &[0x02])).await;

    let mut file = crate::storage::flush::open_snapshot_file(&snapshot_path).unwrap();
    crate::storage::flush::flush_to(&mut file, &ctx.namespace).unwrap();
    drop(file);

    // a "restarted server": fresh namespace, same snapshot path
    let restarted = test_ctx();
    assert!(crate::storage::unflush::restore(&restarted.namespace, &snapshot_path).unwrap());
    let (client, mut rx) = test_conn("b");
    let resp = roundtrip(&restarted, &client, &mut rx, req(0x03, "GET", &["x"])).await;
    assert_eq!(resp.payl, [0x01]);
    let resp = roundtrip(&restarted, &client, &mut rx, req(0x04, "GET", &["y", "z"])).await;
    assert_eq!(resp.payl, [0x02]);
    let resp = roundtrip(&restarted, &client, &mut rx, req(0x05, "LIST", &[])).await;
    assert_eq!(resp.rnum, 200);
    // {"x": nil, "y": {"z": nil}}
    assert_eq!(
        resp.payl,
        [0x82, 0xA1, b'x', 0xC0, 0xA1, b'y', 0x81, 0xA1, b'z', 0xC0]
    );

    let _ = std::fs::remove_file(&snapshot_path);
}

#[tokio::test]
async fn nonrecursive_list_flattens_directories() {
    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    roundtrip(&ctx, &client, &mut rx, req(0x01, "POST", &["x"])).await;
    roundtrip(&ctx, &client, &mut rx, req(0x02, "POST", &["y", "z"])).await;
    let mut list = req(0x03, "LIST", &[]);
    list.meta.nonrecursive = true;
    let resp = roundtrip(&ctx, &client, &mut rx, list).await;
    // {"x": nil, "y": {}}
    assert_eq!(resp.payl, [0x82, 0xA1, b'x', 0xC0, 0xA1, b'y', 0x80]);
}

#[tokio::test]
async fn allow_none_gates_everything_and_mutates_nothing() {
    let ctx = DispatchContext::new(
        Arc::new(Namespace::new()),
        Arc::new(AllowNone),
        DispatchOpts {
            stream_queue_size: 4,
        },
    );
    let (client, mut rx) = test_conn("a");
    let resp = roundtrip(&ctx, &client, &mut rx, req_payl(0x01, "POST", &["live"], &[0x01])).await;
    assert_eq!(resp.rnum, 401);
    assert_eq!(resp.reid, [0x01]);
    assert!(ctx.namespace.get_leaf(&["live".to_owned()]).is_err());
}

#[tokio::test]
async fn unknown_verbs_and_bad_paths_are_rejected() {
    let ctx = test_ctx();
    let (client, mut rx) = test_conn("a");
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x01, "FLUSH", &["r"])).await;
    assert_eq!(resp.rnum, 405);
    assert_eq!(resp.response, "Method Not Allowed");

    let resp = roundtrip(&ctx, &client, &mut rx, req(0x02, "POST", &["a/b"])).await;
    assert_eq!(resp.rnum, 400);
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x03, "POST", &["", "x"])).await;
    assert_eq!(resp.rnum, 400);

    // empty path on mutating verbs
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x04, "PUT", &[])).await;
    assert_eq!(resp.rnum, 400);
    let resp = roundtrip(&ctx, &client, &mut rx, req(0x05, "DELETE", &[])).await;
    assert_eq!(resp.rnum, 404);

    // LINK with a payload that is not a path
    roundtrip(&ctx, &client, &mut rx, req(0x06, "CREATE", &["a"])).await;
    let resp = roundtrip(&ctx, &client, &mut rx, req_payl(0x07, "LINK", &["a"], &[0x2A])).await;
    assert_eq!(resp.rnum, 400);
}

#[tokio::test]
async fn lossless_streams_survive_bursts() {
    let ctx = DispatchContext::new(
        Arc::new(Namespace::new()),
        Arc::new(AllowAll),
        DispatchOpts {
            stream_queue_size: 1,
        },
    );
    let (subscriber, mut sub_rx) = test_conn("subscriber");
    let (writer, mut writer_rx) = test_conn("writer");
    roundtrip(&ctx, &subscriber, &mut sub_rx, req(0x01, "POST", &["r"])).await;
    let mut stream = req(0x10, "STREAM", &["r"]);
    stream.meta.lossless = true;
    roundtrip(&ctx, &subscriber, &mut sub_rx, stream).await;

    // a burst far beyond the bounded queue capacity, no drops
    for byte in 0..20u8 {
        let resp =
            roundtrip(&ctx, &writer, &mut writer_rx, req_payl(0x20, "PUT", &["r"], &[byte])).await;
        assert!(resp.warnings.is_empty());
    }
    for byte in 0..20u8 {
        let update = next_frame(&mut sub_rx).await;
        assert_eq!(update.reid, [0x10]);
        assert_eq!(update.payl, [byte]);
    }
}

#[tokio::test]
async fn full_stream_queues_warn_and_spare_other_subscribers() {
    let ctx = DispatchContext::new(
        Arc::new(Namespace::new()),
        Arc::new(AllowAll),
        DispatchOpts {
            stream_queue_size: 1,
        },
    );
    let (writer, mut writer_rx) = test_conn("writer");
    roundtrip(&ctx, &writer, &mut writer_rx, req(0x01, "POST", &["r"])).await;

    // a subscriber that never drains: subscribe directly at the broker so
    // the forwarding task does not empty the queue behind our back
    let broker = ctx.namespace.get_leaf(&["r".to_owned()]).unwrap();
    let mut stalled = broker.stream(1);

    let resp = roundtrip(&ctx, &writer, &mut writer_rx, req_payl(0x02, "PUT", &["r"], &[0x01])).await;
    assert_eq!(resp.rnum, 200);
    assert!(resp.warnings.is_empty());

    let resp = roundtrip(&ctx, &writer, &mut writer_rx, req_payl(0x03, "PUT", &["r"], &[0x02])).await;
    assert_eq!(resp.rnum, 200);
    assert_eq!(resp.warnings, ["stream-skipped"]);

    // the stalled queue kept the first update, dropped the second
    assert_eq!(stalled.recv().await, Some(Bytes::copy_from_slice(&[0x01])));
    // the value itself still advanced
    let resp = roundtrip(&ctx, &writer, &mut writer_rx, req(0x04, "GET", &["r"])).await;
    assert_eq!(resp.payl, [0x02]);
}
