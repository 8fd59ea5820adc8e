/*
 * Created on Wed Oct 04 2023
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

use super::wire::{
    decode_path, decode_request, decode_response, decode_snapshot, encode_listing, encode_path,
    encode_request, encode_snapshot, DecodeError,
};
use super::{status_phrase, Listing, Request, Response, Verb};
use bytes::Bytes;
use std::collections::HashMap;

fn sample_request() -> Request {
    Request {
        reid: Bytes::from_static(&[0x01]),
        auth: {
            let mut auth = HashMap::new();
            auth.insert("USER".to_owned(), "alice".to_owned());
            auth.insert("TOKEN".to_owned(), "API-TOK".to_owned());
            auth
        },
        verb: "PUT".to_owned(),
        path: vec!["user".to_owned(), "alice".to_owned(), "model".to_owned()],
        meta: Default::default(),
        payl: Bytes::from_static(&[0xA2, b'h', b'i']),
    }
}

#[test]
fn request_roundtrip_is_identity() {
    let frame = encode_request(&sample_request());
    let decoded = decode_request(&frame).unwrap();
    assert_eq!(encode_request(&decoded), frame);
}

#[test]
fn request_fields_decode() {
    let frame = encode_request(&sample_request());
    let decoded = decode_request(&frame).unwrap();
    assert_eq!(&decoded.reid[..], &[0x01]);
    assert_eq!(decoded.verb, "PUT");
    assert_eq!(decoded.path, ["user", "alice", "model"]);
    assert_eq!(decoded.auth["USER"], "alice");
    assert_eq!(decoded.auth["TOKEN"], "API-TOK");
    assert_eq!(&decoded.payl[..], &[0xA2, b'h', b'i']);
    assert!(!decoded.meta.nonrecursive);
}

#[test]
fn request_payload_bytes_are_preserved_verbatim() {
    // a fixext subtree the server cannot interpret must survive untouched
    let mut request = sample_request();
    request.payl = Bytes::from_static(&[0xD5, 0x2A, 0xDE, 0xAD]);
    let decoded = decode_request(&encode_request(&request)).unwrap();
    assert_eq!(&decoded.payl[..], &[0xD5, 0x2A, 0xDE, 0xAD]);
}

#[test]
fn request_unknown_keys_are_skipped() {
    // {"VERB": "GET", "X-FUTURE": {"a": 1}, "PATH": ["live"]}
    let mut frame = vec![0x83];
    frame.extend_from_slice(&[0xA4]);
    frame.extend_from_slice(b"VERB");
    frame.extend_from_slice(&[0xA3]);
    frame.extend_from_slice(b"GET");
    frame.extend_from_slice(&[0xA8]);
    frame.extend_from_slice(b"X-FUTURE");
    frame.extend_from_slice(&[0x81, 0xA1, b'a', 0x01]);
    frame.extend_from_slice(&[0xA4]);
    frame.extend_from_slice(b"PATH");
    frame.extend_from_slice(&[0x91, 0xA4]);
    frame.extend_from_slice(b"live");
    let decoded = decode_request(&frame).unwrap();
    assert_eq!(decoded.verb, "GET");
    assert_eq!(decoded.path, ["live"]);
}

#[test]
fn request_meta_flags_decode() {
    let mut request = sample_request();
    request.meta.nonrecursive = true;
    let decoded = decode_request(&encode_request(&request)).unwrap();
    assert!(decoded.meta.nonrecursive);
    assert!(!decoded.meta.lossless);

    let mut request = sample_request();
    request.meta.lossless = true;
    let decoded = decode_request(&encode_request(&request)).unwrap();
    assert!(decoded.meta.lossless);
    assert!(!decoded.meta.nonrecursive);
}

#[test]
fn request_truncated_frame_is_rejected() {
    let frame = encode_request(&sample_request());
    assert_eq!(
        decode_request(&frame[..frame.len() - 2]),
        Err(DecodeError::Truncated)
    );
}

#[test]
fn request_reserved_marker_is_rejected() {
    // {"PAYL": <0xC1>}
    let frame = [0x81, 0xA4, b'P', b'A', b'Y', b'L', 0xC1];
    assert_eq!(decode_request(&frame), Err(DecodeError::BadMarker));
}

#[test]
fn request_hostile_nesting_is_rejected() {
    let mut frame = vec![0x81, 0xA4, b'P', b'A', b'Y', b'L'];
    frame.extend(std::iter::repeat(0x91).take(80));
    frame.push(0x90);
    assert_eq!(decode_request(&frame), Err(DecodeError::TooDeep));
}

#[test]
fn response_encodes_phrase_and_warnings() {
    let response = Response::new(Bytes::from_static(&[0x07]))
        .rnum(200)
        .payload(Bytes::from_static(&[0x2A]))
        .warning("stream-skipped");
    let decoded = decode_response(&response.into_bytes()).unwrap();
    assert_eq!(decoded.reid, [0x07]);
    assert_eq!(decoded.rnum, 200);
    assert_eq!(decoded.response, "OK");
    assert_eq!(decoded.payl, [0x2A]);
    assert_eq!(decoded.warnings, ["stream-skipped"]);
}

#[test]
fn response_without_payload_encodes_nil() {
    let response = Response::new(Bytes::from_static(&[0x01])).rnum(404);
    let decoded = decode_response(&response.into_bytes()).unwrap();
    assert_eq!(decoded.rnum, 404);
    assert_eq!(decoded.response, "Not Found");
    assert_eq!(decoded.payl, [0xC0]);
}

#[test]
fn status_phrases_cover_the_protocol_codes() {
    for (code, phrase) in [
        (200, "OK"),
        (201, "Created"),
        (400, "Bad Request"),
        (401, "Unauthorized"),
        (403, "Forbidden"),
        (404, "Not Found"),
        (405, "Method Not Allowed"),
        (409, "Conflict"),
        (500, "Internal Server Error"),
        (503, "Service Unavailable"),
    ] {
        assert_eq!(status_phrase(code), phrase);
    }
}

#[test]
fn path_payload_roundtrip() {
    let path = vec!["a".to_owned(), "b".to_owned()];
    assert_eq!(decode_path(&encode_path(&path)).unwrap(), path);
}

#[test]
fn path_payload_rejects_non_arrays() {
    // a map is not a path
    assert_eq!(
        decode_path(&[0x80]),
        Err(DecodeError::Expected("an array"))
    );
    // an array of ints is not a path either
    assert_eq!(
        decode_path(&[0x91, 0x01]),
        Err(DecodeError::Expected("a string"))
    );
}

#[test]
fn listing_encoding_marks_resources_and_directories() {
    let mut inner = HashMap::new();
    inner.insert("z".to_owned(), Listing::Resource);
    let mut top = HashMap::new();
    top.insert("x".to_owned(), Listing::Resource);
    top.insert("y".to_owned(), Listing::Directory(inner));
    let encoded = encode_listing(&Listing::Directory(top));
    // {"x": nil, "y": {"z": nil}} with sorted keys
    assert_eq!(
        &encoded[..],
        &[
            0x82, 0xA1, b'x', 0xC0, 0xA1, b'y', 0x81, 0xA1, b'z', 0xC0
        ]
    );
}

#[test]
fn snapshot_roundtrip() {
    let entries = vec![
        ("x".to_owned(), Bytes::from_static(&[0x01])),
        ("y/z".to_owned(), Bytes::from_static(&[0x02])),
    ];
    let decoded = decode_snapshot(&encode_snapshot(&entries)).unwrap();
    assert_eq!(decoded, entries);
}

#[test]
fn verbs_parse_and_classify() {
    assert_eq!(Verb::parse("STREAM"), Some(Verb::Stream));
    assert_eq!(Verb::parse("FLUSH"), None);
    assert!(Verb::List.is_read_only());
    assert!(Verb::Get.is_read_only());
    assert!(Verb::Stream.is_read_only());
    assert!(Verb::Stop.is_read_only());
    for verb in [
        Verb::Post,
        Verb::Create,
        Verb::Mkdir,
        Verb::Delete,
        Verb::Put,
        Verb::Link,
        Verb::Unlink,
    ] {
        assert!(!verb.is_read_only());
    }
}
