/*
 * Created on Tue Oct 03 2023
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

//! # Frame codec
//!
//! Hand-driven msgpack reading and writing for the three frame shapes the
//! server knows: request maps, response maps and the snapshot map. Reading
//! works marker-first so that opaque subtrees (`REID`, `PAYL`, snapshot
//! values) can be sliced out of the input without re-encoding; writing goes
//! through [`rmp::encode`] and splices raw subtrees back verbatim.

use super::{status_phrase, Listing, Meta, Request, Response};
use bytes::Bytes;
use rmp::encode::{write_array_len, write_map_len, write_nil, write_str, write_uint};
use rmp::Marker;
use std::fmt;

/// Nesting deeper than this is rejected outright. Keeps a hostile frame from
/// recursing the parser off the stack
const MAX_VALUE_DEPTH: usize = 64;

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// ran out of bytes mid-value
    Truncated,
    /// a reserved/never-used marker byte
    BadMarker,
    /// structurally valid msgpack, but not the type the schema wants
    Expected(&'static str),
    /// a string field that is not valid UTF-8
    BadUtf8,
    /// value nesting beyond [`MAX_VALUE_DEPTH`]
    TooDeep,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame ended in the middle of a value"),
            Self::BadMarker => write!(f, "reserved marker byte in frame"),
            Self::Expected(what) => write!(f, "expected {what}"),
            Self::BadUtf8 => write!(f, "string field is not valid UTF-8"),
            Self::TooDeep => write!(f, "value nesting exceeds the supported depth"),
        }
    }
}

type DecodeResult<T> = Result<T, DecodeError>;

/// A positional reader over one frame
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
    fn byte(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }
    fn marker(&mut self) -> DecodeResult<Marker> {
        Ok(Marker::from_u8(self.byte()?))
    }
    fn be_u8(&mut self) -> DecodeResult<usize> {
        Ok(self.byte()? as usize)
    }
    fn be_u16(&mut self) -> DecodeResult<usize> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]) as usize)
    }
    fn be_u32(&mut self) -> DecodeResult<usize> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }
    /// Read a map header
    fn map_len(&mut self) -> DecodeResult<usize> {
        match self.marker()? {
            Marker::FixMap(n) => Ok(n as usize),
            Marker::Map16 => self.be_u16(),
            Marker::Map32 => self.be_u32(),
            _ => Err(DecodeError::Expected("a map")),
        }
    }
    /// Read an array header
    fn array_len(&mut self) -> DecodeResult<usize> {
        match self.marker()? {
            Marker::FixArray(n) => Ok(n as usize),
            Marker::Array16 => self.be_u16(),
            Marker::Array32 => self.be_u32(),
            _ => Err(DecodeError::Expected("an array")),
        }
    }
    /// Read a string
    fn str(&mut self) -> DecodeResult<&'a str> {
        let len = match self.marker()? {
            Marker::FixStr(n) => n as usize,
            Marker::Str8 => self.be_u8()?,
            Marker::Str16 => self.be_u16()?,
            Marker::Str32 => self.be_u32()?,
            _ => return Err(DecodeError::Expected("a string")),
        };
        core::str::from_utf8(self.take(len)?).map_err(|_| DecodeError::BadUtf8)
    }
    /// Validate one value and return its raw byte span
    fn raw_value(&mut self) -> DecodeResult<&'a [u8]> {
        let start = self.pos;
        self.skip_value(0)?;
        Ok(&self.buf[start..self.pos])
    }
    /// Walk over exactly one msgpack value
    fn skip_value(&mut self, depth: usize) -> DecodeResult<()> {
        if depth > MAX_VALUE_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let (data, items) = match self.marker()? {
            Marker::Null
            | Marker::True
            | Marker::False
            | Marker::FixPos(_)
            | Marker::FixNeg(_) => (0, 0),
            Marker::U8 | Marker::I8 => (1, 0),
            Marker::U16 | Marker::I16 => (2, 0),
            Marker::U32 | Marker::I32 | Marker::F32 => (4, 0),
            Marker::U64 | Marker::I64 | Marker::F64 => (8, 0),
            Marker::FixStr(n) => (n as usize, 0),
            Marker::Str8 | Marker::Bin8 => (self.be_u8()?, 0),
            Marker::Str16 | Marker::Bin16 => (self.be_u16()?, 0),
            Marker::Str32 | Marker::Bin32 => (self.be_u32()?, 0),
            Marker::FixExt1 => (2, 0),
            Marker::FixExt2 => (3, 0),
            Marker::FixExt4 => (5, 0),
            Marker::FixExt8 => (9, 0),
            Marker::FixExt16 => (17, 0),
            Marker::Ext8 => (self.be_u8()? + 1, 0),
            Marker::Ext16 => (self.be_u16()? + 1, 0),
            Marker::Ext32 => (self.be_u32()? + 1, 0),
            Marker::FixArray(n) => (0, n as usize),
            Marker::Array16 => (0, self.be_u16()?),
            Marker::Array32 => (0, self.be_u32()?),
            Marker::FixMap(n) => (0, n as usize * 2),
            Marker::Map16 => (0, self.be_u16()? * 2),
            Marker::Map32 => (0, self.be_u32()? * 2),
            Marker::Reserved => return Err(DecodeError::BadMarker),
        };
        self.take(data)?;
        for _ in 0..items {
            self.skip_value(depth + 1)?;
        }
        Ok(())
    }
}

/// Decode a request frame. Unknown envelope keys are skipped; absent keys
/// leave their fields empty
pub fn decode_request(buf: &[u8]) -> DecodeResult<Request> {
    let mut rd = Reader::new(buf);
    let entries = rd.map_len()?;
    let mut request = Request::default();
    for _ in 0..entries {
        match rd.str()? {
            "REID" => request.reid = Bytes::copy_from_slice(rd.raw_value()?),
            "AUTH" => {
                let fields = rd.map_len()?;
                for _ in 0..fields {
                    let key = rd.str()?.to_owned();
                    let value = rd.str()?.to_owned();
                    request.auth.insert(key, value);
                }
            }
            "VERB" => request.verb = rd.str()?.to_owned(),
            "PATH" => {
                let components = rd.array_len()?;
                request.path = Vec::with_capacity(components);
                for _ in 0..components {
                    request.path.push(rd.str()?.to_owned());
                }
            }
            "META" => request.meta = decode_meta(&mut rd)?,
            "PAYL" => request.payl = Bytes::copy_from_slice(rd.raw_value()?),
            _ => {
                rd.skip_value(0)?;
            }
        }
    }
    Ok(request)
}

/// Meta is an open map. Only flags the server recognizes are pulled out,
/// everything else (including non-string keys) is skipped
fn decode_meta(rd: &mut Reader<'_>) -> DecodeResult<Meta> {
    let mut meta = Meta::default();
    let entries = rd.map_len()?;
    for _ in 0..entries {
        let key = rd.raw_value()?;
        let value = rd.raw_value()?;
        // keys are fixstr-encoded; the value must be a plain bool
        if key == b"\xACNONRECURSIVE".as_slice() {
            meta.nonrecursive = value == [Marker::True.to_u8()].as_slice();
        } else if key == b"\xA8LOSSLESS".as_slice() {
            meta.lossless = value == [Marker::True.to_u8()].as_slice();
        }
    }
    Ok(meta)
}

/// Decode a payload that is supposed to be a path (an array of strings).
/// Used by LINK and UNLINK, the only verbs that look inside the payload
pub fn decode_path(raw: &[u8]) -> DecodeResult<Vec<String>> {
    let mut rd = Reader::new(raw);
    let components = rd.array_len()?;
    let mut path = Vec::with_capacity(components);
    for _ in 0..components {
        path.push(rd.str()?.to_owned());
    }
    Ok(path)
}

fn splice_raw(buf: &mut Vec<u8>, raw: &[u8]) {
    if raw.is_empty() {
        write_nil(buf).expect("in-memory encoding cannot fail");
    } else {
        buf.extend_from_slice(raw);
    }
}

/// Encode a response frame. The textual phrase is derived from the status
/// code, an unset payload encodes as nil and an empty correlation id echoes
/// as nil
pub fn encode_response(response: &Response) -> Bytes {
    const E: &str = "in-memory encoding cannot fail";
    let mut buf = Vec::with_capacity(64 + response.payl.as_deref().map_or(0, <[u8]>::len));
    write_map_len(&mut buf, 6).expect(E);
    write_str(&mut buf, "REID").expect(E);
    splice_raw(&mut buf, &response.reid);
    write_str(&mut buf, "RNUM").expect(E);
    write_uint(&mut buf, response.rnum as u64).expect(E);
    write_str(&mut buf, "RESPONSE").expect(E);
    write_str(&mut buf, status_phrase(response.rnum)).expect(E);
    write_str(&mut buf, "META").expect(E);
    write_map_len(&mut buf, 0).expect(E);
    write_str(&mut buf, "PAYL").expect(E);
    splice_raw(&mut buf, response.payl.as_deref().unwrap_or_default());
    write_str(&mut buf, "WARNINGS").expect(E);
    write_array_len(&mut buf, response.warnings.len() as u32).expect(E);
    for warning in &response.warnings {
        write_str(&mut buf, warning).expect(E);
    }
    Bytes::from(buf)
}

/// Encode a listing. Resources encode as nil, directories as maps with
/// sorted keys so the output is deterministic
pub fn encode_listing(listing: &Listing) -> Bytes {
    let mut buf = Vec::new();
    encode_listing_into(listing, &mut buf);
    Bytes::from(buf)
}

fn encode_listing_into(listing: &Listing, buf: &mut Vec<u8>) {
    match listing {
        Listing::Resource => write_nil(buf).expect("in-memory encoding cannot fail"),
        Listing::Directory(entries) => {
            write_map_len(buf, entries.len() as u32).expect("in-memory encoding cannot fail");
            let mut names: Vec<&String> = entries.keys().collect();
            names.sort();
            for name in names {
                write_str(buf, name).expect("in-memory encoding cannot fail");
                encode_listing_into(&entries[name], buf);
            }
        }
    }
}

/// Encode the snapshot map: `/`-joined path strings to raw resource values
pub fn encode_snapshot(entries: &[(String, Bytes)]) -> Bytes {
    let mut buf = Vec::new();
    write_map_len(&mut buf, entries.len() as u32).expect("in-memory encoding cannot fail");
    for (path, value) in entries {
        write_str(&mut buf, path).expect("in-memory encoding cannot fail");
        splice_raw(&mut buf, value);
    }
    Bytes::from(buf)
}

/// Decode a snapshot map back into (path string, raw value) pairs
pub fn decode_snapshot(buf: &[u8]) -> DecodeResult<Vec<(String, Bytes)>> {
    let mut rd = Reader::new(buf);
    let entries = rd.map_len()?;
    let mut pairs = Vec::with_capacity(entries);
    for _ in 0..entries {
        let path = rd.str()?.to_owned();
        let value = Bytes::copy_from_slice(rd.raw_value()?);
        pairs.push((path, value));
    }
    Ok(pairs)
}

/// Encode a path as an array of strings. The inverse of [`decode_path`]
pub fn encode_path(path: &[String]) -> Bytes {
    let mut buf = Vec::new();
    write_array_len(&mut buf, path.len() as u32).expect("in-memory encoding cannot fail");
    for component in path {
        write_str(&mut buf, component).expect("in-memory encoding cannot fail");
    }
    Bytes::from(buf)
}

#[cfg(test)]
pub(crate) use testutil::{decode_response, encode_request, DecodedResponse};

#[cfg(test)]
mod testutil {
    //! Inverse codecs used by the test suites: clients encode requests and
    //! decode responses, the server does the opposite
    use super::*;

    #[derive(Debug, Clone)]
    pub(crate) struct DecodedResponse {
        pub reid: Vec<u8>,
        pub rnum: u64,
        pub response: String,
        pub payl: Vec<u8>,
        pub warnings: Vec<String>,
    }

    fn read_uint(rd: &mut Reader<'_>) -> DecodeResult<u64> {
        match rd.marker()? {
            Marker::FixPos(n) => Ok(n as u64),
            Marker::U8 => Ok(rd.be_u8()? as u64),
            Marker::U16 => Ok(rd.be_u16()? as u64),
            Marker::U32 => Ok(rd.be_u32()? as u64),
            _ => Err(DecodeError::Expected("an unsigned integer")),
        }
    }

    pub(crate) fn decode_response(buf: &[u8]) -> DecodeResult<DecodedResponse> {
        let mut rd = Reader::new(buf);
        let entries = rd.map_len()?;
        let mut response = DecodedResponse {
            reid: Vec::new(),
            rnum: 0,
            response: String::new(),
            payl: Vec::new(),
            warnings: Vec::new(),
        };
        for _ in 0..entries {
            match rd.str()? {
                "REID" => response.reid = rd.raw_value()?.to_vec(),
                "RNUM" => response.rnum = read_uint(&mut rd)?,
                "RESPONSE" => response.response = rd.str()?.to_owned(),
                "PAYL" => response.payl = rd.raw_value()?.to_vec(),
                "WARNINGS" => {
                    for _ in 0..rd.array_len()? {
                        response.warnings.push(rd.str()?.to_owned());
                    }
                }
                _ => {
                    rd.skip_value(0)?;
                }
            }
        }
        Ok(response)
    }

    pub(crate) fn encode_request(request: &Request) -> Vec<u8> {
        let mut buf = Vec::new();
        write_map_len(&mut buf, 6).unwrap();
        write_str(&mut buf, "REID").unwrap();
        splice_raw(&mut buf, &request.reid);
        write_str(&mut buf, "AUTH").unwrap();
        write_map_len(&mut buf, request.auth.len() as u32).unwrap();
        let mut fields: Vec<(&String, &String)> = request.auth.iter().collect();
        fields.sort();
        for (key, value) in fields {
            write_str(&mut buf, key).unwrap();
            write_str(&mut buf, value).unwrap();
        }
        write_str(&mut buf, "VERB").unwrap();
        write_str(&mut buf, &request.verb).unwrap();
        write_str(&mut buf, "PATH").unwrap();
        write_array_len(&mut buf, request.path.len() as u32).unwrap();
        for component in &request.path {
            write_str(&mut buf, component).unwrap();
        }
        write_str(&mut buf, "META").unwrap();
        let flags = [
            ("NONRECURSIVE", request.meta.nonrecursive),
            ("LOSSLESS", request.meta.lossless),
        ];
        write_map_len(&mut buf, flags.iter().filter(|(_, set)| *set).count() as u32).unwrap();
        for (name, _) in flags.iter().filter(|(_, set)| *set) {
            write_str(&mut buf, name).unwrap();
            buf.push(Marker::True.to_u8());
        }
        write_str(&mut buf, "PAYL").unwrap();
        splice_raw(&mut buf, &request.payl);
        buf
    }
}
