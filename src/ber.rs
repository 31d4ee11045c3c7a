// BER packet tree for LDAP messages.
// Encodes a tree of TLV nodes to bytes and decodes bytes back to a tree.

use crate::error::{LdapError, Result};
use bytes::BytesMut;
use std::io::{Cursor, Read};
use tokio::io::AsyncRead;

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_ENUMERATED: u8 = 0x0A;
pub const TAG_SEQUENCE: u8 = 0x10;
pub const TAG_SET: u8 = 0x11;

/// Upper bound for a single LDAP message on the wire.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Top-level LDAP message is always a SEQUENCE (BER identifier 0x30).
const LDAP_MESSAGE_SEQUENCE_TAG: u8 = 0x30;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Universal,
    Application,
    Context,
    Private,
}

impl Class {
    fn bits(self) -> u8 {
        match self {
            Class::Universal => 0x00,
            Class::Application => 0x40,
            Class::Context => 0x80,
            Class::Private => 0xC0,
        }
    }

    fn from_identifier(identifier: u8) -> Self {
        match identifier & 0xC0 {
            0x00 => Class::Universal,
            0x40 => Class::Application,
            0x80 => Class::Context,
            _ => Class::Private,
        }
    }
}

/// Decoded content of a primitive node.
///
/// Universal OCTET STRINGs decode to `String` when they are valid UTF-8 and to
/// `Bytes` otherwise. Implicitly tagged primitives (application/context class)
/// always decode to `Bytes`; the typed accessors on [`Packet`] reinterpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Integer(i64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    class: Class,
    constructed: bool,
    tag: u8,
    value: Value,
    children: Vec<Packet>,
}

impl Packet {
    pub fn new(class: Class, constructed: bool, tag: u8, value: Value) -> Self {
        Self {
            class,
            constructed,
            tag,
            value,
            children: Vec::new(),
        }
    }

    pub fn constructed(class: Class, tag: u8) -> Self {
        Self::new(class, true, tag, Value::None)
    }

    pub fn sequence() -> Self {
        Self::constructed(Class::Universal, TAG_SEQUENCE)
    }

    pub fn set() -> Self {
        Self::constructed(Class::Universal, TAG_SET)
    }

    pub fn integer(value: i64) -> Self {
        Self::new(Class::Universal, false, TAG_INTEGER, Value::Integer(value))
    }

    pub fn enumerated(value: i64) -> Self {
        Self::new(Class::Universal, false, TAG_ENUMERATED, Value::Integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(Class::Universal, false, TAG_BOOLEAN, Value::Boolean(value))
    }

    pub fn octet_string(value: impl Into<String>) -> Self {
        Self::new(Class::Universal, false, TAG_OCTET_STRING, Value::String(value.into()))
    }

    pub fn octet_bytes(value: Vec<u8>) -> Self {
        Self::new(Class::Universal, false, TAG_OCTET_STRING, Value::Bytes(value))
    }

    pub fn tagged_string(class: Class, tag: u8, value: impl Into<String>) -> Self {
        Self::new(class, false, tag, Value::String(value.into()))
    }

    pub fn tagged_bytes(class: Class, tag: u8, value: Vec<u8>) -> Self {
        Self::new(class, false, tag, Value::Bytes(value))
    }

    pub fn tagged_integer(class: Class, tag: u8, value: i64) -> Self {
        Self::new(class, false, tag, Value::Integer(value))
    }

    pub fn tagged_boolean(class: Class, tag: u8, value: bool) -> Self {
        Self::new(class, false, tag, Value::Boolean(value))
    }

    pub fn append_child(&mut self, child: Packet) {
        self.children.push(child);
    }

    pub fn with_child(mut self, child: Packet) -> Self {
        self.children.push(child);
        self
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    pub fn is(&self, class: Class, tag: u8) -> bool {
        self.class == class && self.tag == tag
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn children(&self) -> &[Packet] {
        &self.children
    }

    pub fn into_children(self) -> Vec<Packet> {
        self.children
    }

    pub fn child(&self, index: usize) -> Result<&Packet> {
        self.children.get(index).ok_or_else(|| {
            LdapError::Decoding(format!(
                "expected child {} in element with tag {}, found {} children",
                index,
                self.tag,
                self.children.len()
            ))
        })
    }

    pub fn as_i64(&self) -> Result<i64> {
        match &self.value {
            Value::Integer(v) => Ok(*v),
            Value::Bytes(b) => integer_from_content(b),
            other => Err(LdapError::Decoding(format!("expected integer, got {:?}", other))),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match &self.value {
            Value::Boolean(v) => Ok(*v),
            Value::Bytes(b) if b.len() == 1 => Ok(b[0] != 0),
            other => Err(LdapError::Decoding(format!("expected boolean, got {:?}", other))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match &self.value {
            Value::String(s) => Ok(s),
            Value::Bytes(b) => std::str::from_utf8(b)
                .map_err(|_| LdapError::Decoding("invalid UTF-8 string".to_string())),
            other => Err(LdapError::Decoding(format!("expected string, got {:?}", other))),
        }
    }

    /// Raw content octets of a string-like primitive; empty for anything else.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.value {
            Value::String(s) => s.as_bytes(),
            Value::Bytes(b) => b,
            _ => &[],
        }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BerWriter::new();
        writer.write_packet(self);
        writer.into_vec()
    }
}

/// Decode exactly one packet; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Packet> {
    let mut reader = BerReader::new(data);
    let packet = reader.read_packet(0)?;
    if reader.remaining() > 0 {
        return Err(LdapError::Decoding(format!(
            "{} trailing bytes after element",
            reader.remaining()
        )));
    }
    Ok(packet)
}

/// Read one complete LDAP message from the stream.
///
/// Bytes beyond the returned frame stay in `buf` for the next call. Returns
/// `Ok(None)` when the peer closes the stream on a frame boundary. The read is
/// cancel-safe: dropping the future never loses buffered bytes.
pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut read_buf = [0u8; 4096];
    loop {
        if let Some(total) = frame_length(buf)? {
            if buf.len() >= total {
                let frame = buf.split_to(total).to_vec();
                return Ok(Some(frame));
            }
        }
        let n = tokio::io::AsyncReadExt::read(reader, &mut read_buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(LdapError::Decoding(format!(
                "connection closed inside a frame ({} bytes buffered)",
                buf.len()
            )));
        }
        buf.extend_from_slice(&read_buf[..n]);
    }
}

/// Total frame size once enough header bytes are buffered.
fn frame_length(buf: &[u8]) -> Result<Option<usize>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    if buf[0] != LDAP_MESSAGE_SEQUENCE_TAG {
        return Err(LdapError::Decoding(format!(
            "expected LDAPMessage SEQUENCE, got tag 0x{:02X}",
            buf[0]
        )));
    }
    let first_byte = buf[1];
    let (header, content) = if (first_byte & 0x80) == 0 {
        (2, first_byte as usize)
    } else {
        let length_bytes = (first_byte & 0x7F) as usize;
        if length_bytes == 0 || length_bytes > 4 {
            return Err(LdapError::Decoding(format!(
                "invalid length encoding 0x{:02X}",
                first_byte
            )));
        }
        if buf.len() < 2 + length_bytes {
            return Ok(None);
        }
        let mut length = 0usize;
        for i in 0..length_bytes {
            length = (length << 8) | buf[2 + i] as usize;
        }
        (2 + length_bytes, length)
    };
    if content > MAX_FRAME_LEN {
        return Err(LdapError::Decoding(format!(
            "frame of {} bytes exceeds limit of {}",
            content, MAX_FRAME_LEN
        )));
    }
    Ok(Some(header + content))
}

fn integer_from_content(content: &[u8]) -> Result<i64> {
    if content.is_empty() {
        return Err(LdapError::Decoding("empty integer".to_string()));
    }
    if content.len() > 8 {
        return Err(LdapError::Decoding(format!(
            "integer too large: {} bytes",
            content.len()
        )));
    }
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in content {
        value = (value << 8) | byte as i64;
    }
    Ok(value)
}

fn integer_content(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // Strip redundant sign octets, keeping the minimal two's complement form.
    while start < 7 {
        let next_high_bit = bytes[start + 1] & 0x80;
        let redundant = (bytes[start] == 0x00 && next_high_bit == 0)
            || (bytes[start] == 0xFF && next_high_bit != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

pub(crate) struct BerReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> BerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    fn read_tag(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| LdapError::Decoding("BER truncated: missing tag".to_string()))?;
        Ok(buf[0])
    }

    fn read_length(&mut self) -> Result<usize> {
        let first_byte = self.read_tag()?;

        if (first_byte & 0x80) == 0 {
            // Short form
            Ok(first_byte as usize)
        } else {
            // Long form
            let length_bytes = (first_byte & 0x7F) as usize;
            if length_bytes == 0 {
                return Err(LdapError::Decoding("indefinite length not supported".to_string()));
            }
            if length_bytes > 4 {
                return Err(LdapError::Decoding(format!(
                    "length too large: {} bytes",
                    length_bytes
                )));
            }
            let bytes = self.read_raw_bytes(length_bytes)?;
            let mut length = 0usize;
            for b in bytes {
                length = (length << 8) | b as usize;
            }
            Ok(length)
        }
    }

    fn read_raw_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.remaining() < n {
            return Err(LdapError::Decoding(format!(
                "BER truncated: need {} bytes, {} remaining",
                n,
                self.remaining()
            )));
        }
        let mut buf = vec![0u8; n];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|e| LdapError::Decoding(e.to_string()))?;
        Ok(buf)
    }

    fn remaining(&self) -> usize {
        let pos = self.cursor.position() as usize;
        let len = self.cursor.get_ref().len();
        len.saturating_sub(pos)
    }

    fn read_packet(&mut self, depth: usize) -> Result<Packet> {
        if depth > MAX_DEPTH {
            return Err(LdapError::Decoding("BER nesting too deep".to_string()));
        }
        let identifier = self.read_tag()?;
        if identifier & 0x1F == 0x1F {
            return Err(LdapError::Decoding(format!(
                "high tag numbers not supported (identifier 0x{:02X})",
                identifier
            )));
        }
        let class = Class::from_identifier(identifier);
        let constructed = identifier & 0x20 != 0;
        let tag = identifier & 0x1F;
        let length = self.read_length()?;
        let content = self.read_raw_bytes(length)?;

        if constructed {
            let mut inner = BerReader::new(&content);
            let mut children = Vec::new();
            while inner.remaining() > 0 {
                children.push(inner.read_packet(depth + 1)?);
            }
            return Ok(Packet {
                class,
                constructed,
                tag,
                value: Value::None,
                children,
            });
        }

        let value = if class == Class::Universal {
            match tag {
                TAG_BOOLEAN => {
                    if content.len() != 1 {
                        return Err(LdapError::Decoding(format!(
                            "boolean value must be 1 byte, got: {}",
                            content.len()
                        )));
                    }
                    Value::Boolean(content[0] != 0)
                }
                TAG_INTEGER | TAG_ENUMERATED => Value::Integer(integer_from_content(&content)?),
                TAG_NULL => Value::None,
                TAG_OCTET_STRING => match String::from_utf8(content) {
                    Ok(s) => Value::String(s),
                    Err(e) => Value::Bytes(e.into_bytes()),
                },
                _ => Value::Bytes(content),
            }
        } else {
            Value::Bytes(content)
        };

        Ok(Packet {
            class,
            constructed,
            tag,
            value,
            children: Vec::new(),
        })
    }
}

pub(crate) struct BerWriter {
    buffer: Vec<u8>,
}

impl BerWriter {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn write_tag(&mut self, tag: u8) {
        self.buffer.push(tag);
    }

    fn write_length(&mut self, length: usize) {
        if length < 128 {
            // Short form
            self.buffer.push(length as u8);
        } else {
            // Long form
            let mut bytes = Vec::new();
            let mut len = length;
            while len > 0 {
                bytes.push((len & 0xFF) as u8);
                len >>= 8;
            }
            bytes.reverse();
            self.buffer.push(0x80 | bytes.len() as u8);
            self.buffer.extend_from_slice(&bytes);
        }
    }

    fn write_packet(&mut self, packet: &Packet) {
        let identifier = packet.class.bits()
            | if packet.constructed { 0x20 } else { 0x00 }
            | (packet.tag & 0x1F);
        self.write_tag(identifier);

        if packet.constructed {
            let mut inner = BerWriter::new();
            for child in &packet.children {
                inner.write_packet(child);
            }
            let content = inner.into_vec();
            self.write_length(content.len());
            self.buffer.extend_from_slice(&content);
            return;
        }

        let content = match &packet.value {
            Value::None => Vec::new(),
            Value::Integer(v) => integer_content(*v),
            Value::Boolean(b) => vec![if *b { 0xFF } else { 0x00 }],
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Bytes(b) => b.clone(),
        };
        self.write_length(content.len());
        self.buffer.extend_from_slice(&content);
    }

    fn into_vec(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encoding_is_minimal() {
        assert_eq!(Packet::integer(0).to_bytes(), vec![0x02, 0x01, 0x00]);
        assert_eq!(Packet::integer(127).to_bytes(), vec![0x02, 0x01, 0x7F]);
        assert_eq!(Packet::integer(128).to_bytes(), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(Packet::integer(256).to_bytes(), vec![0x02, 0x02, 0x01, 0x00]);
        assert_eq!(Packet::integer(-1).to_bytes(), vec![0x02, 0x01, 0xFF]);
        assert_eq!(Packet::integer(-128).to_bytes(), vec![0x02, 0x01, 0x80]);
        assert_eq!(Packet::integer(-129).to_bytes(), vec![0x02, 0x02, 0xFF, 0x7F]);
    }

    #[test]
    fn test_ber_reader_integer() {
        let packet = decode(&[0x02, 0x01, 0x2A]).unwrap();
        assert_eq!(packet.as_i64().unwrap(), 42);
    }

    #[test]
    fn test_ber_reader_negative_integer() {
        let packet = decode(&[0x02, 0x01, 0xFF]).unwrap();
        assert_eq!(packet.as_i64().unwrap(), -1);
        let packet = decode(&[0x02, 0x02, 0xFF, 0x7F]).unwrap();
        assert_eq!(packet.as_i64().unwrap(), -129);
    }

    #[test]
    fn test_ber_reader_boolean() {
        assert!(decode(&[0x01, 0x01, 0xFF]).unwrap().as_bool().unwrap());
        assert!(!decode(&[0x01, 0x01, 0x00]).unwrap().as_bool().unwrap());
        assert!(decode(&[0x01, 0x02, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_ber_reader_enumerated() {
        let packet = decode(&[0x0A, 0x01, 0x02]).unwrap();
        assert_eq!(packet.tag(), TAG_ENUMERATED);
        assert_eq!(packet.as_i64().unwrap(), 2);
    }

    #[test]
    fn test_ber_reader_short_length() {
        let packet = decode(&[0x04, 0x05, 0x68, 0x65, 0x6C, 0x6C, 0x6F]).unwrap();
        assert_eq!(packet.value(), &Value::String("hello".to_string()));
        assert_eq!(packet.as_bytes(), b"hello");
    }

    #[test]
    fn test_octet_string_non_utf8_is_bytes() {
        let packet = decode(&[0x04, 0x02, 0xFF, 0xFE]).unwrap();
        assert_eq!(packet.value(), &Value::Bytes(vec![0xFF, 0xFE]));
        assert!(packet.as_str().is_err());
    }

    #[test]
    fn test_ber_reader_sequence() {
        let packet = decode(&[0x30, 0x03, 0x02, 0x01, 0x2A]).unwrap();
        assert!(packet.is(Class::Universal, TAG_SEQUENCE));
        assert!(packet.is_constructed());
        assert_eq!(packet.children().len(), 1);
        assert_eq!(packet.child(0).unwrap().as_i64().unwrap(), 42);
        assert!(packet.child(1).is_err());
    }

    #[test]
    fn test_ber_writer_long_length() {
        let mut seq = Packet::sequence();
        for _ in 0..200 {
            seq.append_child(Packet::octet_string("test"));
        }
        let bytes = seq.to_bytes();
        assert_eq!(bytes[0], 0x30);
        // 200 * 6 = 1200 content bytes -> 0x82 0x04 0xB0
        assert_eq!(&bytes[1..4], &[0x82, 0x04, 0xB0]);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.children().len(), 200);
        assert_eq!(decoded.child(199).unwrap().as_str().unwrap(), "test");
    }

    #[test]
    fn test_implicit_tags_keep_class() {
        let packet = Packet::constructed(Class::Application, 0)
            .with_child(Packet::integer(3))
            .with_child(Packet::tagged_string(Class::Context, 0, "secret"));
        let bytes = packet.to_bytes();
        assert_eq!(bytes[0], 0x60);
        let decoded = decode(&bytes).unwrap();
        let password = decoded.child(1).unwrap();
        assert!(password.is(Class::Context, 0));
        assert_eq!(password.value(), &Value::Bytes(b"secret".to_vec()));
        assert_eq!(password.as_str().unwrap(), "secret");
    }

    #[test]
    fn test_decode_rejects_truncated_and_trailing() {
        assert!(decode(&[0x04, 0x05, 0x68]).is_err());
        assert!(decode(&[0x02, 0x01, 0x01, 0x00]).is_err());
        assert!(decode(&[0x30, 0x80, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_frame_length() {
        assert_eq!(frame_length(&[0x30]).unwrap(), None);
        assert_eq!(frame_length(&[0x30, 0x05]).unwrap(), Some(7));
        assert_eq!(frame_length(&[0x30, 0x82, 0x01]).unwrap(), None);
        assert_eq!(frame_length(&[0x30, 0x82, 0x01, 0x00]).unwrap(), Some(260));
        assert!(frame_length(&[0x04, 0x01]).is_err());
        assert!(frame_length(&[0x30, 0x85, 0, 0, 0, 0, 0]).is_err());
    }

    #[tokio::test]
    async fn test_read_frame_splits_stream() {
        let first = Packet::sequence().with_child(Packet::integer(1)).to_bytes();
        let second = Packet::sequence().with_child(Packet::integer(2)).to_bytes();
        let mut wire = first.clone();
        wire.extend_from_slice(&second);
        let mut reader = &wire[..];
        let mut buf = BytesMut::new();
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Some(first));
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Some(second));
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_partial_frame_at_eof() {
        let wire = vec![0x30, 0x05, 0x02, 0x01];
        let mut reader = &wire[..];
        let mut buf = BytesMut::new();
        assert!(matches!(
            read_frame(&mut reader, &mut buf).await,
            Err(LdapError::Decoding(_))
        ));
    }
}
