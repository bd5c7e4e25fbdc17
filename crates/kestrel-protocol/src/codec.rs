use crate::{ProtocolError, Request, Result, MAX_LINE_LENGTH, MAX_VALUE_SIZE};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Item block returned by a `get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub key: String,
    pub flags: u32,
    pub data: Bytes,
}

/// One unit of a server response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A CRLF-terminated line, terminator stripped
    Line(String),
    /// `VALUE <key> <flags> <bytes>` header together with its data block
    Value(Value),
}

/// Codec for the memcache text protocol as spoken by Kestrel
///
/// Responses are split into lines; a `VALUE` header is only yielded once
/// its whole data block (and trailing CRLF) has arrived.
#[derive(Debug, Default, Clone, Copy)]
pub struct KestrelCodec;

struct ValueHeader {
    key: String,
    flags: u32,
    len: usize,
}

fn parse_value_header(line: &str) -> Result<Option<ValueHeader>> {
    let mut parts = line.split(' ');
    if parts.next() != Some("VALUE") {
        return Ok(None);
    }

    let malformed = || ProtocolError::Malformed(format!("bad VALUE header: {}", line));
    let key = parts.next().ok_or_else(malformed)?;
    let flags = parts
        .next()
        .and_then(|f| f.parse::<u32>().ok())
        .ok_or_else(malformed)?;
    let len = parts
        .next()
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(malformed)?;

    if len > MAX_VALUE_SIZE {
        return Err(ProtocolError::ValueTooLarge(len));
    }

    Ok(Some(ValueHeader {
        key: key.to_string(),
        flags,
        len,
    }))
}

impl Decoder for KestrelCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let newline = match src.iter().position(|b| *b == b'\n') {
            Some(position) => position,
            None => {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(ProtocolError::LineTooLong(MAX_LINE_LENGTH));
                }
                return Ok(None);
            }
        };

        if newline > MAX_LINE_LENGTH {
            return Err(ProtocolError::LineTooLong(MAX_LINE_LENGTH));
        }

        let line_end = if newline > 0 && src[newline - 1] == b'\r' {
            newline - 1
        } else {
            newline
        };
        let line = std::str::from_utf8(&src[..line_end])
            .map_err(|_| ProtocolError::Malformed("response line is not UTF-8".to_string()))?
            .to_string();

        let header = match parse_value_header(&line)? {
            Some(header) => header,
            None => {
                src.advance(newline + 1);
                return Ok(Some(Frame::Line(line)));
            }
        };

        // Wait for header + data + CRLF before consuming anything
        let data_start = newline + 1;
        let data_end = data_start + header.len;
        if src.len() < data_end + 2 {
            src.reserve(data_end + 2 - src.len());
            return Ok(None);
        }
        if &src[data_end..data_end + 2] != b"\r\n" {
            return Err(ProtocolError::Malformed(format!(
                "data block for '{}' is not terminated by CRLF",
                header.key
            )));
        }

        src.advance(data_start);
        let data = src.split_to(header.len).freeze();
        src.advance(2);

        Ok(Some(Frame::Value(Value {
            key: header.key,
            flags: header.flags,
            data,
        })))
    }
}

impl Encoder<Request> for KestrelCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst);
        Ok(())
    }
}

impl<'a> Encoder<&'a Request> for KestrelCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &'a Request, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Frame> {
        let mut codec = KestrelCodec;
        let mut buffer = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buffer).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_decode_value_then_end() {
        let frames = decode_all(b"VALUE jobs 0 6\r\ntask-1\r\nEND\r\n");
        assert_eq!(
            frames,
            vec![
                Frame::Value(Value {
                    key: "jobs".to_string(),
                    flags: 0,
                    data: Bytes::from_static(b"task-1"),
                }),
                Frame::Line("END".to_string()),
            ]
        );
    }

    #[test]
    fn test_value_may_contain_crlf() {
        let frames = decode_all(b"VALUE jobs 0 9\r\nab\r\nEND\r\n\r\nEND\r\n");
        match &frames[0] {
            Frame::Value(value) => assert_eq!(&value.data[..], b"ab\r\nEND\r\n"),
            other => panic!("Expected value, got {:?}", other),
        }
        assert_eq!(frames[1], Frame::Line("END".to_string()));
    }

    #[test]
    fn test_partial_value_waits() {
        let mut codec = KestrelCodec;
        let mut buffer = BytesMut::from(&b"VALUE jobs 0 6\r\ntas"[..]);

        assert!(codec.decode(&mut buffer).unwrap().is_none());
        // Nothing consumed while waiting
        assert_eq!(buffer.len(), 19);

        buffer.extend_from_slice(b"k-1\r\n");
        let frame = codec.decode(&mut buffer).unwrap().unwrap();
        assert!(matches!(frame, Frame::Value(_)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_line_waits() {
        let mut codec = KestrelCodec;
        let mut buffer = BytesMut::from(&b"STOR"[..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"ED\r\n");
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(Frame::Line("STORED".to_string()))
        );
    }

    #[test]
    fn test_bad_terminator_is_rejected() {
        let mut codec = KestrelCodec;
        let mut buffer = BytesMut::from(&b"VALUE jobs 0 2\r\nabXX"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_line_too_long() {
        let mut codec = KestrelCodec;
        let mut buffer = BytesMut::from(vec![b'x'; MAX_LINE_LENGTH + 1].as_slice());
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::LineTooLong(_))
        ));
    }

    #[test]
    fn test_encode_request() {
        let mut codec = KestrelCodec;
        let mut buffer = BytesMut::new();
        codec
            .encode(
                Request::Get {
                    key: "jobs/peek".to_string(),
                },
                &mut buffer,
            )
            .unwrap();
        assert_eq!(&buffer[..], b"get jobs/peek\r\n");
    }
}
