use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use super::{KEEPALIVE_REQUEST, KEEPALIVE_RESPONSE};
use crate::error::Error;
use crate::headers::{ContentLength, HeaderParse};

//stream_oriented
pub(crate) struct StreamDecoder {
    max_message_size: usize,
}

impl StreamDecoder {
    pub(crate) fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Decoder for StreamDecoder {
    type Error = Error;
    type Item = Bytes;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Keep-alives are framed like any other item so the reader can
        // answer pings and drop pongs.
        if src.starts_with(KEEPALIVE_REQUEST) {
            return Ok(Some(src.split_to(KEEPALIVE_REQUEST.len()).freeze()));
        }
        if src.starts_with(KEEPALIVE_RESPONSE) {
            // A lone CRLF may still grow into a ping. Hold it until the
            // next bytes decide.
            if KEEPALIVE_REQUEST.starts_with(src) {
                return Ok(None);
            }
            return Ok(Some(src.split_to(KEEPALIVE_RESPONSE.len()).freeze()));
        }

        // Find header end.
        let hdr_end = b"\n\r\n";
        let pos = find_subslice(src, hdr_end);
        let Some(pos) = pos else {
            if src.len() > self.max_message_size {
                return Err(Error::MessageTooBig(src.len()));
            }
            return Ok(None);
        };
        let body_start = pos + 3;
        let hdr_end = pos + 1;

        // Find "Content-Length" header
        let mut content_length = None;

        let lines = src[..hdr_end].split(|&b| b == b'\n');
        for line in lines {
            let mut split = line.splitn(2, |&c| c == b':');
            let Some(name) = split.next() else {
                continue;
            };
            if ContentLength::matches_name(name) {
                let Some(value) = split.next() else {
                    continue;
                };
                let Ok(value_str) = std::str::from_utf8(value) else {
                    return Err(Error::ParseError(
                        "Invalid UTF-8 in Content-Length header".into(),
                    ));
                };
                if let Ok(parsed_value) = value_str.trim().parse::<usize>() {
                    content_length = Some(parsed_value);
                }
            }
        }

        // Streams carry no other frame delimiter. A message without a
        // Content-Length cannot be framed, so the channel has to go down.
        let Some(c_len) = content_length else {
            return Err(Error::MissingRequiredHeader(ContentLength::NAME));
        };

        let expected_msg_size = body_start + c_len;
        if expected_msg_size > self.max_message_size {
            return Err(Error::MessageTooBig(expected_msg_size));
        }
        if src.len() < expected_msg_size {
            src.reserve(expected_msg_size - src.len());
            return Ok(None);
        }
        let src_bytes = src.split_to(expected_msg_size);

        Ok(Some(src_bytes.freeze()))
    }
}

fn find_subslice(src: &[u8], buf: &[u8]) -> Option<usize> {
    src.windows(buf.len()).position(|w| w == buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTER: &[u8] = b"REGISTER sip:registrar.biloxi.com SIP/2.0\r\n\
        Via: SIP/2.0/TCP bobspc.biloxi.com:5060;branch=z9hG4bKnashds7\r\n\
        To: Bob <sip:bob@biloxi.com>\r\n\
        From: Bob <sip:bob@biloxi.com>;tag=456248\r\n\
        Call-ID: 843817637684230@998sdasdh09\r\n\
        CSeq: 1826 REGISTER\r\n\
        Content-Length: 0\r\n\r\n";

    fn decoder() -> StreamDecoder {
        StreamDecoder::new(crate::parser::MAX_MESSAGE_SIZE)
    }

    #[test]
    fn test_decode_complete_message() {
        let mut src = BytesMut::from(REGISTER);

        let frame = decoder().decode(&mut src).unwrap().unwrap();

        assert_eq!(&frame[..], REGISTER);
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_waits_for_body() {
        let msg = b"MESSAGE sip:bob@biloxi.com SIP/2.0\r\n\
            Content-Length: 12\r\n\r\nHello";
        let mut src = BytesMut::from(&msg[..]);
        let mut decoder = decoder();

        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(b", world");
        let frame = decoder.decode(&mut src).unwrap().unwrap();

        assert!(frame.ends_with(b"Hello, world"));
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_waits_for_headers() {
        let mut src = BytesMut::from(&b"INVITE sip:bob@biloxi.com SIP/2.0\r\nVia: "[..]);

        assert!(decoder().decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_decode_two_pipelined_messages() {
        let mut src = BytesMut::from(REGISTER);
        src.extend_from_slice(REGISTER);
        let mut decoder = decoder();

        assert!(decoder.decode(&mut src).unwrap().is_some());
        assert!(decoder.decode(&mut src).unwrap().is_some());
        assert!(decoder.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_decode_keep_alive_ping_and_pong() {
        let mut src = BytesMut::from(&b"\r\n\r\n"[..]);
        let mut decoder = decoder();

        let frame = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(&frame[..], KEEPALIVE_REQUEST);

        // A pong followed by a message must not be glued together.
        let mut src = BytesMut::from(&b"\r\n"[..]);
        src.extend_from_slice(REGISTER);

        let frame = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(&frame[..], KEEPALIVE_RESPONSE);

        let frame = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(&frame[..], REGISTER);
    }

    #[test]
    fn test_decode_lone_crlf_is_held() {
        let mut src = BytesMut::from(&b"\r\n"[..]);

        assert!(decoder().decode(&mut src).unwrap().is_none());
        assert_eq!(src.len(), 2);
    }

    #[test]
    fn test_decode_missing_content_length_is_fatal() {
        let msg = b"OPTIONS sip:bob@biloxi.com SIP/2.0\r\n\
            Via: SIP/2.0/TCP client.atlanta.com;branch=z9hG4bK74b2\r\n\r\n";
        let mut src = BytesMut::from(&msg[..]);

        let err = decoder().decode(&mut src).unwrap_err();

        assert_matches!(err, Error::MissingRequiredHeader("Content-Length"));
    }

    #[test]
    fn test_decode_oversized_message_is_fatal() {
        let msg = b"MESSAGE sip:bob@biloxi.com SIP/2.0\r\n\
            Content-Length: 90000\r\n\r\n";
        let mut src = BytesMut::from(&msg[..]);

        let err = decoder().decode(&mut src).unwrap_err();

        assert_matches!(err, Error::MessageTooBig(_));
    }

    #[test]
    fn test_decode_oversized_header_block_is_fatal() {
        let mut src = BytesMut::from(&b"INVITE sip:bob@biloxi.com SIP/2.0\r\n"[..]);
        src.extend_from_slice(&vec![b'x'; crate::parser::MAX_MESSAGE_SIZE]);

        let err = decoder().decode(&mut src).unwrap_err();

        assert_matches!(err, Error::MessageTooBig(_));
    }
}
