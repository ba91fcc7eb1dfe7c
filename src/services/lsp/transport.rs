//! `Content-Length` framing over the language server's stdio.
//!
//! The scanner accumulates arriving bytes and yields complete frame bodies.
//! A frame that has not fully arrived leaves the scanner untouched
//! (rewind-on-short): the attempt is retried when more bytes land. Bodies
//! are returned raw; JSON decoding and error policy belong to the caller.

use serde_json::Value;

#[derive(Debug, Default)]
pub struct FrameScanner {
    buf: Vec<u8>,
    pos: usize,
}

const HEADER: &[u8] = b"Content-Length:";
const SEPARATOR: &[u8] = b"\r\n\r\n";

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Try to take one complete frame body off the front of the buffer.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let mut cursor = self.pos;
        // Tolerate stray CRLF between frames.
        while cursor < self.buf.len() && (self.buf[cursor] == b'\r' || self.buf[cursor] == b'\n')
        {
            cursor += 1;
        }
        if self.buf.len() - cursor < HEADER.len()
            || &self.buf[cursor..cursor + HEADER.len()] != HEADER
        {
            return None;
        }
        cursor += HEADER.len();
        while cursor < self.buf.len() && (self.buf[cursor] == b' ' || self.buf[cursor] == b'\t') {
            cursor += 1;
        }
        let digits_start = cursor;
        let mut length = 0usize;
        while cursor < self.buf.len() && self.buf[cursor].is_ascii_digit() {
            length = length * 10 + (self.buf[cursor] - b'0') as usize;
            cursor += 1;
        }
        if cursor == digits_start || length == 0 {
            return None;
        }
        if self.buf.len() - cursor < SEPARATOR.len() {
            return None;
        }
        if &self.buf[cursor..cursor + SEPARATOR.len()] != SEPARATOR {
            return None;
        }
        cursor += SEPARATOR.len();
        if self.buf.len() - cursor < length {
            return None;
        }
        let body = self.buf[cursor..cursor + length].to_vec();
        self.pos = cursor + length;
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        Some(body)
    }
}

/// Encode one frame. The declared length counts the JSON body plus the
/// trailing CRLF written after it.
pub fn encode_frame(payload: &Value) -> Vec<u8> {
    let body = payload.to_string();
    let mut frame =
        Vec::with_capacity(body.len() + 32);
    frame.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len() + 2).as_bytes());
    frame.extend_from_slice(body.as_bytes());
    frame.extend_from_slice(b"\r\n");
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame_for(value: &Value) -> Vec<u8> {
        encode_frame(value)
    }

    #[test]
    fn encode_then_scan_round_trips() {
        let payload = json!({"jsonrpc": "2.0", "method": "initialized"});
        let mut scanner = FrameScanner::new();
        scanner.extend(&frame_for(&payload));
        let body = scanner.next_frame().unwrap();
        let decoded: Value = serde_json::from_slice(&body[..body.len() - 2]).unwrap();
        assert_eq!(decoded, payload);
        assert!(scanner.next_frame().is_none());
    }

    #[test]
    fn scanner_accepts_bodies_without_a_trailer() {
        // Standard servers frame exactly the JSON, no trailing CRLF.
        let body = json!({"id": 1, "result": null}).to_string();
        let mut scanner = FrameScanner::new();
        scanner.extend(format!("Content-Length: {}\r\n\r\n{}", body.len(), body).as_bytes());
        let frame = scanner.next_frame().unwrap();
        let decoded: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(decoded["id"], 1);
    }

    #[test]
    fn short_reads_rewind_until_the_frame_completes() {
        let payload = json!({"method": "x", "params": {"deep": [1, 2, 3]}});
        let frame = frame_for(&payload);
        let mut scanner = FrameScanner::new();
        for chunk in frame.chunks(7) {
            scanner.extend(chunk);
        }
        // Feed partially: every prefix yields nothing.
        let mut partial = FrameScanner::new();
        for (i, chunk) in frame.chunks(7).enumerate() {
            if (i + 1) * 7 < frame.len() {
                partial.extend(chunk);
                assert!(partial.next_frame().is_none(), "prefix yielded a frame");
            } else {
                partial.extend(chunk);
            }
        }
        assert!(partial.next_frame().is_some());
        assert!(scanner.next_frame().is_some());
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let first = json!({"id": 1, "result": "a"});
        let second = json!({"id": 2, "result": "b"});
        let mut bytes = frame_for(&first);
        bytes.extend_from_slice(&frame_for(&second));
        let mut scanner = FrameScanner::new();
        scanner.extend(&bytes);
        let one: Value =
            serde_json::from_slice(scanner.next_frame().unwrap().trim_ascii_end()).unwrap();
        let two: Value =
            serde_json::from_slice(scanner.next_frame().unwrap().trim_ascii_end()).unwrap();
        assert_eq!(one["id"], 1);
        assert_eq!(two["id"], 2);
        assert!(scanner.next_frame().is_none());
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn garbage_without_a_header_is_not_consumed() {
        let mut scanner = FrameScanner::new();
        scanner.extend(b"Content-Len");
        assert!(scanner.next_frame().is_none());
        scanner.extend(b"gth: ");
        assert!(scanner.next_frame().is_none());
        scanner.extend(b"4\r\n\r\nnull");
        let body = scanner.next_frame().unwrap();
        assert_eq!(body, b"null");
    }
}
