//! Line-oriented server-sent-event parsing shared by the openai-compat and
//! anthropic streaming paths.
//!
//! Rules: split on `\r?\n`; empty lines and `:` comment lines carry nothing;
//! `data:` lines carry a JSON payload or the literal `[DONE]`. A line that
//! fails to parse as JSON is ignored rather than killing the stream.

use serde_json::Value;

/// Reassembles complete lines from arbitrary byte chunks. UTF-8 sequences can
/// split across chunk boundaries, so bytes are buffered and decoded per line.
#[derive(Default)]
pub(crate) struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk; returns the lines completed by it (without line ends).
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

pub(crate) enum SsePayload {
    Json(Value),
    Done,
}

/// Parses one SSE line. `None` for empty lines, comments, non-data fields and
/// unparseable payloads.
pub(crate) fn parse_line(line: &str) -> Option<SsePayload> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SsePayload::Done);
    }
    match serde_json::from_str(data) {
        Ok(v) => Some(SsePayload::Json(v)),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_lines_across_chunks() {
        let mut buf = SseLineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        let lines = buf.push(b": 1}\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\": 1}", "data: [DONE]"]);
    }

    #[test]
    fn strips_carriage_returns() {
        let mut buf = SseLineBuffer::new();
        let lines = buf.push(b"data: x\r\n");
        assert_eq!(lines, vec!["data: x"]);
    }

    #[test]
    fn comments_and_other_fields_ignored(){
        assert!(parse_line(": keep-alive").is_none());
        assert!(parse_line("event: message_start").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn done_and_json_payloads() {
        assert!(matches!(parse_line("data: [DONE]"), Some(SsePayload::Done)));
        match parse_line(r#"data: {"k": "v"}"#) {
            Some(SsePayload::Json(v)) => assert_eq!(v["k"], "v"),
            _ => panic!("expected json payload"),
        }
    }

    #[test]
    fn bad_json_is_ignored() {
        assert!(parse_line("data: {truncated").is_none());
    }
}
