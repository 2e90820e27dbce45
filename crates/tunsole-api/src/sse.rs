// Incremental `text/event-stream` decoder
//
// Feeds raw body chunks in, yields complete messages out. Chunk boundaries
// may fall anywhere, including mid-line. Only the fields the daemon uses
// are kept; `retry:` and comment lines are ignored. A partial message left
// when the stream ends is dropped.

use bytes::{Buf, BytesMut};

/// One dispatched event-stream message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    /// `event:` field, when present.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// `id:` field, when present.
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    pending: SseMessage,
    has_data: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every message it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos);
            self.buf.advance(1);
            let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
            let line = String::from_utf8_lossy(line);

            if let Some(msg) = self.process_line(&line) {
                out.push(msg);
            }
        }

        out
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.pending.event = Some(value.to_owned()),
            "id" => self.pending.id = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let msg = std::mem::take(&mut self.pending);
        let had_data = std::mem::replace(&mut self.has_data, false);
        had_data.then_some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_message() {
        let mut dec = SseDecoder::new();
        let msgs = dec.feed(b"data: {\"running\":true}\n\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, r#"{"running":true}"#);
        assert_eq!(msgs[0].event, None);
    }

    #[test]
    fn handles_split_chunks() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed(b"da").is_empty());
        assert!(dec.feed(b"ta: hel").is_empty());
        assert!(dec.feed(b"lo\r\n").is_empty());
        let msgs = dec.feed(b"\r\ndata: second\n\n");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].data, "hello");
        assert_eq!(msgs[1].data, "second");
    }

    #[test]
    fn joins_multiline_data_and_keeps_fields() {
        let mut dec = SseDecoder::new();
        let msgs = dec.feed(b"event: status\nid: 7\ndata: a\ndata: b\n\n");
        assert_eq!(
            msgs,
            vec![SseMessage {
                event: Some("status".into()),
                data: "a\nb".into(),
                id: Some("7".into()),
            }]
        );
    }

    #[test]
    fn ignores_comments_and_empty_events() {
        let mut dec = SseDecoder::new();
        let msgs = dec.feed(b": keepalive\n\nretry: 1000\n\n");
        assert!(msgs.is_empty());
    }

    #[test]
    fn partial_message_is_not_dispatched() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed(b"data: incomplete\n").is_empty());
    }

    #[test]
    fn interleaved_event_types() {
        let mut dec = SseDecoder::new();
        let mut msgs = dec.feed(b"event: service\ndata: {\"running\":true}\n\nevent: ro");
        msgs.extend(dec.feed(b"utes\ndata: []\n\n: ping\n\ndata: bare\n\n"));

        let summary: Vec<String> = msgs
            .iter()
            .map(|m| format!("{} {}", m.event.as_deref().unwrap_or("message"), m.data))
            .collect();
        insta::assert_snapshot!(summary.join("\n"), @r#"
        service {"running":true}
        routes []
        message bare
        "#);
    }
}
