use log::{ debug, warn };
use serde::Deserialize;

use crate::error::ChatError;

/// Hard cap on the pending line buffer. A well-formed stream drains lines as
/// fast as they arrive; only an unterminated or permanently unparseable frame
/// can grow past this, at which point the stream is declared corrupt instead
/// of buffering forever.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Default, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Incremental reducer over an OpenAI-style SSE chat-completion byte stream.
///
/// Feed it raw response chunks in arrival order; it reassembles UTF-8
/// sequences and `data: ` lines across arbitrary chunk boundaries and returns
/// one snapshot of the full accumulated reply for every delta that added
/// non-empty text. Snapshot sequences are identical no matter where the chunk
/// boundaries fall.
pub struct DeltaAccumulator {
    /// Trailing bytes of a multi-byte UTF-8 sequence cut off by a chunk
    /// boundary, waiting for the rest.
    carry: Vec<u8>,
    /// Decoded text not yet consumed as complete lines.
    pending: String,
    /// The assistant reply accumulated so far.
    content: String,
    finished: bool,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self {
            carry: Vec::new(),
            pending: String::new(),
            content: String::new(),
            finished: false,
        }
    }

    /// True once the `[DONE]` sentinel has been observed. Later chunks are
    /// ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Consume one chunk of response bytes. Returns the reply snapshots to
    /// publish, in order, one per non-empty delta decoded from the chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, ChatError> {
        if self.finished {
            return Ok(Vec::new());
        }

        self.decode_chunk(chunk);
        if self.pending.len() > MAX_PENDING_BYTES {
            return Err(ChatError::StreamCorrupted);
        }

        let mut snapshots = Vec::new();
        while let Some(newline) = self.pending.find('\n') {
            let raw: String = self.pending.drain(..=newline).collect();
            let line = raw.strip_suffix('\n').unwrap_or(&raw);
            let line = line.strip_suffix('\r').unwrap_or(line);

            // SSE blank lines and `:` comments double as keep-alives.
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let payload = match line.strip_prefix(DATA_PREFIX) {
                Some(p) => p.trim(),
                None => continue,
            };
            if payload == DONE_SENTINEL {
                self.finished = true;
                break;
            }

            match serde_json::from_str::<StreamResponse>(payload) {
                Ok(frame) => {
                    let delta = frame.choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content);
                    if let Some(text) = delta {
                        if !text.is_empty() {
                            self.content.push_str(&text);
                            snapshots.push(self.content.clone());
                        }
                    }
                }
                Err(e) => {
                    // The payload may be one SSE line split across two read
                    // chunks. Re-queue it (its newline moves to the front so
                    // the tail can rejoin with the next chunk) and wait for
                    // more bytes. The pending cap bounds this if the frame
                    // turns out to be plain garbage.
                    debug!("frame not yet parseable, re-buffering: {}", e);
                    self.pending.insert_str(0, line);
                    self.pending.insert(0, '\n');
                    break;
                }
            }
        }

        Ok(snapshots)
    }

    /// Streaming UTF-8 decode: complete characters go to `pending`, a
    /// truncated trailing sequence is carried to the next chunk, and invalid
    /// bytes become U+FFFD.
    fn decode_chunk(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&bytes) {
                Ok(text) => {
                    self.pending.push_str(text);
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.pending.push_str(&String::from_utf8_lossy(&bytes[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            warn!("invalid UTF-8 in stream, replacing {} byte(s)", bad);
                            self.pending.push('\u{FFFD}');
                            bytes.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the end of the chunk.
                            self.carry = bytes.split_off(valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl Default for DeltaAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_STREAM: &[u8] =
        b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
          data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
          data: [DONE]\n\n";

    fn feed_chunks(chunks: &[&[u8]]) -> (Vec<String>, DeltaAccumulator) {
        let mut acc = DeltaAccumulator::new();
        let mut snapshots = Vec::new();
        for chunk in chunks {
            snapshots.extend(acc.feed(chunk).expect("feed failed"));
        }
        (snapshots, acc)
    }

    #[test]
    fn accumulates_hello_from_one_chunk() {
        let (snapshots, acc) = feed_chunks(&[HELLO_STREAM]);
        assert_eq!(snapshots, vec!["Hel".to_string(), "Hello".to_string()]);
        assert_eq!(acc.content(), "Hello");
        assert!(acc.is_finished());
    }

    #[test]
    fn snapshots_do_not_depend_on_chunk_boundaries() {
        let (reference, _) = feed_chunks(&[HELLO_STREAM]);
        for split in 1..HELLO_STREAM.len() {
            let (snapshots, acc) = feed_chunks(&[
                &HELLO_STREAM[..split],
                &HELLO_STREAM[split..],
            ]);
            assert_eq!(snapshots, reference, "diverged at split offset {}", split);
            assert!(acc.is_finished());
        }
    }

    #[test]
    fn snapshots_grow_monotonically() {
        let (snapshots, _) = feed_chunks(&[HELLO_STREAM]);
        for pair in snapshots.windows(2) {
            assert!(pair[1].starts_with(pair[0].as_str()));
            assert!(pair[1].len() > pair[0].len());
        }
    }

    #[test]
    fn multibyte_char_split_across_chunks_decodes_cleanly() {
        let stream = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo 日本\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = stream.as_bytes();
        // Split inside the two-byte 'é' (first multi-byte char in the stream).
        let split = stream.find('é').unwrap() + 1;
        let (snapshots, acc) = feed_chunks(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(snapshots, vec!["héllo 日本".to_string()]);
        assert!(!acc.content().contains('\u{FFFD}'));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let (snapshots, acc) = feed_chunks(&[b": keep-alive\n\n\n: another\n"]);
        assert!(snapshots.is_empty());
        assert!(!acc.is_finished());
    }

    #[test]
    fn non_data_lines_are_skipped() {
        let (snapshots, acc) = feed_chunks(&[b"event: ping\nid: 7\ndata:[DONE]\n"]);
        assert!(snapshots.is_empty());
        // "data:" without the trailing space is not the data prefix.
        assert!(!acc.is_finished());
    }

    #[test]
    fn json_split_across_chunks_without_newline_recovers() {
        let (snapshots, _) = feed_chunks(&[
            b"data: {\"choices\":",
            b"[{\"delta\":{\"content\":\"hi\"}}]}\n",
        ]);
        assert_eq!(snapshots, vec!["hi".to_string()]);
    }

    #[test]
    fn json_split_after_a_newline_is_rebuffered_and_recovers() {
        // The broken half arrives as a complete physical line; the re-queue
        // path has to stitch it back together with the next chunk.
        let (snapshots, _) = feed_chunks(&[
            b"data: {\"choices\":\n",
            b"[{\"delta\":{\"content\":\"hi\"}}]}\n",
        ]);
        assert_eq!(snapshots, vec!["hi".to_string()]);
    }

    #[test]
    fn done_sentinel_stops_processing_buffered_lines() {
        let mut acc = DeltaAccumulator::new();
        let snapshots = acc
            .feed(b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n")
            .unwrap();
        assert!(snapshots.is_empty());
        assert!(acc.is_finished());
        // Chunks after the sentinel are ignored outright.
        let more = acc
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}\n\n")
            .unwrap();
        assert!(more.is_empty());
        assert_eq!(acc.content(), "");
    }

    #[test]
    fn missing_or_absent_delta_fields_are_noops() {
        let (snapshots, acc) = feed_chunks(&[
            b"data: {\"choices\":[{\"delta\":{}}]}\n\
              data: {\"choices\":[{\"delta\":{\"content\":null}}]}\n\
              data: {\"choices\":[]}\n\
              data: {\"id\":\"cmpl-1\",\"object\":\"chat.completion.chunk\"}\n",
        ]);
        assert!(snapshots.is_empty());
        assert_eq!(acc.content(), "");
    }

    #[test]
    fn empty_content_delta_is_not_published() {
        let (snapshots, _) = feed_chunks(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
        ]);
        assert!(snapshots.is_empty());
    }

    #[test]
    fn extra_frame_fields_are_ignored() {
        let (snapshots, _) = feed_chunks(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\",\"role\":\"assistant\"},\"finish_reason\":null,\"index\":0}],\"model\":\"gpt-4o\"}\n",
        ]);
        assert_eq!(snapshots, vec!["ok".to_string()]);
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let (snapshots, acc) = feed_chunks(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n\r\ndata: [DONE]\r\n",
        ]);
        assert_eq!(snapshots, vec!["hi".to_string()]);
        assert!(acc.is_finished());
    }

    #[test]
    fn unresolved_fragment_at_stream_end_is_silently_discarded() {
        let mut acc = DeltaAccumulator::new();
        let snapshots = acc.feed(b"data: {\"choices\":\n").unwrap();
        assert!(snapshots.is_empty());
        // Nothing more arrives; the fragment just sits in the buffer and the
        // reply stays whatever was accumulated before it.
        assert_eq!(acc.content(), "");
        assert!(!acc.is_finished());
    }

    #[test]
    fn oversized_unparseable_buffer_is_a_hard_error() {
        let mut acc = DeltaAccumulator::new();
        let garbage = vec![b'x'; MAX_PENDING_BYTES + 1];
        match acc.feed(&garbage) {
            Err(ChatError::StreamCorrupted) => {}
            other => panic!("expected StreamCorrupted, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn invalid_utf8_bytes_become_replacement_chars() {
        let mut acc = DeltaAccumulator::new();
        // 0xff can never start a UTF-8 sequence.
        let snapshots = acc
            .feed(b"\xffdata: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n")
            .unwrap();
        // The bad byte lands on the same line as the frame, turning it into a
        // non-matching line; the stream keeps going afterwards.
        assert!(snapshots.is_empty());
        let snapshots = acc
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"next\"}}]}\n")
            .unwrap();
        assert_eq!(snapshots, vec!["next".to_string()]);
    }
}
