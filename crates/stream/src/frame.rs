/// Event type assumed when a frame carries no `event:` line.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One decoded server-sent-event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

/// Incremental SSE frame splitter.
///
/// `feed` accepts arbitrarily aligned text chunks; an incomplete trailing
/// frame is carried over until the blank-line terminator arrives, so the
/// emitted frames are identical regardless of chunk boundaries.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: String,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds decoded text and returns every frame completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<RawFrame> {
        self.buffer.push_str(chunk);

        let mut frames = Vec::new();
        while let Some((boundary, terminator_len)) = find_frame_boundary(&self.buffer) {
            let block: String = self.buffer.drain(..boundary + terminator_len).collect();
            if let Some(frame) = parse_frame(&block[..boundary]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Text held back because no frame terminator has arrived yet.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Finds the earliest frame terminator, tolerating CRLF line endings.
fn find_frame_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|index| (index, 2));
    let crlf = buffer.find("\r\n\r\n").map(|index| (index, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn parse_frame(block: &str) -> Option<RawFrame> {
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            // Exactly one leading space belongs to the field separator; any
            // further whitespace is payload and must survive, because token
            // accumulation downstream is whitespace-sensitive.
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
        // Anything else (comments starting with ':', unknown fields) is
        // skipped per the SSE convention.
    }

    let event = event.unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());
    let data = data_lines.join("\n");
    if event == DEFAULT_EVENT_TYPE && data.is_empty() {
        // Heartbeat-style no-op frame.
        return None;
    }
    Some(RawFrame { event, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> RawFrame {
        RawFrame {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn splits_frames_regardless_of_chunk_boundaries() {
        let transcript = "event:status\ndata: hello\n\nevent:token\ndata:world\n\n";
        let expected = vec![frame("status", "hello"), frame("token", "world")];

        for split in 0..=transcript.len() {
            let mut parser = FrameParser::new();
            let mut frames = parser.feed(&transcript[..split]);
            frames.extend(parser.feed(&transcript[split..]));
            assert_eq!(frames, expected, "split at offset {split}");
            assert!(parser.pending().is_empty());
        }
    }

    #[test]
    fn strips_exactly_one_leading_space() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("event:token\ndata:  leading two spaces\n\n");
        assert_eq!(frames, vec![frame("token", " leading two spaces")]);
    }

    #[test]
    fn pure_whitespace_payload_survives() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("event:token\ndata:  \n\n");
        assert_eq!(frames, vec![frame("token", " ")]);

        let frames = parser.feed("event:token\ndata: \n\n");
        assert_eq!(frames, vec![frame("token", "")]);
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("event:correction\ndata: first\ndata: second\n\n");
        assert_eq!(frames, vec![frame("correction", "first\nsecond")]);
    }

    #[test]
    fn missing_event_line_defaults_to_message() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("data: hi\n\n");
        assert_eq!(frames, vec![frame("message", "hi")]);
    }

    #[test]
    fn empty_message_frames_are_discarded() {
        let mut parser = FrameParser::new();
        assert!(parser.feed("\n\n").is_empty());
        assert!(parser.feed("data:\n\n").is_empty());
        assert!(parser.feed(": heartbeat comment\n\n").is_empty());
    }

    #[test]
    fn empty_payload_is_emitted_for_non_message_events() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("event:done\n\n");
        assert_eq!(frames, vec![frame("done", "")]);
    }

    #[test]
    fn unrecognized_event_types_still_parse() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("event:telemetry\ndata: {\"x\":1}\n\n");
        assert_eq!(frames, vec![frame("telemetry", "{\"x\":1}")]);
    }

    #[test]
    fn crlf_framing_is_tolerated() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("event:status\r\ndata: ok\r\n\r\n");
        assert_eq!(frames, vec![frame("status", "ok")]);
    }

    #[test]
    fn incomplete_trailing_frame_is_held_back() {
        let mut parser = FrameParser::new();
        assert!(parser.feed("event:token\ndata: partial").is_empty());
        assert_eq!(parser.pending(), "event:token\ndata: partial");

        let frames = parser.feed("ly streamed\n\n");
        assert_eq!(frames, vec![frame("token", "partially streamed")]);
    }
}
