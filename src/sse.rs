/// Incremental server-sent-events decoder. Byte chunks off the network can
/// split an event anywhere, so complete events are only released once their
/// terminating blank line has arrived.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns the data payloads of every event
    /// completed by it, in order.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        if chunk.contains('\r') {
            self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(chunk);
        }

        let mut payloads = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let raw_event = self.buffer[..idx].to_string();
            self.buffer = self.buffer[idx + 2..].to_string();

            if let Some(data) = extract_sse_data(&raw_event) {
                payloads.push(data);
            }
        }

        payloads
    }
}

fn extract_sse_data(raw: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.trim_start().to_string());
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
