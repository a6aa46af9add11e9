const DELIMITER: &[u8] = b"\r\n";
const MAX_PARTIAL: usize = 8192;
const TRIMMED_PARTIAL: usize = 4096;

/// Buffers the sensor's byte stream and emits one frame per CRLF-terminated line.
/// The terminator is not part of the emitted frame.
pub struct LineFramer {
    partial: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            partial: Vec::with_capacity(256),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.partial.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = find_delimiter(&self.partial) {
            let line: Vec<u8> = self.partial.drain(..pos + DELIMITER.len()).take(pos).collect();
            if line.is_empty() {
                continue;
            }
            lines.push(line);
        }

        // A sensor that never sends CRLF must not grow the buffer forever
        if self.partial.len() > MAX_PARTIAL {
            log::warn!(
                "Discarding {} bytes of unterminated serial input",
                self.partial.len() - TRIMMED_PARTIAL
            );
            self.partial.drain(..self.partial.len() - TRIMMED_PARTIAL);
        }

        lines
    }

    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    pub fn reset(&mut self) {
        self.partial.clear();
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}
