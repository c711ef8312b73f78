//! Outbound write payload assembly.
//!
//! A `WriteSpans` describes the payload of exactly one outbound write as an
//! ordered list of borrowed byte spans. The spans reference either the
//! relay's echo buffer (buffered regime) or the inbound chunk itself
//! (streaming regime), so no payload bytes are copied to build one.

/// Ordered list of byte spans making up one outbound write.
///
/// Valid only for the duration of that write call; the borrows end when the
/// write is submitted and the relay is free to reuse its buffer.
#[derive(Debug)]
pub struct WriteSpans<'a> {
    spans: Vec<&'a [u8]>,
}

impl<'a> Default for WriteSpans<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> WriteSpans<'a> {
    /// Create an empty span list.
    pub fn new() -> Self {
        Self { spans: Vec::new() }
    }

    /// Create a span list holding a single span.
    pub fn single(span: &'a [u8]) -> Self {
        Self { spans: vec![span] }
    }

    /// Append a span to the end of the list.
    pub fn push(&mut self, span: &'a [u8]) {
        self.spans.push(span);
    }

    /// Total payload length across all spans.
    pub fn total_len(&self) -> usize {
        self.spans.iter().map(|s| s.len()).sum()
    }

    /// Iterate over the spans in order.
    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.spans.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_span() {
        let data = b"hello";
        let spans = WriteSpans::single(data);
        assert_eq!(spans.total_len(), 5);

        let collected: Vec<&[u8]> = spans.iter().collect();
        assert_eq!(collected, vec![&data[..]]);
    }

    #[test]
    fn test_push_preserves_order() {
        let mut spans = WriteSpans::new();
        assert_eq!(spans.total_len(), 0);

        spans.push(b"head");
        spans.push(b"");
        spans.push(b"tail");

        assert_eq!(spans.total_len(), 8);

        let mut assembled = Vec::new();
        for span in spans.iter() {
            assembled.extend_from_slice(span);
        }
        assert_eq!(assembled, b"headtail");
    }
}
