//! Streaming secret redaction.
//!
//! `StreamRedactor` replaces every occurrence of a set of secret
//! literals in a byte stream with `[REDACTED]`, no matter how the
//! stream is chunked. It holds back a tail of `maxSecretLen - 1`
//! bytes between chunks so a secret straddling a chunk boundary is
//! still caught, and flushes the remainder on `finish`.
//!
//! Literals are escaped and compiled into a single alternation sorted
//! longest-first: at any position the longest secret wins, and
//! scanning is leftmost-first overall. Matching happens at the UTF-8
//! byte level; callers are expected to pass UTF-8.

use regex::bytes::Regex;

use crate::errors::{BrokerError, Result};

/// The literal every match is replaced with.
pub const PLACEHOLDER: &[u8] = b"[REDACTED]";

/// A chunk-tolerant redacting transform. One instance per stream —
/// the tail buffer is per-stream state.
pub struct StreamRedactor {
    /// Compiled alternation over all secrets; `None` when the secret
    /// set is empty, which makes the transform the identity.
    pattern: Option<Regex>,

    /// Length in bytes of the longest secret.
    max_len: usize,

    /// Bytes received but not yet emitted.
    pending: Vec<u8>,
}

impl StreamRedactor {
    /// Build a redactor over the given secret literals.
    ///
    /// Empty strings are silently dropped; an empty set yields the
    /// identity transform.
    pub fn new<S: AsRef<str>>(secrets: &[S]) -> Result<Self> {
        let mut literals: Vec<&str> = secrets
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| !s.is_empty())
            .collect();

        if literals.is_empty() {
            return Ok(Self {
                pattern: None,
                max_len: 0,
                pending: Vec::new(),
            });
        }

        // Longest first, so same-position overlaps prefer the longer
        // literal. The sort is stable: equal lengths keep caller order.
        literals.sort_by_key(|s| std::cmp::Reverse(s.len()));
        let max_len = literals[0].len();

        let alternation = literals
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&alternation)
            .map_err(|e| BrokerError::SerializationError(format!("redaction pattern: {e}")))?;

        Ok(Self {
            pattern: Some(pattern),
            max_len,
            pending: Vec::new(),
        })
    }

    /// Feed one input chunk, appending redacted output to `out`.
    ///
    /// Everything except the last `max_len - 1` pending bytes is
    /// emitted; a match starting inside the emitted region is replaced
    /// in full even when it extends past it.
    pub fn write_chunk(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        let Some(pattern) = &self.pattern else {
            out.extend_from_slice(chunk);
            return;
        };

        self.pending.extend_from_slice(chunk);

        let hold = self.max_len - 1;
        if self.pending.len() <= hold {
            return;
        }
        let safe = self.pending.len() - hold;

        let mut cursor = 0;
        for m in pattern.find_iter(&self.pending) {
            if m.start() >= safe {
                break;
            }
            out.extend_from_slice(&self.pending[cursor..m.start()]);
            out.extend_from_slice(PLACEHOLDER);
            cursor = m.end();
        }

        let emitted = if cursor < safe {
            out.extend_from_slice(&self.pending[cursor..safe]);
            safe
        } else {
            cursor
        };
        self.pending.drain(..emitted);
    }

    /// Close the stream: redact and emit the held-back tail.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        let Some(pattern) = &self.pattern else {
            return;
        };

        let mut cursor = 0;
        for m in pattern.find_iter(&self.pending) {
            out.extend_from_slice(&self.pending[cursor..m.start()]);
            out.extend_from_slice(PLACEHOLDER);
            cursor = m.end();
        }
        out.extend_from_slice(&self.pending[cursor..]);
        self.pending.clear();
    }
}

/// One-shot redaction of a complete buffer.
pub fn redact<S: AsRef<str>>(secrets: &[S], input: &[u8]) -> Result<Vec<u8>> {
    let mut redactor = StreamRedactor::new(secrets)?;
    let mut out = Vec::with_capacity(input.len());
    redactor.write_chunk(input, &mut out);
    redactor.finish(&mut out);
    Ok(out)
}
