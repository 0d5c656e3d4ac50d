//! The conversion engine: drives a converter over an input buffer into a
//! growable output buffer.
//!
//! Each call owns its output buffer. On overflow the buffer capacity doubles
//! and the whole pass restarts from the beginning of the input; partial
//! progress from the failed attempt is discarded. Malformed input either
//! terminates the conversion with the prefix produced so far, or, under
//! [`RecoveryPolicy::SkipMarker`], skips a known out-of-band marker and
//! resumes.

use std::borrow::Cow;

use crate::codec::{ConvertStatus, ConverterHandle};

/// The legacy two-byte out-of-band marker embedded in text by some clients
/// (telnet IAC GA). Codecs cannot interpret it; the skip policy steps over it.
pub const OUT_OF_BAND_MARKER: [u8; 2] = [0xFF, 0xF9];

/// What to do when the converter reports malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Stop the conversion and return the prefix produced so far.
    #[default]
    Strict,
    /// If the remaining input starts with the marker, skip it and resume;
    /// otherwise behave like [`RecoveryPolicy::Strict`].
    SkipMarker([u8; 2]),
}

/// How a conversion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The entire input was converted.
    Complete,
    /// The conversion stopped at input the codec could not convert; the
    /// output holds everything produced before that point.
    TruncatedInvalid,
    /// The output reached the engine's configured capacity limit before the
    /// input was exhausted.
    TruncatedCapacity,
}

/// The outcome of a conversion: the produced bytes plus how it ended.
///
/// The identity path borrows the input; every real conversion owns its
/// output.
#[derive(Debug, Clone)]
pub struct Converted<'a> {
    /// The converted bytes.
    pub bytes: Cow<'a, [u8]>,
    /// Whether the whole input made it into `bytes`.
    pub status: Completion,
}

impl<'a> Converted<'a> {
    fn borrowed(input: &'a [u8]) -> Self {
        Self {
            bytes: Cow::Borrowed(input),
            status: Completion::Complete,
        }
    }

    fn owned(bytes: Vec<u8>, status: Completion) -> Converted<'static> {
        Converted {
            bytes: Cow::Owned(bytes),
            status,
        }
    }

    /// Number of bytes produced.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if no bytes were produced.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True if the entire input was converted.
    pub fn is_complete(&self) -> bool {
        self.status == Completion::Complete
    }

    /// The converted bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take ownership of the converted bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes.into_owned()
    }

    /// Detach the result from the input's lifetime.
    pub fn into_owned(self) -> Converted<'static> {
        Converted {
            bytes: Cow::Owned(self.bytes.into_owned()),
            status: self.status,
        }
    }
}

const DEFAULT_INITIAL_CAPACITY: usize = 64;

/// Drives converter handles over byte buffers.
///
/// The engine is a small bundle of configuration; constructing one is cheap
/// and conversions through separate engines (or separate calls) never share
/// buffers.
#[derive(Debug, Clone)]
pub struct ConversionEngine {
    initial_capacity: usize,
    max_capacity: Option<usize>,
    recovery: RecoveryPolicy,
}

impl Default for ConversionEngine {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_capacity: None,
            recovery: RecoveryPolicy::Strict,
        }
    }
}

impl ConversionEngine {
    /// Engine with default capacity, unbounded growth, strict recovery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the starting output capacity (clamped to at least 1).
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity.max(1);
        self
    }

    /// Bound output growth. Without a bound, input whose converted form
    /// always overflows doubles the buffer forever.
    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = Some(capacity.max(1));
        self
    }

    /// Choose the malformed-input recovery policy.
    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    /// Convert `input` through `handle`.
    ///
    /// A `None` handle is the identity conversion: the input is returned
    /// unchanged, borrowed, with no copy. This is the path taken by
    /// connections that never declared an encoding.
    pub fn translate<'a>(
        &self,
        handle: Option<&ConverterHandle>,
        input: &'a [u8],
    ) -> Converted<'a> {
        let Some(handle) = handle else {
            return Converted::borrowed(input);
        };
        let mut converter = handle.lock();
        let mut capacity = self.initial_capacity.max(1);
        'attempt: loop {
            converter.reset();
            let mut out = vec![0u8; capacity];
            let mut consumed = 0;
            let mut produced = 0;
            loop {
                let (status, read, written) =
                    converter.convert(&input[consumed..], &mut out[produced..], true);
                consumed += read;
                produced += written;
                match status {
                    ConvertStatus::InputEmpty => {
                        out.truncate(produced);
                        return Converted::owned(out, Completion::Complete);
                    }
                    ConvertStatus::OutputFull => {
                        if let Some(max) = self.max_capacity {
                            if capacity >= max {
                                out.truncate(produced);
                                return Converted::owned(out, Completion::TruncatedCapacity);
                            }
                            capacity = capacity.saturating_mul(2).min(max);
                        } else {
                            capacity = capacity.saturating_mul(2);
                        }
                        continue 'attempt;
                    }
                    ConvertStatus::Malformed => {
                        if let RecoveryPolicy::SkipMarker(marker) = self.recovery {
                            if input[consumed..].starts_with(&marker) {
                                consumed += marker.len();
                                continue;
                            }
                        }
                        out.truncate(produced);
                        return Converted::owned(out, Completion::TruncatedInvalid);
                    }
                }
            }
        }
    }

    /// Convert text through `handle`.
    ///
    /// Same as [`translate`](Self::translate) on the UTF-8 bytes; an absent
    /// handle returns the input unchanged.
    pub fn translate_str<'a>(
        &self,
        handle: Option<&ConverterHandle>,
        text: &'a str,
    ) -> Converted<'a> {
        self.translate(handle, text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::codec::{ConvertStatus, Converter, ConverterHandle};

    /// Writes every input byte twice. Forces overflow on small buffers.
    struct Doubler {
        passes: Arc<AtomicUsize>,
    }

    impl Converter for Doubler {
        fn convert(
            &mut self,
            src: &[u8],
            dst: &mut [u8],
            _last: bool,
        ) -> (ConvertStatus, usize, usize) {
            let mut read = 0;
            let mut written = 0;
            for &byte in src {
                if dst.len() - written < 2 {
                    return (ConvertStatus::OutputFull, read, written);
                }
                dst[written] = byte;
                dst[written + 1] = byte;
                written += 2;
                read += 1;
            }
            (ConvertStatus::InputEmpty, read, written)
        }

        fn reset(&mut self) {
            self.passes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Copies bytes through until it meets 0xFF, which it reports malformed.
    struct RejectFf;

    impl Converter for RejectFf {
        fn convert(
            &mut self,
            src: &[u8],
            dst: &mut [u8],
            _last: bool,
        ) -> (ConvertStatus, usize, usize) {
            let mut read = 0;
            let mut written = 0;
            for &byte in src {
                if byte == 0xFF {
                    return (ConvertStatus::Malformed, read, written);
                }
                if written == dst.len() {
                    return (ConvertStatus::OutputFull, read, written);
                }
                dst[written] = byte;
                written += 1;
                read += 1;
            }
            (ConvertStatus::InputEmpty, read, written)
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn test_identity_returns_borrowed_input() {
        let engine = ConversionEngine::new();
        let input = b"hello\xFF";
        let result = engine.translate(None, input);
        assert!(result.is_complete());
        assert_eq!(result.len(), 6);
        assert!(matches!(result.bytes, Cow::Borrowed(_)));
        assert_eq!(result.as_bytes().as_ptr(), input.as_ptr());
    }

    #[test]
    fn test_grows_from_one_byte_to_full_output() {
        let passes = Arc::new(AtomicUsize::new(0));
        let handle = ConverterHandle::new(Box::new(Doubler {
            passes: Arc::clone(&passes),
        }));
        let engine = ConversionEngine::new().with_initial_capacity(1);
        let input: Vec<u8> = (0u8..60).collect();
        let result = engine.translate(Some(&handle), &input);
        assert!(result.is_complete());
        assert_eq!(result.len(), 120);
        let expected: Vec<u8> = input.iter().flat_map(|&b| [b, b]).collect();
        assert_eq!(result.as_bytes(), &expected[..]);
        // 1 → 2 → 4 → ... → 128: one reset per attempt, each a fresh pass.
        assert_eq!(passes.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_capacity_limit_truncates() {
        let passes = Arc::new(AtomicUsize::new(0));
        let handle = ConverterHandle::new(Box::new(Doubler { passes }));
        let engine = ConversionEngine::new()
            .with_initial_capacity(1)
            .with_max_capacity(8);
        let result = engine.translate(Some(&handle), b"abcdefgh");
        assert_eq!(result.status, Completion::TruncatedCapacity);
        assert_eq!(result.as_bytes(), b"aabbccdd");
    }

    #[test]
    fn test_strict_policy_stops_at_malformed_input() {
        let handle = ConverterHandle::new(Box::new(RejectFf));
        let engine = ConversionEngine::new();
        let result = engine.translate(Some(&handle), b"abc\xFF\xF9def");
        assert_eq!(result.status, Completion::TruncatedInvalid);
        assert_eq!(result.as_bytes(), b"abc");
    }

    #[test]
    fn test_skip_marker_policy_resumes_after_marker() {
        let handle = ConverterHandle::new(Box::new(RejectFf));
        let engine =
            ConversionEngine::new().with_recovery(RecoveryPolicy::SkipMarker(OUT_OF_BAND_MARKER));
        let result = engine.translate(Some(&handle), b"abc\xFF\xF9def");
        assert!(result.is_complete());
        assert_eq!(result.as_bytes(), b"abcdef");
    }

    #[test]
    fn test_skip_marker_policy_still_rejects_other_sequences() {
        let handle = ConverterHandle::new(Box::new(RejectFf));
        let engine =
            ConversionEngine::new().with_recovery(RecoveryPolicy::SkipMarker(OUT_OF_BAND_MARKER));
        // 0xFF not followed by 0xF9 stays terminal.
        let result = engine.translate(Some(&handle), b"abc\xFF\x00def");
        assert_eq!(result.status, Completion::TruncatedInvalid);
        assert_eq!(result.as_bytes(), b"abc");
    }

    #[test]
    fn test_marker_at_end_of_input() {
        let handle = ConverterHandle::new(Box::new(RejectFf));
        let engine =
            ConversionEngine::new().with_recovery(RecoveryPolicy::SkipMarker(OUT_OF_BAND_MARKER));
        let result = engine.translate(Some(&handle), b"abc\xFF\xF9");
        assert!(result.is_complete());
        assert_eq!(result.as_bytes(), b"abc");
        // A lone trailing 0xFF is not the marker.
        let result = engine.translate(Some(&handle), b"abc\xFF");
        assert_eq!(result.status, Completion::TruncatedInvalid);
    }

    #[test]
    fn test_empty_input_converts_to_empty_output() {
        let handle = ConverterHandle::new(Box::new(RejectFf));
        let engine = ConversionEngine::new();
        let result = engine.translate(Some(&handle), b"");
        assert!(result.is_complete());
        assert!(result.is_empty());
    }

    #[test]
    fn test_translate_str_identity() {
        let engine = ConversionEngine::new();
        let result = engine.translate_str(None, "héllo");
        assert!(result.is_complete());
        assert_eq!(result.as_bytes(), "héllo".as_bytes());
    }
}
