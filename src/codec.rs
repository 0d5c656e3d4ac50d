//! Codec service boundary: stateful one-direction converters and the
//! label-resolving service that opens them.
//!
//! The default service resolves labels per the WHATWG Encoding Standard via
//! `encoding_rs`. Two gaps in that registry matter here and are filled with
//! built-in converters: UTF-16LE/BE have no encoder (such labels fail to open
//! outgoing), and UTF-32 does not exist at all but is required for code point
//! array marshaling, so a little-endian UTF-32 converter pair is provided
//! directly.

use std::str;
use std::sync::{Mutex, MutexGuard, PoisonError};

use encoding_rs::{CoderResult, Decoder, DecoderResult, Encoder, EncoderResult, Encoding};

/// Outcome of one conversion chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertStatus {
    /// All input consumed; the chunk is complete.
    InputEmpty,
    /// The output buffer cannot hold the next unit of converted data.
    OutputFull,
    /// The input at the reported read position cannot be converted.
    Malformed,
}

/// One direction of an encoding conversion.
///
/// A converter is stateful across `convert` calls within a single conversion
/// and is returned to its initial state by `reset`. On `Malformed`, the
/// reported read count stops at the first byte of the offending sequence so
/// the caller can inspect or skip it.
pub trait Converter: Send {
    /// Convert a chunk of `src` into `dst`.
    ///
    /// Returns the status together with the number of input bytes read and
    /// output bytes written. `last` signals that `src` is the end of the
    /// input.
    fn convert(&mut self, src: &[u8], dst: &mut [u8], last: bool) -> (ConvertStatus, usize, usize);

    /// Discard any partial state and make the converter reusable.
    fn reset(&mut self);
}

/// A shareable converter, serialized by a mutex.
///
/// The lock is held for an entire conversion (the full grow-and-retry loop),
/// so two conversions through the same direction of the same translator never
/// interleave. A poisoned lock is safe to take over: conversions reset the
/// converter before touching it.
pub struct ConverterHandle {
    inner: Mutex<Box<dyn Converter>>,
}

impl ConverterHandle {
    /// Wrap a converter for shared use.
    pub fn new(converter: Box<dyn Converter>) -> Self {
        Self {
            inner: Mutex::new(converter),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn Converter>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConverterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterHandle").finish_non_exhaustive()
    }
}

/// Opens converters for encoding names.
///
/// `open_encoder` takes a `best_effort` flag: when set, characters the target
/// encoding cannot represent are substituted instead of failing the
/// conversion.
pub trait CodecService: Send + Sync {
    /// Open an external → UTF-8 converter for `label`, if the label is known.
    fn open_decoder(&self, label: &str) -> Option<Box<dyn Converter>>;

    /// Open a UTF-8 → external converter for `label`, if the label is known
    /// and the encoding supports output.
    fn open_encoder(&self, label: &str, best_effort: bool) -> Option<Box<dyn Converter>>;
}

/// Resolved facts about an encoding label.
#[derive(Debug, Clone, Copy)]
pub struct LabelInfo {
    /// Canonical name of the encoding the label resolves to.
    pub canonical: &'static str,
    /// Whether an encoder (outgoing direction) can be opened.
    pub encoder_available: bool,
}

const UTF32_NAME: &str = "UTF-32LE";

fn is_utf32_label(label: &str) -> bool {
    label.eq_ignore_ascii_case("UTF-32") || label.eq_ignore_ascii_case("UTF-32LE")
}

/// The default codec service, backed by `encoding_rs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatwgCodec;

impl WhatwgCodec {
    /// Resolve `label` without opening anything.
    pub fn resolve(label: &str) -> Option<LabelInfo> {
        if is_utf32_label(label) {
            return Some(LabelInfo {
                canonical: UTF32_NAME,
                encoder_available: true,
            });
        }
        let encoding = Encoding::for_label(label.as_bytes())?;
        Some(LabelInfo {
            canonical: encoding.name(),
            encoder_available: encoding.output_encoding() == encoding,
        })
    }
}

impl CodecService for WhatwgCodec {
    fn open_decoder(&self, label: &str) -> Option<Box<dyn Converter>> {
        if is_utf32_label(label) {
            return Some(Box::new(Utf32Decoder));
        }
        let encoding = Encoding::for_label(label.as_bytes())?;
        Some(Box::new(RsDecoder::new(encoding)))
    }

    fn open_encoder(&self, label: &str, best_effort: bool) -> Option<Box<dyn Converter>> {
        if is_utf32_label(label) {
            return Some(Box::new(Utf32Encoder));
        }
        let encoding = Encoding::for_label(label.as_bytes())?;
        // UTF-16LE/BE and replacement are decode-only in encoding_rs.
        if encoding.output_encoding() != encoding {
            return None;
        }
        Some(Box::new(RsEncoder::new(encoding, best_effort)))
    }
}

/// External bytes → UTF-8, strict.
struct RsDecoder {
    encoding: &'static Encoding,
    decoder: Decoder,
}

impl RsDecoder {
    fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            decoder: encoding.new_decoder_without_bom_handling(),
        }
    }
}

impl Converter for RsDecoder {
    fn convert(&mut self, src: &[u8], dst: &mut [u8], last: bool) -> (ConvertStatus, usize, usize) {
        let (result, read, written) = self
            .decoder
            .decode_to_utf8_without_replacement(src, dst, last);
        match result {
            DecoderResult::InputEmpty => (ConvertStatus::InputEmpty, read, written),
            DecoderResult::OutputFull => (ConvertStatus::OutputFull, read, written),
            DecoderResult::Malformed(bad, pushback) => {
                // Rewind to the first byte of the malformed sequence.
                let rewound = read.saturating_sub(bad as usize + pushback as usize);
                (ConvertStatus::Malformed, rewound, written)
            }
        }
    }

    fn reset(&mut self) {
        self.decoder = self.encoding.new_decoder_without_bom_handling();
    }
}

/// UTF-8 → external bytes, strict or best-effort.
struct RsEncoder {
    encoding: &'static Encoding,
    encoder: Encoder,
    best_effort: bool,
}

impl RsEncoder {
    fn new(encoding: &'static Encoding, best_effort: bool) -> Self {
        Self {
            encoding,
            encoder: encoding.new_encoder(),
            best_effort,
        }
    }
}

/// Longest prefix of `src` that is valid UTF-8, plus whether anything
/// invalid follows it.
fn utf8_prefix(src: &[u8]) -> (&str, bool) {
    match str::from_utf8(src) {
        Ok(text) => (text, false),
        Err(err) => {
            let valid = str::from_utf8(&src[..err.valid_up_to()]).unwrap_or("");
            (valid, true)
        }
    }
}

impl Converter for RsEncoder {
    fn convert(&mut self, src: &[u8], dst: &mut [u8], last: bool) -> (ConvertStatus, usize, usize) {
        let (text, tail_invalid) = utf8_prefix(src);
        let feed_last = last && !tail_invalid;
        let (status, read, written) = if self.best_effort {
            let (result, read, written, _replaced) =
                self.encoder.encode_from_utf8(text, dst, feed_last);
            let status = match result {
                CoderResult::InputEmpty => ConvertStatus::InputEmpty,
                CoderResult::OutputFull => ConvertStatus::OutputFull,
            };
            (status, read, written)
        } else {
            let (result, read, written) =
                self.encoder
                    .encode_from_utf8_without_replacement(text, dst, feed_last);
            match result {
                EncoderResult::InputEmpty => (ConvertStatus::InputEmpty, read, written),
                EncoderResult::OutputFull => (ConvertStatus::OutputFull, read, written),
                EncoderResult::Unmappable(ch) => {
                    // The unmappable character was consumed; rewind onto it.
                    let rewound = read.saturating_sub(ch.len_utf8());
                    (ConvertStatus::Malformed, rewound, written)
                }
            }
        };
        // Valid prefix fully consumed with invalid bytes waiting: the cursor
        // now rests on them.
        if tail_invalid && status == ConvertStatus::InputEmpty {
            return (ConvertStatus::Malformed, read, written);
        }
        (status, read, written)
    }

    fn reset(&mut self) {
        self.encoder = self.encoding.new_encoder();
    }
}

/// Little-endian UTF-32 bytes → UTF-8. Stateless.
struct Utf32Decoder;

impl Converter for Utf32Decoder {
    fn convert(&mut self, src: &[u8], dst: &mut [u8], last: bool) -> (ConvertStatus, usize, usize) {
        let mut read = 0;
        let mut written = 0;
        while src.len() - read >= 4 {
            let unit = u32::from_le_bytes([src[read], src[read + 1], src[read + 2], src[read + 3]]);
            let Some(ch) = char::from_u32(unit) else {
                return (ConvertStatus::Malformed, read, written);
            };
            if dst.len() - written < ch.len_utf8() {
                return (ConvertStatus::OutputFull, read, written);
            }
            written += ch.encode_utf8(&mut dst[written..]).len();
            read += 4;
        }
        if last && read < src.len() {
            // Trailing partial code unit.
            return (ConvertStatus::Malformed, read, written);
        }
        (ConvertStatus::InputEmpty, read, written)
    }

    fn reset(&mut self) {}
}

/// UTF-8 → little-endian UTF-32 bytes. Stateless.
struct Utf32Encoder;

impl Converter for Utf32Encoder {
    fn convert(&mut self, src: &[u8], dst: &mut [u8], _last: bool) -> (ConvertStatus, usize, usize) {
        let (text, tail_invalid) = utf8_prefix(src);
        let mut read = 0;
        let mut written = 0;
        for ch in text.chars() {
            if dst.len() - written < 4 {
                return (ConvertStatus::OutputFull, read, written);
            }
            dst[written..written + 4].copy_from_slice(&(ch as u32).to_le_bytes());
            written += 4;
            read += ch.len_utf8();
        }
        if tail_invalid {
            return (ConvertStatus::Malformed, read, written);
        }
        (ConvertStatus::InputEmpty, read, written)
    }

    fn reset(&mut self) {}
}
