//! # Charbridge - Wire-Boundary Character Set Translation
//!
//! Character set translation between per-connection external encodings and
//! the runtime's internal UTF-8 text, for multi-user servers where each
//! logical connection may declare its own encoding.
//!
//! ## Features
//!
//! - **Named encodings** resolved at runtime (WHATWG labels via `encoding_rs`)
//! - **Process-lifetime translator registry** with lazy, race-free creation
//! - **Grow-and-retry conversion engine** that sizes output buffers by doubling
//! - **Explicit completion status** - truncation is never silent
//! - **Pluggable recovery** for the legacy out-of-band marker (telnet IAC GA)
//! - **Code point array marshaling** and a display-width estimator
//!
//! ## Quick Start
//!
//! ```rust
//! use charbridge::{registry, ConversionEngine};
//!
//! // First request for an encoding opens and registers it
//! let translator = registry().get("windows-1252").unwrap();
//!
//! // Decode bytes arriving from the connection into internal UTF-8
//! let engine = ConversionEngine::new();
//! let text = engine.translate(Some(translator.incoming()), b"caf\xE9");
//! assert!(text.is_complete());
//! assert_eq!(text.as_bytes(), "café".as_bytes());
//!
//! // Encode internal text back out to the connection
//! let wire = engine.translate_str(Some(translator.outgoing()), "café");
//! assert_eq!(wire.as_bytes(), b"caf\xE9");
//! ```

#![deny(missing_docs)]

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

pub mod codec;
pub mod codepoints;
mod engine;

pub use engine::{Completion, ConversionEngine, Converted, RecoveryPolicy, OUT_OF_BAND_MARKER};

use codec::{CodecService, ConverterHandle, WhatwgCodec};

/// Result type for registry and marshaling operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The codec service does not recognize the encoding name, or the
    /// encoding cannot be opened in both directions
    UnknownEncoding(String),
    /// A value is not a Unicode scalar value
    InvalidCodepoint {
        /// The offending value
        value: u32,
        /// Its index in the input array
        position: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownEncoding(name) => write!(f, "unknown encoding: {}", name),
            Error::InvalidCodepoint { value, position } => {
                write!(f, "invalid code point {:#x} at index {}", value, position)
            }
        }
    }
}

impl std::error::Error for Error {}

/// One named external encoding's bidirectional mapping to internal UTF-8.
///
/// A translator is either fully usable (both directions open) or was never
/// published; once published it lives for the rest of the process and is
/// never mutated.
pub struct Translator {
    name: String,
    incoming: ConverterHandle,
    outgoing: ConverterHandle,
}

impl Translator {
    /// The encoding name as requested by the caller.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// External → internal converter handle.
    pub fn incoming(&self) -> &ConverterHandle {
        &self.incoming
    }

    /// Internal → external converter handle. Opened best-effort: characters
    /// the external encoding cannot represent are substituted, not fatal.
    pub fn outgoing(&self) -> &ConverterHandle {
        &self.outgoing
    }
}

impl fmt::Debug for Translator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Process-wide collection of translators, keyed by encoding name.
///
/// Entries are created lazily on first request and never evicted. Lookup and
/// insertion happen under one lock, so concurrent requests for the same
/// unregistered name produce exactly one entry.
pub struct TranslatorRegistry {
    codec: Box<dyn CodecService>,
    entries: Mutex<HashMap<String, Arc<Translator>>>,
}

impl TranslatorRegistry {
    /// Registry backed by the default codec service.
    pub fn new() -> Self {
        Self::with_codec(Box::new(WhatwgCodec))
    }

    /// Registry backed by a custom codec service.
    pub fn with_codec(codec: Box<dyn CodecService>) -> Self {
        Self {
            codec,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `name`, opening and registering it on first request.
    ///
    /// Names match case-sensitively and are stored exactly as requested. If
    /// either direction fails to open, nothing is registered and
    /// [`Error::UnknownEncoding`] is returned.
    pub fn get(&self, name: &str) -> Result<Arc<Translator>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(name) {
            return Ok(Arc::clone(existing));
        }
        let incoming = self.codec.open_decoder(name);
        let outgoing = self.codec.open_encoder(name, true);
        match (incoming, outgoing) {
            (Some(incoming), Some(outgoing)) => {
                let translator = Arc::new(Translator {
                    name: name.to_string(),
                    incoming: ConverterHandle::new(incoming),
                    outgoing: ConverterHandle::new(outgoing),
                });
                entries.insert(name.to_string(), Arc::clone(&translator));
                Ok(translator)
            }
            _ => Err(Error::UnknownEncoding(name.to_string())),
        }
    }

    /// Number of registered translators.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all registered translators.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for TranslatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TranslatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorRegistry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// The process-wide default registry, initialized on first use.
pub fn registry() -> &'static TranslatorRegistry {
    static REGISTRY: OnceLock<TranslatorRegistry> = OnceLock::new();
    REGISTRY.get_or_init(TranslatorRegistry::new)
}

/// Decode bytes in the named external encoding into internal UTF-8.
///
/// Resolves `name` through the default registry; unknown names are a
/// recoverable error. The completion status of the returned value records
/// whether the whole input converted.
pub fn decode_text(name: &str, bytes: &[u8]) -> Result<Converted<'static>> {
    let translator = registry().get(name)?;
    let converted = ConversionEngine::new().translate(Some(translator.incoming()), bytes);
    Ok(converted.into_owned())
}

/// Encode internal UTF-8 text into the named external encoding.
///
/// The outgoing direction is best-effort: unmappable characters are
/// substituted rather than truncating the output.
pub fn encode_text(name: &str, text: &str) -> Result<Converted<'static>> {
    let translator = registry().get(name)?;
    let converted = ConversionEngine::new().translate_str(Some(translator.outgoing()), text);
    Ok(converted.into_owned())
}

/// Estimate the display width of internal text.
///
/// Counts bytes that are not UTF-8 continuation bytes, which approximates
/// the number of code points. Combining marks and East Asian wide characters
/// are not accounted for; this is not a terminal column count.
///
/// ```rust
/// assert_eq!(charbridge::display_width("Aé中"), 3);
/// ```
pub fn display_width(text: &str) -> usize {
    text.bytes().filter(|b| b & 0xC0 != 0x80).count()
}
