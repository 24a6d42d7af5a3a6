//! Runtime patch (plugin) loader.
//!
//! VLSI distributes DSP patches as compressed register-write sequences
//! (`.plg` tables / `.bin` files). Each record is:
//!
//! ```text
//! word 0   register address (low byte; high byte ignored)
//! word 1   count
//!          bit 15 set   → repeat: one value word follows, written (count & 0x7FFF) times
//!          bit 15 clear → literal: `count` value words follow, each written once
//! ```
//!
//! Two encodings are accepted:
//!
//! - **array**: `&[u16]` as compiled into firmware ([`PatchImage`]),
//! - **stream**: the same words as little-endian byte pairs from any
//!   `embedded_io_async::Read` (e.g. a file on removable media).
//!
//! Both are replayed by [`replay`] through the command channel only, with a
//! DREQ wait before every write.

use embedded_hal_async::delay::DelayNs;
use embedded_io::Error as _;
use embedded_io_async::Read;
use platform::{CodecTransport, ReadySignal};

use crate::bus::CodecBus;
use crate::error::{CodecError, PatchError};
use crate::registers::Register;

/// Count-word flag selecting the repeat form.
pub const REPEAT_FLAG: u16 = 0x8000;

/// Count-word bits holding the record length.
pub const COUNT_MASK: u16 = 0x7FFF;

/// Patch image in array form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchImage<'a> {
    words: &'a [u16],
}

impl<'a> PatchImage<'a> {
    /// An image with no records; loading it issues no writes.
    pub const EMPTY: PatchImage<'static> = PatchImage { words: &[] };

    /// Wrap a patch table.
    #[must_use]
    pub const fn new(words: &'a [u16]) -> Self {
        Self { words }
    }

    /// Raw words.
    #[must_use]
    pub fn words(&self) -> &'a [u16] {
        self.words
    }

    /// `true` if the image holds no words.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Decode records in order. Yields one error and stops on a malformed record.
    #[must_use]
    pub fn records(&self) -> Records<'a> {
        Records {
            words: self.words,
            failed: false,
        }
    }

    /// Check every record; returns the number of register writes the image
    /// will issue.
    ///
    /// # Errors
    ///
    /// The first [`PatchError`] encountered.
    pub fn validate(&self) -> Result<usize, PatchError> {
        self.records().try_fold(0usize, |writes, record| {
            Ok(writes.saturating_add(record?.write_count()))
        })
    }
}

/// One decoded patch record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchRecord<'a> {
    /// Write `value` to `register` `count` times.
    Repeat {
        /// SCI address
        register: u8,
        /// Number of writes
        count: u16,
        /// Value written every time
        value: u16,
    },
    /// Write each of `values` to `register`, in order.
    Literal {
        /// SCI address
        register: u8,
        /// Values, one write each
        values: &'a [u16],
    },
}

impl PatchRecord<'_> {
    /// Target SCI address.
    #[must_use]
    pub fn register(&self) -> u8 {
        match *self {
            Self::Repeat { register, .. } | Self::Literal { register, .. } => register,
        }
    }

    /// Number of register writes this record issues.
    #[must_use]
    pub fn write_count(&self) -> usize {
        match *self {
            Self::Repeat { count, .. } => usize::from(count),
            Self::Literal { values, .. } => values.len(),
        }
    }
}

/// Iterator over the records of a [`PatchImage`].
#[derive(Debug, Clone)]
pub struct Records<'a> {
    words: &'a [u16],
    failed: bool,
}

impl<'a> Records<'a> {
    fn decode(&mut self) -> Option<Result<PatchRecord<'a>, PatchError>> {
        let (&address_word, rest) = self.words.split_first()?;
        let register = match register_address(address_word) {
            Ok(register) => register,
            Err(e) => return Some(Err(e)),
        };
        let Some((&count_word, rest)) = rest.split_first() else {
            return Some(Err(PatchError::Truncated));
        };

        if count_word & REPEAT_FLAG != 0 {
            let Some((&value, rest)) = rest.split_first() else {
                return Some(Err(PatchError::Truncated));
            };
            self.words = rest;
            Some(Ok(PatchRecord::Repeat {
                register,
                count: count_word & COUNT_MASK,
                value,
            }))
        } else {
            let len = usize::from(count_word);
            let (Some(values), Some(rest)) = (rest.get(..len), rest.get(len..)) else {
                return Some(Err(PatchError::Truncated));
            };
            self.words = rest;
            Some(Ok(PatchRecord::Literal { register, values }))
        }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<PatchRecord<'a>, PatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.decode();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

impl core::iter::FusedIterator for Records<'_> {}

/// Low byte of the address word, checked against the SCI map.
fn register_address(word: u16) -> Result<u8, PatchError> {
    let [_, address] = word.to_be_bytes();
    Register::try_from(address)
        .map(Register::addr)
        .map_err(|_| PatchError::InvalidRegister(address))
}

// ── Word sources ─────────────────────────────────────────────────────────────

/// Sequential supply of patch words.
pub(crate) trait WordSource {
    /// Next word, `None` at a clean end of input.
    async fn next_word(&mut self) -> Result<Option<u16>, PatchError>;
}

/// Words from an in-memory table.
pub(crate) struct SliceWords<'a> {
    words: core::slice::Iter<'a, u16>,
}

impl<'a> SliceWords<'a> {
    pub(crate) fn new(image: &PatchImage<'a>) -> Self {
        Self {
            words: image.words().iter(),
        }
    }
}

impl WordSource for SliceWords<'_> {
    async fn next_word(&mut self) -> Result<Option<u16>, PatchError> {
        Ok(self.words.next().copied())
    }
}

/// Little-endian words from a byte stream.
pub(crate) struct StreamWords<S> {
    source: S,
}

impl<S: Read> StreamWords<S> {
    pub(crate) fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: Read> WordSource for StreamWords<S> {
    async fn next_word(&mut self) -> Result<Option<u16>, PatchError> {
        let mut bytes = [0u8; 2];
        let mut filled = 0usize;
        while let Some(dst) = bytes.get_mut(filled..).filter(|d| !d.is_empty()) {
            let n = self
                .source
                .read(dst)
                .await
                .map_err(|e| PatchError::Source(e.kind()))?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(PatchError::Truncated)
                };
            }
            filled = filled.saturating_add(n);
        }
        Ok(Some(u16::from_le_bytes(bytes)))
    }
}

/// Required word inside a record.
async fn expect_word<W: WordSource>(source: &mut W) -> Result<u16, PatchError> {
    source.next_word().await?.ok_or(PatchError::Truncated)
}

/// Replay every record from `source` onto the bus; returns the number of
/// register writes issued.
///
/// Runs on a bus the caller already owns. Writes issued before a decoding
/// error stay issued.
pub(crate) async fn replay<W, T, R, D>(
    bus: &mut CodecBus<T, R, D>,
    source: &mut W,
) -> Result<usize, CodecError>
where
    W: WordSource,
    T: CodecTransport,
    R: ReadySignal,
    D: DelayNs,
{
    let mut writes = 0usize;
    while let Some(address_word) = source.next_word().await? {
        let register = register_address(address_word)?;
        let count_word = expect_word(source).await?;

        if count_word & REPEAT_FLAG != 0 {
            let value = expect_word(source).await?;
            for _ in 0..count_word & COUNT_MASK {
                bus.write_register_raw(register, value).await?;
                writes = writes.saturating_add(1);
            }
        } else {
            for _ in 0..count_word {
                let value = expect_word(source).await?;
                bus.write_register_raw(register, value).await?;
                writes = writes.saturating_add(1);
            }
        }
    }
    Ok(writes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_repeat_and_literal() {
        let words = [0x0007, 0x0001, 0x8010, 0x0006, 0x8003, 0x0000, 0x0006, 0x0002, 0x1234, 0x5678];
        let image = PatchImage::new(&words);
        let records: Vec<_> = image.records().map(Result::unwrap).collect();

        assert_eq!(
            records,
            vec![
                PatchRecord::Literal {
                    register: 0x07,
                    values: &[0x8010]
                },
                PatchRecord::Repeat {
                    register: 0x06,
                    count: 3,
                    value: 0x0000
                },
                PatchRecord::Literal {
                    register: 0x06,
                    values: &[0x1234, 0x5678]
                },
            ]
        );
        assert_eq!(image.validate(), Ok(6));
    }

    #[test]
    fn test_high_byte_of_address_is_ignored() {
        let words = [0xAB07, 0x8001, 0x0000];
        let record = PatchImage::new(&words).records().next().unwrap().unwrap();
        assert_eq!(record.register(), 0x07);
    }

    #[test]
    fn test_truncated_literal_is_rejected() {
        let words = [0x0006, 0x0003, 0x0001, 0x0002];
        let mut records = PatchImage::new(&words).records();
        assert_eq!(records.next(), Some(Err(PatchError::Truncated)));
        assert_eq!(records.next(), None, "iteration stops after an error");
    }

    #[test]
    fn test_missing_repeat_value_is_rejected() {
        let words = [0x0006, 0x8004];
        assert_eq!(
            PatchImage::new(&words).validate(),
            Err(PatchError::Truncated)
        );
    }

    #[test]
    fn test_invalid_register_is_rejected() {
        let words = [0x0010, 0x8001, 0x0000];
        assert_eq!(
            PatchImage::new(&words).validate(),
            Err(PatchError::InvalidRegister(0x10))
        );
    }

    #[test]
    fn test_empty_image() {
        assert!(PatchImage::EMPTY.is_empty());
        assert_eq!(PatchImage::EMPTY.validate(), Ok(0));
    }

    #[tokio::test]
    async fn test_stream_words_little_endian() {
        use platform::mocks::ChunkedReader;

        // Odd chunk size splits words across reads
        let mut words = StreamWords::new(ChunkedReader::new(&[0x07, 0x00, 0x01, 0x80, 0x34], 3));
        assert_eq!(words.next_word().await, Ok(Some(0x0007)));
        assert_eq!(words.next_word().await, Ok(Some(0x8001)));
        assert_eq!(words.next_word().await, Err(PatchError::Truncated));
    }

    #[tokio::test]
    async fn test_stream_words_clean_eof() {
        use platform::mocks::ChunkedReader;

        let mut words = StreamWords::new(ChunkedReader::from_words(&[0x1234], 1));
        assert_eq!(words.next_word().await, Ok(Some(0x1234)));
        assert_eq!(words.next_word().await, Ok(None));
    }

    #[tokio::test]
    async fn test_stream_source_error() {
        use embedded_io::ErrorKind;
        use platform::mocks::ChunkedReader;

        let mut words = StreamWords::new(ChunkedReader::from_words(&[1, 2], 4).failing_at(2));
        assert_eq!(words.next_word().await, Ok(Some(1)));
        assert_eq!(
            words.next_word().await,
            Err(PatchError::Source(ErrorKind::Other))
        );
    }
}
