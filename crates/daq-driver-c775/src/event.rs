//! Output buffer word format.
//!
//! Every event in the FIFO is one header, zero or more data words and one
//! trailer. The word type sits in bits 24..27; the geographic address of the
//! module is repeated in bits 27..32 of every word.

use std::fmt::Write;

/// Word type field.
pub const TYPE_MASK: u32 = 0x0700_0000;
/// Type of a converted channel.
pub const TYPE_DATUM: u32 = 0x0000_0000;
/// Type of an event header.
pub const TYPE_HEADER: u32 = 0x0200_0000;
/// Type of an end-of-block trailer.
pub const TYPE_TRAILER: u32 = 0x0400_0000;
/// Type returned when reading an empty buffer.
pub const TYPE_NOT_VALID: u32 = 0x0600_0000;

const GEO_MASK: u32 = 0xf800_0000;
const CRATE_MASK: u32 = 0x00ff_0000;
const WORD_COUNT_MASK: u32 = 0x0000_3f00;
const CHANNEL_MASK: u32 = 0x001f_0000;
const VALUE_MASK: u32 = 0x0000_0fff;
const OVERFLOW_BIT: u32 = 0x0000_1000;
const UNDERFLOW_BIT: u32 = 0x0000_2000;
const VALID_BIT: u32 = 0x0000_4000;
/// 24-bit event index carried by the trailer.
pub const EVENT_COUNT_MASK: u32 = 0x00ff_ffff;

/// Tag bits of `word`.
pub fn word_type(word: u32) -> u32 {
    word & TYPE_MASK
}

/// True if `word` is a header.
pub fn is_header(word: u32) -> bool {
    word_type(word) == TYPE_HEADER
}

/// True if `word` is a trailer.
pub fn is_trailer(word: u32) -> bool {
    word_type(word) == TYPE_TRAILER
}

/// Number of data words announced by a header.
pub fn header_word_count(header: u32) -> usize {
    ((header & WORD_COUNT_MASK) >> 8) as usize
}

/// Event index carried by a trailer.
pub fn trailer_event_count(trailer: u32) -> u32 {
    trailer & EVENT_COUNT_MASK
}

/// A decoded output buffer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventWord {
    /// Start of event.
    Header {
        geo: u8,
        crate_id: u8,
        word_count: u8,
    },
    /// One converted channel.
    Datum {
        geo: u8,
        channel: u8,
        value: u16,
        overflow: bool,
        underflow: bool,
        valid: bool,
    },
    /// End of event.
    Trailer { geo: u8, event_count: u32 },
    /// Read from an empty buffer.
    NotValid,
    /// Any other tag.
    Unknown { tag: u8, raw: u32 },
}

impl EventWord {
    /// Decode one 32-bit word.
    pub fn decode(word: u32) -> Self {
        let geo = ((word & GEO_MASK) >> 27) as u8;
        match word_type(word) {
            TYPE_HEADER => Self::Header {
                geo,
                crate_id: ((word & CRATE_MASK) >> 16) as u8,
                word_count: header_word_count(word) as u8,
            },
            TYPE_DATUM => Self::Datum {
                geo,
                channel: ((word & CHANNEL_MASK) >> 16) as u8,
                value: (word & VALUE_MASK) as u16,
                overflow: word & OVERFLOW_BIT != 0,
                underflow: word & UNDERFLOW_BIT != 0,
                valid: word & VALID_BIT != 0,
            },
            TYPE_TRAILER => Self::Trailer {
                geo,
                event_count: trailer_event_count(word),
            },
            TYPE_NOT_VALID => Self::NotValid,
            other => Self::Unknown {
                tag: (other >> 24) as u8,
                raw: word,
            },
        }
    }

    /// Encode a header word.
    pub fn header(geo: u8, crate_id: u8, word_count: u8) -> u32 {
        (u32::from(geo) << 27)
            | TYPE_HEADER
            | (u32::from(crate_id) << 16)
            | ((u32::from(word_count) << 8) & WORD_COUNT_MASK)
    }

    /// Encode a valid datum for `channel`.
    pub fn datum(geo: u8, channel: u8, value: u16) -> u32 {
        Self::datum_with_flags(geo, channel, value, false, false)
    }

    /// Encode a valid datum carrying overflow/underflow flags.
    pub fn datum_with_flags(geo: u8, channel: u8, value: u16, overflow: bool, underflow: bool) -> u32 {
        let mut word = (u32::from(geo) << 27)
            | TYPE_DATUM
            | ((u32::from(channel) << 16) & CHANNEL_MASK)
            | VALID_BIT
            | (u32::from(value) & VALUE_MASK);
        if overflow {
            word |= OVERFLOW_BIT;
        }
        if underflow {
            word |= UNDERFLOW_BIT;
        }
        word
    }

    /// Encode a trailer word.
    pub fn trailer(geo: u8, event_count: u32) -> u32 {
        (u32::from(geo) << 27) | TYPE_TRAILER | (event_count & EVENT_COUNT_MASK)
    }
}

/// Decode a run of buffer words.
pub fn decode_event(words: &[u32]) -> Vec<EventWord> {
    words.iter().copied().map(EventWord::decode).collect()
}

/// Render an event the way the operator printout shows it: header, data
/// five per line, trailer.
pub fn format_event(id: usize, words: &[u32]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  TDC DATA for Module {id}");
    let Some((&header, rest)) = words.split_first() else {
        return out;
    };
    let _ = write!(
        out,
        "  Header: {header:#010x}   nWords = {} ",
        header_word_count(header)
    );
    let (data, trailer) = match rest.split_last() {
        Some((&last, data)) if is_trailer(last) => (data, Some(last)),
        _ => (rest, None),
    };
    for (ii, word) in data.iter().enumerate() {
        if ii % 5 == 0 {
            out.push_str("\n    ");
        }
        let _ = write!(out, "  {word:#010x}");
    }
    out.push('\n');
    if let Some(trailer) = trailer {
        let _ = writeln!(
            out,
            "  Trailer: {trailer:#010x}   Event Count = {}",
            trailer_event_count(trailer)
        );
    }
    out
}
