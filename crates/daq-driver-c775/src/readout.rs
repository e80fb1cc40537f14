//! Polled event readout.
//!
//! Events leave the output buffer one at a time: a header announcing `n`
//! data words, the data words, and a trailer carrying the 24-bit event
//! index. The host keeps the index of the last trailer it saw; comparing
//! it with the hardware event counter gives the number of pending events.

use tracing::{debug, error, info, warn};

use crate::device::Tdc775;
use crate::error::{ProtocolViolation, Result};
use crate::event::{self, format_event, header_word_count, trailer_event_count};
use crate::registers::{offset, Status1, Status2, MAX_WORDS_PER_EVENT};
use crate::registry::Module;

/// How much [`Tdc775::flush_event`] reports about the words it discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum FlushVerbosity {
    /// Nothing.
    #[default]
    Quiet,
    /// Headers, trailers and unexpected words.
    Log,
    /// Additionally every word consumed.
    Dump,
}

/// Longest run of words a flush walks before giving up on finding a trailer.
const FLUSH_LIMIT: usize = offset::DATA_LEN / 4;

/// Buffer state shared by the readers.
enum Readiness {
    Empty,
    NotReady,
    Ready,
}

fn readiness(module: &Module) -> Readiness {
    let regs = module.regs();
    if regs.status2().contains(Status2::BUFFER_EMPTY) {
        Readiness::Empty
    } else if regs.status1().contains(Status1::DATA_READY) {
        Readiness::Ready
    } else {
        Readiness::NotReady
    }
}

/// Read one framed event, appending it to `out`. On a framing error `out`
/// is restored to its original length.
fn read_framed(id: usize, module: &mut Module, out: &mut Vec<u32>) -> Result<usize> {
    let start = out.len();

    let header = module.read_data(0);
    if !event::is_header(header) || header_word_count(header) + 2 > MAX_WORDS_PER_EVENT {
        error!(id, word = %format!("{header:#010x}"), "Invalid header word");
        return Err(ProtocolViolation::InvalidHeader { word: header }.into());
    }
    let n = header_word_count(header);
    out.reserve(n + 2);
    out.push(header);
    for ii in 0..n {
        out.push(module.read_data(ii + 1));
    }

    let trailer = module.read_data(n + 1);
    if !event::is_trailer(trailer) {
        out.truncate(start);
        error!(id, word = %format!("{trailer:#010x}"), "Invalid trailer word");
        return Err(ProtocolViolation::InvalidTrailer { word: trailer }.into());
    }
    out.push(trailer);
    module.counters.set_last_read(trailer_event_count(trailer));
    Ok(n + 2)
}

impl Tdc775 {
    /// Number of events waiting in the buffer of module `id`.
    ///
    /// Returns 0 while the module does not flag data ready. Otherwise the
    /// hardware event counter is read (both halves under the bus guard) and
    /// compared with the host's last read index.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation::EventCountDesync`] when data is flagged ready but
    /// the counters say nothing is pending.
    pub fn data_ready(&self, id: usize) -> Result<usize> {
        self.with_module(id, |module| {
            let regs = module.regs();
            if !regs.status1().contains(Status1::DATA_READY) {
                return Ok(0);
            }
            module.counters.event_count = regs.event_count();
            let pending = module.counters.pending();
            if pending <= 0 {
                error!(
                    id,
                    pending,
                    event_count = module.counters.event_count,
                    last_read = ?module.counters.last_read,
                    "Bad event ready count"
                );
                return Err(ProtocolViolation::EventCountDesync { pending }.into());
            }
            Ok(pending as usize)
        })
    }

    /// Move the next event of module `id` into `out`.
    ///
    /// Returns the number of words appended (header + data + trailer), or 0
    /// when the buffer is empty or no data is ready. At most
    /// [`MAX_WORDS_PER_EVENT`] words are appended: a header announcing more
    /// data words than there are channels is an invalid header.
    pub fn read_event(&self, id: usize, out: &mut Vec<u32>) -> Result<usize> {
        self.with_module(id, |module| match readiness(module) {
            Readiness::Empty => {
                debug!(id, "Data buffer is empty");
                Ok(0)
            }
            Readiness::NotReady => {
                debug!(id, "Data not ready for readout");
                Ok(0)
            }
            Readiness::Ready => read_framed(id, module, out),
        })
    }

    /// Discard words of module `id` up to and including the next trailer,
    /// or until the buffer reports not valid. Returns the words consumed.
    pub fn flush_event(&self, id: usize, verbosity: FlushVerbosity) -> Result<usize> {
        let chatty = verbosity >= FlushVerbosity::Log;
        self.with_module(id, |module| {
            match readiness(module) {
                Readiness::Empty => {
                    if chatty {
                        info!(id, "Data buffer is empty");
                    }
                    return Ok(0);
                }
                Readiness::NotReady => {
                    if chatty {
                        info!(id, "Data not ready for readout");
                    }
                    return Ok(0);
                }
                Readiness::Ready => {}
            }

            let mut consumed = 0;
            let mut dump = Vec::new();
            while consumed < FLUSH_LIMIT {
                let word = module.read_data(consumed);
                consumed += 1;
                if verbosity == FlushVerbosity::Dump {
                    dump.push(word);
                }
                match event::word_type(word) {
                    event::TYPE_HEADER => {
                        if chatty {
                            info!(id, word = %format!("{word:#010x}"), "Found header");
                        }
                    }
                    event::TYPE_DATUM => {}
                    event::TYPE_TRAILER => {
                        if chatty {
                            info!(id, word = %format!("{word:#010x}"), "Found trailer");
                        }
                        module.counters.set_last_read(trailer_event_count(word));
                        break;
                    }
                    event::TYPE_NOT_VALID => {
                        if chatty {
                            info!(id, word = %format!("{word:#010x}"), "Buffer empty");
                        }
                        break;
                    }
                    _ => {
                        if chatty {
                            warn!(id, word = %format!("{word:#010x}"), "Invalid data");
                        }
                    }
                }
            }
            if !dump.is_empty() {
                let words: Vec<String> = dump.iter().map(|w| format!("{w:#010x}")).collect();
                info!(id, words = %words.join(" "), "Flushed words");
            }
            Ok(consumed)
        })
    }

    /// Read the next event of module `id` and log it in operator format.
    /// Returns the number of words read.
    pub fn print_event(&self, id: usize) -> Result<usize> {
        let mut words = Vec::with_capacity(MAX_WORDS_PER_EVENT);
        let count = self.with_module(id, |module| match readiness(module) {
            Readiness::Empty => {
                info!(id, "Data buffer is empty");
                Ok(0)
            }
            Readiness::NotReady => {
                info!(id, "Data not ready for readout");
                Ok(0)
            }
            Readiness::Ready => read_framed(id, module, &mut words),
        })?;
        if count > 0 {
            for line in format_event(id, &words).lines() {
                info!("{line}");
            }
        }
        Ok(count)
    }
}
