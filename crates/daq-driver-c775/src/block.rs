//! Block (DMA) readout.

use tracing::{debug, error};

use crate::bus::{DmaCompletion, WordOrder};
use crate::device::Tdc775;
use crate::error::{C775Error, ProtocolViolation, Result};
use crate::event::{is_trailer, trailer_event_count};
use crate::registers::{offset, BitSet1};

/// Successful outcome of [`Tdc775::read_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTransfer {
    /// Every requested word was transferred. The buffer may hold several
    /// events; count them as read with [`Tdc775::increment_event_block`].
    Complete,
    /// The module ended the transfer with a bus error after its last
    /// event. `words` ends with a trailer and the host read index has been
    /// updated from it.
    TerminatedByDevice { words: usize },
}

impl Tdc775 {
    /// Transfer up to `max_words` words (bounded by `dest.len()`) out of the
    /// output buffer of module `id` with the DMA engine.
    ///
    /// The words in `dest` keep the engine's byte order, see
    /// [`Tdc775::dma_word_order`].
    ///
    /// # Errors
    ///
    /// - [`C775Error::BusTransfer`] if the transfer could not start or failed
    ///   without the module flagging a bus error
    /// - [`ProtocolViolation::MissingBlockTrailer`] if the module ended the
    ///   transfer but neither of the last two words is a trailer
    pub fn read_block(&self, id: usize, dest: &mut [u32], max_words: usize) -> Result<BlockTransfer> {
        let dma = &self.inner.platform.dma;
        let order = dma.word_order();
        self.with_module(id, |module| {
            let words = max_words.min(dest.len());
            let source = module.bus_address + offset::DATA as u32;
            if let Err(status) = dma.start(source, words * 4) {
                error!(id, status, "DMA transfer initialization failed");
                return Err(C775Error::BusTransfer { status });
            }

            let bytes = match dma.wait(&mut dest[..words]) {
                DmaCompletion::Done => {
                    debug!(id, words, "DMA transfer complete");
                    return Ok(BlockTransfer::Complete);
                }
                DmaCompletion::Failed { status } => {
                    error!(id, status, "DMA transfer failed");
                    return Err(C775Error::BusTransfer { status });
                }
                DmaCompletion::Stopped { bytes } => bytes,
            };

            let regs = module.regs();
            if !regs.bit_set1().contains(BitSet1::BERR_FLAG) {
                error!(id, bytes, "DMA transfer stopped without a module bus error");
                return Err(C775Error::BusTransfer {
                    status: i32::try_from(bytes).unwrap_or(i32::MAX),
                });
            }
            regs.clear1(BitSet1::BERR_FLAG);

            let transferred = (bytes / 4).min(words);
            let word_at = |index: usize| order.to_native(dest[index]);
            let trailer_at = transferred
                .checked_sub(1)
                .map(word_at)
                .filter(|&w| is_trailer(w))
                .map(|w| (w, transferred))
                .or_else(|| {
                    transferred
                        .checked_sub(2)
                        .map(word_at)
                        .filter(|&w| is_trailer(w))
                        .map(|w| (w, transferred - 1))
                });

            match trailer_at {
                Some((trailer, words)) => {
                    module.counters.set_last_read(trailer_event_count(trailer));
                    debug!(id, words, "DMA transfer terminated by TDC");
                    Ok(BlockTransfer::TerminatedByDevice { words })
                }
                None => {
                    let last_word = transferred.checked_sub(1).map(word_at).unwrap_or(0);
                    error!(
                        id,
                        words = transferred,
                        last_word = %format!("{last_word:#010x}"),
                        "Invalid trailer data"
                    );
                    Err(ProtocolViolation::MissingBlockTrailer {
                        words: transferred,
                        last_word,
                    }
                    .into())
                }
            }
        })
    }

    /// Byte order of the words [`Tdc775::read_block`] deposits.
    pub fn dma_word_order(&self) -> WordOrder {
        self.inner.platform.dma.word_order()
    }
}
