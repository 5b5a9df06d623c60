//! Streaming programmer

use core::cmp::min;

use crate::hardware::IapHardware;

// largest page of the supported parts
const MAX_PAGE_SIZE: usize = 256;

/// Kind of the armed streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Operation {
    /// Nothing armed.
    None,
    /// Program memory to host.
    ReadProgram,
    /// Host to program memory.
    WriteProgram,
    /// Data memory to host.
    ReadData,
    /// Host to data memory.
    WriteData,
}

impl Operation {
    /// `true` for host-to-device sessions.
    pub fn is_write(self) -> bool {
        matches!(self, Operation::WriteProgram | Operation::WriteData)
    }

    /// `true` for device-to-host sessions.
    pub fn is_read(self) -> bool {
        matches!(self, Operation::ReadProgram | Operation::ReadData)
    }
}

/// State kept between transport callbacks of one streaming session.
///
/// The cursor and the remaining byte counter only move inside [`Session::write`] and
/// [`Session::read`], one byte at a time, in the order transfer, advance, decrement.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    operation: Operation,
    cursor: u32,
    remaining: u16,
    // page erased by this session whose staged words are not committed yet
    open_page: Option<u32>,
    // low byte of a program memory word whose high byte has not arrived
    latch: Option<u8>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Power-up state: nothing armed.
    pub const fn new() -> Self {
        Self {
            operation: Operation::None,
            cursor: 0,
            remaining: 0,
            open_page: None,
            latch: None,
        }
    }

    /// Armed operation, [`Operation::None`] once the session completed.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Address of the next byte to transfer.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Bytes left in the session.
    pub fn remaining(&self) -> u16 {
        self.remaining
    }

    /// Arm a new session of `length` bytes starting at `address`.
    ///
    /// The length is clamped to the region the operation may touch. A program memory
    /// write still in progress is finished first.
    pub fn arm<M: IapHardware>(
        &mut self,
        hw: &mut M,
        operation: Operation,
        address: u16,
        length: u16,
    ) {
        self.finish(hw);

        let limit = match operation {
            Operation::None => 0,
            Operation::ReadProgram => M::CHIP.flash_size,
            Operation::WriteProgram => M::CHIP.boot_section_start,
            Operation::ReadData | Operation::WriteData => M::CHIP.eeprom_size as u32,
        };
        let available = limit.saturating_sub(address as u32);

        self.cursor = address as u32;
        self.remaining = min(length as u32, available) as u16;
        self.operation = if self.remaining == 0 {
            Operation::None
        } else {
            operation
        };

        #[cfg(feature = "defmt-03")]
        defmt::debug!(
            "usbasp: {} at {=u32:#x}, {=u16} bytes",
            self.operation,
            self.cursor,
            self.remaining
        );
    }

    /// Consume a chunk of a write session.
    ///
    /// Bytes beyond the remaining count are ignored. Returns `true` when the session is
    /// complete, which is also the answer when no write session is armed.
    pub fn write<M: IapHardware>(&mut self, hw: &mut M, data: &[u8]) -> bool {
        let len = min(data.len(), self.remaining as usize);

        match self.operation {
            Operation::WriteData => {
                for &byte in &data[..len] {
                    hw.write_data(self.cursor as u16, byte);
                    self.advance();
                }
            }
            Operation::WriteProgram => {
                for &byte in &data[..len] {
                    self.write_program_byte(hw, byte);
                }
            }
            _ => return true,
        }

        self.complete_if_done()
    }

    /// Produce up to `out.len()` bytes of a read session.
    ///
    /// Returns the number of bytes stored in `out`, `0` when no read session is armed.
    pub fn read<M: IapHardware>(&mut self, hw: &mut M, out: &mut [u8]) -> usize {
        let len = min(out.len(), self.remaining as usize);

        match self.operation {
            Operation::ReadProgram => {
                for byte in &mut out[..len] {
                    *byte = hw.read_program(self.cursor);
                    self.advance();
                }
            }
            Operation::ReadData => {
                for byte in &mut out[..len] {
                    *byte = hw.read_data(self.cursor as u16);
                    self.advance();
                }
            }
            _ => return 0,
        }

        self.complete_if_done();
        len
    }

    /// Commit whatever a program memory write left staged and drop the session.
    ///
    /// A latched low byte is staged with an erased high byte.
    pub fn finish<M: IapHardware>(&mut self, hw: &mut M) {
        if self.operation == Operation::WriteProgram {
            if let Some(low) = self.latch.take() {
                let address = self.cursor - 1;
                self.stage(hw, address, u16::from_le_bytes([low, 0xff]));
            }
            if let Some(page) = self.open_page {
                self.commit(hw, page);
            }
        }
        *self = Self::new();
    }

    fn advance(&mut self) {
        self.cursor += 1;
        self.remaining -= 1;
    }

    fn complete_if_done(&mut self) -> bool {
        if self.remaining == 0 {
            self.operation = Operation::None;
            self.latch = None;
            self.open_page = None;
            true
        } else {
            false
        }
    }

    fn write_program_byte<M: IapHardware>(&mut self, hw: &mut M, byte: u8) {
        let address = self.cursor;
        let last = self.remaining == 1;

        let word = if address & 1 == 0 {
            if !last {
                self.latch = Some(byte);
                self.advance();
                return;
            }
            u16::from_le_bytes([byte, 0xff])
        } else {
            let low = match self.latch.take() {
                Some(low) => low,
                // session started on an odd address
                None => hw.read_program(address - 1),
            };
            u16::from_le_bytes([low, byte])
        };

        let word_address = address & !1;
        self.stage(hw, word_address, word);
        self.advance();

        if M::CHIP.is_page_start(self.cursor) || self.remaining == 0 {
            self.commit(hw, word_address);
        }
    }

    fn stage<M: IapHardware>(&mut self, hw: &mut M, address: u32, word: u16) {
        let page = M::CHIP.page_of(address);
        if self.open_page != Some(page) {
            open_page(hw, page, address);
            self.open_page = Some(page);
        }
        masked(hw, |hw| hw.page_fill(address, word));
    }

    fn commit<M: IapHardware>(&mut self, hw: &mut M, address: u32) {
        hw.busy_wait();
        masked(hw, |hw| hw.page_write(address));
        hw.busy_wait();
        masked(hw, |hw| hw.rww_enable());
        self.open_page = None;

        #[cfg(feature = "defmt-03")]
        defmt::trace!("usbasp: committed page {=u32:#x}", M::CHIP.page_of(address));
    }
}

/// Erase every page below the boot section.
pub fn erase_application<M: IapHardware>(hw: &mut M) {
    #[cfg(feature = "defmt-03")]
    defmt::info!("usbasp: chip erase");

    let page_size = M::CHIP.page_size as usize;
    for page in (0..M::CHIP.boot_section_start).step_by(page_size) {
        erase_page(hw, page);
    }
    masked(hw, |hw| hw.rww_enable());
}

// Words of `page` below `first` are saved before the erase and staged again after it,
// so a session starting mid-page keeps what an earlier session put there.
fn open_page<M: IapHardware>(hw: &mut M, page: u32, first: u32) {
    let mut saved = [0xffffu16; MAX_PAGE_SIZE / 2];
    let leading = min(((first - page) / 2) as usize, saved.len());
    for (i, word) in saved[..leading].iter_mut().enumerate() {
        let address = page + 2 * i as u32;
        *word = u16::from_le_bytes([hw.read_program(address), hw.read_program(address + 1)]);
    }

    erase_page(hw, page);

    for (i, &word) in saved[..leading].iter().enumerate() {
        let address = page + 2 * i as u32;
        masked(hw, |hw| hw.page_fill(address, word));
    }
}

fn erase_page<M: IapHardware>(hw: &mut M, page: u32) {
    hw.busy_wait();
    masked(hw, |hw| hw.page_erase(page));
    hw.busy_wait();
}

fn masked<M: IapHardware>(hw: &mut M, op: impl FnOnce(&mut M)) {
    hw.disable_interrupts();
    op(hw);
    hw.enable_interrupts();
}
