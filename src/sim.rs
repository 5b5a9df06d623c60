//! RAM-backed stand-in for the self-programming hardware
//!
//! [`SimDevice`] models an ATmega168: NOR program memory that a page write can only clear
//! bits in, a page buffer that survives an erase and is reset by a page write or an RWW
//! re-enable, and a busy flag cleared by [`busy_wait`](IapHardware::busy_wait). Besides
//! behaving like the chip it records what was asked of it, so tests can check the
//! programming discipline and not just the final memory contents.

use crate::device::{Chip, ATMEGA168};
use crate::hardware::IapHardware;

const CHIP: Chip = ATMEGA168;
const FLASH_SIZE: usize = CHIP.flash_size as usize;
const PAGE_SIZE: usize = CHIP.page_size as usize;
const PAGES: usize = FLASH_SIZE / PAGE_SIZE;
const EEPROM_SIZE: usize = CHIP.eeprom_size as usize;
const EVENT_CAPACITY: usize = 1024;

/// Destructive or buffer operation seen by the simulator, with the address it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Event {
    /// Page erase.
    Erase(u32),
    /// Page buffer fill with a word.
    Fill(u32, u16),
    /// Page write.
    Write(u32),
    /// RWW section re-enabled.
    RwwEnable,
}

/// Violations of the programming discipline, counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Faults {
    /// Erase, fill, write or RWW re-enable issued with interrupts enabled.
    pub unguarded_spm: u32,
    /// Erase, fill, write or RWW re-enable issued before the previous operation finished.
    pub spm_while_busy: u32,
    /// Busy wait entered with interrupts masked.
    pub wait_while_masked: u32,
    /// Erase or write aimed at the boot section. The operation is dropped.
    pub boot_section_access: u32,
    /// Program memory read between an erase/write and the RWW re-enable.
    pub stale_reads: u32,
}

/// Simulated ATmega168, see the [module documentation](self).
pub struct SimDevice {
    flash: [u8; FLASH_SIZE],
    eeprom: [u8; EEPROM_SIZE],
    buffer: [u16; PAGE_SIZE / 2],
    interrupts: bool,
    busy: bool,
    rww_busy: bool,
    indicator: bool,
    erases: [u16; PAGES],
    writes: [u16; PAGES],
    events: [Event; EVENT_CAPACITY],
    event_count: usize,
    faults: Faults,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    /// Erased chip with interrupts enabled.
    pub fn new() -> Self {
        Self {
            flash: [0xff; FLASH_SIZE],
            eeprom: [0xff; EEPROM_SIZE],
            buffer: [0xffff; PAGE_SIZE / 2],
            interrupts: true,
            busy: false,
            rww_busy: false,
            indicator: false,
            erases: [0; PAGES],
            writes: [0; PAGES],
            events: [Event::RwwEnable; EVENT_CAPACITY],
            event_count: 0,
            faults: Faults::default(),
        }
    }

    /// Put `data` into program memory at `address`, bypassing the programming logic.
    pub fn load_program(&mut self, address: u32, data: &[u8]) {
        let start = address as usize;
        self.flash[start..start + data.len()].copy_from_slice(data);
    }

    /// Put `data` into data memory at `address`.
    pub fn load_data(&mut self, address: u16, data: &[u8]) {
        let start = address as usize;
        self.eeprom[start..start + data.len()].copy_from_slice(data);
    }

    /// Program memory contents.
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Data memory contents.
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// How often the page containing `address` was erased.
    pub fn erases(&self, address: u32) -> u16 {
        self.erases[page_index(address)]
    }

    /// How often the page containing `address` was written.
    pub fn writes(&self, address: u32) -> u16 {
        self.writes[page_index(address)]
    }

    /// Recorded events, oldest first. Recording stops when the log is full.
    pub fn events(&self) -> &[Event] {
        &self.events[..self.event_count]
    }

    /// Discipline violations seen so far.
    pub fn faults(&self) -> Faults {
        self.faults
    }

    /// State of the indicator.
    pub fn indicator(&self) -> bool {
        self.indicator
    }

    fn record(&mut self, event: Event) {
        if self.event_count < EVENT_CAPACITY {
            self.events[self.event_count] = event;
            self.event_count += 1;
        }
    }

    fn check_spm(&mut self) {
        if self.interrupts {
            self.faults.unguarded_spm += 1;
        }
        if self.busy {
            self.faults.spm_while_busy += 1;
        }
    }

    fn check_target(&mut self, address: u32) -> bool {
        if address >= CHIP.boot_section_start || address as usize >= FLASH_SIZE {
            self.faults.boot_section_access += 1;
            false
        } else {
            true
        }
    }
}

fn page_index(address: u32) -> usize {
    address as usize / PAGE_SIZE
}

impl IapHardware for SimDevice {
    const CHIP: Chip = CHIP;

    fn disable_interrupts(&mut self) {
        self.interrupts = false;
    }

    fn enable_interrupts(&mut self) {
        self.interrupts = true;
    }

    fn page_erase(&mut self, address: u32) {
        self.check_spm();
        self.record(Event::Erase(address));
        if !self.check_target(address) {
            return;
        }
        let page = page_index(address);
        self.flash[page * PAGE_SIZE..(page + 1) * PAGE_SIZE].fill(0xff);
        self.erases[page] += 1;
        self.busy = true;
        self.rww_busy = true;
    }

    fn page_fill(&mut self, address: u32, word: u16) {
        self.check_spm();
        self.record(Event::Fill(address, word));
        self.buffer[(address as usize % PAGE_SIZE) / 2] = word;
    }

    fn page_write(&mut self, address: u32) {
        self.check_spm();
        self.record(Event::Write(address));
        if !self.check_target(address) {
            return;
        }
        let page = page_index(address);
        let base = page * PAGE_SIZE;
        for (i, word) in self.buffer.iter().enumerate() {
            let [low, high] = word.to_le_bytes();
            self.flash[base + 2 * i] &= low;
            self.flash[base + 2 * i + 1] &= high;
        }
        self.buffer = [0xffff; PAGE_SIZE / 2];
        self.writes[page] += 1;
        self.busy = true;
        self.rww_busy = true;
    }

    fn busy_wait(&mut self) {
        if !self.interrupts {
            self.faults.wait_while_masked += 1;
        }
        self.busy = false;
    }

    fn rww_enable(&mut self) {
        self.check_spm();
        self.record(Event::RwwEnable);
        self.buffer = [0xffff; PAGE_SIZE / 2];
        self.rww_busy = false;
    }

    fn read_program(&mut self, address: u32) -> u8 {
        if self.rww_busy && address < CHIP.boot_section_start {
            self.faults.stale_reads += 1;
        }
        self.flash.get(address as usize).copied().unwrap_or(0xff)
    }

    fn read_data(&mut self, address: u16) -> u8 {
        self.eeprom.get(address as usize).copied().unwrap_or(0xff)
    }

    fn write_data(&mut self, address: u16, value: u8) {
        if let Some(byte) = self.eeprom.get_mut(address as usize) {
            *byte = value;
        }
    }

    fn set_indicator(&mut self, on: bool) {
        self.indicator = on;
    }
}
