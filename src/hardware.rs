use crate::device::Chip;

/// Trait that describes access to the self-programming hardware of the chip the bootloader
/// runs on. [`UsbAsp`](crate::UsbAsp) calls these primitives in the order the chip requires
/// and uses the provided constants to size its sessions and enable optional functions.
///
/// In this context "page" is the smallest region of program memory that can be erased and
/// written, and "page buffer" is the chip's temporary buffer that collects words for the
/// next page write.
///
/// Every primitive issues a single instruction and returns. Waiting and interrupt masking
/// are requested separately:
///
/// > 1. [`busy_wait()`](IapHardware::busy_wait) is called before and after every destructive
/// >    operation, with interrupts enabled.
/// > 2. [`disable_interrupts()`](IapHardware::disable_interrupts) and
/// >    [`enable_interrupts()`](IapHardware::enable_interrupts) bracket exactly one of
/// >    [`page_erase()`](IapHardware::page_erase), [`page_fill()`](IapHardware::page_fill),
/// >    [`page_write()`](IapHardware::page_write) or [`rww_enable()`](IapHardware::rww_enable).
///
/// No operation can fail: erase and write completion is awaited, not verified. Hosts are
/// expected to read back what they wrote.
pub trait IapHardware {
    /// Chip geometry and signature.
    const CHIP: Chip;

    /// If set, the echo function (`0x17`) answers with its `wValue`. Default is `true`.
    const HAS_ECHO: bool = true;

    /// If set, single-byte data memory reads and writes passed through the ISP
    /// "transmit" function are served. Default is `true`.
    ///
    /// Streaming data memory access is always available.
    const HAS_DATA_MEMORY_ISP: bool = true;

    /// If set, the "disconnect" function also asks the bootloader to leave and start the
    /// application. Default is `false`.
    const LEAVE_ON_DISCONNECT: bool = false;

    /// Mask interrupts (`cli`).
    fn disable_interrupts(&mut self);

    /// Unmask interrupts (`sei`).
    fn enable_interrupts(&mut self);

    /// Start erasing the page containing `address`.
    fn page_erase(&mut self, address: u32);

    /// Load one little-endian word into the page buffer slot for `address`.
    fn page_fill(&mut self, address: u32, word: u16);

    /// Start writing the page buffer to the page containing `address`.
    fn page_write(&mut self, address: u32);

    /// Spin until the last erase or write has finished.
    fn busy_wait(&mut self);

    /// Re-enable reading of the read-while-write section after an erase or write.
    fn rww_enable(&mut self);

    /// Read one byte of program memory.
    fn read_program(&mut self, address: u32) -> u8;

    /// Read one byte of data memory.
    fn read_data(&mut self, address: u16) -> u8;

    /// Write one byte of data memory, waiting for any previous data memory write.
    fn write_data(&mut self, address: u16, value: u8);

    /// Drive the "connected" indicator.
    #[allow(unused_variables)]
    fn set_indicator(&mut self, on: bool) {}
}
