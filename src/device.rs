//! Build-time chip parameters

/// Memory geometry and identification of the chip the bootloader runs on.
///
/// Pick one of the constants below as [`IapHardware::CHIP`](crate::IapHardware::CHIP),
/// adjusting the boot section to the programmed BOOTSZ fuses with
/// [`with_boot_section_size`](Chip::with_boot_section_size) if needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Chip {
    /// Human readable part name, reported as the USB interface string.
    pub name: &'static str,
    /// Bytes answered to ISP "read signature", indexed by the low two bits of the address.
    pub signature: [u8; 4],
    /// Program memory size in bytes.
    pub flash_size: u32,
    /// Program memory page size in bytes. Must be a power of two.
    pub page_size: u16,
    /// Data memory size in bytes.
    pub eeprom_size: u16,
    /// First byte of the boot section. Nothing at or above it is ever erased or written.
    pub boot_section_start: u32,
}

impl Chip {
    /// Same chip with a boot section of `size` bytes at the top of program memory.
    pub const fn with_boot_section_size(self, size: u32) -> Self {
        Self {
            boot_section_start: self.flash_size - size,
            ..self
        }
    }

    /// Same chip answering with different signature bytes.
    pub const fn with_signature(self, signature: [u8; 4]) -> Self {
        Self { signature, ..self }
    }

    /// Start address of the page containing `address`.
    pub const fn page_of(&self, address: u32) -> u32 {
        address & !(self.page_size as u32 - 1)
    }

    /// `true` if `address` is the first byte of a page.
    pub const fn is_page_start(&self, address: u32) -> bool {
        address & (self.page_size as u32 - 1) == 0
    }
}

/// ATmega8, 2K boot section.
pub const ATMEGA8: Chip = Chip {
    name: "ATmega8",
    signature: [0x1e, 0x93, 0x07, 0],
    flash_size: 0x2000,
    page_size: 64,
    eeprom_size: 512,
    boot_section_start: 0x1800,
};

/// ATmega88, 2K boot section.
pub const ATMEGA88: Chip = Chip {
    name: "ATmega88",
    signature: [0x1e, 0x93, 0x0a, 0],
    flash_size: 0x2000,
    page_size: 64,
    eeprom_size: 512,
    boot_section_start: 0x1800,
};

/// ATmega168, 2K boot section.
pub const ATMEGA168: Chip = Chip {
    name: "ATmega168",
    signature: [0x1e, 0x94, 0x06, 0],
    flash_size: 0x4000,
    page_size: 128,
    eeprom_size: 512,
    boot_section_start: 0x3800,
};

/// ATmega328P, 4K boot section.
pub const ATMEGA328P: Chip = Chip {
    name: "ATmega328P",
    signature: [0x1e, 0x95, 0x0f, 0],
    flash_size: 0x8000,
    page_size: 128,
    eeprom_size: 1024,
    boot_section_start: 0x7000,
};
