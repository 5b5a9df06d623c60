//! USBasp command descriptor (the 8-byte control setup packet)

use usb_device::control::Request;

/// Turn the indicator on.
pub const FUNC_CONNECT: u8 = 1;
/// Turn the indicator off.
pub const FUNC_DISCONNECT: u8 = 2;
/// Pass a 4-byte ISP command embedded in `wValue` and `wIndex`.
pub const FUNC_TRANSMIT: u8 = 3;
/// Stream program memory to the host.
pub const FUNC_READFLASH: u8 = 4;
/// Enter programming mode. Always acknowledged with a single zero byte.
pub const FUNC_ENABLEPROG: u8 = 5;
/// Stream program memory from the host.
pub const FUNC_WRITEFLASH: u8 = 6;
/// Stream data memory to the host.
pub const FUNC_READEEPROM: u8 = 7;
/// Stream data memory from the host.
pub const FUNC_WRITEEEPROM: u8 = 8;
/// Echo `wValue` back to the host.
pub const FUNC_ECHO: u8 = 0x17;

/// ISP: read one signature byte.
pub const ISP_READ_SIGNATURE: u8 = 0x30;
/// ISP: read one data memory byte.
pub const ISP_READ_EEPROM: u8 = 0xa0;
/// ISP: write one data memory byte.
pub const ISP_WRITE_EEPROM: u8 = 0xc0;
/// ISP: chip erase, first byte.
pub const ISP_CHIP_ERASE1: u8 = 0xac;
/// ISP: chip erase, second byte.
pub const ISP_CHIP_ERASE2: u8 = 0x80;

/// One request from the host, exactly as it arrives in the setup stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(C)]
pub struct CommandDescriptor {
    /// `bmRequestType`. Not interpreted, USBasp functions are identified by `request` alone.
    pub request_type: u8,
    /// `bRequest`, one of the `FUNC_*` codes.
    pub request: u8,
    /// `wValue`: echo payload, stream base address, or the first half of an ISP command.
    pub value: u16,
    /// `wIndex`: the second half of an ISP command.
    pub index: u16,
    /// `wLength`: stream length, only the low byte is honoured.
    pub length: u16,
}

impl CommandDescriptor {
    /// The ISP command carried by a [`FUNC_TRANSMIT`] request.
    ///
    /// Hosts place the four command bytes in setup bytes 2..6, so this is
    /// `wValue` followed by `wIndex`, both little-endian.
    pub fn isp_command(&self) -> [u8; 4] {
        let [v0, v1] = self.value.to_le_bytes();
        let [i0, i1] = self.index.to_le_bytes();
        [v0, v1, i0, i1]
    }

    /// Total length of a streaming session.
    pub fn stream_length(&self) -> u16 {
        self.length & 0xff
    }
}

impl From<[u8; 8]> for CommandDescriptor {
    fn from(bytes: [u8; 8]) -> Self {
        Self {
            request_type: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}

impl From<&Request> for CommandDescriptor {
    fn from(req: &Request) -> Self {
        Self {
            request_type: (req.direction as u8)
                | ((req.request_type as u8) << 5)
                | (req.recipient as u8),
            request: req.request,
            value: req.value,
            index: req.index,
            length: req.length,
        }
    }
}
