#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//!
//! Implements the device side of the USBasp programmer protocol as a self-programming
//! bootloader for AVR microcontrollers, on top of `usb-device`.
//!
//! ## About
//!
//! The bootloader lives in the protected boot section of program memory and answers the
//! same vendor requests a USBasp ISP programmer does, so unmodified host tools (`avrdude -c
//! usbasp`) can read and write the application area and the EEPROM of the chip itself.
//!
//! This library implements the protocol and the page programming sequence only. The
//! instructions that actually erase, load and write pages, and the board specific entry
//! and exit conditions, are provided by the library user through [`IapHardware`] and
//! [`BootPlatform`].
//!
//! ### Supported requests
//!
//! * Enable programming, connect and disconnect (indicator)
//! * ISP passthrough: read signature, read/write one EEPROM byte, chip erase
//! * Streaming read and write of program memory and EEPROM
//! * Echo, for link testing
//!
//! Unknown requests are answered with an empty reply, nothing is ever stalled.
//!
//! ### Limitations
//!
//! * Streaming length is taken from the low byte of `wLength`, as USBasp firmware does.
//! Transfers longer than `usb-device`'s control buffer (`128` bytes
//! by default) need the `control-buffer-256` feature.
//!
//! * Only the first 64K of program memory is addressable.
//!
//! * Written data is not verified. Hosts are expected to read it back.
//!
//! ## Programming sequence
//!
//! Program memory writes are staged a word at a time into the page buffer. A page is
//! erased right before the first word of a session lands in it and written when the
//! session crosses into the next page or ends. Interrupts are masked only around the
//! individual self-programming instructions, never across the busy waits.
//!
//! ## Example
//!
//! ```no_run
//! use usb_device::prelude::*;
//! use usbd_usbasp::*;
//! #
//! # fn bootloader<B: usb_device::bus::UsbBus, H: IapHardware, P: BootPlatform>(
//! #     usb_bus_alloc: usb_device::bus::UsbBusAllocator<B>,
//! #     hardware: H,
//! #     board: P,
//! # ) -> ! {
//!
//! // `hardware` implements IapHardware for the chip (SPM, EEPROM, indicator),
//! // `board` implements BootPlatform (entry jumper, vector table, jump to zero).
//!
//! let class = UsbAspClass::new(&usb_bus_alloc, hardware);
//! let device = UsbDeviceBuilder::new(&usb_bus_alloc, UsbVidPid(0x16c0, 0x05dc))
//!     .strings(&[StringDescriptors::new(LangID::EN)
//!         .manufacturer("www.fischl.de")
//!         .product("USBasp")])
//!     .unwrap()
//!     .build();
//!
//! let mut controller = BootController::new(board, UsbTransport::new(device, class));
//! controller.run();
//! controller.restart_application()
//! # }
//! ```

pub mod boot;

/// USBasp protocol USB class
pub mod class;

pub mod descriptor;
pub mod device;
pub mod dispatch;

/// Self-programming hardware access
pub mod hardware;

pub mod programmer;
pub mod sim;

#[doc(inline)]
pub use crate::boot::{BootController, BootPlatform, BootState, Transport, VectorTable};
#[doc(inline)]
pub use crate::class::{UsbAspClass, UsbTransport};
#[doc(inline)]
pub use crate::descriptor::CommandDescriptor;
#[doc(inline)]
pub use crate::device::Chip;
#[doc(inline)]
pub use crate::dispatch::{Reply, Setup, UsbAsp};
#[doc(inline)]
pub use crate::hardware::IapHardware;
#[doc(inline)]
pub use crate::programmer::{Operation, Session};
