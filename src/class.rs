use core::cmp::min;
use core::marker::PhantomData;
use usb_device::{class_prelude::*, control::Request, device::UsbDevice};

use crate::boot::Transport;
use crate::descriptor::CommandDescriptor;
use crate::dispatch::{Setup, UsbAsp};
use crate::hardware::IapHardware;

const USB_CLASS_VENDOR_SPECIFIC: u8 = 0xFF;
const USB_SUBCLASS_NONE: u8 = 0x00;
const USB_PROTOCOL_NONE: u8 = 0x00;

// longest data stage a stream request can describe, see `CommandDescriptor::stream_length`
const MAX_STREAM_LENGTH: usize = 0xff;

// `usb-device` control buffer, the most a single IN data stage can carry
#[cfg(not(feature = "control-buffer-256"))]
const CONTROL_BUFFER_SIZE: usize = 128;
#[cfg(feature = "control-buffer-256")]
const CONTROL_BUFFER_SIZE: usize = 256;

/// USBasp protocol USB class implementation for usb-device library.
///
/// USBasp functions are vendor requests addressed to the device. Every other request is
/// left to `usb-device` and the other classes.
pub struct UsbAspClass<B: UsbBus, M: IapHardware> {
    if_num: InterfaceNumber,
    interface_string: StringIndex,
    _bus: PhantomData<B>,
    asp: UsbAsp<M>,
}

impl<B: UsbBus, M: IapHardware> UsbClass<B> for UsbAspClass<B, M> {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface_alt(
            self.if_num,
            0,
            USB_CLASS_VENDOR_SPECIFIC,
            USB_SUBCLASS_NONE,
            USB_PROTOCOL_NONE,
            Some(self.interface_string),
        )?;

        Ok(())
    }

    fn get_string(&self, index: StringIndex, lang_id: LangID) -> Option<&str> {
        if index == self.interface_string && (lang_id == LangID::EN_US || u16::from(lang_id) == 0) {
            return Some(M::CHIP.name);
        }
        None
    }

    // Handle control requests to the host.
    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();

        if !is_usbasp_request(&req) {
            return;
        }

        match self.asp.setup(&CommandDescriptor::from(&req)) {
            Setup::Reply(reply) => {
                xfer.accept_with(reply.as_slice()).ok();
            }
            Setup::Stream(operation) if operation.is_read() => {
                let mut buf = [0u8; MAX_STREAM_LENGTH];
                // never produce more than the control buffer can send
                let len = min(min(req.length as usize, buf.len()), CONTROL_BUFFER_SIZE);
                let produced = self.asp.read(&mut buf[..len]);
                if let Err(_err) = xfer.accept_with(&buf[..produced]) {
                    #[cfg(feature = "defmt-03")]
                    defmt::warn!("usbasp: {} reply of {=usize} bytes failed", operation, produced);
                }
            }
            Setup::Stream(_) => {
                xfer.accept_with(&[]).ok();
            }
        }
    }

    // Handle a control request from the host.
    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        if !is_usbasp_request(&req) {
            return;
        }

        if let Setup::Stream(operation) = self.asp.setup(&CommandDescriptor::from(&req)) {
            if operation.is_write() {
                self.asp.write(xfer.data());
            }
        }
        xfer.accept().ok();
    }

    fn reset(&mut self) {
        // a staged page must not outlive the session that staged it
        self.asp.finish();
    }
}

fn is_usbasp_request(req: &Request) -> bool {
    req.request_type == control::RequestType::Vendor
        && req.recipient == control::Recipient::Device
}

impl<B: UsbBus, M: IapHardware> UsbAspClass<B, M> {
    /// Creates a new [`UsbAspClass`] with the provided UsbBus and
    /// [`IapHardware`]
    pub fn new(alloc: &UsbBusAllocator<B>, hw: M) -> Self {
        Self {
            if_num: alloc.interface(),
            interface_string: alloc.string(),
            _bus: PhantomData,
            asp: UsbAsp::new(hw),
        }
    }

    /// This function will consume self and return the owned hardware
    /// argument that was moved in the call to [`UsbAspClass::new()`]
    pub fn release(self) -> M {
        self.asp.release()
    }

    /// Hardware access.
    pub fn hardware(&self) -> &M {
        self.asp.hardware()
    }

    /// `true` once the host asked to leave the bootloader.
    pub fn leave_requested(&self) -> bool {
        self.asp.leave_requested()
    }
}

/// A [`UsbDevice`] serving a single [`UsbAspClass`], ready to be driven by
/// [`BootController`](crate::BootController).
pub struct UsbTransport<'a, B: UsbBus, M: IapHardware> {
    device: UsbDevice<'a, B>,
    class: UsbAspClass<B, M>,
}

impl<'a, B: UsbBus, M: IapHardware> UsbTransport<'a, B, M> {
    /// Pair a built device with its class.
    pub fn new(device: UsbDevice<'a, B>, class: UsbAspClass<B, M>) -> Self {
        Self { device, class }
    }

    /// Split back into the device and the class.
    pub fn release(self) -> (UsbDevice<'a, B>, UsbAspClass<B, M>) {
        (self.device, self.class)
    }
}

impl<B: UsbBus, M: IapHardware> Transport for UsbTransport<'_, B, M> {
    fn attach(&mut self) {
        // make the host enumerate us again, it may still know the application
        self.device.force_reset().ok();
    }

    fn poll(&mut self) {
        self.device.poll(&mut [&mut self.class]);
    }

    fn leave_requested(&self) -> bool {
        self.class.leave_requested()
    }
}
