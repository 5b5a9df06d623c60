//! Command dispatcher

use crate::descriptor::*;
use crate::hardware::IapHardware;
use crate::programmer::{erase_application, Operation, Session};

/// Immediate answer to a request, at most four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Reply {
    buf: [u8; 4],
    len: u8,
}

impl Reply {
    /// Zero-length reply.
    pub const EMPTY: Reply = Reply {
        buf: [0; 4],
        len: 0,
    };

    fn new(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self {
            buf,
            len: bytes.len() as u8,
        }
    }

    /// Reply length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// `true` for a zero-length reply.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reply bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len()]
    }
}

/// Outcome of [`UsbAsp::setup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Setup {
    /// Answer with these bytes, no data stage follows.
    Reply(Reply),
    /// A streaming session is armed. The transport now calls [`UsbAsp::read`] or
    /// [`UsbAsp::write`] with the data stage.
    Stream(Operation),
}

/// USBasp self-programming core.
///
/// Owns the hardware access and the session state. The transport hands every setup packet
/// to [`setup()`](UsbAsp::setup) and, when it answers [`Setup::Stream`], feeds the data
/// stage through [`write()`](UsbAsp::write) or drains it through [`read()`](UsbAsp::read).
/// Requests that are not understood are answered with an empty reply, nothing is ever
/// reported as an error.
pub struct UsbAsp<M: IapHardware> {
    hw: M,
    session: Session,
    leave: bool,
}

impl<M: IapHardware> UsbAsp<M> {
    /// Creates a new [`UsbAsp`] with nothing armed.
    pub fn new(hw: M) -> Self {
        Self {
            hw,
            session: Session::new(),
            leave: false,
        }
    }

    /// Consume self and return the hardware access.
    pub fn release(self) -> M {
        self.hw
    }

    /// Hardware access.
    pub fn hardware(&self) -> &M {
        &self.hw
    }

    /// Current streaming session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// `true` once the host asked to leave the bootloader.
    pub fn leave_requested(&self) -> bool {
        self.leave
    }

    /// Interpret one request.
    pub fn setup(&mut self, descriptor: &CommandDescriptor) -> Setup {
        let reply = match descriptor.request {
            FUNC_ENABLEPROG => Reply::new(&[0]),
            FUNC_CONNECT => {
                self.hw.set_indicator(true);
                Reply::EMPTY
            }
            FUNC_DISCONNECT => {
                self.hw.set_indicator(false);
                if M::LEAVE_ON_DISCONNECT {
                    self.leave = true;
                }
                Reply::EMPTY
            }
            FUNC_TRANSMIT => self.transmit(descriptor.isp_command()),
            FUNC_ECHO if M::HAS_ECHO => Reply::new(&descriptor.value.to_le_bytes()),
            FUNC_READFLASH => return self.stream(Operation::ReadProgram, descriptor),
            FUNC_WRITEFLASH => return self.stream(Operation::WriteProgram, descriptor),
            FUNC_READEEPROM => return self.stream(Operation::ReadData, descriptor),
            FUNC_WRITEEEPROM => return self.stream(Operation::WriteData, descriptor),
            _ => Reply::EMPTY,
        };
        Setup::Reply(reply)
    }

    /// Data stage of a write session. Returns `true` once the session is complete.
    pub fn write(&mut self, data: &[u8]) -> bool {
        self.session.write(&mut self.hw, data)
    }

    /// Data stage of a read session. Returns the number of bytes stored in `out`.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.session.read(&mut self.hw, out)
    }

    /// Commit an unfinished program memory write and drop the session.
    pub fn finish(&mut self) {
        self.session.finish(&mut self.hw);
    }

    fn stream(&mut self, operation: Operation, descriptor: &CommandDescriptor) -> Setup {
        self.session.arm(
            &mut self.hw,
            operation,
            descriptor.value,
            descriptor.stream_length(),
        );
        Setup::Stream(operation)
    }

    fn transmit(&mut self, cmd: [u8; 4]) -> Reply {
        let mut reply = [0u8; 4];
        let address = u16::from_be_bytes([cmd[1], cmd[2]]);
        let in_data_memory = M::HAS_DATA_MEMORY_ISP && address < M::CHIP.eeprom_size;

        match cmd[0] {
            ISP_READ_SIGNATURE => {
                reply[3] = M::CHIP.signature[(cmd[2] & 0x03) as usize];
            }
            ISP_READ_EEPROM if in_data_memory => {
                reply[3] = self.hw.read_data(address);
            }
            ISP_WRITE_EEPROM if in_data_memory => {
                // an EEPROM write discards the page buffer
                self.session.finish(&mut self.hw);
                self.hw.write_data(address, cmd[3]);
            }
            ISP_CHIP_ERASE1 if cmd[1] == ISP_CHIP_ERASE2 => {
                self.session.finish(&mut self.hw);
                erase_application(&mut self.hw);
            }
            _ => {}
        }

        Reply::new(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Chip;
    use crate::sim::{Faults, SimDevice};

    fn request(request: u8, value: u16, index: u16, length: u16) -> CommandDescriptor {
        CommandDescriptor {
            request_type: 0xc0,
            request,
            value,
            index,
            length,
        }
    }

    fn isp(cmd: [u8; 4]) -> CommandDescriptor {
        request(
            FUNC_TRANSMIT,
            u16::from_le_bytes([cmd[0], cmd[1]]),
            u16::from_le_bytes([cmd[2], cmd[3]]),
            4,
        )
    }

    fn reply<M: IapHardware>(asp: &mut UsbAsp<M>, d: CommandDescriptor) -> [u8; 4] {
        match asp.setup(&d) {
            Setup::Reply(r) => {
                let mut out = [0u8; 4];
                out[..r.len()].copy_from_slice(r.as_slice());
                out
            }
            Setup::Stream(op) => panic!("unexpected stream {:?}", op),
        }
    }

    #[test]
    fn enable_programming_acknowledges() {
        let mut asp = UsbAsp::new(SimDevice::new());
        match asp.setup(&request(FUNC_ENABLEPROG, 0, 0, 1)) {
            Setup::Reply(r) => assert_eq!(r.as_slice(), &[0]),
            _ => panic!(),
        }
        assert_eq!(asp.session().operation(), Operation::None);
    }

    #[test]
    fn connect_and_disconnect_drive_indicator() {
        let mut asp = UsbAsp::new(SimDevice::new());
        assert_eq!(asp.setup(&request(FUNC_CONNECT, 0, 0, 0)), Setup::Reply(Reply::EMPTY));
        assert!(asp.hardware().indicator());
        assert_eq!(asp.setup(&request(FUNC_DISCONNECT, 0, 0, 0)), Setup::Reply(Reply::EMPTY));
        assert!(!asp.hardware().indicator());
        assert!(!asp.leave_requested());
    }

    #[test]
    fn echo_returns_value() {
        let mut asp = UsbAsp::new(SimDevice::new());
        for value in [0x0000u16, 0x0001, 0x1234, 0x8000, 0xffff] {
            match asp.setup(&request(FUNC_ECHO, value, 0, 2)) {
                Setup::Reply(r) => assert_eq!(r.as_slice(), &value.to_le_bytes()),
                _ => panic!(),
            }
        }
    }

    #[test]
    fn signature_bytes() {
        let mut asp = UsbAsp::new(SimDevice::new());
        let signature = <SimDevice as IapHardware>::CHIP.signature;
        for i in 0..4u8 {
            assert_eq!(
                reply(&mut asp, isp([ISP_READ_SIGNATURE, 0, i, 0])),
                [0, 0, 0, signature[i as usize]]
            );
        }
        // only the low two bits select
        assert_eq!(reply(&mut asp, isp([ISP_READ_SIGNATURE, 0, 0x05, 0]))[3], signature[1]);
    }

    #[test]
    fn single_byte_data_memory() {
        let mut asp = UsbAsp::new(SimDevice::new());
        assert_eq!(reply(&mut asp, isp([ISP_WRITE_EEPROM, 0x01, 0x23, 0x5a])), [0; 4]);
        assert_eq!(asp.hardware().eeprom()[0x123], 0x5a);
        assert_eq!(reply(&mut asp, isp([ISP_READ_EEPROM, 0x01, 0x23, 0])), [0, 0, 0, 0x5a]);

        // outside data memory: absorbed
        assert_eq!(reply(&mut asp, isp([ISP_WRITE_EEPROM, 0x02, 0x00, 0x11])), [0; 4]);
        assert_eq!(reply(&mut asp, isp([ISP_READ_EEPROM, 0x02, 0x00, 0])), [0; 4]);
    }

    #[test]
    fn chip_erase_clears_application_area() {
        let mut sim = SimDevice::new();
        sim.load_program(0, &[0x12; 256]);
        sim.load_program(0x3700, &[0x34; 16]);
        sim.load_program(0x3800, &[0x56; 16]);
        let mut asp = UsbAsp::new(sim);

        assert_eq!(reply(&mut asp, isp([ISP_CHIP_ERASE1, ISP_CHIP_ERASE2, 0, 0])), [0; 4]);

        let flash = asp.hardware().flash();
        assert!(flash[..0x3800].iter().all(|&b| b == 0xff));
        assert!(flash[0x3800..0x3810].iter().all(|&b| b == 0x56));
        assert_eq!(asp.hardware().faults(), Faults::default());

        // reading through the session sees erased memory too
        asp.setup(&request(FUNC_READFLASH, 0x3700, 0, 16));
        let mut out = [0u8; 16];
        assert_eq!(asp.read(&mut out), 16);
        assert_eq!(out, [0xff; 16]);
    }

    #[test]
    fn chip_erase_commits_pending_page_first() {
        let mut asp = UsbAsp::new(SimDevice::new());
        asp.setup(&request(FUNC_WRITEFLASH, 0, 0, 8));
        assert!(!asp.write(&[1, 2, 3, 4]));

        reply(&mut asp, isp([ISP_CHIP_ERASE1, ISP_CHIP_ERASE2, 0, 0]));

        assert_eq!(asp.session().operation(), Operation::None);
        assert_eq!(asp.hardware().writes(0), 1);
        assert_eq!(asp.hardware().erases(0), 2);
        assert_eq!(&asp.hardware().flash()[..8], &[0xff; 8]);
        assert_eq!(asp.hardware().faults(), Faults::default());

        // the rest of the interrupted session is dropped
        assert!(asp.write(&[5, 6, 7, 8]));
        assert_eq!(&asp.hardware().flash()[..8], &[0xff; 8]);
    }

    #[test]
    fn data_memory_write_commits_pending_page_first() {
        let mut asp = UsbAsp::new(SimDevice::new());
        asp.setup(&request(FUNC_WRITEFLASH, 0, 0, 8));
        assert!(!asp.write(&[1, 2, 3, 4]));

        reply(&mut asp, isp([ISP_WRITE_EEPROM, 0x00, 0x20, 0x5a]));

        assert_eq!(asp.session().operation(), Operation::None);
        assert_eq!(&asp.hardware().flash()[..8], &[1, 2, 3, 4, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(asp.hardware().eeprom()[0x20], 0x5a);
        assert_eq!(asp.hardware().faults(), Faults::default());
    }

    #[test]
    fn finish_commits_partial_write() {
        let mut asp = UsbAsp::new(SimDevice::new());
        asp.setup(&request(FUNC_WRITEFLASH, 0x80, 0, 16));
        assert!(!asp.write(&[0x10, 0x20, 0x30, 0x40, 0x50]));
        assert_eq!(asp.hardware().writes(0x80), 0);

        asp.finish();

        assert_eq!(asp.session().operation(), Operation::None);
        assert_eq!(asp.hardware().writes(0x80), 1);
        assert_eq!(&asp.hardware().flash()[0x80..0x86], &[0x10, 0x20, 0x30, 0x40, 0x50, 0xff]);
        assert_eq!(asp.hardware().faults(), Faults::default());
    }

    #[test]
    fn half_chip_erase_command_is_ignored() {
        let mut sim = SimDevice::new();
        sim.load_program(0, &[0x12; 4]);
        let mut asp = UsbAsp::new(sim);
        assert_eq!(reply(&mut asp, isp([ISP_CHIP_ERASE1, 0x00, 0, 0])), [0; 4]);
        assert_eq!(asp.hardware().flash()[0], 0x12);
    }

    #[test]
    fn unknown_requests_are_absorbed() {
        let mut asp = UsbAsp::new(SimDevice::new());
        assert_eq!(asp.setup(&request(0x09, 1, 0, 0)), Setup::Reply(Reply::EMPTY));
        assert_eq!(asp.setup(&request(0x7f, 0, 0, 8)), Setup::Reply(Reply::EMPTY));
        assert_eq!(reply(&mut asp, isp([0x58, 0, 0, 0])), [0; 4]);
        assert!(asp.hardware().events().is_empty());
    }

    #[test]
    fn program_memory_round_trip_across_pages() {
        let mut asp = UsbAsp::new(SimDevice::new());
        let mut data = [0u8; 160];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8 ^ 0xa5;
        }

        assert_eq!(
            asp.setup(&request(FUNC_WRITEFLASH, 0x0f0, 0, 160)),
            Setup::Stream(Operation::WriteProgram)
        );
        let mut done = false;
        for chunk in data.chunks(8) {
            assert!(!done);
            done = asp.write(chunk);
        }
        assert!(done);

        asp.setup(&request(FUNC_READFLASH, 0x0f0, 0, 160));
        let mut out = [0u8; 160];
        assert_eq!(asp.read(&mut out), 160);
        assert_eq!(out, data);
        assert_eq!(asp.hardware().faults(), Faults::default());
    }

    #[test]
    fn stream_length_uses_low_byte_only() {
        let mut asp = UsbAsp::new(SimDevice::new());
        asp.setup(&request(FUNC_WRITEEEPROM, 0, 0, 0x0104));
        assert_eq!(asp.session().remaining(), 4);
        assert!(asp.write(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(&asp.hardware().eeprom()[..5], &[1, 2, 3, 4, 0xff]);
    }

    struct Quiet(SimDevice);

    impl IapHardware for Quiet {
        const CHIP: Chip = <SimDevice as IapHardware>::CHIP;
        const HAS_ECHO: bool = false;
        const HAS_DATA_MEMORY_ISP: bool = false;
        const LEAVE_ON_DISCONNECT: bool = true;

        fn disable_interrupts(&mut self) {
            self.0.disable_interrupts()
        }
        fn enable_interrupts(&mut self) {
            self.0.enable_interrupts()
        }
        fn page_erase(&mut self, address: u32) {
            self.0.page_erase(address)
        }
        fn page_fill(&mut self, address: u32, word: u16) {
            self.0.page_fill(address, word)
        }
        fn page_write(&mut self, address: u32) {
            self.0.page_write(address)
        }
        fn busy_wait(&mut self) {
            self.0.busy_wait()
        }
        fn rww_enable(&mut self) {
            self.0.rww_enable()
        }
        fn read_program(&mut self, address: u32) -> u8 {
            self.0.read_program(address)
        }
        fn read_data(&mut self, address: u16) -> u8 {
            self.0.read_data(address)
        }
        fn write_data(&mut self, address: u16, value: u8) {
            self.0.write_data(address, value)
        }
    }

    #[test]
    fn optional_functions_follow_configuration() {
        let mut sim = SimDevice::new();
        sim.load_data(0x10, &[0x77]);
        let mut asp = UsbAsp::new(Quiet(sim));

        assert_eq!(asp.setup(&request(FUNC_ECHO, 0x1234, 0, 2)), Setup::Reply(Reply::EMPTY));
        assert_eq!(reply(&mut asp, isp([ISP_READ_EEPROM, 0x00, 0x10, 0])), [0; 4]);
        assert_eq!(reply(&mut asp, isp([ISP_WRITE_EEPROM, 0x00, 0x10, 0x01])), [0; 4]);
        assert_eq!(asp.hardware().0.eeprom()[0x10], 0x77);

        assert!(!asp.leave_requested());
        asp.setup(&request(FUNC_DISCONNECT, 0, 0, 0));
        assert!(asp.leave_requested());
    }
}
