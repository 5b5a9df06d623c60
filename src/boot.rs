//! Bootloader entry and exit

/// Which interrupt vector table the CPU uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum VectorTable {
    /// Vectors at address zero, owned by the application.
    Application,
    /// Vectors at the start of the boot section.
    Bootloader,
}

/// Board services the controller needs around a programming session.
///
/// The indicator timer interrupt started by [`start_indicator()`](BootPlatform::start_indicator)
/// may only touch the indicator output.
pub trait BootPlatform {
    /// Sample the entry condition (e.g. a jumper or a held button). Called once, at reset.
    fn entry_requested(&mut self) -> bool;

    /// Checked after every transport poll. Returning `true` ends the session, for example
    /// when the entry button is released. Default is `false`.
    fn exit_requested(&mut self) -> bool {
        false
    }

    /// Select the interrupt vector table.
    fn set_vector_table(&mut self, table: VectorTable);

    /// Configure indicator pins and start the timer that blinks them.
    fn start_indicator(&mut self) {}

    /// Mask interrupts.
    fn disable_interrupts(&mut self);

    /// Unmask interrupts.
    fn enable_interrupts(&mut self);

    /// Put pins and timers used by the bootloader back to their power-on state.
    fn reset_peripherals(&mut self);

    /// Jump to address zero.
    fn start_application(&mut self) -> !;
}

/// The host link the controller yields to while armed.
pub trait Transport {
    /// Bring the link up. Called once when entering programming mode.
    fn attach(&mut self) {}

    /// Serve pending host requests, returning promptly.
    fn poll(&mut self);

    /// `true` once the host asked to leave the bootloader.
    fn leave_requested(&self) -> bool {
        false
    }
}

/// Lifecycle of the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum BootState {
    /// Nothing done yet.
    Idle,
    /// Serving the host.
    Armed,
    /// Peripherals restored, ready to start the application.
    Exited,
}

/// Boot/exit controller: decides whether to serve the host, serves it, and hands the chip
/// over to the application.
///
/// ```no_run
/// # use usbd_usbasp::{BootController, BootPlatform, Transport};
/// # fn bootloader<P: BootPlatform, T: Transport>(platform: P, transport: T) -> ! {
/// let mut controller = BootController::new(platform, transport);
/// controller.run();
/// controller.restart_application()
/// # }
/// ```
pub struct BootController<P: BootPlatform, T: Transport> {
    platform: P,
    transport: T,
    state: BootState,
}

impl<P: BootPlatform, T: Transport> BootController<P, T> {
    /// Creates a new [`BootController`] in [`BootState::Idle`].
    pub fn new(platform: P, transport: T) -> Self {
        Self {
            platform,
            transport,
            state: BootState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> BootState {
        self.state
    }

    /// Platform access.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Transport access.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Serve the host until it asks to leave or the platform signals exit.
    ///
    /// If the entry condition is not met the transport is never touched. Either way the
    /// controller is [`Exited`](BootState::Exited) when this returns.
    pub fn run(&mut self) {
        if self.state != BootState::Idle {
            return;
        }

        if self.platform.entry_requested() {
            self.arm();
            loop {
                self.transport.poll();
                if self.transport.leave_requested() || self.platform.exit_requested() {
                    break;
                }
            }
        }

        self.leave();
    }

    /// Hand the chip to the application. Does not return.
    pub fn restart_application(mut self) -> ! {
        self.leave();

        #[cfg(feature = "defmt-03")]
        defmt::info!("usbasp: starting application");

        self.platform.start_application()
    }

    fn arm(&mut self) {
        #[cfg(feature = "defmt-03")]
        defmt::info!("usbasp: entering bootloader");

        self.platform.set_vector_table(VectorTable::Bootloader);
        self.platform.start_indicator();
        self.platform.enable_interrupts();
        self.transport.attach();
        self.state = BootState::Armed;
    }

    fn leave(&mut self) {
        if self.state == BootState::Exited {
            return;
        }

        self.platform.disable_interrupts();
        if self.state == BootState::Armed {
            self.platform.set_vector_table(VectorTable::Application);
            self.platform.reset_peripherals();
        }
        self.state = BootState::Exited;
    }
}
