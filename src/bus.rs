//! Interface for the SIE transport
//!
//! The engine drives a discrete serial interface engine (SIE) chip through the
//! [`SieBus`] trait. The chip owns the physical signaling: it issues tokens,
//! moves bytes through its FIFO and reports per-transaction results. Everything
//! above that line (staging, retries, toggles, enumeration) lives in this crate.
//!
//! To use the engine on a given board, implement [`SieBus`] for its SIE driver.

use crate::types::Instant;
use defmt::Format;

/// The minimal USB bus operation, addressed to one device+endpoint.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Format)]
pub enum Token {
    Setup,
    In,
    Out,
}

/// Result of dispatching a single token.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Format)]
pub enum Outcome {
    /// Device acknowledged the transaction. `len` is the number of bytes
    /// received (IN) or sent (SETUP/OUT).
    Ack { len: u16 },
    /// Device is not ready. Flow control, not an error.
    Nak,
    /// Endpoint rejects the request.
    Stall,
    /// Transport-level failure.
    Error(BusError),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Format)]
pub enum BusError {
    /// CRC mismatch
    Crc,
    /// Bit stuffing rules were not followed
    BitStuffing,
    /// Data was received faster than it could be processed
    RxOverflow,
    /// Expected data to be received, but it did not arrive in time
    RxTimeout,
    /// Saw DATA0 when expecting DATA1 or vice versa
    DataSequence,
    /// None of the above. Hardware specific error condition.
    Other,
}

pub trait SieBus {
    /// Reset the SIE chip into host mode.
    ///
    /// Called once when the [`crate::UsbHost`] is created and again on
    /// [`crate::UsbHost::reinitialize`]. Must leave the chip ready to report
    /// attach events and dispatch tokens.
    fn reset_controller(&mut self);

    /// Drive a RESET condition on the bus, leaving the controller initialized.
    fn bus_reset(&mut self);

    /// Whether the last requested bus reset has completed.
    fn reset_complete(&mut self) -> bool;

    /// Level signal: a device is currently attached to the port.
    fn device_attached(&mut self) -> bool;

    /// Whether a valid start-of-frame has been observed since the last bus reset.
    fn frame_started(&mut self) -> bool;

    /// Set the peripheral address for all subsequent tokens, until called again.
    fn select_device(&mut self, addr: u8);

    /// Issue one token to endpoint `ep` of the selected device and wait for the
    /// device's handshake, bounded by the chip's own hardware timeout.
    ///
    /// `data1` selects the DATA PID for the data phase of this transaction
    /// (ignored for SETUP, which is always DATA0).
    ///
    /// On `Ack` for an IN token, the received bytes must be available through
    /// [`SieBus::read_fifo`] until the next token is issued.
    fn send_token(&mut self, token: Token, ep: u8, data1: bool) -> Outcome;

    /// Stage the payload for upcoming SETUP/OUT tokens.
    ///
    /// The staged bytes must remain valid across NAK and bus-error retries of
    /// the same token; only the next `load_fifo` or `read_fifo` may clobber them.
    fn load_fifo(&mut self, data: &[u8]);

    /// Drain received bytes into `buf`, returning how many were copied.
    fn read_fifo(&mut self, buf: &mut [u8]) -> u16;

    /// Current time on a monotonic millisecond clock.
    fn now(&self) -> Instant;
}
