use crate::bus::{Outcome, SieBus, Token};
use crate::types::Duration;
use crate::Error;
use defmt::trace;

/// Wall-clock bound on a single transfer, per USB 2.0 §9.2.6.1.
pub const XFER_TIMEOUT: Duration = Duration::millis(5000);

/// Attempts before a transport-level error is surfaced to the caller.
pub const RETRY_LIMIT: u8 = 3;

/// Issue one token and classify the result.
///
/// NAKs are retried until `nak_limit` is exhausted; a limit of 0 leaves NAKs
/// uncounted, bounded only by [`XFER_TIMEOUT`]. Bus errors are retried up to
/// [`RETRY_LIMIT`] attempts. STALL is surfaced immediately.
///
/// Returns the byte count reported by the SIE. Toggle bookkeeping is the
/// caller's responsibility.
pub(crate) fn dispatch_token<B: SieBus>(
    bus: &mut B,
    token: Token,
    ep: u8,
    data1: bool,
    nak_limit: u16,
) -> Result<u16, Error> {
    let started = bus.now();
    let mut naks: u16 = 0;
    let mut attempts: u8 = 0;

    loop {
        attempts += 1;
        match bus.send_token(token, ep, data1) {
            Outcome::Ack { len } => return Ok(len),
            Outcome::Nak => {
                naks = naks.saturating_add(1);
                if nak_limit != 0 && naks > nak_limit {
                    return Err(Error::NakLimit);
                }
            }
            Outcome::Stall => return Err(Error::Stall),
            Outcome::Error(error) => {
                if attempts >= RETRY_LIMIT {
                    trace!("bus error after {} attempts: {}", attempts, error);
                    return Err(Error::Bus(error));
                }
            }
        }

        let elapsed = bus.now().checked_duration_since(started);
        if elapsed.map_or(true, |d| d >= XFER_TIMEOUT) {
            return Err(Error::Timeout);
        }
    }
}
