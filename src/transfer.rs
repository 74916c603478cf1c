use crate::bus::{SieBus, Token};
use crate::transaction::dispatch_token;
use crate::types::{SetupPacket, Toggle};
use crate::{Error, UsbHost};

/// Data stage of a control transfer.
///
/// The direction bit of the accompanying setup packet goes on the wire
/// verbatim; callers are expected to keep the two consistent, as every
/// wrapper in this crate does.
pub enum DataStage<'a> {
    None,
    In(&'a mut [u8]),
    Out(&'a [u8]),
}

impl<B: SieBus> UsbHost<B> {
    /// Perform a complete control transfer: setup stage, optional data stage,
    /// status stage.
    ///
    /// The setup stage is always DATA0 and resets the endpoint's toggle
    /// bookkeeping; the data stage alternates starting at DATA1, chunked by
    /// the endpoint's max packet size. The status stage is a zero-length
    /// transfer in the opposite direction of the data stage (IN when there is
    /// none) and must be acknowledged by the device.
    ///
    /// Any stage's error aborts the whole transfer. On success the returned
    /// count covers the data stage and the device has confirmed completion.
    pub fn control_request(
        &mut self,
        addr: u8,
        ep: u8,
        setup: SetupPacket,
        data: DataStage<'_>,
        nak_limit: u16,
    ) -> Result<usize, Error> {
        self.bus.select_device(addr);
        self.bus.load_fifo(&setup.to_bytes());
        dispatch_token(&mut self.bus, Token::Setup, ep, false, nak_limit)?;

        let (transferred, status_in) = match data {
            DataStage::In(buf) if !buf.is_empty() => {
                self.devices.endpoint_mut(addr, ep)?.rcv_toggle = Toggle::Data1;
                (self.in_transfer(addr, ep, buf, nak_limit)?, false)
            }
            DataStage::Out(data) if !data.is_empty() => {
                self.devices.endpoint_mut(addr, ep)?.snd_toggle = Toggle::Data1;
                (self.out_transfer(addr, ep, data, nak_limit)?, true)
            }
            _ => (0, true),
        };

        self.control_status(ep, status_in, nak_limit)?;
        Ok(transferred)
    }

    /// Status stage: zero-length, always DATA1.
    fn control_status(&mut self, ep: u8, direction_in: bool, nak_limit: u16) -> Result<(), Error> {
        if direction_in {
            dispatch_token(&mut self.bus, Token::In, ep, true, nak_limit)?;
        } else {
            self.bus.load_fifo(&[]);
            dispatch_token(&mut self.bus, Token::Out, ep, true, nak_limit)?;
        }
        Ok(())
    }

    /// Receive up to `buf.len()` bytes from endpoint `ep`, one max-packet
    /// chunk per IN token, using and advancing the endpoint's receive toggle.
    ///
    /// A packet shorter than the endpoint's max packet size ends the transfer
    /// early; the returned count is the number of bytes actually received.
    pub fn in_transfer(&mut self, addr: u8, ep: u8, buf: &mut [u8], nak_limit: u16) -> Result<usize, Error> {
        self.bus.select_device(addr);
        let max_packet = self.devices.endpoint(addr, ep)?.max_packet_size as usize;
        let mut received = 0;

        while received < buf.len() {
            let toggle = self.devices.endpoint(addr, ep)?.rcv_toggle;
            let len = dispatch_token(&mut self.bus, Token::In, ep, toggle.bit(), nak_limit)? as usize;
            let space = buf.len() - received;
            received += self.bus.read_fifo(&mut buf[received..][..len.min(space)]) as usize;
            // only an acknowledged packet advances the toggle
            self.devices.endpoint_mut(addr, ep)?.rcv_toggle = toggle.flip();
            if len == 0 || len < max_packet {
                break;
            }
        }

        Ok(received)
    }

    /// Send `data` to endpoint `ep`, one max-packet chunk per OUT token,
    /// using and advancing the endpoint's send toggle. An empty `data` sends
    /// a single zero-length packet.
    pub fn out_transfer(&mut self, addr: u8, ep: u8, data: &[u8], nak_limit: u16) -> Result<usize, Error> {
        self.bus.select_device(addr);
        let max_packet = self.devices.endpoint(addr, ep)?.max_packet_size as usize;
        let mut sent = 0;

        loop {
            let chunk = (data.len() - sent).min(max_packet);
            let toggle = self.devices.endpoint(addr, ep)?.snd_toggle;
            self.bus.load_fifo(&data[sent..sent + chunk]);
            dispatch_token(&mut self.bus, Token::Out, ep, toggle.bit(), nak_limit)?;
            self.devices.endpoint_mut(addr, ep)?.snd_toggle = toggle.flip();
            sent += chunk;
            if sent >= data.len() {
                return Ok(sent);
            }
        }
    }

    /// Accumulate packets from a bulk or interrupt IN endpoint until
    /// `buf.len()` bytes arrive or the device ends the transfer with a short
    /// or zero-length packet. A short packet is not an error; the returned
    /// count reports what actually arrived.
    pub fn bulk_read(&mut self, addr: u8, ep: u8, buf: &mut [u8], nak_limit: u16) -> Result<usize, Error> {
        self.in_transfer(addr, ep, buf, nak_limit)
    }
}
