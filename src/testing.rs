//! Test doubles for the SIE transport.

use crate::bus::{BusError, Outcome, SieBus, Token};
use crate::types::Instant;
use heapless::Vec;

// Host-side test binaries need a logger to link against; frames go nowhere.
#[defmt::global_logger]
struct NopLogger;

unsafe impl defmt::Logger for NopLogger {
    fn acquire() {}
    unsafe fn flush() {}
    unsafe fn release() {}
    unsafe fn write(_bytes: &[u8]) {}
}

/// Replays a scripted sequence of transaction outcomes, recording every token
/// and staged payload. Panics when the script runs out.
pub struct ScriptedBus {
    outcomes: Vec<Outcome, 128>,
    cursor: usize,
    /// (token, endpoint, data1) for every `send_token` call.
    pub tokens: Vec<(Token, u8, bool), 128>,
    /// Every payload staged with `load_fifo`, in order.
    pub loads: Vec<Vec<u8, 64>, 16>,
    pub attached: bool,
    pub selected: u8,
    pub now_ms: u32,
    /// Milliseconds the clock advances per dispatched token.
    pub tick_ms: u32,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            cursor: 0,
            tokens: Vec::new(),
            loads: Vec::new(),
            attached: true,
            selected: 0,
            now_ms: 0,
            tick_ms: 0,
        }
    }

    pub fn script(&mut self, outcomes: &[Outcome]) {
        for outcome in outcomes {
            self.outcomes.push(*outcome).unwrap();
        }
    }
}

impl SieBus for ScriptedBus {
    fn reset_controller(&mut self) {}

    fn bus_reset(&mut self) {}

    fn reset_complete(&mut self) -> bool {
        true
    }

    fn device_attached(&mut self) -> bool {
        self.attached
    }

    fn frame_started(&mut self) -> bool {
        true
    }

    fn select_device(&mut self, addr: u8) {
        self.selected = addr;
    }

    fn send_token(&mut self, token: Token, ep: u8, data1: bool) -> Outcome {
        self.now_ms += self.tick_ms;
        self.tokens.push((token, ep, data1)).unwrap();
        let outcome = self.outcomes[self.cursor];
        self.cursor += 1;
        outcome
    }

    fn load_fifo(&mut self, data: &[u8]) {
        self.loads.push(Vec::from_slice(data).unwrap()).unwrap();
    }

    fn read_fifo(&mut self, buf: &mut [u8]) -> u16 {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = i as u8;
        }
        buf.len() as u16
    }

    fn now(&self) -> Instant {
        Instant::from_ticks(self.now_ms)
    }
}

/// Behaves like a single attached full-speed device with an 8-byte endpoint
/// zero: decodes SETUP packets, serves canned descriptors in max-packet
/// chunks, and applies SET_ADDRESS / SET_CONFIGURATION at the status stage.
///
/// The canned identity is a HID boot keyboard with one interrupt IN endpoint.
pub struct FakeDevice {
    pub attached: bool,
    pub device_descriptor: [u8; 18],
    pub configuration_bundle: Vec<u8, 256>,
    /// Requests answered with STALL on their data or status stage.
    pub stall_requests: Vec<u8, 4>,
    /// Configuration value selected by SET_CONFIGURATION, if any.
    pub configuration: Option<u8>,
    /// Milliseconds the clock advances per `device_attached` poll.
    pub tick_ms: u32,
    address: u8,
    selected: u8,
    pending_address: Option<u8>,
    pending_configuration: Option<u8>,
    stall_pending: bool,
    reset_done: bool,
    reply: Vec<u8, 256>,
    fifo: Vec<u8, 64>,
    loaded: Vec<u8, 64>,
    now_ms: u32,
}

impl FakeDevice {
    pub fn new() -> Self {
        let device_descriptor = [
            18, 1, // device descriptor
            0x00, 0x02, // USB 2.00
            0, 0, 0, // class defined per interface
            8, // max packet size 0
            0xFE, 0xCA, // idVendor
            0x0D, 0xF0, // idProduct
            0x00, 0x01, // device release 1.00
            0, 0, 0, // no strings
            1, // one configuration
        ];
        let bundle = [
            9, 2, 34, 0, 1, 1, 0, 0xA0, 50, // configuration 1
            9, 4, 0, 0, 1, 3, 1, 1, 0, // interface: HID boot keyboard
            9, 0x21, 0x11, 0x01, 0, 1, 0x22, 63, 0, // HID descriptor
            7, 5, 0x81, 3, 8, 0, 10, // endpoint 1 IN, interrupt, 8 bytes, 10ms
        ];
        Self {
            attached: true,
            device_descriptor,
            configuration_bundle: Vec::from_slice(&bundle).unwrap(),
            stall_requests: Vec::new(),
            configuration: None,
            tick_ms: 0,
            address: 0,
            selected: 0,
            pending_address: None,
            pending_configuration: None,
            stall_pending: false,
            reset_done: false,
            reply: Vec::new(),
            fifo: Vec::new(),
            loaded: Vec::new(),
            now_ms: 0,
        }
    }

    fn handle_setup(&mut self) -> Outcome {
        let setup = &self.loaded;
        let request_type = setup[0];
        let request = setup[1];
        let value = u16::from_le_bytes([setup[2], setup[3]]);
        let length = u16::from_le_bytes([setup[6], setup[7]]);

        self.stall_pending = self.stall_requests.contains(&request);
        self.reply.clear();

        if request_type & 0x80 != 0 {
            // device-to-host: queue the reply for the data stage
            if request == 0x06 {
                let source: &[u8] = match (value >> 8) as u8 {
                    1 => &self.device_descriptor,
                    2 => &self.configuration_bundle,
                    _ => &[],
                };
                let n = (length as usize).min(source.len());
                let mut reply = Vec::new();
                reply.extend_from_slice(&source[..n]).unwrap();
                self.reply = reply;
            }
        } else {
            match request {
                0x05 => self.pending_address = Some(value as u8),
                0x09 => self.pending_configuration = Some(value as u8),
                _ => {}
            }
        }

        Outcome::Ack { len: 8 }
    }
}

impl SieBus for FakeDevice {
    fn reset_controller(&mut self) {
        self.address = 0;
        self.configuration = None;
        self.reset_done = false;
        self.reply.clear();
    }

    fn bus_reset(&mut self) {
        self.address = 0;
        self.configuration = None;
        self.reset_done = true;
    }

    fn reset_complete(&mut self) -> bool {
        self.reset_done
    }

    fn device_attached(&mut self) -> bool {
        self.now_ms += self.tick_ms;
        self.attached
    }

    fn frame_started(&mut self) -> bool {
        true
    }

    fn select_device(&mut self, addr: u8) {
        self.selected = addr;
    }

    fn send_token(&mut self, token: Token, _ep: u8, _data1: bool) -> Outcome {
        if !self.attached || self.selected != self.address {
            // nobody answers at this address
            return Outcome::Error(BusError::RxTimeout);
        }

        match token {
            Token::Setup => self.handle_setup(),
            Token::In => {
                if self.stall_pending {
                    self.stall_pending = false;
                    return Outcome::Stall;
                }
                if self.reply.is_empty() {
                    // status stage of a host-to-device request
                    if let Some(addr) = self.pending_address.take() {
                        self.address = addr;
                    }
                    if let Some(value) = self.pending_configuration.take() {
                        self.configuration = Some(value);
                    }
                    Outcome::Ack { len: 0 }
                } else {
                    let n = self.reply.len().min(8);
                    self.fifo = Vec::from_slice(&self.reply[..n]).unwrap();
                    self.reply = Vec::from_slice(&self.reply[n..]).unwrap();
                    Outcome::Ack { len: n as u16 }
                }
            }
            Token::Out => {
                if self.stall_pending {
                    self.stall_pending = false;
                    return Outcome::Stall;
                }
                Outcome::Ack { len: self.loaded.len() as u16 }
            }
        }
    }

    fn load_fifo(&mut self, data: &[u8]) {
        self.loaded = Vec::from_slice(data).unwrap();
    }

    fn read_fifo(&mut self, buf: &mut [u8]) -> u16 {
        let n = buf.len().min(self.fifo.len());
        buf[..n].copy_from_slice(&self.fifo[..n]);
        n as u16
    }

    fn now(&self) -> Instant {
        Instant::from_ticks(self.now_ms)
    }
}
