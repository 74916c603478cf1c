use defmt::Format;
use usb_device::{UsbDirection, control::{Recipient, RequestType}};

/// Instants reported by [`crate::bus::SieBus::now`]. Millisecond resolution.
pub type Instant = fugit::TimerInstantU32<1000>;

/// Durations derived from [`Instant`]s.
pub type Duration = fugit::MillisDurationU32;

/// DATA0/DATA1 synchronization state of one endpoint direction.
///
/// `Uninitialized` only ever appears on endpoint 0 between allocation of the
/// table entry and the first transfer, which treats it as DATA0.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Format)]
pub enum Toggle {
    Uninitialized,
    Data0,
    Data1,
}

impl Toggle {
    /// PID bit to put on the wire for the next transaction.
    pub fn bit(self) -> bool {
        self == Toggle::Data1
    }

    /// State after one successfully acknowledged transaction.
    pub fn flip(self) -> Toggle {
        match self {
            Toggle::Data1 => Toggle::Data0,
            _ => Toggle::Data1,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum TransferType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

#[repr(u8)]
pub enum DescriptorType {
    Device = 1,
    Configuration = 2,
    String = 3,
    Interface = 4,
    Endpoint = 5,
}

#[derive(Clone, Copy, PartialEq)]
pub struct Bcd16(pub(crate) u16);

impl Bcd16 {
    /// All four nibbles must be in the 0-9 range.
    pub fn is_valid(value: u16) -> bool {
        (value & 0xF) < 0xA
            && ((value >> 4) & 0xF) < 0xA
            && ((value >> 8) & 0xF) < 0xA
            && ((value >> 12) & 0xF) < 0xA
    }
}

impl Format for Bcd16 {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt, "{}{}{}{}",
            (self.0 >> 12) & 0xF,
            (self.0 >> 8) & 0xF,
            (self.0 >> 4) & 0xF,
            self.0 & 0xF,
        )
    }
}

/// The 8-byte packet sent in the setup stage of every control transfer.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Format)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn new(direction: UsbDirection, request_type: RequestType, recipient: Recipient, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type: (recipient as u8) | ((request_type as u8) << 5) | (direction as u8),
            request,
            value,
            index,
            length,
        }
    }

    /// Transfer direction, taken from bit 7 of `bmRequestType`.
    pub fn direction(&self) -> UsbDirection {
        self.request_type.into()
    }

    /// Wire representation: transfer-order fixed, multi-byte fields little-endian.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0; 8];
        bytes[0] = self.request_type;
        bytes[1] = self.request;
        bytes[2..4].copy_from_slice(&self.value.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.index.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }
}
