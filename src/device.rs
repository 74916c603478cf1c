use crate::descriptor::EndpointDescriptor;
use crate::types::Toggle;
use crate::Error;
use defmt::Format;
use heapless::Vec;

/// Number of address slots. Slot 0 is the default address used during
/// enumeration, slot 1 holds the enumerated device.
pub const MAX_DEVICES: usize = 2;

/// Endpoint entries per device, endpoint 0 included.
pub const MAX_ENDPOINTS: usize = 8;

/// State tracked for one endpoint of an attached device.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Format)]
pub struct Endpoint {
    /// Endpoint address: 7-bit endpoint number, bit 7 is the direction (IN set).
    pub address: u8,
    /// Transfer-type attributes, as in the endpoint descriptor.
    pub attributes: u8,
    /// Maximum packet size this endpoint sends or receives.
    pub max_packet_size: u16,
    /// Polling interval in frames.
    pub interval: u8,
    /// DATA0/DATA1 state for host-to-device transactions.
    pub snd_toggle: Toggle,
    /// DATA0/DATA1 state for device-to-host transactions.
    pub rcv_toggle: Toggle,
}

impl Endpoint {
    /// Default control endpoint entry. Toggles start uninitialized; the first
    /// transfer forces them to DATA0.
    pub fn control(max_packet_size: u16) -> Self {
        Self {
            address: 0,
            attributes: 0,
            max_packet_size,
            interval: 0,
            snd_toggle: Toggle::Uninitialized,
            rcv_toggle: Toggle::Uninitialized,
        }
    }

    /// Entry for an endpoint taken from a configuration bundle.
    /// Reconfiguring an endpoint resets both toggles to DATA0.
    pub fn from_descriptor(descriptor: &EndpointDescriptor) -> Self {
        Self {
            address: descriptor.address.into(),
            attributes: descriptor.attributes.into(),
            max_packet_size: descriptor.max_packet_size,
            interval: descriptor.interval,
            snd_toggle: Toggle::Data0,
            rcv_toggle: Toggle::Data0,
        }
    }

    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }
}

/// One attached device: its class byte and the endpoints it exposes.
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    pub class: u8,
    endpoints: Vec<Endpoint, MAX_ENDPOINTS>,
}

impl DeviceRecord {
    pub fn new(class: u8) -> Self {
        Self { class, endpoints: Vec::new() }
    }

    pub fn push_endpoint(&mut self, endpoint: Endpoint) -> Result<(), Error> {
        self.endpoints.push(endpoint).map_err(|_| Error::TableFull)
    }

    pub fn endpoint(&self, number: u8) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.number() == number)
    }

    pub fn endpoint_mut(&mut self, number: u8) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|ep| ep.number() == number)
    }
}

/// Fixed-capacity registry mapping (address, endpoint) to endpoint state.
///
/// Written by the enumeration process as devices attach and detach, read and
/// mutated by the transfer engines to resolve packet sizes and toggles.
#[derive(Default)]
pub struct DeviceTable {
    slots: [Option<DeviceRecord>; MAX_DEVICES],
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record bound to `addr`. Fails with a resource-exhaustion
    /// error when `addr` is outside the fixed capacity.
    pub fn bind(&mut self, addr: u8, record: DeviceRecord) -> Result<(), Error> {
        let slot = self.slots.get_mut(addr as usize).ok_or(Error::TableFull)?;
        *slot = Some(record);
        Ok(())
    }

    pub fn release(&mut self, addr: u8) {
        if let Some(slot) = self.slots.get_mut(addr as usize) {
            *slot = None;
        }
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    pub fn device(&self, addr: u8) -> Result<&DeviceRecord, Error> {
        self.slots
            .get(addr as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(Error::NoDevice)
    }

    pub fn endpoint(&self, addr: u8, ep: u8) -> Result<&Endpoint, Error> {
        self.device(addr)?.endpoint(ep).ok_or(Error::NoEndpoint)
    }

    pub fn endpoint_mut(&mut self, addr: u8, ep: u8) -> Result<&mut Endpoint, Error> {
        self.slots
            .get_mut(addr as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(Error::NoDevice)?
            .endpoint_mut(ep)
            .ok_or(Error::NoEndpoint)
    }
}
