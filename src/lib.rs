//! Host-side USB 2.0 protocol engine for microcontrollers driving a discrete
//! SIE chip.
//!
//! The engine owns enumeration, control transfers and the device/endpoint
//! table; the SIE chip driver is plugged in through [`bus::SieBus`] and owns
//! only token dispatch and FIFO I/O.

#![no_std]

pub mod bus;
pub mod descriptor;
pub mod device;
mod enumeration;
pub mod hid;
mod transaction;
mod transfer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use device::{DeviceRecord, DeviceTable, Endpoint};
pub use enumeration::TaskState;
pub use transfer::DataStage;

use bus::SieBus;
use defmt::{debug, Format};
use types::{DescriptorType, SetupPacket};
use usb_device::{UsbDirection, control::{Recipient, Request, RequestType}};

/// NAK budget used by the request wrappers. Direct callers of
/// [`UsbHost::control_request`] supply their own budget per call;
/// 0 leaves NAKs uncounted.
pub const DEFAULT_NAK_LIMIT: u16 = 32000;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Format)]
pub enum Error {
    /// The NAK budget for a transaction was exhausted. Flow-control timeout,
    /// not a protocol violation.
    NakLimit,
    /// The endpoint rejected the request.
    Stall,
    /// Transport-level failure, surfaced after the hardware retry limit.
    Bus(bus::BusError),
    /// The wall-clock transfer timeout elapsed.
    Timeout,
    /// The fixed device table cannot hold another entry.
    TableFull,
    /// No device is bound at the given address.
    NoDevice,
    /// The device has no endpoint entry with the given number.
    NoEndpoint,
    /// A descriptor sent by the device could not be parsed.
    InvalidDescriptor,
}

/// The host engine: enumeration state machine, transfer engines and the
/// device/endpoint table, driven by a single caller.
///
/// Not reentrant: one instance is driven serially from one call site, and an
/// in-flight transfer always runs to completion, timeout or error before
/// control returns.
pub struct UsbHost<B> {
    bus: B,
    devices: DeviceTable,
    state: TaskState,
}

impl<B: SieBus> UsbHost<B> {
    pub fn new(mut bus: B) -> Self {
        bus.reset_controller();
        Self {
            bus,
            devices: DeviceTable::new(),
            state: TaskState::Initialize,
        }
    }

    /// Reset the controller and restart enumeration from scratch.
    ///
    /// The only way out of [`TaskState::Error`] while the device stays
    /// attached.
    pub fn reinitialize(&mut self) {
        self.bus.reset_controller();
        self.devices.clear();
        self.state = TaskState::Initialize;
    }

    pub fn task_state(&self) -> TaskState {
        self.state
    }

    /// Advance the enumeration state machine by at most one transition and
    /// return the resulting state.
    ///
    /// Call repeatedly from the embedding application's main loop. A detach
    /// observed in any state discards in-progress enumeration and returns to
    /// [`TaskState::Initialize`]. Individual calls may block for up to the
    /// transfer timeout while a control-transfer stage is in flight.
    pub fn poll(&mut self) -> TaskState {
        if !self.bus.device_attached() {
            match self.state {
                TaskState::Initialize | TaskState::WaitForDevice => {}
                _ => {
                    debug!("device detached");
                    self.devices.clear();
                    self.state = TaskState::Initialize;
                    return self.state;
                }
            }
        }

        self.state = enumeration::process_enumeration(self.state, self);
        self.state
    }

    /// Endpoint-table entry for `ep` of the device at `addr`.
    pub fn endpoint(&self, addr: u8, ep: u8) -> Result<&Endpoint, Error> {
        self.devices.endpoint(addr, ep)
    }

    pub fn endpoint_mut(&mut self, addr: u8, ep: u8) -> Result<&mut Endpoint, Error> {
        self.devices.endpoint_mut(addr, ep)
    }

    /// Record for the device at `addr`.
    pub fn device(&self, addr: u8) -> Result<&DeviceRecord, Error> {
        self.devices.device(addr)
    }

    /// Replace the record bound to `addr`. Used by class drivers layered
    /// above the engine to reconfigure a device's endpoints.
    pub fn bind_device(&mut self, addr: u8, record: DeviceRecord) -> Result<(), Error> {
        self.devices.bind(addr, record)
    }

    pub fn get_device_descriptor(&mut self, addr: u8, buf: &mut [u8]) -> Result<usize, Error> {
        let length = buf.len() as u16;
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::In,
            RequestType::Standard,
            Recipient::Device,
            Request::GET_DESCRIPTOR,
            (DescriptorType::Device as u16) << 8,
            0,
            length,
        ), DataStage::In(buf), DEFAULT_NAK_LIMIT)
    }

    pub fn get_configuration_descriptor(&mut self, addr: u8, configuration: u8, buf: &mut [u8]) -> Result<usize, Error> {
        let length = buf.len() as u16;
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::In,
            RequestType::Standard,
            Recipient::Device,
            Request::GET_DESCRIPTOR,
            ((DescriptorType::Configuration as u16) << 8) | configuration as u16,
            0,
            length,
        ), DataStage::In(buf), DEFAULT_NAK_LIMIT)
    }

    pub fn get_string_descriptor(&mut self, addr: u8, index: u8, langid: u16, buf: &mut [u8]) -> Result<usize, Error> {
        let length = buf.len() as u16;
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::In,
            RequestType::Standard,
            Recipient::Device,
            Request::GET_DESCRIPTOR,
            ((DescriptorType::String as u16) << 8) | index as u16,
            langid,
            length,
        ), DataStage::In(buf), DEFAULT_NAK_LIMIT)
    }

    /// Assign `new_addr` to the device currently answering at `addr`.
    ///
    /// The caller is responsible for re-binding the endpoint-zero table entry
    /// to the new address; enumeration does this as part of its addressing
    /// state.
    pub fn set_address(&mut self, addr: u8, new_addr: u8) -> Result<(), Error> {
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::Out,
            RequestType::Standard,
            Recipient::Device,
            Request::SET_ADDRESS,
            new_addr as u16,
            0,
            0,
        ), DataStage::None, DEFAULT_NAK_LIMIT)?;
        Ok(())
    }

    pub fn set_configuration(&mut self, addr: u8, value: u8) -> Result<(), Error> {
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::Out,
            RequestType::Standard,
            Recipient::Device,
            Request::SET_CONFIGURATION,
            value as u16,
            0,
            0,
        ), DataStage::None, DEFAULT_NAK_LIMIT)?;
        Ok(())
    }
}
