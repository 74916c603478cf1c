//! HID class requests
//!
//! Fixed parameterizations of [`UsbHost::control_request`] per the HID 1.11
//! class specification, plus the HID class descriptor wire format. Report
//! parsing is left to the drivers layered above the engine.

use crate::bus::SieBus;
use crate::transfer::DataStage;
use crate::types::{Bcd16, SetupPacket};
use crate::{Error, UsbHost, DEFAULT_NAK_LIMIT};
use defmt::Format;
use usb_device::{UsbDirection, control::{Recipient, Request, RequestType}};

pub const GET_REPORT: u8 = 0x01;
pub const GET_IDLE: u8 = 0x02;
pub const GET_PROTOCOL: u8 = 0x03;
pub const SET_REPORT: u8 = 0x09;
pub const SET_IDLE: u8 = 0x0A;
pub const SET_PROTOCOL: u8 = 0x0B;

/// `descriptor_type` of a [`HidDescriptor`]
pub const TYPE_HID: u8 = 0x21;
/// `descriptor_type` of a HID report descriptor
pub const TYPE_REPORT: u8 = 0x22;

#[derive(Copy, Clone)]
#[repr(u8)]
pub enum ReportType {
    Input = 1,
    Output = 2,
    Feature = 3,
}

#[derive(Copy, Clone)]
#[repr(u8)]
pub enum Protocol {
    Boot = 0,
    Report = 1,
}

/// Class descriptor preceding the endpoint descriptors of a HID interface.
#[derive(Format)]
pub struct HidDescriptor {
    /// HID specification release, binary-coded decimal.
    pub hid_release: Bcd16,
    /// Country code of localized hardware, 0 if not localized.
    pub country_code: u8,
    /// Number of class descriptors that follow.
    pub num_descriptors: u8,
    /// Type of the first subordinate descriptor (normally [`TYPE_REPORT`]).
    pub descriptor_type: u8,
    /// Length of the first subordinate descriptor.
    pub descriptor_length: u16,
}

pub mod parse {
    use nom::IResult;
    use nom::combinator::map;
    use nom::sequence::tuple;
    use nom::number::streaming::{le_u16, u8};

    use super::HidDescriptor;
    use crate::descriptor::parse::bcd_16;

    /// Parse descriptor data for a HID interface
    pub fn hid_descriptor(input: &[u8]) -> IResult<&[u8], HidDescriptor> {
        map(
            tuple((bcd_16, u8, u8, u8, le_u16)),
            |(hid_release, country_code, num_descriptors, descriptor_type, descriptor_length)| {
                HidDescriptor {
                    hid_release, country_code, num_descriptors, descriptor_type, descriptor_length,
                }
            }
        )(input)
    }
}

impl<B: SieBus> UsbHost<B> {
    pub fn hid_get_report(&mut self, addr: u8, interface: u16, report_type: ReportType, report_id: u8, buf: &mut [u8]) -> Result<usize, Error> {
        let length = buf.len() as u16;
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::In,
            RequestType::Class,
            Recipient::Interface,
            GET_REPORT,
            ((report_type as u16) << 8) | report_id as u16,
            interface,
            length,
        ), DataStage::In(buf), DEFAULT_NAK_LIMIT)
    }

    pub fn hid_set_report(&mut self, addr: u8, interface: u16, report_type: ReportType, report_id: u8, report: &[u8]) -> Result<(), Error> {
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::Out,
            RequestType::Class,
            Recipient::Interface,
            SET_REPORT,
            ((report_type as u16) << 8) | report_id as u16,
            interface,
            report.len() as u16,
        ), DataStage::Out(report), DEFAULT_NAK_LIMIT)?;
        Ok(())
    }

    /// Read one byte: the idle duration for `report_id`, in 4 ms units.
    pub fn hid_get_idle(&mut self, addr: u8, interface: u16, report_id: u8, duration: &mut [u8; 1]) -> Result<(), Error> {
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::In,
            RequestType::Class,
            Recipient::Interface,
            GET_IDLE,
            report_id as u16,
            interface,
            1,
        ), DataStage::In(duration), DEFAULT_NAK_LIMIT)?;
        Ok(())
    }

    pub fn hid_set_idle(&mut self, addr: u8, interface: u16, report_id: u8, duration: u8) -> Result<(), Error> {
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::Out,
            RequestType::Class,
            Recipient::Interface,
            SET_IDLE,
            ((duration as u16) << 8) | report_id as u16,
            interface,
            0,
        ), DataStage::None, DEFAULT_NAK_LIMIT)?;
        Ok(())
    }

    pub fn hid_get_protocol(&mut self, addr: u8, interface: u16, protocol: &mut [u8; 1]) -> Result<(), Error> {
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::In,
            RequestType::Class,
            Recipient::Interface,
            GET_PROTOCOL,
            0,
            interface,
            1,
        ), DataStage::In(protocol), DEFAULT_NAK_LIMIT)?;
        Ok(())
    }

    pub fn hid_set_protocol(&mut self, addr: u8, interface: u16, protocol: Protocol) -> Result<(), Error> {
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::Out,
            RequestType::Class,
            Recipient::Interface,
            SET_PROTOCOL,
            protocol as u16,
            interface,
            0,
        ), DataStage::None, DEFAULT_NAK_LIMIT)?;
        Ok(())
    }

    /// Fetch the report descriptor of a HID interface. A standard-type
    /// request addressed to the interface, unlike the class requests above.
    pub fn hid_get_report_descriptor(&mut self, addr: u8, interface: u16, buf: &mut [u8]) -> Result<usize, Error> {
        let length = buf.len() as u16;
        self.control_request(addr, 0, SetupPacket::new(
            UsbDirection::In,
            RequestType::Standard,
            Recipient::Interface,
            Request::GET_DESCRIPTOR,
            (TYPE_REPORT as u16) << 8,
            interface,
            length,
        ), DataStage::In(buf), DEFAULT_NAK_LIMIT)
    }
}
