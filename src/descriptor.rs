//! Wire-format descriptor types
//!
//! Descriptors share a common framing: the first two bytes carry the
//! descriptor **length** and **type**. [`parse::any_descriptor`] splits off
//! that framing; the remaining `data` is interpreted by the type-specific
//! parsers below, according to [`Descriptor::descriptor_type`].
//!
//! Multi-byte fields are little-endian on the wire.

use crate::types::{Bcd16, TransferType};
use usb_device::UsbDirection;
use defmt::Format;

/// [`descriptor_type`](Descriptor::descriptor_type) of a [`DeviceDescriptor`]
pub const TYPE_DEVICE: u8 = 1;
/// [`descriptor_type`](Descriptor::descriptor_type) of a [`ConfigurationDescriptor`]
pub const TYPE_CONFIGURATION: u8 = 2;
/// [`descriptor_type`](Descriptor::descriptor_type) of a string descriptor
pub const TYPE_STRING: u8 = 3;
/// [`descriptor_type`](Descriptor::descriptor_type) of an [`InterfaceDescriptor`]
pub const TYPE_INTERFACE: u8 = 4;
/// [`descriptor_type`](Descriptor::descriptor_type) of an [`EndpointDescriptor`]
pub const TYPE_ENDPOINT: u8 = 5;

/// Outer framing of a descriptor
pub struct Descriptor<'a> {
    /// Total length, including the length and type bytes themselves.
    pub length: u8,
    /// One of the `TYPE_*` constants, or a class/vendor specific value.
    pub descriptor_type: u8,
    /// Remaining data. Usually `length - 2` bytes, unless truncated by a
    /// short read.
    pub data: &'a [u8],
}

/// General information that applies to a device and all of its
/// configurations. A device has exactly one of these.
#[derive(Format)]
pub struct DeviceDescriptor {
    /// USB specification release number, binary-coded decimal.
    pub usb_release: Bcd16,
    /// Class code. 0 defers to per-interface classes, 0xFF is vendor specific.
    pub device_class: u8,
    /// Subclass code, qualified by `device_class`.
    pub device_sub_class: u8,
    /// Protocol code, qualified by class and subclass.
    pub device_protocol: u8,
    /// Maximum packet size for endpoint zero. Only 8, 16, 32 or 64 are valid.
    pub max_packet_size: u8,
    /// Vendor ID, assigned by the USB-IF.
    pub id_vendor: u16,
    /// Product ID, assigned by the manufacturer.
    pub id_product: u16,
    /// Device release number, binary-coded decimal.
    pub device_release: Bcd16,
    /// String index for the manufacturer name.
    pub manufacturer_index: u8,
    /// String index for the product name.
    pub product_index: u8,
    /// String index for the serial number.
    pub serial_number_index: u8,
    /// Number of possible configurations.
    pub num_configurations: u8,
}

/// Describes one device configuration. Fetching it with GET_DESCRIPTOR also
/// returns all nested interface, endpoint and class-specific descriptors.
#[derive(Format)]
pub struct ConfigurationDescriptor {
    /// Combined length of every descriptor returned for this configuration.
    pub total_length: u16,
    /// Number of interfaces in this configuration.
    pub num_interfaces: u8,
    /// Value passed to SET_CONFIGURATION to select this configuration.
    pub value: u8,
    /// String index for this configuration.
    pub index: u8,
    /// Configuration characteristics.
    pub attributes: u8,
    /// Maximum bus power draw, in 2 mA units.
    pub max_power: u8,
}

/// Describes one interface within a configuration.
#[derive(Format)]
pub struct InterfaceDescriptor {
    /// Zero-based interface number.
    pub interface_number: u8,
    /// Alternate setting for this interface.
    pub alternate_setting: u8,
    /// Endpoints used by this interface, excluding endpoint zero.
    pub num_endpoints: u8,
    /// Class code. 0xFF is vendor specific.
    pub interface_class: u8,
    /// Subclass code, qualified by `interface_class`.
    pub interface_sub_class: u8,
    /// Protocol code, qualified by class and subclass.
    pub interface_protocol: u8,
    /// String index for this interface.
    pub interface_index: u8,
}

/// Describes one endpoint of an interface.
#[derive(Format)]
pub struct EndpointDescriptor {
    /// Endpoint address on the device.
    pub address: EndpointAddress,
    /// Transfer-type attributes for the configured endpoint.
    pub attributes: EndpointAttributes,
    /// Maximum packet size the endpoint sends or receives.
    pub max_packet_size: u16,
    /// Polling interval, in frames.
    pub interval: u8,
}

/// Address of an endpoint: 4-bit number plus direction bit.
#[derive(Clone, Copy, Format)]
pub struct EndpointAddress(u8);

impl EndpointAddress {
    /// Endpoint number, 1 to 15 (0 is the default control endpoint).
    pub fn number(&self) -> u8 {
        self.0 & 0x0F
    }

    pub fn direction(&self) -> UsbDirection {
        self.0.into()
    }
}

impl From<EndpointAddress> for u8 {
    fn from(value: EndpointAddress) -> Self {
        value.0
    }
}

/// Attributes of an endpoint.
#[derive(Clone, Copy, Format)]
pub struct EndpointAttributes(u8);

impl EndpointAttributes {
    pub fn transfer_type(&self) -> TransferType {
        unsafe { core::mem::transmute(self.0 & 0b11) }
    }
}

impl From<EndpointAttributes> for u8 {
    fn from(value: EndpointAttributes) -> Self {
        value.0
    }
}

pub mod parse {
    use nom::IResult;
    use nom::combinator::{map, verify};
    use nom::sequence::tuple;
    use nom::bytes::streaming::take;
    use nom::number::streaming::{u8, le_u16};

    use super::*;

    /// Parse the outer framing of a descriptor.
    ///
    /// The resulting `data` can then be handed to one of the type-specific
    /// parsers below, depending on the `descriptor_type`.
    pub fn any_descriptor(input: &[u8]) -> IResult<&[u8], Descriptor<'_>> {
        let (input, (length, descriptor_type)) = tuple((verify(u8, |l| *l >= 2), u8))(input)?;
        let (input, data) = take((length - 2) as usize)(input)?;
        Ok((input, Descriptor { length, descriptor_type, data }))
    }

    /// Parse descriptor data for a device
    pub fn device_descriptor(input: &[u8]) -> IResult<&[u8], DeviceDescriptor> {
        map(
            tuple((bcd_16, u8, u8, u8, u8, le_u16, le_u16, bcd_16, u8, u8, u8, u8)),
            |(usb_release, device_class, device_sub_class, device_protocol, max_packet_size,
              id_vendor, id_product, device_release, manufacturer_index, product_index,
              serial_number_index, num_configurations)| {
                DeviceDescriptor {
                    usb_release, device_class, device_sub_class, device_protocol, max_packet_size,
                    id_vendor, id_product, device_release, manufacturer_index, product_index,
                    serial_number_index, num_configurations,
                }
            }
        )(input)
    }

    /// Parse only `bMaxPacketSize0` from the first 8 bytes of a device
    /// descriptor, framing included.
    ///
    /// Enumeration requests this prefix at the default address before the
    /// endpoint-zero packet size is known.
    pub fn device_descriptor_packet_size(input: &[u8]) -> IResult<&[u8], u8> {
        map(
            tuple((u8, u8, le_u16, u8, u8, u8, u8)),
            |(_, _, _, _, _, _, max_packet_size)| max_packet_size,
        )(input)
    }

    /// Parse descriptor data for a configuration
    pub fn configuration_descriptor(input: &[u8]) -> IResult<&[u8], ConfigurationDescriptor> {
        map(
            tuple((le_u16, u8, u8, u8, u8, u8)),
            |(total_length, num_interfaces, value, index, attributes, max_power)| {
                ConfigurationDescriptor {
                    total_length, num_interfaces, value, index, attributes, max_power,
                }
            }
        )(input)
    }

    /// Parse only the `wTotalLength` from a (partial) configuration descriptor
    pub fn configuration_descriptor_length(input: &[u8]) -> IResult<&[u8], u16> {
        le_u16(input)
    }

    /// Parse descriptor data for an interface
    pub fn interface_descriptor(input: &[u8]) -> IResult<&[u8], InterfaceDescriptor> {
        map(
            tuple((u8, u8, u8, u8, u8, u8, u8)),
            |(interface_number, alternate_setting, num_endpoints, interface_class, interface_sub_class,
              interface_protocol, interface_index)| {
                InterfaceDescriptor {
                    interface_number, alternate_setting, num_endpoints, interface_class, interface_sub_class,
                    interface_protocol, interface_index,
                }
            }
        )(input)
    }

    /// Parse descriptor data for an endpoint
    pub fn endpoint_descriptor(input: &[u8]) -> IResult<&[u8], EndpointDescriptor> {
        map(
            tuple((u8, u8, le_u16, u8)),
            |(address, attributes, max_packet_size, interval)| {
                EndpointDescriptor {
                    address: EndpointAddress(address),
                    attributes: EndpointAttributes(attributes),
                    max_packet_size,
                    interval,
                }
            }
        )(input)
    }

    /// Parses a 16-bit binary coded decimal value
    pub fn bcd_16(input: &[u8]) -> IResult<&[u8], Bcd16> {
        map(verify(le_u16, |value| Bcd16::is_valid(*value)), Bcd16)(input)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_any_descriptor() {
            let data = [8, 7, 6, 5, 4, 3, 2, 1, 0];
            let (rest, desc) = any_descriptor(&data).unwrap();
            assert_eq!(desc.length, 8);
            assert_eq!(desc.descriptor_type, 7);
            assert_eq!(desc.data, &[6, 5, 4, 3, 2, 1]);
            assert_eq!(rest, &[0]);
        }

        #[test]
        fn test_any_descriptor_rejects_runt_length() {
            assert!(any_descriptor(&[1, 5, 0]).is_err());
        }

        #[test]
        fn test_device_descriptor() {
            let data = [
                0x10, 0x02, // bcdUSB 2.10
                0x00, 0x00, 0x00, // class, subclass, protocol
                0x40, // max packet size 64
                0xFE, 0xCA, // idVendor
                0x0D, 0xF0, // idProduct
                0x00, 0x01, // bcdDevice 1.00
                1, 2, 3, // string indices
                1, // num configurations
            ];
            let (_, desc) = device_descriptor(&data).unwrap();
            assert_eq!(desc.max_packet_size, 64);
            assert_eq!(desc.id_vendor, 0xCAFE);
            assert_eq!(desc.id_product, 0xF00D);
            assert_eq!(desc.num_configurations, 1);
        }

        #[test]
        fn test_device_descriptor_packet_size_from_prefix() {
            let prefix = [18, TYPE_DEVICE, 0x00, 0x02, 0x00, 0x00, 0x00, 8];
            let (_, mps) = device_descriptor_packet_size(&prefix).unwrap();
            assert_eq!(mps, 8);
        }

        #[test]
        fn test_configuration_descriptor() {
            let data = [0x22, 0x00, 1, 1, 0, 0xA0, 50];
            let (_, desc) = configuration_descriptor(&data).unwrap();
            assert_eq!(desc.total_length, 0x22);
            assert_eq!(desc.num_interfaces, 1);
            assert_eq!(desc.value, 1);
            assert_eq!(desc.max_power, 50);
        }

        #[test]
        fn test_endpoint_descriptor() {
            let data = [0x81, 0x03, 0x40, 0x00, 0x0A];
            let (_, desc) = endpoint_descriptor(&data).unwrap();
            assert_eq!(desc.address.number(), 1);
            assert_eq!(desc.address.direction(), usb_device::UsbDirection::In);
            assert_eq!(desc.attributes.transfer_type(), crate::types::TransferType::Interrupt);
            assert_eq!(desc.max_packet_size, 64);
            assert_eq!(desc.interval, 10);
        }

        #[test]
        fn test_bcd_16() {
            let (_, Bcd16(bcd)) = bcd_16(&[0x10, 0x02]).unwrap();
            assert_eq!(bcd, 0x0210);
            assert!(bcd_16(&[0x00, 0x0A]).is_err());
        }
    }
}
