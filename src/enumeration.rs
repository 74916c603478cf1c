use crate::bus::SieBus;
use crate::descriptor::{parse, TYPE_CONFIGURATION, TYPE_ENDPOINT};
use crate::device::{DeviceRecord, Endpoint};
use crate::types::{Duration, Instant, Toggle};
use crate::{Error, UsbHost};
use defmt::{trace, warn, Format};

/// Settle delay after attach, before the bus is reset.
const SETTLE_DELAY: Duration = Duration::millis(200);

/// Address assigned to the enumerated device.
const ENUMERATED_ADDRESS: u8 = 1;

/// Largest configuration bundle the enumeration process will walk.
/// Descriptors beyond this are ignored.
const CONFIG_BUFFER_SIZE: usize = 256;

/// Current state of the enumeration state machine.
///
/// Advanced by [`UsbHost::poll`], one transition per call. The cycle under
/// normal operation runs `Initialize` → … → `Running` and back to
/// `Initialize` on detach.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum TaskState {
    /// Data structures are reset before waiting for a device.
    Initialize,
    /// Polling for an attach signal.
    WaitForDevice,
    /// Device attached; waiting for its power to stabilize.
    Settle { until: Instant },
    /// Issue a bus reset.
    ResetDevice,
    /// Waiting for the reset completion signal.
    WaitResetComplete,
    /// Waiting for the first valid start-of-frame after reset.
    WaitSof,
    /// Reading the first 8 bytes of the device descriptor at address 0 to
    /// learn the endpoint-zero packet size.
    GetDescriptorSize,
    /// Assigning a nonzero address.
    Addressing,
    /// Fetching the configuration bundle, populating the endpoint table and
    /// selecting the configuration.
    Configuring,
    /// Device is operational.
    Running,
    /// Enumeration failed. Left only by detach or explicit reinitialization.
    Error(Error),
}

impl Format for TaskState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            TaskState::Initialize => defmt::write!(fmt, "Detached/Initialize"),
            TaskState::WaitForDevice => defmt::write!(fmt, "Detached/WaitForDevice"),
            TaskState::Settle { .. } => defmt::write!(fmt, "Attached/Settle"),
            TaskState::ResetDevice => defmt::write!(fmt, "Attached/ResetDevice"),
            TaskState::WaitResetComplete => defmt::write!(fmt, "Attached/WaitResetComplete"),
            TaskState::WaitSof => defmt::write!(fmt, "Attached/WaitSof"),
            TaskState::GetDescriptorSize => defmt::write!(fmt, "Attached/GetDescriptorSize"),
            TaskState::Addressing => defmt::write!(fmt, "Addressing"),
            TaskState::Configuring => defmt::write!(fmt, "Configuring"),
            TaskState::Running => defmt::write!(fmt, "Running"),
            TaskState::Error(error) => defmt::write!(fmt, "Error({})", error),
        }
    }
}

fn fail(error: Error) -> TaskState {
    warn!("enumeration failed: {}", error);
    TaskState::Error(error)
}

/// Advance the state machine by at most one transition.
pub(crate) fn process_enumeration<B: SieBus>(state: TaskState, host: &mut UsbHost<B>) -> TaskState {
    match state {
        TaskState::Initialize => {
            host.devices.clear();
            let mut record = DeviceRecord::new(0);
            // slot 0 and a single entry always fit in the fixed tables
            record.push_endpoint(Endpoint::control(8)).ok();
            host.devices.bind(0, record).ok();
            trace!("-> WaitForDevice");
            TaskState::WaitForDevice
        }

        TaskState::WaitForDevice => {
            if host.bus.device_attached() {
                let until = host.bus.now() + SETTLE_DELAY;
                trace!("-> Settle");
                TaskState::Settle { until }
            } else {
                state
            }
        }

        TaskState::Settle { until } => {
            if host.bus.now() >= until {
                trace!("-> ResetDevice");
                TaskState::ResetDevice
            } else {
                state
            }
        }

        TaskState::ResetDevice => {
            host.bus.bus_reset();
            trace!("-> WaitResetComplete");
            TaskState::WaitResetComplete
        }

        TaskState::WaitResetComplete => {
            if host.bus.reset_complete() {
                trace!("-> WaitSof");
                TaskState::WaitSof
            } else {
                state
            }
        }

        TaskState::WaitSof => {
            if host.bus.frame_started() {
                trace!("-> GetDescriptorSize");
                TaskState::GetDescriptorSize
            } else {
                state
            }
        }

        TaskState::GetDescriptorSize => {
            let mut prefix = [0u8; 8];
            if let Err(error) = host.get_device_descriptor(0, &mut prefix) {
                return fail(error);
            }
            match parse::device_descriptor_packet_size(&prefix) {
                Ok((_, max_packet_size)) => {
                    if let Ok(ep0) = host.devices.endpoint_mut(0, 0) {
                        ep0.max_packet_size = max_packet_size as u16;
                    }
                    trace!("endpoint zero max packet size: {}", max_packet_size);
                    trace!("-> Addressing");
                    TaskState::Addressing
                }
                Err(_) => fail(Error::InvalidDescriptor),
            }
        }

        TaskState::Addressing => {
            if let Err(error) = host.set_address(0, ENUMERATED_ADDRESS) {
                return fail(error);
            }
            // move the endpoint-zero entry to the assigned address
            let mut ep0 = match host.devices.endpoint(0, 0) {
                Ok(ep0) => *ep0,
                Err(error) => return fail(error),
            };
            ep0.snd_toggle = Toggle::Data0;
            ep0.rcv_toggle = Toggle::Data0;
            let mut record = DeviceRecord::new(0);
            record.push_endpoint(ep0).ok();
            if let Err(error) = host.devices.bind(ENUMERATED_ADDRESS, record) {
                return fail(error);
            }
            trace!("-> Configuring");
            TaskState::Configuring
        }

        TaskState::Configuring => match configure_device(host, ENUMERATED_ADDRESS) {
            Ok(()) => {
                trace!("-> Running");
                TaskState::Running
            }
            Err(error) => fail(error),
        },

        TaskState::Running | TaskState::Error(_) => state,
    }
}

/// Fetch the device and configuration descriptors of the device at `addr`,
/// populate its endpoint table and select its first configuration.
fn configure_device<B: SieBus>(host: &mut UsbHost<B>, addr: u8) -> Result<(), Error> {
    let mut device = [0u8; 18];
    host.get_device_descriptor(addr, &mut device)?;
    let (_, framed) = parse::any_descriptor(&device).map_err(|_| Error::InvalidDescriptor)?;
    let (_, device_descriptor) =
        parse::device_descriptor(framed.data).map_err(|_| Error::InvalidDescriptor)?;

    let mut header = [0u8; 9];
    host.get_configuration_descriptor(addr, 0, &mut header)?;
    let (_, framed) = parse::any_descriptor(&header).map_err(|_| Error::InvalidDescriptor)?;
    let (_, total_length) =
        parse::configuration_descriptor_length(framed.data).map_err(|_| Error::InvalidDescriptor)?;

    let mut bundle = [0u8; CONFIG_BUFFER_SIZE];
    let length = (total_length as usize).min(CONFIG_BUFFER_SIZE);
    let read = host.get_configuration_descriptor(addr, 0, &mut bundle[..length])?;

    let ep0 = *host.devices.endpoint(addr, 0)?;
    let (value, record) = parse_configuration(&bundle[..read], device_descriptor.device_class, ep0)?;
    host.devices.bind(addr, record)?;
    host.set_configuration(addr, value)
}

/// Walk a configuration bundle, collecting an endpoint entry for every
/// endpoint descriptor. Returns the configuration value to select and the
/// populated device record.
pub(crate) fn parse_configuration(
    mut data: &[u8],
    device_class: u8,
    ep0: Endpoint,
) -> Result<(u8, DeviceRecord), Error> {
    let mut record = DeviceRecord::new(device_class);
    record.push_endpoint(ep0)?;
    let mut value = 1;

    while !data.is_empty() {
        let Ok((rest, framed)) = parse::any_descriptor(data) else {
            // trailing descriptor truncated by the fixed buffer
            break;
        };
        match framed.descriptor_type {
            TYPE_CONFIGURATION => {
                let (_, configuration) = parse::configuration_descriptor(framed.data)
                    .map_err(|_| Error::InvalidDescriptor)?;
                value = configuration.value;
            }
            TYPE_ENDPOINT => {
                let (_, endpoint) = parse::endpoint_descriptor(framed.data)
                    .map_err(|_| Error::InvalidDescriptor)?;
                record.push_endpoint(Endpoint::from_descriptor(&endpoint))?;
            }
            // interface, class and vendor descriptors carry no per-endpoint state
            _ => {}
        }
        data = rest;
    }

    Ok((value, record))
}
