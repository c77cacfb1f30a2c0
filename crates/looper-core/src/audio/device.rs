//! Audio device enumeration
//!
//! Devices are listed from every available host (JACK, ALSA, PulseAudio,
//! etc.) so a specific interface can be picked even when the default host
//! only exposes a single virtual device.

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Sample rates advertised in device listings
const COMMON_SAMPLE_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Playback or capture side of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Output => f.write_str("output"),
            Direction::Input => f.write_str("input"),
        }
    }
}

/// Human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

fn host_devices(host: &Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices: Vec<cpal::Device> = match direction {
        Direction::Output => host.output_devices().ok()?.collect(),
        Direction::Input => host.input_devices().ok()?.collect(),
    };
    Some(devices)
}

fn host_default(host: &Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Output => host.default_output_device(),
        Direction::Input => host.default_input_device(),
    }
}

/// Sample rates and channel count a device supports in one direction
fn capabilities(device: &cpal::Device, direction: Direction) -> Option<(Vec<u32>, u16)> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Output => device.supported_output_configs().ok()?.collect(),
        Direction::Input => device.supported_input_configs().ok()?.collect(),
    };
    if ranges.is_empty() {
        return None;
    }

    let mut sample_rates = Vec::new();
    let mut max_channels = 0;
    for range in &ranges {
        max_channels = max_channels.max(range.channels());
        for rate in COMMON_SAMPLE_RATES {
            if rate >= range.min_sample_rate().0
                && rate <= range.max_sample_rate().0
                && !sample_rates.contains(&rate)
            {
                sample_rates.push(rate);
            }
        }
    }
    sample_rates.sort_unstable();
    Some((sample_rates, max_channels))
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    pub direction: Direction,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// All devices for `direction`, defaults first
pub fn get_devices(direction: Direction) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host_default(&host, direction).and_then(|d| d.name().ok());

        let Some(devices) = host_devices(&host, direction) else {
            log::debug!("Could not enumerate {} devices for {:?}", direction, host_id);
            continue;
        };

        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            let Some((sample_rates, max_channels)) = capabilities(&device, direction) else {
                continue;
            };
            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_label.clone(),
                direction,
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!("Enumerated {} audio {} devices", all_devices.len(), direction);
    Ok(all_devices)
}

/// Devices for settings listings; enumeration failures give an empty list
pub fn get_available_devices(direction: Direction) -> Vec<AudioDevice> {
    match get_devices(direction) {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("Failed to enumerate audio {} devices: {}", direction, e);
            Vec::new()
        }
    }
}

/// Find a device by its ID
///
/// Uses the host in the ID when given, otherwise searches every host.
pub fn find_device_by_id(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host_devices(&host, direction)
            .ok_or_else(|| AudioError::ConfigError(format!("Cannot list {} devices", direction)))?
            .into_iter()
            .find(matches)
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host_devices(&host, direction))
        .flatten()
        .find(matches)
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// The default host's default device for `direction`
pub fn get_cpal_default_device(direction: Direction) -> AudioResult<cpal::Device> {
    host_default(&cpal::default_host(), direction)
        .ok_or_else(|| AudioError::NoDefaultDevice(format!("No default {} device", direction)))
}

/// Configured device, or the default one
pub fn resolve_device(id: Option<&DeviceId>, direction: Direction) -> AudioResult<cpal::Device> {
    match id {
        Some(id) => find_device_by_id(id, direction),
        None => get_cpal_default_device(direction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // CI machines usually have no audio devices
        for direction in [Direction::Output, Direction::Input] {
            match get_devices(direction) {
                Ok(devices) => {
                    assert!(devices.iter().all(|d| d.direction == direction));
                    assert!(devices.iter().all(|d| d.id.host.is_some()));
                }
                Err(AudioError::NoDevices) => {}
                Err(e) => println!("Error enumerating {} devices: {}", direction, e),
            }
        }
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let id = DeviceId::new("no such device 7f3a");
        assert!(find_device_by_id(&id, Direction::Output).is_err());
    }
}
