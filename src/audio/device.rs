//! Audio output device enumeration
//!
//! The virtual microphone is an output device from this host's point of view:
//! the relay plays into it, and the conferencing application records from
//! its paired input (for example "CABLE Input" / "CABLE Output").

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// Audio output device information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioOutputDevice {
    /// Synthetic identifier, stable for a given enumeration order and name
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Default sample rate in Hz
    pub sample_rate: u32,
    /// Maximum output channels of the default config
    pub channels: u16,
    /// Whether this is the system default output device
    pub is_default: bool,
}

fn synthetic_id(index: usize, name: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    format!("audio_out_{}_{:08x}", index, hasher.finish() & 0xFFFF_FFFF)
}

/// List all audio output devices
///
/// Returns devices in deterministic order (default device first, then alphabetically).
pub fn list_output_devices() -> Result<Vec<AudioOutputDevice>, RelayError> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices: Vec<AudioOutputDevice> = host
        .output_devices()
        .map_err(|e| RelayError::DeviceError(format!("Failed to enumerate output devices: {}", e)))?
        .enumerate()
        .filter_map(|(index, device)| {
            let name = device.name().ok()?;
            let config = device.default_output_config().ok()?;
            Some(AudioOutputDevice {
                id: synthetic_id(index, &name),
                is_default: default_name.as_ref() == Some(&name),
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
                name,
            })
        })
        .collect();

    sort_devices(&mut devices);
    Ok(devices)
}

fn sort_devices(devices: &mut [AudioOutputDevice]) {
    devices.sort_by(|a, b| match (a.is_default, b.is_default) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
}

/// Index of the first device whose name contains `hint`, ignoring case
pub fn match_device_hint(names: &[String], hint: &str) -> Option<usize> {
    if hint.is_empty() {
        return None;
    }
    let hint = hint.to_lowercase();
    names
        .iter()
        .position(|name| name.to_lowercase().contains(&hint))
}

/// Resolve the cpal output device for `hint`, falling back to the default output.
///
/// Returns the device and whether the hint matched.
pub(crate) fn resolve_output_device(hint: &str) -> Result<(cpal::Device, bool), RelayError> {
    let host = cpal::default_host();

    if !hint.is_empty() {
        let devices: Vec<cpal::Device> = host
            .output_devices()
            .map_err(|e| {
                RelayError::DeviceError(format!("Failed to enumerate output devices: {}", e))
            })?
            .collect();
        let names: Vec<String> = devices
            .iter()
            .map(|d| d.name().unwrap_or_default())
            .collect();
        if let Some(index) = match_device_hint(&names, hint) {
            log::info!("Found audio output '{}' (index {})", names[index], index);
            if let Some(device) = devices.into_iter().nth(index) {
                return Ok((device, true));
            }
        }
        log::warn!(
            "No audio output matching '{}', falling back to the default output; \
             conferencing apps will not hear the headset microphone",
            hint
        );
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| RelayError::DeviceError("No default audio output device".to_string()))?;
    Ok((device, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, is_default: bool) -> AudioOutputDevice {
        AudioOutputDevice {
            id: synthetic_id(0, name),
            name: name.to_string(),
            sample_rate: 48000,
            channels: 2,
            is_default,
        }
    }

    #[test]
    fn test_list_output_devices_no_panic() {
        let _ = list_output_devices();
    }

    #[test]
    fn test_default_device_sorted_first() {
        let mut devices = vec![
            device("Speakers", false),
            device("CABLE Input (VB-Audio Virtual Cable)", false),
            device("Headphones", true),
        ];
        sort_devices(&mut devices);
        assert_eq!(devices[0].name, "Headphones");
        assert_eq!(devices[1].name, "CABLE Input (VB-Audio Virtual Cable)");
        assert_eq!(devices[2].name, "Speakers");
    }

    #[test]
    fn test_match_device_hint() {
        let names = vec![
            "Speakers (Realtek)".to_string(),
            "CABLE Input (VB-Audio Virtual Cable)".to_string(),
        ];
        assert_eq!(match_device_hint(&names, "CABLE Input"), Some(1));
        assert_eq!(match_device_hint(&names, "Loopback"), None);
        assert_eq!(match_device_hint(&names, ""), None);
    }

    #[test]
    fn test_match_device_hint_ignores_case() {
        let names = vec![
            "Speakers (Realtek)".to_string(),
            "CABLE Input (VB-Audio Virtual Cable)".to_string(),
        ];
        assert_eq!(match_device_hint(&names, "cable input"), Some(1));
        assert_eq!(match_device_hint(&names, "SPEAKERS"), Some(0));
    }

    #[test]
    fn test_synthetic_id_is_stable() {
        assert_eq!(synthetic_id(3, "CABLE Input"), synthetic_id(3, "CABLE Input"));
        assert_ne!(synthetic_id(3, "CABLE Input"), synthetic_id(4, "CABLE Input"));
    }
}
