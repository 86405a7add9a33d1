//! Output device discovery and stream configuration for the emulated endpoint.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - finding a device configuration that plays a track's exact sample rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Resolve the device an emulated runtime renders its endpoints on.
///
/// `needle` selects by case-insensitive name substring; without one the
/// host's default output is used.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("host has no default output for track endpoints"));
    };
    host.output_devices()
        .context("enumerate output devices for track endpoints")?
        .find(|d| {
            d.description()
                .is_ok_and(|desc| matches_device_name(&desc.name(), needle))
        })
        .ok_or_else(|| anyhow!("no output device named like {needle:?} to host track endpoints"))
}

/// Pick a device configuration able to play `sample_rate` without resampling.
///
/// Among the ranges containing the rate, prefers one with exactly `channels`
/// channels, then the float sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    sample_rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query supported output configs")?
        .collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let best = ranges
        .into_iter()
        .filter(|r| {
            supports_rate(r.min_sample_rate(), r.max_sample_rate(), sample_rate)
                && sample_format_rank(r.sample_format()) < UNSUPPORTED_RANK
        })
        .min_by_key(|r| (r.channels() != channels, sample_format_rank(r.sample_format())))
        .ok_or_else(|| anyhow!("device cannot play {sample_rate} Hz"))?;

    Ok(best.with_sample_rate(sample_rate))
}

/// Log available output devices for the current host.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>> {
    let devices = host.output_devices().context("No output devices")?;
    let mut names = Vec::new();
    for d in devices {
        let name = d.description()?.to_string();
        tracing::debug!(device = %name, "output device");
        names.push(name);
    }
    Ok(names)
}

const UNSUPPORTED_RANK: u8 = 10;

fn supports_rate(min: u32, max: u32, rate: u32) -> bool {
    rate >= min && rate <= max
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => UNSUPPORTED_RANK,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn unmatched_device_name_is_an_error() {
        let host = cpal::default_host();
        assert!(pick_device(&host, Some("no such track output 7f3a")).is_err());
    }

    #[test]
    fn supports_rate_is_inclusive() {
        assert!(supports_rate(44_100, 96_000, 44_100));
        assert!(supports_rate(44_100, 96_000, 96_000));
        assert!(!supports_rate(44_100, 96_000, 22_050));
        assert!(!supports_rate(44_100, 96_000, 192_000));
    }

    #[test]
    fn float_output_is_preferred() {
        assert!(sample_format_rank(cpal::SampleFormat::F32) < sample_format_rank(cpal::SampleFormat::I16));
        assert_eq!(sample_format_rank(cpal::SampleFormat::U8), UNSUPPORTED_RANK);
    }
}
