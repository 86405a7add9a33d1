//! Test tone generation and PCM encoding for the negotiated write path.

use std::f32::consts::TAU;

use audio_track_types::Encoding;

/// Sine generator producing interleaved frames with the same value on every channel.
pub struct Tone {
    phase: f32,
    step: f32,
    amplitude: f32,
    channels: usize,
}

impl Tone {
    pub fn new(frequency: f32, sample_rate: u32, amplitude: f32, channels: usize) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / sample_rate.max(1) as f32,
            amplitude: amplitude.clamp(0.0, 1.0),
            channels: channels.max(1),
        }
    }

    /// Next `frames` frames as interleaved `f32` samples.
    pub fn fill(&mut self, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * self.channels);
        for _ in 0..frames {
            let v = self.amplitude * self.phase.sin();
            out.extend(std::iter::repeat_n(v, self.channels));
            self.phase = (self.phase + self.step) % TAU;
        }
        out
    }
}

pub fn to_shorts(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Little-endian PCM bytes for the byte-buffer path. 8-bit PCM is unsigned.
pub fn to_bytes(encoding: Encoding, samples: &[f32]) -> Vec<u8> {
    match encoding {
        Encoding::Pcm8Bit => samples
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * 127.0 + 128.0) as u8)
            .collect(),
        Encoding::Pcm16Bit => to_shorts(samples)
            .into_iter()
            .flat_map(i16::to_le_bytes)
            .collect(),
        Encoding::PcmFloat => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
    }
}
