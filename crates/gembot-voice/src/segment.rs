//! Splits a stream of 20 ms voice frames into utterances at pauses.

use std::time::Duration;

use crate::types::Utterance;

/// Discord voice runs at 48 kHz with 20 ms frames.
pub const SAMPLE_RATE: u32 = 48_000;
pub const FRAME: Duration = Duration::from_millis(20);

/// Utterances shorter than this are treated as noise and dropped.
const MIN_UTTERANCE: Duration = Duration::from_millis(300);

pub struct UtteranceSegmenter {
    buffer: Vec<i16>,
    silent_frames: u32,
    frames_to_close: u32,
    min_samples: usize,
}

impl UtteranceSegmenter {
    pub fn new(silence: Duration) -> Self {
        let frames = (silence.as_millis() / FRAME.as_millis()).max(1) as u32;
        Self {
            buffer: Vec::new(),
            silent_frames: 0,
            frames_to_close: frames,
            min_samples: (SAMPLE_RATE as u128 * MIN_UTTERANCE.as_millis() / 1000) as usize,
        }
    }

    /// Feed one frame of mono audio, or `None` when nobody spoke in this frame.
    /// Returns an utterance once enough trailing silence has accumulated.
    pub fn push(&mut self, frame: Option<&[i16]>) -> Option<Utterance> {
        match frame {
            Some(samples) if !samples.is_empty() => {
                self.buffer.extend_from_slice(samples);
                self.silent_frames = 0;
                None
            }
            _ if self.buffer.is_empty() => None,
            _ => {
                self.silent_frames += 1;
                if self.silent_frames < self.frames_to_close {
                    return None;
                }
                self.silent_frames = 0;
                let samples = std::mem::take(&mut self.buffer);
                (samples.len() >= self.min_samples).then_some(Utterance {
                    samples,
                    sample_rate: SAMPLE_RATE,
                })
            }
        }
    }
}

/// Average interleaved stereo down to mono.
pub fn downmix_stereo(interleaved: &[i16]) -> Vec<i16> {
    interleaved
        .chunks_exact(2)
        .map(|lr| ((lr[0] as i32 + lr[1] as i32) / 2) as i16)
        .collect()
}

/// Sum several speakers' mono frames into one, clamping on overflow.
pub fn mix(frames: &[Vec<i16>]) -> Vec<i16> {
    let len = frames.iter().map(Vec::len).max().unwrap_or(0);
    (0..len)
        .map(|i| {
            let sum: i32 = frames.iter().filter_map(|f| f.get(i)).map(|s| *s as i32).sum();
            sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect()
}
