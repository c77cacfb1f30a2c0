//! Metronome clicks
//!
//! Two short decaying sine clicks (beat and bar) synthesized once at startup.
//! The sequencer triggers them at a frame offset inside the block; a click
//! longer than the remaining block continues into the next one.

use crate::types::{Sample, StereoBuffer, StereoSample};

const CLICK_SECONDS: f32 = 0.03;
const BEAT_FREQ: f32 = 1000.0;
const BAR_FREQ: f32 = 1500.0;
const BEAT_GAIN: Sample = 0.4;
const BAR_GAIN: Sample = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Click {
    Beat,
    Bar,
}

pub struct Metronome {
    beat: Vec<Sample>,
    bar: Vec<Sample>,
    current: Option<Click>,
    tracker: usize,
    offset: usize,
}

impl Metronome {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            beat: synth_click(sample_rate, BEAT_FREQ, BEAT_GAIN),
            bar: synth_click(sample_rate, BAR_FREQ, BAR_GAIN),
            current: None,
            tracker: 0,
            offset: 0,
        }
    }

    /// Start a click at `offset` frames into the current block
    pub fn trigger(&mut self, click: Click, offset: usize) {
        self.current = Some(click);
        self.tracker = 0;
        self.offset = offset;
    }

    pub fn is_clicking(&self) -> bool {
        self.current.is_some()
    }

    /// Sum the active click into `out`
    pub fn render(&mut self, out: &mut StereoBuffer) {
        let Some(click) = self.current else {
            return;
        };
        let data = match click {
            Click::Beat => &self.beat,
            Click::Bar => &self.bar,
        };
        for i in self.offset..out.len() {
            if self.tracker >= data.len() {
                self.current = None;
                break;
            }
            out[i] += StereoSample::mono(data[self.tracker]);
            self.tracker += 1;
        }
        self.offset = 0;
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.tracker = 0;
        self.offset = 0;
    }
}

fn synth_click(sample_rate: u32, freq: f32, gain: Sample) -> Vec<Sample> {
    let sr = sample_rate.max(1) as f32;
    let len = (sr * CLICK_SECONDS) as usize;
    let decay = 5.0 / len.max(1) as f32;
    (0..len)
        .map(|i| {
            let phase = std::f32::consts::TAU * freq * i as f32 / sr;
            phase.sin() * gain * (-(i as f32) * decay).exp()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_starts_at_offset() {
        let mut metronome = Metronome::new(48000);
        let mut out = StereoBuffer::silence(256);

        metronome.trigger(Click::Bar, 100);
        metronome.render(&mut out);

        assert!(out.as_slice()[..100].iter().all(|s| *s == StereoSample::silence()));
        assert!(out.as_slice()[101..].iter().any(|s| s.peak() > 0.0));
    }

    #[test]
    fn test_click_spans_blocks_then_ends() {
        let mut metronome = Metronome::new(48000);
        let mut out = StereoBuffer::silence(512);

        metronome.trigger(Click::Beat, 0);
        metronome.render(&mut out);
        assert!(metronome.is_clicking());

        // 30ms at 48kHz = 1440 frames, done within 3 blocks
        for _ in 0..3 {
            out.fill_silence();
            metronome.render(&mut out);
        }
        assert!(!metronome.is_clicking());
    }
}
