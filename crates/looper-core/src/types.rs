//! Common types for the looper
//!
//! This module contains the fundamental audio types used throughout the
//! engine: stereo samples and buffers, frame positions, channel identifiers
//! and the small status enums shared by the sequencer and channels.

use std::ops::{Index, IndexMut};

/// Maximum buffer size to pre-allocate for real-time safety
/// Covers all common backend configurations (64 .. 4096 frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Position on the timeline or inside a wave, in frames
///
/// Signed so deltas and "no position" sentinels stay cheap to express.
pub type Frame = i64;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// Per-side gain applied when summing a channel into a bus
///
/// Linear pan law: center (0.5) is a pass-through, otherwise
/// left = 1 - pan and right = pan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanGain {
    pub left: Sample,
    pub right: Sample,
}

impl PanGain {
    /// Unity gain on both sides
    pub const UNITY: Self = Self { left: 1.0, right: 1.0 };

    /// Compute the gain pair for a pan position in 0.0..=1.0
    pub fn from_pan(pan: f32) -> Self {
        if pan == 0.5 {
            Self::UNITY
        } else {
            Self {
                left: 1.0 - pan,
                right: pan,
            }
        }
    }
}

/// Per-side peak level of a buffer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Peak {
    pub left: Sample,
    pub right: Sample,
}

/// A buffer of stereo samples
///
/// This is the primary audio buffer type used for processing stereo audio.
/// Buffers touched by the audio thread are pre-allocated to
/// [`MAX_BUFFER_SIZE`] and only their working length changes per block.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a new buffer with the specified capacity (in stereo samples)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        let samples = interleaved
            .chunks_exact(2)
            .map(|chunk| StereoSample::new(chunk[0], chunk[1]))
            .collect();
        Self { samples }
    }

    /// Create a buffer from an existing Vec of StereoSamples
    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Truncate buffer to length without deallocating (real-time safe)
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.samples.truncate(len);
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Fills any newly exposed elements with silence. The requested length
    /// is capped at the capacity so the audio thread never reallocates.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let new_len = new_len.min(self.samples.capacity());
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    #[inline]
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Get a zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Overwrite this buffer with `other * gain`
    ///
    /// Only the overlapping range is written.
    pub fn set_from(&mut self, other: &StereoBuffer, gain: Sample) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst = *src * gain;
        }
    }

    /// Sum `other * gain` into this buffer
    pub fn sum(&mut self, other: &StereoBuffer, gain: Sample) {
        self.sum_panned(other, gain, PanGain::UNITY);
    }

    /// Sum `other` into this buffer with a gain and a per-side pan gain
    pub fn sum_panned(&mut self, other: &StereoBuffer, gain: Sample, pan: PanGain) {
        let left = gain * pan.left;
        let right = gain * pan.right;
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            dst.left += src.left * left;
            dst.right += src.right * right;
        }
    }

    /// Scale all samples by a factor
    pub fn apply_gain(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Hard-clip every sample to [-1, 1]
    pub fn limit(&mut self) {
        for sample in &mut self.samples {
            sample.left = sample.left.clamp(-1.0, 1.0);
            sample.right = sample.right.clamp(-1.0, 1.0);
        }
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }

    /// Get the peak amplitude of each side separately
    pub fn peaks(&self) -> Peak {
        self.samples.iter().fold(Peak::default(), |acc, s| Peak {
            left: acc.left.max(s.left.abs()),
            right: acc.right.max(s.right.abs()),
        })
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Channel identifier
///
/// Ids 1-3 are reserved for the internal buses; user channels start at
/// [`ChannelId::FIRST_USER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl ChannelId {
    pub const MASTER_OUT: Self = Self(1);
    pub const MASTER_IN: Self = Self(2);
    pub const PREVIEW: Self = Self(3);
    pub const FIRST_USER: Self = Self(4);

    /// Master and preview channels are internal: never armed, muted or soloed
    pub fn is_internal(&self) -> bool {
        self.0 < Self::FIRST_USER.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Play (and action-reading) status of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlayStatus {
    #[default]
    Off = 0,
    /// Armed, starts at the next boundary
    Wait = 1,
    Play = 2,
    /// Stop requested, finishes at the next boundary
    Ending = 3,
}

impl PlayStatus {
    /// Convert from the atomic representation
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayStatus::Wait,
            2 => PlayStatus::Play,
            3 => PlayStatus::Ending,
            _ => PlayStatus::Off,
        }
    }

    /// Audible states (PLAY or ENDING)
    #[inline]
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayStatus::Play | PlayStatus::Ending)
    }
}

/// Sequencer transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SeqStatus {
    #[default]
    Stopped = 0,
    /// Pre-roll before the loop point
    Waiting = 1,
    Running = 2,
}

impl SeqStatus {
    /// Convert from the atomic representation
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SeqStatus::Waiting,
            2 => SeqStatus::Running,
            _ => SeqStatus::Stopped,
        }
    }
}
