//! MIDI value types shared by recorded actions, channels and sync
//!
//! Both types are `Copy` and fixed-size so they move through the lock-free
//! queues without allocating.

/// Note Off status nibble
pub const NOTE_OFF: u8 = 0x80;
/// Note On status nibble
pub const NOTE_ON: u8 = 0x90;
/// Internal "stop this sample now" status used by recorded actions
pub const NOTE_KILL: u8 = 0x70;
/// Control Change status nibble
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Max note velocity
pub const MAX_VELOCITY: u8 = 127;

/// A channel-voice MIDI event (status + two data bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MidiEvent {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiEvent {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self { status, data1, data2 }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(NOTE_ON | (channel & 0x0F), note, velocity)
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(NOTE_OFF | (channel & 0x0F), note, velocity)
    }

    pub fn note_kill() -> Self {
        Self::new(NOTE_KILL, 0, 0)
    }

    /// Parse the first three bytes of a raw message
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [status, data1, data2, ..] if status & 0x80 != 0 => {
                Some(Self::new(*status, *data1, *data2))
            }
            [status, data1] if status & 0x80 != 0 => Some(Self::new(*status, *data1, 0)),
            _ => None,
        }
    }

    /// Status without the channel nibble
    #[inline]
    pub fn kind(&self) -> u8 {
        self.status & 0xF0
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    #[inline]
    pub fn velocity(&self) -> u8 {
        self.data2
    }

    /// Same event retargeted to another MIDI channel
    #[inline]
    pub fn with_channel(&self, channel: u8) -> Self {
        Self::new(self.kind() | (channel & 0x0F), self.data1, self.data2)
    }

    /// Note On with velocity 0 counts as Note Off
    pub fn is_note_off(&self) -> bool {
        self.kind() == NOTE_OFF || (self.kind() == NOTE_ON && self.data2 == 0)
    }
}

/// Max bytes in an outbound message (MTC full-frame SysEx is 10)
pub const MIDI_MESSAGE_MAX_LEN: usize = 10;

/// An outbound MIDI message of up to [`MIDI_MESSAGE_MAX_LEN`] bytes
///
/// Produced on the audio thread (sync, channel relays, lights) and drained
/// by the MIDI output worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    bytes: [u8; MIDI_MESSAGE_MAX_LEN],
    len: u8,
}

impl MidiMessage {
    /// Build from raw bytes; anything past the max length is dropped
    pub fn from_slice(bytes: &[u8]) -> Self {
        let len = bytes.len().min(MIDI_MESSAGE_MAX_LEN);
        let mut buf = [0u8; MIDI_MESSAGE_MAX_LEN];
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { bytes: buf, len: len as u8 }
    }

    pub fn single(status: u8) -> Self {
        Self::from_slice(&[status])
    }

    pub fn from_event(event: MidiEvent) -> Self {
        Self::from_slice(&[event.status, event.data1, event.data2])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl From<MidiEvent> for MidiMessage {
    fn from(event: MidiEvent) -> Self {
        Self::from_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_channel_helpers() {
        let event = MidiEvent::note_on(5, 60, 100);
        assert_eq!(event.kind(), NOTE_ON);
        assert_eq!(event.channel(), 5);
        assert_eq!(event.with_channel(0).status, 0x90);
    }

    #[test]
    fn test_note_on_zero_velocity_is_note_off() {
        assert!(MidiEvent::note_on(0, 60, 0).is_note_off());
        assert!(!MidiEvent::note_on(0, 60, 1).is_note_off());
    }

    #[test]
    fn test_from_bytes_rejects_running_status() {
        assert!(MidiEvent::from_bytes(&[0x3C, 0x40]).is_none());
        assert_eq!(
            MidiEvent::from_bytes(&[0xC1, 0x05]),
            Some(MidiEvent::new(0xC1, 0x05, 0))
        );
    }

    #[test]
    fn test_message_truncates_long_input() {
        let msg = MidiMessage::from_slice(&[0xF0; 16]);
        assert_eq!(msg.as_bytes().len(), MIDI_MESSAGE_MAX_LEN);
        assert_eq!(MidiMessage::single(0xF8).as_bytes(), &[0xF8]);
    }
}
