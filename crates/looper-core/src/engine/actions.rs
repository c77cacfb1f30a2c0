//! Recorded actions, keyed by the loop frame they fire on
//!
//! The map is part of the published layout: the sequencer asks it for "all
//! actions at frame F" while scanning a block, and channels read their own
//! entries when they receive an ACTIONS event. Writes happen only on the
//! control thread, on the working copy.

use std::collections::BTreeMap;

use super::midi::MidiEvent;
use crate::types::{ChannelId, Frame};

/// One recorded event for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    /// Assigned when the action is stored; 0 while in flight
    pub id: u32,
    pub channel: ChannelId,
    pub frame: Frame,
    pub event: MidiEvent,
}

impl Action {
    pub fn new(channel: ChannelId, frame: Frame, event: MidiEvent) -> Self {
        Self {
            id: 0,
            channel,
            frame,
            event,
        }
    }
}

/// All recorded actions, grouped by frame
#[derive(Debug, Clone, Default)]
pub struct ActionMap {
    frames: BTreeMap<Frame, Vec<Action>>,
}

impl ActionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions scheduled at exactly `frame` (allocation-free lookup)
    pub fn at(&self, frame: Frame) -> &[Action] {
        self.frames.get(&frame).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn has_at(&self, frame: Frame) -> bool {
        self.frames.contains_key(&frame)
    }

    /// Store an action; same-frame actions keep their arrival order
    pub fn record(&mut self, action: Action) {
        self.frames.entry(action.frame).or_default().push(action);
    }

    pub fn has_actions(&self, channel: ChannelId) -> bool {
        self.iter().any(|a| a.channel == channel)
    }

    /// Remove every action of a channel
    pub fn clear_channel(&mut self, channel: ChannelId) {
        self.frames.retain(|_, actions| {
            actions.retain(|a| a.channel != channel);
            !actions.is_empty()
        });
    }

    pub fn clear_all(&mut self) {
        self.frames.clear();
    }

    /// Duplicate a channel's actions onto another channel
    ///
    /// `next_id` hands out ids for the copies.
    pub fn clone_channel(
        &mut self,
        from: ChannelId,
        to: ChannelId,
        mut next_id: impl FnMut() -> u32,
    ) {
        let copies: Vec<Action> = self
            .iter()
            .filter(|a| a.channel == from)
            .map(|a| Action {
                id: next_id(),
                channel: to,
                ..*a
            })
            .collect();
        for action in copies {
            self.record(action);
        }
    }

    /// Stretch every action position by `ratio` after a tempo change
    ///
    /// Positions are clamped inside the new loop so nothing falls past the
    /// wrap point.
    pub fn rescale(&mut self, ratio: f64, frames_in_loop: Frame) {
        if self.frames.is_empty() || ratio == 1.0 {
            return;
        }
        let last = (frames_in_loop - 1).max(0);
        let old = std::mem::take(&mut self.frames);
        for action in old.into_values().flatten() {
            let frame = ((action.frame as f64 * ratio).round() as Frame).clamp(0, last);
            self.record(Action { frame, ..action });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.frames.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(channel: u32, frame: Frame) -> Action {
        Action::new(ChannelId(channel), frame, MidiEvent::note_on(0, 60, 100))
    }

    #[test]
    fn test_lookup_by_frame() {
        let mut map = ActionMap::new();
        map.record(note(4, 100));
        map.record(note(5, 100));
        map.record(note(4, 200));

        assert_eq!(map.at(100).len(), 2);
        assert_eq!(map.at(200)[0].channel, ChannelId(4));
        assert!(map.at(150).is_empty());
        assert!(map.has_at(200));
    }

    #[test]
    fn test_clear_channel_drops_empty_frames() {
        let mut map = ActionMap::new();
        map.record(note(4, 100));
        map.record(note(5, 100));
        map.record(note(4, 200));

        map.clear_channel(ChannelId(4));

        assert_eq!(map.len(), 1);
        assert!(!map.has_at(200));
        assert!(!map.has_actions(ChannelId(4)));
        assert!(map.has_actions(ChannelId(5)));
    }

    #[test]
    fn test_rescale_halves_positions_on_double_tempo() {
        let mut map = ActionMap::new();
        map.record(note(4, 24_000));
        map.record(note(4, 95_000));

        map.rescale(0.5, 48_000);

        let frames: Vec<Frame> = map.iter().map(|a| a.frame).collect();
        assert_eq!(frames, vec![12_000, 47_500]);
    }

    #[test]
    fn test_clone_channel_assigns_new_ids() {
        let mut map = ActionMap::new();
        map.record(note(4, 10));
        map.record(note(4, 20));

        let mut id = 100;
        map.clone_channel(ChannelId(4), ChannelId(9), || {
            id += 1;
            id
        });

        let cloned: Vec<&Action> = map.iter().filter(|a| a.channel == ChannelId(9)).collect();
        assert_eq!(cloned.len(), 2);
        assert_eq!(cloned[0].id, 101);
        assert_eq!(cloned[1].frame, 20);
    }
}
