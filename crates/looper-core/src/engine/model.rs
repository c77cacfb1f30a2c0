//! Model store - lock-free publication of the engine layout
//!
//! The whole render-relevant state (sequencer parameters, mixer flags,
//! channels, recorded actions) is one immutable [`Layout`] snapshot. Readers
//! (the audio thread first of all) grab the current snapshot with
//! [`ModelStore::current`], which never blocks and keeps that snapshot alive
//! for as long as they hold it. Writers edit a private working copy under a
//! mutex and publish a fresh clone when done.
//!
//! Old snapshots are released through the `basedrop` collector, so the audio
//! thread dropping the last reference never frees memory.
//!
//! ```text
//!  control thread                          audio thread
//!  ──────────────                          ────────────
//!  edit(Hard, f)
//!    publish(working + locked)  ─┐
//!    f(&mut working)             │         current() ──► snapshot for the block
//!    publish(working)          ──┴──────►  (locked: render silence)
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use basedrop::{Shared, SharedCell};

use super::actions::ActionMap;
use super::channel::Channel;
use super::gc::gc_handle;
use super::mixer::MixerLayout;
use super::sequencer::SequencerLayout;
use crate::config::{EngineConfig, InputRecMode};
use crate::types::ChannelId;

/// How strongly a layout change affects rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapType {
    /// Nothing observers need to know about
    None,
    /// Parameter change; structure unchanged
    Soft,
    /// Structural change; the audio thread must not render a half-built graph
    Hard,
}

impl SwapType {
    /// Whether subscribers get a `LayoutChanged` event
    pub fn notifies(&self) -> bool {
        !matches!(self, SwapType::None)
    }
}

/// Recorder flags the channels consult while rendering
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderLayout {
    pub recording_actions: bool,
    pub recording_input: bool,
    pub input_rec_mode: InputRecMode,
}

/// One published snapshot of everything the audio thread renders from
#[derive(Clone)]
pub struct Layout {
    /// Bumped on every publication
    pub generation: u64,
    /// Set while a HARD edit is in progress
    pub locked: bool,
    pub config: EngineConfig,
    pub sequencer: SequencerLayout,
    pub mixer: MixerLayout,
    pub recorder: RecorderLayout,
    pub channels: Vec<Channel>,
    pub actions: ActionMap,
}

impl Layout {
    /// Fresh layout with the three internal channels
    pub fn new(sample_rate: u32, config: EngineConfig) -> Self {
        let sequencer = SequencerLayout::new(sample_rate);
        sequencer.state.set_metronome(config.metronome);
        Self {
            generation: 0,
            locked: false,
            sequencer,
            mixer: MixerLayout::new(&config),
            recorder: RecorderLayout {
                recording_actions: false,
                recording_input: false,
                input_rec_mode: config.input_rec_mode,
            },
            channels: vec![Channel::master_out(), Channel::master_in(), Channel::preview()],
            actions: ActionMap::new(),
            config,
        }
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    /// Channels created by the user (no buses, no preview)
    pub fn user_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| !c.is_internal())
    }

    /// Recompute the mixer's solo flag from the channels
    pub fn update_solos(&mut self) {
        let has_solos = self.user_channels().any(|c| c.solo);
        self.mixer.has_solos = has_solos;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Render gate
// ────────────────────────────────────────────────────────────────────────────

/// Lets a control thread stop the audio thread between two blocks
///
/// The audio thread raises `rendering` and then checks `paused`; a pausing
/// thread raises `paused` and then waits for `rendering` to drop. With
/// sequentially consistent ordering at least one side always sees the
/// other, so no block runs while paused.
#[derive(Debug, Default)]
pub struct RenderGate {
    paused: AtomicUsize,
    rendering: AtomicBool,
}

impl RenderGate {
    /// Called by the audio thread before a block; false = render silence
    pub fn enter(&self) -> bool {
        self.rendering.store(true, Ordering::SeqCst);
        if self.paused.load(Ordering::SeqCst) > 0 {
            self.rendering.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Called by the audio thread after a block
    pub fn exit(&self) {
        self.rendering.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst) > 0
    }

    fn pause(&self) {
        self.paused.fetch_add(1, Ordering::SeqCst);
        while self.rendering.load(Ordering::SeqCst) {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }

    fn resume(&self) {
        self.paused.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Rendering stays paused while this guard lives
pub struct RenderPause<'a> {
    gate: &'a RenderGate,
}

impl Drop for RenderPause<'_> {
    fn drop(&mut self) {
        self.gate.resume();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Store
// ────────────────────────────────────────────────────────────────────────────

pub struct ModelStore {
    current: SharedCell<Layout>,
    working: Mutex<Layout>,
    gate: RenderGate,
}

impl ModelStore {
    pub fn new(layout: Layout) -> Self {
        Self {
            current: SharedCell::new(Shared::new(&gc_handle(), layout.clone())),
            working: Mutex::new(layout),
            gate: RenderGate::default(),
        }
    }

    /// The published snapshot (lock-free, never blocks)
    pub fn current(&self) -> Shared<Layout> {
        self.current.get()
    }

    pub fn gate(&self) -> &RenderGate {
        &self.gate
    }

    /// Edit the working copy and publish the result
    ///
    /// With [`SwapType::Hard`] a locked copy of the previous layout is
    /// published first, so the audio thread renders silence rather than
    /// mixing old and new structure.
    pub fn edit<R>(&self, swap: SwapType, f: impl FnOnce(&mut Layout) -> R) -> R {
        let mut working = self.lock_working();
        if swap == SwapType::Hard {
            let mut locked = working.clone();
            locked.locked = true;
            self.publish(locked);
        }
        let result = f(&mut working);
        working.generation += 1;
        working.locked = false;
        self.publish(working.clone());
        result
    }

    /// Read the working copy without publishing
    pub fn read<R>(&self, f: impl FnOnce(&Layout) -> R) -> R {
        f(&self.lock_working())
    }

    /// Lock the layout for a data swap (e.g. replacing a wave)
    ///
    /// A locked snapshot is published right away; the edited layout is
    /// published when the guard drops.
    pub fn lock_data(&self) -> DataLock<'_> {
        let working = self.lock_working();
        let mut locked = working.clone();
        locked.locked = true;
        self.publish(locked);
        DataLock {
            store: self,
            working,
        }
    }

    /// Stop the world: no block runs until the guard drops
    ///
    /// Blocks until an in-flight block has finished.
    pub fn pause_rendering(&self) -> RenderPause<'_> {
        self.gate.pause();
        RenderPause { gate: &self.gate }
    }

    pub fn generation(&self) -> u64 {
        self.current.get().generation
    }

    fn lock_working(&self) -> MutexGuard<'_, Layout> {
        self.working.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, layout: Layout) {
        self.current.set(Shared::new(&gc_handle(), layout));
    }
}

/// Exclusive access to the working layout; publishes on drop
pub struct DataLock<'a> {
    store: &'a ModelStore,
    working: MutexGuard<'a, Layout>,
}

impl Deref for DataLock<'_> {
    type Target = Layout;

    fn deref(&self) -> &Layout {
        &self.working
    }
}

impl DerefMut for DataLock<'_> {
    fn deref_mut(&mut self) -> &mut Layout {
        &mut self.working
    }
}

impl Drop for DataLock<'_> {
    fn drop(&mut self) {
        self.working.generation += 1;
        self.working.locked = false;
        self.store.publish(self.working.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn store() -> ModelStore {
        ModelStore::new(Layout::new(48000, EngineConfig::default()))
    }

    #[test]
    fn test_new_layout_has_internal_channels() {
        let layout = Layout::new(48000, EngineConfig::default());
        assert!(layout.channel(ChannelId::MASTER_OUT).is_some());
        assert!(layout.channel(ChannelId::MASTER_IN).is_some());
        assert!(layout.channel(ChannelId::PREVIEW).is_some());
        assert_eq!(layout.user_channels().count(), 0);
    }

    #[test]
    fn test_edit_publishes_new_generation() {
        let store = store();
        let before = store.current();

        store.edit(SwapType::Soft, |layout| {
            layout.sequencer.set_bpm(90.0);
        });

        let after = store.current();
        assert_eq!(after.generation, before.generation + 1);
        assert_eq!(after.sequencer.bpm, 90.0);
        // The old snapshot is untouched
        assert_eq!(before.sequencer.bpm, 120.0);
    }

    #[test]
    fn test_hard_edit_is_locked_while_in_progress() {
        let store = store();
        let seen_locked = store.edit(SwapType::Hard, |_| store.current().locked);
        assert!(seen_locked);
        assert!(!store.current().locked);
    }

    #[test]
    fn test_data_lock_publishes_on_drop() {
        let store = store();
        {
            let mut layout = store.lock_data();
            layout.sequencer.set_beats(8, 2);
            assert!(store.current().locked);
        }
        let current = store.current();
        assert!(!current.locked);
        assert_eq!(current.sequencer.beats, 8);
    }

    #[test]
    fn test_sequencer_state_survives_publication() {
        let store = store();
        store.current().sequencer.state.set_current_frame(777);
        store.edit(SwapType::Hard, |layout| layout.sequencer.set_quantize(2));
        assert_eq!(store.current().sequencer.current_frame(), 777);
    }

    #[test]
    fn test_readers_always_see_consistent_snapshots() {
        const WRITERS: u32 = 4;
        const ROUNDS: u32 = 250;

        let store = Arc::new(store());
        let done = Arc::new(AtomicBool::new(false));

        // Channels come and go in pairs, so every snapshot holds an even number
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut last_generation = 0;
                    let mut reads = 0u64;
                    loop {
                        let layout = store.current();
                        let seq = &layout.sequencer;
                        assert_eq!(seq.frames_in_beat, seq.frames_in_loop / seq.beats as i64);
                        assert_eq!(seq.frames_in_bar, seq.frames_in_loop / seq.bars as i64);

                        let mut ids: Vec<u32> = layout.user_channels().map(|c| c.id.0).collect();
                        assert_eq!(ids.len() % 2, 0);
                        assert!(ids.len() <= 2 * WRITERS as usize);
                        ids.sort_unstable();
                        ids.dedup();
                        assert_eq!(ids.len(), layout.user_channels().count());
                        assert_eq!(layout.channels.len(), ids.len() + 3);

                        assert!(layout.generation >= last_generation);
                        last_generation = layout.generation;
                        reads += 1;
                        if done.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                    reads
                })
            })
            .collect();

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let first = ChannelId::FIRST_USER.0 + 2 * w;
                    let pair = [ChannelId(first), ChannelId(first + 1)];
                    let config = EngineConfig::default();
                    for i in 0..ROUNDS {
                        store.edit(SwapType::Hard, |layout| {
                            for id in pair {
                                layout.channels.push(Channel::sample(id, "writer", &config));
                            }
                            layout.sequencer.set_bpm(60.0 + ((i + w) % 120) as f32);
                            layout.sequencer.set_beats(1 + i % 16, 1 + i % 4);
                        });
                        store.edit(SwapType::Hard, |layout| {
                            layout.channels.retain(|c| !pair.contains(&c.id));
                        });
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(store.generation(), (WRITERS * ROUNDS * 2) as u64);
        assert_eq!(store.current().user_channels().count(), 0);
    }

    #[test]
    fn test_pause_waits_for_in_flight_block() {
        let store = Arc::new(store());
        let entered = Arc::new(Barrier::new(2));
        let finished = Arc::new(AtomicBool::new(false));

        let audio = {
            let store = Arc::clone(&store);
            let entered = Arc::clone(&entered);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                assert!(store.gate().enter());
                entered.wait();
                thread::sleep(Duration::from_millis(50));
                finished.store(true, Ordering::SeqCst);
                store.gate().exit();
            })
        };

        entered.wait();
        {
            let _pause = store.pause_rendering();
            assert!(finished.load(Ordering::SeqCst));
            assert!(store.gate().is_paused());
            assert!(!store.gate().enter());
        }
        audio.join().unwrap();
        assert!(!store.gate().is_paused());
        assert!(store.gate().enter());
        store.gate().exit();
    }
}
