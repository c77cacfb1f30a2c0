//! Controller event → engine action mapping
//!
//! [`resolve`] is pure: it turns a raw event into a [`MidiAction`] using the
//! configured bindings. [`apply`] performs the action on the engine handle.
//! Events no binding claims are relayed to the MIDI channels listening on
//! their MIDI channel.

use looper_core::engine::{EngineHandle, EngineResult, MidiEvent, CONTROL_CHANGE, NOTE_ON};
use looper_core::ChannelId;

use crate::config::{ChannelBinding, MidiConfig, MidiControlConfig};

/// Largest 7-bit controller value
const MIDI_VALUE_MAX: f32 = 127.0;

/// What a controller event asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiAction {
    ToggleStartStop,
    Rewind,
    ToggleActionRec,
    ToggleInputRec,
    ToggleMetronome,
    /// Master input volume, 0.0-1.0
    VolumeIn(f32),
    /// Master output volume, 0.0-1.0
    VolumeOut(f32),
    BeatsDouble,
    BeatsHalf,
    Press { channel: ChannelId, velocity: u8 },
    Release { channel: ChannelId },
    Kill { channel: ChannelId },
    ToggleMute { channel: ChannelId },
    ToggleSolo { channel: ChannelId },
    Volume { channel: ChannelId, value: f32 },
    /// Not bound: forward to listening MIDI channels
    Relay(MidiEvent),
}

/// Note On with a non-zero velocity, or a CC above the midpoint
fn is_press(event: &MidiEvent) -> bool {
    match event.kind() {
        NOTE_ON => event.data2 > 0,
        CONTROL_CHANGE => event.data2 >= 64,
        _ => false,
    }
}

fn value(event: &MidiEvent) -> f32 {
    event.data2 as f32 / MIDI_VALUE_MAX
}

fn bound(control: &Option<MidiControlConfig>, event: &MidiEvent) -> bool {
    control.as_ref().is_some_and(|c| c.matches(event))
}

/// Trigger controls fire once, on press
fn trigger(
    control: &Option<MidiControlConfig>,
    event: &MidiEvent,
    action: MidiAction,
) -> Option<Option<MidiAction>> {
    bound(control, event).then(|| is_press(event).then_some(action))
}

fn resolve_channel(binding: &ChannelBinding, event: &MidiEvent) -> Option<Option<MidiAction>> {
    let channel = binding.id();
    if bound(&binding.press, event) {
        return Some(Some(if event.is_note_off() || !is_press(event) {
            MidiAction::Release { channel }
        } else {
            MidiAction::Press { channel, velocity: event.velocity() }
        }));
    }
    if bound(&binding.volume, event) {
        return Some(Some(MidiAction::Volume { channel, value: value(event) }));
    }
    trigger(&binding.kill, event, MidiAction::Kill { channel })
        .or_else(|| trigger(&binding.mute, event, MidiAction::ToggleMute { channel }))
        .or_else(|| trigger(&binding.solo, event, MidiAction::ToggleSolo { channel }))
}

/// Map an event to an action
///
/// Returns `None` for a bound control that needs no action (the release of
/// a toggle button).
pub fn resolve(config: &MidiConfig, event: &MidiEvent) -> Option<MidiAction> {
    let global = &config.global;
    if bound(&global.volume_in, event) {
        return Some(MidiAction::VolumeIn(value(event)));
    }
    if bound(&global.volume_out, event) {
        return Some(MidiAction::VolumeOut(value(event)));
    }

    let matched = trigger(&global.start_stop, event, MidiAction::ToggleStartStop)
        .or_else(|| trigger(&global.rewind, event, MidiAction::Rewind))
        .or_else(|| trigger(&global.action_rec, event, MidiAction::ToggleActionRec))
        .or_else(|| trigger(&global.input_rec, event, MidiAction::ToggleInputRec))
        .or_else(|| trigger(&global.metronome, event, MidiAction::ToggleMetronome))
        .or_else(|| trigger(&global.beat_double, event, MidiAction::BeatsDouble))
        .or_else(|| trigger(&global.beat_half, event, MidiAction::BeatsHalf))
        .or_else(|| config.channels.iter().find_map(|b| resolve_channel(b, event)));

    match matched {
        Some(action) => action,
        None => Some(MidiAction::Relay(*event)),
    }
}

/// Perform an action on the engine
pub fn apply(action: MidiAction, engine: &EngineHandle) -> EngineResult<()> {
    match action {
        MidiAction::ToggleStartStop => engine.toggle_play(),
        MidiAction::Rewind => engine.rewind(),
        MidiAction::ToggleActionRec => engine.toggle_action_recording().map(|_| ()),
        MidiAction::ToggleInputRec => engine.toggle_input_recording().map(|_| ()),
        MidiAction::ToggleMetronome => engine.toggle_metronome().map(|_| ()),
        MidiAction::VolumeIn(value) => engine.set_volume(ChannelId::MASTER_IN, value),
        MidiAction::VolumeOut(value) => engine.set_volume(ChannelId::MASTER_OUT, value),
        MidiAction::BeatsDouble => engine.multiply_beats(),
        MidiAction::BeatsHalf => engine.divide_beats(),
        MidiAction::Press { channel, velocity } => engine.press(channel, velocity),
        MidiAction::Release { channel } => engine.release(channel),
        MidiAction::Kill { channel } => engine.kill(channel),
        MidiAction::ToggleMute { channel } => engine.toggle_mute(channel).map(|_| ()),
        MidiAction::ToggleSolo { channel } => engine.toggle_solo(channel).map(|_| ()),
        MidiAction::Volume { channel, value } => engine.set_volume(channel, value),
        MidiAction::Relay(event) => relay(event, engine),
    }
}

fn relay(event: MidiEvent, engine: &EngineHandle) -> EngineResult<()> {
    let layout = engine.layout();
    let listeners: Vec<ChannelId> = layout
        .user_channels()
        .filter(|c| c.midi_data().is_some_and(|m| m.listens_to(&event)))
        .map(|c| c.id)
        .collect();
    for channel in listeners {
        engine.send_midi(channel, event)?;
    }
    Ok(())
}

/// Resolve and apply, logging failures
pub fn dispatch(config: &MidiConfig, event: &MidiEvent, engine: &EngineHandle) {
    let Some(action) = resolve(config, event) else {
        return;
    };
    log::trace!("MIDI: {:?} -> {:?}", event, action);
    if let Err(e) = apply(action, engine) {
        log::warn!("MIDI: {:?} failed: {}", action, e);
    }
}

/// Push the configured light bindings onto their channels
pub fn install_lights(config: &MidiConfig, engine: &EngineHandle) {
    for binding in config.channels.iter().filter(|b| b.lights.is_some()) {
        if let Err(e) = engine.set_light_bindings(binding.id(), binding.lights) {
            log::warn!("MIDI: lights for channel {}: {}", binding.channel, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_core::config::EngineConfig;
    use looper_core::engine::{
        create_engine, ChannelKind, LightBindings, LightTarget, DEFAULT_BEATS,
    };
    use looper_core::{PlayStatus, StereoBuffer};

    fn bindings() -> MidiConfig {
        let mut config = MidiConfig::default();
        config.global.start_stop = Some(MidiControlConfig::note(0, 91));
        config.global.volume_out = Some(MidiControlConfig::cc(0, 7));
        config.global.beat_double = Some(MidiControlConfig::note(0, 92));
        config.channels.push(ChannelBinding {
            channel: 4,
            press: Some(MidiControlConfig::note(0, 36)),
            mute: Some(MidiControlConfig::note(0, 37)),
            volume: Some(MidiControlConfig::cc(0, 10)),
            ..ChannelBinding::default()
        });
        config
    }

    #[test]
    fn test_toggles_fire_on_press_only() {
        let config = bindings();
        assert_eq!(
            resolve(&config, &MidiEvent::note_on(0, 91, 127)),
            Some(MidiAction::ToggleStartStop)
        );
        assert_eq!(resolve(&config, &MidiEvent::note_off(0, 91, 0)), None);
        assert_eq!(resolve(&config, &MidiEvent::note_on(0, 91, 0)), None);
    }

    #[test]
    fn test_channel_press_and_release() {
        let config = bindings();
        assert_eq!(
            resolve(&config, &MidiEvent::note_on(0, 36, 90)),
            Some(MidiAction::Press { channel: ChannelId(4), velocity: 90 })
        );
        assert_eq!(
            resolve(&config, &MidiEvent::note_off(0, 36, 0)),
            Some(MidiAction::Release { channel: ChannelId(4) })
        );
    }

    #[test]
    fn test_faders_scale_to_unit() {
        let config = bindings();
        assert_eq!(
            resolve(&config, &MidiEvent::new(CONTROL_CHANGE, 7, 127)),
            Some(MidiAction::VolumeOut(1.0))
        );
        assert_eq!(
            resolve(&config, &MidiEvent::new(CONTROL_CHANGE, 10, 0)),
            Some(MidiAction::Volume { channel: ChannelId(4), value: 0.0 })
        );
    }

    #[test]
    fn test_unbound_events_are_relayed() {
        let config = bindings();
        let event = MidiEvent::note_on(3, 60, 100);
        assert_eq!(resolve(&config, &event), Some(MidiAction::Relay(event)));
    }

    #[test]
    fn test_apply_edits_the_engine() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let channel = handle.add_channel(ChannelKind::Sample);
        let config = bindings();

        dispatch(&config, &MidiEvent::note_on(0, 37, 127), &handle);
        dispatch(&config, &MidiEvent::new(CONTROL_CHANGE, 10, 0), &handle);
        dispatch(&config, &MidiEvent::note_on(0, 92, 127), &handle);

        let layout = handle.layout();
        let ch = layout.channel(channel).unwrap();
        assert!(ch.mute);
        assert_eq!(ch.volume, 0.0);
        assert_eq!(layout.sequencer.beats, DEFAULT_BEATS * 2);
    }

    #[test]
    fn test_press_reaches_midi_channel() {
        let (mut engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let channel = handle.add_channel(ChannelKind::Midi);
        assert_eq!(channel, ChannelId(4));

        dispatch(&bindings(), &MidiEvent::note_on(0, 36, 100), &handle);
        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out, None);

        let layout = handle.layout();
        let status = layout.channel(channel).unwrap().state.play_status();
        assert_ne!(status, PlayStatus::Off);
    }

    #[test]
    fn test_relay_skips_sample_channels() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        handle.add_channel(ChannelKind::Sample);
        assert!(apply(MidiAction::Relay(MidiEvent::note_on(0, 60, 1)), &handle).is_ok());
    }

    #[test]
    fn test_install_lights_ignores_missing_channels() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let channel = handle.add_channel(ChannelKind::Sample);
        let lights = LightBindings {
            playing: Some(LightTarget { status: NOTE_ON, data1: 36 }),
            ..LightBindings::default()
        };

        let mut config = MidiConfig::default();
        config.channels.push(ChannelBinding {
            channel: channel.0,
            lights: Some(lights),
            ..ChannelBinding::default()
        });
        config.channels.push(ChannelBinding {
            channel: 99,
            lights: Some(lights),
            ..ChannelBinding::default()
        });

        install_lights(&config, &handle);
        assert_eq!(handle.layout().channel(channel).unwrap().lights, Some(lights));
    }
}
