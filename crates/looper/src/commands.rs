//! Text console commands
//!
//! One command per line on stdin. Parsing is separate from execution so
//! the grammar can be tested without an engine.

use looper_core::engine::{ChannelKind, EngineHandle};
use looper_core::{ChannelId, SeqStatus};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Stop,
    Rewind,
    Bpm(f32),
    Beats { beats: u32, bars: u32 },
    Quantize(u32),
    Add(ChannelKind),
    Press(ChannelId),
    Release(ChannelId),
    Kill(ChannelId),
    Mute(ChannelId),
    Solo(ChannelId),
    Metronome,
    RecActions,
    RecInput,
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{command}' needs {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },

    #[error("invalid {what}: '{value}'")]
    InvalidArgument { what: &'static str, value: String },
}

pub const HELP: &str = "\
play | stop | rewind
bpm N | beats N [BARS] | quantize N
add sample|midi
press ID | release ID | kill ID | mute ID | solo ID
metronome | rec-actions | rec-input
status | help | quit";

fn arg<'a>(
    args: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    what: &'static str,
) -> Result<&'a str, CommandError> {
    args.next()
        .ok_or(CommandError::MissingArgument { command, what })
}

fn number<T: std::str::FromStr>(value: &str, what: &'static str) -> Result<T, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidArgument {
        what,
        value: value.to_string(),
    })
}

fn channel(
    args: &mut std::str::SplitWhitespace<'_>,
    command: &'static str,
) -> Result<ChannelId, CommandError> {
    number(arg(args, command, "a channel id")?, "channel id").map(ChannelId)
}

/// Parse one console line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let mut args = line.split_whitespace();
    let Some(name) = args.next() else {
        return Ok(None);
    };

    let command = match name.to_lowercase().as_str() {
        "play" | "start" => Command::Play,
        "stop" => Command::Stop,
        "rewind" => Command::Rewind,
        "bpm" => Command::Bpm(number(arg(&mut args, "bpm", "a tempo")?, "tempo")?),
        "beats" => {
            let beats = number(arg(&mut args, "beats", "a beat count")?, "beat count")?;
            let bars = match args.next() {
                Some(bars) => number(bars, "bar count")?,
                None => 1,
            };
            Command::Beats { beats, bars }
        }
        "quantize" => Command::Quantize(number(
            arg(&mut args, "quantize", "a step count")?,
            "step count",
        )?),
        "add" => {
            let kind = arg(&mut args, "add", "sample or midi")?;
            Command::Add(kind.parse::<ChannelKind>().map_err(|_| CommandError::InvalidArgument {
                what: "channel kind",
                value: kind.to_string(),
            })?)
        }
        "press" => Command::Press(channel(&mut args, "press")?),
        "release" => Command::Release(channel(&mut args, "release")?),
        "kill" => Command::Kill(channel(&mut args, "kill")?),
        "mute" => Command::Mute(channel(&mut args, "mute")?),
        "solo" => Command::Solo(channel(&mut args, "solo")?),
        "metronome" => Command::Metronome,
        "rec-actions" => Command::RecActions,
        "rec-input" => Command::RecInput,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Whether the console keeps reading after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Run a command against the engine, printing its result
pub fn execute(command: Command, engine: &EngineHandle) -> anyhow::Result<Flow> {
    match command {
        Command::Play => engine.toggle_play()?,
        Command::Stop => engine.stop()?,
        Command::Rewind => engine.rewind()?,
        Command::Bpm(bpm) => {
            let bpm = engine.set_bpm(bpm)?;
            println!("bpm {:.2}", bpm);
        }
        Command::Beats { beats, bars } => engine.set_beats(beats, bars)?,
        Command::Quantize(steps) => engine.set_quantize(steps),
        Command::Add(kind) => {
            let id = engine.add_channel(kind);
            println!("added {} channel {}", kind, id);
        }
        Command::Press(id) => engine.press(id, looper_core::engine::MAX_VELOCITY)?,
        Command::Release(id) => engine.release(id)?,
        Command::Kill(id) => engine.kill(id)?,
        Command::Mute(id) => {
            let muted = engine.toggle_mute(id)?;
            println!("channel {} {}", id, if muted { "muted" } else { "unmuted" });
        }
        Command::Solo(id) => {
            let solo = engine.toggle_solo(id)?;
            println!("channel {} solo {}", id, if solo { "on" } else { "off" });
        }
        Command::Metronome => {
            let on = engine.toggle_metronome()?;
            println!("metronome {}", if on { "on" } else { "off" });
        }
        Command::RecActions => {
            let on = engine.toggle_action_recording()?;
            println!("action recording {}", if on { "on" } else { "off" });
        }
        Command::RecInput => {
            let on = engine.toggle_input_recording()?;
            println!("input recording {}", if on { "armed" } else { "off" });
        }
        Command::Status => println!("{}", status_report(engine)),
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

/// Transport line followed by one line per user channel
pub fn status_report(engine: &EngineHandle) -> String {
    let layout = engine.layout();
    let seq = &layout.sequencer;
    let status = match engine.status() {
        SeqStatus::Stopped => "stopped",
        SeqStatus::Waiting => "waiting",
        SeqStatus::Running => "running",
    };

    let mut report = format!(
        "{} | {:.2} bpm | {}/{} beats/bars | beat {} | frame {}",
        status,
        seq.bpm,
        seq.beats,
        seq.bars,
        engine.current_beat() + 1,
        engine.current_frame()
    );
    if engine.is_recording_actions() {
        report.push_str(" | rec actions");
    }
    if engine.is_recording_input() {
        report.push_str(" | rec input");
    }

    for channel in layout.user_channels() {
        let mut flags = String::new();
        if channel.mute {
            flags.push_str(" M");
        }
        if channel.solo {
            flags.push_str(" S");
        }
        if channel.armed {
            flags.push_str(" R");
        }
        if channel.state.is_reading_actions() {
            flags.push_str(" A");
        }
        report.push_str(&format!(
            "\n  {:>3} {:<6} {:<20} {:?}{}",
            channel.id,
            channel.kind_name(),
            channel.name,
            channel.state.play_status(),
            flags
        ));
    }
    report
}
