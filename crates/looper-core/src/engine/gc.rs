//! RT-safe garbage collection for engine data
//!
//! This module provides a global `basedrop` collector that enables deferred
//! deallocation of everything the audio thread may hold the last reference
//! to: published layouts, waves, per-channel state and record buffers. When a
//! `Shared<T>` or `Owned<T>` is dropped on the audio thread, it doesn't free
//! memory - it enqueues the pointer for collection by a background GC thread.
//!
//! ## Usage
//!
//! ```ignore
//! use basedrop::Shared;
//! use crate::engine::gc_handle;
//!
//! let wave = Shared::new(&gc_handle(), Wave::new("kick", data, 48000));
//! let also_wave = wave.clone();
//!
//! drop(wave);
//! drop(also_wave);  // Last reference - queued for GC, not freed immediately
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the collector thread reclaims deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

/// Global handle for creating Shared<T>/Owned<T> allocations
///
/// The actual Collector lives on a dedicated GC thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created on the thread that runs it
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Audio GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // Deferred drops still work, they are just never reclaimed
            log::error!("Failed to start audio GC thread; deferred memory will not be reclaimed");
            let collector: &'static Collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Get a handle for creating Shared<T>/Owned<T> allocations
///
/// The handle is lightweight and can be cloned.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
