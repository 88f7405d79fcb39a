//! RT-safe deferred deallocation for clip buffers
//!
//! Clips are shared between the clip cache and the render thread as
//! `basedrop::Shared<AudioClip>`. When the last reference is dropped on the
//! render thread the buffer is queued rather than freed; a background
//! collector thread releases it.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Collection period of the background thread
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("clip-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread for good
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Clip GC thread started");
            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn clip GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Handle for creating `Shared<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
