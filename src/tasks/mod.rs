// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Periodic tasks (§4.10-§4.11, §3/§5 age-out): the retransmit sweep, the
//! idle connection reaper, and the age-out sweep, each a thread-per-task
//! background loop in the style of `hdds::dds::writer::cleanup_timer` -- an
//! `Arc<AtomicBool>` stop signal, a `Drop`-based join on the handle.

pub mod age_out;
pub mod reaper;
pub mod retransmit;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to a running periodic-task thread. Dropping it (or calling
/// [`TaskHandle::stop`] explicitly) signals the thread to exit and joins
/// it, matching `hdds`'s `CleanupTimerHandle`.
pub struct TaskHandle {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl TaskHandle {
    pub(crate) fn spawn_with(
        stop: Arc<AtomicBool>,
        name: &'static str,
        body: impl FnOnce() + Send + 'static,
    ) -> Self {
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .expect("failed to spawn background task thread");
        Self {
            stop,
            thread: Some(thread),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
