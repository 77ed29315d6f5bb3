// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

/// Whether a playback has been asked to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopState {
    Live,
    StopRequested,
}

/// A cancel handle is shared between whoever starts a playback and the thread that renders it.
/// The renderer is expected to check it and drop the playback once a stop is requested.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<Mutex<StopState>>,
    condvar: Arc<Condvar>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a new, live cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            state: Arc::new(Mutex::new(StopState::Live)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true once a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.state.lock() == StopState::StopRequested
    }

    /// Blocks until a stop is requested or `finished` is set.
    pub fn wait(&self, finished: &AtomicBool) {
        let mut state = self.state.lock();
        self.condvar.wait_while(&mut state, |state| {
            *state == StopState::Live && !finished.load(Ordering::Relaxed)
        });
    }

    /// Like [`CancelHandle::wait`], giving up after `timeout`. Returns false on timeout.
    pub fn wait_timeout(&self, finished: &AtomicBool, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        !self
            .condvar
            .wait_while_for(
                &mut state,
                |state| *state == StopState::Live && !finished.load(Ordering::Relaxed),
                timeout,
            )
            .timed_out()
    }

    /// Wakes waiters so they can re-check their finished flag.
    pub fn notify(&self) {
        // Taking the lock keeps a waiter from missing a wakeup between its check and its sleep.
        let _state = self.state.lock();
        self.condvar.notify_all();
    }

    /// Requests a stop. Repeated requests are ignored.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if *state == StopState::Live {
            *state = StopState::StopRequested;
            self.condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_cancel_wakes_waiter() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.is_cancelled());

        let join = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || cancel_handle.wait(&AtomicBool::new(false)))
        };

        cancel_handle.cancel();
        cancel_handle.cancel();
        assert!(join.join().is_ok());
        assert!(cancel_handle.is_cancelled());
    }

    #[test]
    fn test_finished_wakes_waiter() {
        let cancel_handle = CancelHandle::new();
        let finished = Arc::new(AtomicBool::new(false));

        let join = {
            let cancel_handle = cancel_handle.clone();
            let finished = finished.clone();
            thread::spawn(move || cancel_handle.wait(&finished))
        };

        finished.store(true, Ordering::Relaxed);
        cancel_handle.notify();
        assert!(join.join().is_ok());
        assert!(!cancel_handle.is_cancelled());
    }

    #[test]
    fn test_wait_timeout() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.wait_timeout(&AtomicBool::new(false), Duration::from_millis(10)));
        assert!(cancel_handle.wait_timeout(&AtomicBool::new(true), Duration::from_millis(10)));
    }
}
