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
//! Tracks which buttons are held, reconciling releases the device never reported.

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, span, warn, Level};

use crate::{
    color::ButtonColor,
    pad::{Button, ButtonId, ChannelKind, Pad, PressState, RawButtonEvent, SubscriptionId},
};

/// The default reconciliation interval.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(5);

/// The change notifications a handler can register for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    All,
    Grid,
    Side,
    Toolbar,
}

impl Channel {
    fn for_kind(kind: ChannelKind) -> Channel {
        match kind {
            ChannelKind::Grid => Channel::Grid,
            ChannelKind::Side => Channel::Side,
            ChannelKind::Toolbar => Channel::Toolbar,
        }
    }
}

/// A change notification.
#[derive(Clone)]
pub struct ButtonChange {
    button: Arc<dyn Button>,
    state: PressState,
    color: ButtonColor,
    event: RawButtonEvent,
}

impl ButtonChange {
    pub fn button(&self) -> &Arc<dyn Button> {
        &self.button
    }

    pub fn id(&self) -> ButtonId {
        self.event.button()
    }

    /// The live state of the button when the change was processed.
    pub fn state(&self) -> PressState {
        self.state
    }

    /// The color of the button when the change was processed.
    pub fn color(&self) -> ButtonColor {
        self.color
    }

    pub fn event(&self) -> RawButtonEvent {
        self.event
    }
}

impl fmt::Debug for ButtonChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ButtonChange")
            .field("id", &self.id())
            .field("state", &self.state)
            .field("color", &self.color)
            .field("event", &self.event)
            .finish()
    }
}

/// A change handler. Handlers run on whichever thread processed the event.
pub type ChangeHandler = Arc<dyn Fn(&ButtonTracker, &ButtonChange) + Send + Sync>;

/// A button the tracker believes is held.
#[derive(Clone)]
pub struct TrackedButton {
    button: Arc<dyn Button>,
    pressed_at: Instant,
    last_event: RawButtonEvent,
}

impl TrackedButton {
    pub fn id(&self) -> ButtonId {
        self.button.id()
    }

    pub fn button(&self) -> &Arc<dyn Button> {
        &self.button
    }

    /// When the button was pressed, or re-pressed.
    pub fn pressed_at(&self) -> Instant {
        self.pressed_at
    }

    pub fn last_event(&self) -> RawButtonEvent {
        self.last_event
    }
}

impl fmt::Debug for TrackedButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedButton")
            .field("id", &self.id())
            .field("pressed_at", &self.pressed_at)
            .field("last_event", &self.last_event)
            .finish()
    }
}

struct Monitor {
    alive: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct Shared {
    pad: Arc<dyn Pad>,
    active: Mutex<HashMap<ButtonId, TrackedButton>>,
    running: AtomicBool,
    debounce_ms: AtomicU64,
    handlers: RwLock<Vec<(Channel, ChangeHandler)>>,
    last_error: Mutex<Option<String>>,
    subscription: Mutex<Option<SubscriptionId>>,
    monitor: Mutex<Option<Monitor>>,
    lifecycle: Mutex<()>,
}

/// Converts the pad's press events into a set of held buttons and change notifications.
#[derive(Clone)]
pub struct ButtonTracker {
    shared: Arc<Shared>,
}

impl ButtonTracker {
    /// Creates a stopped tracker for the given pad.
    pub fn new(pad: Arc<dyn Pad>) -> ButtonTracker {
        ButtonTracker {
            shared: Arc::new(Shared {
                pad,
                active: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                debounce_ms: AtomicU64::new(DEFAULT_DEBOUNCE.as_millis() as u64),
                handlers: RwLock::new(Vec::new()),
                last_error: Mutex::new(None),
                subscription: Mutex::new(None),
                monitor: Mutex::new(None),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    pub fn pad(&self) -> Arc<dyn Pad> {
        self.shared.pad.clone()
    }

    /// Registers a change handler. Handlers for [`Channel::All`] run before the handlers for
    /// the event's own channel, each group in registration order.
    pub fn on_change(&self, channel: Channel, handler: ChangeHandler) {
        self.shared.handlers.write().push((channel, handler));
    }

    /// Sets the reconciliation interval. Intervals under a millisecond are raised to one.
    pub fn set_debounce(&self, debounce: Duration) {
        let millis = debounce.as_millis().clamp(1, u64::MAX as u128) as u64;
        self.shared.debounce_ms.store(millis, Ordering::Relaxed);
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.shared.debounce_ms.load(Ordering::Relaxed))
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Returns the most recent start failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    fn record_error(&self, message: String) {
        error!(err = %message, "Pad tracker error.");
        *self.shared.last_error.lock() = Some(message);
    }

    /// Opens the pad and starts tracking. Does nothing if already running. Failures are
    /// recorded in [`ButtonTracker::last_error`] and leave the tracker stopped.
    pub fn start(&self) {
        let span = span!(Level::INFO, "button tracker");
        let _enter = span.enter();

        let _lifecycle = self.shared.lifecycle.lock();
        if self.is_running() {
            return;
        }

        let pad = &self.shared.pad;
        if let Err(e) = pad.open().and_then(|_| pad.reset()) {
            pad.close();
            self.record_error(format!("Unable to initialize {}: {}", pad, e));
            return;
        }

        let weak = Arc::downgrade(&self.shared);
        let subscription = pad.subscribe(Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                ButtonTracker { shared }.on_raw_event(event);
            }
        }));
        self.shared.active.lock().clear();
        self.shared.running.store(true, Ordering::SeqCst);

        let alive = Arc::new(AtomicBool::new(true));
        let spawned = {
            let weak = Arc::downgrade(&self.shared);
            let alive = alive.clone();
            thread::Builder::new()
                .name("pad-state-monitor".to_string())
                .spawn(move || monitor(weak, alive))
        };
        match spawned {
            Ok(handle) => {
                *self.shared.subscription.lock() = Some(subscription);
                *self.shared.monitor.lock() = Some(Monitor { alive, handle });
                *self.shared.last_error.lock() = None;
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                pad.unsubscribe(subscription);
                pad.close();
                self.record_error(format!("Unable to start the pad state monitor: {}", e));
            }
        }
    }

    /// Stops tracking and waits for the monitor thread to exit, then releases the pad. Does
    /// nothing if not running.
    pub fn stop(&self) {
        let (monitor, subscription) = {
            let _lifecycle = self.shared.lifecycle.lock();
            if !self.shared.running.swap(false, Ordering::SeqCst) {
                return;
            }
            info!("Stopping...");

            let monitor = self.shared.monitor.lock().take();
            if let Some(monitor) = monitor.as_ref() {
                monitor.alive.store(false, Ordering::SeqCst);
            }
            (monitor, self.shared.subscription.lock().take())
        };

        // A handler running on the monitor thread may stop the tracker. It can't join itself.
        if let Some(monitor) = monitor {
            if monitor.handle.thread().id() != thread::current().id()
                && monitor.handle.join().is_err()
            {
                error!("Pad state monitor panicked.");
            }
        }

        let _lifecycle = self.shared.lifecycle.lock();
        let pad = &self.shared.pad;
        if let Some(subscription) = subscription {
            pad.unsubscribe(subscription);
        }
        // Started again while the monitor was being joined.
        if self.is_running() {
            return;
        }
        if let Err(e) = pad.reset() {
            warn!(err = %e, "Unable to reset the pad.");
        }
        pad.close();
        self.shared.active.lock().clear();
    }

    /// Processes a press event, real or synthesized.
    pub fn on_raw_event(&self, event: RawButtonEvent) {
        let id = event.button();
        let Some(button) = self.shared.pad.button(id) else {
            warn!(button = %id, "Unable to resolve button.");
            return;
        };
        let state = button.state();
        debug!(button = %id, transition = ?event.transition(), state = ?state, "Button event.");

        {
            let mut active = self.shared.active.lock();
            // An event still in flight when the tracker stopped. Checked under the lock so
            // nothing is tracked after stop clears the map.
            if !self.is_running() {
                debug!(button = %id, "Ignoring event, tracker is stopped.");
                return;
            }
            match (state, active.entry(id)) {
                (PressState::Up, Entry::Occupied(entry)) => {
                    let tracked = entry.remove();
                    info!(
                        button = %id,
                        held_ms = tracked.pressed_at.elapsed().as_millis() as u64,
                        "Deactivated."
                    );
                }
                (PressState::Up, Entry::Vacant(_)) => {}
                (PressState::Down, Entry::Vacant(entry)) => {
                    entry.insert(TrackedButton {
                        button: button.clone(),
                        pressed_at: Instant::now(),
                        last_event: event,
                    });
                    info!(button = %id, "Activated.");
                }
                (PressState::Down, Entry::Occupied(mut entry)) => {
                    let tracked = entry.get_mut();
                    tracked.pressed_at = Instant::now();
                    tracked.last_event = event;
                    info!(button = %id, "Activated again.");
                }
            }
        }

        let change = ButtonChange {
            color: button.color(),
            button,
            state,
            event,
        };
        let channel = Channel::for_kind(event.kind());
        let handlers: Vec<ChangeHandler> = {
            let handlers = self.shared.handlers.read();
            let all = handlers.iter().filter(|(c, _)| *c == Channel::All);
            let own = handlers.iter().filter(|(c, _)| *c == channel);
            all.chain(own).map(|(_, handler)| handler.clone()).collect()
        };
        for handler in handlers {
            handler(self, &change);
        }
    }

    /// Returns a snapshot of the buttons currently believed held.
    pub fn active_buttons(&self) -> Vec<TrackedButton> {
        self.shared.active.lock().values().cloned().collect()
    }

    /// Returns true if the button is tracked as held and the device still reports it down.
    pub fn is_active(&self, id: ButtonId) -> bool {
        let tracked = self.shared.active.lock().get(&id).cloned();
        tracked.is_some_and(|tracked| tracked.button.state() == PressState::Down)
    }

    /// Like [`ButtonTracker::is_active`], for an identity string such as "Toolbar(Mixer)".
    pub fn is_active_by_name(&self, name: &str) -> bool {
        name.parse::<ButtonId>()
            .is_ok_and(|id| self.is_active(id))
    }

    /// Releases every tracked button the device no longer reports as down.
    fn reconcile(&self) {
        for tracked in self.active_buttons() {
            if tracked.button.state() != PressState::Down {
                debug!(button = %tracked.id(), "Releasing button with no reported release.");
                self.on_raw_event(RawButtonEvent::new(tracked.id(), PressState::Up));
            }
        }
    }
}

fn monitor(shared: Weak<Shared>, alive: Arc<AtomicBool>) {
    let span = span!(Level::INFO, "pad state monitor");
    let _enter = span.enter();

    info!("Started.");
    while alive.load(Ordering::SeqCst) {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let tracker = ButtonTracker { shared };
        tracker.reconcile();
        let debounce = tracker.debounce();
        drop(tracker);
        thread::sleep(debounce);
    }
    info!("Stopped.");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use crate::{
        color::Brightness,
        pad::{self, SideButton, ToolbarButton},
        testutil::eventually,
    };

    use super::*;

    fn mock_tracker() -> (ButtonTracker, Arc<pad::mock::Pad>) {
        let pad = pad::get_device("mock-pad");
        let mock = pad.to_mock().unwrap();
        (ButtonTracker::new(pad), mock)
    }

    #[test]
    fn test_press_refresh_release() {
        let (tracker, pad) = mock_tracker();
        tracker.start();
        assert!(tracker.is_running());

        let id = ButtonId::Grid { x: 2, y: 3 };
        pad.press(id);
        assert!(tracker.is_active(id));
        let first = tracker.active_buttons()[0].pressed_at();

        pad.press(id);
        let tracked = tracker.active_buttons();
        assert_eq!(tracked.len(), 1);
        assert!(tracked[0].pressed_at() >= first);

        pad.release(id);
        assert!(!tracker.is_active(id));
        assert!(tracker.active_buttons().is_empty());

        tracker.stop();
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let (tracker, pad) = mock_tracker();
        tracker.start();

        pad.release(ButtonId::Side(SideButton::Pan));
        assert!(tracker.active_buttons().is_empty());

        tracker.stop();
    }

    #[test]
    fn test_dropped_release_is_reconciled() {
        let (tracker, pad) = mock_tracker();
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let releases = releases.clone();
            tracker.on_change(
                Channel::Grid,
                Arc::new(move |_, change| {
                    if change.state() == PressState::Up {
                        releases.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }
        tracker.set_debounce(Duration::from_millis(2));
        tracker.start();

        let id = ButtonId::Grid { x: 7, y: 0 };
        pad.press(id);
        assert!(tracker.is_active(id));

        // The device now reports the button up, but no release event arrives.
        pad.set_live_state(id, PressState::Up);
        assert!(!tracker.is_active(id));
        eventually(
            || tracker.active_buttons().is_empty(),
            "Button was never reconciled",
        );
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        tracker.stop();
    }

    #[test]
    fn test_start_failure_is_recorded() {
        let (tracker, pad) = mock_tracker();
        pad.set_fail_open(Some("device unplugged".to_string()));

        tracker.start();
        assert!(!tracker.is_running());
        assert!(tracker
            .last_error()
            .is_some_and(|e| e.contains("device unplugged")));
        assert_eq!(pad.subscriber_count(), 0);

        pad.set_fail_open(None);
        tracker.start();
        assert!(tracker.is_running());
        assert!(tracker.last_error().is_none());
        tracker.stop();
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let (tracker, pad) = mock_tracker();
        tracker.stop();

        tracker.start();
        tracker.start();
        assert_eq!(pad.subscriber_count(), 1);
        assert_eq!(pad.reset_count(), 1);

        pad.press(ButtonId::Toolbar(ToolbarButton::Up));
        tracker.stop();
        assert!(!tracker.is_running());
        assert!(!pad.is_open());
        assert_eq!(pad.subscriber_count(), 0);
        assert!(tracker.active_buttons().is_empty());
        tracker.stop();

        // Events after stopping are no longer tracked.
        pad.press(ButtonId::Toolbar(ToolbarButton::Up));
        assert!(tracker.active_buttons().is_empty());
    }

    #[test]
    fn test_channel_fan_out_order() {
        let (tracker, pad) = mock_tracker();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for (channel, name) in [
            (Channel::Toolbar, "toolbar"),
            (Channel::All, "all"),
            (Channel::Grid, "grid"),
            (Channel::Side, "side"),
        ] {
            let calls = calls.clone();
            tracker.on_change(
                channel,
                Arc::new(move |_, change| calls.lock().push((name, change.id()))),
            );
        }
        tracker.start();

        let side = ButtonId::Side(SideButton::Stop);
        let toolbar = ButtonId::Toolbar(ToolbarButton::Mixer);
        pad.press(side);
        pad.press(toolbar);
        tracker.stop();

        assert_eq!(
            *calls.lock(),
            vec![
                ("all", side),
                ("side", side),
                ("all", toolbar),
                ("toolbar", toolbar)
            ]
        );
    }

    #[test]
    fn test_change_carries_color() {
        let (tracker, pad) = mock_tracker();
        let colors = Arc::new(Mutex::new(Vec::new()));
        {
            let colors = colors.clone();
            tracker.on_change(
                Channel::All,
                Arc::new(move |_, change| colors.lock().push(change.color())),
            );
        }
        tracker.start();

        let id = ButtonId::Grid { x: 0, y: 0 };
        pad.button(id)
            .unwrap()
            .set_brightness(Brightness::Full, Brightness::Off)
            .unwrap();
        pad.press(id);
        tracker.stop();

        assert_eq!(*colors.lock(), vec![ButtonColor::Red]);
    }

    #[test]
    fn test_is_active_by_name() {
        let (tracker, pad) = mock_tracker();
        tracker.start();

        pad.press(ButtonId::Toolbar(ToolbarButton::Mixer));
        assert!(tracker.is_active_by_name("Toolbar(Mixer)"));
        assert!(!tracker.is_active_by_name("Toolbar(Session)"));
        assert!(!tracker.is_active_by_name("Keyboard(Q)"));

        tracker.stop();
    }

    #[test]
    fn test_handler_can_stop_tracker() {
        let (tracker, pad) = mock_tracker();
        tracker.on_change(Channel::All, Arc::new(|tracker, _| tracker.stop()));
        tracker.start();

        pad.press(ButtonId::Grid { x: 1, y: 1 });
        assert!(!tracker.is_running());
    }

    #[test]
    fn test_event_after_stop_is_ignored() {
        let (tracker, pad) = mock_tracker();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            tracker.on_change(
                Channel::All,
                Arc::new(move |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        tracker.start();
        tracker.stop();

        // A press the input thread was still delivering when the tracker stopped.
        let id = ButtonId::Grid { x: 4, y: 4 };
        pad.set_live_state(id, PressState::Down);
        tracker.on_raw_event(RawButtonEvent::new(id, PressState::Down));

        assert!(tracker.active_buttons().is_empty());
        assert!(!tracker.is_active(id));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debounce_is_clamped() {
        let (tracker, _) = mock_tracker();
        assert_eq!(tracker.debounce(), DEFAULT_DEBOUNCE);
        tracker.set_debounce(Duration::ZERO);
        assert_eq!(tracker.debounce(), Duration::from_millis(1));
    }
}
