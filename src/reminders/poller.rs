//! Background reminder poller
//!
//! Compares the store against the wall clock every poll interval and fires
//! matching reminders one after another. A reminder fires at most once per
//! calendar minute even though the default 30s interval polls each minute
//! twice.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::{Clock, Reminder, ReminderStore};
use crate::audio::playback::SoundPlayer;
use crate::speech::Speaker;
use crate::ui::Overlay;

/// Signal type for stopping the poller thread
#[derive(Debug, Clone, Copy)]
pub struct StopSignal;

/// What happens when a reminder fires
pub trait ReminderAlert: Send + Sync {
    fn fire(&self, id: &str, reminder: &Reminder);
}

/// Desktop alert: blocking overlay, alarm sound, then the spoken text.
///
/// The overlay is raised first on its own thread, the alarm and speech run
/// while it is up, and the pass waits for the overlay to be dismissed.
pub struct DesktopAlert {
    overlay: Arc<dyn Overlay>,
    sound: Arc<dyn SoundPlayer>,
    speaker: Arc<dyn Speaker>,
    alarm_sound: Option<PathBuf>,
    notification_timeout: Duration,
    settle: Duration,
}

impl DesktopAlert {
    pub fn new(
        overlay: Arc<dyn Overlay>,
        sound: Arc<dyn SoundPlayer>,
        speaker: Arc<dyn Speaker>,
        alarm_sound: Option<PathBuf>,
        notification_timeout: Duration,
    ) -> Self {
        Self {
            overlay,
            sound,
            speaker,
            alarm_sound,
            notification_timeout,
            settle: Duration::from_secs(1),
        }
    }
}

impl ReminderAlert for DesktopAlert {
    fn fire(&self, id: &str, reminder: &Reminder) {
        log::info!("⏰ Reminder {} firing: {}", id, reminder.task);

        let overlay = Arc::clone(&self.overlay);
        let body = format!("{}: {}", id, reminder.task);
        let timeout = self.notification_timeout;
        let popup = std::thread::Builder::new()
            .name("reminder-overlay".into())
            .spawn(move || {
                if let Err(e) = overlay.show_blocking("Reminder", &body, timeout) {
                    log::warn!("Reminder overlay failed: {}", e);
                }
            });

        // Let the overlay come up before the alarm starts
        std::thread::sleep(self.settle);

        let played = match &self.alarm_sound {
            Some(path) => self.sound.play_file(path),
            None => self.sound.play_alarm_tone(),
        };
        if let Err(e) = played {
            log::warn!("Error playing alarm: {}", e);
        }

        if let Err(e) = self.speaker.speak(&format!("Reminder: {}", reminder.task)) {
            log::warn!("Failed to speak reminder: {}", e);
        }

        match popup {
            Ok(handle) => {
                let _ = handle.join();
            }
            Err(e) => log::warn!("Failed to spawn reminder overlay thread: {}", e),
        }
    }
}

/// Remembers which reminders already fired in the current minute.
///
/// Entries are keyed on id, time and task, since a removed one-shot id can be
/// handed to a new reminder within the same minute.
#[derive(Debug, Default)]
pub struct FiredTracker {
    minute_key: String,
    fired: HashSet<(String, String, String)>,
}

impl FiredTracker {
    fn roll_to(&mut self, minute_key: &str) {
        if self.minute_key != minute_key {
            self.minute_key = minute_key.to_string();
            self.fired.clear();
        }
    }

    /// Returns false if this reminder already fired in this minute
    fn mark(&mut self, id: &str, reminder: &Reminder) -> bool {
        self.fired
            .insert((id.to_string(), reminder.time.clone(), reminder.task.clone()))
    }
}

/// One firing pass at `now`. Returns the ids that fired.
///
/// One-shot reminders are removed in a single store update after every due
/// reminder has fired.
pub fn poll_once(
    store: &ReminderStore,
    alert: &dyn ReminderAlert,
    tracker: &mut FiredTracker,
    now: &NaiveDateTime,
) -> Result<Vec<String>> {
    let clock = Clock::at(now);
    tracker.roll_to(&clock.minute_key);

    let mut fired = Vec::new();
    let mut to_remove = Vec::new();

    for (id, reminder) in store.due(&clock)? {
        if !tracker.mark(&id, &reminder) {
            log::debug!("Reminder {} already fired at {}", id, clock.minute_key);
            continue;
        }

        alert.fire(&id, &reminder);
        if reminder.is_one_shot() {
            to_remove.push(id.clone());
        }
        fired.push(id);
    }

    if !to_remove.is_empty() {
        let removed = store.remove_many(&to_remove)?;
        log::info!("Removed {} one-shot reminder(s)", removed);
    }

    Ok(fired)
}

/// Poller thread handle
pub struct ReminderPoller {
    stop_tx: Sender<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl ReminderPoller {
    /// Start polling on a dedicated thread
    pub fn start(
        store: Arc<ReminderStore>,
        alert: Arc<dyn ReminderAlert>,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<StopSignal>(1);

        let handle = std::thread::Builder::new()
            .name("reminder-poller".into())
            .spawn(move || {
                log::info!("Reminder poller started (every {}s)", interval.as_secs());
                let mut tracker = FiredTracker::default();

                loop {
                    let now = chrono::Local::now().naive_local();
                    if let Err(e) = poll_once(&store, alert.as_ref(), &mut tracker, &now) {
                        log::error!("Reminder poll failed: {:#}", e);
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(StopSignal) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                log::info!("Reminder poller stopped");
            })
            .context("Failed to spawn reminder poller thread")?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Stop the poller and wait for the current pass to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(StopSignal);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReminderPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
