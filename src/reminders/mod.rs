//! Reminders - time-of-day alarms persisted in `reminders.json`
//!
//! A reminder fires when its stored `"HH:MM AM/PM"` string equals the current
//! minute-truncated clock. Weekly reminders also require the stored weekday.
//! One-shot reminders are removed after they fire; recurring ones stay until
//! removed by command.

pub mod poller;

use anyhow::Result;
use chrono::{NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CommandError;
use crate::router::{CommandHandler, Reply};
use crate::store::{id_number, next_sequential_id, JsonFile};
use crate::ui::Overlay;
use crate::validation::{normalize_item_id, validate_item_text};

/// Clock format shared by stored reminders and the poller
pub const TIME_FORMAT: &str = "%I:%M %p";

const ID_PREFIX: &str = "reminder";

/// Reminder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Seconds between poll passes (must stay below a minute)
    pub poll_interval_secs: u64,
    /// Alarm sound; a generated tone is used when the file is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_sound: Option<PathBuf>,
    /// How long a fired reminder's notification stays up unless dismissed
    pub notification_secs: u64,
    /// How long the reminder list overlay stays up
    pub list_overlay_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            alarm_sound: None,
            notification_secs: 30,
            list_overlay_secs: 10,
        }
    }
}

/// How often a reminder repeats. `None` in the store means one-shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
}

/// A stored reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub task: String,
    /// `"HH:MM AM/PM"`
    pub time: String,
    #[serde(default)]
    pub recurring: Option<Recurrence>,
    /// Weekday name, only for weekly reminders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
}

pub type ReminderMap = BTreeMap<String, Reminder>;

/// The current minute as the poller compares it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    /// `"HH:MM AM/PM"`
    pub time: String,
    /// Lowercase weekday name
    pub weekday: String,
    /// `"YYYY-MM-DD HH:MM"`, identifies one calendar minute
    pub minute_key: String,
}

impl Clock {
    pub fn at(now: &NaiveDateTime) -> Self {
        Self {
            time: now.format(TIME_FORMAT).to_string(),
            weekday: now.format("%A").to_string().to_lowercase(),
            minute_key: now.format("%Y-%m-%d %H:%M").to_string(),
        }
    }

    pub fn now() -> Self {
        Self::at(&chrono::Local::now().naive_local())
    }
}

impl Reminder {
    /// Matching rule: exact time string, plus weekday for weekly reminders
    pub fn is_due(&self, clock: &Clock) -> bool {
        if self.time != clock.time {
            return false;
        }

        match self.recurring {
            Some(Recurrence::Weekly) => self
                .day
                .as_deref()
                .map(|day| day.to_lowercase() == clock.weekday)
                .unwrap_or(false),
            Some(Recurrence::Daily) | None => true,
        }
    }

    pub fn is_one_shot(&self) -> bool {
        self.recurring.is_none()
    }

    fn recurrence_label(&self) -> Option<String> {
        match (self.recurring, self.day.as_deref()) {
            (Some(Recurrence::Daily), _) => Some("daily".to_string()),
            (Some(Recurrence::Weekly), Some(day)) => Some(format!("weekly on {}", day)),
            (Some(Recurrence::Weekly), None) => Some("weekly".to_string()),
            (None, _) => None,
        }
    }
}

/// Reminder store backed by `reminders.json`
pub struct ReminderStore {
    file: JsonFile<ReminderMap>,
}

impl ReminderStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            file: JsonFile::open(path)?,
        })
    }

    /// Insert a reminder under the next free `reminder-N` id
    pub fn add(&self, reminder: Reminder) -> Result<String> {
        self.file.update(|map| {
            let id = next_sequential_id(ID_PREFIX, map.keys());
            map.insert(id.clone(), reminder);
            (id, true)
        })
    }

    /// Remove exactly one reminder by id
    pub fn remove(&self, id: &str) -> Result<Option<Reminder>> {
        self.file.update(|map| {
            let removed = map.remove(id);
            let changed = removed.is_some();
            (removed, changed)
        })
    }

    /// Remove several reminders in one write, returning how many existed
    pub fn remove_many(&self, ids: &[String]) -> Result<usize> {
        self.file.update(|map| {
            let removed = ids.iter().filter(|id| map.remove(*id).is_some()).count();
            (removed, removed > 0)
        })
    }

    /// All reminders in creation order
    pub fn list(&self) -> Result<Vec<(String, Reminder)>> {
        let mut entries: Vec<_> = self.file.load()?.into_iter().collect();
        entries.sort_by_key(|(id, _)| id_number(id));
        Ok(entries)
    }

    /// Reminders matching the given minute
    pub fn due(&self, clock: &Clock) -> Result<Vec<(String, Reminder)>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|(_, reminder)| reminder.is_due(clock))
            .collect())
    }

    pub fn load(&self) -> Result<ReminderMap> {
        self.file.load()
    }

    pub fn save(&self, reminders: &ReminderMap) -> Result<()> {
        self.file.save(reminders)
    }
}

/// Parse the part of a command after `"remind me to"`.
///
/// Accepted shapes: `<task> at <time> [daily | weekly [on <day>] | every <day>]`
/// where time is `5:30 p.m.`, `5:30 pm`, `05:30 PM`, `530 pm` or `5 pm`.
/// `today` is used as the day for `weekly` without an explicit weekday.
pub fn parse_reminder(body: &str, today: Weekday) -> Result<Reminder, CommandError> {
    let (task, schedule) = body
        .trim()
        .rsplit_once(" at ")
        .ok_or(CommandError::MissingTime)?;
    let task = validate_item_text(task)?;

    let schedule = schedule.replace('.', "").to_lowercase();
    let mut recurring = None;
    let mut day = None;
    let mut time_words = Vec::new();

    for word in schedule.split_whitespace() {
        match word {
            "daily" => recurring = Some(Recurrence::Daily),
            "weekly" => recurring = Some(Recurrence::Weekly),
            "every" | "on" | "day" => {}
            other => match parse_weekday(other) {
                Some(weekday) => {
                    recurring = Some(Recurrence::Weekly);
                    day = Some(weekday);
                }
                None => time_words.push(other),
            },
        }
    }

    // "every day" is daily, not weekly
    if schedule.contains("every day") && day.is_none() {
        recurring = Some(Recurrence::Daily);
    }

    let time_text = time_words.join(" ");
    let time = parse_clock_time(&time_text)?;

    let day = match recurring {
        Some(Recurrence::Weekly) => Some(weekday_name(day.unwrap_or(today)).to_string()),
        _ => None,
    };

    Ok(Reminder {
        task,
        time: time.format(TIME_FORMAT).to_string(),
        recurring,
        day,
    })
}

/// Parse a spoken 12-hour time into a `NaiveTime`
pub fn parse_clock_time(text: &str) -> Result<NaiveTime, CommandError> {
    let invalid = || CommandError::InvalidTime(text.trim().to_string());

    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect::<String>()
        .to_uppercase();

    let (digits, pm) = if let Some(rest) = compact.strip_suffix("PM") {
        (rest, true)
    } else if let Some(rest) = compact.strip_suffix("AM") {
        (rest, false)
    } else {
        return Err(invalid());
    };

    let (hour, minute) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() <= 2 => (digits, "00"),
        None if digits.len() <= 4 => digits.split_at(digits.len() - 2),
        None => return Err(invalid()),
    };

    if minute.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&hour) {
        return Err(invalid());
    }

    let hour24 = hour % 12 + if pm { 12 } else { 0 };
    NaiveTime::from_hms_opt(hour24, minute, 0).ok_or_else(invalid)
}

fn parse_weekday(word: &str) -> Option<Weekday> {
    match word.trim_end_matches('s') {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Handles `remind me to ...`, `show reminders` and `remove reminder <n>`
pub struct ReminderTask {
    store: Arc<ReminderStore>,
    overlay: Arc<dyn Overlay>,
    config: ReminderConfig,
}

impl ReminderTask {
    pub fn new(store: Arc<ReminderStore>, overlay: Arc<dyn Overlay>, config: ReminderConfig) -> Self {
        Self {
            store,
            overlay,
            config,
        }
    }

    fn add(&self, body: &str) -> Result<Reply> {
        let today = chrono::Datelike::weekday(&chrono::Local::now().date_naive());
        let reminder = match parse_reminder(body, today) {
            Ok(reminder) => reminder,
            Err(CommandError::InvalidTime(text)) => {
                log::warn!("Invalid reminder time: '{}'", text);
                return Ok(Reply::say(
                    "Invalid time format. Please say time like 5:30 p.m.",
                ));
            }
            Err(e) => {
                log::warn!("Could not parse reminder: {}", e);
                return Ok(Reply::say("Sorry, I couldn't understand the reminder."));
            }
        };

        let time = reminder.time.clone();
        let task = reminder.task.clone();
        let id = self.store.add(reminder)?;
        log::info!("⏰ {} set for '{}' at {}", id, task, time);
        Ok(Reply::say(format!("{} set for {}", id, time)))
    }

    fn show(&self) -> Result<Reply> {
        let reminders = self.store.list()?;
        if reminders.is_empty() {
            return Ok(Reply::say("No reminders found."));
        }

        let text = reminders
            .iter()
            .map(|(id, r)| match r.recurrence_label() {
                Some(label) => format!("{}: {} at {} ({})", id, r.task, r.time, label),
                None => format!("{}: {} at {}", id, r.task, r.time),
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.overlay.show_detached(
            "Reminders",
            &text,
            Duration::from_secs(self.config.list_overlay_secs),
        );

        let mut reply = Reply::say("Here are your reminders.");
        for (id, r) in &reminders {
            reply.push(format!("{}: {} at {}", id, r.task, r.time));
        }
        Ok(reply)
    }

    fn remove(&self, raw_id: &str) -> Result<Reply> {
        let id = match normalize_item_id(raw_id, ID_PREFIX) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Bad reminder id '{}': {}", raw_id, e);
                return Ok(Reply::say("Reminder not found."));
            }
        };

        match self.store.remove(&id)? {
            Some(removed) => {
                log::info!("🗑 {} removed: {:?}", id, removed);
                Ok(Reply::say(format!("{} removed.", id)))
            }
            None => Ok(Reply::say("Reminder not found.")),
        }
    }
}

impl CommandHandler for ReminderTask {
    fn name(&self) -> &'static str {
        "reminder"
    }

    fn handle(&self, command: &str) -> Result<Option<Reply>> {
        if let Some(body) = command.strip_prefix("remind me to") {
            return self.add(body).map(Some);
        }
        if command == "show reminders" || command == "show reminder" {
            return self.show().map(Some);
        }
        if let Some(id) = command.strip_prefix("remove reminder") {
            return self.remove(id).map(Some);
        }
        Ok(None)
    }
}
