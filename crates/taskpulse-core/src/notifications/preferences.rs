//! Per-user notification preferences and their stores.
//!
//! Preferences are a fixed-shape record: every category has a value (explicit
//! or its default) and every time of day is parsed from `HH:MM` when the
//! record is loaded, so the scheduler never sees malformed input.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::types::NotificationCategory;
use crate::error::PreferencesError;
use crate::storage::data_dir;

/// Preferences state file name.
const PREFERENCES_FILE: &str = "notification_preferences.json";

/// Largest UTC offset accepted, in minutes.
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// A wall-clock time of day, serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(TimeOfDay)
    }

    pub fn as_naive(self) -> NaiveTime {
        self.0
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(TimeOfDay)
            .map_err(|_| format!("expected HH:MM, got '{s}'"))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

/// Daily do-not-disturb window. `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoNotDisturb {
    pub enabled: bool,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl DoNotDisturb {
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `time` falls inside the window. Both bounds are inclusive.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let (start, end) = (self.start.as_naive(), self.end.as_naive());
        if self.wraps_midnight() {
            time >= start || time <= end
        } else {
            time >= start && time <= end
        }
    }
}

impl Default for DoNotDisturb {
    fn default() -> Self {
        Self {
            enabled: false,
            start: TimeOfDay(NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default()),
            end: TimeOfDay(NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default()),
        }
    }
}

/// Per-category switch and daily cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPreference {
    pub enabled: bool,
    pub max_per_day: u32,
}

impl CategoryPreference {
    pub fn default_for(category: NotificationCategory) -> Self {
        Self {
            enabled: true,
            max_per_day: category.default_max_per_day(),
        }
    }
}

/// Context-aware suppression toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartScheduling {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub skip_during_focus: bool,
    #[serde(default = "default_true")]
    pub skip_during_meetings: bool,
}

impl Default for SmartScheduling {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_during_focus: true,
            skip_during_meetings: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Notification settings of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub categories: BTreeMap<NotificationCategory, CategoryPreference>,
    #[serde(default)]
    pub do_not_disturb: DoNotDisturb,
    #[serde(default)]
    pub smart_scheduling: SmartScheduling,
    /// Offset used to interpret times of day and "today".
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: BTreeMap::new(),
            do_not_disturb: DoNotDisturb::default(),
            smart_scheduling: SmartScheduling::default(),
            utc_offset_minutes: 0,
        }
    }
}

impl UserPreferences {
    /// Settings for `category`, falling back to its defaults.
    pub fn category(&self, category: NotificationCategory) -> CategoryPreference {
        self.categories
            .get(&category)
            .copied()
            .unwrap_or_else(|| CategoryPreference::default_for(category))
    }

    pub fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), PreferencesError> {
        if self.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(PreferencesError::InvalidValue {
                field: "utc_offset_minutes".into(),
                message: format!(
                    "{} is outside of ±{MAX_OFFSET_MINUTES}",
                    self.utc_offset_minutes
                ),
            });
        }
        if self.do_not_disturb.enabled && self.do_not_disturb.start == self.do_not_disturb.end {
            return Err(PreferencesError::InvalidValue {
                field: "do_not_disturb".into(),
                message: "start and end must differ".into(),
            });
        }
        Ok(())
    }

    /// Merge a patch into a copy of these preferences.
    pub fn merged(&self, patch: &PreferencesPatch) -> Self {
        let mut next = self.clone();
        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        if let Some(categories) = &patch.categories {
            for (category, pref) in categories {
                next.categories.insert(*category, *pref);
            }
        }
        if let Some(dnd) = patch.do_not_disturb {
            next.do_not_disturb = dnd;
        }
        if let Some(smart) = patch.smart_scheduling {
            next.smart_scheduling = smart;
        }
        if let Some(offset) = patch.utc_offset_minutes {
            next.utc_offset_minutes = offset;
        }
        next
    }
}

/// Partial update applied by [`PreferencesStore::set`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Merged per category; unlisted categories keep their settings.
    #[serde(default)]
    pub categories: Option<BTreeMap<NotificationCategory, CategoryPreference>>,
    #[serde(default)]
    pub do_not_disturb: Option<DoNotDisturb>,
    #[serde(default)]
    pub smart_scheduling: Option<SmartScheduling>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl PreferencesPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn category(category: NotificationCategory, pref: CategoryPreference) -> Self {
        Self {
            categories: Some(BTreeMap::from([(category, pref)])),
            ..Self::default()
        }
    }

    pub fn do_not_disturb(dnd: DoNotDisturb) -> Self {
        Self {
            do_not_disturb: Some(dnd),
            ..Self::default()
        }
    }

    /// Whether this patch switches the global flag off.
    pub fn disables(&self) -> bool {
        self.enabled == Some(false)
    }
}

/// Persistence for user preferences.
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Stored preferences, or `None` for users who never saved any.
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>, PreferencesError>;

    /// Apply `patch` on top of the stored (or default) preferences and return the result.
    async fn set(
        &self,
        user_id: &str,
        patch: &PreferencesPatch,
    ) -> Result<UserPreferences, PreferencesError>;
}

/// Process-local store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryPreferencesStore {
    users: Mutex<HashMap<String, UserPreferences>>,
}

impl InMemoryPreferencesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed preferences for a user, replacing existing ones.
    pub async fn insert(&self, user_id: &str, prefs: UserPreferences) -> Result<(), PreferencesError> {
        prefs.validate()?;
        self.users.lock().await.insert(user_id.to_string(), prefs);
        Ok(())
    }
}

#[async_trait]
impl PreferencesStore for InMemoryPreferencesStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>, PreferencesError> {
        Ok(self.users.lock().await.get(user_id).cloned())
    }

    async fn set(
        &self,
        user_id: &str,
        patch: &PreferencesPatch,
    ) -> Result<UserPreferences, PreferencesError> {
        let mut users = self.users.lock().await;
        let next = users.get(user_id).cloned().unwrap_or_default().merged(patch);
        next.validate()?;
        users.insert(user_id.to_string(), next.clone());
        Ok(next)
    }
}

/// JSON file store in the data directory.
///
/// The whole file is rewritten on every update; it holds one entry per user.
#[derive(Debug)]
pub struct JsonPreferencesStore {
    path: PathBuf,
    users: Mutex<HashMap<String, UserPreferences>>,
}

impl JsonPreferencesStore {
    /// Open the store at `<data_dir>/notification_preferences.json`.
    pub fn open() -> Result<Self, PreferencesError> {
        let dir = data_dir().map_err(|e| PreferencesError::DataDir(e.to_string()))?;
        Self::open_at(dir.join(PREFERENCES_FILE))
    }

    /// Open a store backed by a specific file.
    pub fn open_at(path: PathBuf) -> Result<Self, PreferencesError> {
        let users = match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                let users: HashMap<String, UserPreferences> = serde_json::from_str(&content)
                    .map_err(|source| PreferencesError::ParseFailed {
                        path: path.clone(),
                        source,
                    })?;
                for prefs in users.values() {
                    prefs.validate()?;
                }
                users
            }
            Ok(_) => HashMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Drop a user's stored preferences.
    pub async fn remove(&self, user_id: &str) -> Result<bool, PreferencesError> {
        let mut users = self.users.lock().await;
        if !users.contains_key(user_id) {
            return Ok(false);
        }
        let mut next = users.clone();
        next.remove(user_id);
        Self::write(&self.path, &next)?;
        *users = next;
        Ok(true)
    }

    /// Memory is only updated once this succeeds.
    fn write(
        path: &std::path::Path,
        users: &HashMap<String, UserPreferences>,
    ) -> Result<(), PreferencesError> {
        let content = serde_json::to_string_pretty(users)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[async_trait]
impl PreferencesStore for JsonPreferencesStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>, PreferencesError> {
        Ok(self.users.lock().await.get(user_id).cloned())
    }

    async fn set(
        &self,
        user_id: &str,
        patch: &PreferencesPatch,
    ) -> Result<UserPreferences, PreferencesError> {
        let mut users = self.users.lock().await;
        let next = users.get(user_id).cloned().unwrap_or_default().merged(patch);
        next.validate()?;
        let mut staged = users.clone();
        staged.insert(user_id.to_string(), next.clone());
        Self::write(&self.path, &staged)?;
        *users = staged;
        Ok(next)
    }
}
