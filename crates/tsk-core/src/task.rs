use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Completion state. Its shape follows the owning category's status mode:
/// `bool` categories store a flag, `enum` categories a named state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskStatus {
    Flag(bool),
    State(String),
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Flag(false)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Flag(true) => f.write_str("done"),
            TaskStatus::Flag(false) => f.write_str("open"),
            TaskStatus::State(state) => f.write_str(state),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    #[default]
    White,
}

impl Color {
    pub const ALL: [Color; 7] = [
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::White,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Blue => "blue",
            Color::Magenta => "magenta",
            Color::Cyan => "cyan",
            Color::White => "white",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::ALL
            .into_iter()
            .find(|color| color.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown color `{}`", s))
    }
}

/// The caller-owned part of a task: everything except the identity and
/// bookkeeping fields a backend assigns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub key: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: String,
    pub due_date: Option<DateTime<Utc>>,
    pub color: Color,
    pub tags: BTreeSet<String>,
    pub category: String,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub category: String,
}

impl Task {
    /// Builds a stored task from `draft`, assigning a fresh id and both
    /// timestamps.
    pub fn create(draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: new_task_id(),
            key: draft.key,
            title: draft.title,
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
            color: draft.color,
            tags: draft.tags,
            category: draft.category,
        }
    }

    /// Replaces every caller-owned field. `id` and `created_at` are kept,
    /// `updated_at` moves forward.
    pub fn apply(&mut self, draft: TaskDraft, now: DateTime<Utc>) {
        self.key = draft.key;
        self.title = draft.title;
        self.description = draft.description;
        self.status = draft.status;
        self.priority = draft.priority;
        self.due_date = draft.due_date;
        self.color = draft.color;
        self.tags = draft.tags;
        self.category = draft.category;
        self.touch(now);
    }

    /// `updated_at` is strictly increasing even when the clock is coarse or
    /// steps backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = if now >= floor { now } else { floor };
    }

    pub fn draft(&self) -> TaskDraft {
        TaskDraft {
            key: self.key.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status.clone(),
            priority: self.priority.clone(),
            due_date: self.due_date,
            color: self.color,
            tags: self.tags.clone(),
            category: self.category.clone(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task: {} - {}", self.key, self.title)
    }
}

pub fn new_task_id() -> String {
    Ulid::new().to_string()
}

pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}
