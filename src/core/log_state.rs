use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogCategory {
    #[serde(rename = "plain-log")]
    Plain,
    Warning,
    Error,
    #[serde(rename = "outbound-command")]
    Command,
    #[serde(rename = "sent-message")]
    Sent,
    Info,
}

impl LogCategory {
    pub const ALL: [LogCategory; 6] = [
        LogCategory::Plain,
        LogCategory::Warning,
        LogCategory::Error,
        LogCategory::Command,
        LogCategory::Sent,
        LogCategory::Info,
    ];

    pub fn index(self) -> usize {
        match self {
            LogCategory::Plain => 0,
            LogCategory::Warning => 1,
            LogCategory::Error => 2,
            LogCategory::Command => 3,
            LogCategory::Sent => 4,
            LogCategory::Info => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LogCategory::Plain => "Logs",
            LogCategory::Warning => "Warns",
            LogCategory::Error => "Errors",
            LogCategory::Command => "Commands",
            LogCategory::Sent => "Sent",
            LogCategory::Info => "Info",
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            LogCategory::Plain => "LOG",
            LogCategory::Warning => "WRN",
            LogCategory::Error => "ERR",
            LogCategory::Command => "CMD",
            LogCategory::Sent => "SND",
            LogCategory::Info => "INF",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts([usize; 6]);

impl CategoryCounts {
    pub fn get(&self, category: LogCategory) -> usize {
        self.0[category.index()]
    }

    pub fn increment(&mut self, category: LogCategory) {
        self.0[category.index()] += 1;
    }

    pub fn add(&mut self, other: &CategoryCounts) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += theirs;
        }
    }

    #[cfg(test)]
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogCategory, usize)> + '_ {
        LogCategory::ALL.iter().map(|c| (*c, self.get(*c)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: u64,
    pub category: LogCategory,
    pub content: String,
    pub created_at: DateTime<Local>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TimeAge {
    VeryRecent,
    Recent,
    Older,
}

pub fn get_time_age(timestamp: DateTime<Local>) -> TimeAge {
    let total_secs = Local::now().signed_duration_since(timestamp).num_seconds();

    if total_secs < 5 {
        TimeAge::VeryRecent
    } else if total_secs < 60 {
        TimeAge::Recent
    } else {
        TimeAge::Older
    }
}

#[derive(Debug, Default)]
pub struct LogStore {
    records: Vec<LogRecord>,
    counts: CategoryCounts,
    next_id: u64,
}

impl LogStore {
    pub fn append(&mut self, category: LogCategory, content: impl Into<String>) -> &LogRecord {
        let record = LogRecord {
            id: self.next_id,
            category,
            content: content.into(),
            created_at: Local::now(),
        };
        self.next_id += 1;
        self.counts.increment(category);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Ids keep increasing across clears so a cleared record is never confused
    /// with a new one.
    pub fn clear(&mut self) {
        self.records.clear();
        self.counts = CategoryCounts::default();
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn counts(&self) -> &CategoryCounts {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_update_time(&self) -> Option<DateTime<Local>> {
        self.records.last().map(|r| r.created_at)
    }
}
