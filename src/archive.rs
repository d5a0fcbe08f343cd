//! Defines the archive data model ([`Month`], [`Day`], [`Message`]) and the
//! [`Archive`] trait through which the build pipeline pulls ordered records.
//! The pipeline never mutates anything it reads from an [`Archive`]; it only
//! asks for bounded batches and stops when a batch comes back empty.
//!
//! [`MemoryArchive`] is the bundled implementation. It holds every message in
//! memory, grouped by month and sorted by id, and can be loaded from a YAML
//! archive file.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;

/// The order in which months, days, and messages are traversed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Ascending message ids.
    OldestFirst,

    /// Descending message ids.
    NewestFirst,
}

impl Direction {
    /// Maps the `new_on_top` configuration flag onto a [`Direction`].
    pub fn from_new_on_top(new_on_top: bool) -> Direction {
        match new_on_top {
            true => Direction::NewestFirst,
            false => Direction::OldestFirst,
        }
    }
}

/// A calendar month holding at least one message.
#[derive(Clone, Debug, PartialEq)]
pub struct Month {
    pub year: i32,
    pub month: u32,

    /// `YYYY-MM`. Used as the base of every page filename for the month.
    pub slug: String,

    /// Human-readable name, e.g. `May 2024`.
    pub label: String,

    /// Number of messages in the month.
    pub count: usize,
}

/// A calendar day holding at least one message.
#[derive(Clone, Debug, PartialEq)]
pub struct Day {
    /// `YYYY-MM-DD`. Keys the day's `day-counter-<slug>.js` artifact.
    pub slug: String,
    pub label: String,
    pub date: NaiveDate,
    pub count: usize,

    /// The page (rendering-order numbering) holding the day's first message
    /// in traversal order.
    pub page: usize,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: Option<String>,
}

/// A media attachment. `url` is either a remote URI (`scheme://...`) or a
/// path relative to the configured media directory.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub kind: String,
    pub url: String,

    #[serde(default)]
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Message {
    pub id: u64,
    pub date: DateTime<Utc>,
    pub user: User,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub reply_to: Option<u64>,

    #[serde(default)]
    pub media: Option<Media>,
}

/// The pull-based data source contract. Batches are bounded by `page_size`;
/// an empty batch signals that the month is exhausted.
pub trait Archive {
    /// Returns every month holding messages, ordered by `direction`.
    fn get_timeline(&self, direction: Direction) -> Result<Vec<Month>>;

    /// Returns the days of a month, ordered by `direction`. `page_size` is
    /// used to compute [`Day::page`].
    fn get_dayline(
        &self,
        year: i32,
        month: u32,
        direction: Direction,
        page_size: usize,
    ) -> Result<Vec<Day>>;

    fn get_message_count(&self, year: i32, month: u32) -> Result<usize>;

    /// Returns up to `page_size` messages of a month. `cursor` is an inclusive
    /// id bound: ascending traversal returns ids `>= cursor`, descending
    /// traversal returns ids `<= cursor`.
    fn get_messages(
        &self,
        year: i32,
        month: u32,
        direction: Direction,
        cursor: u64,
        page_size: usize,
    ) -> Result<Vec<Message>>;
}

/// An [`Archive`] that keeps every message in memory.
#[derive(Default)]
pub struct MemoryArchive {
    /// Messages keyed by `(year, month)`, each group sorted by id.
    months: BTreeMap<(i32, u32), Vec<Message>>,
}

#[derive(Deserialize)]
struct ArchiveFile {
    #[serde(default)]
    messages: Vec<Message>,
}

impl MemoryArchive {
    /// Groups `messages` by month and sorts each month by id.
    pub fn new(messages: Vec<Message>) -> MemoryArchive {
        let mut months: BTreeMap<(i32, u32), Vec<Message>> = BTreeMap::new();
        for message in messages {
            months
                .entry((message.date.year(), message.date.month()))
                .or_insert_with(Vec::new)
                .push(message);
        }
        for messages in months.values_mut() {
            messages.sort_by_key(|m| m.id);
        }
        MemoryArchive { months }
    }

    /// Loads an archive from a YAML file of the form `messages: [...]`.
    pub fn from_path(path: &Path) -> Result<MemoryArchive> {
        let file = File::open(path).map_err(|err| Error::Open {
            path: path.display().to_string(),
            err,
        })?;
        let archive: ArchiveFile = serde_yaml::from_reader(file)?;
        Ok(MemoryArchive::new(archive.messages))
    }

    fn month_messages(&self, year: i32, month: u32) -> &[Message] {
        match self.months.get(&(year, month)) {
            Some(messages) => messages,
            None => &[],
        }
    }
}

impl Archive for MemoryArchive {
    fn get_timeline(&self, direction: Direction) -> Result<Vec<Month>> {
        let mut timeline = self
            .months
            .iter()
            .map(|(&(year, month), messages)| {
                Ok(Month {
                    year,
                    month,
                    slug: format!("{:04}-{:02}", year, month),
                    label: first_of_month(year, month)?
                        .format("%B %Y")
                        .to_string(),
                    count: messages.len(),
                })
            })
            .collect::<Result<Vec<Month>>>()?;
        if direction == Direction::NewestFirst {
            timeline.reverse();
        }
        Ok(timeline)
    }

    fn get_dayline(
        &self,
        year: i32,
        month: u32,
        direction: Direction,
        page_size: usize,
    ) -> Result<Vec<Day>> {
        let page_size = page_size.max(1);
        let mut days: Vec<Day> = Vec::new();
        for (rank, message) in self.month_messages(year, month).iter().enumerate() {
            let date = message.date.date_naive();
            let page = rank / page_size + 1;
            match days.last_mut() {
                Some(day) if day.date == date => {
                    day.count += 1;
                    // the newest message of the day comes first when
                    // traversing descending
                    if direction == Direction::NewestFirst {
                        day.page = page;
                    }
                }
                _ => days.push(Day {
                    slug: date.format("%Y-%m-%d").to_string(),
                    label: date.format("%d %B %Y").to_string(),
                    date,
                    count: 1,
                    page,
                }),
            }
        }
        if direction == Direction::NewestFirst {
            days.reverse();
        }
        Ok(days)
    }

    fn get_message_count(&self, year: i32, month: u32) -> Result<usize> {
        Ok(self.month_messages(year, month).len())
    }

    fn get_messages(
        &self,
        year: i32,
        month: u32,
        direction: Direction,
        cursor: u64,
        page_size: usize,
    ) -> Result<Vec<Message>> {
        let messages = self.month_messages(year, month);
        Ok(match direction {
            Direction::OldestFirst => messages
                .iter()
                .filter(|m| m.id >= cursor)
                .take(page_size)
                .cloned()
                .collect(),
            Direction::NewestFirst => messages
                .iter()
                .rev()
                .filter(|m| m.id <= cursor)
                .take(page_size)
                .cloned()
                .collect(),
        })
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(Error::InvalidMonth { year, month })
}

/// The result of a fallible archive operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem reading from an [`Archive`].
#[derive(Debug)]
pub enum Error {
    /// Returned when the archive file can't be opened.
    Open { path: String, err: std::io::Error },

    /// Returned when the archive file isn't valid YAML or is missing fields.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when a month key doesn't name a real calendar month.
    InvalidMonth { year: i32, month: u32 },

    /// Returned by external archive implementations for their own failures.
    Source(String),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Open { path, err } => {
                write!(f, "Opening archive file '{}': {}", path, err)
            }
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::InvalidMonth { year, month } => {
                write!(f, "invalid month: {:04}-{:02}", year, month)
            }
            Error::Source(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open { path: _, err } => Some(err),
            Error::DeserializeYaml(err) => Some(err),
            Error::InvalidMonth { .. } => None,
            Error::Source(_) => None,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}
