//! Schedule rows, parsed entries and the identities derived from them

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::EntryError;

/// Column names understood by the scheduler. Every other column is carried along
/// untouched in the row.
pub mod columns {
    pub const EQUIPMENT: &str = "equipment";
    pub const DAY: &str = "day";
    pub const HOUR: &str = "hour";
    pub const MINUTE: &str = "minute";
    pub const DURATION: &str = "duration";
    pub const TYPE: &str = "type";
    pub const CUSTOMER: &str = "customer";
    pub const FPS: &str = "fps";
    pub const LEFT_CROP_LEFT: &str = "left_crop_left";
    pub const LEFT_CROP_RIGHT: &str = "left_crop_right";
    pub const RIGHT_CROP_LEFT: &str = "right_crop_left";
    pub const RIGHT_CROP_RIGHT: &str = "right_crop_right";
    pub const CROP_TOP: &str = "crop_top";
    pub const CROP_BOTTOM: &str = "crop_bottom";
    pub const STREAM_KEY: &str = "stream_key";
    pub const RTMP_KEY: &str = "rtmp_key";
    pub const VISIBILITY: &str = "visibility";
    pub const CHANNEL_ID: &str = "youtube_channel_id";
}

/// One raw schedule row: column name to cell text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleRow(BTreeMap<String, String>);

impl ScheduleRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    /// Raw cell value, untrimmed
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    /// Trimmed cell value, `None` when absent or blank
    pub fn field(&self, column: &str) -> Option<&str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }

    /// True when every cell is blank
    pub fn is_blank(&self) -> bool {
        self.0.values().all(|v| v.trim().is_empty())
    }

    /// True when the row's equipment column names the given node
    pub fn belongs_to(&self, node_id: &str) -> bool {
        self.field(columns::EQUIPMENT)
            .is_some_and(|eqp| eqp.to_lowercase() == node_id.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ScheduleRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Day column of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleDay {
    On(Weekday),
    /// Wildcard honoured by the upload/broadcast window gate
    Everyday,
}

impl ScheduleDay {
    /// Whether this day covers the given weekday; the wildcard only counts when allowed
    pub fn covers(&self, weekday: Weekday, allow_everyday: bool) -> bool {
        match self {
            ScheduleDay::On(day) => *day == weekday,
            ScheduleDay::Everyday => allow_everyday,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleDay::On(Weekday::Mon) => "monday",
            ScheduleDay::On(Weekday::Tue) => "tuesday",
            ScheduleDay::On(Weekday::Wed) => "wednesday",
            ScheduleDay::On(Weekday::Thu) => "thursday",
            ScheduleDay::On(Weekday::Fri) => "friday",
            ScheduleDay::On(Weekday::Sat) => "saturday",
            ScheduleDay::On(Weekday::Sun) => "sunday",
            ScheduleDay::Everyday => "everyday",
        }
    }
}

impl FromStr for ScheduleDay {
    type Err = EntryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let day = match value.trim().to_lowercase().as_str() {
            "monday" => ScheduleDay::On(Weekday::Mon),
            "tuesday" => ScheduleDay::On(Weekday::Tue),
            "wednesday" => ScheduleDay::On(Weekday::Wed),
            "thursday" => ScheduleDay::On(Weekday::Thu),
            "friday" => ScheduleDay::On(Weekday::Fri),
            "saturday" => ScheduleDay::On(Weekday::Sat),
            "sunday" => ScheduleDay::On(Weekday::Sun),
            "everyday" => ScheduleDay::Everyday,
            _ => {
                return Err(EntryError::UnknownDay {
                    value: value.to_string(),
                })
            }
        };
        Ok(day)
    }
}

impl fmt::Display for ScheduleDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task types accepted from the schedule.
///
/// The declaration order mirrors the vocabulary used by schedule authors. It is an
/// allow-list only: the queue dispatches strictly in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    Recording,
    Free2Up,
    Continuous,
    Stream,
    Upload,
}

impl TaskType {
    pub const ALLOWED: [TaskType; 5] = [
        TaskType::Recording,
        TaskType::Free2Up,
        TaskType::Continuous,
        TaskType::Stream,
        TaskType::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Recording => "RECORDING",
            TaskType::Free2Up => "FREE2UP",
            TaskType::Continuous => "CONTINUOUS",
            TaskType::Stream => "STREAM",
            TaskType::Upload => "UPLOAD",
        }
    }

    /// Duration applied when the row leaves it blank
    pub fn default_duration_minutes(&self) -> u32 {
        match self {
            TaskType::Recording => 5,
            TaskType::Free2Up => 60,
            TaskType::Continuous => 60,
            TaskType::Stream => 300,
            TaskType::Upload => 0,
        }
    }
}

impl FromStr for TaskType {
    type Err = EntryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let upper = value.trim().to_uppercase();
        TaskType::ALLOWED
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| EntryError::UnknownTaskType {
                value: value.to_string(),
            })
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crop offsets forwarded verbatim to the capture worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropOffsets {
    pub left_crop_left: Option<String>,
    pub left_crop_right: Option<String>,
    pub right_crop_left: Option<String>,
    pub right_crop_right: Option<String>,
    pub crop_top: Option<String>,
    pub crop_bottom: Option<String>,
}

/// Broadcast parameters carried by FREE2UP windows for the broadcast worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastParams {
    pub stream_key: Option<String>,
    pub visibility: Option<String>,
    pub channel_id: Option<String>,
}

/// Task type together with the parameters that only make sense for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskSpec {
    Recording {
        fps: Option<String>,
        crop: CropOffsets,
    },
    Free2Up(BroadcastParams),
    Continuous {
        fps: Option<String>,
    },
    Stream {
        fps: Option<String>,
        stream_key: Option<String>,
    },
    Upload,
}

impl TaskSpec {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskSpec::Recording { .. } => TaskType::Recording,
            TaskSpec::Free2Up(_) => TaskType::Free2Up,
            TaskSpec::Continuous { .. } => TaskType::Continuous,
            TaskSpec::Stream { .. } => TaskType::Stream,
            TaskSpec::Upload => TaskType::Upload,
        }
    }

    fn from_row(task_type: TaskType, row: &ScheduleRow) -> Self {
        let text = |column: &str| row.field(column).map(str::to_string);
        match task_type {
            TaskType::Recording => TaskSpec::Recording {
                fps: text(columns::FPS),
                crop: CropOffsets {
                    left_crop_left: text(columns::LEFT_CROP_LEFT),
                    left_crop_right: text(columns::LEFT_CROP_RIGHT),
                    right_crop_left: text(columns::RIGHT_CROP_LEFT),
                    right_crop_right: text(columns::RIGHT_CROP_RIGHT),
                    crop_top: text(columns::CROP_TOP),
                    crop_bottom: text(columns::CROP_BOTTOM),
                },
            },
            TaskType::Free2Up => TaskSpec::Free2Up(BroadcastParams {
                stream_key: text(columns::RTMP_KEY).or_else(|| text(columns::STREAM_KEY)),
                visibility: text(columns::VISIBILITY),
                channel_id: text(columns::CHANNEL_ID),
            }),
            TaskType::Continuous => TaskSpec::Continuous {
                fps: text(columns::FPS),
            },
            TaskType::Stream => TaskSpec::Stream {
                fps: text(columns::FPS),
                stream_key: text(columns::STREAM_KEY).or_else(|| text(columns::RTMP_KEY)),
            },
            TaskType::Upload => TaskSpec::Upload,
        }
    }
}

/// A schedule row that passed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub node_id: String,
    pub day: ScheduleDay,
    pub start_hour: u32,
    pub start_minute: u32,
    /// `None` when the row leaves the duration blank; the dispatcher applies the
    /// per-type default
    pub duration_minutes: Option<u32>,
    pub customer: Option<String>,
    pub task: TaskSpec,
}

impl ScheduleEntry {
    /// Validate a raw row
    pub fn from_row(row: &ScheduleRow) -> Result<Self, EntryError> {
        let node_id = row
            .field(columns::EQUIPMENT)
            .ok_or(EntryError::MissingField {
                field: columns::EQUIPMENT,
            })?
            .to_string();

        let day = row
            .field(columns::DAY)
            .ok_or(EntryError::MissingField {
                field: columns::DAY,
            })?
            .parse::<ScheduleDay>()?;

        let start_hour = required_number(row, columns::HOUR)?;
        if start_hour > 23 {
            return Err(EntryError::OutOfRange {
                field: columns::HOUR,
                value: start_hour,
            });
        }
        let start_minute = required_number(row, columns::MINUTE)?;
        if start_minute > 59 {
            return Err(EntryError::OutOfRange {
                field: columns::MINUTE,
                value: start_minute,
            });
        }

        let duration_minutes = match row.field(columns::DURATION) {
            Some(value) => Some(parse_number(columns::DURATION, value)?),
            None => None,
        };

        let task_type = match row.field(columns::TYPE) {
            Some(value) => value.parse::<TaskType>()?,
            None => TaskType::Recording,
        };

        Ok(Self {
            node_id,
            day,
            start_hour,
            start_minute,
            duration_minutes,
            customer: row.field(columns::CUSTOMER).map(str::to_string),
            task: TaskSpec::from_row(task_type, row),
        })
    }

    pub fn task_type(&self) -> TaskType {
        self.task.task_type()
    }

    /// Start of the entry in seconds since local midnight
    pub fn start_seconds(&self) -> u32 {
        self.start_hour * 3600 + self.start_minute * 60
    }

    /// Row duration, or the task type's default when blank
    pub fn effective_duration_minutes(&self) -> u32 {
        self.duration_minutes
            .unwrap_or_else(|| self.task_type().default_duration_minutes())
    }

    pub fn slot_identity(&self) -> SlotIdentity {
        SlotIdentity {
            node_id: self.node_id.to_lowercase(),
            day: self.day,
            start_hour: self.start_hour,
            start_minute: self.start_minute,
            customer: self.customer.clone().unwrap_or_default(),
        }
    }
}

fn required_number(row: &ScheduleRow, field: &'static str) -> Result<u32, EntryError> {
    let value = row.field(field).ok_or(EntryError::MissingField { field })?;
    parse_number(field, value)
}

fn parse_number(field: &'static str, value: &str) -> Result<u32, EntryError> {
    value.parse::<u32>().map_err(|_| EntryError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Deduplication key of one calendar slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIdentity {
    pub node_id: String,
    pub day: ScheduleDay,
    pub start_hour: u32,
    pub start_minute: u32,
    pub customer: String,
}

impl PartialOrd for ScheduleDay {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduleDay {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let rank = |day: &ScheduleDay| match day {
            ScheduleDay::On(weekday) => weekday.num_days_from_monday(),
            ScheduleDay::Everyday => 7,
        };
        rank(self).cmp(&rank(other))
    }
}

impl fmt::Display for SlotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{:02}_{:02}_{}",
            self.node_id, self.day, self.start_hour, self.start_minute, self.customer
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(pairs: &[(&str, &str)]) -> ScheduleRow {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_recording_row_parses_with_pass_through_fields() {
        let entry = ScheduleEntry::from_row(&row(&[
            ("equipment", "Cam-01"),
            ("day", "Monday"),
            ("hour", "9"),
            ("minute", "05"),
            ("duration", "45"),
            ("type", "recording"),
            ("customer", "acme"),
            ("fps", "25"),
            ("crop_top", "12"),
        ]))
        .unwrap();

        assert_eq!(entry.day, ScheduleDay::On(Weekday::Mon));
        assert_eq!(entry.start_seconds(), 9 * 3600 + 5 * 60);
        assert_eq!(entry.duration_minutes, Some(45));
        match entry.task {
            TaskSpec::Recording { fps, crop } => {
                assert_eq!(fps.as_deref(), Some("25"));
                assert_eq!(crop.crop_top.as_deref(), Some("12"));
                assert_eq!(crop.crop_bottom, None);
            }
            other => panic!("unexpected task {other:?}"),
        }
    }

    #[test]
    fn test_missing_type_defaults_to_recording() {
        let entry = ScheduleEntry::from_row(&row(&[
            ("equipment", "cam"),
            ("day", "friday"),
            ("hour", "10"),
            ("minute", "0"),
        ]))
        .unwrap();
        assert_eq!(entry.task_type(), TaskType::Recording);
        assert_eq!(entry.duration_minutes, None);
        assert_eq!(entry.effective_duration_minutes(), 5);
    }

    #[rstest]
    #[case(&[("hour", "nine")], EntryError::InvalidNumber { field: "hour", value: "nine".into() })]
    #[case(&[("hour", "24")], EntryError::OutOfRange { field: "hour", value: 24 })]
    #[case(&[("minute", "60")], EntryError::OutOfRange { field: "minute", value: 60 })]
    #[case(&[("hour", "")], EntryError::MissingField { field: "hour" })]
    #[case(&[("duration", "-5")], EntryError::InvalidNumber { field: "duration", value: "-5".into() })]
    #[case(&[("day", "someday")], EntryError::UnknownDay { value: "someday".into() })]
    #[case(&[("type", "TRANSCODE")], EntryError::UnknownTaskType { value: "TRANSCODE".into() })]
    fn test_malformed_rows_are_rejected(
        #[case] overrides: &[(&str, &str)],
        #[case] expected: EntryError,
    ) {
        let mut base = row(&[
            ("equipment", "cam"),
            ("day", "monday"),
            ("hour", "9"),
            ("minute", "0"),
        ]);
        for (k, v) in overrides {
            base.insert(*k, *v);
        }
        assert_eq!(ScheduleEntry::from_row(&base), Err(expected));
    }

    #[test]
    fn test_slot_identity_ignores_non_key_fields() {
        let a = ScheduleEntry::from_row(&row(&[
            ("equipment", "CAM"),
            ("day", "monday"),
            ("hour", "9"),
            ("minute", "0"),
            ("customer", "acme"),
            ("duration", "10"),
        ]))
        .unwrap();
        let b = ScheduleEntry::from_row(&row(&[
            ("equipment", "cam"),
            ("day", "Monday"),
            ("hour", "09"),
            ("minute", "00"),
            ("customer", "acme"),
            ("duration", "90"),
            ("type", "STREAM"),
        ]))
        .unwrap();

        assert_eq!(a.slot_identity(), b.slot_identity());
        assert_eq!(a.slot_identity().to_string(), "cam_monday_09_00_acme");
    }

    #[test]
    fn test_row_node_match_is_trimmed_and_case_insensitive() {
        let r = row(&[("equipment", "  Cam-01 ")]);
        assert!(r.belongs_to("cam-01"));
        assert!(!r.belongs_to("cam-02"));
        assert!(!ScheduleRow::new().belongs_to("cam-01"));
    }
}
