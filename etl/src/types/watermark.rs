use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use movies_postgres::content::RowCursor;
use thiserror::Error;

use crate::types::EntityId;

/// Seconds since the epoch of `1111-11-11T00:00:00Z`, the start of every cursor.
const SENTINEL_TIMESTAMP_SECS: i64 = -27_080_352_000;

/// Separates the timestamp from the optional id in the persisted form.
const ID_SEPARATOR: char = '#';

/// Timestamp layouts accepted besides RFC 3339, for values written by earlier deployments.
const LEGACY_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

const LEGACY_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum ParseWatermarkError {
    #[error("invalid watermark timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("invalid watermark id `{value}`: {source}")]
    InvalidId {
        value: String,
        #[source]
        source: uuid::Error,
    },
}

/// Sync progress of one cursor: the change timestamp of the last processed row and its id.
///
/// Rows are consumed in ascending `(changed_at, id)` order and a row is selected when it sorts
/// strictly after the watermark. Without an id only `changed_at` is compared, so every row sharing
/// that timestamp counts as processed. A watermark without an id orders before any watermark with
/// an id at the same instant.
///
/// The persisted form is an RFC 3339 timestamp optionally followed by `#<uuid>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    pub changed_at: DateTime<Utc>,
    pub id: Option<EntityId>,
}

impl Watermark {
    pub fn new(changed_at: DateTime<Utc>, id: EntityId) -> Self {
        Self {
            changed_at,
            id: Some(id),
        }
    }

    /// Creates a watermark that only carries a timestamp.
    pub fn at(changed_at: DateTime<Utc>) -> Self {
        Self {
            changed_at,
            id: None,
        }
    }

    /// The minimum watermark, which selects every row.
    pub fn sentinel() -> Self {
        let changed_at = DateTime::<Utc>::from_timestamp(SENTINEL_TIMESTAMP_SECS, 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Self::at(changed_at)
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }

    /// Returns `true` when a row with this cursor would be selected after `self`.
    pub fn precedes(&self, changed_at: DateTime<Utc>, id: EntityId) -> bool {
        match self.id {
            Some(watermark_id) => (changed_at, id) > (self.changed_at, watermark_id),
            None => changed_at > self.changed_at,
        }
    }

    pub fn to_cursor(&self) -> RowCursor {
        RowCursor {
            modified: self.changed_at,
            id: self.id,
        }
    }

    fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ParseWatermarkError> {
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
            return Ok(timestamp.with_timezone(&Utc));
        }

        for format in LEGACY_TIMESTAMP_FORMATS {
            if let Ok(timestamp) = DateTime::parse_from_str(value, format) {
                return Ok(timestamp.with_timezone(&Utc));
            }
        }

        NaiveDate::parse_from_str(value, LEGACY_DATE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|timestamp| timestamp.and_utc())
            .ok_or_else(|| ParseWatermarkError::InvalidTimestamp(value.to_owned()))
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.changed_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )?;
        if let Some(id) = self.id {
            write!(f, "{ID_SEPARATOR}{id}")?;
        }

        Ok(())
    }
}

impl FromStr for Watermark {
    type Err = ParseWatermarkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (timestamp, id) = match value.split_once(ID_SEPARATOR) {
            Some((timestamp, id)) => (timestamp, Some(id)),
            None => (value, None),
        };

        let changed_at = Self::parse_timestamp(timestamp)?;
        let id = id
            .map(|id| {
                id.parse::<EntityId>()
                    .map_err(|source| ParseWatermarkError::InvalidId {
                        value: id.to_owned(),
                        source,
                    })
            })
            .transpose()?;

        Ok(Self { changed_at, id })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn sentinel_is_eleventh_of_november_1111() {
        assert_eq!(
            Watermark::sentinel().to_string(),
            "1111-11-11T00:00:00Z"
        );
        assert!(Watermark::sentinel().is_sentinel());
    }

    #[test]
    fn persisted_form_round_trips_with_id() {
        let id = Uuid::new_v4();
        let watermark = Watermark::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(), id);

        let persisted = watermark.to_string();

        assert_eq!(persisted, format!("2024-05-01T12:30:00Z#{id}"));
        assert_eq!(persisted.parse::<Watermark>().unwrap(), watermark);
    }

    #[test]
    fn legacy_values_are_accepted() {
        let expected = Utc.with_ymd_and_hms(2021, 6, 16, 20, 14, 9).unwrap();

        let with_space = "2021-06-16 20:14:09.000000+00:00".parse::<Watermark>().unwrap();
        let date_only = "2021-06-16".parse::<Watermark>().unwrap();

        assert_eq!(with_space, Watermark::at(expected));
        assert_eq!(
            date_only.changed_at,
            Utc.with_ymd_and_hms(2021, 6, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            "not a date".parse::<Watermark>(),
            Err(ParseWatermarkError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            "2024-05-01T12:30:00Z#nope".parse::<Watermark>(),
            Err(ParseWatermarkError::InvalidId { .. })
        ));
    }

    #[test]
    fn precedes_breaks_ties_on_id() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        assert!(Watermark::new(at, low).precedes(at, high));
        assert!(!Watermark::new(at, high).precedes(at, low));
        assert!(!Watermark::at(at).precedes(at, high));
        assert!(Watermark::at(at).precedes(at + chrono::Duration::seconds(1), low));
    }

    #[test]
    fn ordering_follows_timestamp_then_id() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(Watermark::sentinel() < Watermark::at(at));
        assert!(Watermark::at(at) < Watermark::new(at, Uuid::from_u128(1)));
        assert!(Watermark::new(at, Uuid::from_u128(1)) < Watermark::new(at, Uuid::from_u128(2)));
    }
}
