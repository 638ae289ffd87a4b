use serde::{Deserialize, Serialize};
use time::{
    format_description::FormatItem, macros::format_description, Date, OffsetDateTime, Time,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::repo_types::{Event, NewEvent};

// Wire formats used by the mobile client: "2025-02-02" and "14:00".
const DATE_FMT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FMT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub range_start: Option<String>,
    pub range_end: Option<String>,
    pub address: Option<String>,
    pub details: Option<String>,
    pub photo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub title: String,
    pub date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub range_start: Option<String>,
    pub range_end: Option<String>,
    pub address: Option<String>,
    pub details: Option<String>,
    pub photo: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// List shape the client expects: `{ "events": [...] }`.
#[derive(Debug, Serialize)]
pub struct EventsListResponse {
    pub events: Vec<EventResponse>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}

fn parse_date(field: &str, value: &str) -> Result<Date, ApiError> {
    Date::parse(value, DATE_FMT)
        .map_err(|_| ApiError::Validation(format!("{field} must be YYYY-MM-DD")))
}

fn parse_time(field: &str, value: &str) -> Result<Time, ApiError> {
    Time::parse(value, TIME_FMT)
        .map_err(|_| ApiError::Validation(format!("{field} must be HH:MM")))
}

fn format_date(date: Date) -> String {
    date.format(DATE_FMT).expect("static date format")
}

fn format_time(time: Time) -> String {
    time.format(TIME_FMT).expect("static time format")
}

impl CreateEventRequest {
    /// Parse the wire strings into typed values and enforce the field
    /// invariants shared by create and replace.
    pub fn validate(self) -> Result<NewEvent, ApiError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::Validation("Title is required".into()));
        }

        let date = parse_date("date", &self.date)?;
        let start_time = self
            .start_time
            .as_deref()
            .map(|v| parse_time("start_time", v))
            .transpose()?;
        let end_time = self
            .end_time
            .as_deref()
            .map(|v| parse_time("end_time", v))
            .transpose()?;
        let range_start = self
            .range_start
            .as_deref()
            .map(|v| parse_date("range_start", v))
            .transpose()?;
        let range_end = self
            .range_end
            .as_deref()
            .map(|v| parse_date("range_end", v))
            .transpose()?;

        match (range_start, range_end) {
            (Some(start), Some(end)) if end < start => {
                return Err(ApiError::Validation(
                    "range_end must not precede range_start".into(),
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ApiError::Validation(
                    "range_start and range_end must be supplied together".into(),
                ));
            }
            _ => {}
        }

        Ok(NewEvent {
            title,
            date,
            start_time,
            end_time,
            range_start,
            range_end,
            address: self.address,
            details: self.details,
            photo: self.photo,
        })
    }
}

impl From<Event> for EventResponse {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            title: e.title,
            date: format_date(e.date),
            start_time: e.start_time.map(format_time),
            end_time: e.end_time.map(format_time),
            range_start: e.range_start.map(format_date),
            range_end: e.range_end.map(format_date),
            address: e.address,
            details: e.details,
            photo: e.photo,
            created_at: e.created_at,
        }
    }
}
