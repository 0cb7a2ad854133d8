//! Calendar tools and the providers behind them.
//!
//! Tools speak local wall-clock time in the configured zone; providers store
//! UTC instants. The Google provider talks to the Calendar v3 REST API with a
//! bearer token obtained elsewhere.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use roadmate_core::config::CalendarConfig;
use roadmate_core::error::{AgentError, Result};
use roadmate_core::schema::{FieldSpec, FieldType, InputSchema};
use roadmate_core::tool_registry::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Events overlapping `[from, to)`, ordered by start.
    async fn list_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CalendarEvent>>;

    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent>;
}

/// Process-local calendar.
#[derive(Default)]
pub struct InMemoryCalendar {
    events: RwLock<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalendarProvider for InMemoryCalendar {
    async fn list_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        let events = self.events.read().await;
        let mut found: Vec<CalendarEvent> = events
            .iter()
            .filter(|e| e.start < to && e.end > from)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start);
        Ok(found)
    }

    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent> {
        let created = CalendarEvent {
            id: uuid::Uuid::new_v4().to_string(),
            summary: event.summary,
            start: event.start,
            end: event.end,
            location: event.location,
        };
        self.events.write().await.push(created.clone());
        Ok(created)
    }
}

/// Google Calendar v3 over REST.
pub struct GoogleCalendar {
    client: reqwest::Client,
    events_url: Url,
    token: String,
    tz: Tz,
}

impl GoogleCalendar {
    pub fn new(config: &CalendarConfig, tz: Tz, timeout: Duration) -> Result<Self> {
        let token = config.resolved_access_token().ok_or_else(|| {
            AgentError::Config(format!(
                "Google calendar needs an access token (calendar.access_token or ${})",
                config.access_token_env
            ))
        })?;

        let mut events_url = Url::parse(&config.api_base)
            .map_err(|e| AgentError::Config(format!("invalid calendar api_base: {}", e)))?;
        events_url
            .path_segments_mut()
            .map_err(|_| AgentError::Config("calendar api_base cannot be a base URL".into()))?
            .pop_if_empty()
            .push("calendars")
            .push(&config.calendar_id)
            .push("events");

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Ok(Self {
            client,
            events_url,
            token,
            tz,
        })
    }

    fn to_event(&self, item: GoogleEvent) -> Result<CalendarEvent> {
        Ok(CalendarEvent {
            start: item.start.instant(self.tz)?,
            end: item.end.instant(self.tz)?,
            id: item.id,
            summary: item.summary.unwrap_or_else(|| "(untitled)".into()),
            location: item.location,
        })
    }

    async fn check(response: reqwest::Response, tool: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AgentError::tool_execution(
            tool,
            format!("calendar API returned HTTP {}: {}", status.as_u16(), body.trim()),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleEventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    summary: Option<String>,
    location: Option<String>,
    start: GoogleTime,
    end: GoogleTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTime {
    date_time: Option<DateTime<chrono::FixedOffset>>,
    /// All-day events carry a date only.
    date: Option<NaiveDate>,
}

impl GoogleTime {
    fn instant(&self, tz: Tz) -> Result<DateTime<Utc>> {
        if let Some(dt) = self.date_time {
            return Ok(dt.with_timezone(&Utc));
        }
        self.date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| AgentError::tool_execution("get_calendar_events", "event without a start or end time"))
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn list_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        tracing::debug!("Listing calendar events {} .. {}", from, to);
        let response = self
            .client
            .get(self.events_url.clone())
            .bearer_auth(&self.token)
            .query(&[
                ("timeMin", from.to_rfc3339()),
                ("timeMax", to.to_rfc3339()),
                ("singleEvents", "true".into()),
                ("orderBy", "startTime".into()),
            ])
            .send()
            .await
            .map_err(|e| AgentError::tool_execution("get_calendar_events", format!("Request failed: {}", e)))?;

        let list: GoogleEventList = Self::check(response, "get_calendar_events")
            .await?
            .json()
            .await
            .map_err(|e| AgentError::tool_execution("get_calendar_events", format!("Invalid response: {}", e)))?;

        list.items.into_iter().map(|item| self.to_event(item)).collect()
    }

    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent> {
        let tz = self.tz.name();
        let mut body = json!({
            "summary": event.summary,
            "start": { "dateTime": event.start.with_timezone(&self.tz).to_rfc3339(), "timeZone": tz },
            "end": { "dateTime": event.end.with_timezone(&self.tz).to_rfc3339(), "timeZone": tz },
        });
        if let Some(location) = &event.location {
            body["location"] = json!(location);
        }

        let response = self
            .client
            .post(self.events_url.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::tool_execution("create_calendar_event", format!("Request failed: {}", e)))?;

        let item: GoogleEvent = Self::check(response, "create_calendar_event")
            .await?
            .json()
            .await
            .map_err(|e| AgentError::tool_execution("create_calendar_event", format!("Invalid response: {}", e)))?;
        self.to_event(item)
    }
}

/// Parse a tool-supplied time. Offsets are honoured; bare local times are
/// read in `tz`.
pub(crate) fn parse_local_time(raw: &str, tz: Tz) -> std::result::Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| format!("'{}' is not an ISO-8601 date-time (YYYY-MM-DDTHH:MM:SS)", raw))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("'{}' does not exist in {}", raw, tz.name()))
}

pub struct GetCalendarEventsTool {
    provider: Arc<dyn CalendarProvider>,
    tz: Tz,
}

impl GetCalendarEventsTool {
    pub fn new(provider: Arc<dyn CalendarProvider>, tz: Tz) -> Self {
        Self { provider, tz }
    }
}

#[async_trait]
impl Tool for GetCalendarEventsTool {
    fn name(&self) -> &str {
        "get_calendar_events"
    }

    fn description(&self) -> &str {
        "List the driver's upcoming calendar events with time, title and location."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::optional("days_ahead", FieldType::Integer, "How many days ahead to look")
                .with_default(json!(7)),
        )
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            days_ahead: i64,
        }

        let args: Args = serde_json::from_value(args).map_err(|e| {
            AgentError::tool_execution("get_calendar_events", format!("Invalid arguments: {}", e))
        })?;
        if !(1..=60).contains(&args.days_ahead) {
            return Err(AgentError::tool_execution(
                "get_calendar_events",
                "days_ahead must be between 1 and 60",
            ));
        }

        let now = Utc::now();
        let events = self
            .provider
            .list_events(now, now + chrono::Duration::days(args.days_ahead))
            .await?;

        if events.is_empty() {
            return Ok(format!("No events in the next {} days.", args.days_ahead));
        }

        let mut out = format!("Upcoming events (next {} days):\n", args.days_ahead);
        for event in events {
            let start = event.start.with_timezone(&self.tz);
            let end = event.end.with_timezone(&self.tz);
            out.push_str(&format!(
                "- {} {}-{}: {}",
                start.format("%a %-d %b"),
                start.format("%H:%M"),
                end.format("%H:%M"),
                event.summary
            ));
            if let Some(location) = event.location {
                out.push_str(&format!(" @ {}", location));
            }
            out.push('\n');
        }
        Ok(out)
    }
}

pub struct CreateCalendarEventTool {
    provider: Arc<dyn CalendarProvider>,
    tz: Tz,
}

impl CreateCalendarEventTool {
    pub fn new(provider: Arc<dyn CalendarProvider>, tz: Tz) -> Self {
        Self { provider, tz }
    }
}

#[async_trait]
impl Tool for CreateCalendarEventTool {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn description(&self) -> &str {
        "Add an event to the driver's calendar. Times are local ISO-8601 (YYYY-MM-DDTHH:MM:SS); \
         the event lasts one hour unless end_time is given."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::required("summary", FieldType::String, "Event title"))
            .field(FieldSpec::required("start_time", FieldType::String, "Local start time"))
            .field(FieldSpec::optional("end_time", FieldType::String, "Local end time"))
            .field(FieldSpec::optional("location", FieldType::String, "Where it happens"))
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            summary: String,
            start_time: String,
            end_time: Option<String>,
            location: Option<String>,
        }

        let tool = "create_calendar_event";
        let args: Args = serde_json::from_value(args)
            .map_err(|e| AgentError::tool_execution(tool, format!("Invalid arguments: {}", e)))?;

        let start = parse_local_time(&args.start_time, self.tz)
            .map_err(|e| AgentError::tool_execution(tool, e))?;
        let end = match &args.end_time {
            Some(raw) => parse_local_time(raw, self.tz).map_err(|e| AgentError::tool_execution(tool, e))?,
            None => start + chrono::Duration::hours(1),
        };
        if end <= start {
            return Err(AgentError::tool_execution(tool, "end_time must be after start_time"));
        }

        let created = self
            .provider
            .create_event(NewEvent {
                summary: args.summary,
                start,
                end,
                location: args.location.filter(|l| !l.trim().is_empty()),
            })
            .await?;

        let local_start = created.start.with_timezone(&self.tz);
        let mut out = format!(
            "Created '{}' on {} from {} to {}",
            created.summary,
            local_start.format("%A, %B %-d, %Y"),
            local_start.format("%H:%M"),
            created.end.with_timezone(&self.tz).format("%H:%M")
        );
        if let Some(location) = &created.location {
            out.push_str(&format!(" at {}", location));
        }
        out.push('.');
        Ok(out)
    }
}
