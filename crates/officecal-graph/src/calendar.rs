//! Calendar resource operations.
//!
//! Thin, domain-shaped calls over [`GraphClient`]. Results are returned as
//! decoded JSON; shaping them for display is left to the caller.

use std::future::Future;

use officecal_core::{AuthErrorReason, Classification, GraphError, GraphResult};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::client::GraphClient;

/// Event properties requested by listings.
const EVENT_FIELDS: &str = "id,subject,start,end,location,isOnlineMeeting,onlineMeetingUrl,\
                            organizer,attendees,bodyPreview,isCancelled,showAs,isAllDay";

/// A local date-time with its time zone, as Graph's `dateTimeTimeZone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    /// ISO 8601 local date-time, e.g. `2026-02-17T09:00:00`.
    pub date_time: String,
    /// IANA or Windows time zone name.
    pub time_zone: String,
}

impl EventTime {
    pub fn new(date_time: impl Into<String>, time_zone: impl Into<String>) -> Self {
        Self {
            date_time: date_time.into(),
            time_zone: time_zone.into(),
        }
    }
}

/// A calendar view range. Both ends are ISO 8601 date-times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// An event to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub subject: String,
    pub start: EventTime,
    pub end: EventTime,
    pub attendees: Vec<String>,
    pub body: Option<String>,
    pub location: Option<String>,
    pub is_online_meeting: bool,
}

impl NewEvent {
    /// Creates an online meeting with no attendees.
    pub fn new(subject: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Self {
            subject: subject.into(),
            start,
            end,
            attendees: Vec::new(),
            body: None,
            location: None,
            is_online_meeting: true,
        }
    }

    pub fn with_attendees(mut self, attendees: Vec<String>) -> Self {
        self.attendees = attendees;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn online(mut self, online: bool) -> Self {
        self.is_online_meeting = online;
        self
    }

    /// Request body for `POST /me/calendar/events`.
    pub fn to_graph(&self) -> Value {
        let mut event = json!({
            "subject": self.subject,
            "start": self.start,
            "end": self.end,
            "isOnlineMeeting": self.is_online_meeting,
        });
        if self.is_online_meeting {
            event["onlineMeetingProvider"] = json!("teamsForBusiness");
        }
        if !self.attendees.is_empty() {
            event["attendees"] = attendee_list(&self.attendees);
        }
        if let Some(ref body) = self.body {
            event["body"] = json!({"contentType": "text", "content": body});
        }
        if let Some(ref location) = self.location {
            event["location"] = json!({"displayName": location});
        }
        event
    }
}

/// Changes to an existing event. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub subject: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    /// Replaces the whole attendee list.
    pub attendees: Option<Vec<String>>,
    pub body: Option<String>,
    pub location: Option<String>,
    pub is_online_meeting: Option<bool>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Request body for `PATCH /me/events/{id}`.
    pub fn to_graph(&self) -> Value {
        let mut patch = json!({});
        if let Some(ref subject) = self.subject {
            patch["subject"] = json!(subject);
        }
        if let Some(ref start) = self.start {
            patch["start"] = json!(start);
        }
        if let Some(ref end) = self.end {
            patch["end"] = json!(end);
        }
        if let Some(ref attendees) = self.attendees {
            patch["attendees"] = attendee_list(attendees);
        }
        if let Some(ref body) = self.body {
            patch["body"] = json!({"contentType": "text", "content": body});
        }
        if let Some(ref location) = self.location {
            patch["location"] = json!({"displayName": location});
        }
        if let Some(online) = self.is_online_meeting {
            patch["isOnlineMeeting"] = json!(online);
            if online {
                patch["onlineMeetingProvider"] = json!("teamsForBusiness");
            }
        }
        patch
    }
}

/// Free/busy lookup for one or more mailboxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleQuery {
    pub schedules: Vec<String>,
    pub start_time: EventTime,
    pub end_time: EventTime,
    /// Slot size in minutes.
    pub availability_view_interval: u32,
}

impl ScheduleQuery {
    pub fn new(schedules: Vec<String>, start: EventTime, end: EventTime) -> Self {
        Self {
            schedules,
            start_time: start,
            end_time: end,
            availability_view_interval: 30,
        }
    }
}

/// Meeting time suggestion request.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingTimeQuery {
    pub attendees: Vec<String>,
    pub duration_minutes: u32,
    pub max_candidates: u32,
    /// Optional search window; Graph picks one when absent.
    pub window: Option<(EventTime, EventTime)>,
}

impl MeetingTimeQuery {
    pub fn new(attendees: Vec<String>, duration_minutes: u32) -> Self {
        Self {
            attendees,
            duration_minutes,
            max_candidates: 5,
            window: None,
        }
    }

    /// Request body for `POST /me/findMeetingTimes`.
    pub fn to_graph(&self) -> Value {
        let mut body = json!({
            "attendees": attendee_list(&self.attendees),
            "meetingDuration": format!("PT{}M", self.duration_minutes),
            "maxCandidates": self.max_candidates,
            "returnSuggestionReasons": true,
        });
        if let Some((ref start, ref end)) = self.window {
            body["timeConstraint"] = json!({
                "timeslots": [{"start": start, "end": end}]
            });
        }
        body
    }
}

fn attendee_list(addresses: &[String]) -> Value {
    Value::Array(
        addresses
            .iter()
            .map(|address| json!({"emailAddress": {"address": address}, "type": "required"}))
            .collect(),
    )
}

fn event_path(id: &str) -> String {
    format!("/me/events/{}", urlencoding::encode(id))
}

/// Calendar operations for the signed-in user.
#[derive(Debug)]
pub struct CalendarApi {
    client: GraphClient,
}

impl CalendarApi {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Returns the underlying transport client.
    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    /// Display name, email and (for work/school accounts) mailbox time zone.
    pub async fn profile(&self) -> GraphResult<Value> {
        let me = self
            .with_reauth(|| {
                self.client
                    .get("/me", &[("$select", "displayName,mail,userPrincipalName")])
            })
            .await?;

        // Personal accounts have no mailbox settings and answer 403.
        let timezone = match self
            .client
            .get("/me/mailboxSettings", &[("$select", "timeZone")])
            .await
        {
            Ok(settings) => settings.get("timeZone").cloned().unwrap_or(Value::Null),
            Err(e) if e.classification() == Classification::Permanent => {
                debug!(error = %e, "mailbox settings unavailable");
                Value::Null
            }
            Err(e) => return Err(e),
        };

        let email = me
            .get("mail")
            .filter(|v| !v.is_null())
            .or_else(|| me.get("userPrincipalName"))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(json!({
            "displayName": me.get("displayName").cloned().unwrap_or(Value::Null),
            "email": email,
            "timezone": timezone,
        }))
    }

    /// Calendars the user owns or has been shared.
    pub async fn list_calendars(&self) -> GraphResult<Vec<Value>> {
        self.with_reauth(|| self.client.get_all("/me/calendars", &[("$top", "50")]))
            .await
    }

    /// Events in `window`, from the user's calendar or a delegate's.
    pub async fn list_events(
        &self,
        window: &TimeWindow,
        delegate: Option<&str>,
    ) -> GraphResult<Vec<Value>> {
        let path = match delegate {
            Some(user) => format!("/users/{}/calendarview", urlencoding::encode(user)),
            None => "/me/calendarview".to_string(),
        };
        let params = [
            ("startDateTime", window.start.as_str()),
            ("endDateTime", window.end.as_str()),
            ("$orderby", "start/dateTime"),
            ("$top", "50"),
            ("$select", EVENT_FIELDS),
        ];
        self.with_reauth(|| self.client.get_all(&path, &params))
            .await
    }

    pub async fn get_event(&self, id: &str) -> GraphResult<Value> {
        let path = event_path(id);
        self.with_reauth(|| self.client.get(&path, &[])).await
    }

    /// Creates an event on the default calendar and returns it.
    pub async fn create_event(&self, event: &NewEvent) -> GraphResult<Value> {
        let body = event.to_graph();
        self.with_reauth(|| self.client.post("/me/calendar/events", body.clone()))
            .await
    }

    /// Applies `patch` to an event and returns the updated event.
    pub async fn update_event(&self, id: &str, patch: &EventPatch) -> GraphResult<Value> {
        if patch.is_empty() {
            return Err(GraphError::configuration("no fields to update"));
        }
        let path = event_path(id);
        let body = patch.to_graph();
        self.with_reauth(|| self.client.patch(&path, body.clone()))
            .await
    }

    /// Cancels an event.
    ///
    /// With a comment, attendees are sent a cancellation notice through
    /// `/cancel`; otherwise the event is deleted.
    pub async fn cancel_event(&self, id: &str, comment: Option<&str>) -> GraphResult<()> {
        let path = event_path(id);
        match comment.filter(|c| !c.trim().is_empty()) {
            Some(comment) => {
                let cancel = format!("{}/cancel", path);
                let body = json!({"comment": comment});
                self.with_reauth(|| self.client.post(&cancel, body.clone()))
                    .await
                    .map(|_| ())
            }
            None => self.with_reauth(|| self.client.delete(&path)).await,
        }
    }

    /// Free/busy information, one entry per requested mailbox.
    pub async fn get_schedule(&self, query: &ScheduleQuery) -> GraphResult<Vec<Value>> {
        let body = serde_json::to_value(query).map_err(|e| {
            GraphError::configuration(format!("unencodable schedule query: {}", e))
        })?;
        let response = self
            .with_reauth(|| self.client.post("/me/calendar/getSchedule", body.clone()))
            .await?;
        match response.get("value") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(GraphError::invalid_response(
                "getSchedule response has no value array",
            )),
        }
    }

    /// Suggested meeting slots.
    pub async fn find_meeting_times(&self, query: &MeetingTimeQuery) -> GraphResult<Value> {
        let body = query.to_graph();
        self.with_reauth(|| self.client.post("/me/findMeetingTimes", body.clone()))
            .await
    }

    /// Meeting rooms, optionally only those whose building contains `building`
    /// (case-insensitive).
    pub async fn list_rooms(&self, building: Option<&str>) -> GraphResult<Vec<Value>> {
        let rooms = self
            .with_reauth(|| {
                self.client
                    .get_all("/places/microsoft.graph.room", &[("$top", "100")])
            })
            .await?;

        let Some(building) = building.map(str::to_lowercase) else {
            return Ok(rooms);
        };
        Ok(rooms
            .into_iter()
            .filter(|room| {
                room.get("building")
                    .and_then(Value::as_str)
                    .is_some_and(|b| b.to_lowercase().contains(&building))
            })
            .collect())
    }

    /// Runs `op`, and once more after a forced refresh if the remote rejected
    /// the access token.
    async fn with_reauth<T, F, Fut>(&self, op: F) -> GraphResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GraphResult<T>>,
    {
        match op().await {
            Err(e) if e.auth_reason() == Some(AuthErrorReason::TokenRejected) => {
                warn!(request_id = ?e.request_id(), "access token rejected, refreshing once");
                self.client.authenticator().force_refresh().await?;
                op().await
            }
            other => other,
        }
    }
}
