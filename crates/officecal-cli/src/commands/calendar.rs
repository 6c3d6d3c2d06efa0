//! Calendar read commands. Output is pretty JSON on stdout.

use officecal_graph::{CalendarApi, TimeWindow};
use serde_json::json;

use super::print_json;
use crate::error::CliResult;

pub async fn me(api: &CalendarApi) -> CliResult<()> {
    print_json(&api.profile().await?)
}

pub async fn calendars(api: &CalendarApi) -> CliResult<()> {
    let calendars = api.list_calendars().await?;
    print_json(&json!({"calendars": calendars, "count": calendars.len()}))
}

pub async fn events(
    api: &CalendarApi,
    start: &str,
    end: &str,
    user: Option<&str>,
) -> CliResult<()> {
    let events = api.list_events(&TimeWindow::new(start, end), user).await?;
    print_json(&json!({"events": events, "count": events.len()}))
}

pub async fn rooms(api: &CalendarApi, building: Option<&str>) -> CliResult<()> {
    let rooms = api.list_rooms(building).await?;
    print_json(&json!({"rooms": rooms, "count": rooms.len()}))
}

/// GETs a raw path; with `all`, every page's items are printed as one array.
pub async fn get(api: &CalendarApi, path: &str, all: bool) -> CliResult<()> {
    if all {
        print_json(&api.client().get_all(path, &[]).await?)
    } else {
        print_json(&api.client().get(path, &[]).await?)
    }
}
