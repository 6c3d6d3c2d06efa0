//! Microsoft Graph boundary layer for officecal.
//!
//! This crate makes the Graph calendar API behave like a dependable local
//! service:
//!
//! - [`CredentialStore`]: one cached credential record on disk, written
//!   atomically and readable by the owner only
//! - [`Authenticator`]: cached tokens, silent refresh, and the device-code
//!   sign-in flow
//! - [`GraphClient`]: authenticated requests with retry, pagination, and
//!   error normalization into [`GraphError`]
//! - [`CalendarApi`]: calendar operations built on the client
//!
//! # Example
//!
//! ```no_run
//! use officecal_graph::{GraphClient, GraphConfig};
//!
//! # async fn run() -> officecal_graph::GraphResult<()> {
//! let client = GraphClient::new(GraphConfig::new("client-id", "organizations"))?;
//! let events = client.get_all("/me/events", &[("$top", "50")]).await?;
//! println!("{} events", events.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod calendar;
pub mod client;
pub mod config;
pub mod http;
pub mod normalize;
pub mod retry;
pub mod store;

#[cfg(test)]
mod test_support;

pub use auth::{AuthStatus, Authenticator};
pub use calendar::{
    CalendarApi, EventPatch, EventTime, MeetingTimeQuery, NewEvent, ScheduleQuery, TimeWindow,
};
pub use client::{GraphClient, PageStream, RequestDescriptor};
pub use config::GraphConfig;
pub use http::{HttpBackend, ReqwestBackend};
pub use retry::RetryPolicy;
pub use store::{CredentialRecord, CredentialStore};

pub use officecal_core::{
    AuthErrorReason, Classification, DeviceCodeHandle, ErrorKind, GraphError, GraphResult,
};
