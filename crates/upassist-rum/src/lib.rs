//! Event-collection core of the upassist Real User Monitoring client.
//!
//! Hosts talk to a [`Rum`] client through three commands: `config`, `track`
//! and `captureError`. Events are enriched with identity, page, attribution
//! and load-timing data, then handed to a [`Transport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use upassist_rum::{ConfigPatch, Dimensions, Readiness, Rum, StaticEnvironment};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), upassist_rum::Error> {
//!     let readiness = Readiness::pending();
//!     let rum = Rum::builder()
//!         .environment(Arc::new(StaticEnvironment::new("https://shop.example.com/")))
//!         .readiness(readiness.clone())
//!         .build()?;
//!
//!     rum.config(ConfigPatch::new().client_key("pk_xxx"));
//!     rum.init();
//!
//!     // The initial Pageview is sent once the page reports it has loaded.
//!     readiness.mark_loaded();
//!     Ok(())
//! }
//! ```

mod client;
mod clock;
mod command;
mod config;
mod enrich;
mod environment;
mod error;
mod flags;
mod identity;
mod listeners;
mod queue;
mod schedule;
mod storage;
mod throttle;
mod transport;
mod types;

pub use client::{Rum, ERROR_EVENT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::Command;
pub use config::{
    Config, ConfigPatch, ConfigStore, RumBuilder, TrackMode, DEFAULT_API_HOST,
    DEFAULT_ERROR_THROTTLE_WINDOW, DEFAULT_SESSION_TTL, DEFAULT_TIMEOUT,
};
pub use enrich::PAGEVIEW;
pub use environment::{Environment, NavigationTiming, StaticEnvironment};
pub use error::Error;
pub use flags::RuntimeFlags;
pub use identity::{IdentityManager, CLIENT_COOKIE, SESSION_COOKIE};
pub use listeners::{
    ErrorHandler, ErrorSource, MetricHandler, Navigation, RouteHandler, VitalsSource, WebVital,
    WEB_VITAL,
};
pub use queue::CommandQueue;
pub use schedule::{Readiness, Scheduler};
pub use storage::{KeyValueStore, MemoryStore};
pub use throttle::Throttle;
pub use transport::{HttpTransport, Transport};
pub use types::{Dimensions, ErrorDetail, ErrorEvent, Event, FieldValue};

pub use async_trait::async_trait;
