//! Page context: the volatile runtime state events are enriched from.

use crate::Error;
use reqwest::Url;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

/// A navigation timing record, in milliseconds relative to navigation start.
///
/// Mirrors the `PerformanceNavigationTiming` entry of the page. A zero
/// `secure_connection_start` means no TLS negotiation took place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NavigationTiming {
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub secure_connection_start: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub dom_content_loaded_event_end: f64,
    pub dom_complete: f64,
    pub load_event_start: f64,
    pub transfer_size: f64,
}

/// Port for reading page context.
///
/// Every method is read independently; one failing does not affect the
/// others. `Ok(None)` means the value does not exist on this page, `Err`
/// means it could not be read.
pub trait Environment: Send + Sync + Debug {
    /// The current document location.
    fn location(&self) -> Result<Url, Error>;

    /// The referring document URL, as reported by the page.
    fn referrer(&self) -> Result<Option<String>, Error>;

    fn user_agent(&self) -> Result<Option<String>, Error>;

    fn language(&self) -> Result<Option<String>, Error>;

    /// Effective connection type, e.g. `4g`.
    fn connection_type(&self) -> Result<Option<String>, Error>;

    /// Viewport width in CSS pixels.
    fn screen_width(&self) -> Result<Option<i64>, Error>;

    /// IANA time zone name.
    fn timezone(&self) -> Result<Option<String>, Error>;

    /// The navigation timing entry for the current document.
    fn navigation_timing(&self) -> Result<Option<NavigationTiming>, Error>;
}

#[derive(Debug, Clone, Default)]
struct PageState {
    location: String,
    referrer: Option<String>,
    user_agent: Option<String>,
    language: Option<String>,
    connection_type: Option<String>,
    screen_width: Option<i64>,
    timezone: Option<String>,
    navigation_timing: Option<NavigationTiming>,
}

/// [`Environment`] backed by plain values set by the host.
///
/// The location can change at runtime to follow client-side navigation.
#[derive(Debug, Default)]
pub struct StaticEnvironment {
    state: Mutex<PageState>,
}

impl StaticEnvironment {
    /// Create a page at `location`.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(PageState {
                location: location.into(),
                ..PageState::default()
            }),
        }
    }

    fn update(&self, f: impl FnOnce(&mut PageState)) {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn read<T>(&self, f: impl FnOnce(&PageState) -> T) -> T {
        f(&self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        self.update(|s| s.referrer = Some(referrer.into()));
        self
    }

    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.update(|s| s.user_agent = Some(user_agent.into()));
        self
    }

    pub fn with_language(self, language: impl Into<String>) -> Self {
        self.update(|s| s.language = Some(language.into()));
        self
    }

    pub fn with_connection_type(self, connection_type: impl Into<String>) -> Self {
        self.update(|s| s.connection_type = Some(connection_type.into()));
        self
    }

    pub fn with_screen_width(self, width: i64) -> Self {
        self.update(|s| s.screen_width = Some(width));
        self
    }

    pub fn with_timezone(self, timezone: impl Into<String>) -> Self {
        self.update(|s| s.timezone = Some(timezone.into()));
        self
    }

    pub fn with_navigation_timing(self, timing: NavigationTiming) -> Self {
        self.update(|s| s.navigation_timing = Some(timing));
        self
    }

    /// Move the page to a new location.
    pub fn set_location(&self, location: impl Into<String>) {
        self.update(|s| s.location = location.into());
    }
}

impl Environment for StaticEnvironment {
    fn location(&self) -> Result<Url, Error> {
        let location = self.read(|s| s.location.clone());
        Url::parse(&location)
            .map_err(|e| Error::Environment(format!("invalid location {:?}: {}", location, e)))
    }

    fn referrer(&self) -> Result<Option<String>, Error> {
        Ok(self.read(|s| s.referrer.clone()))
    }

    fn user_agent(&self) -> Result<Option<String>, Error> {
        Ok(self.read(|s| s.user_agent.clone()))
    }

    fn language(&self) -> Result<Option<String>, Error> {
        Ok(self.read(|s| s.language.clone()))
    }

    fn connection_type(&self) -> Result<Option<String>, Error> {
        Ok(self.read(|s| s.connection_type.clone()))
    }

    fn screen_width(&self) -> Result<Option<i64>, Error> {
        Ok(self.read(|s| s.screen_width))
    }

    fn timezone(&self) -> Result<Option<String>, Error> {
        Ok(self.read(|s| s.timezone.clone()))
    }

    fn navigation_timing(&self) -> Result<Option<NavigationTiming>, Error> {
        Ok(self.read(|s| s.navigation_timing))
    }
}
