//! Global listeners: uncaught errors, Core Web Vitals, client-side navigation.
//!
//! The page-side sources are collaborators behind small ports. Registration
//! on each is one-shot per page lifetime, guarded by [`RuntimeFlags`].
//!
//! [`RuntimeFlags`]: crate::RuntimeFlags

use crate::client::Rum;
use crate::config::TrackMode;
use crate::enrich::PAGEVIEW;
use crate::types::{Dimensions, ErrorEvent};
use std::fmt::Debug;
use std::sync::PoisonError;
use tracing::{debug, info};

/// Name of the event carrying a Core Web Vitals measurement.
pub const WEB_VITAL: &str = "WebVital";

/// Callback for uncaught errors.
pub type ErrorHandler = Box<dyn Fn(ErrorEvent) + Send + Sync>;

/// Callback for a metric measurement.
pub type MetricHandler = Box<dyn Fn(f64) + Send + Sync>;

/// Callback for a client-side route change, given the new path.
pub type RouteHandler = Box<dyn Fn(String) + Send + Sync>;

/// Source of uncaught page errors.
pub trait ErrorSource: Send + Sync + Debug {
    fn on_error(&self, handler: ErrorHandler);
}

/// Core Web Vitals metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebVital {
    /// Cumulative layout shift.
    Cls,
    /// First input delay.
    Fid,
    /// Largest contentful paint.
    Lcp,
}

impl WebVital {
    pub const ALL: [WebVital; 3] = [WebVital::Cls, WebVital::Fid, WebVital::Lcp];

    /// The event field a measurement is reported under.
    pub fn dimension(self) -> &'static str {
        match self {
            WebVital::Cls => "web_vital_cls",
            WebVital::Fid => "web_vital_fid",
            WebVital::Lcp => "web_vital_lcp",
        }
    }
}

/// Source of Core Web Vitals measurements.
///
/// A registered handler may fire any number of times.
pub trait VitalsSource: Send + Sync + Debug {
    fn observe(&self, metric: WebVital, handler: MetricHandler);
}

/// Client-side navigation interception.
pub trait Navigation: Send + Sync + Debug {
    /// Start reporting route changes to `handler`.
    fn intercept(&self, handler: RouteHandler);
}

impl Rum {
    /// Capture uncaught errors from the attached error source. No-op after
    /// the first call.
    pub fn listen_for_errors(&self) {
        if !self.inner.flags.mark_listening_for_errors() {
            return;
        }
        let Some(source) = self.inner.error_source.as_ref() else {
            debug!("no error source attached");
            return;
        };

        let rum = self.downgrade();
        source.on_error(Box::new(move |event| {
            if let Some(rum) = rum.upgrade() {
                rum.capture_error(event, Dimensions::new());
            }
        }));
        info!("listening for errors");
    }

    /// Report Core Web Vitals from the attached source. No-op after the
    /// first call.
    pub fn listen_for_core_web_vitals(&self) {
        if !self.inner.flags.mark_listening_for_core_web_vitals() {
            return;
        }
        let Some(source) = self.inner.vitals_source.as_ref() else {
            debug!("no vitals source attached");
            return;
        };

        for metric in WebVital::ALL {
            let rum = self.downgrade();
            source.observe(
                metric,
                Box::new(move |value| {
                    if let Some(rum) = rum.upgrade() {
                        rum.track(WEB_VITAL, Dimensions::new().with(metric.dimension(), value));
                    }
                }),
            );
        }
        info!("listening for Core Web Vitals");
    }

    pub(crate) fn patch_history(&self) {
        if !self.inner.flags.mark_history_patched() {
            return;
        }
        let Some(navigation) = self.inner.navigation.as_ref() else {
            debug!("no navigation interceptor attached");
            return;
        };

        if let Ok(location) = self.inner.environment.location() {
            *self
                .inner
                .previous_path
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(location.path().to_string());
        }
        let rum = self.downgrade();
        navigation.intercept(Box::new(move |path| {
            if let Some(rum) = rum.upgrade() {
                rum.route_changed(path);
            }
        }));
        debug!("following client-side navigation");
    }

    /// Track a page view for a client-side route change to a new path.
    pub fn route_changed(&self, path: String) {
        if self.config_snapshot().track_mode() != TrackMode::History {
            return;
        }
        {
            let mut previous = self
                .inner
                .previous_path
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if previous.as_deref() == Some(path.as_str()) {
                return;
            }
            debug!(from = ?previous, to = %path, "route changed");
            *previous = Some(path);
        }
        self.track(PAGEVIEW, Dimensions::new());
    }
}
