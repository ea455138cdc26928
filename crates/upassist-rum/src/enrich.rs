//! Event enrichment.
//!
//! An event is built from layers applied in a fixed order, later layers
//! overwriting earlier ones:
//!
//! 1. base fields from config, the caller, identity, and page context
//! 2. UTM attribution from the query string
//! 3. page-load timing, on the first `Pageview` only
//! 4. caller overrides

use crate::config::Config;
use crate::environment::{Environment, NavigationTiming};
use crate::flags::RuntimeFlags;
use crate::identity::IdentityManager;
use crate::types::{Dimensions, Event, FieldValue};
use crate::Error;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use tracing::warn;

/// Name of the page view event.
pub const PAGEVIEW: &str = "Pageview";

lazy_static! {
    static ref UTM_PATTERNS: Vec<(&'static str, Regex)> = [
        ("utm_source", r"[?&](ref|source|utm_source)=([^?&]+)"),
        ("utm_campaign", r"[?&](utm_campaign)=([^?&]+)"),
        ("utm_medium", r"[?&](utm_medium)=([^?&]+)"),
        ("utm_content", r"[?&](utm_content)=([^?&]+)"),
        ("utm_term", r"[?&](utm_term)=([^?&]+)"),
    ]
    .into_iter()
    .map(|(field, pattern)| (field, Regex::new(pattern).expect("UTM pattern is valid")))
    .collect();
}

type Supplier<'a> = (
    &'static str,
    Box<dyn FnOnce() -> Result<Option<FieldValue>, Error> + 'a>,
);

fn supplier<'a>(
    field: &'static str,
    supply: impl FnOnce() -> Result<Option<FieldValue>, Error> + 'a,
) -> Supplier<'a> {
    (field, Box::new(supply))
}

/// Run every supplier and keep the values that came back.
///
/// A supplier that fails or has nothing leaves its field out; the others
/// are unaffected.
fn collect_present(event: &mut Event, suppliers: Vec<Supplier<'_>>) {
    for (field, supply) in suppliers {
        if let Ok(Some(value)) = supply() {
            event.insert(field, value);
        }
    }
}

fn text(value: Result<Option<String>, Error>) -> Result<Option<FieldValue>, Error> {
    value.map(|v| v.map(FieldValue::Text))
}

/// Builds finished events from the current page state.
pub(crate) struct Enricher<'a> {
    pub config: &'a Config,
    pub environment: &'a dyn Environment,
    pub identity: &'a IdentityManager,
    pub flags: &'a RuntimeFlags,
}

impl<'a> Enricher<'a> {
    pub fn collect(&self, event_name: &str, overrides: &Dimensions) -> Event {
        let env = self.environment;
        let config = self.config;
        let location = env.location().ok();
        let location = location.as_ref();

        let mut event = Event::new();
        collect_present(
            &mut event,
            vec![
                supplier("client_key", || Ok(config.client_key.clone().map(FieldValue::Text))),
                supplier("environment", || Ok(config.environment.clone().map(FieldValue::Text))),
                supplier("event_name", || Ok(Some(event_name.into()))),
                supplier("user_agent", || text(env.user_agent())),
                supplier("url", || Ok(location.map(|l| page_url(l, config).into()))),
                supplier("referrer", || text(referrer(env, location))),
                supplier("language", || text(env.language())),
                supplier("connection_type", || text(env.connection_type())),
                supplier("screen_width", || env.screen_width().map(|w| w.map(FieldValue::Integer))),
                supplier("timezone", || text(env.timezone())),
                supplier("session_id", || self.identity.session_id().map(|id| Some(id.into()))),
                supplier("client_id", || self.identity.client_id().map(|id| Some(id.into()))),
            ],
        );

        if let Some(search) = location.and_then(Url::query) {
            event.extend(&utm_params(&format!("?{}", search)));
        }
        event.extend(&self.page_load_timings(event_name));
        event.extend(overrides);
        event
    }

    fn page_load_timings(&self, event_name: &str) -> Event {
        // at most one extraction per page lifetime, whatever its outcome
        if event_name != PAGEVIEW || !self.flags.mark_initial_pageload_sent() {
            return Event::new();
        }
        match self.environment.navigation_timing() {
            Ok(Some(entry)) => timing_fields(&entry),
            Ok(None) => Event::new(),
            Err(e) => {
                warn!(error = %e, "error while loading performance metrics");
                Event::new()
            }
        }
    }
}

/// Protocol, host and path, plus the allow-listed query parameters and,
/// if enabled, the fragment.
pub(crate) fn page_url(location: &Url, config: &Config) -> String {
    let mut url = format!(
        "{}://{}{}",
        location.scheme(),
        location.host_str().unwrap_or_default(),
        location.path()
    );

    let query: Vec<String> = config
        .include_url_query_params
        .iter()
        .filter_map(|param| {
            location
                .query_pairs()
                .find(|(key, _)| key == param)
                .map(|(_, value)| {
                    if value.is_empty() {
                        param.clone()
                    } else {
                        format!("{}={}", param, value)
                    }
                })
        })
        .collect();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }

    if config.include_url_fragment {
        if let Some(fragment) = location.fragment().filter(|f| !f.is_empty()) {
            url.push('#');
            url.push_str(fragment);
        }
    }
    url
}

fn referrer(env: &dyn Environment, location: Option<&Url>) -> Result<Option<String>, Error> {
    let Some(raw) = env.referrer()?.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let location = location.ok_or_else(|| Error::Environment("location unavailable".into()))?;
    external_referrer(&raw, location)
}

/// The referrer reduced to protocol, host and path, or `None` when it points
/// at the current host.
pub(crate) fn external_referrer(raw: &str, location: &Url) -> Result<Option<String>, Error> {
    let parsed =
        Url::parse(raw).map_err(|e| Error::Environment(format!("invalid referrer: {}", e)))?;
    let host = parsed.host_str().unwrap_or_default();

    if host.eq_ignore_ascii_case(location.host_str().unwrap_or_default()) {
        return Ok(None);
    }
    Ok(Some(format!("{}://{}{}", parsed.scheme(), host, parsed.path())))
}

/// UTM fields matched against a raw `?a=b&c=d` query string.
pub(crate) fn utm_params(search: &str) -> Event {
    let mut fields = Event::new();
    for (field, pattern) in UTM_PATTERNS.iter() {
        let value = pattern
            .captures(search)
            .and_then(|c| c.get(2))
            .map(|m| FieldValue::Text(m.as_str().to_string()));
        fields.set(*field, value);
    }
    fields
}

fn timing_fields(entry: &NavigationTiming) -> Event {
    let ssl = (entry.secure_connection_start > 0.0)
        .then(|| entry.request_start - entry.secure_connection_start);

    let raw = [
        ("page_load_dns", Some(entry.domain_lookup_end - entry.domain_lookup_start)),
        ("page_load_connect", Some(entry.connect_end - entry.connect_start)),
        ("page_load_ssl", ssl),
        ("page_load_ttfb", Some(entry.response_start - entry.request_start)),
        ("page_load_download", Some(entry.response_end - entry.response_start)),
        (
            "page_load_dom_content_loaded",
            Some(entry.dom_content_loaded_event_end - entry.response_end),
        ),
        ("page_load_render", Some(entry.dom_complete - entry.dom_content_loaded_event_end)),
        ("page_load_total", Some(entry.load_event_start)),
        ("page_load_transfer_size", Some(entry.transfer_size)),
    ];

    let mut fields = Event::new();
    for (field, value) in raw {
        fields.set(field, value.and_then(as_positive_int).map(FieldValue::Integer));
    }
    fields
}

/// Round up to an integer; zero, negative and non-finite values are absent.
pub(crate) fn as_positive_int(value: f64) -> Option<i64> {
    if value.is_finite() && value > 0.0 {
        Some(value.ceil() as i64)
    } else {
        None
    }
}
