//! Runtime configuration and client construction.

use crate::clock::{Clock, SystemClock};
use crate::command::Command;
use crate::environment::{Environment, StaticEnvironment};
use crate::listeners::{ErrorSource, Navigation, VitalsSource};
use crate::schedule::Readiness;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

/// Default API host.
pub const DEFAULT_API_HOST: &str = "https://rum.upassist.com";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum spacing between two captured errors.
pub const DEFAULT_ERROR_THROTTLE_WINDOW: Duration = Duration::from_millis(1000);

/// Default lifetime of a session token, counted from its creation.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// How page views are tracked automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackMode {
    /// No automatic page views.
    Off,
    /// One page view per full page load.
    #[default]
    Pageload,
    /// Initial page view plus one per client-side route change.
    History,
}

impl TrackMode {
    /// Whether this mode sends the initial page view.
    pub fn tracks_pageviews(self) -> bool {
        matches!(self, TrackMode::Pageload | TrackMode::History)
    }
}

/// Process-wide runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub(crate) client_key: Option<String>,
    pub(crate) environment: Option<String>,
    pub(crate) track_mode: TrackMode,
    pub(crate) include_url_fragment: bool,
    pub(crate) include_url_query_params: Vec<String>,
    pub(crate) auto_track_errors: bool,
    pub(crate) auto_track_core_web_vitals: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_key: None,
            environment: None,
            track_mode: TrackMode::default(),
            include_url_fragment: false,
            include_url_query_params: Vec::new(),
            auto_track_errors: true,
            auto_track_core_web_vitals: true,
        }
    }
}

impl Config {
    /// Get the client key, if one has been set.
    pub fn client_key(&self) -> Option<&str> {
        self.client_key.as_deref()
    }

    /// Whether a non-empty client key is set.
    pub fn has_client_key(&self) -> bool {
        self.client_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Get the environment name.
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Get the tracking mode.
    pub fn track_mode(&self) -> TrackMode {
        self.track_mode
    }

    /// Whether the URL fragment is kept in the `url` field.
    pub fn include_url_fragment(&self) -> bool {
        self.include_url_fragment
    }

    /// Query parameters kept in the `url` field, in output order.
    pub fn include_url_query_params(&self) -> &[String] {
        &self.include_url_query_params
    }

    /// Whether uncaught errors are captured at initialization.
    pub fn auto_track_errors(&self) -> bool {
        self.auto_track_errors
    }

    /// Whether Core Web Vitals are observed at initialization.
    pub fn auto_track_core_web_vitals(&self) -> bool {
        self.auto_track_core_web_vitals
    }

    /// Shallow-merge a patch. Fields the patch leaves unset keep their value.
    pub(crate) fn merge(&mut self, patch: ConfigPatch) {
        if let Some(client_key) = patch.client_key {
            self.client_key = Some(client_key);
        }
        if let Some(environment) = patch.environment {
            self.environment = Some(environment);
        }
        if let Some(track_mode) = patch.track_mode {
            self.track_mode = track_mode;
        }
        if let Some(include) = patch.include_url_fragment {
            self.include_url_fragment = include;
        }
        if let Some(params) = patch.include_url_query_params {
            self.include_url_query_params = params;
        }
        if let Some(enabled) = patch.auto_track_errors {
            self.auto_track_errors = enabled;
        }
        if let Some(enabled) = patch.auto_track_core_web_vitals {
            self.auto_track_core_web_vitals = enabled;
        }
    }
}

/// Partial configuration carried by a `config` command.
///
/// Keys use the camelCase names hosts pass on the command surface. Each key
/// is read on its own: a value of the wrong shape drops that key only, and
/// unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    pub client_key: Option<String>,
    pub environment: Option<String>,
    pub track_mode: Option<TrackMode>,
    pub include_url_fragment: Option<bool>,
    pub include_url_query_params: Option<Vec<String>>,
    pub auto_track_errors: Option<bool>,
    pub auto_track_core_web_vitals: Option<bool>,
}

impl<'de> Deserialize<'de> for ConfigPatch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Ok(ConfigPatch {
            client_key: lenient_field(&fields, "clientKey"),
            environment: lenient_field(&fields, "environment"),
            track_mode: lenient_field(&fields, "trackMode"),
            include_url_fragment: lenient_field(&fields, "includeURLFragment"),
            include_url_query_params: lenient_field(&fields, "includeURLQueryParams"),
            auto_track_errors: lenient_field(&fields, "autoTrackErrors"),
            auto_track_core_web_vitals: lenient_field(&fields, "autoTrackCoreWebVitals"),
        })
    }
}

/// Read one config key; absent, null and malformed values all yield `None`.
fn lenient_field<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Option<T> {
    let value = fields.get(key)?;
    match Option::<T>::deserialize(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(key, error = %e, "ignoring malformed config value");
            None
        }
    }
}

impl ConfigPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client key.
    pub fn client_key(mut self, key: impl Into<String>) -> Self {
        self.client_key = Some(key.into());
        self
    }

    /// Set the environment name.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Set the tracking mode.
    pub fn track_mode(mut self, mode: TrackMode) -> Self {
        self.track_mode = Some(mode);
        self
    }

    /// Keep or drop the URL fragment.
    pub fn include_url_fragment(mut self, include: bool) -> Self {
        self.include_url_fragment = Some(include);
        self
    }

    /// Set the query parameter allow-list.
    pub fn include_url_query_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_url_query_params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Enable or disable automatic error capture.
    pub fn auto_track_errors(mut self, enabled: bool) -> Self {
        self.auto_track_errors = Some(enabled);
        self
    }

    /// Enable or disable Core Web Vitals observation.
    pub fn auto_track_core_web_vitals(mut self, enabled: bool) -> Self {
        self.auto_track_core_web_vitals = Some(enabled);
        self
    }

    /// Layer `other` on top of this patch; fields `other` sets win.
    pub fn overlay(self, other: ConfigPatch) -> ConfigPatch {
        ConfigPatch {
            client_key: other.client_key.or(self.client_key),
            environment: other.environment.or(self.environment),
            track_mode: other.track_mode.or(self.track_mode),
            include_url_fragment: other.include_url_fragment.or(self.include_url_fragment),
            include_url_query_params: other
                .include_url_query_params
                .or(self.include_url_query_params),
            auto_track_errors: other.auto_track_errors.or(self.auto_track_errors),
            auto_track_core_web_vitals: other
                .auto_track_core_web_vitals
                .or(self.auto_track_core_web_vitals),
        }
    }

    /// Whether the patch sets no field at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Holder of the single process-wide [`Config`].
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: Mutex<Config>,
}

impl ConfigStore {
    /// Create a store holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `patch` into the current configuration and return the new snapshot.
    pub fn set_config(&self, patch: ConfigPatch) -> Config {
        self.update(patch).1
    }

    /// Merge `patch` and return the snapshots from before and after the merge.
    pub fn update(&self, patch: ConfigPatch) -> (Config, Config) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let before = current.clone();
        current.merge(patch);
        (before, current.clone())
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> Config {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Restore the default configuration.
    pub fn reset(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Config::default();
    }
}

/// Builder for the [`Rum`](crate::Rum) client.
///
/// Every collaborator has an in-process default, so `Rum::builder().build()`
/// works inside any tokio runtime.
#[derive(Debug)]
pub struct RumBuilder {
    pub(crate) api_host: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) error_throttle_window: Option<Duration>,
    pub(crate) session_ttl: Option<Duration>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) storage: Option<Arc<dyn KeyValueStore>>,
    pub(crate) environment: Option<Arc<dyn Environment>>,
    pub(crate) clock: Option<Arc<dyn Clock>>,
    pub(crate) readiness: Option<Readiness>,
    pub(crate) navigation: Option<Arc<dyn Navigation>>,
    pub(crate) error_source: Option<Arc<dyn ErrorSource>>,
    pub(crate) vitals_source: Option<Arc<dyn VitalsSource>>,
    pub(crate) queued: Vec<Command>,
}

impl RumBuilder {
    /// Create a builder with every setting at its default.
    pub fn new() -> Self {
        Self {
            api_host: None,
            timeout: None,
            error_throttle_window: None,
            session_ttl: None,
            transport: None,
            storage: None,
            environment: None,
            clock: None,
            readiness: None,
            navigation: None,
            error_source: None,
            vitals_source: None,
            queued: Vec::new(),
        }
    }

    /// Set the API host used by the default HTTP transport.
    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = Some(host.into());
        self
    }

    /// Set the request timeout used by the default HTTP transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the error capture throttle window.
    pub fn error_throttle_window(mut self, window: Duration) -> Self {
        self.error_throttle_window = Some(window);
        self
    }

    /// Set the session token lifetime.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    /// Replace the transport that delivers finished events.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the identity token storage.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Replace the page context supplier.
    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Replace the clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a page readiness signal. Without one the page counts as loaded.
    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Attach the client-side navigation interceptor.
    pub fn navigation(mut self, navigation: Arc<dyn Navigation>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Attach the global error source.
    pub fn error_source(mut self, source: Arc<dyn ErrorSource>) -> Self {
        self.error_source = Some(source);
        self
    }

    /// Attach the Core Web Vitals source.
    pub fn vitals_source(mut self, source: Arc<dyn VitalsSource>) -> Self {
        self.vitals_source = Some(source);
        self
    }

    /// Commands the host issued before the client existed.
    ///
    /// They are replayed in order by [`Rum::init`](crate::Rum::init).
    pub fn queued(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.queued.extend(commands);
        self
    }

    pub(crate) fn resolved_api_host(&self) -> String {
        self.api_host
            .clone()
            .unwrap_or_else(|| DEFAULT_API_HOST.into())
    }

    pub(crate) fn resolved_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    pub(crate) fn take_clock(&mut self) -> Arc<dyn Clock> {
        self.clock
            .take()
            .unwrap_or_else(|| Arc::new(SystemClock::new()))
    }

    pub(crate) fn take_storage(&mut self, clock: &Arc<dyn Clock>) -> Arc<dyn KeyValueStore> {
        self.storage
            .take()
            .unwrap_or_else(|| Arc::new(MemoryStore::new(clock.clone())))
    }

    pub(crate) fn take_environment(&mut self) -> Arc<dyn Environment> {
        self.environment
            .take()
            .unwrap_or_else(|| Arc::new(StaticEnvironment::default()))
    }
}

impl Default for RumBuilder {
    fn default() -> Self {
        Self::new()
    }
}
