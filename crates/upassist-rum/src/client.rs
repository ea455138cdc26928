//! RUM client: the command interpreter and its page-lifetime state.

use crate::command::Command;
use crate::config::{
    Config, ConfigPatch, ConfigStore, RumBuilder, TrackMode, DEFAULT_ERROR_THROTTLE_WINDOW,
    DEFAULT_SESSION_TTL,
};
use crate::enrich::{Enricher, PAGEVIEW};
use crate::environment::Environment;
use crate::flags::RuntimeFlags;
use crate::identity::IdentityManager;
use crate::listeners::{ErrorSource, Navigation, VitalsSource};
use crate::queue::CommandQueue;
use crate::schedule::Scheduler;
use crate::throttle::Throttle;
use crate::transport::{HttpTransport, Transport};
use crate::types::{Dimensions, ErrorEvent};
use crate::Error;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::runtime::Handle;
use tracing::{debug, error, info, instrument, warn};

/// Name of the event reporting a captured error.
pub const ERROR_EVENT: &str = "Error";

/// Real User Monitoring client.
///
/// One client lives for one page load. It starts uninitialized: commands
/// issued through [`call`](Rum::call) are buffered until [`init`](Rum::init)
/// installs the interpreter and replays them in order. The direct methods
/// ([`config`](Rum::config), [`track`](Rum::track),
/// [`capture_error`](Rum::capture_error)) always act immediately.
///
/// # Example
///
/// ```rust,no_run
/// use upassist_rum::{Command, ConfigPatch, Dimensions, Rum};
///
/// #[tokio::main]
/// async fn main() -> Result<(), upassist_rum::Error> {
///     let rum = Rum::builder().build()?;
///
///     // Issued before the interpreter is installed: buffered.
///     rum.call(Command::config(ConfigPatch::new().client_key("pk_xxx")));
///     rum.call(Command::track("Signup"));
///
///     // Replays the buffer, then wires the global listeners.
///     rum.init();
///
///     rum.track("Checkout", Dimensions::new().with("plan", "pro"));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Rum {
    pub(crate) inner: Arc<Inner>,
}

/// Non-owning handle given to page-side callbacks.
#[derive(Clone)]
pub(crate) struct WeakRum {
    inner: Weak<Inner>,
}

impl WeakRum {
    pub(crate) fn upgrade(&self) -> Option<Rum> {
        self.inner.upgrade().map(|inner| Rum { inner })
    }
}

pub(crate) struct Inner {
    pub(crate) config: ConfigStore,
    pub(crate) flags: RuntimeFlags,
    /// Pending commands while the interpreter is not installed.
    lifecycle: Mutex<Option<CommandQueue>>,
    installed: AtomicBool,
    identity: IdentityManager,
    pub(crate) environment: Arc<dyn Environment>,
    transport: Arc<dyn Transport>,
    scheduler: Scheduler,
    error_throttle: Throttle,
    pub(crate) navigation: Option<Arc<dyn Navigation>>,
    pub(crate) error_source: Option<Arc<dyn ErrorSource>>,
    pub(crate) vitals_source: Option<Arc<dyn VitalsSource>>,
    pub(crate) previous_path: Mutex<Option<String>>,
}

impl RumBuilder {
    /// Build the client.
    ///
    /// Must be called inside a tokio runtime; deferred work is spawned on it.
    pub fn build(mut self) -> Result<Rum, Error> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::Config("the client must be built inside a tokio runtime".into()))?;

        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                &self.resolved_api_host(),
                self.resolved_timeout(),
            )?),
        };
        let clock = self.take_clock();
        let storage = self.take_storage(&clock);
        let environment = self.take_environment();
        let session_ttl = self.session_ttl.unwrap_or(DEFAULT_SESSION_TTL);
        let window = self
            .error_throttle_window
            .unwrap_or(DEFAULT_ERROR_THROTTLE_WINDOW);

        let inner = Inner {
            config: ConfigStore::new(),
            flags: RuntimeFlags::new(),
            lifecycle: Mutex::new(Some(self.queued.into_iter().collect())),
            installed: AtomicBool::new(false),
            identity: IdentityManager::new(storage, session_ttl),
            environment,
            transport,
            scheduler: Scheduler::new(runtime, self.readiness.unwrap_or_default()),
            error_throttle: Throttle::new(window, clock),
            navigation: self.navigation,
            error_source: self.error_source,
            vitals_source: self.vitals_source,
            previous_path: Mutex::new(None),
        };

        Ok(Rum {
            inner: Arc::new(inner),
        })
    }
}

impl Rum {
    /// Create a new builder.
    pub fn builder() -> RumBuilder {
        RumBuilder::new()
    }

    /// Copy of the current configuration.
    pub fn config_snapshot(&self) -> Config {
        self.inner.config.snapshot()
    }

    /// The one-shot runtime flags.
    pub fn flags(&self) -> &RuntimeFlags {
        &self.inner.flags
    }

    /// Whether the interpreter has been installed.
    pub fn is_initialized(&self) -> bool {
        self.inner.installed.load(Ordering::SeqCst)
    }

    /// Number of commands waiting for initialization.
    pub fn pending_command_count(&self) -> usize {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, CommandQueue::len)
    }

    pub(crate) fn downgrade(&self) -> WeakRum {
        WeakRum {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ============================================
    // COMMAND SURFACE
    // ============================================

    /// Public entry point: buffer the command until initialization, or
    /// dispatch it right away once initialized.
    pub fn call(&self, command: Command) {
        {
            let mut lifecycle = self
                .inner
                .lifecycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(queue) = lifecycle.as_mut() {
                debug!(command = command.name(), "interpreter not installed, queueing command");
                queue.push(command);
                return;
            }
        }
        self.dispatch(command);
    }

    /// Like [`call`](Rum::call), for a raw positional argument list such as
    /// `["track", "Signup", {"plan": "pro"}]`.
    pub fn call_raw(&self, args: &[Value]) {
        match Command::from_args(args) {
            Ok(command) => self.call(command),
            Err(e) => warn!(error = %e, "ignoring command"),
        }
    }

    /// Execute a command now.
    pub fn dispatch(&self, command: Command) {
        match command {
            Command::Config(None) => warn!("passed empty config params"),
            Command::Config(Some(patch)) => self.config(patch),
            Command::Track {
                event_name,
                overrides,
            } => self.track(event_name, overrides),
            Command::CaptureError { event, overrides } => self.capture_error(event, overrides),
            Command::Unknown(name) => warn!(command = %name, "unknown command"),
        }
    }

    // ============================================
    // COMMANDS
    // ============================================

    /// Merge configuration and apply its side effects.
    ///
    /// In `history` mode this installs the interpreter and starts following
    /// client-side navigation. In `pageload` or `history` mode, the call that
    /// first sets a client key tracks the initial `Pageview`.
    pub fn config(&self, patch: ConfigPatch) {
        let (before, after) = self.inner.config.update(patch);
        let mode = after.track_mode();

        if mode.tracks_pageviews() {
            if mode == TrackMode::History {
                self.init();
                self.patch_history();
            }
            if !before.has_client_key() && after.has_client_key() {
                info!("triggering initial pageview");
                self.track(PAGEVIEW, Dimensions::new());
            }
        }

        debug!(track_mode = ?mode, "tracking mode");
    }

    /// Track a named event.
    ///
    /// Enrichment and delivery happen later, once the page has loaded; this
    /// never blocks the caller.
    pub fn track(&self, event_name: impl Into<String>, overrides: Dimensions) {
        let event_name = event_name.into();
        let rum = self.clone();
        self.inner.scheduler.run_after_ready(async move {
            rum.emit(&event_name, &overrides).await;
        });
    }

    /// Track an `Error` event, at most once per throttle window. Calls inside
    /// the window are dropped.
    pub fn capture_error(&self, event: ErrorEvent, overrides: Dimensions) {
        self.inner.error_throttle.call(|| {
            let mut dimensions = event.dimensions();
            dimensions.extend(&overrides);
            self.track(ERROR_EVENT, dimensions);
        });
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    /// Install the interpreter: replay buffered commands in order, then
    /// register the configured global listeners. Runs once.
    #[instrument(skip(self))]
    pub fn init(&self) {
        if self.inner.installed.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut lifecycle = self
                .inner
                .lifecycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let pending = lifecycle.take().map(|mut q| q.drain()).unwrap_or_default();
            info!(queued = pending.len(), "installing command interpreter");
            // held until replay completes so later calls dispatch after it
            for command in pending {
                self.dispatch(command);
            }
        }

        let config = self.config_snapshot();
        if config.auto_track_errors() {
            self.listen_for_errors();
        }
        if config.auto_track_core_web_vitals() {
            self.listen_for_core_web_vitals();
        }
    }

    /// Configure with a client key and automatic page views off, layered
    /// under `patch`, then initialize.
    #[instrument(skip(self, client_key, patch))]
    pub fn load(&self, client_key: impl Into<String>, patch: ConfigPatch) {
        let base = ConfigPatch::new()
            .client_key(client_key)
            .track_mode(TrackMode::Off);
        self.config(base.overlay(patch));
        self.init();
    }

    /// Return to a fresh page state: default configuration, cleared flags,
    /// an empty queue, and an uninstalled interpreter.
    ///
    /// Handlers already registered with page-side sources stay registered.
    pub fn reset(&self) {
        self.inner.config.reset();
        self.inner.flags.reset();
        self.inner.error_throttle.reset();
        *self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(CommandQueue::new());
        *self
            .inner
            .previous_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.inner.installed.store(false, Ordering::SeqCst);
    }

    // ============================================
    // INTERNAL
    // ============================================

    async fn emit(&self, event_name: &str, overrides: &Dimensions) {
        let config = self.config_snapshot();
        let event = Enricher {
            config: &config,
            environment: self.inner.environment.as_ref(),
            identity: &self.inner.identity,
            flags: &self.inner.flags,
        }
        .collect(event_name, overrides);

        if let Err(e) = self.inner.transport.send(event_name, &event).await {
            error!(error = %e, event_name, "failed to send event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::environment::StaticEnvironment;
    use crate::types::Event;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _event_name: &str, _event: &Event) -> Result<(), Error> {
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct CountingTransport {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, _event_name: &str, _event: &Event) -> Result<(), Error> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn rum() -> Rum {
        Rum::builder()
            .transport(Arc::new(NullTransport))
            .environment(Arc::new(StaticEnvironment::new("https://example.com/")))
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = Rum::builder().transport(Arc::new(NullTransport)).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_calls_queue_until_init() {
        let rum = rum();

        rum.call(Command::config(ConfigPatch::new().environment("staging")));
        rum.call(Command::track("A"));

        assert_eq!(rum.pending_command_count(), 2);
        assert_eq!(rum.config_snapshot().environment(), None);
        assert!(!rum.is_initialized());

        rum.init();

        assert!(rum.is_initialized());
        assert_eq!(rum.pending_command_count(), 0);
        assert_eq!(rum.config_snapshot().environment(), Some("staging"));
    }

    #[tokio::test]
    async fn test_second_init_does_not_replay() {
        let transport = Arc::new(CountingTransport::default());
        let rum = Rum::builder()
            .transport(transport.clone())
            .environment(Arc::new(StaticEnvironment::new("https://example.com/")))
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap();

        rum.call(Command::track("A"));
        rum.init();
        rum.init();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
        assert_eq!(rum.pending_command_count(), 0);
    }

    #[tokio::test]
    async fn test_calls_after_init_dispatch_directly() {
        let rum = rum();
        rum.init();

        rum.call(Command::config(ConfigPatch::new().environment("prod")));

        assert_eq!(rum.pending_command_count(), 0);
        assert_eq!(rum.config_snapshot().environment(), Some("prod"));
    }

    #[tokio::test]
    async fn test_builder_queue_is_replayed() {
        let rum = Rum::builder()
            .transport(Arc::new(NullTransport))
            .queued([Command::config(ConfigPatch::new().environment("dev"))])
            .build()
            .unwrap();
        assert_eq!(rum.pending_command_count(), 1);

        rum.init();

        assert_eq!(rum.config_snapshot().environment(), Some("dev"));
    }

    #[tokio::test]
    async fn test_history_mode_installs_interpreter() {
        let rum = rum();

        rum.config(ConfigPatch::new().track_mode(TrackMode::History));

        assert!(rum.is_initialized());
        assert!(rum.flags().history_patched());
    }

    #[tokio::test]
    async fn test_init_registers_listeners_from_config() {
        let rum = rum();
        rum.config(
            ConfigPatch::new()
                .auto_track_errors(true)
                .auto_track_core_web_vitals(false),
        );

        rum.init();

        assert!(rum.flags().listening_for_errors());
        assert!(!rum.flags().listening_for_core_web_vitals());
    }

    #[tokio::test]
    async fn test_load_sets_key_with_tracking_off() {
        let rum = rum();

        rum.load("pk_load", ConfigPatch::new().environment("test"));

        let config = rum.config_snapshot();
        assert_eq!(config.client_key(), Some("pk_load"));
        assert_eq!(config.track_mode(), TrackMode::Off);
        assert_eq!(config.environment(), Some("test"));
        assert!(rum.is_initialized());
    }

    #[tokio::test]
    async fn test_reset_returns_to_uninitialized() {
        let rum = rum();
        rum.config(ConfigPatch::new().client_key("k").track_mode(TrackMode::History));
        assert!(rum.is_initialized());

        rum.reset();

        assert!(!rum.is_initialized());
        assert!(!rum.flags().history_patched());
        assert_eq!(rum.config_snapshot(), Config::default());
        rum.call(Command::track("A"));
        assert_eq!(rum.pending_command_count(), 1);
    }

    #[tokio::test]
    async fn test_soft_failures_do_not_panic() {
        let rum = rum();
        rum.init();

        rum.dispatch(Command::Config(None));
        rum.dispatch(Command::Unknown("identify".into()));
        rum.call_raw(&[]);
        rum.call_raw(&[serde_json::json!("config"), serde_json::json!({ "trackMode": 7 })]);

        assert_eq!(rum.config_snapshot(), Config::default());
    }
}
