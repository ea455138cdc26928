//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use upassist_rum::{
    async_trait, Error, ErrorEvent, ErrorHandler, ErrorSource, Event, ManualClock, MetricHandler,
    Navigation, NavigationTiming, RouteHandler, Rum, RumBuilder, StaticEnvironment, Transport,
    VitalsSource, WebVital,
};

pub type Sent = (String, Event);

/// Transport that forwards every event to a channel.
#[derive(Debug)]
pub struct RecordingTransport {
    tx: mpsc::UnboundedSender<Sent>,
}

impl RecordingTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, event_name: &str, event: &Event) -> Result<(), Error> {
        let _ = self.tx.send((event_name.to_string(), event.clone()));
        Ok(())
    }
}

/// Wait for the next emitted event.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Sent>) -> Sent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("transport channel closed")
}

/// Assert nothing else gets emitted.
pub async fn assert_no_event(rx: &mut mpsc::UnboundedReceiver<Sent>) {
    if let Ok(Some((name, _))) = timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("unexpected event {:?}", name);
    }
}

/// Page-side sources that tests trigger by hand.
#[derive(Default)]
pub struct FakePage {
    errors: Mutex<Vec<ErrorHandler>>,
    metrics: Mutex<Vec<(WebVital, MetricHandler)>>,
    routes: Mutex<Vec<RouteHandler>>,
}

impl fmt::Debug for FakePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FakePage")
    }
}

impl FakePage {
    pub fn raise(&self, event: ErrorEvent) {
        for handler in self.errors.lock().unwrap().iter() {
            handler(event.clone());
        }
    }

    pub fn measure(&self, metric: WebVital, value: f64) {
        for (m, handler) in self.metrics.lock().unwrap().iter() {
            if *m == metric {
                handler(value);
            }
        }
    }

    pub fn navigate(&self, path: &str) {
        for handler in self.routes.lock().unwrap().iter() {
            handler(path.to_string());
        }
    }

    pub fn error_handler_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl ErrorSource for FakePage {
    fn on_error(&self, handler: ErrorHandler) {
        self.errors.lock().unwrap().push(handler);
    }
}

impl VitalsSource for FakePage {
    fn observe(&self, metric: WebVital, handler: MetricHandler) {
        self.metrics.lock().unwrap().push((metric, handler));
    }
}

impl Navigation for FakePage {
    fn intercept(&self, handler: RouteHandler) {
        self.routes.lock().unwrap().push(handler);
    }
}

pub fn sample_timing() -> NavigationTiming {
    NavigationTiming {
        domain_lookup_start: 5.0,
        domain_lookup_end: 25.0,
        connect_start: 25.0,
        connect_end: 60.0,
        secure_connection_start: 40.0,
        request_start: 60.0,
        response_start: 150.0,
        response_end: 170.0,
        dom_content_loaded_event_end: 400.0,
        dom_complete: 800.0,
        load_event_start: 810.0,
        transfer_size: 14_200.0,
    }
}

/// Everything a test needs to drive a client.
pub struct Harness {
    pub rum: Rum,
    pub events: mpsc::UnboundedReceiver<Sent>,
    pub page: Arc<FakePage>,
    pub env: Arc<StaticEnvironment>,
    pub clock: ManualClock,
}

/// A page with a populated environment and navigation timing.
pub fn page_env(location: &str) -> StaticEnvironment {
    StaticEnvironment::new(location)
        .with_user_agent("Mozilla/5.0 (X11; Linux x86_64)")
        .with_language("en-US")
        .with_screen_width(1280)
        .with_timezone("Europe/Amsterdam")
        .with_navigation_timing(sample_timing())
}

impl Harness {
    pub fn new(location: &str) -> Self {
        Self::with(location, |b| b)
    }

    pub fn with(location: &str, customize: impl FnOnce(RumBuilder) -> RumBuilder) -> Self {
        Self::from_env(page_env(location), customize)
    }

    pub fn from_env(
        env: StaticEnvironment,
        customize: impl FnOnce(RumBuilder) -> RumBuilder,
    ) -> Self {
        let (transport, events) = RecordingTransport::new();
        let page = Arc::new(FakePage::default());
        let env = Arc::new(env);
        let clock = ManualClock::default();

        let builder = Rum::builder()
            .transport(transport)
            .environment(env.clone())
            .clock(Arc::new(clock.clone()))
            .error_source(page.clone())
            .vitals_source(page.clone())
            .navigation(page.clone());
        let rum = customize(builder).build().expect("client builds");

        Self {
            rum,
            events,
            page,
            env,
            clock,
        }
    }
}
