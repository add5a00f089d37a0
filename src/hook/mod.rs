//! The hook itself: entry → packet → transport, with failure dispatch.

pub mod handlers;

use crate::assemble::{AssemblerDefaults, PacketAssembler};
use crate::classify::FieldClassifier;
use crate::config::{ConfigError, HookConfig};
use crate::domain::{FieldValue, HookError, LogEntry, LogLevel};
use crate::packet::Tag;
use crate::stacktrace::{StacktraceConfig, StacktraceExtractor};
use crate::transport::{Dsn, HttpTransport, Transport, TransportConfig, TransportError};
use crate::transport::DeliveryResult;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, TryRecvError, sync_channel};
use std::time::Duration;
use tracing::{debug, warn};

pub use handlers::{ErrorHandler, ErrorHandlerRegistry};

/// Converts log entries into Sentry packets and hands them to a transport.
///
/// Synchronous hooks block `fire` until the transport reports back, so the
/// returned error is meaningful; the transport's own request timeout bounds
/// the wait. An optional `timeout` lets `fire` return early, in which case a
/// failure reported later still reaches the error handlers. Asynchronous
/// hooks return immediately and report failures only through the handlers.
///
/// The ignore set, extra filters and error handlers are behind locks and may
/// be changed while the hook is in use.
pub struct SentryHook {
    transport: Box<dyn Transport>,
    levels: Vec<LogLevel>,
    classifier: RwLock<FieldClassifier>,
    assembler: RwLock<PacketAssembler>,
    handlers: ErrorHandlerRegistry,
    timeout: Option<Duration>,
    asynchronous: bool,
}

impl SentryHook {
    /// Hook sending to `dsn` for the given levels.
    pub fn new(dsn: &str, levels: &[LogLevel]) -> Result<Self, HookError> {
        Ok(Self::with_transport(http_transport(dsn)?, levels))
    }

    /// Hook with static tags attached to every packet.
    pub fn with_tags<I, K, V>(dsn: &str, tags: I, levels: &[LogLevel]) -> Result<Self, HookError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let hook = Self::new(dsn, levels)?;
        hook.set_tags(tags);
        Ok(hook)
    }

    /// Hook using a pre-built transport.
    pub fn with_transport<T>(transport: T, levels: &[LogLevel]) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            transport: Box::new(transport),
            levels: levels.to_vec(),
            classifier: RwLock::new(FieldClassifier::new()),
            assembler: RwLock::new(PacketAssembler::new(
                AssemblerDefaults::from_host(),
                StacktraceExtractor::default(),
            )),
            handlers: ErrorHandlerRegistry::new(),
            timeout: None,
            asynchronous: false,
        }
    }

    pub fn new_async(dsn: &str, levels: &[LogLevel]) -> Result<Self, HookError> {
        Ok(Self::new(dsn, levels)?.into_async())
    }

    pub fn with_tags_async<I, K, V>(
        dsn: &str,
        tags: I,
        levels: &[LogLevel],
    ) -> Result<Self, HookError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Ok(Self::with_tags(dsn, tags, levels)?.into_async())
    }

    pub fn with_transport_async<T>(transport: T, levels: &[LogLevel]) -> Self
    where
        T: Transport + 'static,
    {
        Self::with_transport(transport, levels).into_async()
    }

    /// Hook built from a validated configuration.
    pub fn from_config(config: &HookConfig) -> Result<Self, HookError> {
        config.validate()?;
        let dsn = Dsn::parse(&config.dsn).map_err(ConfigError::Transport)?;
        let transport =
            HttpTransport::new(dsn, config.transport.clone()).map_err(ConfigError::Transport)?;
        let mut hook = Self::with_transport(transport, &config.levels);
        hook.asynchronous = config.asynchronous;
        hook.timeout = config.timeout;
        hook.set_tags(config.tags.clone());
        hook.set_stacktrace_config(config.stacktrace.clone());
        {
            let mut assembler = hook.assembler.write();
            let defaults = assembler.defaults_mut();
            if config.server_name.is_some() {
                defaults.server_name = config.server_name.clone();
            }
            defaults.logger = config.logger.clone();
            defaults.release = config.release.clone();
            defaults.environment = config.environment.clone();
        }
        for field in &config.ignore_fields {
            hook.add_ignore(field.clone());
        }
        Ok(hook)
    }

    fn into_async(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    /// Levels the logging framework should call `fire` for.
    pub fn levels(&self) -> &[LogLevel] {
        &self.levels
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.levels.contains(&level)
    }

    pub fn is_async(&self) -> bool {
        self.asynchronous
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Bounds how long a synchronous `fire` waits; `None` waits for the
    /// transport.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn set_tags<I, K, V>(&self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.assembler.write().defaults_mut().tags =
            tags.into_iter().map(|(k, v)| Tag::new(k, v)).collect();
    }

    pub fn set_server_name(&self, server_name: impl Into<String>) {
        self.assembler.write().defaults_mut().server_name = Some(server_name.into());
    }

    pub fn set_logger(&self, logger: impl Into<String>) {
        self.assembler.write().defaults_mut().logger = Some(logger.into());
    }

    pub fn set_release(&self, release: impl Into<String>) {
        self.assembler.write().defaults_mut().release = Some(release.into());
    }

    pub fn set_environment(&self, environment: impl Into<String>) {
        self.assembler.write().defaults_mut().environment = Some(environment.into());
    }

    pub fn set_stacktrace_config(&self, config: StacktraceConfig) {
        let mut assembler = self.assembler.write();
        let defaults = assembler.defaults().clone();
        *assembler = PacketAssembler::new(defaults, StacktraceExtractor::new(config));
    }

    /// Drops `key` from every packet unless a filter is registered for it.
    pub fn add_ignore(&self, key: impl Into<String>) {
        self.classifier.write().add_ignore(key);
    }

    /// Replaces normal normalization of `key` with `filter`.
    pub fn add_extra_filter<F>(&self, key: impl Into<String>, filter: F)
    where
        F: Fn(&FieldValue) -> FieldValue + Send + Sync + 'static,
    {
        self.classifier.write().add_extra_filter(key, filter);
    }

    pub fn add_error_handler<F>(&self, handler: F)
    where
        F: Fn(&LogEntry, &HookError) + Send + Sync + 'static,
    {
        self.handlers.add(handler);
    }

    pub fn error_handlers(&self) -> &ErrorHandlerRegistry {
        &self.handlers
    }

    /// Builds the packet for `entry` without sending it.
    pub fn packet_for(&self, entry: &LogEntry) -> crate::packet::Packet {
        let classified = self.classifier.read().classify(&entry.fields);
        self.assembler.read().assemble(entry, classified)
    }

    /// Sends `entry` to Sentry.
    ///
    /// On delivery failure every error handler is invoked once with `entry`
    /// and the error, which is also returned. When a configured `timeout`
    /// elapses first, `HookError::Timeout` is returned and a failure reported
    /// afterwards is dispatched to the handlers from the transport.
    pub fn fire(&self, entry: &LogEntry) -> Result<(), HookError> {
        let packet = self.packet_for(entry);
        let event_id = packet.event_id.clone();

        if self.asynchronous {
            let handlers = self.handlers.clone();
            let entry = entry.clone();
            self.transport.send(
                packet,
                Box::new(move |result| {
                    if let Err(err) = result {
                        handlers.dispatch(&entry, &HookError::Transport(err));
                    }
                }),
            );
            debug!("Queued packet {} for asynchronous delivery", event_id);
            return Ok(());
        }

        let Some(timeout) = self.timeout else {
            let (tx, rx) = sync_channel(1);
            self.transport.send(
                packet,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            );
            let outcome = rx.recv().unwrap_or(Err(TransportError::Closed));
            return self.settle(entry, &event_id, outcome);
        };

        // Set to false once `fire` stops waiting; the callback then reports
        // failures itself.
        let waiting = Arc::new(Mutex::new(true));
        let (tx, rx) = sync_channel(1);
        {
            let waiting = Arc::clone(&waiting);
            let handlers = self.handlers.clone();
            let late_entry = entry.clone();
            self.transport.send(
                packet,
                Box::new(move |result| {
                    let still_waiting = waiting.lock();
                    if *still_waiting {
                        let _ = tx.send(result);
                        return;
                    }
                    drop(still_waiting);
                    if let Err(err) = result {
                        let err = HookError::Transport(err);
                        warn!("Late delivery failure: {}", err);
                        handlers.dispatch(&late_entry, &err);
                    }
                }),
            );
        }

        let outcome = match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
            Err(RecvTimeoutError::Timeout) => {
                *waiting.lock() = false;
                match rx.try_recv() {
                    Ok(result) => result,
                    Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
                    Err(TryRecvError::Empty) => {
                        warn!("No response from sentry server in {:?}", timeout);
                        return Err(HookError::Timeout(timeout));
                    }
                }
            }
        };
        self.settle(entry, &event_id, outcome)
    }

    fn settle(
        &self,
        entry: &LogEntry,
        event_id: &str,
        outcome: DeliveryResult,
    ) -> Result<(), HookError> {
        match outcome {
            Ok(()) => {
                debug!("Delivered packet {}", event_id);
                Ok(())
            }
            Err(err) => {
                let err = HookError::Transport(err);
                warn!("Failed to deliver packet {}: {}", event_id, err);
                self.handlers.dispatch(entry, &err);
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for SentryHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentryHook")
            .field("levels", &self.levels)
            .field("classifier", &*self.classifier.read())
            .field("handlers", &self.handlers)
            .field("timeout", &self.timeout)
            .field("asynchronous", &self.asynchronous)
            .finish()
    }
}

fn http_transport(dsn: &str) -> Result<HttpTransport, HookError> {
    let dsn = Dsn::parse(dsn).map_err(ConfigError::Transport)?;
    Ok(HttpTransport::new(dsn, TransportConfig::default()).map_err(ConfigError::Transport)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use crate::transport::MockTransport;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rejecting_transport(status: u16) -> MockTransport {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(move |_, on_complete| {
                on_complete(Err(TransportError::HttpStatus { status }));
            });
        transport
    }

    fn capturing_transport() -> (MockTransport, Arc<Mutex<Vec<Packet>>>) {
        let packets = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&packets);
        let mut transport = MockTransport::new();
        transport.expect_send().returning(move |packet, on_complete| {
            sink.lock().push(packet);
            on_complete(Ok(()));
        });
        (transport, packets)
    }

    #[test]
    fn test_fire_delivers_packet() {
        let (transport, packets) = capturing_transport();
        let hook = SentryHook::with_transport(transport, &[LogLevel::Error]);

        hook.fire(&LogEntry::new(LogLevel::Error, "error message"))
            .unwrap();

        let packets = packets.lock();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].message, "error message");
    }

    #[test]
    fn test_fire_failure_invokes_each_handler_once() {
        let hook = SentryHook::with_transport(rejecting_transport(400), &[LogLevel::Error]);
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            hook.add_error_handler(move |entry, err| {
                assert_eq!(entry.message, "error message");
                assert!(err.to_string().contains("got http status 400"));
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        let err = hook
            .fire(&LogEntry::new(LogLevel::Error, "error message"))
            .unwrap_err();
        assert_eq!(err.http_status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fire_failure_without_handlers_still_errors() {
        let hook = SentryHook::with_transport(rejecting_transport(500), &[LogLevel::Error]);
        assert!(hook.fire(&LogEntry::new(LogLevel::Error, "m")).is_err());
    }

    fn delayed_rejection(delay: Duration) -> MockTransport {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(move |_, on_complete| {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    on_complete(Err(TransportError::HttpStatus { status: 400 }));
                });
            });
        transport
    }

    #[test]
    fn test_fire_waits_for_slow_transport_by_default() {
        let hook = SentryHook::with_transport(
            delayed_rejection(Duration::from_millis(150)),
            &[LogLevel::Error],
        );
        assert_eq!(hook.timeout(), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        hook.add_error_handler(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = hook.fire(&LogEntry::new(LogLevel::Error, "m")).unwrap_err();
        assert_eq!(err.http_status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_failure_after_timeout_reaches_handlers() {
        let mut hook = SentryHook::with_transport(
            delayed_rejection(Duration::from_millis(100)),
            &[LogLevel::Error],
        );
        hook.set_timeout(Some(Duration::from_millis(20)));
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        hook.add_error_handler(move |entry, err| {
            let _ = tx.lock().send((entry.message.clone(), err.http_status()));
        });

        let err = hook.fire(&LogEntry::new(LogLevel::Error, "slow")).unwrap_err();
        assert!(matches!(err, HookError::Timeout(_)));

        let reported = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reported, ("slow".to_string(), Some(400)));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_late_success_after_timeout_is_silent() {
        let mut transport = MockTransport::new();
        let pending = Arc::new(Mutex::new(Vec::new()));
        let keep = Arc::clone(&pending);
        transport
            .expect_send()
            .returning(move |_, on_complete| keep.lock().push(on_complete));

        let mut hook = SentryHook::with_transport(transport, &[LogLevel::Error]);
        hook.set_timeout(Some(Duration::from_millis(20)));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        hook.add_error_handler(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = hook.fire(&LogEntry::new(LogLevel::Error, "m")).unwrap_err();
        assert!(matches!(err, HookError::Timeout(_)));

        for on_complete in pending.lock().drain(..) {
            on_complete(Ok(()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropped_callback_is_closed_error() {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|_, on_complete| drop(on_complete));
        let hook = SentryHook::with_transport(transport, &[LogLevel::Error]);

        let err = hook.fire(&LogEntry::new(LogLevel::Error, "m")).unwrap_err();
        assert!(matches!(err, HookError::Transport(TransportError::Closed)));
    }

    #[test]
    fn test_async_fire_reports_through_handlers() {
        let hook = SentryHook::with_transport_async(rejecting_transport(429), &[LogLevel::Error]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hook.add_error_handler(move |entry, err| {
            sink.lock().push((entry.message.clone(), err.http_status()));
        });

        assert!(hook.fire(&LogEntry::new(LogLevel::Error, "async")).is_ok());
        assert_eq!(*seen.lock(), vec![("async".to_string(), Some(429))]);
    }

    #[test]
    fn test_ignore_and_filter_registries() {
        let (transport, packets) = capturing_transport();
        let hook = SentryHook::with_transport(transport, &[LogLevel::Error]);
        hook.add_ignore("password");
        hook.add_ignore("token");
        hook.add_extra_filter("token", |_| FieldValue::from("[filtered]"));

        let entry = LogEntry::new(LogLevel::Error, "m")
            .with_field("password", "hunter2")
            .with_field("token", "abc")
            .with_field("order", 13);
        hook.fire(&entry).unwrap();

        let packet = &packets.lock()[0];
        assert!(!packet.extra.contains_key("password"));
        assert_eq!(packet.extra["token"], "[filtered]");
        assert_eq!(packet.extra["order"], 13);
    }

    #[test]
    fn test_levels() {
        let hook = SentryHook::with_transport(MockTransport::new(), &LogLevel::Error.and_above());
        assert_eq!(
            hook.levels(),
            &[LogLevel::Panic, LogLevel::Fatal, LogLevel::Error]
        );
        assert!(hook.is_enabled(LogLevel::Fatal));
        assert!(!hook.is_enabled(LogLevel::Warn));
    }

    #[test]
    fn test_invalid_dsn_is_config_error() {
        let err = SentryHook::new("not a dsn", &[LogLevel::Error]).unwrap_err();
        assert!(matches!(
            err,
            HookError::Config(ConfigError::Transport(TransportError::InvalidDsn(_)))
        ));
    }

    #[test]
    fn test_hook_defaults_flow_into_packets() {
        let hook = SentryHook::with_transport(MockTransport::new(), &[LogLevel::Error]);
        hook.set_tags([("site", "test")]);
        hook.set_server_name("srv");
        hook.set_release("1.0.0");

        let packet = hook.packet_for(&LogEntry::new(LogLevel::Error, "m"));
        assert_eq!(packet.tag("site"), Some("test"));
        assert_eq!(packet.server_name, "srv");
        assert_eq!(packet.release.as_deref(), Some("1.0.0"));
    }
}
