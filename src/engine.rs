//! Engine handle: lifecycle, registration, and thread management.
//!
//! One engine instance may exist per process at a time. The handle owns the
//! configuration, TLS context, endpoint registry, and (while started) the
//! acceptor and worker threads. Lifecycle order is strict: init before
//! start, stop before shutdown; shutdown releases the process slot.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mio::Waker;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::event::{event_queue, Event, EventSender};
use crate::listener::{Acceptor, ConnTable};
use crate::registry::{EndpointRegistry, MethodHandlers};
use crate::tls::build_tls_config;
use crate::worker::Worker;

/// One live engine per process; init claims the slot, shutdown releases it.
static ENGINE_LIVE: AtomicBool = AtomicBool::new(false);

/// Lifecycle states of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Shut down; every operation fails until a new engine is initialized.
    Uninitialized,
    /// Initialized but not serving.
    Initialized,
    /// Accepting and serving connections.
    Started,
    /// Stop in progress.
    Stopping,
    /// Stopped; only shutdown is legal next.
    Stopped,
}

struct Runtime {
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
    events_tx: EventSender,
    conn_table: Arc<ConnTable>,
    acceptor: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

/// The engine handle.
pub struct Engine {
    config: EngineConfig,
    state: LifecycleState,
    registry: Arc<EndpointRegistry>,
    tls: Option<Arc<rustls::ServerConfig>>,
    runtime: Option<Runtime>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("port", &self.config.port)
            .field("secure", &self.config.secure)
            .field("endpoints", &self.registry.len())
            .finish()
    }
}

impl Engine {
    /// Initializes the engine: validates configuration and, in secure mode,
    /// loads certificate and key. A load failure is fatal to init.
    pub fn init(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        if ENGINE_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::InvalidState(
                "an engine instance already exists in this process",
            ));
        }

        let tls = if config.secure {
            match build_tls_config(&config) {
                Ok(tls) => Some(tls),
                Err(err) => {
                    ENGINE_LIVE.store(false, Ordering::SeqCst);
                    return Err(err);
                }
            }
        } else {
            None
        };

        tracing::info!(
            daemon = %config.daemon_name,
            port = config.port,
            secure = config.secure,
            "engine initialized"
        );

        Ok(Self {
            config,
            state: LifecycleState::Initialized,
            registry: Arc::new(EndpointRegistry::new()),
            tls,
            runtime: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The configuration this engine was initialized with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers handlers for an exact-match URI. Legal any time between
    /// init and shutdown, before or after start.
    pub fn register_endpoint(&self, uri: &str, handlers: MethodHandlers) -> Result<()> {
        self.ensure_live()?;
        self.registry.register(uri, handlers)?;
        tracing::info!(uri, "endpoint registered");
        Ok(())
    }

    /// Removes the endpoint for `uri`; succeeds even when absent.
    pub fn unregister_endpoint(&self, uri: &str) -> Result<()> {
        self.ensure_live()?;
        self.registry.unregister(uri)?;
        tracing::info!(uri, "endpoint unregistered");
        Ok(())
    }

    /// Binds the listener set and spawns the acceptor and worker threads.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LifecycleState::Initialized {
            return Err(EngineError::InvalidState(
                "start requires a freshly initialized engine",
            ));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let conn_table = Arc::new(ConnTable::new());
        let (events_tx, events_rx) = event_queue();

        let (mut acceptor, waker) = Acceptor::bind(
            &self.config,
            events_tx.clone(),
            conn_table.clone(),
            self.tls.clone(),
            shutdown.clone(),
        )?;

        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.worker_count);
        for i in 0..self.config.worker_count {
            let worker = Worker::new(
                events_rx.clone(),
                events_tx.clone(),
                self.registry.clone(),
                conn_table.clone(),
                shutdown.clone(),
                self.config.strip_body_crlf,
            );
            let spawned = thread::Builder::new()
                .name(format!("restive-worker-{i}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    Self::abort_spawn(&shutdown, &events_tx, workers);
                    return Err(EngineError::Internal(format!("worker spawn failed: {err}")));
                }
            }
        }

        let acceptor_handle = thread::Builder::new()
            .name("restive-acceptor".to_owned())
            .spawn(move || acceptor.run());
        let acceptor_handle = match acceptor_handle {
            Ok(handle) => handle,
            Err(err) => {
                Self::abort_spawn(&shutdown, &events_tx, workers);
                return Err(EngineError::Internal(format!(
                    "acceptor spawn failed: {err}"
                )));
            }
        };

        self.runtime = Some(Runtime {
            shutdown,
            waker,
            events_tx,
            conn_table,
            acceptor: Some(acceptor_handle),
            workers,
        });
        self.state = LifecycleState::Started;
        tracing::info!(port = self.config.port, "engine started");
        Ok(())
    }

    /// Stops serving: closes listeners, wakes and drains workers, and
    /// force-closes connections still owned by blocked workers. Threads that
    /// outlive `wait_secs` are abandoned.
    pub fn stop(&mut self, wait_secs: u32) -> Result<()> {
        if self.state != LifecycleState::Started {
            return Err(EngineError::InvalidState("stop requires a started engine"));
        }
        self.state = LifecycleState::Stopping;
        tracing::info!(wait_secs, "stopping engine");

        let Some(mut runtime) = self.runtime.take() else {
            self.state = LifecycleState::Stopped;
            return Ok(());
        };

        runtime.shutdown.store(true, Ordering::SeqCst);
        if let Err(err) = runtime.waker.wake() {
            tracing::warn!(%err, "acceptor wake failed");
        }
        for _ in &runtime.workers {
            let _ = runtime.events_tx.send(Event::Shutdown);
        }
        runtime.conn_table.force_close_all();

        let deadline = Instant::now() + Duration::from_secs(u64::from(wait_secs));
        if let Some(handle) = runtime.acceptor.take() {
            join_with_deadline(handle, deadline, "acceptor");
        }
        for handle in runtime.workers.drain(..) {
            join_with_deadline(handle, deadline, "worker");
        }

        self.state = LifecycleState::Stopped;
        tracing::info!("engine stopped");
        Ok(())
    }

    /// Tears the engine down and releases the process slot. Requires the
    /// engine to be stopped (or never started).
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Started | LifecycleState::Stopping => Err(EngineError::InvalidState(
                "stop the engine before shutdown",
            )),
            LifecycleState::Uninitialized => {
                Err(EngineError::InvalidState("engine already shut down"))
            }
            LifecycleState::Initialized | LifecycleState::Stopped => {
                self.runtime = None;
                self.state = LifecycleState::Uninitialized;
                ENGINE_LIVE.store(false, Ordering::SeqCst);
                tracing::info!("engine shut down");
                Ok(())
            }
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state == LifecycleState::Uninitialized {
            return Err(EngineError::InvalidState("engine is shut down"));
        }
        Ok(())
    }

    /// Unwinds a partially spawned worker pool after a spawn failure.
    fn abort_spawn(
        shutdown: &Arc<AtomicBool>,
        events_tx: &EventSender,
        workers: Vec<JoinHandle<()>>,
    ) {
        shutdown.store(true, Ordering::SeqCst);
        for _ in &workers {
            let _ = events_tx.send(Event::Shutdown);
        }
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.state == LifecycleState::Started {
            let _ = self.stop(0);
        }
        if self.state != LifecycleState::Uninitialized {
            ENGINE_LIVE.store(false, Ordering::SeqCst);
        }
    }
}

fn join_with_deadline(handle: JoinHandle<()>, deadline: Instant, role: &'static str) {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(role, "thread exceeded stop deadline, abandoning");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let _ = handle.join();
}

#[cfg(test)]
mod test {
    use super::{Engine, LifecycleState};
    use crate::config::EngineConfig;
    use crate::error::EngineError;
    use crate::registry::MethodHandlers;
    use std::sync::Mutex;

    /// The process-wide single-instance contract means engine tests must not
    /// overlap; this lock serializes them within the test binary.
    static ENGINE_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn free_port() -> u16 {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("probe bind");
        probe.local_addr().expect("addr").port()
    }

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.port = free_port();
        config.worker_count = 2;
        config.client_count = 4;
        config.conn_timeout_secs = 5;
        config
    }

    #[test]
    fn init_shutdown_without_start_succeeds() {
        let _guard = ENGINE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut engine = Engine::init(test_config()).expect("init");
        assert_eq!(LifecycleState::Initialized, engine.state());
        engine.shutdown().expect("shutdown without start");
        assert_eq!(LifecycleState::Uninitialized, engine.state());
    }

    #[test]
    fn second_init_fails_while_engine_lives() {
        let _guard = ENGINE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut engine = Engine::init(test_config()).expect("init");
        let err = Engine::init(test_config()).expect_err("second init");
        assert!(matches!(err, EngineError::InvalidState(_)));
        engine.shutdown().expect("shutdown");

        // slot released; a fresh engine may exist again
        let mut engine = Engine::init(test_config()).expect("init after shutdown");
        engine.shutdown().expect("shutdown");
    }

    #[test]
    fn full_lifecycle_roundtrip() {
        let _guard = ENGINE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut engine = Engine::init(test_config()).expect("init");
        engine.start().expect("start");
        assert_eq!(LifecycleState::Started, engine.state());

        let err = engine.start().expect_err("double start");
        assert!(matches!(err, EngineError::InvalidState(_)));

        engine.stop(5).expect("stop");
        assert_eq!(LifecycleState::Stopped, engine.state());

        // stopped engines need a shutdown before anything else
        let err = engine.start().expect_err("start after stop");
        assert!(matches!(err, EngineError::InvalidState(_)));

        engine.shutdown().expect("shutdown");
    }

    #[test]
    fn stop_requires_started_engine() {
        let _guard = ENGINE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut engine = Engine::init(test_config()).expect("init");
        let err = engine.stop(1).expect_err("stop before start");
        assert!(matches!(err, EngineError::InvalidState(_)));
        engine.shutdown().expect("shutdown");
    }

    #[test]
    fn shutdown_requires_stop_first() {
        let _guard = ENGINE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut engine = Engine::init(test_config()).expect("init");
        engine.start().expect("start");
        let err = engine.shutdown().expect_err("shutdown while started");
        assert!(matches!(err, EngineError::InvalidState(_)));

        engine.stop(5).expect("stop");
        engine.shutdown().expect("shutdown");
    }

    #[test]
    fn registration_is_legal_before_and_after_start() {
        let _guard = ENGINE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut engine = Engine::init(test_config()).expect("init");
        engine
            .register_endpoint("/before", MethodHandlers::new().on_get(|_| Ok(())))
            .expect("register before start");

        engine.start().expect("start");
        engine
            .register_endpoint("/after", MethodHandlers::new().on_get(|_| Ok(())))
            .expect("register after start");
        engine
            .unregister_endpoint("/before")
            .expect("unregister while started");

        engine.stop(5).expect("stop");
        engine.shutdown().expect("shutdown");

        let err = engine
            .register_endpoint("/late", MethodHandlers::new())
            .expect_err("register after shutdown");
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn init_fails_on_invalid_config() {
        let _guard = ENGINE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut config = test_config();
        config.worker_count = 0;
        assert!(Engine::init(config).is_err());
    }

    #[test]
    fn secure_init_fails_without_key_material_on_disk() {
        let _guard = ENGINE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut config = test_config();
        config.secure = true;
        config.ssl_certificate = Some("/nonexistent/cert.pem".into());
        config.ssl_key = Some("/nonexistent/key.pem".into());
        let err = Engine::init(config).expect_err("cert load must fail");
        assert!(matches!(err, EngineError::Tls(_)));

        // the failed init must release the process slot
        let mut engine = Engine::init(test_config()).expect("init after failed init");
        engine.shutdown().expect("shutdown");
    }
}
