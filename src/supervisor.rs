//! Connection supervisor.
//!
//! Owns the connection lifecycle: connect, run a session, classify why it
//! ended, and reconnect after a delay when that is allowed. Every session
//! gets a fresh [`AgentContext`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::AgentContext;
use crate::config::{Settings, Utils};
use crate::error::Result;
use crate::runtime::{run_session, SessionEnd};
use crate::world::Connection;

/// Opens connections to the world.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection>;
}

/// Kick messages that mean another session holds this account.
pub const DUPLICATE_LOGIN_MARKERS: &[&str] = &["already connected", "duplicate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    /// Reconnecting would only kick the other session or loop forever.
    DuplicateLogin,
    Recoverable,
}

/// Classify a disconnect reason. Matching is case-insensitive.
pub fn classify_disconnect(reason: &str) -> DisconnectKind {
    let reason = reason.to_lowercase();
    if DUPLICATE_LOGIN_MARKERS.iter().any(|m| reason.contains(m)) {
        DisconnectKind::DuplicateLogin
    } else {
        DisconnectKind::Recoverable
    }
}

/// Reconnect delay that doubles up to a cap and resets after a successful
/// connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn from_utils(utils: &Utils) -> Self {
        Self::new(utils.reconnect_delay(), utils.max_reconnect_delay())
    }

    /// The delay to wait now.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Why the supervisor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The session was closed locally.
    Closed,
    /// Interrupted by the shutdown signal.
    Interrupted,
    DuplicateLogin(String),
    /// Disconnected with auto-reconnect turned off.
    ReconnectDisabled(String),
}

pub struct Supervisor<C> {
    connector: C,
    settings: Settings,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, settings: Settings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Run until the session is closed, reconnection is ruled out, or Ctrl+C.
    pub async fn run(&self) -> Result<SupervisorExit> {
        self.run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
    }

    /// Run until `shutdown` resolves or the supervisor stops on its own.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<SupervisorExit>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let utils = &self.settings.utils;
        let username = &self.settings.bot_account.username;
        let mut backoff = Backoff::from_utils(utils);

        loop {
            tracing::info!(
                "Connecting to {}:{} as {}",
                self.settings.server.ip,
                self.settings.server.port,
                username
            );

            let connection = match self.connector.connect().await {
                Ok(connection) => {
                    backoff.reset();
                    connection
                }
                Err(e) if utils.auto_reconnect => {
                    let delay = backoff.next_delay();
                    tracing::warn!("Connection failed: {}; retrying in {:?}", e, delay);
                    let interrupted = tokio::select! {
                        _ = tokio::time::sleep(delay) => false,
                        _ = &mut shutdown => true,
                    };
                    if interrupted {
                        return Ok(SupervisorExit::Interrupted);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let ctx = AgentContext::new(connection.world, username, self.settings.tasks.clone());
            let end = tokio::select! {
                end = run_session(ctx, connection.events) => end,
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    return Ok(SupervisorExit::Interrupted);
                }
            };

            let reason = match end {
                SessionEnd::Closed => return Ok(SupervisorExit::Closed),
                SessionEnd::Disconnected { reason } => reason,
            };

            if classify_disconnect(&reason) == DisconnectKind::DuplicateLogin {
                tracing::error!("Duplicate login, not reconnecting: {}", reason);
                return Ok(SupervisorExit::DuplicateLogin(reason));
            }
            if !utils.auto_reconnect {
                tracing::info!("Auto-reconnect is off, stopping");
                return Ok(SupervisorExit::ReconnectDisabled(reason));
            }

            let delay = backoff.next_delay();
            tracing::info!("Reconnecting in {:?}", delay);
            let interrupted = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = &mut shutdown => true,
            };
            if interrupted {
                return Ok(SupervisorExit::Interrupted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use super::*;
    use crate::error::Error;
    use crate::world::{MemoryWorld, Scenario, WorldEvent};

    /// Each connect pops one script: `None` fails to connect, `Some(events)`
    /// connects and replays the events, then drops the stream.
    struct ScriptedConnector {
        scripts: Mutex<VecDeque<Option<Vec<WorldEvent>>>>,
        connects: AtomicUsize,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Option<Vec<WorldEvent>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                connects: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Connector for Arc<ScriptedConnector> {
        async fn connect(&self) -> Result<Connection> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front();
            let events = match script {
                Some(Some(events)) => events,
                Some(None) => return Err(Error::Connection("ECONNREFUSED".to_string())),
                None => return Err(Error::Connection("script exhausted".to_string())),
            };

            let (tx, rx) = mpsc::unbounded_channel();
            for event in events {
                tx.send(event).unwrap();
            }
            Ok(Connection {
                world: Arc::new(MemoryWorld::new(Scenario::default())),
                events: rx,
            })
        }
    }

    fn settings(auto_reconnect: bool) -> Settings {
        let mut settings = Settings::default();
        settings.utils.auto_reconnect = auto_reconnect;
        settings.utils.auto_reconnect_delay = 1;
        settings
    }

    fn kicked(reason: &str) -> Option<Vec<WorldEvent>> {
        Some(vec![WorldEvent::Kicked(reason.to_string()), WorldEvent::End])
    }

    #[test]
    fn test_classify_disconnect() {
        assert_eq!(
            classify_disconnect("You are ALREADY CONNECTED to this server"),
            DisconnectKind::DuplicateLogin
        );
        assert_eq!(
            classify_disconnect("Duplicate login"),
            DisconnectKind::DuplicateLogin
        );
        for reason in ["read ECONNRESET", "write EPIPE", "Server closed", ""] {
            assert_eq!(classify_disconnect(reason), DisconnectKind::Recoverable, "{reason}");
        }
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(400));
        let delays: Vec<u128> = (0..4).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 400]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));

        let mut fixed = Backoff::from_utils(&Utils::default());
        assert_eq!(fixed.next_delay(), Duration::from_millis(5000));
        assert_eq!(fixed.next_delay(), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_reconnects_until_duplicate_login() {
        crate::logging::init_test();
        let connector = Arc::new(ScriptedConnector::new(vec![
            kicked("Connection throttled"),
            kicked("You are already connected to this server!"),
            kicked("never reached"),
        ]));
        let supervisor = Supervisor::new(connector.clone(), settings(true));

        let exit = supervisor.run_until(std::future::pending()).await.unwrap();

        assert_eq!(
            exit,
            SupervisorExit::DuplicateLogin("You are already connected to this server!".to_string())
        );
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_reconnect_when_disabled() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            kicked("Server restarting"),
            kicked("never reached"),
        ]));
        let supervisor = Supervisor::new(connector.clone(), settings(false));

        let exit = supervisor.run_until(std::future::pending()).await.unwrap();

        assert_eq!(
            exit,
            SupervisorExit::ReconnectDisabled("Server restarting".to_string())
        );
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connects_are_retried() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            None,
            None,
            Some(vec![WorldEvent::Shutdown]),
        ]));
        let supervisor = Supervisor::new(connector.clone(), settings(true));

        let exit = supervisor.run_until(std::future::pending()).await.unwrap();

        assert_eq!(exit, SupervisorExit::Closed);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_connect_without_reconnect_is_an_error() {
        let connector = Arc::new(ScriptedConnector::new(vec![None]));
        let supervisor = Supervisor::new(connector, settings(false));

        let result = supervisor.run_until(std::future::pending()).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_shutdown_signal_interrupts_the_wait() {
        let connector = Arc::new(ScriptedConnector::new(vec![kicked("Server closed")]));
        let mut settings = settings(true);
        settings.utils.auto_reconnect_delay = 60_000;
        let supervisor = Supervisor::new(connector.clone(), settings);

        let exit = supervisor
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();

        assert_eq!(exit, SupervisorExit::Interrupted);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }
}
