//! Cloneable handle to a running execution client.

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};

use super::actor::{ClientActor, Command};
use super::state::{ClientEvent, ClientState, TaskOutcome};
use super::{ClientConfig, ClientError};
use crate::api::{Device, ServerHealth, TaskRequest};
use crate::transport::HttpTransport;

/// Capacity of the command queue.
const COMMAND_CAPACITY: usize = 32;

/// Capacity of the event broadcast; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 64;

/// Client for the AutoGLM API server.
///
/// Submits tasks, polls their status while they run and keeps a
/// [`ClientState`] that consumers can read, watch, or follow through
/// [`ClientEvent`]s. All state lives in a background task; handles are cheap
/// to clone and the client shuts down when the last one is dropped or
/// [`shutdown`](Self::shutdown) is called.
///
/// # Example
/// ```rust,no_run
/// use autoglm_client::{ClientConfig, ExecutionClient};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = ExecutionClient::start(ClientConfig::default())?;
///     client.check_health().await?;
///
///     let ack = client.execute_task("打开微信", Some("192.168.1.100:5555".to_string())).await?;
///     println!("{}", ack);
///
///     let outcome = client.wait_for_completion().await;
///     println!("{:?}", outcome);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ExecutionClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ClientState>,
    events: broadcast::Sender<ClientEvent>,
    config: ClientConfig,
}

impl ExecutionClient {
    /// Start a client.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn start(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config.base_url)?;
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state) = watch::channel(ClientState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = ClientActor::new(config.clone(), transport, state_tx, events.clone());
        tokio::spawn(actor.run(command_rx));

        Ok(Self {
            commands,
            state,
            events,
            config,
        })
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, ClientError>>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ClientError::Closed)?;
        response.await.map_err(|_| ClientError::Closed)?
    }

    /// Check server health and update the connection state.
    pub async fn check_health(&self) -> Result<ServerHealth, ClientError> {
        self.call(|reply| Command::CheckHealth { reply: Some(reply) })
            .await
    }

    /// Start a health check without waiting for it.
    ///
    /// The outcome shows up in [`state`](Self::state) and as a
    /// [`ClientEvent::ConnectionChanged`] when the connection flips.
    pub fn request_health_check(&self) {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            if commands
                .send(Command::CheckHealth { reply: None })
                .await
                .is_err()
            {
                tracing::debug!("Health check requested after the client shut down");
            }
        });
    }

    /// List the devices attached to the server.
    pub async fn list_devices(&self) -> Result<Vec<Device>, ClientError> {
        self.call(|reply| Command::ListDevices { reply }).await
    }

    /// Submit a task.
    ///
    /// Resolves with the server's acknowledgment once the task is accepted,
    /// not when it completes. Fails with [`ClientError::AlreadyExecuting`],
    /// without contacting the server, while another task is executing.
    ///
    /// A task stopped before the server acknowledged it stays stopped: should
    /// the server accept it afterwards, the client sends another stop.
    pub async fn execute_task(
        &self,
        task: impl Into<String>,
        device_id: Option<String>,
    ) -> Result<String, ClientError> {
        let task = task.into();
        if task.trim().is_empty() {
            return Err(ClientError::InvalidTask);
        }

        let mut request = TaskRequest::new(task);
        request.device_id = device_id;
        self.call(|reply| Command::Execute { request, reply }).await
    }

    /// Stop the executing task. Succeeds immediately when nothing executes.
    pub async fn stop_task(&self) -> Result<(), ClientError> {
        self.call(|reply| Command::Stop { reply }).await
    }

    /// Fetch the task status now instead of waiting for the next poll.
    ///
    /// Returns whether the step list changed. Does nothing while no accepted
    /// task is running.
    pub async fn refresh_progress(&self) -> Result<bool, ClientError> {
        self.call(|reply| Command::Refresh { reply }).await
    }

    /// Point the client at another server and check its health.
    pub async fn set_base_url(&self, url: impl Into<String>) -> Result<(), ClientError> {
        let url = url.into();
        self.call(|reply| Command::SetBaseUrl { url, reply }).await
    }

    /// Refresh progress at the configured progress interval until the
    /// current task ends, then return its outcome.
    ///
    /// Returns the previous outcome right away when nothing executes, and
    /// `None` if the client shuts down first.
    pub async fn wait_for_completion(&self) -> Option<TaskOutcome> {
        let mut state = self.state.clone();
        let mut ticker = interval(self.config.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            {
                let current = state.borrow_and_update();
                if !current.is_executing {
                    return current.outcome.clone();
                }
            }

            tokio::select! {
                _ = ticker.tick() => {
                    match self.refresh_progress().await {
                        Ok(_) => {}
                        Err(ClientError::Closed) => return None,
                        Err(e) => tracing::debug!("Progress refresh failed: {}", e),
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Watch the state for changes.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.clone()
    }

    /// Subscribe to client events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Configuration the client was started with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shut the client down. Polling stops and later calls fail with
    /// [`ClientError::Closed`].
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}
