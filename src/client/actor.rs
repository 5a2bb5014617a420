//! Single-owner actor behind [`ExecutionClient`](super::ExecutionClient).
//!
//! The actor owns the client state, the progress reconciler and the poll
//! timer. Commands arrive from handles over a channel; network calls run in
//! spawned tasks and report back as completions, so every state mutation
//! happens on this one task and never interleaves with another.

use chrono::Local;
use reqwest::StatusCode;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use super::reconciler::ProgressReconciler;
use super::state::{ClientEvent, ClientState, TaskOutcome};
use super::{ClientConfig, ClientError};
use crate::api::{
    Device, DeviceList, ExecuteReply, ServerHealth, StatusSnapshot, TaskRequest, TaskResult,
    DEVICES_PATH, EXECUTE_PATH, HEALTH_PATH, STATUS_PATH, STOP_PATH,
};
use crate::transport::{HttpTransport, TransportError};

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

/// Commands sent from handles to the actor.
pub(crate) enum Command {
    CheckHealth { reply: Option<Reply<ServerHealth>> },
    ListDevices { reply: Reply<Vec<Device>> },
    Execute { request: TaskRequest, reply: Reply<String> },
    Stop { reply: Reply<()> },
    Refresh { reply: Reply<bool> },
    SetBaseUrl { url: String, reply: Reply<()> },
    Shutdown,
}

/// Results of spawned network calls, marshaled back onto the actor.
enum Completion {
    Health {
        seq: u64,
        result: Result<ServerHealth, TransportError>,
        reply: Option<Reply<ServerHealth>>,
    },
    Submitted {
        run: Uuid,
        result: Result<(StatusCode, ExecuteReply), TransportError>,
        reply: Reply<String>,
    },
    Stopped {
        run: Uuid,
        result: Result<StatusCode, TransportError>,
        reply: Reply<()>,
    },
    Status {
        run: Uuid,
        source: PollSource,
        result: Result<StatusSnapshot, TransportError>,
    },
}

/// Who asked for a status snapshot.
enum PollSource {
    Timer,
    Consumer(Reply<bool>),
}

/// One submitted task.
struct TaskRun {
    id: Uuid,
    task: String,
    /// Whether the server acknowledged the submission.
    accepted: bool,
}

/// Supervisory poll timer for one task run. Dropping it cancels polling.
struct PollTimer {
    run: Uuid,
    interval: Interval,
}

pub(crate) struct ClientActor {
    config: ClientConfig,
    transport: HttpTransport,
    state: ClientState,
    reconciler: ProgressReconciler,
    run: Option<TaskRun>,
    poll: Option<PollTimer>,
    /// Run whose supervisory status call is outstanding.
    poll_in_flight: Option<Uuid>,
    /// Sequence number of the latest dispatched health check.
    health_seq: u64,
    /// Health results at or below this sequence number are stale.
    health_applied: u64,
    state_tx: watch::Sender<ClientState>,
    events: broadcast::Sender<ClientEvent>,
    completions: mpsc::UnboundedSender<Completion>,
    completions_rx: Option<mpsc::UnboundedReceiver<Completion>>,
}

impl ClientActor {
    pub(crate) fn new(
        config: ClientConfig,
        transport: HttpTransport,
        state_tx: watch::Sender<ClientState>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (completions, completions_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport,
            state: ClientState::default(),
            reconciler: ProgressReconciler::new(),
            run: None,
            poll: None,
            poll_in_flight: None,
            health_seq: 0,
            health_applied: 0,
            state_tx,
            events,
            completions,
            completions_rx: Some(completions_rx),
        }
    }

    /// Run until shut down or every handle is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let Some(mut completions) = self.completions_rx.take() else {
            return;
        };

        tracing::info!(base_url = self.transport.base_url(), "AutoGLM client started");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                Some(completion) = completions.recv() => self.handle_completion(completion),

                run = next_tick(&mut self.poll) => self.poll_status(run),
            }
        }

        self.cancel_polling();
        tracing::info!("AutoGLM client stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::CheckHealth { reply } => self.dispatch_health(reply),
            Command::ListDevices { reply } => self.dispatch_devices(reply),
            Command::Execute { request, reply } => self.submit(request, reply),
            Command::Stop { reply } => self.stop(reply),
            Command::Refresh { reply } => self.refresh(reply),
            Command::SetBaseUrl { url, reply } => self.set_base_url(url, reply),
            Command::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Health { seq, result, reply } => self.on_health(seq, result, reply),
            Completion::Submitted { run, result, reply } => self.on_submitted(run, result, reply),
            Completion::Stopped { run, result, reply } => self.on_stopped(run, result, reply),
            Completion::Status {
                run,
                source,
                result,
            } => self.on_status(run, source, result),
        }
    }

    // ----- health -----

    fn dispatch_health(&mut self, reply: Option<Reply<ServerHealth>>) {
        self.health_seq += 1;
        let seq = self.health_seq;
        let transport = self.transport.clone();
        let timeout = self.config.request_timeout;
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let result = transport.get::<ServerHealth>(HEALTH_PATH, timeout).await;
            let _ = completions.send(Completion::Health { seq, result, reply });
        });
    }

    fn on_health(
        &mut self,
        seq: u64,
        result: Result<ServerHealth, TransportError>,
        reply: Option<Reply<ServerHealth>>,
    ) {
        let result = result.map_err(ClientError::from);

        if seq <= self.health_applied {
            tracing::debug!(seq, "Discarding stale health check result");
            respond(reply, result);
            return;
        }
        self.health_applied = seq;

        let was_connected = self.state.is_connected;
        match &result {
            Ok(health) => {
                self.state.is_connected = health.is_ok();
                self.state.last_error = None;
                self.state.agent_initialized = health.agent_initialized;
                self.state.devices = health.devices.clone();
                tracing::debug!(
                    status = %health.status,
                    devices = health.devices.len(),
                    "Health check completed"
                );
            }
            Err(e) => {
                self.state.is_connected = false;
                self.state.last_error = Some(e.clone());
                tracing::warn!("Health check failed: {}", e);
            }
        }

        self.publish();
        if was_connected != self.state.is_connected {
            self.emit(ClientEvent::ConnectionChanged {
                connected: self.state.is_connected,
            });
        }
        respond(reply, result);
    }

    fn dispatch_devices(&self, reply: Reply<Vec<Device>>) {
        let transport = self.transport.clone();
        let timeout = self.config.request_timeout;

        tokio::spawn(async move {
            let result = transport
                .get::<DeviceList>(DEVICES_PATH, timeout)
                .await
                .map(|list| list.devices)
                .map_err(ClientError::from);
            let _ = reply.send(result);
        });
    }

    fn set_base_url(&mut self, url: String, reply: Reply<()>) {
        if self.state.is_executing {
            let _ = reply.send(Err(ClientError::AlreadyExecuting));
            return;
        }

        match HttpTransport::new(&url) {
            Ok(transport) => {
                tracing::info!(base_url = transport.base_url(), "Server URL changed");
                self.config.base_url = transport.base_url().to_string();
                self.transport = transport;
                // Results from the previous server must not land after this point.
                self.health_applied = self.health_seq;
                self.dispatch_health(None);
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let err = ClientError::from(e);
                tracing::warn!("Rejected server URL: {}", err);
                let was_connected = self.state.is_connected;
                self.state.is_connected = false;
                self.state.last_error = Some(err.clone());
                self.publish();
                if was_connected {
                    self.emit(ClientEvent::ConnectionChanged { connected: false });
                }
                let _ = reply.send(Err(err));
            }
        }
    }

    // ----- submission -----

    fn submit(&mut self, request: TaskRequest, reply: Reply<String>) {
        if self.state.is_executing {
            tracing::warn!(task = %request.task, "Rejecting task, another one is executing");
            let _ = reply.send(Err(ClientError::AlreadyExecuting));
            return;
        }
        if request.task.trim().is_empty() {
            let _ = reply.send(Err(ClientError::InvalidTask));
            return;
        }

        let run = Uuid::new_v4();
        self.run = Some(TaskRun {
            id: run,
            task: request.task.clone(),
            accepted: false,
        });
        self.reconciler.reset();
        self.state.is_executing = true;
        self.state.current_task = Some(request.task.clone());
        self.state.last_error = None;
        self.state.steps.clear();
        self.state.outcome = None;
        self.state.started_at = Some(Local::now());
        self.publish();

        tracing::info!(%run, task = %request.task, device = ?request.device_id, "Submitting task");

        let transport = self.transport.clone();
        let timeout = self.config.submit_timeout;
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = transport
                .post_with_status::<_, ExecuteReply>(EXECUTE_PATH, &request, timeout)
                .await;
            let _ = completions.send(Completion::Submitted { run, result, reply });
        });
    }

    fn on_submitted(
        &mut self,
        run: Uuid,
        result: Result<(StatusCode, ExecuteReply), TransportError>,
        reply: Reply<String>,
    ) {
        let result = acknowledgment(result);

        if self.current_run() != Some(run) {
            match &result {
                Ok(ack) if self.run.is_none() => {
                    tracing::warn!(
                        %run,
                        task = %ack.task,
                        "Server accepted a task after it was stopped, stopping it again"
                    );
                    self.dispatch_orphan_stop(run);
                }
                Ok(ack) => {
                    tracing::warn!(%run, task = %ack.task, "Server accepted a superseded task");
                }
                Err(e) => tracing::debug!(%run, "Submission of a stopped task failed: {}", e),
            }
            let _ = reply.send(result.map(|ack| ack.message));
            return;
        }

        let result = result.map(|ack| ack.message);
        match &result {
            Ok(message) => {
                let task = match self.run.as_mut() {
                    Some(current) => {
                        current.accepted = true;
                        current.task.clone()
                    }
                    None => String::new(),
                };
                tracing::info!(%run, "Task accepted: {}", message);
                self.start_polling(run);
                self.emit(ClientEvent::TaskSubmitted {
                    task,
                    message: message.clone(),
                });
            }
            Err(e) => {
                tracing::error!(%run, "Task submission failed: {}", e);
                self.run = None;
                self.state.is_executing = false;
                self.state.last_error = Some(e.clone());
                self.publish();
            }
        }
        let _ = reply.send(result);
    }

    // ----- stop -----

    fn stop(&mut self, reply: Reply<()>) {
        let Some(run) = self.current_run().filter(|_| self.state.is_executing) else {
            let _ = reply.send(Ok(()));
            return;
        };

        tracing::info!(%run, "Stopping task");
        let transport = self.transport.clone();
        let timeout = self.config.request_timeout;
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = transport.post_ignoring_body(STOP_PATH, timeout).await;
            let _ = completions.send(Completion::Stopped { run, result, reply });
        });
    }

    fn on_stopped(
        &mut self,
        run: Uuid,
        result: Result<StatusCode, TransportError>,
        reply: Reply<()>,
    ) {
        match result {
            Ok(_) => {
                if self.current_run() == Some(run) {
                    self.finish(TaskOutcome::Stopped);
                } else {
                    tracing::debug!(%run, "Stop acknowledged after the task had ended");
                }
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let err = ClientError::from(e);
                tracing::warn!(%run, "Stop request failed: {}", err);
                self.state.last_error = Some(err.clone());
                self.publish();
                let _ = reply.send(Err(err));
            }
        }
    }

    /// Stop a task the server accepted after the client had already let go
    /// of it. Nobody waits for the outcome.
    fn dispatch_orphan_stop(&self, run: Uuid) {
        let transport = self.transport.clone();
        let timeout = self.config.request_timeout;
        tokio::spawn(async move {
            match transport.post_ignoring_body(STOP_PATH, timeout).await {
                Ok(status) => tracing::info!(%run, status = status.as_u16(), "Stop sent for accepted task"),
                Err(e) => tracing::warn!(%run, "Failed to stop accepted task: {}", e),
            }
        });
    }

    // ----- polling -----

    fn start_polling(&mut self, run: Uuid) {
        self.cancel_polling();

        let period = self.config.poll_interval;
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(PollTimer { run, interval });
        tracing::debug!(%run, ?period, "Status polling started");
    }

    fn cancel_polling(&mut self) {
        if let Some(timer) = self.poll.take() {
            tracing::debug!(run = %timer.run, "Status polling cancelled");
        }
        self.poll_in_flight = None;
    }

    fn poll_status(&mut self, run: Uuid) {
        if self.poll_in_flight.is_some() {
            tracing::debug!(%run, "Previous status poll still in flight, skipping tick");
            return;
        }
        self.poll_in_flight = Some(run);
        self.dispatch_status(run, PollSource::Timer);
    }

    fn refresh(&mut self, reply: Reply<bool>) {
        match self.run.as_ref().filter(|run| run.accepted) {
            Some(run) => {
                let run = run.id;
                self.dispatch_status(run, PollSource::Consumer(reply));
            }
            None => {
                let _ = reply.send(Ok(false));
            }
        }
    }

    fn dispatch_status(&self, run: Uuid, source: PollSource) {
        let transport = self.transport.clone();
        let timeout = self.config.request_timeout;
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let result = transport.get::<StatusSnapshot>(STATUS_PATH, timeout).await;
            let _ = completions.send(Completion::Status {
                run,
                source,
                result,
            });
        });
    }

    fn on_status(
        &mut self,
        run: Uuid,
        source: PollSource,
        result: Result<StatusSnapshot, TransportError>,
    ) {
        let reply = match source {
            PollSource::Timer => {
                // A late result of a cancelled run must not release the
                // current run's poll.
                if self.poll_in_flight == Some(run) {
                    self.poll_in_flight = None;
                }
                None
            }
            PollSource::Consumer(reply) => Some(reply),
        };

        if self.current_run() != Some(run) {
            tracing::debug!(%run, "Discarding status snapshot of a finished task");
            respond(reply, Ok(false));
            return;
        }

        match result {
            Ok(snapshot) => {
                let changed = self.apply_snapshot(&snapshot);
                respond(reply, Ok(changed));
            }
            Err(e) => match reply {
                Some(reply) => {
                    let _ = reply.send(Err(e.into()));
                }
                None => tracing::warn!(%run, "Status poll failed: {}", e),
            },
        }
    }

    /// Feed a snapshot into the reconciler and resolve terminal snapshots.
    fn apply_snapshot(&mut self, snapshot: &StatusSnapshot) -> bool {
        let changed = snapshot
            .progress
            .as_deref()
            .map_or(false, |progress| self.reconciler.apply(progress));

        if changed {
            self.state.steps = self.reconciler.steps().to_vec();
            tracing::debug!(steps = self.state.steps.len(), step = snapshot.step, "Progress updated");
            self.emit(ClientEvent::StepsUpdated {
                steps: self.state.steps.clone(),
            });
        }

        if snapshot.running {
            if changed {
                self.publish();
            }
        } else {
            self.finish(TaskOutcome::from_terminal(snapshot));
        }
        changed
    }

    /// End the current task run.
    fn finish(&mut self, outcome: TaskOutcome) {
        self.cancel_polling();
        let run = self.run.take();
        self.state.is_executing = false;

        match &outcome {
            TaskOutcome::Failed { error } => {
                tracing::error!("Task failed: {}", error);
                self.state.last_error = Some(ClientError::ServerReported(error.clone()));
            }
            TaskOutcome::Completed { message } => tracing::info!("Task completed: {}", message),
            TaskOutcome::Finished => tracing::info!("Task finished"),
            TaskOutcome::Stopped => tracing::info!("Task stopped by user"),
        }

        self.state.outcome = Some(outcome.clone());
        self.publish();

        self.emit(ClientEvent::TaskFinished {
            task: run.map(|run| run.task),
            outcome,
            finished_at: Local::now(),
        });
    }

    fn current_run(&self) -> Option<Uuid> {
        self.run.as_ref().map(|run| run.id)
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Wait for the next poll tick, or forever when no timer is running.
async fn next_tick(poll: &mut Option<PollTimer>) -> Uuid {
    match poll {
        Some(timer) => {
            timer.interval.tick().await;
            timer.run
        }
        None => std::future::pending().await,
    }
}

/// Turn a reply to `POST /execute` into the accepted task or an error.
///
/// Rejections carry the server's `error`. An acknowledgment that arrives with
/// a non-2xx status is not trusted.
fn acknowledgment(
    result: Result<(StatusCode, ExecuteReply), TransportError>,
) -> Result<TaskResult, ClientError> {
    match result? {
        (_, ExecuteReply::Rejected(rejection)) => {
            if let Some(current) = &rejection.current_task {
                tracing::debug!(current_task = %current, "Server is busy");
            }
            Err(ClientError::ServerReported(rejection.error))
        }
        (status, ExecuteReply::Accepted(ack)) if status.is_success() => Ok(ack),
        (status, ExecuteReply::Accepted(ack)) => Err(TransportError::Http {
            status: status.as_u16(),
            body: ack.message,
        }
        .into()),
    }
}

fn respond<T>(reply: Option<Reply<T>>, result: Result<T, ClientError>) {
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}
