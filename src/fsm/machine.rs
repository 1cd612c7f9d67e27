//! The discovery actor.
//!
//! One task owns the protocol state, the retry budget, the candidate host and
//! the retry timer. Entry actions run on their own tasks and report back
//! through the command queue, so every mutation happens on the actor task in
//! arrival order.
//!
//! Each launched action is tagged with an epoch. An outcome or retry timer
//! whose epoch is no longer current belongs to an attempt that a later
//! transition (typically a `reset`) has superseded, and is dropped.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Event, ProtocolState, RetryBudget, RetryScheduler};
use crate::config::AgentConfig;
use crate::error::{DiscoveryError, Result};
use crate::gateway::{GatewayResolver, RouteTable};
use crate::probe::{HostProber, LookupOutcome};
use crate::process::{IdentityBuilder, ProcFs, ProcessMetadata};
use crate::settings::{AnnounceResponse, SettingsApplier};
use crate::transport::{AgentTransport, HttpTransport, Method};

/// External capabilities the state machine drives
#[derive(Clone)]
pub struct Collaborators {
    /// Host agent client
    pub transport: Arc<dyn AgentTransport>,
    /// Default gateway lookup
    pub gateway: Arc<dyn GatewayResolver>,
    /// Kernel process metadata
    pub metadata: Arc<dyn ProcessMetadata>,
    /// Consumer of the announce response
    pub settings: Arc<dyn SettingsApplier>,
}

impl Collaborators {
    /// HTTP transport, kernel routing table and proc filesystem from `config`.
    pub fn system(config: &AgentConfig, settings: Arc<dyn SettingsApplier>) -> Result<Self> {
        Ok(Self {
            transport: Arc::new(HttpTransport::new(config.request_timeout())?),
            gateway: Arc::new(RouteTable::new(&config.route_table)),
            metadata: Arc::new(ProcFs::new(&config.proc_root)),
            settings,
        })
    }
}

/// Observable view of the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current protocol state
    pub state: ProtocolState,
    /// Retry budget left for the current step
    pub retries: u32,
    /// Candidate host agent address
    pub host: String,
}

enum Command {
    Reset,
    Completed { epoch: u64, outcome: Outcome },
    Retry { epoch: u64 },
}

enum Outcome {
    Lookup(LookupOutcome),
    Announce(Result<AnnounceResponse>),
    Test(Result<()>),
}

/// Handle to a running discovery cycle.
///
/// Dropping the handle stops the actor and its pending retry timer.
pub struct Discovery {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl Discovery {
    /// Start discovery on the current tokio runtime and fire `init`.
    pub fn spawn(config: AgentConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let (commands, queue) = mpsc::unbounded_channel();
        let initial = Snapshot {
            state: ProtocolState::None,
            retries: config.max_retries,
            host: config.host.clone(),
        };
        let (snapshot_tx, snapshot) = watch::channel(initial);

        let machine = Machine::new(config, collaborators, commands.clone(), snapshot_tx);
        let task = tokio::spawn(machine.run(queue));

        Self {
            commands,
            snapshot,
            task,
        }
    }

    /// Reset the retry budget and restart discovery from host lookup.
    pub fn reset(&self) {
        if self.commands.send(Command::Reset).is_err() {
            warn!("discovery stopped, ignoring reset");
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Current protocol state
    pub fn state(&self) -> ProtocolState {
        self.snapshot.borrow().state
    }

    /// Whether telemetry may flow
    pub fn is_ready(&self) -> bool {
        self.state() == ProtocolState::Ready
    }

    /// Watch snapshots as the machine moves
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Wait until the machine reaches `state`.
    pub async fn wait_for(&self, state: ProtocolState) -> Result<Snapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.state == state)
            .await
            .map_err(|_| DiscoveryError::Stopped)?;
        Ok(snapshot.clone())
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Machine {
    config: Arc<AgentConfig>,
    state: ProtocolState,
    retries: RetryBudget,
    host: String,
    epoch: u64,
    scheduler: RetryScheduler,
    prober: HostProber,
    identity: IdentityBuilder,
    collaborators: Collaborators,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Sender<Snapshot>,
}

impl Machine {
    fn new(
        config: Arc<AgentConfig>,
        collaborators: Collaborators,
        commands: mpsc::UnboundedSender<Command>,
        snapshot: watch::Sender<Snapshot>,
    ) -> Self {
        let prober = HostProber::new(Arc::clone(&collaborators.transport), Arc::clone(&config));
        let identity = IdentityBuilder::new(
            Arc::clone(&collaborators.metadata),
            config.port,
            config.request_timeout(),
        );

        Self {
            state: ProtocolState::None,
            retries: RetryBudget::new(config.max_retries),
            host: config.host.clone(),
            epoch: 0,
            scheduler: RetryScheduler::new(config.retry_period()),
            prober,
            identity,
            collaborators,
            commands,
            snapshot,
            config,
        }
    }

    async fn run(mut self, mut queue: mpsc::UnboundedReceiver<Command>) {
        warn!(
            transport = self.collaborators.transport.name(),
            "host agent discovery starting, instrumentation begins"
        );
        self.fire(Event::Init);
        self.publish();

        while let Some(command) = queue.recv().await {
            match command {
                Command::Reset => self.reset(),
                Command::Completed { epoch, outcome } => self.completed(epoch, outcome),
                Command::Retry { epoch } => self.retry(epoch),
            }
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(Snapshot {
            state: self.state,
            retries: self.retries.remaining(),
            host: self.host.clone(),
        });
    }

    fn reset(&mut self) {
        self.retries.reset();
        self.fire(Event::Init);
    }

    fn fire(&mut self, event: Event) {
        let Some(next) = event.transition(self.state) else {
            debug!("event {} inappropriate in current state {}", event, self.state);
            return;
        };

        debug!(from = %self.state, to = %next, "{}", event);
        self.state = next;
        if event == Event::Init {
            self.retries.reset();
        }
        self.enter();
    }

    fn enter(&mut self) {
        match self.state {
            ProtocolState::Init => self.lookup_agent_host(),
            ProtocolState::Unannounced => self.announce(),
            ProtocolState::Announced => self.test_agent(),
            ProtocolState::Ready => debug!("host agent ready at {}", self.host),
            ProtocolState::None => {},
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.scheduler.cancel();
        self.epoch += 1;
        self.epoch
    }

    fn complete_with(&self, epoch: u64) -> impl FnOnce(Outcome) + Send + 'static {
        let commands = self.commands.clone();
        move |outcome| {
            // The actor is gone once the handle is dropped
            let _ = commands.send(Command::Completed { epoch, outcome });
        }
    }

    fn lookup_agent_host(&mut self) {
        let epoch = self.next_epoch();
        let done = self.complete_with(epoch);
        let prober = self.prober.clone();
        let gateway = Arc::clone(&self.collaborators.gateway);
        let candidate = self.host.clone();

        tokio::spawn(async move {
            let outcome = prober.lookup(&candidate, gateway.as_ref()).await;
            done(Outcome::Lookup(outcome));
        });
    }

    fn announce(&mut self) {
        debug!("announcing to the host agent at {}", self.host);

        let epoch = self.next_epoch();
        let done = self.complete_with(epoch);
        let identity = self.identity.clone();
        let transport = Arc::clone(&self.collaborators.transport);
        let host = self.host.clone();
        let url = self.config.url(&host, &self.config.discovery_path);

        tokio::spawn(async move {
            let process = identity.build(&host).await;
            let result = match serde_json::to_value(&process.info) {
                Ok(payload) => transport
                    .exchange(&url, Method::PUT, payload)
                    .await
                    .and_then(|(_, body)| decode_announce(body)),
                Err(e) => Err(e.into()),
            };
            // Correlation socket stays open until the exchange is over
            drop(process);
            done(Outcome::Announce(result));
        });
    }

    fn test_agent(&mut self) {
        debug!("testing communication with the host agent");

        let epoch = self.next_epoch();
        let done = self.complete_with(epoch);
        let transport = Arc::clone(&self.collaborators.transport);
        let url = self.config.url(&self.host, &self.config.data_path);

        tokio::spawn(async move {
            let result = transport.head_probe(&url).await;
            done(Outcome::Test(result));
        });
    }

    fn completed(&mut self, epoch: u64, outcome: Outcome) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding stale outcome");
            return;
        }

        match outcome {
            Outcome::Lookup(LookupOutcome::Found(host)) => {
                debug!("agent lookup success {}", host);
                self.host = host;
                self.retries.reset();
                self.fire(Event::Lookup);
            },
            Outcome::Lookup(LookupOutcome::GatewayUnavailable(reason)) => {
                error!("{}, scheduling retry", reason);
                self.schedule_retry();
            },
            Outcome::Lookup(LookupOutcome::NotFound { gateway }) => {
                error!(
                    "cannot connect to the agent through {} or default gateway {}, scheduling retry",
                    self.host, gateway
                );
                self.schedule_retry();
            },
            Outcome::Announce(Ok(response)) => {
                info!(
                    "Host agent available. We're in business. Announced pid: {}",
                    response.pid
                );
                self.collaborators.settings.apply(&response);
                self.retries.reset();
                self.fire(Event::Announce);
            },
            Outcome::Announce(Err(e)) => {
                error!("cannot announce to the host agent: {}", e);
                self.step_failed();
            },
            Outcome::Test(Ok(())) => {
                self.retries.reset();
                self.fire(Event::Test);
            },
            Outcome::Test(Err(e)) => {
                debug!("host agent is not yet ready: {}", e);
                self.step_failed();
            },
        }
    }

    fn step_failed(&mut self) {
        if self.retries.consume() {
            debug!(remaining = self.retries.remaining(), "scheduling retry");
            self.schedule_retry();
        } else {
            warn!("retry budget exhausted in state {}, restarting discovery", self.state);
            self.fire(Event::Init);
        }
    }

    fn schedule_retry(&mut self) {
        let epoch = self.epoch;
        let commands = self.commands.clone();

        self.scheduler.schedule(async move {
            let _ = commands.send(Command::Retry { epoch });
        });
    }

    fn retry(&mut self, epoch: u64) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding stale retry");
            return;
        }
        self.enter();
    }
}

fn decode_announce(body: Value) -> Result<AnnounceResponse> {
    if body.is_null() {
        return Ok(AnnounceResponse::default());
    }
    serde_json::from_value(body)
        .map_err(|e| DiscoveryError::Protocol(format!("Invalid announce response: {e}")))
}
