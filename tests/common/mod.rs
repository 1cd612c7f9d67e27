//! Scripted collaborators for driving the discovery state machine.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostagent::transport::{Method, TransportFuture};
use hostagent::{
    AgentConfig, AgentTransport, AnnounceResponse, Collaborators, DiscoveryError, Discovery,
    GatewayResolver, ProcessMetadata, SettingsApplier, Snapshot,
};
use serde_json::{json, Value};

pub const IDENTITY: &str = "Instana Agent";

/// Host part of `http://host:port/path`
pub fn host_of(url: &str) -> String {
    let rest = url.trim_start_matches("http://");
    rest.split(':').next().unwrap_or_default().to_string()
}

/// Transport whose answers are scripted per test.
#[derive(Default)]
pub struct ScriptedTransport {
    /// Identity header per host; hosts not listed time out
    identities: Mutex<HashMap<String, Option<String>>>,
    /// Announce results in order; `true` succeeds. Empty means success.
    announces: Mutex<VecDeque<bool>>,
    /// Readiness results in order. Empty means success.
    readiness: Mutex<VecDeque<bool>>,
    /// Delay before an announce answers
    announce_delay: Mutex<Duration>,
    /// Hosts probed, in order
    pub probed: Mutex<Vec<String>>,
    /// Announce payloads received
    pub payloads: Mutex<Vec<Value>>,
    pub announce_calls: AtomicUsize,
    pub head_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn agent_at(&self, host: &str) {
        self.identities
            .lock()
            .unwrap()
            .insert(host.to_string(), Some(IDENTITY.to_string()));
    }

    pub fn service_at(&self, host: &str, server: Option<&str>) {
        self.identities
            .lock()
            .unwrap()
            .insert(host.to_string(), server.map(str::to_string));
    }

    pub fn agent_gone(&self) {
        self.identities.lock().unwrap().clear();
    }

    pub fn script_announces(&self, results: &[bool]) {
        self.announces.lock().unwrap().extend(results.iter().copied());
    }

    pub fn script_readiness(&self, results: &[bool]) {
        self.readiness.lock().unwrap().extend(results.iter().copied());
    }

    pub fn delay_announces(&self, delay: Duration) {
        *self.announce_delay.lock().unwrap() = delay;
    }

    pub fn probes_of(&self, host: &str) -> usize {
        self.probed.lock().unwrap().iter().filter(|h| *h == host).count()
    }

    pub fn probe_count(&self) -> usize {
        self.probed.lock().unwrap().len()
    }

    pub fn announces(&self) -> usize {
        self.announce_calls.load(Ordering::SeqCst)
    }

    pub fn heads(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }
}

impl AgentTransport for ScriptedTransport {
    fn header_probe<'a>(
        &'a self,
        url: &'a str,
        _method: Method,
        _header: &'a str,
    ) -> TransportFuture<'a, Option<String>> {
        Box::pin(async move {
            let host = host_of(url);
            self.probed.lock().unwrap().push(host.clone());

            match self.identities.lock().unwrap().get(&host) {
                Some(identity) => Ok(identity.clone()),
                None => Err(DiscoveryError::Network(format!("{host}: operation timed out"))),
            }
        })
    }

    fn exchange<'a>(
        &'a self,
        _url: &'a str,
        _method: Method,
        payload: Value,
    ) -> TransportFuture<'a, (u16, Value)> {
        Box::pin(async move {
            self.announce_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.announce_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let pid = payload["pid"].clone();
            self.payloads.lock().unwrap().push(payload);

            let ok = self.announces.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                Ok((200, json!({"pid": pid, "agentUuid": "agent-1"})))
            } else {
                Err(DiscoveryError::Network("connection reset".to_string()))
            }
        })
    }

    fn head_probe<'a>(&'a self, _url: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.readiness.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(DiscoveryError::Protocol("503 Service Unavailable".to_string()))
            }
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Gateway resolver with a fixed answer.
pub struct FixedGateway {
    answer: Mutex<std::result::Result<Option<Ipv4Addr>, String>>,
    pub calls: AtomicUsize,
}

impl FixedGateway {
    pub fn at(addr: Ipv4Addr) -> Arc<Self> {
        Self::with(Ok(Some(addr)))
    }

    pub fn none() -> Arc<Self> {
        Self::with(Ok(None))
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Self::with(Err(reason.to_string()))
    }

    fn with(answer: std::result::Result<Option<Ipv4Addr>, String>) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(answer),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_none(&self) {
        *self.answer.lock().unwrap() = Ok(None);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GatewayResolver for FixedGateway {
    fn default_gateway(&self) -> hostagent::Result<Option<Ipv4Addr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map_err(DiscoveryError::Gateway)
    }
}

/// Metadata source with fixed kernel values and no proc filesystem.
pub struct FixedMetadata;

pub const KERNEL_PID: u32 = 4711;

impl ProcessMetadata for FixedMetadata {
    fn available(&self) -> bool {
        false
    }

    fn alternate_process_id(&self) -> Option<u32> {
        Some(KERNEL_PID)
    }

    fn alternate_command_line(&self) -> Option<(String, Vec<String>)> {
        Some(("/srv/app".to_string(), vec!["--serve".to_string()]))
    }

    fn descriptor_link(&self, _fd: i32) -> Option<String> {
        None
    }
}

/// Records every applied announce response.
#[derive(Default)]
pub struct RecordingSettings {
    pub applied: Mutex<Vec<AnnounceResponse>>,
}

impl RecordingSettings {
    pub fn count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }
}

impl SettingsApplier for RecordingSettings {
    fn apply(&self, response: &AnnounceResponse) {
        self.applied.lock().unwrap().push(response.clone());
    }
}

pub fn test_config(retry_ms: u64) -> AgentConfig {
    AgentConfig {
        host: "127.0.0.1".to_string(),
        retry_period_ms: retry_ms,
        ..Default::default()
    }
}

pub struct Harness {
    pub discovery: Discovery,
    pub transport: Arc<ScriptedTransport>,
    pub gateway: Arc<FixedGateway>,
    pub settings: Arc<RecordingSettings>,
}

pub fn start(
    config: AgentConfig,
    transport: Arc<ScriptedTransport>,
    gateway: Arc<FixedGateway>,
) -> Harness {
    let settings = Arc::new(RecordingSettings::default());
    let collaborators = Collaborators {
        transport: transport.clone(),
        gateway: gateway.clone(),
        metadata: Arc::new(FixedMetadata),
        settings: settings.clone(),
    };

    Harness {
        discovery: Discovery::spawn(config, collaborators),
        transport,
        gateway,
        settings,
    }
}

/// Wait until a snapshot satisfies `predicate`, failing the test after 5s.
pub async fn wait_until(discovery: &Discovery, predicate: impl FnMut(&Snapshot) -> bool) -> Snapshot {
    let mut rx = discovery.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("discovery stopped");
    snapshot.clone()
}

/// Poll `condition` until it holds, failing the test after 5s.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
