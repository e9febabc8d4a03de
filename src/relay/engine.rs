use std::mem;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use super::forwarding::{ForwardStats, Forwarder};
use crate::configuration::Settings;
use crate::data_capture::Recorder;
use crate::error_handling::types::{ConfigError, RelayError};
use crate::network::{Endpoint, ResolvedAddress, ServiceEndpoint};
use crate::process_management::{ChildProcess, CommandTemplate, TemplateValues};
use crate::signal_hub::SignalTrap;

/// Outcome of one relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    pub session_id: Uuid,
    pub chunks: u64,
    pub bytes_to_l: u64,
    pub bytes_to_r: u64,
    /// Exit code of the R side program, if it had been reaped when the
    /// session ended.
    pub child_status: Option<i32>,
}

/// One relay session between a spawned R side program and an L side
/// service.
///
/// Setup runs in a fixed order: bind the service endpoint, spawn the child
/// with its command line resolved against the bound address, accept the
/// child's connection, connect out to L. Only then does forwarding start.
pub struct Relay {
    session_id: Uuid,
    settings: Settings,
    signals: Arc<dyn SignalTrap>,
    recorders: Vec<Box<dyn Recorder>>,
}

impl Relay {
    pub fn new(settings: Settings, signals: Arc<dyn SignalTrap>) -> Self {
        let session_id = Uuid::new_v4();
        debug!("[{}] Relay created", session_id);
        Self {
            session_id,
            settings,
            signals,
            recorders: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Attaches a recorder. Recorders see chunks, and are shut down, in the
    /// order they were added.
    pub fn add_recorder(&mut self, recorder: Box<dyn Recorder>) {
        debug!("[{}] {} recorder attached", self.session_id, recorder.label());
        self.recorders.push(recorder);
    }

    pub fn recorder_count(&self) -> usize {
        self.recorders.len()
    }

    /// Runs the session to completion.
    ///
    /// Configuration problems are reported before any socket is opened.
    /// Once setup has begun, attached recorders are shut down exactly once
    /// whether or not the session succeeds.
    pub fn start(mut self) -> Result<RelaySummary, RelayError> {
        self.settings.validate()?;
        let template = CommandTemplate::new(self.settings.command.clone())?;
        let (left_host, left_port) = self.settings.left_peer().ok_or(ConfigError::MissingPeer)?;
        let left_host = left_host.to_string();

        let mut forwarder = Forwarder::new(self.session_id, mem::take(&mut self.recorders));
        let outcome = self.run_session(&template, &left_host, left_port, &mut forwarder);
        forwarder.shutdown_recorders();
        info!("[{}] Recorders shut down", self.session_id);

        let (stats, child) = outcome?;
        let child_status = child.exit_status();
        match child_status {
            Some(code) => info!("[{}] {} exited with status {}", self.session_id, child.program(), code),
            None => info!("[{}] {} (pid {}) still running", self.session_id, child.program(), child.pid()),
        }

        Ok(RelaySummary {
            session_id: self.session_id,
            chunks: stats.chunks,
            bytes_to_l: stats.bytes_to_l,
            bytes_to_r: stats.bytes_to_r,
            child_status,
        })
    }

    fn run_session(
        &self,
        template: &CommandTemplate,
        left_host: &str,
        left_port: u16,
        forwarder: &mut Forwarder,
    ) -> Result<(ForwardStats, ChildProcess), RelayError> {
        let service_addr = ResolvedAddress::resolve(&self.settings.service_host, self.settings.service_port)?;
        let service = ServiceEndpoint::listen("Service", &service_addr)?;
        info!("[{}] Service endpoint bound to {}", self.session_id, service.local_addr());

        let values = template_values(&self.settings.service_host, service.local_addr());
        let argv = template.render(&values);
        let child = ChildProcess::spawn(&argv, self.signals.as_ref())?;
        if let Err(e) = self.signals.unblock_registered() {
            warn!("[{}] Unable to unblock trapped signals: {}", self.session_id, e);
        }

        let mut right = service.accept("R")?;
        service.close();
        info!("[{}] R side connected", self.session_id);

        let left_addr = ResolvedAddress::resolve(left_host, left_port)?;
        let mut left = Endpoint::connect("L", self.settings.protocol, &left_addr)?;
        info!("[{}] Connected to L side at {}", self.session_id, left_addr);

        let stats = forwarder.run(&mut left, &mut right);
        left.close();
        right.close();
        Ok((stats?, child))
    }
}

/// Values the child's command line is resolved against.
///
/// The advertised host name is the configured service host when that is a
/// name, `localhost` for a loopback literal, and otherwise this machine's
/// host name.
pub fn template_values(configured_host: &str, bound: SocketAddr) -> TemplateValues {
    let host_name = match configured_host.parse::<IpAddr>() {
        Err(_) => configured_host.to_string(),
        Ok(ip) if ip.is_loopback() => "localhost".to_string(),
        Ok(_) => hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| bound.ip().to_string()),
    };
    TemplateValues {
        port: bound.port(),
        host_addr: bound.ip().to_string(),
        host_name,
    }
}
