//! One correlator array: its control and monitor channels and sensor tree.
//!
//! Life cycle:
//!
//! 1. Created from an `#array-list` inform. Both channels start sending at
//!    once: control gets `?log-local off` and an `instrument-state`
//!    subscription, monitor gets `?log-local off`.
//! 2. When `instrument-state` turns nominal (or the config file changes
//!    while nominal), the subscription plan is fanned out over every host
//!    and engine.
//! 3. From then on `#sensor-status` informs on the monitor channel keep the
//!    tree current.
//!
//! Array channels are never reopened. A disconnected array stays
//! non-functional until its CMC stops listing it.

use chrono::{DateTime, Utc};
use katmon_core::{
    Device, HostId, ModelError, Sensor, SensorPath, Team, DEVICE_STATUS, F_TEAM, X_TEAM,
};
use katmon_katcp::{Channel, ChannelEvent, ChannelRole, Connector, Message, Multiplexed};
use katmon_telemetry::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::decode::{decode_hostname_mapping, parse_input_labelling, ArraySpec};
use crate::drive::{field_or_none, flush, record_reply};
use crate::error::CmcResult;
use crate::plan::{Pattern, SubscriptionPlan};

pub const INSTRUMENT_STATE: &str = "instrument-state";
pub const INPUT_LABELLING: &str = "input-labelling";
pub const HOSTNAME_FUNCTIONAL_MAPPING: &str = "hostname-functional-mapping";

const NOMINAL: &str = "nominal";

/// Reconciliation flag owned by the CMC server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Fine,
    Suspect,
}

pub struct Array {
    name: String,
    cmc_address: String,
    control_port: u16,
    monitor_port: u16,
    antenna_count: usize,
    liveness: Liveness,
    control: Channel,
    monitor: Channel,
    instrument_state: String,
    config_file: String,
    activations: u32,
    top: Device,
    teams: Vec<Team>,
    updated_at: Option<DateTime<Utc>>,
    plan: Arc<SubscriptionPlan>,
    span: Span,
}

impl Array {
    /// Open both channels and seed their startup requests.
    pub fn new(
        spec: &ArraySpec,
        cmc_address: &str,
        plan: Arc<SubscriptionPlan>,
        connector: &dyn Connector,
        max_retries: u32,
    ) -> Self {
        let span = info_span!("array", cmc = %cmc_address, array = %spec.name);
        span.in_scope(|| {
            info!(
                control_port = spec.control_port,
                monitor_port = spec.monitor_port,
                antennas = spec.antenna_count,
                "Array discovered"
            )
        });

        let control = Channel::connected(
            ChannelRole::Control,
            connector.open(cmc_address, spec.control_port),
            [
                Message::request("log-local", &["off"]),
                Message::sensor_sampling(INSTRUMENT_STATE),
            ],
        )
        .with_max_retries(max_retries);
        let monitor = Channel::connected(
            ChannelRole::Monitor,
            connector.open(cmc_address, spec.monitor_port),
            [Message::request("log-local", &["off"])],
        )
        .with_max_retries(max_retries);

        Self {
            name: spec.name.clone(),
            cmc_address: cmc_address.to_string(),
            control_port: spec.control_port,
            monitor_port: spec.monitor_port,
            antenna_count: spec.antenna_count,
            liveness: Liveness::Fine,
            control,
            monitor,
            instrument_state: String::new(),
            config_file: String::new(),
            activations: 0,
            top: Device::new(spec.name.clone()),
            teams: vec![
                Team::new(F_TEAM, spec.antenna_count),
                Team::new(X_TEAM, spec.antenna_count),
            ],
            updated_at: None,
            plan,
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cmc_address(&self) -> &str {
        &self.cmc_address
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn monitor_port(&self) -> u16 {
        self.monitor_port
    }

    pub fn antenna_count(&self) -> usize {
        self.antenna_count
    }

    pub fn control(&self) -> &Channel {
        &self.control
    }

    pub fn monitor(&self) -> &Channel {
        &self.monitor
    }

    pub fn instrument_state(&self) -> &str {
        &self.instrument_state
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// How many times the subscription plan has been fanned out.
    pub fn activations(&self) -> u32 {
        self.activations
    }

    /// Top-level array sensors.
    pub fn sensors(&self) -> &[Sensor] {
        self.top.sensors()
    }

    pub fn sensor(&self, name: &str) -> Option<&Sensor> {
        self.top.sensor(name)
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, kind: char) -> Option<&Team> {
        self.teams.iter().find(|t| t.kind() == kind)
    }

    /// Time of the last successful sensor update.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn is_suspect(&self) -> bool {
        self.liveness == Liveness::Suspect
    }

    pub fn mark_suspect(&mut self) {
        self.liveness = Liveness::Suspect;
    }

    pub fn mark_fine(&mut self) {
        self.liveness = Liveness::Fine;
    }

    /// False once either channel is disconnected.
    pub fn is_functional(&self) -> bool {
        !self.control.is_disconnected() && !self.monitor.is_disconnected()
    }

    /// True when a channel dropped before its transport ever connected.
    /// The array never came up and should be rebuilt from the next listing.
    pub fn failed_to_open(&self) -> bool {
        [&self.control, &self.monitor]
            .iter()
            .any(|channel| channel.is_disconnected() && !channel.has_connected())
    }

    /// Team of the given type, created with `antenna_count` hosts if the
    /// array has not seen it before.
    fn team_mut(&mut self, kind: char) -> &mut Team {
        let index = match self.teams.iter().position(|t| t.kind() == kind) {
            Some(index) => index,
            None => {
                warn!(team = %kind, "Adding team for unexpected host type");
                self.teams.push(Team::new(kind, self.antenna_count));
                self.teams.len() - 1
            }
        };
        &mut self.teams[index]
    }

    fn existing_team_mut(&mut self, kind: char) -> Result<&mut Team, ModelError> {
        self.teams
            .iter_mut()
            .find(|t| t.kind() == kind)
            .ok_or(ModelError::UnknownTeam(kind))
    }

    pub fn add_team_host_device_sensor(
        &mut self,
        team: char,
        index: usize,
        device: &str,
        sensor: &str,
    ) -> CmcResult<()> {
        self.team_mut(team)
            .add_host_device_sensor(index, device, sensor)?;
        Ok(())
    }

    pub fn add_team_host_engine_device_sensor(
        &mut self,
        team: char,
        index: usize,
        engine: &str,
        device: &str,
        sensor: &str,
    ) -> CmcResult<()> {
        self.team_mut(team)
            .add_host_engine_device_sensor(index, engine, device, sensor)?;
        Ok(())
    }

    /// Fan the subscription plan out over every host and engine.
    pub fn activate(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        self.activations += 1;
        info!(activation = self.activations, config = %self.config_file, "Activating array");

        let plan = self.plan.clone();
        for pattern in plan.patterns() {
            if let Err(e) = self.subscribe(pattern, plan.engines_per_host()) {
                error!(pattern = %pattern, error = %e, "Failed to subscribe pattern");
            }
        }

        self.top.add_sensor(DEVICE_STATUS);
        self.monitor.push(Message::sensor_sampling(DEVICE_STATUS));
        self.monitor
            .push(Message::sensor_sampling(HOSTNAME_FUNCTIONAL_MAPPING));
        self.control.push(Message::sensor_sampling(INPUT_LABELLING));
    }

    fn subscribe(&mut self, pattern: &Pattern, engines_per_host: usize) -> CmcResult<()> {
        match pattern {
            Pattern::Array { sensor } => {
                self.top.add_sensor(sensor);
                self.monitor.push(Message::sensor_sampling(sensor));
            }
            Pattern::Device { team, device } => {
                for i in 0..self.antenna_count {
                    self.add_team_host_device_sensor(*team, i, device, DEVICE_STATUS)?;
                    let host = HostId::new(*team, i);
                    self.monitor.push(Message::sensor_sampling(&format!(
                        "{host}.{device}.{DEVICE_STATUS}"
                    )));
                }
            }
            Pattern::EngineDevice {
                team,
                engine_base,
                device,
            } => {
                for i in 0..self.antenna_count {
                    let host = HostId::new(*team, i);
                    for j in 0..engines_per_host {
                        let engine = format!("{engine_base}{j}");
                        self.add_team_host_engine_device_sensor(
                            *team,
                            i,
                            &engine,
                            device,
                            DEVICE_STATUS,
                        )?;
                        self.monitor.push(Message::sensor_sampling(&format!(
                            "{host}.{engine}.{device}.{DEVICE_STATUS}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Process everything both channels received since the last call.
    pub fn handle_received_lines(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        for event in self.control.on_readable() {
            match event {
                ChannelEvent::Inform(message) => self.handle_control_inform(&message),
                ChannelEvent::Reply { request, reply } => record_reply(&request, &reply),
            }
        }
        for event in self.monitor.on_readable() {
            match event {
                ChannelEvent::Inform(message) => self.handle_monitor_inform(&message),
                ChannelEvent::Reply { request, reply } => record_reply(&request, &reply),
            }
        }
    }

    /// Hand pending requests on both channels to their transports.
    pub fn flush_writes(&mut self) {
        flush(&mut self.control);
        flush(&mut self.monitor);
    }

    fn handle_control_inform(&mut self, message: &Message) {
        let Some(name) = message.name() else {
            return;
        };
        Metrics::inform_received(name);
        if !is_sensor_inform(name) {
            debug!(inform = %message, "Ignoring control inform");
            return;
        }

        let sensor = field_or_none(message, 3, "sensor name");
        let status = field_or_none(message, 4, "status");
        let value = field_or_none(message, 5, "value");
        match sensor {
            INSTRUMENT_STATE => self.apply_instrument_state(status, value),
            INPUT_LABELLING => self.apply_input_labelling(value),
            other => debug!(sensor = other, "Ignoring control sensor"),
        }
    }

    fn handle_monitor_inform(&mut self, message: &Message) {
        let Some(name) = message.name() else {
            return;
        };
        Metrics::inform_received(name);
        if !is_sensor_inform(name) {
            debug!(inform = %message, "Ignoring monitor inform");
            return;
        }

        let sensor = field_or_none(message, 3, "sensor name");
        let status = field_or_none(message, 4, "status");
        let value = field_or_none(message, 5, "value");
        if sensor == HOSTNAME_FUNCTIONAL_MAPPING {
            self.apply_hostname_mapping(value);
        } else if name == "sensor-status" {
            self.apply_sensor_status(sensor, status, value);
        }
    }

    fn apply_instrument_state(&mut self, state: &str, config_file: &str) {
        if state == self.instrument_state && config_file == self.config_file {
            return;
        }
        info!(
            from = %self.instrument_state,
            to = state,
            config = config_file,
            "Instrument state changed"
        );
        self.instrument_state = state.to_string();
        self.config_file = config_file.to_string();
        if state == NOMINAL {
            self.activate();
        }
    }

    /// Route a `#sensor-status` update onto the tree.
    fn apply_sensor_status(&mut self, name: &str, status: &str, value: &str) {
        let result = SensorPath::parse(name).and_then(|path| match path {
            SensorPath::Array { sensor } => self.top.update_sensor(sensor, value, status),
            SensorPath::Host {
                host,
                device,
                sensor,
            } => self
                .existing_team_mut(host.team)?
                .update_sensor(host.index, device, sensor, value, status),
            SensorPath::Engine {
                host,
                engine,
                device,
                sensor,
            } => self.existing_team_mut(host.team)?.update_engine_sensor(
                host.index, engine, device, sensor, value, status,
            ),
        });

        match result {
            Ok(()) => self.updated_at = Some(Utc::now()),
            Err(ModelError::NotFound(what)) => {
                debug!(sensor = name, missing = %what, "Update for unsubscribed sensor");
            }
            Err(e) => {
                error!(sensor = name, error = %e, "Cannot route sensor update");
                Metrics::malformed_inform("sensor_name");
            }
        }
    }

    /// Assign serials from the fixed-width mapping blob.
    fn apply_hostname_mapping(&mut self, payload: &str) {
        for record in decode_hostname_mapping(payload, 2 * self.antenna_count) {
            let applied: CmcResult<()> = record.and_then(|mapping| {
                self.existing_team_mut(mapping.team)?
                    .host_mut(mapping.index)?
                    .set_serial(&mapping.serial);
                Ok(())
            });
            if let Err(e) = applied {
                error!(error = %e, "Skipping hostname mapping record");
                Metrics::malformed_inform("hostname_mapping");
            }
        }
    }

    /// Label f-hosts with the antenna feeding their even input.
    fn apply_input_labelling(&mut self, value: &str) {
        for label in parse_input_labelling(value) {
            let applied: CmcResult<()> = label.and_then(|label| {
                let Some(index) = label.f_host_index() else {
                    return Ok(());
                };
                self.team_mut(F_TEAM)
                    .host_mut(index)?
                    .set_input_stream(&label.label);
                Ok(())
            });
            if let Err(e) = applied {
                error!(error = %e, "Skipping input label");
                Metrics::malformed_inform("input_labelling");
            }
        }
    }
}

fn is_sensor_inform(name: &str) -> bool {
    name == "sensor-status" || name == "sensor-value"
}

impl std::fmt::Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("name", &self.name)
            .field("antenna_count", &self.antenna_count)
            .field("liveness", &self.liveness)
            .field("control", &self.control.state())
            .field("monitor", &self.monitor.state())
            .finish()
    }
}
