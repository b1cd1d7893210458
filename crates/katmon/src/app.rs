//! The monitor event loop.
//!
//! Every CMC server, array and channel is owned by one task. Transport
//! tasks wake it through a shared `Notify`; each wake dispatches whatever
//! arrived, hands queued requests to the transports and runs due timers.
//! Snapshots for the dashboard are taken on their own timer, and only
//! after something has been processed since the last one.

use std::sync::Arc;

use katmon_cmc::{CmcServer, MonitorSnapshot};
use katmon_dashboard::{run_server, DashboardState};
use katmon_katcp::{ChannelRole, ChannelState, TcpConnector};
use katmon_telemetry::Metrics;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Reconnect,
    PollArrayList,
    Publish,
}

pub struct Monitor {
    config: AppConfig,
    cmcs: Vec<CmcServer>,
    connector: TcpConnector,
    dashboard: DashboardState,
    dirty: bool,
}

impl Monitor {
    /// Load the subscription plan and start connecting to every CMC.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let plan = Arc::new(config.subscription_plan()?);
        info!(
            patterns = plan.patterns().len(),
            engines_per_host = plan.engines_per_host(),
            "Subscription plan loaded"
        );

        let connector = TcpConnector::new();
        let cmcs = config
            .cmcs
            .iter()
            .map(|endpoint| {
                CmcServer::new(
                    &endpoint.address,
                    endpoint.port,
                    Arc::clone(&plan),
                    &connector,
                    config.max_request_retries,
                )
            })
            .collect();

        Ok(Self {
            config,
            cmcs,
            connector,
            dashboard: DashboardState::new(),
            dirty: true,
        })
    }

    pub fn cmcs(&self) -> &[CmcServer] {
        &self.cmcs
    }

    /// Handle the dashboard reads snapshots from.
    pub fn dashboard_state(&self) -> DashboardState {
        self.dashboard.clone()
    }

    /// Dispatch everything received, then hand pending requests to the
    /// transports.
    pub fn process(&mut self) {
        for cmc in &mut self.cmcs {
            cmc.handle_received_lines(&self.connector);
        }
        self.flush_writes();
        self.dirty = true;
    }

    fn flush_writes(&mut self) {
        for cmc in &mut self.cmcs {
            cmc.flush_writes();
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        match tick {
            Tick::Reconnect => {
                for cmc in &mut self.cmcs {
                    cmc.try_reconnect(&self.connector);
                }
            }
            Tick::PollArrayList => {
                for cmc in &mut self.cmcs {
                    cmc.poll_array_list();
                }
            }
            Tick::Publish => {
                self.publish_if_dirty();
                return;
            }
        }
        self.flush_writes();
        self.dirty = true;
    }

    /// Capture the current state, update gauges and hand the snapshot to
    /// the dashboard.
    pub fn publish(&mut self) {
        let snapshot = MonitorSnapshot::capture(&self.cmcs);
        update_gauges(&snapshot);
        self.dashboard.publish(snapshot);
        self.dirty = false;
    }

    /// Publish only if input was processed or a timer ran since the last
    /// snapshot. Returns whether a snapshot was taken.
    pub fn publish_if_dirty(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.publish();
        true
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> AppResult<()> {
        let dashboard = if self.config.dashboard.enabled {
            let state = self.dashboard.clone();
            let config = self.config.dashboard.clone();
            let stop = shutdown.clone().cancelled_owned();
            Some(tokio::spawn(async move {
                if let Err(e) = run_server(state, config, stop).await {
                    error!(error = %e, "Dashboard server failed");
                }
            }))
        } else {
            info!("Dashboard disabled");
            None
        };

        let wake = self.connector.wake();
        let mut reconnect = interval(self.config.reconnect_interval());
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let poll_every = self.config.array_list_poll_interval();
        // The handshake already asks for the array list.
        let mut poll = interval_at(Instant::now() + poll_every, poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut publish = interval(self.config.publish_interval());
        publish.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(cmcs = self.cmcs.len(), "Entering main event loop");
        loop {
            let tick = tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                () = wake.notified() => None,
                _ = reconnect.tick() => Some(Tick::Reconnect),
                _ = poll.tick() => Some(Tick::PollArrayList),
                _ = publish.tick() => Some(Tick::Publish),
            };

            match tick {
                Some(Tick::Publish) => self.on_tick(Tick::Publish),
                Some(tick) => {
                    self.process();
                    self.on_tick(tick);
                }
                None => self.process(),
            }
        }

        info!("Shutting down");
        if let Some(handle) = dashboard {
            if let Err(e) = handle.await {
                error!(error = %e, "Dashboard task panicked");
            }
        }
        Ok(())
    }
}

fn update_gauges(snapshot: &MonitorSnapshot) {
    Metrics::arrays_set(snapshot.array_count());

    let states = snapshot.channel_states();
    for role in ChannelRole::ALL {
        let counts: Vec<(&str, i64)> = ChannelState::ALL
            .iter()
            .map(|&state| {
                let n = states.iter().filter(|&&s| s == (role, state)).count();
                (state.as_str(), n as i64)
            })
            .collect();
        Metrics::channel_states_set(role.as_str(), &counts);
    }
}
