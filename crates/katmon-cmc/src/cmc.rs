//! One CMC server connection and the arrays it reports.
//!
//! Discovery runs on the CMC channel: `?array-list` makes the CMC send one
//! `#array-list` inform per running array followed by `!array-list ok`.
//! Before every poll all arrays are marked suspect; each inform marks its
//! array fine again (or creates it); the `ok` reply prunes whatever is still
//! suspect.

use katmon_katcp::{Channel, ChannelEvent, ChannelRole, ChannelState, Connector, Message, Multiplexed};
use katmon_telemetry::Metrics;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::array::Array;
use crate::decode::parse_array_list;
use crate::drive::{flush, record_reply};
use crate::error::CmcResult;
use crate::plan::SubscriptionPlan;

pub const DEFAULT_CMC_PORT: u16 = 7147;

const ARRAY_LIST: &str = "array-list";

fn startup_requests() -> [Message; 3] {
    [
        Message::request("log-local", &["off"]),
        Message::request("client-config", &["info-all"]),
        Message::request(ARRAY_LIST, &[]),
    ]
}

/// How a caller names an array of one CMC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayLookup {
    /// 1-based position in the name-sorted list.
    Position(usize),
    Name(String),
}

impl ArrayLookup {
    /// All-digit keys are positions, anything else is a name.
    ///
    /// An array literally named with digits can therefore only be reached
    /// by position.
    pub fn parse(key: &str) -> Self {
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(position) = key.parse() {
                return Self::Position(position);
            }
        }
        Self::Name(key.to_string())
    }

    /// Index into `arrays`, if the key resolves.
    pub fn resolve(&self, arrays: &[Array]) -> Option<usize> {
        self.resolve_by(arrays, Array::name)
    }

    /// Same lookup over any name-sorted list.
    pub fn resolve_by<T>(&self, items: &[T], name: impl Fn(&T) -> &str) -> Option<usize> {
        match self {
            Self::Position(0) => None,
            Self::Position(n) => (*n <= items.len()).then(|| n - 1),
            Self::Name(wanted) => items.iter().position(|item| name(item) == wanted),
        }
    }
}

pub struct CmcServer {
    address: String,
    port: u16,
    channel: Channel,
    arrays: Vec<Array>,
    plan: Arc<SubscriptionPlan>,
    max_retries: u32,
    reconnects: u64,
    span: Span,
}

impl CmcServer {
    /// Start connecting to the CMC and queue the startup requests.
    pub fn new(
        address: &str,
        port: u16,
        plan: Arc<SubscriptionPlan>,
        connector: &dyn Connector,
        max_retries: u32,
    ) -> Self {
        let span = info_span!("cmc", cmc = %address, port);
        span.in_scope(|| info!("Connecting to CMC"));
        let channel = Channel::connecting(
            ChannelRole::Cmc,
            connector.open(address, port),
            startup_requests(),
        )
        .with_max_retries(max_retries);

        Self {
            address: address.to_string(),
            port,
            channel,
            arrays: Vec::new(),
            plan,
            max_retries,
            reconnects: 0,
            span,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Arrays sorted by name.
    pub fn arrays(&self) -> &[Array] {
        &self.arrays
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Connected and past the initial handshake wait.
    pub fn is_connected(&self) -> bool {
        !matches!(
            self.channel.state(),
            ChannelState::WaitConnect | ChannelState::Disconnected
        )
    }

    /// Look an array up by 1-based position or by name.
    pub fn check_for_array(&self, key: &str) -> Option<&Array> {
        ArrayLookup::parse(key)
            .resolve(&self.arrays)
            .map(|index| &self.arrays[index])
    }

    /// Mark every array suspect and ask for a fresh array list.
    ///
    /// Does nothing while the CMC is not connected.
    pub fn poll_array_list(&mut self) {
        if !self.is_connected() {
            return;
        }
        let _enter = self.span.enter();
        debug!(arrays = self.arrays.len(), "Polling array list");
        for array in &mut self.arrays {
            array.mark_suspect();
        }
        self.channel.push(Message::request(ARRAY_LIST, &[]));
    }

    /// Process input from every array, then from the CMC channel itself.
    pub fn handle_received_lines(&mut self, connector: &dyn Connector) {
        for array in &mut self.arrays {
            array.handle_received_lines();
        }

        let span = self.span.clone();
        let _enter = span.enter();
        self.arrays.retain(|array| {
            if array.failed_to_open() {
                warn!(array = %array.name(), "Array unreachable, dropping until listed again");
                false
            } else {
                true
            }
        });
        for event in self.channel.on_readable() {
            match event {
                ChannelEvent::Inform(message) => self.handle_inform(&message, connector),
                ChannelEvent::Reply { request, reply } => {
                    record_reply(&request, &reply);
                    if reply.name() == Some(ARRAY_LIST) && reply.is_ok_reply() {
                        self.prune_suspects();
                    }
                }
            }
        }
    }

    fn handle_inform(&mut self, message: &Message, connector: &dyn Connector) {
        let Some(name) = message.name() else {
            return;
        };
        Metrics::inform_received(name);
        if name != ARRAY_LIST {
            debug!(inform = %message, "Ignoring CMC inform");
            return;
        }
        if let Err(e) = self.upsert_array(message, connector) {
            error!(error = %e, "Bad array-list inform");
            Metrics::malformed_inform("array_list");
        }
    }

    /// Confirm a listed array or start tracking it. Returns its index.
    fn upsert_array(&mut self, message: &Message, connector: &dyn Connector) -> CmcResult<usize> {
        let spec = parse_array_list(message)?;
        if let Some(index) = self.arrays.iter().position(|a| a.name() == spec.name) {
            self.arrays[index].mark_fine();
            return Ok(index);
        }

        let array = Array::new(
            &spec,
            &self.address,
            self.plan.clone(),
            connector,
            self.max_retries,
        );
        self.arrays.push(array);
        self.arrays.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(self
            .arrays
            .iter()
            .position(|a| a.name() == spec.name)
            .unwrap_or(self.arrays.len() - 1))
    }

    /// Drop every array the last poll did not confirm.
    fn prune_suspects(&mut self) -> usize {
        let before = self.arrays.len();
        self.arrays.retain(|array| {
            if array.is_suspect() {
                info!(array = %array.name(), "Array no longer listed, removing");
            }
            !array.is_suspect()
        });
        let pruned = before - self.arrays.len();
        if pruned > 0 {
            Metrics::arrays_pruned(pruned);
        }
        pruned
    }

    /// Reopen a disconnected CMC channel and restart its handshake.
    ///
    /// Arrays are left alone; the next array-list reply reconciles them.
    /// Returns true if a reconnect was started.
    pub fn try_reconnect(&mut self, connector: &dyn Connector) -> bool {
        if !self.channel.is_disconnected() {
            return false;
        }
        let _enter = self.span.enter();
        self.reconnects += 1;
        info!(attempt = self.reconnects, "Reconnecting to CMC");
        Metrics::cmc_reconnect();
        self.channel
            .reset(connector.open(&self.address, self.port), startup_requests());
        true
    }

    /// Hand pending requests on the CMC and all array channels to their
    /// transports.
    pub fn flush_writes(&mut self) {
        flush(&mut self.channel);
        for array in &mut self.arrays {
            array.flush_writes();
        }
    }
}

impl std::fmt::Debug for CmcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmcServer")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("state", &self.channel.state())
            .field("arrays", &self.arrays)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use katmon_katcp::testing::MockConnector;

    const HOST: &str = "cmc1";

    fn server() -> (CmcServer, MockConnector) {
        let connector = MockConnector::new();
        let cmc = CmcServer::new(
            HOST,
            DEFAULT_CMC_PORT,
            Arc::new(SubscriptionPlan::default()),
            &connector,
            0,
        );
        (cmc, connector)
    }

    fn step(cmc: &mut CmcServer, connector: &MockConnector) {
        cmc.handle_received_lines(connector);
        cmc.flush_writes();
    }

    fn deliver(connector: &MockConnector, line: &str) {
        connector
            .handle(HOST, DEFAULT_CMC_PORT)
            .unwrap()
            .deliver_line(line);
    }

    /// Connect and acknowledge the three startup requests.
    fn handshake(cmc: &mut CmcServer, connector: &MockConnector) {
        connector.handle(HOST, DEFAULT_CMC_PORT).unwrap().connect();
        step(cmc, connector);
        for reply in ["!log-local ok", "!client-config ok"] {
            deliver(connector, reply);
            step(cmc, connector);
        }
    }

    #[test]
    fn test_startup_sequence() {
        let (mut cmc, connector) = server();
        assert!(!cmc.is_connected());
        handshake(&mut cmc, &connector);
        assert_eq!(
            connector.handle(HOST, DEFAULT_CMC_PORT).unwrap().sent_lines(),
            ["?log-local off", "?client-config info-all", "?array-list"]
        );
    }

    #[test]
    fn test_poll_is_noop_while_connecting() {
        let (mut cmc, _connector) = server();
        cmc.poll_array_list();
        assert_eq!(cmc.channel().queue().len(), 3);
    }

    #[test]
    fn test_array_list_creates_sorted_arrays() {
        let (mut cmc, connector) = server();
        handshake(&mut cmc, &connector);
        deliver(&connector, "#array-list zeta 7150,7151,g1,g2");
        deliver(&connector, "#array-list alpha 7148,7149,g1,g2,g3,g4");
        deliver(&connector, "!array-list ok");
        step(&mut cmc, &connector);

        let names: Vec<&str> = cmc.arrays().iter().map(Array::name).collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert_eq!(cmc.arrays()[0].antenna_count(), 2);
        assert_eq!(connector.open_count(HOST, 7148), 1);
        assert_eq!(connector.open_count(HOST, 7151), 1);
    }

    #[test]
    fn test_malformed_array_list_is_skipped() {
        let (mut cmc, connector) = server();
        handshake(&mut cmc, &connector);
        deliver(&connector, "#array-list");
        deliver(&connector, "#array-list broken notaport");
        deliver(&connector, "!array-list ok");
        step(&mut cmc, &connector);
        assert!(cmc.arrays().is_empty());
    }

    #[test]
    fn test_check_for_array_by_position_and_name() {
        let (mut cmc, connector) = server();
        handshake(&mut cmc, &connector);
        deliver(&connector, "#array-list beta 7150,7151,g1,g2");
        deliver(&connector, "#array-list alpha 7148,7149,g1,g2");
        deliver(&connector, "#array-list 2 7152,7153,g1,g2");
        deliver(&connector, "!array-list ok");
        step(&mut cmc, &connector);

        // sorted: "2", "alpha", "beta"
        assert_eq!(cmc.check_for_array("beta").map(Array::name), Some("beta"));
        assert_eq!(cmc.check_for_array("1").map(Array::name), Some("2"));
        assert_eq!(cmc.check_for_array("2").map(Array::name), Some("alpha"));
        assert!(cmc.check_for_array("0").is_none());
        assert!(cmc.check_for_array("4").is_none());
        assert!(cmc.check_for_array("gamma").is_none());
    }

    #[test]
    fn test_lookup_parse() {
        assert_eq!(ArrayLookup::parse("12"), ArrayLookup::Position(12));
        assert_eq!(
            ArrayLookup::parse("array1"),
            ArrayLookup::Name("array1".to_string())
        );
        assert_eq!(ArrayLookup::parse(""), ArrayLookup::Name(String::new()));
    }

    #[test]
    fn test_reconnect_only_when_disconnected() {
        let (mut cmc, connector) = server();
        assert!(!cmc.try_reconnect(&connector));

        connector
            .handle(HOST, DEFAULT_CMC_PORT)
            .unwrap()
            .close("connection refused");
        step(&mut cmc, &connector);
        assert!(cmc.channel().is_disconnected());

        assert!(cmc.try_reconnect(&connector));
        assert_eq!(cmc.reconnects(), 1);
        assert_eq!(connector.open_count(HOST, DEFAULT_CMC_PORT), 2);
        assert_eq!(cmc.channel().state(), ChannelState::WaitConnect);
        assert_eq!(cmc.channel().queue().len(), 3);

        handshake(&mut cmc, &connector);
        assert_eq!(
            connector.handle(HOST, DEFAULT_CMC_PORT).unwrap().sent_lines(),
            ["?log-local off", "?client-config info-all", "?array-list"]
        );
    }
}
