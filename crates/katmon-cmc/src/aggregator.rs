//! Size-ranked view over the arrays of every CMC.
//!
//! Borrows the CMC list, so it has to be rebuilt after anything that can
//! add or prune arrays.

use crate::array::Array;
use crate::cmc::CmcServer;

/// An array together with the position of the CMC that owns it.
#[derive(Debug, Clone, Copy)]
pub struct RankedArray<'a> {
    pub cmc: usize,
    pub array: &'a Array,
}

#[derive(Debug)]
pub struct Aggregator<'a> {
    ranked: Vec<RankedArray<'a>>,
}

impl<'a> Aggregator<'a> {
    /// Flatten all arrays and sort them by antenna count, largest first.
    ///
    /// Ties keep CMC order, then each CMC's name order.
    pub fn new(cmcs: &'a [CmcServer]) -> Self {
        let mut ranked: Vec<RankedArray<'a>> = cmcs
            .iter()
            .enumerate()
            .flat_map(|(cmc, server)| {
                server
                    .arrays()
                    .iter()
                    .map(move |array| RankedArray { cmc, array })
            })
            .collect();
        ranked.sort_by(|a, b| b.array.antenna_count().cmp(&a.array.antenna_count()));
        Self { ranked }
    }

    /// 0-based rank lookup.
    pub fn get(&self, index: usize) -> Option<&RankedArray<'a>> {
        self.ranked.get(index)
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankedArray<'a>> {
        self.ranked.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmc::DEFAULT_CMC_PORT;
    use crate::plan::SubscriptionPlan;
    use katmon_katcp::testing::MockConnector;
    use std::sync::Arc;

    fn discovered(host: &str, lines: &[&str], connector: &MockConnector) -> CmcServer {
        let mut cmc = CmcServer::new(
            host,
            DEFAULT_CMC_PORT,
            Arc::new(SubscriptionPlan::default()),
            connector,
            0,
        );
        let handle = connector.handle(host, DEFAULT_CMC_PORT).unwrap();
        handle.connect();
        for line in lines {
            handle.deliver_line(line);
        }
        cmc.handle_received_lines(connector);
        cmc
    }

    #[test]
    fn test_empty() {
        let aggregator = Aggregator::new(&[]);
        assert!(aggregator.is_empty());
        assert!(aggregator.get(0).is_none());
    }

    #[test]
    fn test_ranks_across_cmcs_by_size_with_stable_ties() {
        let connector = MockConnector::new();
        let cmcs = vec![
            discovered(
                "cmc1",
                &[
                    "#array-list small 7148,7149,g1,g2",
                    "#array-list tie-a 7150,7151,g1,g2,g3,g4",
                ],
                &connector,
            ),
            discovered(
                "cmc2",
                &[
                    "#array-list big 7148,7149,g1,g2,g3,g4,g5,g6,g7,g8",
                    "#array-list tie-b 7150,7151,g1,g2,g3,g4",
                ],
                &connector,
            ),
        ];

        let aggregator = Aggregator::new(&cmcs);
        let order: Vec<(usize, &str)> = aggregator
            .iter()
            .map(|r| (r.cmc, r.array.name()))
            .collect();
        assert_eq!(
            order,
            [(1, "big"), (0, "tie-a"), (1, "tie-b"), (0, "small")]
        );
        assert!(aggregator.get(4).is_none());
    }
}
