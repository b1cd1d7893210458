//! CMC servers, arrays and the array aggregator.
//!
//! A [`CmcServer`] discovers the arrays its CMC runs and keeps one [`Array`]
//! per discovered name. Each array drives a control and a monitor channel,
//! subscribes to the sensors named by a shared [`SubscriptionPlan`] once the
//! instrument is up, and keeps the sensor tree current from informs.
//! [`Aggregator`] ranks every array of every CMC by size, and
//! [`MonitorSnapshot`] captures all of it as owned, serialisable data.

pub mod aggregator;
pub mod array;
pub mod cmc;
pub mod decode;
mod drive;
pub mod error;
pub mod plan;
pub mod view;

pub use aggregator::{Aggregator, RankedArray};
pub use array::{Array, Liveness, INPUT_LABELLING, INSTRUMENT_STATE, HOSTNAME_FUNCTIONAL_MAPPING};
pub use cmc::{ArrayLookup, CmcServer, DEFAULT_CMC_PORT};
pub use decode::{ArraySpec, HostMapping, InputLabel};
pub use error::{CmcError, CmcResult};
pub use plan::{Pattern, SubscriptionPlan, DEFAULT_ENGINES_PER_HOST};
pub use view::{ArrayRef, ArrayView, ChannelView, CmcView, MonitorSnapshot};
