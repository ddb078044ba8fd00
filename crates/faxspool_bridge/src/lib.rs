//! FaxSpool Bridge
//!
//! Connects a legacy HylaFax-style spool directory to a webhook fax
//! transport:
//!
//! - Outbound: `.sfc` descriptors are paired with their documents and
//!   submitted; progress is reported back through `.jobid`, `.sts`,
//!   `.done` and `.fail` sentinels.
//! - Delivery notifications arrive over HTTP and are matched to the jobs
//!   they describe.
//! - Inbound faxes arrive over HTTP and are written into the spool as a
//!   document plus a `.recv` receipt.

pub mod bridge;
pub mod config;
pub mod correlator;
pub mod engine;
pub mod http;
pub mod inbound;
pub mod matcher;
pub mod metrics;
pub mod registry;
pub mod spool;
pub mod submitter;
pub mod transport;
pub mod watcher;

pub use bridge::Bridge;
pub use config::{BridgeArgs, BridgeConfig};
pub use correlator::{Correlation, Correlator, PairedJob, PendingArtifact};
pub use engine::{DescriptorError, EngineSettings, EventOutcome, SpoolEngine};
pub use http::{router, HttpError};
pub use inbound::{InboundError, InboundMaterializer, ReceivedFax};
pub use matcher::{MatchReport, NotificationMatcher};
pub use metrics::METRICS;
pub use registry::{Job, JobRegistry, JobStatus, RegistryError};
pub use spool::{SpoolDir, SpoolError};
pub use submitter::{JobSubmitter, SubmitError};
pub use transport::{FaxTransport, OutboundFax, TransportConfig, TransportError, WebhookTransport};
pub use watcher::{SpoolEvent, SpoolEventKind, SpoolWatcher, WatchConfig};
