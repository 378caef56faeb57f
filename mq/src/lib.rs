//! mailqtt - camera alert mail to MQTT bridge
//!
//! Cameras and NVRs that can only send email alerts deliver them to an
//! embedded SMTP listener. Each alert's subject is mapped to an MQTT topic,
//! an event payload is published, image attachments are optionally saved, and
//! after a quiet period a reset payload is published to the same topic.
//!
//! # Architecture
//!
//! - [`bridge::Bridge`] receives decoded messages and resolves their topic
//! - [`debounce::DebounceController`] owns the per-topic reset timers
//! - [`gate`] decides whether attachments are written
//! - [`bus::Publisher`] delivers payloads in order, best-effort

pub mod bridge;
pub mod bus;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod debounce;
pub mod error;
pub mod gate;
pub mod payload;
pub mod topic;

pub use bridge::Bridge;
pub use bus::{BusClient, MqttBusClient, PublishError, PublishOutcome, Publisher, PublisherHandle, publish_best_effort};
pub use config::Config;
pub use daemon::{Daemon, RunningDaemon};
pub use debounce::{ControllerHandle, DebounceController, Delivery, PendingEvent, ResetSchedule};
pub use error::{BridgeError, PersistenceError};
pub use gate::{AttachmentPolicy, AttachmentStore};
pub use payload::EventPayload;
pub use topic::{MalformedSubjectError, ResolvedTopic, TopicResolver};
