//! Service wiring: SMTP listener, debounce controller, publisher

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use smtpintake::SmtpServer;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::bus::{BusClient, MqttBusClient, Publisher, PublisherStats};
use crate::config::Config;
use crate::debounce::{ControllerConfig, DebounceController};
use crate::gate::AttachmentStore;
use crate::topic::TopicResolver;

/// Queue depth between the controller and the publisher
const PUBLISH_QUEUE: usize = 256;

/// Builds and starts the service
pub struct Daemon {
    config: Config,
    bus: Arc<dyn BusClient>,
}

impl Daemon {
    /// Service publishing to the configured MQTT broker
    pub fn new(config: Config) -> Self {
        let bus = Arc::new(MqttBusClient::new(config.mqtt.clone()));
        Self { config, bus }
    }

    /// Service publishing through `bus`
    pub fn with_bus(config: Config, bus: Arc<dyn BusClient>) -> Self {
        Self { config, bus }
    }

    /// Bind the listener and spawn every task
    pub async fn start(self, shutdown: CancellationToken) -> Result<RunningDaemon> {
        let config = self.config;
        let store = AttachmentStore::new(&config.attachments.dir);
        if config.attachments.save {
            store
                .ensure_dir()
                .await
                .context("Failed to prepare attachment directory")?;
        }

        let (publisher, publisher_task) = Publisher::spawn(self.bus, PUBLISH_QUEUE);
        let controller = DebounceController::new(ControllerConfig::from_config(&config), store, publisher);
        let bridge = Bridge::new(TopicResolver::new(&config.mqtt.topic), controller.handle());
        let controller_task = tokio::spawn(controller.run(shutdown.clone()));

        let bind_addr = config.smtp.bind_addr();
        let server = SmtpServer::bind(&bind_addr, config.smtp.server_config(), Arc::new(bridge))
            .await
            .with_context(|| format!("Failed to start SMTP listener on {}", bind_addr))?;
        let smtp_addr = server.local_addr()?;
        let server_task = tokio::spawn(server.run(shutdown.clone()));

        info!(
            %smtp_addr,
            mqtt_host = %config.mqtt.host,
            mqtt_port = config.mqtt.port,
            topic = %config.mqtt.topic,
            reset_window = ?config.reset.window(),
            "mailqtt running"
        );

        Ok(RunningDaemon {
            smtp_addr,
            shutdown,
            drain_grace: config.mqtt.timeout().saturating_mul(2),
            server_task,
            controller_task,
            publisher_task,
        })
    }
}

/// Handles to a started service
pub struct RunningDaemon {
    smtp_addr: SocketAddr,
    shutdown: CancellationToken,
    drain_grace: Duration,
    server_task: JoinHandle<Result<(), smtpintake::SmtpError>>,
    controller_task: JoinHandle<()>,
    publisher_task: JoinHandle<PublisherStats>,
}

impl RunningDaemon {
    pub fn smtp_addr(&self) -> SocketAddr {
        self.smtp_addr
    }

    /// Wait for shutdown, then stop in order: listener, controller, publisher
    ///
    /// Queued publishes get a grace period to drain.
    pub async fn wait(self) -> Result<()> {
        let server_result = self.server_task.await.context("SMTP server task panicked")?;
        if let Err(e) = &server_result {
            warn!(error = %e, "SMTP server stopped with error");
        }

        // Listener is gone; make sure the controller follows even on a server error
        self.shutdown.cancel();
        if let Err(e) = self.controller_task.await {
            warn!(error = %e, "Debounce controller task failed");
        }

        debug!(grace = ?self.drain_grace, "Draining publish queue");
        match tokio::time::timeout(self.drain_grace, self.publisher_task).await {
            Ok(Ok(stats)) => info!(delivered = stats.delivered, failed = stats.failed, "Publish queue drained"),
            Ok(Err(e)) => warn!(error = %e, "Publisher task failed"),
            Err(_) => warn!("Publish queue not drained before grace period ended"),
        }

        info!("mailqtt stopped");
        server_result.map_err(Into::into)
    }
}
