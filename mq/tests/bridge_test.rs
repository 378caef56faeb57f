//! End-to-end tests: SMTP socket in, recorded bus publishes out

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use mailqtt::{BusClient, Config, Daemon, PublishError, RunningDaemon};

#[derive(Default)]
struct SpyBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl SpyBus {
    fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    async fn wait_for(&self, n: usize) -> Vec<(String, Vec<u8>)> {
        for _ in 0..300 {
            let published = self.published();
            if published.len() >= n {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} publishes, saw {}", n, self.published().len());
    }
}

#[async_trait]
impl BusClient for SpyBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.published.lock().unwrap().push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

fn test_config(dir: &TempDir, reset_secs: u64) -> Config {
    let mut config = Config::default();
    config.smtp.host = "127.0.0.1".to_string();
    config.smtp.port = 0;
    config.mqtt.topic = "cams".to_string();
    config.reset.time_secs = reset_secs;
    config.attachments.dir = dir.path().join("attachments");
    config
}

async fn start(config: Config, bus: Arc<SpyBus>) -> (RunningDaemon, CancellationToken) {
    let shutdown = CancellationToken::new();
    let running = Daemon::with_bus(config, bus).start(shutdown.clone()).await.unwrap();
    (running, shutdown)
}

struct SmtpClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl SmtpClient {
    async fn connect(addr: SocketAddr) -> Self {
        let (r, w) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut client = Self {
            reader: BufReader::new(r),
            writer: w,
        };
        assert!(client.read_reply().await.starts_with("220"));
        client
    }

    async fn read_reply(&mut self) -> String {
        let mut out = String::new();
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            out.push_str(&line);
            if line.len() < 4 || line.as_bytes()[3] != b'-' {
                return out;
            }
        }
    }

    async fn send(&mut self, line: &str) -> String {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
        self.read_reply().await
    }

    /// Run one full transaction and return the final reply
    async fn deliver(&mut self, data: &str) -> String {
        assert!(self.send("EHLO camera").await.starts_with("250"));
        assert!(self.send("MAIL FROM:<cam@example.com>").await.starts_with("250"));
        assert!(self.send("RCPT TO:<alerts@example.com>").await.starts_with("250"));
        assert!(self.send("DATA").await.starts_with("354"));
        self.send(&format!("{}\r\n.", data)).await
    }
}

const SNAPSHOT_MAIL: &str = "From: cam@example.com\r\n\
Subject: Person Detected from Front Door at 10:32pm\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain\r\n\
\r\n\
Motion on Front Door\r\n\
--XYZ\r\n\
Content-Type: image/jpeg\r\n\
Content-Disposition: attachment; filename=\"snap.jpg\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aGVsbG8=\r\n\
--XYZ--";

#[tokio::test]
async fn test_alert_mail_is_published_and_image_saved() {
    let temp = TempDir::new().unwrap();
    let bus = Arc::new(SpyBus::default());
    let config = test_config(&temp, 0);
    let dir = config.attachments.dir.clone();
    let (running, shutdown) = start(config, bus.clone()).await;

    let mut client = SmtpClient::connect(running.smtp_addr()).await;
    let reply = client.deliver(SNAPSHOT_MAIL).await;
    assert_eq!(reply, "250 Message accepted for delivery\r\n");
    client.send("QUIT").await;

    let published = bus.wait_for(1).await;
    let (topic, payload) = &published[0];
    assert_eq!(topic, "cams/person");

    let json: serde_json::Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(json["subject"], "Person Detected from Front Door at 10:32pm");
    assert_eq!(json["camera"], "Front Door");
    assert_eq!(json["detected_thing"], "Person");
    assert_eq!(json["filename"], "Front Door-snap.jpg");

    let saved = std::fs::read(dir.join("Front Door-snap.jpg")).unwrap();
    assert_eq!(saved, b"hello");

    shutdown.cancel();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_malformed_subject_is_rejected_without_publishing() {
    let temp = TempDir::new().unwrap();
    let bus = Arc::new(SpyBus::default());
    let (running, shutdown) = start(test_config(&temp, 0), bus.clone()).await;

    let mut client = SmtpClient::connect(running.smtp_addr()).await;
    let reply = client.deliver("Subject: Test message\r\n\r\nhello").await;
    assert!(reply.starts_with("554"), "unexpected reply: {}", reply);

    // Session stays usable after a rejection
    let reply = client
        .deliver("Subject: Vehicle Detected from Driveway at 08:15am\r\n\r\nhello")
        .await;
    assert!(reply.starts_with("250"));

    let published = bus.wait_for(1).await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "cams/vehicle");

    shutdown.cancel();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_reset_published_after_quiet_period() {
    let temp = TempDir::new().unwrap();
    let bus = Arc::new(SpyBus::default());
    let mut config = test_config(&temp, 1);
    config.reset.payload = "CLEAR".to_string();
    let (running, shutdown) = start(config, bus.clone()).await;

    let mut client = SmtpClient::connect(running.smtp_addr()).await;
    let subject = "Subject: Person Detected from Yard at 1pm\r\n\r\nx";
    assert!(client.deliver(subject).await.starts_with("250"));
    assert!(client.deliver(subject).await.starts_with("250"));

    let published = bus.wait_for(3).await;
    assert_eq!(published.len(), 3);
    assert_eq!(published[2], ("cams/person".to_string(), b"CLEAR".to_vec()));

    shutdown.cancel();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_listener() {
    let temp = TempDir::new().unwrap();
    let bus = Arc::new(SpyBus::default());
    let (running, shutdown) = start(test_config(&temp, 0), bus).await;
    let addr = running.smtp_addr();

    shutdown.cancel();
    running.wait().await.unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}
