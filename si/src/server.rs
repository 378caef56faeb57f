//! TCP listener and per-connection tasks

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decode::decode_message;
use crate::error::SmtpError;
use crate::handler::{MessageHandler, Reply};
use crate::session::{Action, Session};

/// Longest command line accepted (RFC 5321 allows 512, be lenient)
const MAX_COMMAND_LINE: usize = 4096;

/// Longest single line inside message data
const MAX_DATA_LINE: usize = 1024 * 1024;

/// How long open connections get to finish after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name announced in the greeting and EHLO reply
    pub hostname: String,

    /// Largest accepted message, in bytes
    pub max_message_bytes: usize,

    /// Idle timeout while waiting for a command or data line
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "mailqtt".to_string(),
            max_message_bytes: 32 * 1024 * 1024,
            timeout: Duration::from_secs(300),
        }
    }
}

/// SMTP server bound to a TCP socket
pub struct SmtpServer {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    handler: Arc<dyn MessageHandler>,
}

impl SmtpServer {
    /// Bind a listener on `addr` (e.g. `0.0.0.0:1025`)
    pub async fn bind(addr: &str, config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Result<Self, SmtpError> {
        debug!(%addr, "SmtpServer::bind: called");
        let listener = TcpListener::bind(addr).await.map_err(|source| SmtpError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self::from_listener(listener, config, handler))
    }

    /// Wrap an already bound listener
    pub fn from_listener(listener: TcpListener, config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            listener,
            config: Arc::new(config),
            handler,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SmtpError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), SmtpError> {
        info!(addr = ?self.listener.local_addr().ok(), "SMTP server listening");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("SmtpServer::run: shutdown requested");
                    break;
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "SmtpServer::run: connection accepted");
                            let config = self.config.clone();
                            let handler = self.handler.clone();
                            let token = shutdown.child_token();
                            connections.spawn(async move {
                                if let Err(e) = handle_connection(stream, config, handler, token).await {
                                    debug!(%peer, error = %e, "SMTP connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to accept SMTP connection");
                        }
                    }
                }
            }
        }

        let open = connections.len();
        if open > 0 {
            info!(open, "Waiting for open SMTP connections");
            let drain = async { while connections.join_next().await.is_some() {} };
            if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
                warn!("SMTP connections still open after grace period, aborting");
                connections.abort_all();
            }
        }

        info!("SMTP server stopped");
        Ok(())
    }
}

/// Serve a single client until QUIT, disconnect, timeout or shutdown
async fn handle_connection(
    stream: TcpStream,
    config: Arc<ServerConfig>,
    handler: Arc<dyn MessageHandler>,
    shutdown: CancellationToken,
) -> Result<(), SmtpError> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut session = Session::new(config.hostname.clone(), config.max_message_bytes);

    write_reply(&mut writer, &session.greeting()).await?;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                write_reply(&mut writer, &Reply::new(421, "Service shutting down")).await?;
                return Ok(());
            }
            line = read_line(&mut reader, MAX_COMMAND_LINE, config.timeout) => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(SmtpError::LineTooLong { .. }) => {
                write_reply(&mut writer, &Reply::new(500, "Error: line too long")).await?;
                return Ok(());
            }
            Err(e @ SmtpError::Timeout(_)) => {
                write_reply(&mut writer, &Reply::new(421, "Error: timeout exceeded")).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        match session.handle_command(&String::from_utf8_lossy(&line)) {
            Action::Reply(reply) => write_reply(&mut writer, &reply).await?,
            Action::Close(reply) => {
                write_reply(&mut writer, &reply).await?;
                return Ok(());
            }
            Action::StartData(reply) => {
                write_reply(&mut writer, &reply).await?;
                let reply = match read_data(&mut reader, session.max_message_bytes(), config.timeout).await? {
                    Some(DataOutcome::Complete(raw)) => {
                        let message = decode_message(session.sender(), session.recipients(), &raw);
                        handler.handle_message(message).await
                    }
                    Some(DataOutcome::TooLarge) => Reply::new(552, "Error: Too much mail data"),
                    Some(DataOutcome::LineTooLong) => {
                        write_reply(&mut writer, &Reply::new(500, "Error: line too long")).await?;
                        return Ok(());
                    }
                    None => return Ok(()),
                };
                session.finish_transaction();
                write_reply(&mut writer, &reply).await?;
            }
        }
    }
}

enum DataOutcome {
    Complete(Vec<u8>),
    TooLarge,
    /// A single line exceeded `MAX_DATA_LINE`; the stream can't be resynced
    LineTooLong,
}

/// Read message data up to the lone `.` line, undoing dot-stuffing
///
/// Returns `None` if the client disconnects before the terminator.
async fn read_data<R>(reader: &mut R, max_bytes: usize, timeout: Duration) -> Result<Option<DataOutcome>, SmtpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut data = Vec::new();
    let mut too_large = false;

    loop {
        let line = match read_line(reader, MAX_DATA_LINE, timeout).await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(SmtpError::LineTooLong { .. }) => return Ok(Some(DataOutcome::LineTooLong)),
            Err(e) => return Err(e),
        };

        let content = line.strip_suffix(b"\n").unwrap_or(&line);
        let content = content.strip_suffix(b"\r").unwrap_or(content);
        if content == b"." {
            break;
        }

        let unstuffed = line.strip_prefix(b".").unwrap_or(&line);
        if data.len() + unstuffed.len() > max_bytes {
            too_large = true;
        }
        if !too_large {
            data.extend_from_slice(unstuffed);
        }
    }

    if too_large {
        return Ok(Some(DataOutcome::TooLarge));
    }
    Ok(Some(DataOutcome::Complete(data)))
}

/// Read one LF-terminated line of at most `limit` bytes
async fn read_line<R>(reader: &mut R, limit: usize, timeout: Duration) -> Result<Option<Vec<u8>>, SmtpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = tokio::time::timeout(timeout, (&mut *reader).take(limit as u64).read_until(b'\n', &mut buf))
        .await
        .map_err(|_| SmtpError::Timeout(timeout))??;

    if read == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\n") && buf.len() >= limit {
        return Err(SmtpError::LineTooLong { limit });
    }
    Ok(Some(buf))
}

async fn write_reply<W>(writer: &mut W, reply: &Reply) -> Result<(), SmtpError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(reply.to_wire().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InboundMessage;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Records every message and answers with a fixed reply
    struct RecordingHandler {
        messages: Mutex<Vec<InboundMessage>>,
        reply: Reply,
    }

    impl RecordingHandler {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle_message(&self, message: InboundMessage) -> Reply {
            self.messages.lock().await.push(message);
            self.reply.clone()
        }
    }

    async fn start(handler: Arc<RecordingHandler>, config: ServerConfig) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = SmtpServer::from_listener(listener, config, handler);
        let addr = server.local_addr().unwrap();
        let token = CancellationToken::new();
        tokio::spawn(server.run(token.clone()));
        (addr, token)
    }

    /// Minimal client: send a line, read one (possibly multi-line) reply
    struct Client {
        reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: tokio::net::tcp::OwnedWriteHalf,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> (Self, String) {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (r, w) = stream.into_split();
            let mut client = Self {
                reader: BufReader::new(r),
                writer: w,
            };
            let greeting = client.read_reply().await;
            (client, greeting)
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
    }

    const MAIL: &str = "Subject: Person Detected from Garage at 01:00\r\n\r\nhello\r\n..dotted line\r\n.";

    #[tokio::test]
    async fn test_delivers_message_to_handler() {
        let handler = RecordingHandler::new(Reply::ok("Message accepted for delivery"));
        let (addr, token) = start(handler.clone(), ServerConfig::default()).await;

        let (mut client, greeting) = Client::connect(addr).await;
        assert!(greeting.starts_with("220 "));
        assert!(client.send("EHLO cam").await.starts_with("250-"));
        assert!(client.send("MAIL FROM:<cam@example.com>").await.starts_with("250"));
        assert!(client.send("RCPT TO:<alerts@example.com>").await.starts_with("250"));
        assert!(client.send("DATA").await.starts_with("354"));
        let reply = client.send(MAIL).await;
        assert_eq!(reply, "250 Message accepted for delivery\r\n");
        assert!(client.send("QUIT").await.starts_with("221"));

        let messages = handler.messages.lock().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "cam@example.com");
        assert_eq!(messages[0].subject.as_deref(), Some("Person Detected from Garage at 01:00"));
        assert!(messages[0].body_text.contains(".dotted line"));
        assert!(!messages[0].body_text.contains("..dotted"));

        token.cancel();
    }

    #[tokio::test]
    async fn test_handler_rejection_is_returned() {
        let handler = RecordingHandler::new(Reply::new(554, "Malformed subject"));
        let (addr, token) = start(handler, ServerConfig::default()).await;

        let (mut client, _) = Client::connect(addr).await;
        client.send("HELO cam").await;
        client.send("MAIL FROM:<cam@example.com>").await;
        client.send("RCPT TO:<alerts@example.com>").await;
        client.send("DATA").await;
        let reply = client.send("Subject: hello\r\n\r\nbody\r\n.").await;
        assert_eq!(reply, "554 Malformed subject\r\n");

        // Connection stays usable for the next transaction
        assert!(client.send("MAIL FROM:<cam@example.com>").await.starts_with("250"));

        token.cancel();
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let handler = RecordingHandler::new(Reply::ok("accepted"));
        let config = ServerConfig {
            max_message_bytes: 16,
            ..Default::default()
        };
        let (addr, token) = start(handler.clone(), config).await;

        let (mut client, _) = Client::connect(addr).await;
        client.send("HELO cam").await;
        client.send("MAIL FROM:<cam@example.com>").await;
        client.send("RCPT TO:<alerts@example.com>").await;
        client.send("DATA").await;
        let reply = client.send("Subject: this body is far too long\r\n\r\nbody\r\n.").await;
        assert!(reply.starts_with("552"));
        assert!(handler.messages.lock().await.is_empty());

        token.cancel();
    }

    #[tokio::test]
    async fn test_read_line_reports_eof() {
        let mut reader = BufReader::new(&b""[..]);
        let line = read_line(&mut reader, 16, Duration::from_secs(1)).await.unwrap();
        assert!(line.is_none());
    }

    #[tokio::test]
    async fn test_read_line_too_long() {
        let mut reader = BufReader::new(&b"0123456789abcdef0123\r\n"[..]);
        let result = read_line(&mut reader, 8, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(SmtpError::LineTooLong { limit: 8 })));
    }

    #[tokio::test]
    async fn test_read_data_overlong_line() {
        let mut input = vec![b'a'; MAX_DATA_LINE + 16];
        input.extend_from_slice(b"\r\n.\r\n");
        let mut reader = BufReader::new(&input[..]);

        let outcome = read_data(&mut reader, usize::MAX, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(outcome, Some(DataOutcome::LineTooLong)));
    }

    #[tokio::test]
    async fn test_read_data_unstuffs_dots() {
        let mut reader = BufReader::new(&b"line one\r\n..two\r\n.\r\nafter\r\n"[..]);
        match read_data(&mut reader, 1024, Duration::from_secs(1)).await.unwrap() {
            Some(DataOutcome::Complete(data)) => assert_eq!(data, b"line one\r\n.two\r\n"),
            _ => panic!("Expected complete data"),
        }
    }
}
