//! Per-connection SMTP command state machine
//!
//! The session holds no I/O: the server feeds it one command line at a time
//! and writes whatever [`Action`] comes back. Message data itself is read by
//! the server once the session answers `DATA` with [`Action::StartData`].

use tracing::debug;

use crate::handler::Reply;

const SUPPORTED_COMMANDS: &str = "EHLO HELO MAIL RCPT DATA RSET NOOP QUIT VRFY HELP";

/// What the server should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send the reply and keep reading commands
    Reply(Reply),

    /// Send the reply and read message data until the terminating dot
    StartData(Reply),

    /// Send the reply and close the connection
    Close(Reply),
}

/// SMTP state for one client connection
#[derive(Debug)]
pub struct Session {
    hostname: String,
    max_message_bytes: usize,
    client_name: Option<String>,
    mail_from: Option<String>,
    recipients: Vec<String>,
}

impl Session {
    pub fn new(hostname: impl Into<String>, max_message_bytes: usize) -> Self {
        Self {
            hostname: hostname.into(),
            max_message_bytes,
            client_name: None,
            mail_from: None,
            recipients: Vec::new(),
        }
    }

    /// Banner sent when the client connects
    pub fn greeting(&self) -> Reply {
        Reply::new(220, format!("{} ESMTP mailqtt", self.hostname))
    }

    /// Envelope sender of the current transaction
    pub fn sender(&self) -> &str {
        self.mail_from.as_deref().unwrap_or_default()
    }

    /// Envelope recipients of the current transaction
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Clear the envelope after a message was delivered or rejected
    pub fn finish_transaction(&mut self) {
        self.mail_from = None;
        self.recipients.clear();
    }

    /// Process one command line (without its CRLF)
    pub fn handle_command(&mut self, line: &str) -> Action {
        let line = line.trim();
        if line.is_empty() {
            return Action::Reply(Reply::new(500, "Error: bad syntax"));
        }

        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.trim()),
            None => (line.to_ascii_uppercase(), ""),
        };
        debug!(%verb, "Session::handle_command");

        match verb.as_str() {
            "HELO" => self.helo(arg),
            "EHLO" => self.ehlo(arg),
            "MAIL" => self.mail(arg),
            "RCPT" => self.rcpt(arg),
            "DATA" => self.data(arg),
            "RSET" => {
                self.finish_transaction();
                Action::Reply(Reply::ok("OK"))
            }
            "NOOP" => Action::Reply(Reply::ok("OK")),
            "VRFY" => Action::Reply(Reply::new(
                252,
                "Cannot VRFY user, but will accept message and attempt delivery",
            )),
            "HELP" => Action::Reply(Reply::ok(format!("Supported commands: {}", SUPPORTED_COMMANDS))),
            "QUIT" => Action::Close(Reply::new(221, "Bye")),
            _ => Action::Reply(Reply::new(500, format!("Error: command \"{}\" not recognized", verb))),
        }
    }

    fn helo(&mut self, arg: &str) -> Action {
        if arg.is_empty() {
            return Action::Reply(Reply::new(501, "Syntax: HELO hostname"));
        }
        self.client_name = Some(arg.to_string());
        self.finish_transaction();
        Action::Reply(Reply::ok(self.hostname.clone()))
    }

    fn ehlo(&mut self, arg: &str) -> Action {
        if arg.is_empty() {
            return Action::Reply(Reply::new(501, "Syntax: EHLO hostname"));
        }
        self.client_name = Some(arg.to_string());
        self.finish_transaction();
        Action::Reply(Reply::multiline(
            250,
            vec![
                self.hostname.clone(),
                format!("SIZE {}", self.max_message_bytes),
                "8BITMIME".to_string(),
                "HELP".to_string(),
            ],
        ))
    }

    fn mail(&mut self, arg: &str) -> Action {
        if self.client_name.is_none() {
            return Action::Reply(Reply::new(503, "Error: send HELO first"));
        }
        if self.mail_from.is_some() {
            return Action::Reply(Reply::new(503, "Error: nested MAIL command"));
        }
        let Some((address, params)) = parse_path(arg, "FROM:") else {
            return Action::Reply(Reply::new(501, "Syntax: MAIL FROM: <address>"));
        };

        if let Some(size) = declared_size(params)
            && size > self.max_message_bytes
        {
            return Action::Reply(Reply::new(552, "Error: message size exceeds fixed maximum message size"));
        }

        self.mail_from = Some(address);
        Action::Reply(Reply::ok("OK"))
    }

    fn rcpt(&mut self, arg: &str) -> Action {
        if self.client_name.is_none() {
            return Action::Reply(Reply::new(503, "Error: send HELO first"));
        }
        if self.mail_from.is_none() {
            return Action::Reply(Reply::new(503, "Error: need MAIL command"));
        }
        match parse_path(arg, "TO:") {
            Some((address, _)) if !address.is_empty() => {
                self.recipients.push(address);
                Action::Reply(Reply::ok("OK"))
            }
            _ => Action::Reply(Reply::new(501, "Syntax: RCPT TO: <address>")),
        }
    }

    fn data(&mut self, arg: &str) -> Action {
        if self.client_name.is_none() {
            return Action::Reply(Reply::new(503, "Error: send HELO first"));
        }
        if !arg.is_empty() {
            return Action::Reply(Reply::new(501, "Syntax: DATA"));
        }
        if self.mail_from.is_none() {
            return Action::Reply(Reply::new(503, "Error: need MAIL command"));
        }
        if self.recipients.is_empty() {
            return Action::Reply(Reply::new(503, "Error: need RCPT command"));
        }
        Action::StartData(Reply::new(354, "End data with <CR><LF>.<CR><LF>"))
    }
}

/// Split `FROM:<addr> PARAMS` into the address and the trailing parameters
fn parse_path<'a>(arg: &'a str, keyword: &str) -> Option<(String, &'a str)> {
    let head = arg.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = arg[keyword.len()..].trim_start();

    if let Some(inner) = rest.strip_prefix('<') {
        let end = inner.find('>')?;
        Some((inner[..end].trim().to_string(), inner[end + 1..].trim()))
    } else {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let address = parts.next().filter(|a| !a.is_empty())?;
        Some((address.to_string(), parts.next().unwrap_or_default().trim()))
    }
}

/// `SIZE=<n>` ESMTP parameter, if present and numeric
fn declared_size(params: &str) -> Option<usize> {
    params.split_whitespace().find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.eq_ignore_ascii_case("SIZE") {
            value.parse().ok()
        } else {
            None
        }
    })
}
