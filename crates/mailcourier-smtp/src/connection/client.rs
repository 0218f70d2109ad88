//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::marker::PhantomData;

type HmacMd5 = Hmac<md5::Md5>;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for a session ready for mail transactions: either
/// authenticated, or returned to idle after a completed transaction.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    client_hostname: String,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;

    /// Returns true if the session is encrypted.
    fn is_tls(&self) -> bool;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;
        if !greeting.is_success() {
            return Err(Error::smtp_error(
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }

        let hostname = greeting
            .first_line()
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_string();
        tracing::debug!(server = %hostname, "Received SMTP greeting");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            client_hostname: String::new(),
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.client_hostname = client_hostname.to_string();
        self.send_ehlo().await?;
        Ok(self)
    }

    /// Upgrades the connection to TLS using STARTTLS, then repeats EHLO.
    ///
    /// The server certificate is verified against `server_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub async fn starttls(mut self, server_name: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.send_command(Command::StartTls).await?;
        ensure_success(&reply)?;

        self.stream = self.stream.upgrade_to_tls(server_name).await?;
        tracing::debug!(server_name, "Upgraded connection with STARTTLS");

        // Capabilities may differ once encrypted.
        self.send_ehlo().await?;
        Ok(self)
    }

    /// Authenticates with the given mechanism.
    ///
    /// For PLAIN and LOGIN `secret` is the password; for CRAM-MD5 it is the
    /// shared secret keying the HMAC.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthFailed`] if the server rejects the exchange.
    pub async fn auth(
        self,
        mechanism: AuthMechanism,
        username: &str,
        secret: &str,
    ) -> Result<Client<Authenticated>> {
        if !self.server_info.supports_auth(mechanism) {
            tracing::warn!(
                mechanism = mechanism.as_str(),
                "Server did not advertise mechanism, trying anyway"
            );
        }

        match mechanism {
            AuthMechanism::Plain => self.auth_plain(username, secret).await,
            AuthMechanism::Login => self.auth_login(username, secret).await,
            AuthMechanism::CramMd5 => self.auth_cram_md5(username, secret).await,
        }
    }

    /// Authenticates using PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        // \0username\0password
        let credentials = format!("\0{username}\0{password}");
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(STANDARD.encode(credentials.as_bytes())),
        };

        let reply = self.send_command(cmd).await?;
        ensure_authenticated(&reply)?;
        tracing::info!(mechanism = "PLAIN", "Authenticated");
        Ok(self.transition())
    }

    /// Authenticates using LOGIN mechanism: username and password each
    /// answer a 334 prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        let reply = self.send_command(cmd).await?;
        ensure_challenge(&reply)?;

        let reply = self
            .send_command(Command::AuthResponse(STANDARD.encode(username)))
            .await?;
        ensure_challenge(&reply)?;

        let reply = self
            .send_command(Command::AuthResponse(STANDARD.encode(password)))
            .await?;
        ensure_authenticated(&reply)?;
        tracing::info!(mechanism = "LOGIN", "Authenticated");
        Ok(self.transition())
    }

    /// Authenticates using CRAM-MD5 (RFC 2195).
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is malformed or authentication fails.
    pub async fn auth_cram_md5(
        mut self,
        username: &str,
        secret: &str,
    ) -> Result<Client<Authenticated>> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::CramMd5,
            initial_response: None,
        };
        let reply = self.send_command(cmd).await?;
        ensure_challenge(&reply)?;

        let response = cram_md5_response(username, secret, reply.first_line())?;
        let reply = self.send_command(Command::AuthResponse(response)).await?;
        ensure_authenticated(&reply)?;
        tracing::info!(mechanism = "CRAM-MD5", "Authenticated");
        Ok(self.transition())
    }

    /// Proceeds to the transaction-ready state without authenticating.
    #[must_use]
    pub fn anonymous(self) -> Client<Authenticated> {
        tracing::debug!(server = %self.server_info.hostname, "Proceeding without authentication");
        self.transition()
    }

    /// Starts a mail transaction without authentication (if server allows).
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(mut self, from: Address) -> Result<Client<MailTransaction>> {
        self.start_transaction(from).await?;
        Ok(self.transition())
    }

    async fn send_ehlo(&mut self) -> Result<()> {
        let cmd = Command::Ehlo {
            hostname: self.client_hostname.clone(),
        };
        let reply = self.send_command(cmd).await?;
        ensure_success(&reply)?;

        // The first line is the server's greeting, not an extension.
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(String::as_str)
            .map(Extension::parse)
            .collect();
        tracing::debug!(extensions = ?self.server_info.extensions, "EHLO accepted");
        Ok(())
    }
}

impl Client<Authenticated> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(mut self, from: Address) -> Result<Client<MailTransaction>> {
        self.start_transaction(from).await?;
        Ok(self.transition())
    }
}

impl Client<MailTransaction> {
    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Client<RecipientAdded>> {
        self.add_recipient(to).await?;
        Ok(self.transition())
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Self> {
        self.add_recipient(to).await?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the DATA command fails.
    pub async fn data(mut self) -> Result<Client<Data>> {
        let reply = self.send_command(Command::Data).await?;

        if reply.code != ReplyCode::START_DATA {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }
}

impl Client<Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to CRLF, lines starting with `.` are
    /// dot-stuffed and the terminating `.` line is appended. The session is
    /// ready for another transaction afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if sending the message fails or server rejects it.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Authenticated>> {
        let payload = dot_stuff(message);
        self.stream.write_all(&payload).await?;

        let reply = read_reply(&mut self.stream).await?;
        ensure_success(&reply)?;
        tracing::debug!(bytes = payload.len(), reply = %reply.message_text(), "Message accepted");

        Ok(self.transition())
    }
}

// Common implementation for all states
impl<S> Client<S> {
    fn transition<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            client_hostname: self.client_hostname,
            _state: PhantomData,
        }
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        tracing::trace!(command = %cmd.redacted(), "C:");
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = read_reply(&mut self.stream).await?;
        tracing::trace!(code = %reply.code, "S:");
        Ok(reply)
    }

    async fn start_transaction(&mut self, from: Address) -> Result<()> {
        let reply = self.send_command(Command::MailFrom { from }).await?;
        ensure_success(&reply)
    }

    async fn add_recipient(&mut self, to: Address) -> Result<()> {
        let reply = self.send_command(Command::RcptTo { to }).await?;
        ensure_success(&reply)
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;

        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        Ok(())
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
    }

    parse_reply(&lines)
}

fn ensure_success(reply: &Reply) -> Result<()> {
    if reply.is_success() {
        Ok(())
    } else {
        Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()))
    }
}

fn ensure_challenge(reply: &Reply) -> Result<()> {
    if reply.code == ReplyCode::AUTH_CONTINUE {
        Ok(())
    } else {
        Err(Error::auth_failed(reply.code.as_u16(), reply.message_text()))
    }
}

fn ensure_authenticated(reply: &Reply) -> Result<()> {
    if reply.is_success() {
        Ok(())
    } else {
        Err(Error::auth_failed(reply.code.as_u16(), reply.message_text()))
    }
}

/// Computes the base64 CRAM-MD5 answer: `username hex(HMAC-MD5(secret, challenge))`.
fn cram_md5_response(username: &str, secret: &str, challenge_b64: &str) -> Result<String> {
    let challenge = STANDARD
        .decode(challenge_b64.trim())
        .map_err(|e| Error::Protocol(format!("Invalid CRAM-MD5 challenge: {e}")))?;

    let mut mac = HmacMd5::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Protocol(format!("Invalid CRAM-MD5 key: {e}")))?;
    mac.update(&challenge);

    let mut response = format!("{username} ");
    for byte in mac.finalize().into_bytes() {
        let _ = write!(response, "{byte:02x}");
    }
    Ok(STANDARD.encode(response))
}

/// Prepares message content for the DATA phase.
///
/// Every line (split on LF, with a trailing CR dropped) is emitted with a
/// CRLF terminator, lines starting with `.` get an extra leading `.`, and the
/// `.` end-of-data line is appended. A final line break in the input does
/// not produce an extra empty line.
#[must_use]
pub fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let body = message
        .strip_suffix(b"\r\n")
        .or_else(|| message.strip_suffix(b"\n"))
        .unwrap_or(message);

    let mut out = Vec::with_capacity(message.len() + message.len() / 32 + 5);
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cram_md5_rfc2195_vector() {
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let response = cram_md5_response("tim", "tanstaaftanstaaf", &challenge).unwrap();
        assert_eq!(
            String::from_utf8(STANDARD.decode(response).unwrap()).unwrap(),
            "tim b913a602c7eda7a495b4e6e7334d3890"
        );
    }

    #[test]
    fn test_cram_md5_bad_challenge() {
        assert!(matches!(
            cram_md5_response("tim", "secret", "not base64!"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_dot_stuff_normalizes_line_endings() {
        assert_eq!(dot_stuff(b"a\nb\r\nc"), b"a\r\nb\r\nc\r\n.\r\n");
    }

    #[test]
    fn test_dot_stuff_trailing_newline() {
        assert_eq!(dot_stuff(b"Subject: x\r\n\r\nbody\r\n"), b"Subject: x\r\n\r\nbody\r\n.\r\n");
    }

    #[test]
    fn test_dot_stuff_leading_dots() {
        assert_eq!(dot_stuff(b".\r\n..x\r\ny."), b"..\r\n...x\r\ny.\r\n.\r\n");
    }

    #[test]
    fn test_dot_stuff_empty() {
        assert_eq!(dot_stuff(b""), b"\r\n.\r\n");
    }

    #[test]
    fn test_auth_reply_checks() {
        let challenge = Reply::new(ReplyCode::AUTH_CONTINUE, vec!["VXNlcm5hbWU6".into()]);
        assert!(ensure_challenge(&challenge).is_ok());
        assert!(ensure_authenticated(&challenge).is_err());

        let rejected = Reply::new(ReplyCode::new(535), vec!["bad credentials".into()]);
        assert!(matches!(
            ensure_authenticated(&rejected),
            Err(Error::AuthFailed { code: 535, .. })
        ));
    }
}
