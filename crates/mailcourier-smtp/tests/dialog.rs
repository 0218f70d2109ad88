//! SMTP dialog tests against a scripted local server.
//!
//! Each test binds a listener on loopback, plays a fixed sequence of
//! replies and checks what the client sent.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailcourier_smtp::connection::connect;
use mailcourier_smtp::{Address, AuthMechanism, Client, Connected, Error, SmtpConnection};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Marks a step that reads message content up to the `.` line.
const DATA_BODY: &str = "<data>";

const EHLO_REPLY: &str = "250-mock.example.com\r\n250-AUTH PLAIN LOGIN CRAM-MD5\r\n250 8BITMIME\r\n";

/// Logs to the test output; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailcourier_smtp=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Serves one connection: sends `greeting`, then for every step reads a
/// command line (checking its prefix) and writes the reply. Returns what
/// was received, message content as one CRLF-joined entry.
async fn scripted_server(
    greeting: &'static str,
    steps: Vec<(&'static str, &'static str)>,
) -> (String, JoinHandle<Vec<String>>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        let mut received = Vec::new();

        write.write_all(greeting.as_bytes()).await.unwrap();

        for (expect, reply) in steps {
            if expect == DATA_BODY {
                let mut lines = Vec::new();
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    let line = line.trim_end_matches("\r\n").to_string();
                    if line == "." {
                        break;
                    }
                    lines.push(line);
                }
                received.push(lines.join("\r\n"));
            } else {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let line = line.trim_end_matches("\r\n").to_string();
                assert!(line.starts_with(expect), "expected {expect:?}, got {line:?}");
                received.push(line);
            }
            if !reply.is_empty() {
                write.write_all(reply.as_bytes()).await.unwrap();
            }
        }
        received
    });

    (addr, handle)
}

async fn greeted(addr: &str) -> Client<Connected> {
    let stream = connect(addr).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    client.ehlo("client.test").await.unwrap()
}

#[tokio::test]
async fn test_plain_auth_and_send() {
    let (addr, server) = scripted_server(
        "220 mock.example.com ESMTP\r\n",
        vec![
            ("EHLO client.test", EHLO_REPLY),
            ("AUTH PLAIN ", "235 2.7.0 Authentication successful\r\n"),
            ("MAIL FROM:<sender@example.com>", "250 OK\r\n"),
            ("RCPT TO:<a@example.com>", "250 OK\r\n"),
            ("RCPT TO:<b@example.com>", "250 OK\r\n"),
            ("DATA", "354 End data with <CR><LF>.<CR><LF>\r\n"),
            (DATA_BODY, "250 2.0.0 Queued\r\n"),
            ("QUIT", "221 Bye\r\n"),
        ],
    )
    .await;

    let client = greeted(&addr).await;
    assert_eq!(client.server_info().hostname, "mock.example.com");
    assert!(!client.is_tls());
    assert!(client.server_info().supports_auth(AuthMechanism::CramMd5));

    let client = client
        .auth(AuthMechanism::Plain, "user", "pass")
        .await
        .unwrap();
    let client = client
        .mail_from(Address::new("sender@example.com").unwrap())
        .await
        .unwrap();
    let client = client.rcpt_to(Address::new("a@example.com").unwrap()).await.unwrap();
    let client = client.rcpt_to(Address::new("b@example.com").unwrap()).await.unwrap();
    let client = client.data().await.unwrap();
    let client = client
        .send_message(b"Subject: Hi\r\n\r\n.hidden line\r\nlast\r\n")
        .await
        .unwrap();
    client.quit().await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received[1], format!("AUTH PLAIN {}", STANDARD.encode("\0user\0pass")));
    assert_eq!(received[6], "Subject: Hi\r\n\r\n..hidden line\r\nlast");
}

#[tokio::test]
async fn test_login_auth() {
    let (addr, server) = scripted_server(
        "220 mock ready\r\n",
        vec![
            ("EHLO", EHLO_REPLY),
            ("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
            ("", "334 UGFzc3dvcmQ6\r\n"),
            ("", "235 OK\r\n"),
        ],
    )
    .await;

    let client = greeted(&addr).await;
    client.auth_login("user", "pass").await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received[2], STANDARD.encode("user"));
    assert_eq!(received[3], STANDARD.encode("pass"));
}

#[tokio::test]
async fn test_cram_md5_auth() {
    let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
    let challenge_reply: &'static str = Box::leak(format!("334 {challenge}\r\n").into_boxed_str());

    let (addr, server) = scripted_server(
        "220 mock ready\r\n",
        vec![
            ("EHLO", EHLO_REPLY),
            ("AUTH CRAM-MD5", challenge_reply),
            ("", "235 OK\r\n"),
        ],
    )
    .await;

    let client = greeted(&addr).await;
    client
        .auth(AuthMechanism::CramMd5, "tim", "tanstaaftanstaaf")
        .await
        .unwrap();

    let received = server.await.unwrap();
    let answer = String::from_utf8(STANDARD.decode(&received[2]).unwrap()).unwrap();
    assert_eq!(answer, "tim b913a602c7eda7a495b4e6e7334d3890");
}

#[tokio::test]
async fn test_rejected_credentials() {
    let (addr, _server) = scripted_server(
        "220 mock ready\r\n",
        vec![
            ("EHLO", EHLO_REPLY),
            ("AUTH PLAIN", "535 5.7.8 Authentication credentials invalid\r\n"),
        ],
    )
    .await;

    let client = greeted(&addr).await;
    let err = client.auth_plain("user", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::AuthFailed { code: 535, .. }));
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_rejected_recipient() {
    let (addr, _server) = scripted_server(
        "220 mock ready\r\n",
        vec![
            ("EHLO", EHLO_REPLY),
            ("MAIL FROM", "250 OK\r\n"),
            ("RCPT TO", "550 5.1.1 No such user\r\n"),
        ],
    )
    .await;

    let client = greeted(&addr).await;
    let client = client
        .mail_from(Address::new("sender@example.com").unwrap())
        .await
        .unwrap();
    let err = client
        .rcpt_to(Address::new("nobody@example.com").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 550, .. }));
}

#[tokio::test]
async fn test_two_transactions_one_connection() {
    let (addr, server) = scripted_server(
        "220 mock ready\r\n",
        vec![
            ("EHLO", EHLO_REPLY),
            ("AUTH PLAIN", "235 OK\r\n"),
            ("MAIL FROM", "250 OK\r\n"),
            ("RCPT TO", "250 OK\r\n"),
            ("DATA", "354 go\r\n"),
            (DATA_BODY, "250 first\r\n"),
            ("MAIL FROM", "250 OK\r\n"),
            ("RCPT TO", "250 OK\r\n"),
            ("DATA", "354 go\r\n"),
            (DATA_BODY, "250 second\r\n"),
        ],
    )
    .await;

    let mut client = greeted(&addr).await.auth_plain("u", "p").await.unwrap();
    for body in ["one", "two"] {
        let data = client
            .mail_from(Address::new("s@example.com").unwrap())
            .await
            .unwrap()
            .rcpt_to(Address::new("r@example.com").unwrap())
            .await
            .unwrap()
            .data()
            .await
            .unwrap();
        client = data.send_message(body.as_bytes()).await.unwrap();
    }

    let received = server.await.unwrap();
    assert_eq!(received[5], "one");
    assert_eq!(received[9], "two");
}

#[tokio::test]
async fn test_starttls_requires_advertisement() {
    let (addr, _server) = scripted_server("220 mock ready\r\n", vec![("EHLO", EHLO_REPLY)]).await;

    let client = greeted(&addr).await;
    let err = client.starttls("localhost").await.unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
}

#[tokio::test]
async fn test_rejecting_greeting() {
    let (addr, _server) =
        scripted_server("554 5.3.2 No service for you\r\n", Vec::new()).await;

    let stream = connect(&addr).await.unwrap();
    let err = Client::from_stream(stream).await.unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
}

#[tokio::test]
async fn test_connection_closed_mid_dialog() {
    let (addr, _server) = scripted_server("220 mock ready\r\n", vec![("EHLO", "")]).await;

    let stream = connect(&addr).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let err = client.ehlo("client.test").await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
