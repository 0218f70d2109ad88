//! Delivery tests against a scripted local SMTP server.
//!
//! The server accepts one connection per script, plays the replies and
//! records what the client sent.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use mailcourier_core::dispatch::{
    SEND_MAIL_ATTACMENTS, SEND_MAIL_BODY_PLAIN, SEND_MAIL_FROM, SEND_MAIL_SUBJECT, SEND_MAIL_TO,
};
use mailcourier_core::{
    Config, Deliver, Delivery, Error, Message, OneShot, Session, SmtpSettings, send_mail,
};
use mailcourier_smtp::connection::connect;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Marks a step that reads message content up to the `.` line.
const DATA_BODY: &str = "<data>";

const GREETING: &str = "220 mock.example.com ESMTP\r\n";
const EHLO_REPLY: &str = "250-mock.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 8BITMIME\r\n";

type Script = Vec<(&'static str, &'static str)>;

/// Logs to the test output; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailcourier_core=debug,mailcourier_smtp=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

async fn scripted_server(scripts: Vec<Script>) -> (String, JoinHandle<Vec<Vec<String>>>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let mut sessions = Vec::new();
        for steps in scripts {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);
            let mut received = Vec::new();

            write.write_all(GREETING.as_bytes()).await.unwrap();
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
                write.write_all(reply.as_bytes()).await.unwrap();
            }
            sessions.push(received);
        }
        sessions
    });

    (addr, handle)
}

fn settings(addr: &str, authentication: &str) -> SmtpSettings {
    let mut settings = SmtpSettings {
        connect: addr.to_string(),
        authentication: authentication.to_string(),
        user_name: "Notifier".into(),
        user_login: "notify@example.com".into(),
        password: "hunter2".into(),
        ..SmtpSettings::default()
    };
    settings.expand().unwrap();
    settings
}

fn plain_transaction(rcpt: &'static str) -> Script {
    vec![
        ("MAIL FROM:<notify@example.com>", "250 OK\r\n"),
        (rcpt, "250 OK\r\n"),
        ("DATA", "354 go ahead\r\n"),
        (DATA_BODY, "250 2.0.0 queued\r\n"),
    ]
}

#[tokio::test]
async fn test_one_shot_sends_to_every_recipient() {
    let (addr, server) = scripted_server(vec![vec![
        ("EHLO localhost", EHLO_REPLY),
        ("AUTH PLAIN ", "235 OK\r\n"),
        ("MAIL FROM:<notify@example.com>", "250 OK\r\n"),
        ("RCPT TO:<a@example.com>", "250 OK\r\n"),
        ("RCPT TO:<b@example.com>", "250 OK\r\n"),
        ("RCPT TO:<c@example.com>", "250 OK\r\n"),
        ("RCPT TO:<hidden@example.com>", "250 OK\r\n"),
        ("DATA", "354 go ahead\r\n"),
        (DATA_BODY, "250 2.0.0 queued\r\n"),
        ("QUIT", "221 bye\r\n"),
    ]])
    .await;

    let settings = settings(&addr, "plain");
    let mut message = Message::connect(&settings).await.unwrap();
    assert!(!message.delivery().is_session());

    let email = message.email_mut();
    email.set_from("notify@example.com");
    email.set_to(["a@example.com", "b@example.com"]);
    email.add_cc("c@example.com");
    email.add_bcc("hidden@example.com");
    email.set_subject("Report");
    email.plain_mut().set(".leading dot\nsecond line");
    message.send().await.unwrap();
    message.close().await;

    let sessions = server.await.unwrap();
    let body = &sessions[0][8];
    assert!(body.contains("To: a@example.com, b@example.com\r\n"));
    assert!(body.contains("Cc: c@example.com\r\n"));
    assert!(!body.contains("Bcc:"));
    assert!(body.contains("Subject: Report\r\n"));
    assert!(body.contains("\r\n..leading dot\r\nsecond line"));
}

#[tokio::test]
async fn test_one_shot_rejected_recipient_aborts() {
    let (addr, _server) = scripted_server(vec![vec![
        ("EHLO", EHLO_REPLY),
        ("MAIL FROM", "250 OK\r\n"),
        ("RCPT TO:<a@example.com>", "250 OK\r\n"),
        ("RCPT TO:<nobody@example.com>", "550 5.1.1 No such user\r\n"),
    ]])
    .await;

    let settings = settings(&addr, "none");
    let mut message = Message::connect(&settings).await.unwrap();
    let email = message.email_mut();
    email.set_from("notify@example.com");
    email.set_to(["a@example.com", "nobody@example.com"]);
    email.plain_mut().set("hello");

    let err = message.send().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Smtp(mailcourier_smtp::Error::SmtpError { code: 550, .. })
    ));
}

#[tokio::test]
async fn test_session_reuses_connection_for_first_to_only() {
    let mut script = vec![("EHLO localhost", EHLO_REPLY), ("AUTH PLAIN", "235 OK\r\n")];
    script.extend(plain_transaction("RCPT TO:<first@example.com>"));
    script.extend(plain_transaction("RCPT TO:<first@example.com>"));
    script.push(("QUIT", "221 bye\r\n"));
    let (addr, server) = scripted_server(vec![script]).await;

    let settings = settings(&addr, "plain");
    let stream = connect(&addr).await.unwrap();
    let session = Session::establish(stream, &settings).await.unwrap();
    assert!(session.is_open());

    let mut message = Message::with_delivery(&settings, Delivery::Session(session)).unwrap();
    let email = message.email_mut();
    email.set_from("notify@example.com");
    email.set_to(["first@example.com", "second@example.com"]);
    email.add_cc("copy@example.com");

    for subject in ["one", "two"] {
        message.email_mut().set_subject(subject);
        message.send().await.unwrap();
    }

    message.close().await;
    message.close().await;
    assert!(matches!(message.send().await, Err(Error::SessionClosed)));

    let sessions = server.await.unwrap();
    assert_eq!(sessions.len(), 1);
    let received = &sessions[0];
    assert!(received[5].contains("Subject: one\r\n"));
    assert!(received[9].contains("Subject: two\r\n"));
    assert_eq!(received[10], "QUIT");
}

#[tokio::test]
async fn test_session_auth_failure_produces_no_session() {
    let (addr, _server) = scripted_server(vec![vec![
        ("EHLO", EHLO_REPLY),
        ("AUTH PLAIN", "535 5.7.8 Authentication credentials invalid\r\n"),
    ]])
    .await;

    let settings = settings(&addr, "plain");
    let stream = connect(&addr).await.unwrap();
    let err = Session::establish(stream, &settings).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Smtp(mailcourier_smtp::Error::AuthFailed { code: 535, .. })
    ));
}

#[tokio::test]
async fn test_broken_session_reports_closed() {
    let (addr, _server) = scripted_server(vec![vec![
        ("EHLO", EHLO_REPLY),
        ("MAIL FROM", "451 4.3.0 Try again later\r\n"),
    ]])
    .await;

    let settings = settings(&addr, "none");
    let stream = connect(&addr).await.unwrap();
    let mut session = Session::establish(stream, &settings).await.unwrap();

    let mut email = mailcourier_core::Email::new();
    email.set_from("notify@example.com");
    email.add_to("a@example.com");
    let envelope = mailcourier_core::Envelope::from_email(&email).unwrap();

    let err = session.deliver(&envelope, b"Subject: x\r\n\r\nbody").await.unwrap_err();
    assert!(matches!(err, Error::Smtp(ref e) if e.is_transient()));
    assert!(!session.is_open());
    assert!(matches!(
        session.deliver(&envelope, b"body").await,
        Err(Error::SessionClosed)
    ));
    session.close().await;
}

#[tokio::test]
async fn test_one_shot_close_is_noop() {
    let settings = settings("127.0.0.1:1", "none");
    let mut delivery = Delivery::OneShot(OneShot::new(&settings).unwrap());
    delivery.close().await;
    delivery.close().await;
    assert_eq!(delivery.mode(), "one-shot");
}

#[tokio::test]
async fn test_dispatch_sends_one_message_per_recipient() {
    let mut first = vec![("EHLO", EHLO_REPLY)];
    first.extend(plain_transaction("RCPT TO:<ops@example.com>"));
    first.push(("QUIT", "221 bye\r\n"));
    let mut second = vec![("EHLO", EHLO_REPLY)];
    second.extend(plain_transaction("RCPT TO:<oncall@example.com>"));
    second.push(("QUIT", "221 bye\r\n"));
    let (addr, server) = scripted_server(vec![first, second]).await;

    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.csv");
    std::fs::write(&report, b"job,status\nbackup,ok\n").unwrap();
    let config_file = dir.path().join("config.yaml");
    std::fs::write(
        &config_file,
        format!(
            "smtp_settings:\n  notify:\n    connect: \"{addr}\"\n    user_name: Notifier\n    user_login: notify@example.com\n"
        ),
    )
    .unwrap();
    let config = Config::load(&config_file).unwrap();

    let props = HashMap::from([
        (SEND_MAIL_FROM.to_string(), "notify".to_string()),
        (
            SEND_MAIL_TO.to_string(),
            "ops@example.com; oncall@example.com".to_string(),
        ),
        (SEND_MAIL_SUBJECT.to_string(), "Nightly".to_string()),
        (SEND_MAIL_BODY_PLAIN.to_string(), "See attached.".to_string()),
        (
            SEND_MAIL_ATTACMENTS.to_string(),
            report.display().to_string(),
        ),
    ]);
    assert!(send_mail(&config.smtp_settings, &props).await);

    let sessions = server.await.unwrap();
    assert_eq!(sessions.len(), 2);
    for (received, to) in sessions.iter().zip(["ops@example.com", "oncall@example.com"]) {
        let body = &received[4];
        assert!(body.contains(&format!("To: {to}\r\n")));
        assert!(body.contains("notify@example.com"));
        assert!(body.contains("Content-Type: multipart/mixed"));
        assert!(body.contains("filename=\"report.csv\""));
    }
}

#[tokio::test]
async fn test_dispatch_continues_after_failed_recipient() {
    let rejected = vec![
        ("EHLO", EHLO_REPLY),
        ("MAIL FROM", "250 OK\r\n"),
        ("RCPT TO:<gone@example.com>", "550 5.1.1 No such user\r\n"),
    ];
    let mut accepted = vec![("EHLO", EHLO_REPLY)];
    accepted.extend(plain_transaction("RCPT TO:<ops@example.com>"));
    accepted.push(("QUIT", "221 bye\r\n"));
    let (addr, server) = scripted_server(vec![rejected, accepted]).await;

    let settings = HashMap::from([("notify".to_string(), settings(&addr, "none"))]);
    let props = HashMap::from([
        (SEND_MAIL_FROM.to_string(), "notify".to_string()),
        (
            SEND_MAIL_TO.to_string(),
            "gone@example.com;ops@example.com".to_string(),
        ),
        (SEND_MAIL_SUBJECT.to_string(), "Alert".to_string()),
    ]);
    assert!(!send_mail(&settings, &props).await);

    let sessions = server.await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[1][4].contains("To: ops@example.com\r\n"));
}
