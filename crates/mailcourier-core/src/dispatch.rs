//! Property-bag entry point for notification mail.
//!
//! A caller hands over string properties naming the sender entry, the
//! recipients, subject, bodies and attachment files; [`send_mail`] builds
//! one message per recipient and reports overall success.

use crate::config::SmtpSettings;
use crate::error::{Error, Result};
use crate::message::Message;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::Path;

/// Name of the `smtp_settings` entry to send from.
pub const SEND_MAIL_FROM: &str = "SEND_MAIL_FROM";
/// `;`-separated recipient addresses.
pub const SEND_MAIL_TO: &str = "SEND_MAIL_TO";
/// Subject line.
pub const SEND_MAIL_SUBJECT: &str = "SEND_MAIL_SUBJECT";
/// Plain text body.
pub const SEND_MAIL_BODY_PLAIN: &str = "SEND_MAIL_BODY_PLAIN";
/// HTML body.
pub const SEND_MAIL_BODY_HTML: &str = "SEND_MAIL_BODY_HTML";
/// `;`-separated paths of files to attach.
pub const SEND_MAIL_ATTACHMENTS: &str = "SEND_MAIL_ATTACHMENTS";
/// Misspelled form of [`SEND_MAIL_ATTACHMENTS`] still sent by older callers.
pub const SEND_MAIL_ATTACMENTS: &str = "SEND_MAIL_ATTACMENTS";

const SEPARATOR: char = ';';

/// Sends a notification described by `props`, one message per recipient.
///
/// Returns false if a required property is missing, the sender entry is
/// unknown, an attachment cannot be read, or any recipient's send fails.
/// A failure for one recipient does not stop the others.
pub async fn send_mail<S1, S2>(
    settings: &HashMap<String, SmtpSettings, S1>,
    props: &HashMap<String, String, S2>,
) -> bool
where
    S1: BuildHasher,
    S2: BuildHasher,
{
    match try_send_mail(settings, props).await {
        Ok(all_sent) => all_sent,
        Err(e) => {
            tracing::error!(error = %e, "Failed to send mail");
            false
        }
    }
}

async fn try_send_mail<S1, S2>(
    settings: &HashMap<String, SmtpSettings, S1>,
    props: &HashMap<String, String, S2>,
) -> Result<bool>
where
    S1: BuildHasher,
    S2: BuildHasher,
{
    let sender = required(props, SEND_MAIL_FROM)?;
    let to = required(props, SEND_MAIL_TO)?;
    let subject = required(props, SEND_MAIL_SUBJECT)?;

    let smtp = settings
        .get(sender)
        .ok_or_else(|| Error::Config(format!("No smtp_settings entry named {sender:?}")))?;

    let recipients: Vec<&str> = split_list(to).collect();
    if recipients.is_empty() {
        tracing::warn!(sender, "No recipients given");
        return Ok(false);
    }

    let attachments = match props
        .get(SEND_MAIL_ATTACHMENTS)
        .or_else(|| props.get(SEND_MAIL_ATTACMENTS))
    {
        Some(paths) => read_attachments(paths).await?,
        None => Vec::new(),
    };

    let mut message = Message::connect(smtp).await?;
    let email = message.email_mut();
    email.set_from(&smtp.user_login);
    email.set_from_name(smtp.user_name.clone());
    email.set_subject(subject);
    if let Some(plain) = props.get(SEND_MAIL_BODY_PLAIN) {
        email.plain_mut().set(plain.clone());
    }
    if let Some(html) = props.get(SEND_MAIL_BODY_HTML) {
        email.html_mut().set(html.clone());
    }

    let mut all_sent = true;
    for recipient in recipients {
        let email = message.email_mut();
        email.set_to([recipient]);
        email.clear_attachments();
        for (name, data) in &attachments {
            email.attach_bytes(name.clone(), data.clone());
        }

        match message.send().await {
            Ok(()) => tracing::info!(sender, recipient, "Mail sent"),
            Err(e) => {
                tracing::error!(sender, recipient, error = %e, "Mail not sent");
                all_sent = false;
            }
        }
    }

    message.close().await;
    Ok(all_sent)
}

fn required<'a, S: BuildHasher>(
    props: &'a HashMap<String, String, S>,
    key: &str,
) -> Result<&'a str> {
    props
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::Config(format!("Missing property {key}")))
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(SEPARATOR).map(str::trim).filter(|item| !item.is_empty())
}

/// Reads every listed file once, keyed by its base name.
async fn read_attachments(paths: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let mut attachments = Vec::new();
    for path in split_list(paths).map(Path::new) {
        let data = tokio::fs::read(path).await?;
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        tracing::debug!(file = %path.display(), bytes = data.len(), "Read attachment");
        attachments.push((name, data));
    }
    Ok(attachments)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        let items: Vec<&str> = split_list(" a@example.com;;b@example.com ; ").collect();
        assert_eq!(items, ["a@example.com", "b@example.com"]);
        assert_eq!(split_list("").count(), 0);
    }

    #[test]
    fn test_required() {
        let props = HashMap::from([(SEND_MAIL_TO.to_string(), "a@example.com".to_string())]);
        assert_eq!(required(&props, SEND_MAIL_TO).unwrap(), "a@example.com");
        assert!(matches!(
            required(&props, SEND_MAIL_SUBJECT),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_subject_returns_false() {
        let settings: HashMap<String, SmtpSettings> = HashMap::new();
        let props = HashMap::from([
            (SEND_MAIL_FROM.to_string(), "notify".to_string()),
            (SEND_MAIL_TO.to_string(), "a@example.com".to_string()),
        ]);
        assert!(!send_mail(&settings, &props).await);
    }

    #[tokio::test]
    async fn test_unknown_sender_returns_false() {
        let settings: HashMap<String, SmtpSettings> = HashMap::new();
        let props = HashMap::from([
            (SEND_MAIL_FROM.to_string(), "notify".to_string()),
            (SEND_MAIL_TO.to_string(), "a@example.com".to_string()),
            (SEND_MAIL_SUBJECT.to_string(), "Hi".to_string()),
        ]);
        assert!(!send_mail(&settings, &props).await);
    }

    #[tokio::test]
    async fn test_read_attachments_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let attachments = read_attachments(&format!("{};", path.display())).await.unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].0, "report.csv");
        assert_eq!(attachments[0].1, b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_unreadable_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        assert!(matches!(
            read_attachments(&missing.display().to_string()).await,
            Err(Error::Io(_))
        ));
    }
}
