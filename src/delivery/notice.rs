//! Notification content: links and the rendered message.

use url::Url;

use super::DeliveryError;
use crate::config::DeliveryConfig;

/// Everything a recipient is told about one finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryNotice {
    pub recipient: String,
    pub meeting_name: String,
    pub start_time: String,
    pub download_link: String,
    pub upload_link: String,
}

impl DeliveryNotice {
    pub fn new(
        config: &DeliveryConfig,
        recipient: &str,
        meeting_name: &str,
        run_key: &str,
        start_time: String,
    ) -> Result<Self, DeliveryError> {
        validate_recipient(recipient)?;
        let download_link = download_link(&config.download_server, run_key);
        let upload_link = upload_link(
            &config.public_api_url,
            &config.recording_folder,
            &download_link,
        )?;
        Ok(Self {
            recipient: recipient.to_string(),
            meeting_name: meeting_name.to_string(),
            start_time,
            download_link,
            upload_link,
        })
    }
}

/// Refuses recipients that would break out of the `To:` header.
pub fn validate_recipient(recipient: &str) -> Result<(), DeliveryError> {
    if recipient.is_empty() || recipient.chars().any(char::is_control) {
        return Err(DeliveryError::InvalidRecipient(recipient.to_string()));
    }
    Ok(())
}

/// `{download_server}/{run_key}/{run_key}.zip`
pub fn download_link(download_server: &str, run_key: &str) -> String {
    format!(
        "{}/{}/{}.zip",
        download_server.trim_end_matches('/'),
        run_key,
        run_key
    )
}

/// Link to this service's upload endpoint for the archive at `recording_url`.
pub fn upload_link(
    public_api_url: &str,
    folder_path: &str,
    recording_url: &str,
) -> Result<String, DeliveryError> {
    let endpoint = format!("{}/upload/recording", public_api_url.trim_end_matches('/'));
    let mut url = Url::parse(&endpoint).map_err(|err| DeliveryError::InvalidUrl {
        url: endpoint.clone(),
        message: err.to_string(),
    })?;
    url.query_pairs_mut()
        .append_pair("folder_path", folder_path)
        .append_pair("recording_url", recording_url);
    Ok(url.to_string())
}

/// RFC 5322 message with an HTML body, ready for `sendmail -t`.
pub fn render_message(notice: &DeliveryNotice, sender: &str, subject: &str) -> String {
    let mut message = String::new();
    if !sender.is_empty() {
        message.push_str(&format!("From: {}\r\n", sender));
    }
    message.push_str(&format!("To: {}\r\n", notice.recipient));
    message.push_str(&format!(
        "Subject: {} {}\r\n",
        header_text(subject),
        header_text(&notice.meeting_name)
    ));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/html; charset=\"UTF-8\"\r\n");
    message.push_str("Content-Transfer-Encoding: 8bit\r\n");
    message.push_str("\r\n");
    message.push_str(&render_body(notice));
    message
}

fn render_body(notice: &DeliveryNotice) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{title}</title></head>
<body style="font-family: sans-serif; max-width: 640px;">
  <h2>Record ready for download<br>Grabación lista</h2>
  <p>{name} ({time})</p>
  <p>
    Su grabación está <a href="{download}">aquí</a>.<br>
    También tiene la opción de subirla directo al drive de su usuario haciendo click
    <a href="{upload}">aquí</a>.
  </p>
</body>
</html>
"#,
        title = escape_html(&notice.meeting_name),
        name = escape_html(&notice.meeting_name),
        time = escape_html(&notice.start_time),
        download = escape_html(&notice.download_link),
        upload = escape_html(&notice.upload_link),
    )
}

/// Header value on a single line: line breaks and other controls become spaces.
fn header_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
