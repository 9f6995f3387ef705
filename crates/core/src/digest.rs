//! Digest scheduling and email rendering.
//!
//! Digest entries roll over at 08:00 UTC: daily entries go out at the next
//! 08:00 strictly after enqueue, weekly entries at the next Monday 08:00.

use chrono::{Datelike, Duration, NaiveTime, TimeZone, Utc};
use indexmap::IndexMap;

use crate::notification::{Notification, NotificationType};
use crate::preferences::DigestWindow;
use crate::types::Timestamp;

/// Hour (UTC) at which digests roll over.
pub const DIGEST_ROLLOVER_HOUR_UTC: u32 = 8;

/// Maximum notifications listed in one digest email.
pub const DIGEST_VISIBLE_LIMIT: usize = 20;

/// Sent digest entries older than this are purged.
pub const DIGEST_RETENTION_DAYS: i64 = 30;

/// Characters of each message shown in the HTML body.
const HTML_MESSAGE_PREVIEW: usize = 200;

/// Characters of each message shown in the plain-text body.
const TEXT_MESSAGE_PREVIEW: usize = 150;

// ---------------------------------------------------------------------------
// Rollover
// ---------------------------------------------------------------------------

fn rollover_on(date: chrono::NaiveDate) -> Timestamp {
    let time = NaiveTime::from_hms_opt(DIGEST_ROLLOVER_HOUR_UTC, 0, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

/// The instant a digest entry enqueued at `now` becomes due. Always strictly
/// after `now`.
pub fn scheduled_for(window: DigestWindow, now: Timestamp) -> Timestamp {
    let today = now.date_naive();
    match window {
        DigestWindow::Daily => {
            let candidate = rollover_on(today);
            if candidate > now {
                candidate
            } else {
                rollover_on(today + Duration::days(1))
            }
        }
        DigestWindow::Weekly => {
            let days_until_monday = (7 - i64::from(today.weekday().num_days_from_monday())) % 7;
            let candidate = rollover_on(today + Duration::days(days_until_monday));
            if candidate > now {
                candidate
            } else {
                candidate + Duration::days(7)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Count of notifications per type, in order of first appearance.
pub fn summarize_by_type(notifications: &[Notification]) -> IndexMap<NotificationType, usize> {
    let mut summary = IndexMap::new();
    for n in notifications {
        *summary.entry(n.notification_type).or_insert(0) += 1;
    }
    summary
}

/// Render one digest email. `notifications` is expected newest first; only
/// the first [`DIGEST_VISIBLE_LIMIT`] are listed, the rest are summarized in
/// a tail line pointing at `center_url`.
pub fn render_digest(
    first_name: &str,
    window: DigestWindow,
    notifications: &[Notification],
    center_url: &str,
) -> RenderedEmail {
    let total = notifications.len();
    let visible = &notifications[..total.min(DIGEST_VISIBLE_LIMIT)];
    let remaining = total - visible.len();
    let summary = summarize_by_type(notifications);

    let subject = format!(
        "Your {} Digest: {total} notification{}",
        window.title(),
        plural(total)
    );

    // Plain text
    let mut text = format!(
        "{} Digest\n\nHi {first_name},\n\nYou have {total} notification{} in your {window} digest.\n\n",
        window.title(),
        plural(total)
    );
    for (label, count) in summary.iter().map(|(t, c)| (t.digest_label(), c)) {
        text.push_str(&format!("{label}: {count}\n"));
    }
    for (i, n) in visible.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, n.title));
        if n.priority.is_elevated() {
            text.push_str(&format!(" [{}]", n.priority.as_str().to_uppercase()));
        }
        text.push_str(&format!("\n   {}\n", truncate(&n.message, TEXT_MESSAGE_PREVIEW)));
        if let Some(url) = &n.action_url {
            text.push_str(&format!("   {url}\n"));
        }
    }
    if remaining > 0 {
        text.push_str(&format!(
            "\n+ {remaining} more notification{} in your notification center\n",
            plural(remaining)
        ));
    }
    text.push_str(&format!("\nView all notifications: {center_url}\n"));

    // HTML
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body>");
    html.push_str(&format!(
        "<h1>Your {} Digest</h1><p>You have {total} notification{}</p>",
        window.title(),
        plural(total)
    ));
    html.push_str(&format!("<p>Hi {},</p>", escape_html(first_name)));
    html.push_str("<h3>Summary</h3>");
    for (t, count) in &summary {
        html.push_str(&format!(
            "<div><strong>{}:</strong> {count}</div>",
            t.digest_label()
        ));
    }
    html.push_str("<h3>Recent Notifications</h3>");
    for n in visible {
        html.push_str("<div class=\"notification\"><div><strong>");
        html.push_str(&escape_html(&n.title));
        html.push_str("</strong>");
        if n.priority.is_elevated() {
            html.push_str(&format!(
                " <span class=\"badge\">{}</span>",
                n.priority.as_str().to_uppercase()
            ));
        }
        html.push_str("</div><div>");
        html.push_str(&escape_html(&truncate(&n.message, HTML_MESSAGE_PREVIEW)));
        html.push_str("</div>");
        if let Some(url) = &n.action_url {
            html.push_str(&format!(
                "<div><a href=\"{}\">{}</a></div>",
                escape_html(url),
                escape_html(n.action_text.as_deref().unwrap_or("View"))
            ));
        }
        html.push_str("</div>");
    }
    if remaining > 0 {
        html.push_str(&format!(
            "<p>+ {remaining} more notification{} in your <a href=\"{}\">notification center</a></p>",
            plural(remaining),
            escape_html(center_url)
        ));
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">View All Notifications</a></p></body></html>",
        escape_html(center_url)
    ));

    RenderedEmail {
        subject,
        text_body: text,
        html_body: html,
    }
}

// ---------------------------------------------------------------------------
// Immediate email
// ---------------------------------------------------------------------------

/// Subject line of a single-notification email, by type.
pub fn notification_email_heading(notification_type: NotificationType) -> &'static str {
    match notification_type {
        NotificationType::Progress => "Learning Progress Update",
        NotificationType::Risk => "Attention Required",
        NotificationType::Achievement => "New Achievement Unlocked!",
        NotificationType::Intervention => "Instructor Message",
        NotificationType::Assignment => "Assignment Reminder",
        NotificationType::Course => "Course Update",
    }
}

/// Render the email sent for one notification when the user asked for
/// realtime email delivery.
pub fn render_notification_email(
    first_name: &str,
    notification: &Notification,
    settings_url: &str,
) -> RenderedEmail {
    let heading = notification_email_heading(notification.notification_type);
    let elevated = notification.priority.is_elevated();

    let mut text = format!("{heading}\n\nHi {first_name},\n\n");
    if elevated {
        text.push_str(&format!(
            "{} PRIORITY\n\n",
            notification.priority.as_str().to_uppercase()
        ));
    }
    text.push_str(&format!("{}\n\n{}\n", notification.title, notification.message));
    if let Some(url) = &notification.action_url {
        text.push_str(&format!(
            "\n{}: {url}\n",
            notification.action_text.as_deref().unwrap_or("View Details")
        ));
    }
    text.push_str(&format!(
        "\n---\nYou received this email because you have email notifications enabled.\nManage your notification settings: {settings_url}\n"
    ));

    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body>");
    html.push_str(&format!("<h1>{heading}</h1>"));
    html.push_str(&format!("<p>Hi {},</p>", escape_html(first_name)));
    if elevated {
        html.push_str(&format!(
            "<div class=\"badge\">{} PRIORITY</div>",
            notification.priority.as_str().to_uppercase()
        ));
    }
    html.push_str(&format!(
        "<div class=\"notification\"><h2>{}</h2><div>{}</div></div>",
        escape_html(&notification.title),
        escape_html(&notification.message)
    ));
    if let (Some(url), Some(label)) = (&notification.action_url, &notification.action_text) {
        html.push_str(&format!(
            "<p><a href=\"{}\">{}</a></p>",
            escape_html(url),
            escape_html(label)
        ));
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">Manage Preferences</a></p></body></html>",
        escape_html(settings_url)
    ));

    RenderedEmail {
        subject: heading.to_string(),
        text_body: text,
        html_body: html,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
