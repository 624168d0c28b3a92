// src/notify/mod.rs
//! Delivery boundary. The pipeline only looks at `is_ok()`; what a channel does with
//! the postings is its own business.

pub mod telegram;

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::DeliveryError;
use crate::posting::AdmittedPosting;

pub use telegram::TelegramNotifier;

pub const DESCRIPTION_PREVIEW_CHARS: usize = 200;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Header plus one message per posting. An empty slice behaves like
    /// `notify_none_found`.
    async fn deliver(&self, postings: &[AdmittedPosting]) -> Result<(), DeliveryError>;
    async fn notify_none_found(&self) -> Result<(), DeliveryError>;
    async fn notify_text(&self, text: &str) -> Result<(), DeliveryError>;
    fn name(&self) -> &'static str;
}

/* ----------------------------
Message formatting (Telegram legacy Markdown)
---------------------------- */

/// Escape characters that legacy Markdown treats as entity delimiters.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn header_message(count: usize) -> String {
    format!("🚀 *Found {count} new job(s) today!*")
}

pub fn none_found_message() -> String {
    "📭 *No new jobs found today*\n\n\
     I've checked all the job boards, but there are no new job postings matching your \
     criteria today. I'll check again tomorrow! 🔍"
        .to_string()
}

/// One posting as a chat message; description cut at 200 chars with "...".
pub fn format_posting(p: &AdmittedPosting, index: usize, total: usize) -> String {
    let title = if p.title.is_empty() { "N/A" } else { p.title.as_str() };
    let location = if p.location.is_empty() {
        "Location not specified"
    } else {
        p.location.as_str()
    };

    let mut msg = format!("*{index}/{total} - {}*\n\n", escape_markdown(title));
    msg.push_str(&format!("🏢 *Company:* {}\n", escape_markdown(&p.company)));
    msg.push_str(&format!("📍 *Location:* {}\n", escape_markdown(location)));
    msg.push_str(&format!("🔗 *Source:* {}\n", escape_markdown(&p.source.to_uppercase())));

    if !p.description.is_empty() {
        let mut desc: String = p.description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        if p.description.chars().count() > DESCRIPTION_PREVIEW_CHARS {
            desc.push_str("...");
        }
        msg.push_str(&format!("\n📝 *Description:*\n{}\n", escape_markdown(&desc)));
    }

    let url = if p.url.is_empty() { "#" } else { p.url.as_str() };
    msg.push_str(&format!("\n🔗 [View Job]({})", url.replace(')', "%29")));
    msg
}

/// Full batch as it would be sent: header first, then each posting.
pub fn render_batch(postings: &[AdmittedPosting]) -> Vec<String> {
    let total = postings.len();
    std::iter::once(header_message(total))
        .chain(
            postings
                .iter()
                .enumerate()
                .map(|(i, p)| format_posting(p, i + 1, total)),
        )
        .collect()
}

/* ----------------------------
Local notifiers
---------------------------- */

/// Prints messages to stdout (dry runs).
#[derive(Debug, Default, Clone)]
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn deliver(&self, postings: &[AdmittedPosting]) -> Result<(), DeliveryError> {
        if postings.is_empty() {
            return self.notify_none_found().await;
        }
        for msg in render_batch(postings) {
            println!("{msg}\n----");
        }
        Ok(())
    }

    async fn notify_none_found(&self) -> Result<(), DeliveryError> {
        println!("{}", none_found_message());
        Ok(())
    }

    async fn notify_text(&self, text: &str) -> Result<(), DeliveryError> {
        println!("{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// What a `CapturingNotifier` saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    Batch(Vec<String>),
    NoneFound,
    Text(String),
}

/// Records deliveries in memory; can be switched to fail. Used by tests and the
/// in-process diagnostics.
#[derive(Debug, Default)]
pub struct CapturingNotifier {
    seen: Mutex<Vec<Captured>>,
    fail: Mutex<bool>,
}

impl CapturingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let n = Self::default();
        n.set_failing(true);
        n
    }

    pub fn set_failing(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    pub fn captured(&self) -> Vec<Captured> {
        lock(&self.seen).clone()
    }

    /// URLs of every posting delivered in a batch, in order.
    pub fn delivered_urls(&self) -> Vec<String> {
        lock(&self.seen)
            .iter()
            .filter_map(|c| match c {
                Captured::Batch(urls) => Some(urls.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn check(&self) -> Result<(), DeliveryError> {
        if *lock(&self.fail) {
            return Err(DeliveryError::Rejected {
                channel: "capture",
                description: "configured to fail".into(),
            });
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn deliver(&self, postings: &[AdmittedPosting]) -> Result<(), DeliveryError> {
        if postings.is_empty() {
            return self.notify_none_found().await;
        }
        self.check()?;
        lock(&self.seen).push(Captured::Batch(postings.iter().map(|p| p.url.clone()).collect()));
        Ok(())
    }

    async fn notify_none_found(&self) -> Result<(), DeliveryError> {
        self.check()?;
        lock(&self.seen).push(Captured::NoneFound);
        Ok(())
    }

    async fn notify_text(&self, text: &str) -> Result<(), DeliveryError> {
        self.check()?;
        lock(&self.seen).push(Captured::Text(text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "capture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(description: &str) -> AdmittedPosting {
        AdmittedPosting {
            title: "Junior DevOps_Engineer".into(),
            company: "Acme".into(),
            location: String::new(),
            url: "https://jobs.test/1".into(),
            description: description.into(),
            source: "google_jobs".into(),
            posted_at: None,
        }
    }

    #[test]
    fn posting_message_layout() {
        let msg = format_posting(&posting("AWS and Docker"), 1, 2);
        assert!(msg.starts_with("*1/2 - Junior DevOps\\_Engineer*\n\n"));
        assert!(msg.contains("🏢 *Company:* Acme\n"));
        assert!(msg.contains("📍 *Location:* Location not specified\n"));
        assert!(msg.contains("🔗 *Source:* GOOGLE\\_JOBS\n"));
        assert!(msg.contains("\n📝 *Description:*\nAWS and Docker\n"));
        assert!(msg.ends_with("🔗 [View Job](https://jobs.test/1)"));
    }

    #[test]
    fn long_description_is_truncated() {
        let long = "x".repeat(250);
        let msg = format_posting(&posting(&long), 1, 1);
        assert!(msg.contains(&format!("{}...", "x".repeat(200))));
        assert!(!msg.contains(&"x".repeat(201)));

        let exact = "y".repeat(200);
        assert!(!format_posting(&posting(&exact), 1, 1).contains("..."));
    }

    #[test]
    fn batch_starts_with_header() {
        let msgs = render_batch(&[posting(""), posting("")]);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0], "🚀 *Found 2 new job(s) today!*");
        assert!(!msgs[1].contains("Description"));
    }

    #[tokio::test]
    async fn capturing_notifier_failure_toggle() {
        let n = CapturingNotifier::failing();
        assert!(n.deliver(&[posting("")]).await.is_err());
        n.set_failing(false);
        n.deliver(&[]).await.unwrap();
        assert_eq!(n.captured(), vec![Captured::NoneFound]);
    }
}
