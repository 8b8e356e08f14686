//! Price-drop notification sinks.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use console::style;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::models::PriceChangeEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned {0}")]
    Status(reqwest::StatusCode),
    #[error("notify command {program:?} exited with {status}")]
    Command { program: String, status: String },
    #[error("notify command IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{sink} gave no answer within {after:?}")]
    Timeout { sink: String, after: Duration },
    #[error("{failed} of {total} notifiers failed")]
    Partial { failed: usize, total: usize },
}

/// Upper bound on a single delivery.
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 15;

/// One-way sink for price-drop events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &PriceChangeEvent) -> Result<(), NotifyError>;
}

/// Notification settings from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// POST each event as JSON to this URL.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_headers: BTreeMap<String, String>,
    /// Program and arguments that receive the message on stdin.
    /// `{subject}` in any argument is replaced with the event subject.
    #[serde(default)]
    pub command: Vec<String>,
    /// Print drops to the terminal.
    #[serde(default = "default_console")]
    pub console: bool,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Seconds a webhook or command may take before it is abandoned.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_headers: BTreeMap::new(),
            command: Vec::new(),
            console: default_console(),
            currency_symbol: default_currency_symbol(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_console() -> bool {
    true
}

fn default_currency_symbol() -> String {
    "£".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT_SECS
}

/// Build the notifier described by `config`.
pub fn build_notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let mut sinks: Vec<Box<dyn Notifier>> = Vec::new();

    if config.console {
        sinks.push(Box::new(LogNotifier::new(&config.currency_symbol)));
    }
    if let Some(url) = &config.webhook_url {
        sinks.push(Box::new(
            WebhookNotifier::new(url, config.webhook_headers.clone()).with_timeout(timeout),
        ));
    }
    if !config.command.is_empty() {
        sinks.push(Box::new(
            CommandNotifier::new(config.command.clone(), &config.currency_symbol)
                .with_timeout(timeout),
        ));
    }

    Arc::new(MultiNotifier::new(sinks))
}

/// Prints drops to stdout and the log.
pub struct LogNotifier {
    currency: String,
}

impl LogNotifier {
    pub fn new(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &PriceChangeEvent) -> Result<(), NotifyError> {
        println!(
            "  {} {} {}{} → {}{} ({:.1}% off) {}",
            style("↓").green().bold(),
            style(&event.product_name).bold(),
            self.currency,
            event.old_price.short(),
            self.currency,
            style(event.new_price.short()).green(),
            event.percent_decrease,
            style(&event.product_url).dim()
        );
        info!(
            site = %event.site_name,
            product = %event.product_id,
            old = %event.old_price,
            new = %event.new_price,
            percent = event.percent_decrease,
            "Price drop"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    id: String,
    #[serde(flatten)]
    event: &'a PriceChangeEvent,
}

/// POSTs each event as JSON.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    headers: BTreeMap<String, String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: &str, headers: BTreeMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            headers,
            timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &PriceChangeEvent) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            type_: "price.drop",
            id: uuid::Uuid::new_v4().to_string(),
            event,
        };

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            warn!(
                "Webhook delivery failed for {} to {}: {}",
                event.product_id,
                self.url,
                response.status()
            );
            return Err(NotifyError::Status(response.status()));
        }
        Ok(())
    }
}

/// Pipes a plain-text message into an external command such as `mail`.
pub struct CommandNotifier {
    argv: Vec<String>,
    currency: String,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(argv: Vec<String>, currency: &str) -> Self {
        Self {
            argv,
            currency: currency.to_string(),
            timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments with `{subject}` filled in.
    fn command_line(&self, event: &PriceChangeEvent) -> Vec<String> {
        let subject = event.subject(&self.currency);
        self.argv
            .iter()
            .map(|arg| arg.replace("{subject}", &subject))
            .collect()
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, event: &PriceChangeEvent) -> Result<(), NotifyError> {
        let argv = self.command_line(event);
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let message = event.message(&self.currency);
        let mut stdin = child.stdin.take();
        let delivery = async {
            if let Some(mut pipe) = stdin.take() {
                pipe.write_all(message.as_bytes()).await?;
            }
            child.wait().await
        };
        let outcome = tokio::time::timeout(self.timeout, delivery).await;

        let status = match outcome {
            Ok(status) => status?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Could not kill notify command {}: {}", program, e);
                }
                return Err(NotifyError::Timeout {
                    sink: program.clone(),
                    after: self.timeout,
                });
            }
        };
        if !status.success() {
            return Err(NotifyError::Command {
                program: program.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Fans out to several sinks; one failing sink doesn't stop the rest.
pub struct MultiNotifier {
    sinks: Vec<Box<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn notify(&self, event: &PriceChangeEvent) -> Result<(), NotifyError> {
        let mut failed = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event).await {
                warn!("Notification for {} failed: {}", event.product_id, e);
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(NotifyError::Partial {
                failed,
                total: self.sinks.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures events for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        events: Mutex<Vec<PriceChangeEvent>>,
    }

    impl RecordingNotifier {
        pub fn events(&self) -> Vec<PriceChangeEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &PriceChangeEvent) -> Result<(), NotifyError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Always fails.
    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _event: &PriceChangeEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Status(reqwest::StatusCode::BAD_GATEWAY))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FailingNotifier, RecordingNotifier};
    use super::*;
    use crate::models::Price;

    fn event() -> PriceChangeEvent {
        PriceChangeEvent {
            product_id: "sku-1".to_string(),
            product_name: "Wool Blanket".to_string(),
            site_name: "shop".to_string(),
            product_url: "https://shop.example/p/1".to_string(),
            old_price: Price::from_minor(10_000),
            new_price: Price::from_minor(4_950),
            percent_decrease: 50.5,
        }
    }

    #[test]
    fn test_command_line_substitutes_subject() {
        let notifier = CommandNotifier::new(
            vec!["mail".into(), "-s".into(), "{subject}".into(), "me@example.com".into()],
            "£",
        );
        assert_eq!(
            notifier.command_line(&event()),
            vec!["mail", "-s", "Wool Blanket is now £49.50", "me@example.com"]
        );
    }

    #[tokio::test]
    async fn test_multi_notifier_continues_after_failure() {
        let recorder = std::sync::Arc::new(RecordingNotifier::default());

        struct Shared(std::sync::Arc<RecordingNotifier>);
        #[async_trait]
        impl Notifier for Shared {
            async fn notify(&self, event: &PriceChangeEvent) -> Result<(), NotifyError> {
                self.0.notify(event).await
            }
        }

        let multi = MultiNotifier::new(vec![
            Box::new(FailingNotifier),
            Box::new(Shared(recorder.clone())),
        ]);
        let result = multi.notify(&event()).await;

        assert!(matches!(result, Err(NotifyError::Partial { failed: 1, total: 2 })));
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn test_build_notifier_from_config() {
        let config: NotifyConfig = serde_json::from_value(serde_json::json!({
            "webhook_url": "https://hooks.example/drops",
            "command": ["mail", "-s", "{subject}", "me@example.com"]
        }))
        .unwrap();
        assert!(config.console);
        assert_eq!(config.currency_symbol, "£");
        assert_eq!(config.timeout_secs, DEFAULT_NOTIFY_TIMEOUT_SECS);
        let _notifier = build_notifier(&config);
    }

    #[test]
    fn test_webhook_payload_shape() {
        let e = event();
        let payload = WebhookPayload {
            type_: "price.drop",
            id: "x".to_string(),
            event: &e,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "price.drop");
        assert_eq!(json["product_name"], "Wool Blanket");
        assert_eq!(json["new_price"], 49.5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_notifier_reports_exit_status() {
        let ok = CommandNotifier::new(vec!["cat".into()], "£");
        ok.notify(&event()).await.unwrap();

        let failing = CommandNotifier::new(vec!["false".into()], "£");
        assert!(matches!(
            failing.notify(&event()).await,
            Err(NotifyError::Command { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_notifier_gives_up_on_stalled_command() {
        let stalled = CommandNotifier::new(vec!["sleep".into(), "30".into()], "£")
            .with_timeout(Duration::from_millis(200));

        let result = tokio::time::timeout(Duration::from_secs(10), stalled.notify(&event()))
            .await
            .expect("notify should return before the outer bound");
        assert!(matches!(result, Err(NotifyError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_webhook_gives_up_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let webhook = WebhookNotifier::new(&format!("http://{addr}/hook"), BTreeMap::new())
            .with_timeout(Duration::from_millis(300));
        let result = tokio::time::timeout(Duration::from_secs(10), webhook.notify(&event()))
            .await
            .expect("notify should return before the outer bound");
        assert!(matches!(result, Err(NotifyError::Http(_))));
    }
}
