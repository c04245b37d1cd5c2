//! Operator alerts
//!
//! Alerts are best-effort: they are logged locally, then delivered on a
//! detached thread so a slow or failing channel never holds up a sync run.

mod discord;

pub use discord::DiscordNotifier;

use anyhow::Result;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// A channel that delivers human-readable alert messages
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> Result<()>;
}

/// Fire-and-forget alert dispatcher
///
/// Every alert is written to the log. When a [`Notifier`] is configured the
/// message is also sent from a background thread; the handles are kept so
/// the host can wait for in-flight sends with [`Alerter::flush`].
#[derive(Clone)]
pub struct Alerter {
    notifier: Option<Arc<dyn Notifier>>,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Alerter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// An alerter that only logs
    pub fn log_only() -> Self {
        Self {
            notifier: None,
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Log a message and dispatch it to the notifier without waiting
    pub fn alert(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("[ALERT] {}", message);

        let Some(notifier) = self.notifier.clone() else {
            return;
        };

        let spawned = std::thread::Builder::new()
            .name("alert".to_string())
            .spawn(move || {
                if let Err(e) = notifier.notify(&message) {
                    warn!("[ALERT] Failed to deliver alert: {:#}", e);
                }
            });

        match spawned {
            Ok(handle) => {
                if let Ok(mut in_flight) = self.in_flight.lock() {
                    in_flight.retain(|h| !h.is_finished());
                    in_flight.push(handle);
                }
            }
            Err(e) => warn!("[ALERT] Failed to spawn alert thread: {}", e),
        }
    }

    /// Wait for every alert dispatched so far to finish sending
    pub fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.drain(..).collect(),
            Err(_) => return,
        };
        if !handles.is_empty() {
            debug!("[ALERT] Waiting for {} alert(s) to finish", handles.len());
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str) -> Result<()> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _message: &str) -> Result<()> {
            bail!("channel down")
        }
    }

    #[test]
    fn test_alerts_are_delivered_after_flush() {
        let notifier = Arc::new(RecordingNotifier::default());
        let alerter = Alerter::new(notifier.clone());

        alerter.alert("first");
        alerter.alert(String::from("second"));
        alerter.flush();

        let mut messages = notifier.messages.lock().unwrap().clone();
        messages.sort();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_notifier_failure_is_swallowed() {
        let alerter = Alerter::new(Arc::new(FailingNotifier));
        alerter.alert("nobody hears this");
        alerter.flush();
    }

    #[test]
    fn test_log_only_has_nothing_in_flight() {
        let alerter = Alerter::log_only();
        alerter.alert("logged");
        assert!(alerter.in_flight.lock().unwrap().is_empty());
        alerter.flush();
    }
}
