//! Service layer: reconciliation, notification and run orchestration.
//!
//! Services are independent of the CLI; commands build them from the
//! loaded configuration and report on what they return.

pub mod monitor;
pub mod notify;
pub mod orchestrator;
pub mod reconcile;

pub use monitor::{monitor, MonitorOptions, MonitorStats};
pub use notify::{
    build_notifier, CommandNotifier, LogNotifier, MultiNotifier, Notifier, NotifyConfig,
    NotifyError, WebhookNotifier,
};
pub use orchestrator::{Orchestrator, RunStats, RunSummary};
pub use reconcile::{normalize_record, ReconcileOutcome, RecordRejection, Reconciler};
