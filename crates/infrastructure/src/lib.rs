pub mod alarm;
pub mod database;
pub mod http;
pub mod observability;

pub use alarm::{CompositeAlarmSender, LoggingAlarmSender, WebhookAlarmSender};
pub use database::InMemoryJobStore;
pub use http::{HttpAdminClient, HttpExecutorClient, HttpExecutorClientFactory};
pub use observability::{install_prometheus_exporter, MetricsCollector};
