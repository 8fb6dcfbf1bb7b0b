use std::time::Duration;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn notification_webhook_url(&self) -> Option<String>;
    fn notification_timeout(&self) -> Duration;
    fn reminder_poll_interval(&self) -> Duration;
    fn example_data(&self) -> bool;
}
