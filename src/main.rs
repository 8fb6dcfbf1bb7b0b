#[macro_use]
extern crate diesel;
use std::{sync::Arc, time::Duration};

use crate::{
    backend::Backend,
    booking_manager::BookingManager,
    configuration::Configuration,
    configuration_handler::ConfigurationHandler,
    database_interface::DatabaseInterface,
    http::create_app,
    local_backend::LocalBackend,
    notification::{LogNotifier, Notifier, WebhookNotifier},
    reminder::run_reminder_worker,
};
use mockable::{Clock, DefaultClock};
use tokio::{net::TcpListener, time::sleep};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod booking_manager;
mod configuration;
mod configuration_handler;
mod database_interface;
mod error;
mod http;
mod local_backend;
mod notification;
mod reminder;
mod schema;
mod slot_query;
mod slot_range;
#[cfg(test)]
mod testutils;
mod types;

async fn serve<T: Backend>(
    backend: T,
    configuration: &ConfigurationHandler,
    listener: TcpListener,
) {
    let notifier: Arc<dyn Notifier> = match configuration.notification_webhook_url() {
        Some(url) => {
            info!(%url, "Sending notifications to webhook");
            Arc::new(WebhookNotifier::new(url))
        }
        None => {
            info!("No notification webhook configured, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(DefaultClock);

    tokio::spawn(run_reminder_worker(
        backend.clone(),
        notifier.clone(),
        clock.clone(),
        configuration.reminder_poll_interval(),
        configuration.notification_timeout(),
    ));

    let booking_manager = BookingManager::new(
        backend,
        notifier,
        clock,
        configuration.notification_timeout(),
    );
    if let Err(err) = axum::serve(listener, create_app(booking_manager)).await {
        error!(?err, "Server stopped");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("#################");
    println!("# Court Booking #");
    println!("#################");

    let configuration = ConfigurationHandler::parse_arguments();

    let address = format!("0.0.0.0:{}", configuration.port());
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(?err, %address, "Failed to bind");
            return;
        }
    };
    println!("Accessable at:\n{address}");

    if let Some(database_url) = configuration.database_url() {
        if configuration.example_data() {
            warn!("Example data is only inserted into the in-memory backend");
        }
        let backend = loop {
            match DatabaseInterface::new(&database_url) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(?err, "Failed to establish database connection. Retry in 1 sec. You may want to restart it with database disabled (in-memory timeslots and bookings).");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        serve(backend, &configuration, listener).await;
    } else {
        let backend = LocalBackend::default();
        if configuration.example_data() {
            let today = DefaultClock.local().date_naive();
            if let Err(err) = backend.insert_example_data(today) {
                error!(?err, "Failed to insert example data");
            }
        }
        serve(backend, &configuration, listener).await;
    }
}
