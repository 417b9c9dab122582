//! Box office walkthrough.
//!
//! Runs one evening at the door against an in-memory document store:
//! a customer orders tickets, the tickets are emailed, and each one is
//! scanned and checked in.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin box-office
//!
//! # Send through SendGrid instead of the console
//! TICKETDESK_SEND_OPTION=sendGrid SG_API_KEY=SG.xxx cargo run --bin box-office
//! ```

use anyhow::{Context, bail};
use std::sync::Arc;
use std::time::Duration;
use ticketdesk_core::mail::Attachment;
use ticketdesk_runtime::repository::CustomerList;
use ticketdesk_runtime::{AppContext, Config, ScanOutcome};
use ticketdesk_testing::InMemoryDocumentStore;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ticketdesk_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(?config, "Configuration loaded");

    let store = Arc::new(InMemoryDocumentStore::new());
    let context = AppContext::start(config, store);

    // Order
    let form = context.order_form();
    form.set_name("Ann Lee");
    form.set_phone("0912345678");
    form.set_email("ann.lee@example.com");
    form.set_quantity(2);

    tokio::time::sleep(context.config.forms.debounce + Duration::from_millis(100)).await;
    if !form.is_valid() {
        bail!("order form did not validate: {form:?}");
    }

    let tickets = form.place_order()?;
    form.clear();
    info!(count = tickets.len(), "Tickets issued");

    let expected = tickets.len();
    wait_for(&context, |list| list.len() >= expected)
        .await
        .context("tickets never appeared in the live list")?;

    // Delivery
    for ticket in &tickets {
        let holder = context
            .repository
            .find(ticket.qr_payload())
            .context("issued ticket missing from the list")?;
        // QR rendering belongs to the client; the payload stands in for the image
        let image = Attachment::jpeg(format!("{}.jpeg", ticket.id()), ticket.qr_payload().as_bytes().to_vec());
        let notice = context.delivery.send(&holder, vec![image]).await;
        info!(ticket = %ticket.id(), %notice, "Delivery");
    }

    // Door
    for ticket in &tickets {
        let outcome = context.scanner.scan(ticket.qr_payload()).await;
        match &outcome {
            ScanOutcome::Found(customer) => {
                let notice = context.scanner.confirm(customer).await;
                info!(ticket = %ticket.id(), %notice, "Checked in");
            },
            other => {
                if let Some(notice) = other.notice() {
                    info!(ticket = %ticket.id(), %notice, "Scanned");
                }
            },
        }
    }

    let checked_in = wait_for(&context, |list| list.iter().filter(|c| c.verified()).count() >= expected)
        .await
        .context("check-ins never synced back")?;

    // A second scan at the door is refused
    if let Some(first) = tickets.first() {
        let outcome = context.scanner.scan(first.qr_payload()).await;
        if let Some(notice) = outcome.notice() {
            warn!(ticket = %first.id(), %notice, "Rescanned");
        }
    }

    let unknown = context.scanner.scan("counterfeit").await;
    if let Some(notice) = unknown.notice() {
        warn!(%notice, "Scanned a code that is not ours");
    }

    for customer in checked_in.iter() {
        info!(
            id = ?customer.id,
            name = %customer.name,
            verified = customer.verified(),
            sent = customer.sent(),
            "Ticket"
        );
    }
    info!(rows = context.index.snapshot().len(), "Evening closed");

    Ok(())
}

async fn wait_for(
    context: &AppContext,
    predicate: impl FnMut(&CustomerList) -> bool,
) -> anyhow::Result<CustomerList> {
    let mut list = context.repository.subscribe();
    let found = tokio::time::timeout(SYNC_TIMEOUT, list.wait_for(predicate)).await??;
    Ok(Arc::clone(&found))
}
