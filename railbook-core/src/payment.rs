use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use railbook_shared::Pnr;

/// Outcome of a single opaque charge call: the upstream either confirms the
/// hold or rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Confirmed,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Hold reference issued by the engine, echoed back by the provider.
    pub reference: Uuid,
    pub amount: i64,
    pub outcome: PaymentOutcome,
    pub processed_at: DateTime<Utc>,
}

/// Seam to the external payment provider. The engine treats this as one
/// opaque call with two outcomes; transport errors propagate separately so
/// the caller can distinguish "declined" from "unreachable".
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        reference: Uuid,
        pnr: &Pnr,
        amount: i64,
    ) -> Result<PaymentReceipt, Box<dyn std::error::Error + Send + Sync>>;
}

/// In-process gateway used by tests and local runs. `decline_next` /
/// `fail_next` arm one-shot triggers for exercising the engine's
/// compensation paths.
#[derive(Default)]
pub struct MockPaymentGateway {
    decline_next: AtomicBool,
    fail_next: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next charge returns `Declined`.
    pub fn decline_next(&self) {
        self.decline_next.store(true, Ordering::SeqCst);
    }

    /// The next charge fails with a transport error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(
        &self,
        reference: Uuid,
        pnr: &Pnr,
        amount: i64,
    ) -> Result<PaymentReceipt, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err("simulated payment gateway failure".into());
        }

        let outcome = if self.decline_next.swap(false, Ordering::SeqCst) {
            PaymentOutcome::Declined
        } else {
            PaymentOutcome::Confirmed
        };

        tracing::info!(%pnr, %reference, amount, ?outcome, "mock payment processed");

        Ok(PaymentReceipt {
            reference,
            amount,
            outcome,
            processed_at: Utc::now(),
        })
    }
}
