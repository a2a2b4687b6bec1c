use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use serde_json::json;

use crate::{
    clock::Clock,
    domain::{AuditEntry, Payment},
    error::{AppError, Result},
    payments::BillingGateway,
    repository::{AuditRepository, PaymentRepository},
};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub examined: usize,
    pub reconciled: usize,
    pub discrepancies: usize,
    pub errors: usize,
}

/// Cross-checks recent provider payments against the provider's records.
/// Amounts are never corrected here; a mismatch only leaves an audit entry
/// for a human to review.
pub struct Reconciler {
    payment_repo: Arc<dyn PaymentRepository>,
    audit_repo: Arc<dyn AuditRepository>,
    gateway: Arc<dyn BillingGateway>,
    clock: Arc<dyn Clock>,
    lookback_days: i64,
}

enum Outcome {
    Reconciled,
    AlreadyReconciled,
    Discrepancy,
}

impl Reconciler {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        audit_repo: Arc<dyn AuditRepository>,
        gateway: Arc<dyn BillingGateway>,
        clock: Arc<dyn Clock>,
        lookback_days: i64,
    ) -> Self {
        Self {
            payment_repo,
            audit_repo,
            gateway,
            clock,
            lookback_days,
        }
    }

    pub async fn run_once(&self) -> Result<ReconciliationSummary> {
        let since = self.clock.now() - Duration::days(self.lookback_days);
        let payments = self.payment_repo.list_unreconciled_since(since).await?;

        let mut summary = ReconciliationSummary {
            examined: payments.len(),
            ..Default::default()
        };

        for payment in payments {
            match self.reconcile(&payment).await {
                Ok(Outcome::Reconciled) => summary.reconciled += 1,
                Ok(Outcome::AlreadyReconciled) => {}
                Ok(Outcome::Discrepancy) => summary.discrepancies += 1,
                Err(e) => {
                    tracing::warn!(payment_id = %payment.id, "Could not reconcile payment: {}", e);
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            examined = summary.examined,
            reconciled = summary.reconciled,
            discrepancies = summary.discrepancies,
            errors = summary.errors,
            "Reconciliation sweep finished"
        );
        Ok(summary)
    }

    async fn reconcile(&self, payment: &Payment) -> Result<Outcome> {
        let intent_id = payment.stripe_payment_intent_id.as_deref().ok_or_else(|| {
            AppError::InvalidState("Payment has no provider reference".to_string())
        })?;

        let provider_amount = self.gateway.retrieve_payment_amount(intent_id).await?;

        if provider_amount == payment.amount_cents {
            let flipped = self.payment_repo.mark_reconciled(payment.id, self.clock.now()).await?;
            return Ok(if flipped {
                Outcome::Reconciled
            } else {
                Outcome::AlreadyReconciled
            });
        }

        tracing::warn!(
            payment_id = %payment.id,
            local = payment.amount_cents,
            provider = provider_amount,
            "Payment amount does not match provider"
        );

        // Flagged once; later sweeps still count it until someone fixes the row
        let resource_id = payment.id.to_string();
        if self.audit_repo.exists("payment_discrepancy", &resource_id).await? {
            return Ok(Outcome::Discrepancy);
        }

        self.audit_repo
            .record(AuditEntry::new(
                None,
                "payment_discrepancy",
                "payment",
                Some(resource_id),
                json!({
                    "payment_intent_id": intent_id,
                    "local_amount_cents": payment.amount_cents,
                    "provider_amount_cents": provider_amount,
                    "currency": payment.currency,
                }),
                self.clock.now(),
            ))
            .await?;

        Ok(Outcome::Discrepancy)
    }
}
