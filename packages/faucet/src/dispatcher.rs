//! Distribution dispatcher
//!
//! Drives one request through
//!
//! ```text
//! Received -> Classified -> AdmissionChecked -> Planned -> NoopComplete
//!                                                       -> Executing -> Completed | Failed
//! ```
//!
//! and turns the terminal state into a [`DistributionResult`]. Any earlier
//! step can also end in `Failed`.
//!
//! The limiter slot taken at admission is committed only when a transfer
//! completes. A no-op or a failure releases it, so neither consumes quota.

use chrono::{DateTime, Utc};
use dualchain_rs::{
    format_units, AddressError, AddressTranslator, Asset, Classification, Environment,
    NormalizedAddress,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{DistributionError, ErrorKind};
use crate::executor::{TransferPath, TransferReceipt};
use crate::metrics::Metrics;
use crate::rate_limiter::RateLimiter;
use crate::reconciler::{BalanceReconciler, TransferPlan};
use crate::session::OperatorSession;

// ============================================================================
// Request & Result
// ============================================================================

/// Dispatcher states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Classified,
    AdmissionChecked,
    Planned,
    NoopComplete,
    Executing,
    Completed,
    Failed,
}

impl DispatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchState::Received => "received",
            DispatchState::Classified => "classified",
            DispatchState::AdmissionChecked => "admission_checked",
            DispatchState::Planned => "planned",
            DispatchState::NoopComplete => "noop_complete",
            DispatchState::Executing => "executing",
            DispatchState::Completed => "completed",
            DispatchState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchState::NoopComplete | DispatchState::Completed | DispatchState::Failed
        )
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound request, alive until its result is produced
#[derive(Debug, Clone)]
pub struct DistributionRequest {
    pub raw_address: String,
    pub correlation_id: String,
    pub received_at: DateTime<Utc>,
    /// Set once classified
    pub recipient: Option<NormalizedAddress>,
    pub state: DispatchState,
}

impl DistributionRequest {
    pub fn new(raw_address: &str) -> Self {
        Self {
            raw_address: raw_address.to_string(),
            correlation_id: new_correlation_id(),
            received_at: Utc::now(),
            recipient: None,
            state: DispatchState::Received,
        }
    }

    pub fn environment(&self) -> Option<Environment> {
        self.recipient.as_ref().map(|r| r.environment())
    }

    fn advance(&mut self, next: DispatchState) {
        debug_assert!(!self.state.is_terminal(), "{} is terminal", self.state);
        debug!(
            correlation_id = %self.correlation_id,
            recipient = %self.recipient.as_ref().map(|r| r.recipient()).unwrap_or_default(),
            environment = self.environment().map(|e| e.as_str()).unwrap_or("unknown"),
            from = %self.state,
            to = %next,
            "Dispatch transition"
        );
        self.state = next;
    }
}

/// Random 16-hex-char request id
pub fn new_correlation_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// One delivered asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredTransfer {
    pub asset: String,
    /// Display units
    pub amount: String,
    /// Base units
    pub base_amount: String,
    pub tx_reference: String,
}

/// Result returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResult {
    pub success: bool,
    pub transfers: Vec<DeliveredTransfer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Asset the failure is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Transaction observed on chain for a timed-out or reverted submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_reference: Option<String>,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DistributionResult {
    fn base(request: &DistributionRequest) -> Self {
        Self {
            success: false,
            transfers: Vec::new(),
            error_kind: None,
            message: None,
            asset: None,
            retry_after_secs: None,
            tx_reference: None,
            correlation_id: request.correlation_id.clone(),
            environment: request.environment(),
            recipient: request.recipient.as_ref().map(|r| r.recipient()),
            timestamp: Utc::now(),
        }
    }

    fn noop(request: &DistributionRequest) -> Self {
        Self {
            success: true,
            message: Some("Recipient already meets every target balance".to_string()),
            ..Self::base(request)
        }
    }

    fn completed(request: &DistributionRequest, plan: &TransferPlan, receipt: &TransferReceipt) -> Self {
        let transfers = plan
            .transfers
            .iter()
            .map(|t| DeliveredTransfer {
                asset: t.asset.symbol.clone(),
                amount: format_units(t.amount, t.asset.decimals),
                base_amount: t.amount.to_string(),
                tx_reference: receipt.tx_reference.clone(),
            })
            .collect();

        Self {
            success: true,
            transfers,
            ..Self::base(request)
        }
    }

    fn failed(request: &DistributionRequest, err: &DistributionError) -> Self {
        let retry_after_secs = match err {
            DistributionError::RateLimited { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        Self {
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
            asset: err.asset().map(str::to_string),
            retry_after_secs,
            tx_reference: err.tx_reference().map(str::to_string),
            ..Self::base(request)
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Top-level orchestrator shared by all request handlers
pub struct Dispatcher {
    translator: AddressTranslator,
    limiter: Arc<RateLimiter>,
    reconciler: BalanceReconciler,
    session: Arc<OperatorSession>,
    ledger_a: Arc<dyn TransferPath>,
    ledger_b: Arc<dyn TransferPath>,
    assets: Arc<Vec<Asset>>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        translator: AddressTranslator,
        limiter: Arc<RateLimiter>,
        reconciler: BalanceReconciler,
        session: Arc<OperatorSession>,
        ledger_a: Arc<dyn TransferPath>,
        ledger_b: Arc<dyn TransferPath>,
        assets: Arc<Vec<Asset>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            translator,
            limiter,
            reconciler,
            session,
            ledger_a,
            ledger_b,
            assets,
            metrics,
        }
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn session(&self) -> &OperatorSession {
        &self.session
    }

    fn path(&self, environment: Environment) -> &dyn TransferPath {
        match environment {
            Environment::LedgerA => self.ledger_a.as_ref(),
            Environment::LedgerB => self.ledger_b.as_ref(),
        }
    }

    /// Time until `raw` may next request
    pub fn next_admission(&self, raw: &str) -> Result<(NormalizedAddress, Duration), AddressError> {
        let addr = self.translator.normalize(raw)?;
        let wait = self.limiter.next_admission(&addr);
        Ok((addr, wait))
    }

    /// Run one request to its terminal state
    pub async fn distribute(&self, raw_address: &str) -> DistributionResult {
        let started = Instant::now();
        let mut request = DistributionRequest::new(raw_address);

        info!(
            correlation_id = %request.correlation_id,
            address = %raw_address.trim(),
            "Distribution request received"
        );

        let outcome = self.run(&mut request).await;
        let result = match &outcome {
            Ok(Some((plan, receipt))) => {
                request.advance(DispatchState::Completed);
                DistributionResult::completed(&request, plan, receipt)
            }
            Ok(None) => DistributionResult::noop(&request),
            Err(err) => {
                request.advance(DispatchState::Failed);
                DistributionResult::failed(&request, err)
            }
        };

        self.observe(&request, &result, outcome.as_ref().ok().and_then(|o| o.as_ref()), started);
        result
    }

    /// `Ok(None)` is the no-op completion
    async fn run(
        &self,
        request: &mut DistributionRequest,
    ) -> Result<Option<(TransferPlan, TransferReceipt)>, DistributionError> {
        let recipient = match self.translator.classify(&request.raw_address) {
            Classification::LedgerA(addr) | Classification::LedgerB(addr) => addr,
            Classification::Invalid(err) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    error = %err,
                    "Rejected invalid address"
                );
                return Err(DistributionError::InvalidAddress(err));
            }
        };
        request.recipient = Some(recipient.clone());
        request.advance(DispatchState::Classified);

        let reservation = self.limiter.try_reserve(&recipient).map_err(|retry_after| {
            info!(
                correlation_id = %request.correlation_id,
                recipient = %recipient,
                retry_after_secs = retry_after.as_secs(),
                "Rate limited"
            );
            DistributionError::RateLimited { retry_after }
        })?;
        request.advance(DispatchState::AdmissionChecked);

        let plan = self
            .reconciler
            .plan_distribution(&recipient, &self.assets)
            .await?;
        request.advance(DispatchState::Planned);

        if plan.is_empty() {
            reservation.release();
            request.advance(DispatchState::NoopComplete);
            info!(
                correlation_id = %request.correlation_id,
                recipient = %recipient,
                "Recipient already at target, nothing to send"
            );
            return Ok(None);
        }

        request.advance(DispatchState::Executing);
        info!(
            correlation_id = %request.correlation_id,
            recipient = %recipient,
            transfers = ?plan.amounts(),
            "Executing distribution"
        );

        let environment = recipient.environment();
        let receipt = {
            let mut lane = self.session.lane(environment).await;
            self.path(environment).execute(&plan, &mut lane).await?
        };

        reservation.commit();
        Ok(Some((plan, receipt)))
    }

    fn observe(
        &self,
        request: &DistributionRequest,
        result: &DistributionResult,
        delivered: Option<&(TransferPlan, TransferReceipt)>,
        started: Instant,
    ) {
        let environment = request
            .environment()
            .map(|e| e.as_str())
            .unwrap_or("unknown");
        let elapsed = started.elapsed();

        self.metrics
            .distributions_total
            .with_label_values(&[environment, request.state.as_str()])
            .inc();
        self.metrics
            .distribution_duration_seconds
            .observe(elapsed.as_secs_f64());
        self.metrics
            .rate_limited_addresses
            .set(self.limiter.tracked() as i64);

        if let Some(kind) = result.error_kind {
            self.metrics.failures_total.with_label_values(&[kind.as_str()]).inc();
            if kind.is_pre_chain() {
                // Caller errors; already logged where they were rejected
                return;
            }
            warn!(
                correlation_id = %request.correlation_id,
                recipient = result.recipient.as_deref().unwrap_or("-"),
                environment = environment,
                error_kind = kind.as_str(),
                retryable = kind.is_retryable(),
                asset = result.asset.as_deref().unwrap_or("-"),
                error = result.message.as_deref().unwrap_or(""),
                elapsed_ms = elapsed.as_millis() as u64,
                "Distribution failed"
            );
            return;
        }

        if let Some((plan, receipt)) = delivered {
            for transfer in &plan.transfers {
                self.metrics
                    .transfers_total
                    .with_label_values(&[transfer.asset.symbol.as_str(), environment])
                    .inc();
            }
            info!(
                correlation_id = %request.correlation_id,
                recipient = %plan.recipient,
                tx_reference = %receipt.tx_reference,
                height = ?receipt.height,
                total_transfers = plan.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Distribution completed"
            );
        }
    }
}
