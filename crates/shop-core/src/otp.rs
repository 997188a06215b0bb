//! # OTP Verification
//!
//! Second half of a card checkout. Binds to the pending transaction left by
//! the orchestrator, collects a six-digit code and confirms it with
//! `otp/verify`. On success the order is written, the pending record dropped
//! and the cart emptied; the flow then unbinds so the same code cannot place
//! a second order.
//!
//! The countdown is display-only: it runs from the moment the flow is
//! resumed, is not restarted by a resend, and reaching zero does not block
//! verification.

use crate::cart::CartStore;
use crate::config::CheckoutConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{BoxedPaymentGateway, OtpSendRequest, OtpVerifyRequest};
use crate::order::{OrderRecord, PendingTransaction};
use crate::receipt::{BoxedReceiptGenerator, NoopReceipts, Receipt};
use crate::session::BoxedSessionStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, instrument, warn};

pub const OTP_LENGTH: usize = 6;

const INVALID_CODE: &str = "Invalid OTP. Please enter a 6-digit OTP.";
const MISSING_BINDING: &str = "Missing mobile number or transaction ID. Please try again.";
const REJECTED_FALLBACK: &str = "Invalid OTP. Please try again.";
const RESEND_FAILED: &str = "Failed to resend OTP.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum OtpState {
    /// No pending transaction to verify
    Idle,
    CodeEntry,
    Verifying,
    Verified,
    Rejected(String),
}

/// Snapshot for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtpStatus {
    pub state: OtpState,
    pub transaction_id: Option<String>,
    pub mobile_number: Option<String>,
    pub remaining_secs: u64,
    pub countdown: String,
    pub expired: bool,
}

#[derive(Clone)]
pub struct OtpVerification {
    gateway: BoxedPaymentGateway,
    sessions: BoxedSessionStore,
    receipts: BoxedReceiptGenerator,
    window: Duration,
    success_delay: Duration,
    binding: Option<PendingTransaction>,
    digits: [Option<char>; OTP_LENGTH],
    state: OtpState,
    started_at: Instant,
    message: Option<String>,
}

impl OtpVerification {
    /// Bind to the persisted pending transaction and start the countdown.
    ///
    /// A missing record is not an error: the flow stays `Idle` with a
    /// message, and `verify` refuses locally.
    #[instrument(skip_all)]
    pub async fn resume(
        gateway: BoxedPaymentGateway,
        sessions: BoxedSessionStore,
        config: &CheckoutConfig,
    ) -> PaymentResult<Self> {
        let binding = sessions.pending().await?;
        let (state, message) = match &binding {
            Some(pending) => {
                info!("Awaiting OTP for transaction {}", pending.transaction_id);
                (OtpState::CodeEntry, None)
            }
            None => {
                warn!("No pending transaction to verify");
                (OtpState::Idle, Some("Invalid payment details".to_string()))
            }
        };

        Ok(Self {
            gateway,
            sessions,
            receipts: Arc::new(NoopReceipts),
            window: config.otp_window,
            success_delay: config.latency.otp_success,
            binding,
            digits: [None; OTP_LENGTH],
            state,
            started_at: Instant::now(),
            message,
        })
    }

    pub fn with_receipts(mut self, receipts: BoxedReceiptGenerator) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn state(&self) -> &OtpState {
        &self.state
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn pending(&self) -> Option<&PendingTransaction> {
        self.binding.as_ref()
    }

    /// Put one digit in box `index`. Empty clears the box; anything other
    /// than a single digit is ignored.
    pub fn enter_digit(&mut self, index: usize, value: &str) -> bool {
        if index >= OTP_LENGTH {
            return false;
        }
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (None, _) => self.digits[index] = None,
            (Some(c), None) if c.is_ascii_digit() => self.digits[index] = Some(c),
            _ => return false,
        }
        true
    }

    /// Replace the whole code. Returns false (and leaves the boxes empty)
    /// for non-digits or more than six characters.
    pub fn set_code(&mut self, code: &str) -> bool {
        self.clear_code();
        let code = code.trim();
        if code.chars().count() > OTP_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        for (i, c) in code.chars().enumerate() {
            self.digits[i] = Some(c);
        }
        true
    }

    /// Entered digits, in order, skipping empty boxes
    pub fn code(&self) -> String {
        self.digits.iter().flatten().collect()
    }

    pub fn is_code_empty(&self) -> bool {
        self.digits.iter().all(Option::is_none)
    }

    fn clear_code(&mut self) {
        self.digits = [None; OTP_LENGTH];
    }

    /// Time left on the countdown, rounded up to whole seconds
    pub fn remaining(&self) -> Duration {
        let left = self.window.saturating_sub(self.started_at.elapsed());
        Duration::from_secs(left.as_secs() + u64::from(left.subsec_nanos() > 0))
    }

    /// `mm:ss`
    pub fn formatted_remaining(&self) -> String {
        let secs = self.remaining().as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn status(&self) -> OtpStatus {
        OtpStatus {
            state: self.state.clone(),
            transaction_id: self.binding.as_ref().map(|p| p.transaction_id.clone()),
            mobile_number: self.binding.as_ref().map(|p| p.mobile_number.clone()),
            remaining_secs: self.remaining().as_secs(),
            countdown: self.formatted_remaining(),
            expired: self.is_expired(),
        }
    }

    /// Confirm the entered code.
    ///
    /// Local checks run first and make no call. A server refusal is reported
    /// with the server's wording when it sent one.
    #[instrument(
        skip_all,
        fields(transaction_id = ?self.binding.as_ref().map(|p| &p.transaction_id))
    )]
    pub async fn verify(&mut self, cart: &mut CartStore) -> PaymentResult<OrderRecord> {
        let code = self.code();
        if code.len() != OTP_LENGTH {
            self.message = Some(INVALID_CODE.to_string());
            return Err(PaymentError::validation(INVALID_CODE));
        }
        let Some(pending) = self.binding.clone() else {
            self.message = Some(MISSING_BINDING.to_string());
            return Err(PaymentError::validation(MISSING_BINDING));
        };

        self.state = OtpState::Verifying;
        self.message = None;
        let request = OtpVerifyRequest {
            transaction_id: pending.transaction_id.clone(),
            mobile_number: pending.mobile_number.clone(),
            otp: code,
        };

        if let Err(e) = self.gateway.verify_otp(&request).await {
            let message = match e {
                PaymentError::RemoteRejection { message, .. } if !message.trim().is_empty() => {
                    message
                }
                other => {
                    warn!("OTP verification failed: {}", other);
                    REJECTED_FALLBACK.to_string()
                }
            };
            self.state = OtpState::Rejected(message.clone());
            self.message = Some(message.clone());
            return Err(PaymentError::rejected("otp/verify", message));
        }

        sleep(self.success_delay).await;

        let order = match self.record_verified(&pending, cart).await {
            Ok(order) => order,
            Err(e) => {
                warn!("Accepted OTP but could not record the order: {}", e);
                let message = e.user_message();
                self.state = OtpState::Rejected(message.clone());
                self.message = Some(message);
                return Err(e);
            }
        };

        if let Err(e) = self
            .receipts
            .generate(&Receipt::new(&pending.transaction_id, pending.amount))
            .await
        {
            warn!("Receipt generation failed: {}", e);
        }

        cart.clear();
        self.binding = None;
        self.clear_code();
        self.state = OtpState::Verified;
        info!("OTP verified, order {} recorded", order.transaction_id);
        Ok(order)
    }

    async fn record_verified(
        &self,
        pending: &PendingTransaction,
        cart: &CartStore,
    ) -> PaymentResult<OrderRecord> {
        let mut items = self.sessions.purchased_items().await?;
        if items.is_empty() {
            items = cart.snapshot();
        }
        let order = OrderRecord::new(items, pending.transaction_id.clone())
            .with_delivery_date(pending.delivery_date);
        self.sessions.record_order(&order).await?;
        self.sessions.clear_pending().await?;
        Ok(order)
    }

    /// Send a fresh code for the same mobile/transaction pair. Clears the
    /// entered digits; the countdown keeps running.
    #[instrument(skip_all)]
    pub async fn resend(&mut self) -> PaymentResult<()> {
        let Some(pending) = self.binding.as_mut() else {
            self.message = Some(MISSING_BINDING.to_string());
            return Err(PaymentError::validation(MISSING_BINDING));
        };

        let request = OtpSendRequest::Resend {
            mobile_number: pending.mobile_number.clone(),
            transaction_id: pending.transaction_id.clone(),
        };
        if let Err(e) = self.gateway.send_otp(&request).await {
            let message = match e {
                PaymentError::RemoteRejection { message, .. } if !message.trim().is_empty() => {
                    message
                }
                other => {
                    warn!("OTP resend failed: {}", other);
                    RESEND_FAILED.to_string()
                }
            };
            self.message = Some(message.clone());
            return Err(PaymentError::rejected("otp/send", message));
        }

        pending.created_at = Utc::now();
        let pending = pending.clone();
        let items = self.sessions.purchased_items().await?;
        self.sessions.record_pending(&pending, &items).await?;

        self.clear_code();
        self.state = OtpState::CodeEntry;
        self.message = Some("OTP resent successfully.".to_string());
        info!("OTP resent for transaction {}", pending.transaction_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::{CheckoutOrchestrator, PaymentFields, SubmitOutcome};
    use crate::card::CardDetails;
    use crate::product::Price;
    use crate::gateway::ProcessedPayment;
    use crate::session::{InMemorySessionStore, SessionKey, SessionStore};
    use crate::test_support::{cart_of_two, dispatch, ScriptedGateway};
    use async_trait::async_trait;
    use chrono::{Datelike, Local};
    use serde_json::Value;

    /// Session store whose order writes always fail
    struct ReadOnlyOrders(InMemorySessionStore);

    #[async_trait]
    impl SessionStore for ReadOnlyOrders {
        async fn get(&self, key: SessionKey) -> PaymentResult<Option<Value>> {
            self.0.get(key).await
        }

        async fn put(&self, key: SessionKey, value: Value) -> PaymentResult<()> {
            if key == SessionKey::OrderDetails {
                return Err(PaymentError::Storage("disk full".into()));
            }
            self.0.put(key, value).await
        }

        async fn remove(&self, key: SessionKey) -> PaymentResult<()> {
            self.0.remove(key).await
        }
    }

    async fn bound_flow(
        config: &CheckoutConfig,
    ) -> (Arc<ScriptedGateway>, Arc<InMemorySessionStore>, OtpVerification) {
        let gateway = Arc::new(ScriptedGateway::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let pending = PendingTransaction::new("TXN-1", "9876543210", Price::rupees(200));
        sessions
            .record_pending(&pending, &cart_of_two().snapshot())
            .await
            .unwrap();
        let flow = OtpVerification::resume(gateway.clone(), sessions.clone(), config)
            .await
            .unwrap();
        (gateway, sessions, flow)
    }

    #[tokio::test]
    async fn test_short_code_rejected_locally() {
        let (gateway, _, mut flow) = bound_flow(&CheckoutConfig::instant()).await;
        let mut cart = cart_of_two();

        assert!(flow.set_code("12345"));
        let err = flow.verify(&mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), INVALID_CODE);
        assert_eq!(gateway.calls("otp/verify"), 0);

        gateway.push_verify(Ok(()));
        flow.enter_digit(5, "6");
        flow.verify(&mut cart).await.unwrap();
        assert_eq!(gateway.calls("otp/verify"), 1);
        assert_eq!(gateway.otp_verifies.lock().unwrap()[0].otp, "123456");
    }

    #[tokio::test]
    async fn test_digit_entry_rules() {
        let (_, _, mut flow) = bound_flow(&CheckoutConfig::instant()).await;
        assert!(flow.enter_digit(0, "7"));
        assert!(!flow.enter_digit(1, "x"));
        assert!(!flow.enter_digit(1, "12"));
        assert!(!flow.enter_digit(6, "1"));
        assert_eq!(flow.code(), "7");
        assert!(flow.enter_digit(0, ""));
        assert!(flow.is_code_empty());
        assert!(!flow.set_code("1234567"));
        assert!(flow.is_code_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_keeps_countdown_and_clears_code() {
        let (gateway, sessions, mut flow) = bound_flow(&CheckoutConfig::default()).await;
        let before = sessions.pending().await.unwrap().unwrap().created_at;
        assert_eq!(flow.formatted_remaining(), "05:00");

        tokio::time::advance(Duration::from_secs(10)).await;
        flow.set_code("123456");
        gateway.push_dispatch(Ok(dispatch("TXN-1", "9876543210")));
        flow.resend().await.unwrap();

        assert!(flow.is_code_empty());
        assert_eq!(flow.remaining(), Duration::from_secs(290));
        assert_eq!(flow.formatted_remaining(), "04:50");
        assert_eq!(
            gateway.otp_sends.lock().unwrap()[0],
            OtpSendRequest::Resend {
                mobile_number: "9876543210".into(),
                transaction_id: "TXN-1".into(),
            }
        );
        let after = sessions.pending().await.unwrap().unwrap().created_at;
        assert!(after >= before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_expiry_does_not_block_verify() {
        let (gateway, _, mut flow) = bound_flow(&CheckoutConfig::default()).await;
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(flow.is_expired());
        assert_eq!(flow.formatted_remaining(), "00:00");

        gateway.push_verify(Ok(()));
        flow.set_code("654321");
        let mut cart = cart_of_two();
        flow.verify(&mut cart).await.unwrap();
        assert_eq!(flow.state(), &OtpState::Verified);
    }

    #[tokio::test]
    async fn test_rejection_surfaces_server_detail() {
        let (gateway, sessions, mut flow) = bound_flow(&CheckoutConfig::instant()).await;
        let mut cart = cart_of_two();
        gateway.push_verify(Err(PaymentError::rejected("otp/verify", "OTP expired")));
        gateway.push_verify(Err(PaymentError::Transport("reset".into())));
        flow.set_code("111111");

        let err = flow.verify(&mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), "OTP expired");
        assert_eq!(flow.state(), &OtpState::Rejected("OTP expired".into()));

        let err = flow.verify(&mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), REJECTED_FALLBACK);

        assert!(sessions.pending().await.unwrap().is_some());
        assert_eq!(cart.item_count(), 2);
    }

    #[tokio::test]
    async fn test_resume_without_pending() {
        let gateway = Arc::new(ScriptedGateway::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let config = CheckoutConfig::instant();
        let mut flow = OtpVerification::resume(gateway.clone(), sessions, &config)
            .await
            .unwrap();
        assert_eq!(flow.state(), &OtpState::Idle);
        assert_eq!(flow.message(), Some("Invalid payment details"));

        flow.set_code("123456");
        let err = flow.verify(&mut CartStore::new()).await.unwrap_err();
        assert_eq!(err.user_message(), MISSING_BINDING);
        assert_eq!(gateway.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_checkout_end_to_end() {
        let config = CheckoutConfig::default();
        let gateway = Arc::new(ScriptedGateway::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let mut checkout =
            CheckoutOrchestrator::new(gateway.clone(), sessions.clone(), config.clone());
        let mut cart = cart_of_two();
        let items = cart.snapshot();

        gateway.push_mobile(Ok("9876543210".into()));
        gateway.push_dispatch(Ok(dispatch("TXN-E2E", "9876543210")));
        let year = format!("{:02}", (Local::now().year() + 1) % 100);
        let card = CardDetails::new("4111111111111111", "A Shopper", "06", year, "123");

        let outcome = checkout.submit(PaymentFields::Card(card), &mut cart).await.unwrap();
        let SubmitOutcome::OtpRequired(pending) = outcome else {
            panic!("expected OTP step");
        };
        assert_eq!(pending.amount, Price::rupees(200));
        assert_eq!(
            sessions.pending().await.unwrap().map(|p| p.amount),
            Some(Price::rupees(200))
        );

        let mut flow = OtpVerification::resume(gateway.clone(), sessions.clone(), &config)
            .await
            .unwrap();
        gateway.push_verify(Ok(()));
        flow.set_code("123456");
        let order = flow.verify(&mut cart).await.unwrap();

        assert_eq!(order.transaction_id, "TXN-E2E");
        assert_eq!(order.items, items);
        assert!(cart.is_empty());
        let session = sessions.load().await.unwrap();
        assert!(session.pending.is_none());
        assert_eq!(session.order, Some(order));
    }

    #[tokio::test]
    async fn test_accepted_code_cannot_place_second_order() {
        let (gateway, sessions, mut flow) = bound_flow(&CheckoutConfig::instant()).await;
        let mut cart = cart_of_two();
        gateway.push_verify(Ok(()));
        flow.set_code("123456");
        let order = flow.verify(&mut cart).await.unwrap();

        assert!(flow.pending().is_none());
        let session = sessions.load().await.unwrap();
        assert!(session.pending.is_none());
        assert!(session.purchased_items.is_empty());

        flow.set_code("123456");
        let err = flow.verify(&mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), MISSING_BINDING);
        assert_eq!(gateway.calls("otp/verify"), 1);
        assert_eq!(sessions.order().await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_abandoned_card_attempt_is_not_resumed() {
        let config = CheckoutConfig::instant();
        let gateway = Arc::new(ScriptedGateway::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let mut checkout =
            CheckoutOrchestrator::new(gateway.clone(), sessions.clone(), config.clone());
        let mut cart = cart_of_two();

        gateway.push_mobile(Ok("9876543210".into()));
        gateway.push_dispatch(Ok(dispatch("TXN-CARD", "9876543210")));
        let year = format!("{:02}", (Local::now().year() + 1) % 100);
        let card = CardDetails::new("4111111111111111", "A Shopper", "06", year, "123");
        checkout.submit(PaymentFields::Card(card), &mut cart).await.unwrap();

        gateway.push_payment(Ok(ProcessedPayment {
            transaction_id: Some("NB-1".into()),
            delivery_date: None,
        }));
        checkout
            .submit(PaymentFields::Netbanking { bank_code: "SBI456".into() }, &mut cart)
            .await
            .unwrap();

        let mut flow = OtpVerification::resume(gateway.clone(), sessions.clone(), &config)
            .await
            .unwrap();
        assert_eq!(flow.state(), &OtpState::Idle);
        flow.set_code("123456");
        let err = flow.verify(&mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), MISSING_BINDING);
        assert_eq!(gateway.calls("otp/verify"), 0);
        let order = sessions.order().await.unwrap().unwrap();
        assert_eq!(order.transaction_id, "NB-1");
    }

    #[tokio::test]
    async fn test_storage_failure_after_acceptance_is_reported() {
        let gateway = Arc::new(ScriptedGateway::new());
        let sessions = Arc::new(ReadOnlyOrders(InMemorySessionStore::new()));
        let pending = PendingTransaction::new("TXN-1", "9876543210", Price::rupees(200));
        sessions
            .record_pending(&pending, &cart_of_two().snapshot())
            .await
            .unwrap();
        let mut flow =
            OtpVerification::resume(gateway.clone(), sessions.clone(), &CheckoutConfig::instant())
                .await
                .unwrap();
        let mut cart = cart_of_two();

        gateway.push_verify(Ok(()));
        flow.set_code("123456");
        let err = flow.verify(&mut cart).await.unwrap_err();

        assert!(matches!(err, PaymentError::Storage(_)));
        let shown = "Unexpected error. Please try again later.";
        assert_eq!(flow.state(), &OtpState::Rejected(shown.into()));
        assert_eq!(flow.message(), Some(shown));
        assert!(flow.pending().is_some());
        assert!(sessions.pending().await.unwrap().is_some());
        assert_eq!(cart.item_count(), 2);
    }
}
