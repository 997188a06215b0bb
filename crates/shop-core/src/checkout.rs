//! # Checkout Orchestrator
//!
//! Drives one checkout attempt from the payment form to its next step:
//!
//! ```text
//! card        Collecting → FetchingMobile → QuantumHandshake → OtpDispatch
//!                        → AwaitingBankRedirect → (OTP flow)
//! upi         Collecting → UpiHandoff [→ Completed in sandbox]
//! netbanking  Collecting → Processing → Completed
//! wallet      Collecting (not available)
//!
//! simple form Collecting → OtpDispatch → OtpSent → Processing → Completed
//! ```
//!
//! Any failure puts the stage back to `Collecting` (or `OtpSent` on the
//! simple form once a code is out) and leaves a message for the shopper in
//! `last_error()`. Nothing is retried except `transactions/process`, and
//! only on transport errors.

use crate::card::{mask_card_number, CardDetails};
use crate::cart::{AmountPolicy, CartStore};
use crate::config::CheckoutConfig;
use crate::encryption::{BoxedEncryptionProvider, NoopEncryption};
use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{
    BoxedPaymentGateway, OtpDispatch, OtpSendRequest, OtpVerifyRequest, ProcessPaymentRequest,
};
use crate::order::{OrderRecord, PaymentMethod, PendingTransaction, SIMULATED_TRANSACTION_ID};
use crate::product::Price;
use crate::receipt::{BoxedReceiptGenerator, NoopReceipts, Receipt};
use crate::retry::with_retry;
use crate::session::BoxedSessionStore;
use crate::upi::{build_upi_url, is_valid_upi_id, UpiHandoff};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const MOBILE_FETCH_FAILED: &str =
    "Failed to fetch registered mobile number. Please check your card details.";
const OTP_DISPATCH_FAILED: &str = "Could not send OTP. Please try again.";
const OTP_NOT_VERIFIED: &str = "Please verify OTP before proceeding.";

/// Where the current attempt is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    #[default]
    Collecting,
    FetchingMobile,
    QuantumHandshake,
    OtpDispatch,
    /// Bank redirect screen; the OTP flow takes over after it
    AwaitingBankRedirect,
    /// Simple form: code sent, waiting for the shopper to enter it
    OtpSent,
    Processing,
    UpiHandoff,
    Completed,
}

/// Method-specific form input
#[derive(Debug, Clone)]
pub enum PaymentFields {
    Card(CardDetails),
    Upi { upi_id: String, user_agent: String },
    Netbanking { bank_code: String },
    Wallet,
}

impl PaymentFields {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentFields::Card(_) => PaymentMethod::Card,
            PaymentFields::Upi { .. } => PaymentMethod::Upi,
            PaymentFields::Netbanking { .. } => PaymentMethod::Netbanking,
            PaymentFields::Wallet => PaymentMethod::Wallet,
        }
    }
}

/// Next step after a successful submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "next", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// OTP dispatched; hand over to the OTP flow
    OtpRequired(PendingTransaction),
    /// Payment done
    Completed(OrderRecord),
    /// Shopper finishes in a UPI app. In sandbox mode the order is
    /// completed locally after a short pause.
    UpiHandoff {
        handoff: UpiHandoff,
        simulated_order: Option<OrderRecord>,
    },
}

/// OTP sent from the simple form
#[derive(Debug, Clone)]
struct CardOtp {
    dispatch: OtpDispatch,
    verified: bool,
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    gateway: BoxedPaymentGateway,
    sessions: BoxedSessionStore,
    encryption: BoxedEncryptionProvider,
    receipts: BoxedReceiptGenerator,
    config: CheckoutConfig,
    stage: CheckoutStage,
    last_error: Option<String>,
    card_otp: Option<CardOtp>,
}

impl CheckoutOrchestrator {
    /// Orchestrator with pass-through encryption and no receipts
    pub fn new(
        gateway: BoxedPaymentGateway,
        sessions: BoxedSessionStore,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            gateway,
            sessions,
            encryption: Arc::new(NoopEncryption),
            receipts: Arc::new(NoopReceipts),
            config,
            stage: CheckoutStage::Collecting,
            last_error: None,
            card_otp: None,
        }
    }

    pub fn with_encryption(mut self, encryption: BoxedEncryptionProvider) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_receipts(mut self, receipts: BoxedReceiptGenerator) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn stage(&self) -> CheckoutStage {
        self.stage
    }

    /// Message from the last failed submission
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Back to the payment form for a new attempt
    pub fn reset(&mut self) {
        self.stage = CheckoutStage::Collecting;
        self.last_error = None;
        self.card_otp = None;
    }

    /// Submit the payment form for `cart`.
    ///
    /// On failure the stage returns to `Collecting`; the error's
    /// `user_message()` is also kept in `last_error()`.
    #[instrument(skip_all, fields(method = %fields.method(), attempt = %Uuid::new_v4()))]
    pub async fn submit(
        &mut self,
        fields: PaymentFields,
        cart: &mut CartStore,
    ) -> PaymentResult<SubmitOutcome> {
        self.reset();

        let result = self.dispatch(fields, cart).await;
        self.settle(result)
    }

    /// Simple payment form, step one: `otp/send` with the card number only.
    /// The backend resolves the registered mobile itself.
    #[instrument(skip_all)]
    pub async fn request_card_otp(&mut self, card: &CardDetails) -> PaymentResult<OtpDispatch> {
        self.reset();

        let result = self.send_card_otp(card).await;
        self.settle(result)
    }

    /// Simple payment form, step two: confirm the code, then charge the
    /// whole-rupee cart total through `transactions/process`.
    ///
    /// A code accepted once is not sent again if only the charge failed.
    #[instrument(skip_all)]
    pub async fn pay_with_card_otp(
        &mut self,
        card: &CardDetails,
        otp: &str,
        cart: &mut CartStore,
    ) -> PaymentResult<OrderRecord> {
        self.last_error = None;

        let result = self.confirm_card_otp(card, otp, cart).await;
        self.settle(result)
    }

    fn settle<T>(&mut self, result: PaymentResult<T>) -> PaymentResult<T> {
        if let Err(e) = &result {
            warn!("Checkout failed at {:?}: {}", self.stage, e);
            self.stage = match self.card_otp {
                Some(_) => CheckoutStage::OtpSent,
                None => CheckoutStage::Collecting,
            };
            self.last_error = Some(e.user_message());
        }
        result
    }

    async fn dispatch(
        &mut self,
        fields: PaymentFields,
        cart: &mut CartStore,
    ) -> PaymentResult<SubmitOutcome> {
        if cart.is_empty() {
            return Err(PaymentError::validation("Your cart is empty."));
        }
        let amount = cart.total(self.config.amount_policy);

        match fields {
            PaymentFields::Card(card) => {
                let today = Local::now().date_naive();
                self.pay_by_card(&card, cart, amount, today).await
            }
            PaymentFields::Upi { upi_id, user_agent } => {
                self.pay_by_upi(&upi_id, &user_agent, cart, amount).await
            }
            PaymentFields::Netbanking { bank_code } => {
                self.pay_by_netbanking(&bank_code, cart, amount).await
            }
            PaymentFields::Wallet => Err(PaymentError::DeadPath(
                "Wallet payments are not available yet".to_string(),
            )),
        }
    }

    async fn pay_by_card(
        &mut self,
        card: &CardDetails,
        cart: &CartStore,
        amount: Price,
        today: NaiveDate,
    ) -> PaymentResult<SubmitOutcome> {
        let number = card.normalized_number()?;
        card.check_expiry(today)?;

        self.stage = CheckoutStage::FetchingMobile;
        debug!("Looking up mobile for {:?} card", card.brand());
        let mobile = self.gateway.lookup_mobile(&number).await.map_err(|e| {
            warn!("Mobile lookup failed for {}: {}", mask_card_number(&number), e);
            PaymentError::rejected("card/get-mobile-number", MOBILE_FETCH_FAILED)
        })?;

        let request = OtpSendRequest::Checkout {
            card_number: number,
            mobile_number: mobile.clone(),
            transaction_amount: amount.fixed2(),
            merchant_name: self.config.merchant_name.clone(),
        };

        self.stage = CheckoutStage::QuantumHandshake;
        self.encryption.handshake().await?;
        let sealed = self.encryption.encrypt(&serde_json::to_string(&request)?).await?;
        debug!(
            provider = self.encryption.provider_name(),
            bytes = sealed.len(),
            "Payload sealed"
        );

        self.stage = CheckoutStage::OtpDispatch;
        let dispatch = self.gateway.send_otp(&request).await.map_err(|e| {
            warn!("OTP dispatch failed: {}", e);
            PaymentError::rejected("otp/send", OTP_DISPATCH_FAILED)
        })?;
        let transaction_id = dispatch
            .transaction_id
            .clone()
            .ok_or_else(|| PaymentError::rejected("otp/send", OTP_DISPATCH_FAILED))?;

        let mut pending = PendingTransaction::new(
            transaction_id,
            dispatch.mobile_number.clone().unwrap_or(mobile),
            amount,
        );
        pending.order_id = dispatch.order_id.clone();
        pending.delivery_date = dispatch.delivery_date();
        self.sessions.record_pending(&pending, &cart.snapshot()).await?;
        info!("OTP sent for transaction {}", pending.transaction_id);

        self.stage = CheckoutStage::AwaitingBankRedirect;
        sleep(self.config.latency.bank_redirect).await;

        Ok(SubmitOutcome::OtpRequired(pending))
    }

    async fn pay_by_upi(
        &mut self,
        upi_id: &str,
        user_agent: &str,
        cart: &mut CartStore,
        amount: Price,
    ) -> PaymentResult<SubmitOutcome> {
        let upi_id = upi_id.trim();
        if !is_valid_upi_id(upi_id) {
            return Err(PaymentError::validation("Invalid UPI ID"));
        }

        let url = build_upi_url(
            upi_id,
            &self.config.payee_name,
            &self.config.payment_note,
            amount,
        );
        let handoff = UpiHandoff::for_user_agent(user_agent, url);
        self.stage = CheckoutStage::UpiHandoff;
        info!("UPI hand-off via {:?}", handoff);

        if !self.config.sandbox {
            return Ok(SubmitOutcome::UpiHandoff {
                handoff,
                simulated_order: None,
            });
        }

        sleep(self.config.latency.upi_sandbox).await;
        let order = self
            .complete(cart, SIMULATED_TRANSACTION_ID.to_string(), None, amount)
            .await?;
        Ok(SubmitOutcome::UpiHandoff {
            handoff,
            simulated_order: Some(order),
        })
    }

    async fn pay_by_netbanking(
        &mut self,
        bank_code: &str,
        cart: &mut CartStore,
        amount: Price,
    ) -> PaymentResult<SubmitOutcome> {
        let bank_code = bank_code.trim();
        if bank_code.is_empty() {
            return Err(PaymentError::validation("Please select a bank"));
        }

        self.stage = CheckoutStage::Processing;
        let request =
            ProcessPaymentRequest::new(amount.as_decimal(), PaymentMethod::Netbanking)
                .with_bank(bank_code);
        let gateway = &self.gateway;
        let processed = with_retry(&self.config.retry, PaymentError::is_retryable, || {
            gateway.process_payment(&request)
        })
        .await?;

        let transaction_id = processed
            .transaction_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let order = self
            .complete(cart, transaction_id, processed.delivery_date(), amount)
            .await?;
        Ok(SubmitOutcome::Completed(order))
    }

    async fn send_card_otp(&mut self, card: &CardDetails) -> PaymentResult<OtpDispatch> {
        let number = card.normalized_number()?;

        self.stage = CheckoutStage::OtpDispatch;
        let request = OtpSendRequest::CardOnly {
            card_number: number,
        };
        let dispatch = self.gateway.send_otp(&request).await.map_err(|e| {
            warn!("OTP dispatch failed: {}", e);
            PaymentError::rejected("otp/send", OTP_DISPATCH_FAILED)
        })?;
        if dispatch.transaction_id.is_none() || dispatch.mobile_number.is_none() {
            return Err(PaymentError::rejected("otp/send", OTP_DISPATCH_FAILED));
        }

        info!("OTP sent for card {}", mask_card_number(&card.number));
        self.card_otp = Some(CardOtp {
            dispatch: dispatch.clone(),
            verified: false,
        });
        self.stage = CheckoutStage::OtpSent;
        Ok(dispatch)
    }

    async fn confirm_card_otp(
        &mut self,
        card: &CardDetails,
        otp: &str,
        cart: &mut CartStore,
    ) -> PaymentResult<OrderRecord> {
        let Some(card_otp) = self.card_otp.clone() else {
            return Err(PaymentError::validation(OTP_NOT_VERIFIED));
        };
        if cart.is_empty() {
            return Err(PaymentError::validation("Your cart is empty."));
        }
        let number = card.normalized_number()?;
        card.check_expiry(Local::now().date_naive())?;

        let dispatch = card_otp.dispatch;
        if !card_otp.verified {
            let otp = otp.trim();
            if otp.is_empty() {
                return Err(PaymentError::validation("Enter OTP to verify"));
            }

            self.stage = CheckoutStage::Processing;
            let request = OtpVerifyRequest {
                transaction_id: dispatch.transaction_id.clone().unwrap_or_default(),
                mobile_number: dispatch.mobile_number.clone().unwrap_or_default(),
                otp: otp.to_string(),
            };
            self.gateway.verify_otp(&request).await.map_err(|e| match e {
                PaymentError::RemoteRejection { message, .. } if !message.trim().is_empty() => {
                    PaymentError::rejected("otp/verify", message)
                }
                other => {
                    warn!("OTP verification failed: {}", other);
                    PaymentError::rejected("otp/verify", "Invalid OTP")
                }
            })?;
            self.card_otp = Some(CardOtp {
                dispatch: dispatch.clone(),
                verified: true,
            });
        }

        self.stage = CheckoutStage::Processing;
        let amount = cart.total(AmountPolicy::Floored);
        let request =
            ProcessPaymentRequest::new(amount.as_decimal(), PaymentMethod::Card).with_card(number);
        let gateway = &self.gateway;
        let processed = with_retry(&self.config.retry, PaymentError::is_retryable, || {
            gateway.process_payment(&request)
        })
        .await?;
        self.card_otp = None;

        let transaction_id = processed
            .transaction_id
            .clone()
            .or(dispatch.transaction_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.complete(cart, transaction_id, processed.delivery_date(), amount)
            .await
    }

    /// Persist the order, issue the receipt and empty the cart
    async fn complete(
        &mut self,
        cart: &mut CartStore,
        transaction_id: String,
        delivery_date: Option<NaiveDate>,
        amount: Price,
    ) -> PaymentResult<OrderRecord> {
        let order =
            OrderRecord::new(cart.snapshot(), transaction_id).with_delivery_date(delivery_date);
        self.sessions.record_order(&order).await?;
        // An abandoned card attempt must not be picked up by a later OTP step
        self.sessions.clear_pending().await?;

        if let Err(e) = self
            .receipts
            .generate(&Receipt::new(&order.transaction_id, amount))
            .await
        {
            warn!("Receipt generation failed: {}", e);
        }

        cart.clear();
        self.stage = CheckoutStage::Completed;
        info!("Order completed: {}", order.transaction_id);
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ProcessedPayment;
    use crate::product::Product;
    use crate::session::{InMemorySessionStore, SessionStore};
    use crate::test_support::{cart_of_two, dispatch, ScriptedGateway};
    use chrono::Datelike;

    const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Chrome/126.0";

    type Parts = (
        Arc<ScriptedGateway>,
        Arc<InMemorySessionStore>,
        CheckoutOrchestrator,
    );

    fn setup(config: CheckoutConfig) -> Parts {
        let gateway = Arc::new(ScriptedGateway::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let orchestrator = CheckoutOrchestrator::new(gateway.clone(), sessions.clone(), config);
        (gateway, sessions, orchestrator)
    }

    fn valid_card() -> CardDetails {
        let next_year = (Local::now().year() + 1) % 100;
        let year = format!("{:02}", next_year);
        CardDetails::new("4111 1111 1111 1111", "A Shopper", "12", year, "123")
    }

    #[tokio::test]
    async fn test_card_flow_persists_pending() {
        let (gateway, sessions, mut checkout) = setup(CheckoutConfig::instant());
        gateway.push_mobile(Ok("9876543210".into()));
        gateway.push_dispatch(Ok(dispatch("TXN-42", "9876543210")));
        let mut cart = cart_of_two();

        let outcome = checkout.submit(PaymentFields::Card(valid_card()), &mut cart).await.unwrap();

        let SubmitOutcome::OtpRequired(pending) = outcome else {
            panic!("expected OTP step");
        };
        assert_eq!(pending.transaction_id, "TXN-42");
        assert_eq!(pending.amount, Price::rupees(200));
        assert_eq!(checkout.stage(), CheckoutStage::AwaitingBankRedirect);

        let session = sessions.load().await.unwrap();
        assert_eq!(session.pending, Some(pending));
        assert_eq!(session.purchased_items, cart.snapshot());
        // Cart is emptied only once the OTP is accepted
        assert_eq!(cart.item_count(), 2);

        let sends = gateway.otp_sends.lock().unwrap();
        assert_eq!(
            sends[0],
            OtpSendRequest::Checkout {
                card_number: "4111111111111111".into(),
                mobile_number: "9876543210".into(),
                transaction_amount: "200.00".into(),
                merchant_name: "ShopFusion".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_flow_waits_for_bank_redirect() {
        let (gateway, _, mut checkout) = setup(CheckoutConfig::default());
        gateway.push_mobile(Ok("9876543210".into()));
        gateway.push_dispatch(Ok(dispatch("TXN-42", "9876543210")));
        let mut cart = cart_of_two();

        let start = tokio::time::Instant::now();
        checkout.submit(PaymentFields::Card(valid_card()), &mut cart).await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_invalid_card_makes_no_calls() {
        let (gateway, _, mut checkout) = setup(CheckoutConfig::instant());
        let mut cart = cart_of_two();

        let mut card = valid_card();
        card.number = "4111 1111 1111".into();
        let err = checkout.submit(PaymentFields::Card(card), &mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid Card Number");

        let mut card = valid_card();
        card.expiry_year = "01".into();
        let err = checkout.submit(PaymentFields::Card(card), &mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), "Card is expired or invalid");

        assert_eq!(gateway.total_calls(), 0);
        assert_eq!(checkout.stage(), CheckoutStage::Collecting);
    }

    #[tokio::test]
    async fn test_mobile_lookup_failure_rolls_back() {
        let (gateway, sessions, mut checkout) = setup(CheckoutConfig::instant());
        gateway.push_mobile(Err(PaymentError::rejected(
            "card/get-mobile-number",
            "Card not found",
        )));
        let mut cart = cart_of_two();

        let err = checkout.submit(PaymentFields::Card(valid_card()), &mut cart).await.unwrap_err();

        assert_eq!(err.user_message(), MOBILE_FETCH_FAILED);
        assert_eq!(checkout.last_error(), Some(MOBILE_FETCH_FAILED));
        assert_eq!(checkout.stage(), CheckoutStage::Collecting);
        assert_eq!(gateway.calls("otp/send"), 0);
        assert!(sessions.pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_otp_dispatch_failure_persists_nothing() {
        let (gateway, sessions, mut checkout) = setup(CheckoutConfig::instant());
        gateway.push_mobile(Ok("9876543210".into()));
        gateway.push_dispatch(Err(PaymentError::Transport("timeout".into())));
        let mut cart = cart_of_two();

        let err = checkout.submit(PaymentFields::Card(valid_card()), &mut cart).await.unwrap_err();

        assert_eq!(err.user_message(), OTP_DISPATCH_FAILED);
        // Never retried
        assert_eq!(gateway.calls("otp/send"), 1);
        assert_eq!(sessions.load().await.unwrap(), Default::default());
        assert_eq!(checkout.stage(), CheckoutStage::Collecting);
    }

    #[tokio::test]
    async fn test_upi_desktop_shows_qr_without_calls() {
        let (gateway, sessions, mut checkout) =
            setup(CheckoutConfig::instant().with_sandbox(false));
        let mut cart = cart_of_two();

        let outcome = checkout
            .submit(
                PaymentFields::Upi {
                    upi_id: "shopper@okbank".into(),
                    user_agent: DESKTOP_UA.into(),
                },
                &mut cart,
            )
            .await
            .unwrap();

        let SubmitOutcome::UpiHandoff { handoff, simulated_order } = outcome else {
            panic!("expected UPI hand-off");
        };
        assert!(matches!(handoff, UpiHandoff::QrCode(_)));
        assert!(handoff.url().contains("am=200.00"));
        assert!(simulated_order.is_none());
        assert_eq!(gateway.total_calls(), 0);
        assert_eq!(sessions.load().await.unwrap(), Default::default());
        assert_eq!(checkout.stage(), CheckoutStage::UpiHandoff);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upi_sandbox_completes_after_delay() {
        let (gateway, sessions, mut checkout) = setup(CheckoutConfig::default());
        let mut cart = cart_of_two();
        let items = cart.snapshot();

        let start = tokio::time::Instant::now();
        let outcome = checkout
            .submit(
                PaymentFields::Upi {
                    upi_id: "shopper@okbank".into(),
                    user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)".into(),
                },
                &mut cart,
            )
            .await
            .unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(1500));

        let SubmitOutcome::UpiHandoff { handoff, simulated_order } = outcome else {
            panic!("expected UPI hand-off");
        };
        assert!(matches!(handoff, UpiHandoff::DeepLink(_)));
        let order = simulated_order.unwrap();
        assert_eq!(order.transaction_id, SIMULATED_TRANSACTION_ID);
        assert_eq!(order.items, items);
        assert_eq!(sessions.order().await.unwrap(), Some(order));
        assert!(cart.is_empty());
        assert_eq!(gateway.total_calls(), 0);
        assert_eq!(checkout.stage(), CheckoutStage::Completed);
    }

    #[tokio::test]
    async fn test_upi_requires_at_sign() {
        let (_, _, mut checkout) = setup(CheckoutConfig::instant());
        let mut cart = cart_of_two();
        let err = checkout
            .submit(
                PaymentFields::Upi {
                    upi_id: "shopper".into(),
                    user_agent: DESKTOP_UA.into(),
                },
                &mut cart,
            )
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Invalid UPI ID");
    }

    #[tokio::test]
    async fn test_upi_id_cannot_carry_query_parameters() {
        let (gateway, sessions, mut checkout) =
            setup(CheckoutConfig::instant().with_sandbox(false));
        let mut cart = cart_of_two();

        let err = checkout
            .submit(
                PaymentFields::Upi {
                    upi_id: "evil@bank&am=1.00&pn=Other".into(),
                    user_agent: DESKTOP_UA.into(),
                },
                &mut cart,
            )
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Invalid UPI ID");
        assert_eq!(checkout.stage(), CheckoutStage::Collecting);
        assert_eq!(gateway.total_calls(), 0);
        assert_eq!(sessions.load().await.unwrap(), Default::default());
    }

    #[tokio::test]
    async fn test_completion_drops_abandoned_card_attempt() {
        let (gateway, sessions, mut checkout) = setup(CheckoutConfig::instant());
        gateway.push_mobile(Ok("9876543210".into()));
        gateway.push_dispatch(Ok(dispatch("TXN-CARD", "9876543210")));
        let mut cart = cart_of_two();
        checkout.submit(PaymentFields::Card(valid_card()), &mut cart).await.unwrap();
        assert!(sessions.pending().await.unwrap().is_some());

        // Shopper walks away from the OTP step and pays by net banking
        gateway.push_payment(Ok(ProcessedPayment {
            transaction_id: Some("NB-1".into()),
            delivery_date: None,
        }));
        checkout
            .submit(PaymentFields::Netbanking { bank_code: "SBI456".into() }, &mut cart)
            .await
            .unwrap();

        let session = sessions.load().await.unwrap();
        assert!(session.pending.is_none());
        assert!(session.purchased_items.is_empty());
        assert_eq!(session.order.unwrap().transaction_id, "NB-1");
    }

    #[tokio::test]
    async fn test_netbanking_retries_transport_errors() {
        let (gateway, sessions, mut checkout) = setup(CheckoutConfig::instant());
        gateway.push_payment(Err(PaymentError::Transport("reset".into())));
        gateway.push_payment(Err(PaymentError::Transport("reset".into())));
        gateway.push_payment(Ok(ProcessedPayment {
            transaction_id: Some("NB-7".into()),
            delivery_date: Some("2026-10-25".into()),
        }));
        let mut cart = cart_of_two();

        let outcome = checkout
            .submit(PaymentFields::Netbanking { bank_code: "SBI456".into() }, &mut cart)
            .await
            .unwrap();

        let SubmitOutcome::Completed(order) = outcome else {
            panic!("expected completed order");
        };
        assert_eq!(order.transaction_id, "NB-7");
        assert_eq!(order.delivery_date, NaiveDate::from_ymd_opt(2026, 10, 25));
        assert_eq!(gateway.calls("transactions/process"), 3);
        assert_eq!(gateway.processed.lock().unwrap()[0].bank_code, "SBI456");
        assert_eq!(sessions.order().await.unwrap(), Some(order));
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_netbanking_rejection_is_final() {
        let (gateway, sessions, mut checkout) = setup(CheckoutConfig::instant());
        gateway.push_payment(Err(PaymentError::rejected(
            "transactions/process",
            "High-Risk Transaction!",
        )));
        let mut cart = cart_of_two();

        let err = checkout
            .submit(PaymentFields::Netbanking { bank_code: "SBI456".into() }, &mut cart)
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "High-Risk Transaction!");
        assert_eq!(gateway.calls("transactions/process"), 1);
        assert!(sessions.order().await.unwrap().is_none());
        assert_eq!(cart.item_count(), 2);
    }

    #[tokio::test]
    async fn test_netbanking_requires_bank() {
        let (gateway, _, mut checkout) = setup(CheckoutConfig::instant());
        let mut cart = cart_of_two();
        let err = checkout
            .submit(PaymentFields::Netbanking { bank_code: " ".into() }, &mut cart)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Please select a bank");
        assert_eq!(gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_wallet_and_empty_cart() {
        let (_, _, mut checkout) = setup(CheckoutConfig::instant());

        let mut cart = cart_of_two();
        let err = checkout.submit(PaymentFields::Wallet, &mut cart).await.unwrap_err();
        assert!(matches!(err, PaymentError::DeadPath(_)));

        let mut empty = CartStore::new();
        let err = checkout.submit(PaymentFields::Wallet, &mut empty).await.unwrap_err();
        assert_eq!(err.user_message(), "Your cart is empty.");
    }

    #[tokio::test]
    async fn test_floored_amount_policy() {
        let (gateway, _, mut checkout) =
            setup(CheckoutConfig::instant().with_amount_policy(AmountPolicy::Floored));
        gateway.push_payment(Ok(ProcessedPayment::default()));
        let mut cart = smart_plug_cart();

        checkout
            .submit(PaymentFields::Netbanking { bank_code: "hdfc".into() }, &mut cart)
            .await
            .unwrap();

        assert_eq!(gateway.processed.lock().unwrap()[0].amount, 799.0);
    }

    fn smart_plug_cart() -> CartStore {
        let mut cart = CartStore::new();
        cart.add(&Product::new(1, "Smart Plug", Price::new(799.75, Default::default())));
        cart
    }

    #[tokio::test]
    async fn test_simple_form_card_payment() {
        let (gateway, sessions, mut checkout) = setup(CheckoutConfig::instant());
        gateway.push_dispatch(Ok(dispatch("TXN-S", "9876543210")));
        let mut cart = smart_plug_cart();
        let card = valid_card();

        let sent = checkout.request_card_otp(&card).await.unwrap();
        assert_eq!(sent.transaction_id.as_deref(), Some("TXN-S"));
        assert_eq!(checkout.stage(), CheckoutStage::OtpSent);
        assert_eq!(
            gateway.otp_sends.lock().unwrap()[0],
            OtpSendRequest::CardOnly {
                card_number: "4111111111111111".into()
            }
        );
        assert_eq!(gateway.calls("card/get-mobile-number"), 0);

        gateway.push_verify(Err(PaymentError::rejected("otp/verify", "Invalid OTP")));
        let err = checkout.pay_with_card_otp(&card, "000000", &mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid OTP");
        assert_eq!(checkout.stage(), CheckoutStage::OtpSent);
        assert_eq!(gateway.calls("transactions/process"), 0);

        gateway.push_verify(Ok(()));
        gateway.push_payment(Ok(ProcessedPayment {
            transaction_id: Some("CARD-9".into()),
            delivery_date: None,
        }));
        let order = checkout.pay_with_card_otp(&card, " 123456 ", &mut cart).await.unwrap();

        assert_eq!(order.transaction_id, "CARD-9");
        let verifies = gateway.otp_verifies.lock().unwrap().clone();
        assert_eq!(verifies[1].otp, "123456");
        assert_eq!(verifies[1].transaction_id, "TXN-S");
        let processed = gateway.processed.lock().unwrap()[0].clone();
        assert_eq!(processed.amount, 799.0);
        assert_eq!(processed.payment_method, PaymentMethod::Card);
        assert_eq!(processed.card_number, "4111111111111111");
        assert_eq!(sessions.order().await.unwrap(), Some(order));
        assert!(cart.is_empty());
        assert_eq!(checkout.stage(), CheckoutStage::Completed);
    }

    #[tokio::test]
    async fn test_simple_form_requires_sent_code() {
        let (gateway, _, mut checkout) = setup(CheckoutConfig::instant());
        let mut cart = cart_of_two();

        let err = checkout
            .pay_with_card_otp(&valid_card(), "123456", &mut cart)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), OTP_NOT_VERIFIED);
        assert_eq!(checkout.stage(), CheckoutStage::Collecting);

        gateway.push_dispatch(Ok(dispatch("TXN-S", "9876543210")));
        checkout.request_card_otp(&valid_card()).await.unwrap();
        let err = checkout.pay_with_card_otp(&valid_card(), "  ", &mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), "Enter OTP to verify");
        assert_eq!(gateway.calls("otp/verify"), 0);
    }

    #[tokio::test]
    async fn test_simple_form_dispatch_without_transaction() {
        let (gateway, _, mut checkout) = setup(CheckoutConfig::instant());
        let mut reply = dispatch("TXN-S", "9876543210");
        reply.transaction_id = None;
        gateway.push_dispatch(Ok(reply));

        let err = checkout.request_card_otp(&valid_card()).await.unwrap_err();
        assert_eq!(err.user_message(), OTP_DISPATCH_FAILED);
        assert_eq!(checkout.stage(), CheckoutStage::Collecting);
    }

    #[tokio::test]
    async fn test_simple_form_verifies_code_once() {
        let (gateway, _, mut checkout) = setup(CheckoutConfig::instant());
        gateway.push_dispatch(Ok(dispatch("TXN-S", "9876543210")));
        let mut cart = cart_of_two();
        let card = valid_card();
        checkout.request_card_otp(&card).await.unwrap();

        gateway.push_verify(Ok(()));
        gateway.push_payment(Err(PaymentError::rejected(
            "transactions/process",
            "High-Risk Transaction!",
        )));
        let err = checkout.pay_with_card_otp(&card, "123456", &mut cart).await.unwrap_err();
        assert_eq!(err.user_message(), "High-Risk Transaction!");
        assert_eq!(checkout.last_error(), Some("High-Risk Transaction!"));
        assert_eq!(checkout.stage(), CheckoutStage::OtpSent);

        gateway.push_payment(Ok(ProcessedPayment::default()));
        let order = checkout.pay_with_card_otp(&card, "123456", &mut cart).await.unwrap();

        // Falls back to the dispatch's transaction id
        assert_eq!(order.transaction_id, "TXN-S");
        assert_eq!(gateway.calls("otp/verify"), 1);
        assert_eq!(gateway.calls("transactions/process"), 2);
    }
}
