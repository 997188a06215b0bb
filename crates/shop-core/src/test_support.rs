//! Scripted gateway and fixtures shared by the unit tests.

use crate::cart::CartStore;
use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{
    Bank, OtpDispatch, OtpSendRequest, OtpVerifyRequest, PaymentGateway, ProcessPaymentRequest,
    ProcessedPayment,
};
use crate::product::{Price, Product};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Gateway that replays queued responses and records every request.
/// An empty queue answers with a transport error.
#[derive(Default)]
pub struct ScriptedGateway {
    banks: Mutex<VecDeque<PaymentResult<Vec<Bank>>>>,
    mobiles: Mutex<VecDeque<PaymentResult<String>>>,
    dispatches: Mutex<VecDeque<PaymentResult<OtpDispatch>>>,
    verifications: Mutex<VecDeque<PaymentResult<()>>>,
    payments: Mutex<VecDeque<PaymentResult<ProcessedPayment>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    pub otp_sends: Mutex<Vec<OtpSendRequest>>,
    pub otp_verifies: Mutex<Vec<OtpVerifyRequest>>,
    pub processed: Mutex<Vec<ProcessPaymentRequest>>,
}

fn next<T>(queue: &Mutex<VecDeque<PaymentResult<T>>>) -> PaymentResult<T> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(PaymentError::Transport("no scripted response".into())))
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_banks(&self, r: PaymentResult<Vec<Bank>>) {
        self.banks.lock().unwrap().push_back(r);
    }

    pub fn push_mobile(&self, r: PaymentResult<String>) {
        self.mobiles.lock().unwrap().push_back(r);
    }

    pub fn push_dispatch(&self, r: PaymentResult<OtpDispatch>) {
        self.dispatches.lock().unwrap().push_back(r);
    }

    pub fn push_verify(&self, r: PaymentResult<()>) {
        self.verifications.lock().unwrap().push_back(r);
    }

    pub fn push_payment(&self, r: PaymentResult<ProcessedPayment>) {
        self.payments.lock().unwrap().push_back(r);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn hit(&self, endpoint: &'static str) {
        *self.calls.lock().unwrap().entry(endpoint).or_default() += 1;
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn list_banks(&self) -> PaymentResult<Vec<Bank>> {
        self.hit("banks/list");
        next(&self.banks)
    }

    async fn lookup_mobile(&self, _card_number: &str) -> PaymentResult<String> {
        self.hit("card/get-mobile-number");
        next(&self.mobiles)
    }

    async fn send_otp(&self, request: &OtpSendRequest) -> PaymentResult<OtpDispatch> {
        self.hit("otp/send");
        self.otp_sends.lock().unwrap().push(request.clone());
        next(&self.dispatches)
    }

    async fn verify_otp(&self, request: &OtpVerifyRequest) -> PaymentResult<()> {
        self.hit("otp/verify");
        self.otp_verifies.lock().unwrap().push(request.clone());
        next(&self.verifications)
    }

    async fn process_payment(
        &self,
        request: &ProcessPaymentRequest,
    ) -> PaymentResult<ProcessedPayment> {
        self.hit("transactions/process");
        self.processed.lock().unwrap().push(request.clone());
        next(&self.payments)
    }

    fn gateway_name(&self) -> &'static str {
        "scripted"
    }
}

/// Dispatch response as the backend sends it
pub fn dispatch(transaction_id: &str, mobile: &str) -> OtpDispatch {
    OtpDispatch {
        mobile_number: Some(mobile.to_string()),
        transaction_id: Some(transaction_id.to_string()),
        order_id: None,
        delivery_date: None,
    }
}

/// Cart holding product 1 at ₹100 × 2
pub fn cart_of_two() -> CartStore {
    let mut cart = CartStore::new();
    let product = Product::new(1, "Amazon Echo Dot (5th Gen)", Price::rupees(100));
    cart.add(&product);
    cart.add(&product);
    cart
}
