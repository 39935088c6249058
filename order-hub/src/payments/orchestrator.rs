use chrono::Duration;
use serde_json::{Value, json};
use shared::order::{
    InitiatePaymentRequest, Order, OrderStatus, Payment, PaymentFilter, PaymentIntent,
    PaymentMethod, PaymentStats, PaymentStatus,
};
use shared::realtime::{PaymentNotice, ServerMessage};
use shared::util::{new_id, now_millis};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{PaymentError, PaymentResult};
use crate::audit::{AuditEntry, AuditEventType, AuditService};
use crate::config::Config;
use crate::live::EventPublisher;
use crate::orders::publish_transition;
use crate::provider::{
    CallbackData, InitiateRequest, PaymentProvider, ProviderError, ProviderInfo, ProviderRegistry,
};
use crate::store::{OrderRepository, PaymentRepository, SettleOutcome, Settlement, StoreError};

/// Values the orchestrator reads from configuration
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    pub expiry_minutes: i64,
    /// Base of the webhook URLs handed to providers
    pub app_url: String,
    /// Base of the default success/cancel redirects
    pub frontend_url: String,
    pub require_signature: bool,
}

impl PaymentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            currency: config.payment_currency.clone(),
            expiry_minutes: config.payment_expiry_minutes,
            app_url: config.app_url.trim_end_matches('/').to_string(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            require_signature: config.webhook_require_signature,
        }
    }
}

#[derive(Clone)]
pub struct PaymentDeps {
    pub payments: Arc<dyn PaymentRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub providers: ProviderRegistry,
    pub publisher: Arc<dyn EventPublisher>,
    pub audit: AuditService,
    pub settings: PaymentSettings,
}

/// What a callback (or status poll) did
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// Provider still reports the payment as pending; nothing written
    Pending(Payment),
    /// Payment was already terminal; nothing written, nothing emitted
    AlreadyProcessed(Payment),
    /// This call moved the payment to a terminal state
    Settled(Payment),
}

impl CallbackOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            CallbackOutcome::Pending(p)
            | CallbackOutcome::AlreadyProcessed(p)
            | CallbackOutcome::Settled(p) => p,
        }
    }

    pub fn into_payment(self) -> Payment {
        match self {
            CallbackOutcome::Pending(p)
            | CallbackOutcome::AlreadyProcessed(p)
            | CallbackOutcome::Settled(p) => p,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            CallbackOutcome::Pending(_) => "Payment still pending",
            CallbackOutcome::AlreadyProcessed(_) => "Payment already processed",
            CallbackOutcome::Settled(_) => "Payment processed",
        }
    }
}

pub struct PaymentOrchestrator {
    payments: Arc<dyn PaymentRepository>,
    orders: Arc<dyn OrderRepository>,
    providers: ProviderRegistry,
    publisher: Arc<dyn EventPublisher>,
    audit: AuditService,
    settings: PaymentSettings,
}

fn notice(payment: &Payment, message: Option<String>) -> PaymentNotice {
    PaymentNotice {
        payment_id: payment.id.clone(),
        order_id: payment.order_id.clone(),
        transaction_id: payment.transaction_id.clone(),
        method: payment.method,
        status: payment.status,
        amount: payment.amount,
        currency: payment.currency.clone(),
        message,
    }
}

impl PaymentOrchestrator {
    pub fn new(deps: PaymentDeps) -> Self {
        Self {
            payments: deps.payments,
            orders: deps.orders,
            providers: deps.providers,
            publisher: deps.publisher,
            audit: deps.audit,
            settings: deps.settings,
        }
    }

    // ========== 发起支付 ==========

    /// Start a provider payment for a PENDING order
    ///
    /// Nothing is persisted when the provider refuses.
    pub async fn initiate(
        &self,
        tenant_id: &str,
        order_id: &str,
        req: InitiatePaymentRequest,
        user_id: Option<&str>,
    ) -> PaymentResult<PaymentIntent> {
        let order = self
            .orders
            .find_order(tenant_id, order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;
        if order.status != OrderStatus::Pending {
            return Err(PaymentError::OrderNotPending {
                order_id: order.id,
                status: order.status,
            });
        }

        let provider = self.provider_for(req.method)?;
        if !provider.is_configured() {
            return Err(PaymentError::ProviderUnavailable(req.method));
        }

        if self
            .payments
            .find_active_payment(tenant_id, &order.id)
            .await?
            .is_some()
        {
            return Err(PaymentError::AlreadyInProgress(order.id));
        }

        let request = self.initiate_request(&order, &req);
        let response = provider.initiate(&request).await.map_err(|e| {
            tracing::warn!(
                tenant_id = %tenant_id,
                order_id = %order.id,
                provider = %req.method,
                error = %e,
                "Payment initiation failed"
            );
            match e {
                ProviderError::NotConfigured(m) => PaymentError::ProviderUnavailable(m),
                other => PaymentError::InitiationFailed(other.to_string()),
            }
        })?;

        let now = now_millis();
        let expires_at = now + Duration::minutes(self.settings.expiry_minutes).num_milliseconds();
        let payment = Payment {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            order_id: order.id.clone(),
            method: req.method,
            amount: order.total_amount,
            currency: self.settings.currency.clone(),
            status: PaymentStatus::Pending,
            transaction_id: response.transaction_id.clone(),
            provider_reference: None,
            provider_data: json!({
                "payment_url": response.payment_url,
                "success_url": request.success_url,
                "cancel_url": request.cancel_url,
                "webhook_url": request.webhook_url,
                "expires_at": expires_at,
            }),
            expires_at,
            created_at: now,
            updated_at: now,
        };

        match self.payments.insert_payment(&payment).await {
            Ok(()) => {}
            Err(StoreError::ActivePaymentExists(id)) => {
                tracing::info!(
                    tenant_id = %tenant_id,
                    order_id = %id,
                    transaction_id = %payment.transaction_id,
                    "Concurrent initiation lost, discarding provider intent"
                );
                return Err(PaymentError::AlreadyInProgress(id));
            }
            Err(StoreError::DuplicateTransaction(tx)) => {
                return Err(PaymentError::InitiationFailed(format!(
                    "provider reused transaction id {tx}"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            tenant_id = %tenant_id,
            order_id = %order.id,
            payment_id = %payment.id,
            transaction_id = %payment.transaction_id,
            provider = %payment.method,
            "Payment initiated"
        );

        self.audit.append(
            AuditEntry::new(
                tenant_id,
                AuditEventType::PaymentInitiated,
                format!("{} payment initiated for order {}", payment.method, order.order_number),
            )
            .user(user_id)
            .order(&order.id)
            .metadata(json!({
                "payment_id": payment.id,
                "transaction_id": payment.transaction_id,
                "amount": payment.amount.to_string(),
                "currency": payment.currency,
            })),
        );
        self.publisher.publish(
            tenant_id,
            ServerMessage::PaymentInitiated(notice(&payment, None)),
        );

        Ok(PaymentIntent {
            payment_id: payment.id,
            transaction_id: payment.transaction_id,
            payment_url: response.payment_url,
            expires_at,
        })
    }

    fn provider_for(&self, method: PaymentMethod) -> PaymentResult<&Arc<dyn PaymentProvider>> {
        if !method.is_provider_backed() {
            return Err(PaymentError::UnsupportedProvider(method));
        }
        self.providers
            .get(method)
            .ok_or(PaymentError::ProviderUnavailable(method))
    }

    fn initiate_request(&self, order: &Order, req: &InitiatePaymentRequest) -> InitiateRequest {
        let frontend = &self.settings.frontend_url;
        InitiateRequest {
            order_id: order.id.clone(),
            amount: order.total_amount,
            currency: self.settings.currency.clone(),
            description: format!("Order {}", order.order_number),
            customer_phone: order.customer_phone.clone(),
            success_url: req
                .success_url
                .clone()
                .unwrap_or_else(|| format!("{frontend}/payment/success?order_id={}", order.id)),
            cancel_url: req
                .cancel_url
                .clone()
                .unwrap_or_else(|| format!("{frontend}/payment/cancel?order_id={}", order.id)),
            webhook_url: format!(
                "{}/payments/webhooks/{}",
                self.settings.app_url,
                req.method.slug()
            ),
        }
    }

    // ========== 回调对账 ==========

    /// Header the provider puts its webhook signature in
    pub fn signature_header(&self, provider_slug: &str) -> Option<&'static str> {
        self.providers
            .by_slug(provider_slug)
            .map(|p| p.signature_header())
    }

    /// Verify, parse and settle a provider webhook
    pub async fn handle_callback(
        &self,
        provider_slug: &str,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<CallbackOutcome> {
        let provider = self
            .providers
            .by_slug(provider_slug)
            .ok_or_else(|| PaymentError::UnknownProvider(provider_slug.to_string()))?;

        let payload: Value = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

        match signature.map(str::trim).filter(|s| !s.is_empty()) {
            Some(sig) => {
                if !provider.verify_signature(raw_body, &payload, sig) {
                    tracing::warn!(provider = %provider.method(), "Webhook signature mismatch");
                    return Err(PaymentError::InvalidSignature);
                }
            }
            None if self.settings.require_signature => {
                tracing::warn!(provider = %provider.method(), "Unsigned webhook rejected");
                return Err(PaymentError::MissingSignature);
            }
            None => {
                tracing::debug!(provider = %provider.method(), "Accepting unsigned webhook");
            }
        }

        let callback = provider.parse_callback(&payload)?;
        self.settle_callback(callback).await
    }

    /// Development helper: a canonical unsigned body routed through the same
    /// settlement path
    ///
    /// Fields: `transaction_id`, `status`, optional `order_id`,
    /// `provider_reference`, `message`.
    pub async fn handle_test_callback(
        &self,
        provider_slug: &str,
        payload: &Value,
    ) -> PaymentResult<CallbackOutcome> {
        let provider = self
            .providers
            .by_slug(provider_slug)
            .ok_or_else(|| PaymentError::UnknownProvider(provider_slug.to_string()))?;

        let transaction_id = payload["transaction_id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PaymentError::InvalidPayload("missing transaction_id".into()))?;
        let raw_status = payload["status"].as_str().unwrap_or_default();
        let status = raw_status
            .parse::<PaymentStatus>()
            .unwrap_or_else(|_| provider.map_status(raw_status));
        let text = |key: &str| payload[key].as_str().map(str::to_string);

        let callback = CallbackData {
            transaction_id: transaction_id.to_string(),
            order_id: text("order_id"),
            status,
            provider_reference: text("provider_reference"),
            message: text("message"),
            raw: payload.clone(),
        };
        self.settle_callback(callback).await
    }

    async fn settle_callback(&self, callback: CallbackData) -> PaymentResult<CallbackOutcome> {
        let payment = self
            .payments
            .find_by_transaction(&callback.transaction_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    transaction_id = %callback.transaction_id,
                    "Callback for unknown transaction"
                );
                PaymentError::PaymentNotFound(callback.transaction_id.clone())
            })?;

        if let Some(order_id) = callback.order_id.as_deref()
            && order_id != payment.order_id
        {
            tracing::warn!(
                transaction_id = %payment.transaction_id,
                expected = %payment.order_id,
                received = %order_id,
                "Callback order reference differs from the payment"
            );
        }

        if callback.status == PaymentStatus::Pending {
            if payment.status.is_terminal() {
                return Ok(CallbackOutcome::AlreadyProcessed(payment));
            }
            tracing::debug!(transaction_id = %payment.transaction_id, "Payment still pending");
            return Ok(CallbackOutcome::Pending(payment));
        }

        let settlement = Settlement {
            transaction_id: callback.transaction_id,
            status: callback.status,
            provider_reference: callback.provider_reference,
            callback_data: callback.raw,
            processed_at: now_millis(),
        };
        self.settle(settlement, callback.message).await
    }

    /// Apply a terminal outcome and emit its events exactly once
    async fn settle(
        &self,
        settlement: Settlement,
        message: Option<String>,
    ) -> PaymentResult<CallbackOutcome> {
        let outcome = match self.payments.settle(&settlement).await {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound(_)) => {
                return Err(PaymentError::PaymentNotFound(settlement.transaction_id));
            }
            Err(e) => return Err(e.into()),
        };

        let (payment, order, transitions) = match outcome {
            SettleOutcome::AlreadySettled(payment) => {
                tracing::info!(
                    transaction_id = %payment.transaction_id,
                    status = %payment.status,
                    "Duplicate callback ignored"
                );
                return Ok(CallbackOutcome::AlreadyProcessed(payment));
            }
            SettleOutcome::Applied {
                payment,
                order,
                transitions,
            } => (payment, order, transitions),
        };

        let tenant_id = payment.tenant_id.as_str();
        tracing::info!(
            tenant_id = %tenant_id,
            order_id = %payment.order_id,
            transaction_id = %payment.transaction_id,
            status = %payment.status,
            "Payment settled"
        );

        if payment.status == PaymentStatus::Success {
            if let Some(order) = &order
                && order.status == OrderStatus::Cancelled
            {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    order_id = %order.id,
                    transaction_id = %payment.transaction_id,
                    "Payment succeeded for a cancelled order, needs operator attention"
                );
            }

            self.audit.append(
                AuditEntry::new(
                    tenant_id,
                    AuditEventType::PaymentSucceeded,
                    format!("Payment {} succeeded", payment.transaction_id),
                )
                .order(&payment.order_id)
                .metadata(json!({
                    "payment_id": payment.id,
                    "amount": payment.amount.to_string(),
                    "provider_reference": payment.provider_reference,
                    "order_status": order.as_ref().map(|o| o.status),
                    "transitions": transitions.len(),
                })),
            );
            self.publisher.publish(
                tenant_id,
                ServerMessage::PaymentSuccess(notice(&payment, message)),
            );
            if let Some(order) = &order {
                for change in &transitions {
                    publish_transition(self.publisher.as_ref(), order, change);
                }
            }
        } else {
            self.audit.append(
                AuditEntry::new(
                    tenant_id,
                    AuditEventType::PaymentFailed,
                    format!("Payment {} ended {}", payment.transaction_id, payment.status),
                )
                .order(&payment.order_id)
                .metadata(json!({
                    "payment_id": payment.id,
                    "status": payment.status,
                    "message": message,
                })),
            );
            self.publisher.publish(
                tenant_id,
                ServerMessage::PaymentFailed(notice(&payment, message)),
            );
        }

        Ok(CallbackOutcome::Settled(payment))
    }

    /// Poll the provider and settle a still-pending payment
    pub async fn reconcile(&self, tenant_id: &str, payment_id: &str) -> PaymentResult<Payment> {
        let payment = self.get_payment(tenant_id, payment_id).await?;
        if payment.status.is_terminal() {
            return Ok(payment);
        }

        let provider = self.provider_for(payment.method)?;
        let check = provider.check_status(&payment.transaction_id).await?;
        if check.status == PaymentStatus::Pending {
            return Ok(payment);
        }

        let outcome = self
            .settle(
                Settlement {
                    transaction_id: payment.transaction_id.clone(),
                    status: check.status,
                    provider_reference: check.provider_reference,
                    callback_data: check.raw,
                    processed_at: now_millis(),
                },
                None,
            )
            .await?;
        Ok(outcome.into_payment())
    }

    // ========== 查询 ==========

    pub async fn get_payment(&self, tenant_id: &str, payment_id: &str) -> PaymentResult<Payment> {
        self.payments
            .find_payment(tenant_id, payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))
    }

    pub async fn list_payments(
        &self,
        tenant_id: &str,
        filter: &PaymentFilter,
    ) -> PaymentResult<Vec<Payment>> {
        Ok(self.payments.list_payments(tenant_id, filter).await?)
    }

    pub async fn payment_stats(&self, tenant_id: &str) -> PaymentResult<PaymentStats> {
        let payments = self.payments.all_payments(tenant_id).await?;
        Ok(PaymentStats::from_payments(&payments))
    }

    /// PENDING payments past `expires_at` (advisory, nothing is failed)
    pub async fn stale_pending(&self, tenant_id: &str, now: i64) -> PaymentResult<Vec<Payment>> {
        Ok(self.payments.stale_pending(tenant_id, now).await?)
    }

    pub fn providers_status(&self) -> BTreeMap<String, ProviderInfo> {
        self.providers.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditWorker, MemoryAuditSink};
    use crate::auth::{Principal, Role};
    use crate::live::NotificationHub;
    use crate::provider::signature::sign_hex;
    use crate::provider::{InitiateResponse, StatusCheck};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    const SECRET: &str = "test-secret";

    /// Wave-shaped provider answering from memory
    struct StubProvider {
        configured: bool,
        reject: bool,
        poll_status: Mutex<PaymentStatus>,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                configured: true,
                reject: false,
                poll_status: Mutex::new(PaymentStatus::Pending),
            }
        }
    }

    #[async_trait]
    impl PaymentProvider for StubProvider {
        fn method(&self) -> PaymentMethod {
            PaymentMethod::Wave
        }

        fn signature_header(&self) -> &'static str {
            "x-wave-signature"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                configured: self.configured,
                api_url: "stub://wave".into(),
                merchant_id: None,
            }
        }

        async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateResponse, ProviderError> {
            if self.reject {
                return Err(ProviderError::Rejected("insufficient balance".into()));
            }
            Ok(InitiateResponse {
                transaction_id: format!("tx-{}", new_id()),
                payment_url: format!("https://pay.test/{}", req.order_id),
                raw: Value::Null,
            })
        }

        fn verify_signature(&self, raw_body: &[u8], _payload: &Value, signature: &str) -> bool {
            crate::provider::signature::verify_hex(SECRET, raw_body, signature)
        }

        async fn check_status(&self, _tx: &str) -> Result<StatusCheck, ProviderError> {
            Ok(StatusCheck {
                status: *self.poll_status.lock(),
                provider_reference: Some("poll-ref".into()),
                raw: json!({"polled": true}),
            })
        }

        fn map_status(&self, raw: &str) -> PaymentStatus {
            match raw {
                "paid" => PaymentStatus::Success,
                "declined" => PaymentStatus::Failed,
                _ => PaymentStatus::Pending,
            }
        }

        fn parse_callback(&self, payload: &Value) -> Result<CallbackData, ProviderError> {
            let transaction_id = payload["id"]
                .as_str()
                .ok_or_else(|| ProviderError::InvalidPayload("missing id".into()))?;
            Ok(CallbackData {
                transaction_id: transaction_id.to_string(),
                order_id: None,
                status: self.map_status(payload["status"].as_str().unwrap_or_default()),
                provider_reference: Some("ref-1".into()),
                message: None,
                raw: payload.clone(),
            })
        }
    }

    struct Fixture {
        payments: PaymentOrchestrator,
        store: MemoryStore,
        hub: NotificationHub,
        audit_sink: MemoryAuditSink,
    }

    fn fixture_with(provider: StubProvider, require_signature: bool) -> Fixture {
        let store = MemoryStore::new();
        let hub = NotificationHub::new(64);
        let audit_sink = MemoryAuditSink::new();
        let (audit, rx) = AuditService::new(64);
        tokio::spawn(AuditWorker::new(Arc::new(audit_sink.clone())).run(rx));

        let mut settings = PaymentSettings::from_config(&Config::for_development());
        settings.require_signature = require_signature;

        let payments = PaymentOrchestrator::new(PaymentDeps {
            payments: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            providers: ProviderRegistry::new().with(Arc::new(provider)),
            publisher: Arc::new(hub.clone()),
            audit,
            settings,
        });
        Fixture {
            payments,
            store,
            hub,
            audit_sink,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StubProvider::new(), false)
    }

    async fn seed_order(store: &MemoryStore, id: &str) -> Order {
        let order = Order {
            id: id.into(),
            tenant_id: "t1".into(),
            order_number: format!("20260101{:0>4}", id.len()),
            table_id: None,
            user_id: None,
            customer_name: None,
            customer_phone: Some("+221770000000".into()),
            notes: None,
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::Wave,
            total_amount: Decimal::from(6000),
            items: vec![],
            created_at: 1,
            updated_at: 1,
        };
        store.insert_order(&order).await.unwrap();
        order
    }

    fn wave() -> InitiatePaymentRequest {
        InitiatePaymentRequest {
            method: PaymentMethod::Wave,
            ..Default::default()
        }
    }

    fn manager(hub: &NotificationHub) -> crate::live::Subscription {
        hub.register(Principal {
            user_id: "m1".into(),
            tenant_id: "t1".into(),
            role: Role::Manager,
        })
    }

    #[tokio::test]
    async fn initiate_persists_pending_payment() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;
        let mut sub = manager(&f.hub);

        let intent = f.payments.initiate("t1", &order.id, wave(), Some("u1")).await.unwrap();
        assert!(intent.payment_url.ends_with("/o1"));

        let payment = f.payments.get_payment("t1", &intent.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, Decimal::from(6000));
        assert_eq!(payment.currency, "XOF");
        assert_eq!(
            payment.provider_data["webhook_url"],
            "http://localhost:8080/payments/webhooks/wave"
        );
        assert!(
            payment.provider_data["success_url"]
                .as_str()
                .unwrap()
                .ends_with("/payment/success?order_id=o1")
        );
        assert_eq!(payment.expires_at - payment.created_at, 30 * 60 * 1000);
        assert_eq!(sub.try_recv().unwrap().event_name(), "payment_initiated");
    }

    #[tokio::test]
    async fn second_initiation_is_rejected() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;
        f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();
        let err = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyInProgress(_)));
    }

    #[tokio::test]
    async fn initiation_preconditions() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;

        let err = f.payments.initiate("t2", &order.id, wave(), None).await.unwrap_err();
        assert!(matches!(err, PaymentError::OrderNotFound(_)));

        let cash = InitiatePaymentRequest {
            method: PaymentMethod::Cash,
            ..Default::default()
        };
        let err = f.payments.initiate("t1", &order.id, cash, None).await.unwrap_err();
        assert!(matches!(err, PaymentError::UnsupportedProvider(PaymentMethod::Cash)));

        let mynita = InitiatePaymentRequest {
            method: PaymentMethod::Mynita,
            ..Default::default()
        };
        let err = f.payments.initiate("t1", &order.id, mynita, None).await.unwrap_err();
        assert!(matches!(err, PaymentError::ProviderUnavailable(PaymentMethod::Mynita)));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_unavailable() {
        let provider = StubProvider {
            configured: false,
            ..StubProvider::new()
        };
        let f = fixture_with(provider, false);
        let order = seed_order(&f.store, "o1").await;
        let err = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap_err();
        assert!(matches!(err, PaymentError::ProviderUnavailable(PaymentMethod::Wave)));
    }

    #[tokio::test]
    async fn provider_refusal_leaves_no_row() {
        let provider = StubProvider {
            reject: true,
            ..StubProvider::new()
        };
        let f = fixture_with(provider, false);
        let order = seed_order(&f.store, "o1").await;

        let err = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap_err();
        match err {
            PaymentError::InitiationFailed(msg) => assert!(msg.contains("insufficient balance")),
            other => panic!("unexpected {other:?}"),
        }
        let listed = f
            .payments
            .list_payments("t1", &PaymentFilter::default())
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn success_callback_confirms_order_once() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;
        let intent = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();
        let mut sub = manager(&f.hub);

        let body = json!({"id": intent.transaction_id, "status": "paid"}).to_string();
        let first = f
            .payments
            .handle_callback("wave", body.as_bytes(), None)
            .await
            .unwrap();
        assert!(matches!(first, CallbackOutcome::Settled(_)));
        let second = f
            .payments
            .handle_callback("wave", body.as_bytes(), None)
            .await
            .unwrap();
        assert!(matches!(second, CallbackOutcome::AlreadyProcessed(_)));

        let stored = f.store.find_order("t1", &order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Preparing);
        let history = f.store.status_history("t1", &order.id).await.unwrap();
        assert_eq!(history.len(), 2);

        let mut events = Vec::new();
        while let Some(msg) = sub.try_recv() {
            events.push(msg.event_name());
        }
        assert_eq!(
            events,
            vec!["payment_success", "order_status_update", "order_status_update"]
        );

        let payment = f.payments.get_payment("t1", &intent.payment_id).await.unwrap();
        assert_eq!(payment.provider_reference.as_deref(), Some("ref-1"));
        assert_eq!(payment.provider_data["callback_data"]["status"], "paid");
        assert!(payment.provider_data["payment_url"].is_string());
    }

    #[tokio::test]
    async fn failed_callback_leaves_order_pending() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;
        let intent = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();
        let mut sub = manager(&f.hub);

        let body = json!({"id": intent.transaction_id, "status": "declined"}).to_string();
        f.payments
            .handle_callback("wave", body.as_bytes(), None)
            .await
            .unwrap();

        let stored = f.store.find_order("t1", &order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(sub.try_recv().unwrap().event_name(), "payment_failed");
        assert!(sub.try_recv().is_none());

        // a failed attempt no longer blocks a new one
        f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();
    }

    #[tokio::test]
    async fn pending_callback_changes_nothing() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;
        let intent = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();

        let body = json!({"id": intent.transaction_id, "status": "processing"}).to_string();
        let outcome = f
            .payments
            .handle_callback("wave", body.as_bytes(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, CallbackOutcome::Pending(_)));
        assert_eq!(outcome.payment().status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn signature_rules() {
        let f = fixture_with(StubProvider::new(), true);
        let order = seed_order(&f.store, "o1").await;
        let intent = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();
        let mut sub = manager(&f.hub);
        let body = json!({"id": intent.transaction_id, "status": "paid"}).to_string();

        let err = f
            .payments
            .handle_callback("wave", body.as_bytes(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::MissingSignature));

        let err = f
            .payments
            .handle_callback("wave", body.as_bytes(), Some("deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
        assert!(sub.try_recv().is_none());
        let payment = f.payments.get_payment("t1", &intent.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        let sig = sign_hex(SECRET, body.as_bytes());
        f.payments
            .handle_callback("wave", body.as_bytes(), Some(&sig))
            .await
            .unwrap();
        let payment = f.payments.get_payment("t1", &intent.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn unknown_transaction_and_provider() {
        let f = fixture();
        let body = json!({"id": "tx-missing", "status": "paid"}).to_string();
        let err = f
            .payments
            .handle_callback("wave", body.as_bytes(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::PaymentNotFound(_)));

        let err = f
            .payments
            .handle_callback("paypal", body.as_bytes(), None)
            .await
            .unwrap_err();
        assert!(err.is_bad_request());

        let err = f
            .payments
            .handle_callback("wave", b"{not json", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_callback_uses_canonical_fields() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;
        let intent = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();

        let outcome = f
            .payments
            .handle_test_callback(
                "wave",
                &json!({"transaction_id": intent.transaction_id, "status": "SUCCESS"}),
            )
            .await
            .unwrap();
        assert_eq!(outcome.payment().status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn reconcile_polls_provider() {
        let provider = StubProvider::new();
        *provider.poll_status.lock() = PaymentStatus::Success;
        let f = fixture_with(provider, false);
        let order = seed_order(&f.store, "o1").await;
        let intent = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();

        let payment = f.payments.reconcile("t1", &intent.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.provider_reference.as_deref(), Some("poll-ref"));

        // already terminal: returned as is
        let again = f.payments.reconcile("t1", &intent.payment_id).await.unwrap();
        assert_eq!(again.updated_at, payment.updated_at);

        let err = f.payments.reconcile("t2", &intent.payment_id).await.unwrap_err();
        assert!(matches!(err, PaymentError::PaymentNotFound(_)));
    }

    #[tokio::test]
    async fn stale_pending_is_advisory() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;
        let intent = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();

        let later = intent.expires_at + 1;
        let stale = f.payments.stale_pending("t1", later).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].status, PaymentStatus::Pending);

        // late success is still honoured
        let body = json!({"id": intent.transaction_id, "status": "paid"}).to_string();
        f.payments
            .handle_callback("wave", body.as_bytes(), None)
            .await
            .unwrap();
        assert!(f.payments.stale_pending("t1", later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_and_audit() {
        let f = fixture();
        let order = seed_order(&f.store, "o1").await;
        let intent = f.payments.initiate("t1", &order.id, wave(), None).await.unwrap();
        let body = json!({"id": intent.transaction_id, "status": "paid"}).to_string();
        f.payments
            .handle_callback("wave", body.as_bytes(), None)
            .await
            .unwrap();

        let stats = f.payments.payment_stats("t1").await.unwrap();
        assert_eq!(stats.total_payments, 1);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.revenue, Decimal::from(6000));
        assert_eq!(stats.success_rate, Decimal::ONE_HUNDRED);

        for _ in 0..50 {
            if f.audit_sink.entries().len() >= 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let types: Vec<_> = f.audit_sink.entries().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![AuditEventType::PaymentInitiated, AuditEventType::PaymentSucceeded]
        );
        assert_eq!(f.payments.providers_status().len(), 1);
    }
}
