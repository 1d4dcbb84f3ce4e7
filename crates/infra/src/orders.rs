//! Purchase order lifecycle orchestration (the I/O half of the engine).
//!
//! The execution pipeline mirrors the domain split: load the order document,
//! let the pure state machine decide, persist the evolved record with a
//! compare-and-swap write, then notify the supplier best-effort. Persistence
//! failures abort the transition; notification failures never do.

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use procura_core::{DomainError, ExpectedRevision, RecordId, TenantId, ValidationErrors};
use procura_orders::{
    Approve, Cancel, CreateDraft, MarkReceived, OrderCommand, OrderDraft, OrderEvent, OrderId,
    OrderedBy, PurchaseOrder, SendToSupplier, SubmitForApproval, UpdateDraft,
};

use crate::document_store::{DocumentStore, StoreError, collections};
use crate::notify::{Attachment, NotificationMessage, NotificationSender, NotificationWarning};

const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
const COUNTER_KEY: &str = "purchase_order_number";
const COUNTER_ATTEMPTS: usize = 8;

/// Transition failure, in the order callers should check it: domain rejection
/// first (nothing was written), then persistence problems.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// Field → message map; the transition was rejected before any write.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The order's status does not permit the attempted operation.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("order not found")]
    NotFound,

    /// Another writer moved the order between our read and our write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store failed; the transition was aborted and is not retried here.
    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for TransitionError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(errors) => TransitionError::Validation(errors),
            DomainError::Precondition(msg) => TransitionError::Precondition(msg),
            DomainError::InvalidId(msg) => {
                TransitionError::Validation(ValidationErrors::single("id", msg))
            }
            DomainError::NotFound => TransitionError::NotFound,
            DomainError::Conflict(msg) => TransitionError::Conflict(msg),
        }
    }
}

impl From<StoreError> for TransitionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => TransitionError::Conflict(msg),
            StoreError::NotFound { .. } => TransitionError::NotFound,
            other => TransitionError::Store(other),
        }
    }
}

/// Result of a successful transition: the persisted order plus any advisory
/// notification warning (never a failure of the transition itself).
#[derive(Debug)]
pub struct TransitionOutcome {
    pub order: PurchaseOrder,
    pub warning: Option<NotificationWarning>,
}

/// Purchase order lifecycle service.
///
/// Generic over the store and the sender so tests can run against the
/// in-memory implementations.
#[derive(Debug)]
pub struct OrderService<S, N> {
    store: S,
    notifier: N,
    notify_timeout: Duration,
}

impl<S, N> OrderService<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Bound every notification attempt; sends past the deadline become
    /// [`NotificationWarning::Timeout`].
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }
}

impl<S, N> OrderService<S, N>
where
    S: DocumentStore,
    N: NotificationSender,
{
    /// Create a new draft order. Allocates the order number, normalizes the
    /// content, and persists. Drafts may be incomplete (no supplier, no
    /// items); the full gate runs on submission.
    pub async fn create_draft(
        &self,
        tenant_id: TenantId,
        ordered_by: OrderedBy,
        draft: OrderDraft,
    ) -> Result<PurchaseOrder, TransitionError> {
        let order_id = OrderId::new(RecordId::new());
        let order_number = self.allocate_order_number(tenant_id).await?;

        let mut order = PurchaseOrder::empty(order_id);
        let command = OrderCommand::CreateDraft(CreateDraft {
            tenant_id,
            order_id,
            order_number,
            ordered_by,
            draft,
            occurred_at: Utc::now(),
        });
        let events = order.handle(&command)?;
        for event in &events {
            order.apply(event);
        }

        self.store
            .put(
                tenant_id,
                collections::ORDERS,
                &order_id.to_string(),
                to_document(&order)?,
                ExpectedRevision::NoDocument,
            )
            .await?;

        tracing::info!(
            order = %order_id,
            number = order.order_number(),
            "purchase order drafted"
        );
        Ok(order)
    }

    /// Replace a draft's header and items. Rejected once the order has left
    /// draft; the header is read-only from then on.
    pub async fn update_draft(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        draft: OrderDraft,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.execute(
            tenant_id,
            order_id,
            OrderCommand::UpdateDraft(UpdateDraft {
                tenant_id,
                order_id,
                draft,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    pub async fn submit_for_approval(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.execute(
            tenant_id,
            order_id,
            OrderCommand::SubmitForApproval(SubmitForApproval {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    pub async fn approve(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.execute(
            tenant_id,
            order_id,
            OrderCommand::Approve(Approve {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    pub async fn send_to_supplier(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.execute(
            tenant_id,
            order_id,
            OrderCommand::SendToSupplier(SendToSupplier {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    pub async fn mark_received(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.execute(
            tenant_id,
            order_id,
            OrderCommand::MarkReceived(MarkReceived {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    pub async fn cancel(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.execute(
            tenant_id,
            order_id,
            OrderCommand::Cancel(Cancel {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    /// Physically remove an order. Only drafts and orders pending approval may
    /// be deleted; later statuses keep the record forever.
    pub async fn delete(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<(), TransitionError> {
        let (order, _) = self.load(tenant_id, order_id).await?;
        if !order.status().allows_delete() {
            return Err(TransitionError::Precondition(format!(
                "a {} order cannot be deleted",
                order.status()
            )));
        }

        self.store
            .delete(tenant_id, collections::ORDERS, &order_id.to_string())
            .await?;
        tracing::info!(order = %order_id, "purchase order deleted");
        Ok(())
    }

    pub async fn get(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<PurchaseOrder, TransitionError> {
        let (order, _) = self.load(tenant_id, order_id).await?;
        Ok(order)
    }

    pub async fn list(&self, tenant_id: TenantId) -> Result<Vec<PurchaseOrder>, TransitionError> {
        let documents = self
            .store
            .query(tenant_id, collections::ORDERS, &|_| true)
            .await?;
        documents
            .into_iter()
            .map(|doc| from_document(doc.value))
            .collect()
    }

    /// Full pipeline for an existing order: load → decide → evolve → persist
    /// (compare-and-swap on the loaded revision) → notify best-effort.
    async fn execute(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<TransitionOutcome, TransitionError> {
        let (mut order, revision) = self.load(tenant_id, order_id).await?;

        let events = order.handle(&command)?;
        for event in &events {
            order.apply(event);
        }

        self.store
            .put(
                tenant_id,
                collections::ORDERS,
                &order_id.to_string(),
                to_document(&order)?,
                ExpectedRevision::Exact(revision),
            )
            .await?;

        let mut warning = None;
        for event in &events {
            tracing::info!(
                order = %order_id,
                event = event.event_type(),
                status = %order.status(),
                "order transition applied"
            );
            if event.notifies_supplier() {
                warning = self.notify_supplier(&order, event).await;
            }
        }

        Ok(TransitionOutcome { order, warning })
    }

    async fn load(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<(PurchaseOrder, u64), TransitionError> {
        let document = self
            .store
            .get(tenant_id, collections::ORDERS, &order_id.to_string())
            .await?
            .ok_or(TransitionError::NotFound)?;
        let order = from_document(document.value)?;
        Ok((order, document.revision))
    }

    /// Best-effort supplier notification under a bounded timeout. Returns the
    /// advisory warning, if any; the transition has already persisted.
    async fn notify_supplier(
        &self,
        order: &PurchaseOrder,
        event: &OrderEvent,
    ) -> Option<NotificationWarning> {
        let recipient = order
            .supplier()
            .and_then(|supplier| supplier.email.as_deref())
            .filter(|email| !email.trim().is_empty());
        let Some(recipient) = recipient else {
            tracing::warn!(
                order = %order.id(),
                "supplier has no email address, notification skipped"
            );
            return Some(NotificationWarning::NoRecipient);
        };

        let message = notification_for(order, event, recipient);
        let send = self.notifier.send(message);
        match tokio::time::timeout(self.notify_timeout, send).await {
            Ok(Ok(())) => None,
            Ok(Err(error)) => {
                tracing::warn!(
                    order = %order.id(),
                    error = %error,
                    "supplier notification failed"
                );
                Some(NotificationWarning::Failed(error.to_string()))
            }
            Err(_) => {
                tracing::warn!(order = %order.id(), "supplier notification timed out");
                Some(NotificationWarning::Timeout)
            }
        }
    }

    /// Next order number from the tenant's counter document, formatted
    /// "PO-00042". Compare-and-swap with bounded retry, like every other
    /// cross-writer document here.
    async fn allocate_order_number(&self, tenant_id: TenantId) -> Result<String, TransitionError> {
        for _ in 0..COUNTER_ATTEMPTS {
            let current = self
                .store
                .get(tenant_id, collections::COUNTERS, COUNTER_KEY)
                .await?;

            let (number, next, expected) = match &current {
                Some(doc) => {
                    let number = doc.value["next"].as_u64().unwrap_or(1);
                    (number, number + 1, ExpectedRevision::Exact(doc.revision))
                }
                None => (1, 2, ExpectedRevision::NoDocument),
            };

            let write = self
                .store
                .put(
                    tenant_id,
                    collections::COUNTERS,
                    COUNTER_KEY,
                    serde_json::json!({ "next": next }),
                    expected,
                )
                .await;
            match write {
                Ok(_) => return Ok(format!("PO-{number:05}")),
                Err(StoreError::Conflict(_)) => continue,
                Err(other) => return Err(other.into()),
            }
        }

        Err(TransitionError::Conflict(format!(
            "order number allocation kept conflicting after {COUNTER_ATTEMPTS} attempts"
        )))
    }
}

fn to_document(order: &PurchaseOrder) -> Result<serde_json::Value, TransitionError> {
    serde_json::to_value(order)
        .map_err(|e| TransitionError::Store(StoreError::Serialization(e.to_string())))
}

fn from_document(value: serde_json::Value) -> Result<PurchaseOrder, TransitionError> {
    serde_json::from_value(value)
        .map_err(|e| TransitionError::Store(StoreError::Serialization(e.to_string())))
}

fn notification_for(order: &PurchaseOrder, event: &OrderEvent, recipient: &str) -> NotificationMessage {
    let (word, phrase) = match event {
        OrderEvent::Approved(_) => ("approved", "has been approved"),
        OrderEvent::Sent(_) => ("sent", "has been sent"),
        _ => ("received", "has been marked as received"),
    };

    let supplier_name = order
        .supplier()
        .map(|supplier| supplier.name.as_str())
        .unwrap_or("Supplier");

    let mut body = format!(
        "Hello {supplier_name},\n\nPurchase order {} {phrase}.\n\nItems:\n{}\n{}",
        order.order_number(),
        line_item_breakdown(order),
        totals_block(order),
    );
    body.push('\n');

    // Approval carries the full summary as an attachment as well.
    let attachment = match event {
        OrderEvent::Approved(_) => Some(summary_attachment(order)),
        _ => None,
    };

    NotificationMessage {
        to: recipient.to_string(),
        subject: format!("Purchase order {} {word}", order.order_number()),
        body,
        attachment,
    }
}

/// One breakdown line per item: "- 3 x Widget @ 10.00 USD = 30.00 USD".
fn line_item_breakdown(order: &PurchaseOrder) -> String {
    let currency = order.currency();
    order
        .items()
        .iter()
        .map(|item| {
            format!(
                "- {} x {} @ {} {currency} = {} {currency}",
                item.quantity,
                item.name,
                format_amount(item.unit_price),
                format_amount(item.line_total),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn totals_block(order: &PurchaseOrder) -> String {
    let currency = order.currency();
    format!(
        "\nSubtotal: {} {currency}\nTax: {} {currency}\nShipping: {} {currency}\nTotal: {} {currency}",
        format_amount(order.subtotal()),
        format_amount(order.tax()),
        format_amount(order.shipping()),
        format_amount(order.total()),
    )
}

fn summary_attachment(order: &PurchaseOrder) -> Attachment {
    let mut summary = format!("Purchase order {}\n", order.order_number());
    if let Some(supplier) = order.supplier() {
        summary.push_str(&format!("Supplier: {}\n", supplier.name));
    }
    summary.push_str(&format!("Order date: {}\n", order.order_date()));
    if let Some(expected) = order.expected_delivery_date() {
        summary.push_str(&format!("Expected delivery: {expected}\n"));
    }
    if !order.delivery_address().is_empty() {
        summary.push_str(&format!("Deliver to: {}\n", order.delivery_address()));
    }
    summary.push_str(&format!(
        "\nItems:\n{}\n{}\n",
        line_item_breakdown(order),
        totals_block(order),
    ));

    Attachment {
        filename: format!("{}.txt", order.order_number()),
        content_type: "text/plain".to_string(),
        content: summary.into_bytes(),
    }
}

/// Render cents as a decimal amount, e.g. 5500 → "55.00".
fn format_amount(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use procura_orders::{OrderLineItem, OrderStatus, SupplierRef};
    use procura_core::UserId;

    #[test]
    fn amounts_render_with_two_decimal_places() {
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(7_000), "70.00");
        assert_eq!(format_amount(123_456), "1234.56");
    }

    fn approved_order() -> PurchaseOrder {
        let tenant_id = TenantId::new();
        let order_id = OrderId::new(RecordId::new());
        let mut order = PurchaseOrder::empty(order_id);
        let draft = OrderDraft {
            supplier: Some(SupplierRef {
                id: RecordId::new(),
                name: "Acme Supplies".to_string(),
                email: Some("orders@acme.example".to_string()),
            }),
            order_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            expected_delivery_date: NaiveDate::from_ymd_opt(2025, 4, 1),
            delivery_address: "1 Warehouse Way".to_string(),
            items: vec![
                OrderLineItem::new("Widget", "", 3, 1_000),
                OrderLineItem::new("Gadget", "", 1, 2_500),
            ],
            tax: 500,
            shipping: 1_000,
            currency: "USD".to_string(),
            budget_category: None,
            notes: String::new(),
        };
        for command in [
            OrderCommand::CreateDraft(CreateDraft {
                tenant_id,
                order_id,
                order_number: "PO-00001".to_string(),
                ordered_by: OrderedBy {
                    user_id: UserId::new(),
                    name: "Dana Buyer".to_string(),
                },
                draft,
                occurred_at: Utc::now(),
            }),
            OrderCommand::SubmitForApproval(SubmitForApproval {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
            OrderCommand::Approve(Approve {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        ] {
            let events = order.handle(&command).unwrap();
            for event in &events {
                order.apply(event);
            }
        }
        assert_eq!(order.status(), OrderStatus::Approved);
        order
    }

    #[test]
    fn approval_notification_carries_the_breakdown_and_a_summary_attachment() {
        let order = approved_order();
        let event = OrderEvent::Approved(procura_orders::OrderApproved {
            tenant_id: order.tenant_id().unwrap(),
            order_id: order.id(),
            occurred_at: Utc::now(),
        });

        let message = notification_for(&order, &event, "orders@acme.example");
        assert_eq!(message.subject, "Purchase order PO-00001 approved");
        assert_eq!(
            message.body.lines().filter(|l| l.starts_with("- ")).count(),
            2
        );
        assert!(message.body.contains("Total: 70.00 USD"));

        let attachment = message.attachment.expect("approval attaches a summary");
        assert_eq!(attachment.filename, "PO-00001.txt");
        assert_eq!(attachment.content_type, "text/plain");
        let text = String::from_utf8(attachment.content).unwrap();
        assert!(text.contains("Supplier: Acme Supplies"));
    }

    #[test]
    fn sent_notification_has_no_attachment() {
        let order = approved_order();
        let event = OrderEvent::Sent(procura_orders::OrderSent {
            tenant_id: order.tenant_id().unwrap(),
            order_id: order.id(),
            occurred_at: Utc::now(),
        });

        let message = notification_for(&order, &event, "orders@acme.example");
        assert_eq!(message.subject, "Purchase order PO-00001 sent");
        assert!(message.attachment.is_none());
    }
}
