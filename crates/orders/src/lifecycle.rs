//! Purchase order lifecycle: commands, transition events, status gating.
//!
//! Decision logic and state evolution are split the decide/evolve way:
//! [`PurchaseOrder::handle`] is pure and returns events, [`PurchaseOrder::apply`]
//! mutates state from one event at a time. Side effects (persistence,
//! supplier notification) belong to the service layer, which persists the
//! evolved record and inspects the emitted events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{DomainError, TenantId};

use crate::order::{OrderDraft, OrderId, OrderStatus, OrderedBy, PurchaseOrder};

/// Command: CreateDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDraft {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub order_number: String,
    pub ordered_by: OrderedBy,
    pub draft: OrderDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDraft (only allowed while the order is a draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDraft {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub draft: OrderDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitForApproval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitForApproval {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendToSupplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToSupplier {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReceived {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel (any non-terminal status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateDraft(CreateDraft),
    UpdateDraft(UpdateDraft),
    SubmitForApproval(SubmitForApproval),
    Approve(Approve),
    SendToSupplier(SendToSupplier),
    MarkReceived(MarkReceived),
    Cancel(Cancel),
}

/// Event: OrderDrafted. Carries the normalized content and derived amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDrafted {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub order_number: String,
    pub ordered_by: OrderedBy,
    pub draft: OrderDraft,
    pub subtotal: u64,
    pub total: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderUpdated (draft content replaced).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdated {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub draft: OrderDraft,
    pub subtotal: u64,
    pub total: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmitted {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSent {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceived {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Drafted(OrderDrafted),
    Updated(OrderUpdated),
    Submitted(OrderSubmitted),
    Approved(OrderApproved),
    Sent(OrderSent),
    Received(OrderReceived),
    Cancelled(OrderCancelled),
}

impl OrderEvent {
    /// Stable event name, used for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Drafted(_) => "orders.order.drafted",
            OrderEvent::Updated(_) => "orders.order.updated",
            OrderEvent::Submitted(_) => "orders.order.submitted",
            OrderEvent::Approved(_) => "orders.order.approved",
            OrderEvent::Sent(_) => "orders.order.sent",
            OrderEvent::Received(_) => "orders.order.received",
            OrderEvent::Cancelled(_) => "orders.order.cancelled",
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Drafted(e) => e.occurred_at,
            OrderEvent::Updated(e) => e.occurred_at,
            OrderEvent::Submitted(e) => e.occurred_at,
            OrderEvent::Approved(e) => e.occurred_at,
            OrderEvent::Sent(e) => e.occurred_at,
            OrderEvent::Received(e) => e.occurred_at,
            OrderEvent::Cancelled(e) => e.occurred_at,
        }
    }

    /// The supplier hears about approval, dispatch and receipt.
    pub fn notifies_supplier(&self) -> bool {
        matches!(
            self,
            OrderEvent::Approved(_) | OrderEvent::Sent(_) | OrderEvent::Received(_)
        )
    }
}

impl PurchaseOrder {
    /// Decide which events a command produces given the current state.
    ///
    /// Pure: no mutation, no I/O. State evolution happens in
    /// [`PurchaseOrder::apply`].
    pub fn handle(&self, command: &OrderCommand) -> Result<Vec<OrderEvent>, DomainError> {
        match command {
            OrderCommand::CreateDraft(cmd) => self.handle_create(cmd),
            OrderCommand::UpdateDraft(cmd) => self.handle_update(cmd),
            OrderCommand::SubmitForApproval(cmd) => self.handle_submit(cmd),
            OrderCommand::Approve(cmd) => self.handle_approve(cmd),
            OrderCommand::SendToSupplier(cmd) => self.handle_send(cmd),
            OrderCommand::MarkReceived(cmd) => self.handle_receive(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }

    /// Evolve state from a single event. Bumps `revision` once per event.
    pub fn apply(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::Drafted(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.order_number = e.order_number.clone();
                self.ordered_by = Some(e.ordered_by.clone());
                self.status = OrderStatus::Draft;
                self.apply_draft(&e.draft, e.subtotal, e.total);
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
            }
            OrderEvent::Updated(e) => {
                self.apply_draft(&e.draft, e.subtotal, e.total);
                self.updated_at = e.occurred_at;
            }
            OrderEvent::Submitted(e) => {
                self.status = OrderStatus::PendingApproval;
                self.updated_at = e.occurred_at;
            }
            OrderEvent::Approved(e) => {
                self.status = OrderStatus::Approved;
                self.updated_at = e.occurred_at;
            }
            OrderEvent::Sent(e) => {
                self.status = OrderStatus::Sent;
                self.updated_at = e.occurred_at;
            }
            OrderEvent::Received(e) => {
                self.status = OrderStatus::Received;
                self.updated_at = e.occurred_at;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.updated_at = e.occurred_at;
            }
        }

        // Deterministic revision tracking: +1 per applied event.
        self.revision += 1;
    }

    fn apply_draft(&mut self, draft: &OrderDraft, subtotal: u64, total: u64) {
        self.supplier = draft.supplier.clone();
        self.order_date = draft.order_date;
        self.expected_delivery_date = draft.expected_delivery_date;
        self.delivery_address = draft.delivery_address.clone();
        self.items = draft.items.clone();
        self.tax = draft.tax;
        self.shipping = draft.shipping;
        self.currency = draft.currency.clone();
        self.budget_category = draft.budget_category;
        self.notes = draft.notes.clone();
        self.subtotal = subtotal;
        self.total = total;
    }

    fn exists(&self) -> bool {
        self.revision > 0
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.exists() {
            Ok(())
        } else {
            Err(DomainError::not_found())
        }
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.exists() {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::precondition("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::precondition("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateDraft) -> Result<Vec<OrderEvent>, DomainError> {
        if self.exists() {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation_field(
                "order_number",
                "an order number is required",
            ));
        }

        let mut draft = cmd.draft.clone();
        draft.normalize()?;
        let (subtotal, total) = draft.totals()?;

        Ok(vec![OrderEvent::Drafted(OrderDrafted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            ordered_by: cmd.ordered_by.clone(),
            draft,
            subtotal,
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDraft) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.status.allows_header_edits() {
            return Err(DomainError::precondition(format!(
                "order header is read-only once submitted (status: {})",
                self.status
            )));
        }

        let mut draft = cmd.draft.clone();
        draft.normalize()?;
        let (subtotal, total) = draft.totals()?;

        Ok(vec![OrderEvent::Updated(OrderUpdated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            draft,
            subtotal,
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitForApproval) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::Draft {
            return Err(DomainError::precondition(
                "only draft orders can be submitted for approval",
            ));
        }

        self.validate_for_submission()
            .map_err(DomainError::Validation)?;

        Ok(vec![OrderEvent::Submitted(OrderSubmitted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::PendingApproval {
            return Err(DomainError::precondition(
                "only orders pending approval can be approved",
            ));
        }

        Ok(vec![OrderEvent::Approved(OrderApproved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &SendToSupplier) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::Approved {
            return Err(DomainError::precondition(
                "only approved orders can be sent to the supplier",
            ));
        }

        Ok(vec![OrderEvent::Sent(OrderSent {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &MarkReceived) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::Sent {
            return Err(DomainError::precondition(
                "only sent orders can be marked as received",
            ));
        }

        Ok(vec![OrderEvent::Received(OrderReceived {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status.is_terminal() {
            return Err(DomainError::precondition(format!(
                "a {} order cannot be cancelled",
                self.status
            )));
        }

        Ok(vec![OrderEvent::Cancelled(OrderCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
