//! Purchase order domain module (record model + lifecycle state machine).
//!
//! This crate contains business rules for purchase orders, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod lifecycle;
pub mod order;

pub use lifecycle::{
    Approve, Cancel, CreateDraft, MarkReceived, OrderApproved, OrderCancelled, OrderCommand,
    OrderDrafted, OrderEvent, OrderReceived, OrderSent, OrderSubmitted, OrderUpdated,
    SendToSupplier, SubmitForApproval, UpdateDraft,
};
pub use order::{
    OrderDraft, OrderId, OrderLineItem, OrderStatus, OrderedBy, PurchaseOrder, SupplierRef,
    UNNAMED_PRODUCT,
};
