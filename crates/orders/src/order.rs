use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use procura_budgets::BudgetCategory;
use procura_core::{DomainError, RecordId, TenantId, UserId, ValidationErrors};

/// Purchase order identifier (tenant-scoped at the store boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub RecordId);

impl OrderId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Display name given to a line item when neither an explicit name nor a
/// catalog product name is available.
pub const UNNAMED_PRODUCT: &str = "Unnamed Product";

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    PendingApproval,
    Approved,
    Sent,
    Received,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::PendingApproval => "pending_approval",
            OrderStatus::Approved => "approved",
            OrderStatus::Sent => "sent",
            OrderStatus::Received => "received",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Received | OrderStatus::Cancelled)
    }

    /// Header fields (supplier, dates, amounts, line items) are mutable in
    /// `Draft` only; afterwards only status transitions are permitted.
    pub fn allows_header_edits(self) -> bool {
        self == OrderStatus::Draft
    }

    /// Orders may only be physically deleted early in the lifecycle.
    pub fn allows_delete(self) -> bool {
        matches!(self, OrderStatus::Draft | OrderStatus::PendingApproval)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplier snapshot stored on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRef {
    pub id: RecordId,
    pub name: String,
    pub email: Option<String>,
}

/// Who placed the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedBy {
    pub user_id: UserId,
    pub name: String,
}

/// Purchase order line item.
///
/// `line_total` is derived from quantity and unit price; normalization
/// recomputes it after any mutation and caller-supplied values are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: RecordId,
    pub product_id: Option<RecordId>,
    /// Catalog name snapshot; display-name fallback when `name` is blank.
    pub product_name: Option<String>,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    /// Derived: `quantity * unit_price`.
    pub line_total: u64,
}

impl OrderLineItem {
    /// Free-form line with no catalog product behind it.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        quantity: u32,
        unit_price: u64,
    ) -> Self {
        Self {
            id: RecordId::new(),
            product_id: None,
            product_name: None,
            name: name.into(),
            description: description.into(),
            quantity,
            unit_price,
            line_total: 0,
        }
    }

    /// Line referencing a catalog product; the product name doubles as the
    /// display name until one is set explicitly.
    pub fn for_product(
        product_id: RecordId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: u64,
    ) -> Self {
        Self {
            id: RecordId::new(),
            product_id: Some(product_id),
            product_name: Some(product_name.into()),
            name: String::new(),
            description: String::new(),
            quantity,
            unit_price,
            line_total: 0,
        }
    }

    /// Display name resolution: explicit name, else the catalog product name,
    /// else the literal placeholder.
    fn resolved_name(&self) -> String {
        let explicit = self.name.trim();
        if !explicit.is_empty() {
            return explicit.to_string();
        }
        if let Some(product_name) = &self.product_name {
            let product_name = product_name.trim();
            if !product_name.is_empty() {
                return product_name.to_string();
            }
        }
        UNNAMED_PRODUCT.to_string()
    }

    fn computed_total(&self) -> Option<u64> {
        let total = u128::from(self.quantity) * u128::from(self.unit_price);
        u64::try_from(total).ok()
    }
}

/// Editable order content: the header fields and line items a user may change
/// while the order is still a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub supplier: Option<SupplierRef>,
    pub order_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub delivery_address: String,
    pub items: Vec<OrderLineItem>,
    /// Tax in smallest currency unit.
    pub tax: u64,
    /// Shipping in smallest currency unit.
    pub shipping: u64,
    /// ISO currency code, e.g. "USD".
    pub currency: String,
    pub budget_category: Option<BudgetCategory>,
    pub notes: String,
}

impl OrderDraft {
    /// Resolve display names and recompute every derived amount.
    ///
    /// Rejects structurally broken items (zero quantity, amount overflow)
    /// with a field → message map; an empty item list is fine for a draft.
    pub fn normalize(&mut self) -> Result<(), DomainError> {
        let mut errors = ValidationErrors::new();
        for item in &mut self.items {
            item.name = item.resolved_name();
            if item.quantity == 0 {
                errors.add("items", "quantity must be at least 1");
            }
            match item.computed_total() {
                Some(total) => item.line_total = total,
                None => errors.add("items", "line total overflow"),
            }
        }
        if self.totals_checked().is_none() {
            errors.add("total", "order total overflow");
        }
        errors.into_result().map_err(DomainError::Validation)
    }

    /// Derived `(subtotal, total)`; call after [`OrderDraft::normalize`].
    pub fn totals(&self) -> Result<(u64, u64), DomainError> {
        self.totals_checked()
            .ok_or_else(|| DomainError::validation_field("total", "order total overflow"))
    }

    fn totals_checked(&self) -> Option<(u64, u64)> {
        let subtotal = self
            .items
            .iter()
            .try_fold(0u64, |acc, item| acc.checked_add(item.line_total))?;
        let total = subtotal.checked_add(self.tax)?.checked_add(self.shipping)?;
        Some((subtotal, total))
    }
}

/// Aggregate root: PurchaseOrder.
///
/// Persisted as one document per order; `revision` counts applied lifecycle
/// events and lines up with the store's compare-and-swap token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub(crate) id: OrderId,
    pub(crate) tenant_id: Option<TenantId>,
    /// Human-readable number, unique per tenant (e.g. "PO-00042").
    pub(crate) order_number: String,
    pub(crate) supplier: Option<SupplierRef>,
    pub(crate) ordered_by: Option<OrderedBy>,
    pub(crate) status: OrderStatus,
    pub(crate) order_date: NaiveDate,
    pub(crate) expected_delivery_date: Option<NaiveDate>,
    pub(crate) delivery_address: String,
    pub(crate) items: Vec<OrderLineItem>,
    /// Derived: sum of line totals.
    pub(crate) subtotal: u64,
    pub(crate) tax: u64,
    pub(crate) shipping: u64,
    /// Derived: `subtotal + tax + shipping`.
    pub(crate) total: u64,
    pub(crate) currency: String,
    pub(crate) budget_category: Option<BudgetCategory>,
    pub(crate) notes: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) revision: u64,
}

impl PurchaseOrder {
    /// Empty, not-yet-created record: the starting point for `CreateDraft`.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            order_number: String::new(),
            supplier: None,
            ordered_by: None,
            status: OrderStatus::Draft,
            order_date: NaiveDate::default(),
            expected_delivery_date: None,
            delivery_address: String::new(),
            items: Vec::new(),
            subtotal: 0,
            tax: 0,
            shipping: 0,
            total: 0,
            currency: String::new(),
            budget_category: None,
            notes: String::new(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            revision: 0,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn supplier(&self) -> Option<&SupplierRef> {
        self.supplier.as_ref()
    }

    pub fn ordered_by(&self) -> Option<&OrderedBy> {
        self.ordered_by.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_date
    }

    pub fn expected_delivery_date(&self) -> Option<NaiveDate> {
        self.expected_delivery_date
    }

    pub fn delivery_address(&self) -> &str {
        &self.delivery_address
    }

    pub fn items(&self) -> &[OrderLineItem] {
        &self.items
    }

    pub fn subtotal(&self) -> u64 {
        self.subtotal
    }

    pub fn tax(&self) -> u64 {
        self.tax
    }

    pub fn shipping(&self) -> u64 {
        self.shipping
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn budget_category(&self) -> Option<BudgetCategory> {
        self.budget_category
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Count of applied lifecycle events; 0 means "never persisted".
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Submission gate: everything an order needs before it can leave draft.
    ///
    /// Collects all failures rather than stopping at the first, and is pure:
    /// validating the same order twice yields the same map.
    pub fn validate_for_submission(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match &self.supplier {
            None => errors.add("supplier", "a supplier must be selected"),
            Some(supplier) if supplier.id.is_nil() => {
                errors.add("supplier", "a supplier must be selected");
            }
            Some(_) => {}
        }
        if self.expected_delivery_date.is_none() {
            errors.add(
                "expected_delivery_date",
                "an expected delivery date is required",
            );
        }
        if self.items.is_empty() {
            errors.add("items", "at least one line item is required");
        }
        for item in &self.items {
            if item.name.trim().is_empty() {
                errors.add("items", "line items must have a display name");
            }
            if item.quantity == 0 {
                errors.add("items", "quantity must be at least 1");
            }
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn empty_draft() -> OrderDraft {
        OrderDraft {
            supplier: None,
            order_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            expected_delivery_date: None,
            delivery_address: String::new(),
            items: Vec::new(),
            tax: 0,
            shipping: 0,
            currency: "USD".to_string(),
            budget_category: None,
            notes: String::new(),
        }
    }

    #[test]
    fn blank_line_falls_back_to_the_placeholder_name() {
        let mut draft = empty_draft();
        draft.items.push(OrderLineItem::new("   ", "", 1, 100));
        draft.normalize().unwrap();
        assert_eq!(draft.items[0].name, UNNAMED_PRODUCT);
    }

    #[test]
    fn catalog_product_name_wins_over_the_placeholder() {
        let mut draft = empty_draft();
        draft
            .items
            .push(OrderLineItem::for_product(RecordId::new(), "Stapler", 2, 450));
        draft.normalize().unwrap();
        assert_eq!(draft.items[0].name, "Stapler");
    }

    #[test]
    fn explicit_name_wins_over_the_catalog_name() {
        let mut draft = empty_draft();
        let mut item = OrderLineItem::for_product(RecordId::new(), "Stapler", 2, 450);
        item.name = "Red stapler".to_string();
        draft.items.push(item);
        draft.normalize().unwrap();
        assert_eq!(draft.items[0].name, "Red stapler");
    }

    #[test]
    fn normalize_recomputes_line_totals_and_ignores_supplied_ones() {
        let mut draft = empty_draft();
        let mut item = OrderLineItem::new("Widget", "", 3, 1_000);
        item.line_total = 999_999;
        draft.items.push(item);
        draft.normalize().unwrap();
        assert_eq!(draft.items[0].line_total, 3_000);
    }

    #[test]
    fn totals_follow_the_worked_example() {
        let mut draft = empty_draft();
        draft.items.push(OrderLineItem::new("Widget", "", 3, 1_000));
        draft.items.push(OrderLineItem::new("Gadget", "", 1, 2_500));
        draft.tax = 500;
        draft.shipping = 1_000;

        draft.normalize().unwrap();
        let (subtotal, total) = draft.totals().unwrap();
        assert_eq!(subtotal, 5_500);
        assert_eq!(total, 7_000);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut draft = empty_draft();
        draft.items.push(OrderLineItem::new("Widget", "", 0, 1_000));
        let err = draft.normalize().unwrap_err();
        match err {
            DomainError::Validation(errors) => {
                assert_eq!(errors.message("items"), Some("quantity must be at least 1"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn line_total_overflow_is_rejected() {
        let mut draft = empty_draft();
        draft.items.push(OrderLineItem::new("Widget", "", 2, u64::MAX));
        let err = draft.normalize().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn submission_validation_collects_every_missing_field() {
        let order = PurchaseOrder::empty(OrderId::new(RecordId::new()));
        let errors = order.validate_for_submission().unwrap_err();
        assert!(errors.contains("supplier"));
        assert!(errors.contains("items"));
        assert!(errors.contains("expected_delivery_date"));
    }

    #[test]
    fn submission_validation_is_idempotent() {
        let order = PurchaseOrder::empty(OrderId::new(RecordId::new()));
        let first = order.validate_for_submission().unwrap_err();
        let second = order.validate_for_submission().unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn status_serializes_in_snake_case() {
        let json = serde_json::to_value(OrderStatus::PendingApproval).unwrap();
        assert_eq!(json, serde_json::json!("pending_approval"));
        assert_eq!(OrderStatus::PendingApproval.to_string(), "pending_approval");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after normalization, every line total equals
        /// quantity × unit price and the order totals are the checked sums.
        #[test]
        fn derived_amounts_match_the_arithmetic(
            lines in prop::collection::vec((1u32..1_000u32, 0u64..1_000_000u64), 1..12),
            tax in 0u64..100_000u64,
            shipping in 0u64..100_000u64,
        ) {
            let mut draft = empty_draft();
            draft.tax = tax;
            draft.shipping = shipping;
            for (quantity, unit_price) in &lines {
                draft.items.push(OrderLineItem::new("Widget", "", *quantity, *unit_price));
            }

            draft.normalize().unwrap();
            let (subtotal, total) = draft.totals().unwrap();

            let mut expected_subtotal = 0u128;
            for (item, (quantity, unit_price)) in draft.items.iter().zip(&lines) {
                let expected_line = u128::from(*quantity) * u128::from(*unit_price);
                prop_assert_eq!(u128::from(item.line_total), expected_line);
                expected_subtotal += expected_line;
            }
            prop_assert_eq!(u128::from(subtotal), expected_subtotal);
            prop_assert_eq!(
                u128::from(total),
                expected_subtotal + u128::from(tax) + u128::from(shipping)
            );
        }
    }
}
