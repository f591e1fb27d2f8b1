use lexpay_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderNo, PaymentOrder, PaymentProvider};

/// Filter for searching the callback event audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQueryFilter {
    pub provider: Option<PaymentProvider>,
    pub order_no: Option<OrderNo>,
    pub trade_no: Option<String>,
    pub verified: Option<bool>,
}

impl EventQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.order_no.is_none() && self.trade_no.is_none() && self.verified.is_none()
    }

    pub fn with_order_no(mut self, order_no: OrderNo) -> Self {
        self.order_no = Some(order_no);
        self
    }

    pub fn with_provider(mut self, provider: PaymentProvider) -> Self {
        self.provider = Some(provider);
        self
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 0, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size: page_size.clamp(1, MAX_PAGE_SIZE) }
    }

    pub fn offset(&self) -> u32 {
        self.page * self.page_size
    }
}

/// The outcome of a guarded `Pending → Paid` (or `Pending → Failed`) attempt. The conditional
/// update either took effect, or the caller gets the order as it stood so it can classify why not.
#[derive(Debug, Clone)]
pub enum PaidTransition {
    /// The conditional update fired; this call owns the one-and-only transition.
    Applied(PaymentOrder),
    /// The order had already left `Pending` by the time the update ran.
    AlreadySettled(PaymentOrder),
}

/// Canonical representation of a notification that passed verification. This is the only shape
/// the order state machine ever sees; provider wire formats stop at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedNotification {
    pub provider: PaymentProvider,
    pub order_no: Option<OrderNo>,
    pub trade_no: Option<String>,
    pub amount: Money,
    /// Some providers report definitive non-success outcomes; those arrive with `paid == false`.
    pub paid: bool,
    pub raw_payload: String,
}
