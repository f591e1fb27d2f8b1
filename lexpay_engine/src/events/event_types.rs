use crate::db_types::{PaymentOrder, PaymentProvider};

/// Published after a verified notification has moved an order to `Paid`. The order snapshot is
/// the post-transition state, so `trade_no` and `paid_at` are populated.
#[derive(Debug, Clone)]
pub struct OrderPaidEvent {
    pub order: PaymentOrder,
    pub provider: PaymentProvider,
}

impl OrderPaidEvent {
    pub fn new(order: PaymentOrder, provider: PaymentProvider) -> Self {
        Self { order, provider }
    }
}
