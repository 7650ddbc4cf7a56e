use configuration::FeeSchedule;
use core_types::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The charges levied on one fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub commission: Decimal,
    pub stamp_duty: Decimal,
}

impl FeeBreakdown {
    pub fn total(&self) -> Decimal {
        self.commission + self.stamp_duty
    }
}

/// Commission on both sides with a floor; stamp duty on sells only.
pub fn calculate_fees(schedule: &FeeSchedule, side: OrderSide, notional: Decimal) -> FeeBreakdown {
    let commission = (notional * schedule.commission_rate).max(schedule.min_commission);
    let stamp_duty = match side {
        OrderSide::Buy => Decimal::ZERO,
        OrderSide::Sell => notional * schedule.stamp_duty_rate,
    };
    FeeBreakdown {
        commission,
        stamp_duty,
    }
}

/// Cash that leaves the account for a buy of `notional`.
pub fn buy_debit(schedule: &FeeSchedule, notional: Decimal) -> Decimal {
    notional + calculate_fees(schedule, OrderSide::Buy, notional).total()
}
