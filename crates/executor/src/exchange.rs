use crate::error::ExecutorError;
use crate::fees::{FeeBreakdown, calculate_fees};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::FeeSchedule;
use core_types::{OrderRequest, OrderSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The receipt of a fill: what was traded, at what price, and what it cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: i64,
    pub fees: FeeBreakdown,
    pub timestamp: DateTime<Utc>,
}

impl Execution {
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Signed cash movement: negative for buys, positive for sells, fees included.
    pub fn cash_delta(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => -(self.notional() + self.fees.total()),
            OrderSide::Sell => self.notional() - self.fees.total(),
        }
    }
}

/// A generic trait for an execution venue.
///
/// Implementations compute the fill and its costs but **do not modify account
/// state**. The caller applies the returned `Execution` to a [`crate::Book`].
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        order: &OrderRequest,
        timestamp: DateTime<Utc>,
    ) -> Result<Execution, ExecutorError>;
}

/// Paper venue: every order fills completely and immediately at its requested
/// price. There is no slippage and no partial fill.
pub struct SimulatedExecutor {
    fees: FeeSchedule,
}

impl SimulatedExecutor {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(
        &self,
        order: &OrderRequest,
        timestamp: DateTime<Utc>,
    ) -> Result<Execution, ExecutorError> {
        if order.quantity <= 0 {
            return Err(ExecutorError::InvalidFill(format!(
                "quantity must be positive, got {}",
                order.quantity
            )));
        }
        if order.price <= Decimal::ZERO {
            return Err(ExecutorError::InvalidFill(format!(
                "price must be positive, got {}",
                order.price
            )));
        }

        let notional = order.price * Decimal::from(order.quantity);
        let fees = calculate_fees(&self.fees, order.side, notional);
        tracing::debug!(
            symbol = %order.symbol,
            side = %order.side,
            %notional,
            commission = %fees.commission,
            stamp_duty = %fees.stamp_duty,
            "Simulated fill"
        );

        Ok(Execution {
            symbol: order.symbol.clone(),
            side: order.side,
            price: order.price,
            quantity: order.quantity,
            fees,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(side: OrderSide, quantity: i64, price: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: "600519".to_string(),
            name: "Kweichow Moutai".to_string(),
            side,
            quantity,
            price,
            reason: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn fills_in_full_at_requested_price() {
        let executor = SimulatedExecutor::new(FeeSchedule::default());
        let exec = executor
            .execute(&request(OrderSide::Buy, 100, dec!(1500.00)), Utc::now())
            .await
            .unwrap();
        assert_eq!(exec.price, dec!(1500.00));
        assert_eq!(exec.quantity, 100);
        assert_eq!(exec.fees.commission, dec!(45));
        assert_eq!(exec.cash_delta(), dec!(-150045));
    }

    #[tokio::test]
    async fn sell_credit_is_net_of_both_fees() {
        let executor = SimulatedExecutor::new(FeeSchedule::default());
        let exec = executor
            .execute(&request(OrderSide::Sell, 100, dec!(1600.00)), Utc::now())
            .await
            .unwrap();
        // 160_000 - 48 commission - 160 stamp duty
        assert_eq!(exec.cash_delta(), dec!(159792));
    }

    #[tokio::test]
    async fn rejects_non_positive_inputs() {
        let executor = SimulatedExecutor::new(FeeSchedule::default());
        let zero_qty = executor
            .execute(&request(OrderSide::Buy, 0, dec!(10)), Utc::now())
            .await;
        assert!(matches!(zero_qty, Err(ExecutorError::InvalidFill(_))));
        let zero_px = executor
            .execute(&request(OrderSide::Buy, 100, Decimal::ZERO), Utc::now())
            .await;
        assert!(matches!(zero_px, Err(ExecutorError::InvalidFill(_))));
    }
}
