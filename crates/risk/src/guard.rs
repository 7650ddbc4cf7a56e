use crate::error::{RiskError, TradeRejection};
use chrono::NaiveDate;
use configuration::{FeeSchedule, TradingConfig};
use core_types::{LOT_SIZE, OrderRequest, OrderSide};
use executor::{Book, buy_debit};
use rust_decimal::Decimal;

/// Pre-trade validation against the account limits.
///
/// Checks run in a fixed order and the first failure wins:
/// price and quantity shape, the daily trade limit, then for buys funds,
/// position size and holdings count, and for sells holdings and the
/// settlement lock.
#[derive(Debug, Clone)]
pub struct OrderGuard {
    limits: TradingConfig,
    fees: FeeSchedule,
}

impl OrderGuard {
    pub fn new(limits: TradingConfig, fees: FeeSchedule) -> Result<Self, RiskError> {
        if limits.max_position_ratio <= Decimal::ZERO || limits.max_position_ratio > Decimal::ONE {
            return Err(RiskError::InvalidParameters(
                "max_position_ratio must be in (0, 1]".to_string(),
            ));
        }
        if limits.max_holdings == 0 {
            return Err(RiskError::InvalidParameters(
                "max_holdings must be at least 1".to_string(),
            ));
        }
        Ok(Self { limits, fees })
    }

    /// `filled_today` is the number of orders already filled on `today`
    /// (exchange-local date).
    pub fn validate(
        &self,
        request: &OrderRequest,
        book: &Book,
        filled_today: u32,
        today: NaiveDate,
    ) -> Result<(), TradeRejection> {
        self.check_shape(request, book)?;

        if filled_today >= self.limits.max_daily_trades {
            return Err(TradeRejection::DailyTradeLimitExceeded {
                count: filled_today,
                limit: self.limits.max_daily_trades,
            });
        }

        match request.side {
            OrderSide::Buy => self.check_buy(request, book),
            OrderSide::Sell => self.check_sell(request, book, today),
        }
    }

    fn check_shape(&self, request: &OrderRequest, book: &Book) -> Result<(), TradeRejection> {
        if request.price <= Decimal::ZERO {
            return Err(TradeRejection::InvalidPrice(request.price));
        }
        if request.quantity <= 0 {
            return Err(TradeRejection::InvalidQuantity(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }
        let whole_lots = request.quantity % LOT_SIZE == 0;
        match request.side {
            OrderSide::Buy if !whole_lots => Err(TradeRejection::InvalidQuantity(format!(
                "buy quantity {} is not a multiple of {LOT_SIZE}",
                request.quantity
            ))),
            OrderSide::Sell if !whole_lots => {
                // An odd lot may only be sold by closing the whole holding.
                // Anything beyond the holding is left to the holdings check.
                let held = book.position(&request.symbol).map_or(0, |p| p.quantity);
                if request.quantity >= held {
                    Ok(())
                } else {
                    Err(TradeRejection::InvalidQuantity(format!(
                        "sell quantity {} is neither a multiple of {LOT_SIZE} nor the full holding",
                        request.quantity
                    )))
                }
            }
            _ => Ok(()),
        }
    }

    fn check_buy(&self, request: &OrderRequest, book: &Book) -> Result<(), TradeRejection> {
        let notional = request.price * Decimal::from(request.quantity);

        let required = buy_debit(&self.fees, notional);
        if book.cash < required {
            return Err(TradeRejection::InsufficientFunds {
                required,
                available: book.cash,
            });
        }

        let limit = self.limits.max_position_ratio * book.total_value();
        if notional > limit {
            return Err(TradeRejection::PositionLimitExceeded { notional, limit });
        }

        let opens_new_symbol = book.position(&request.symbol).is_none();
        if opens_new_symbol && book.positions.len() >= self.limits.max_holdings {
            return Err(TradeRejection::HoldingsLimitExceeded {
                held: book.positions.len(),
                max: self.limits.max_holdings,
            });
        }
        Ok(())
    }

    fn check_sell(
        &self,
        request: &OrderRequest,
        book: &Book,
        today: NaiveDate,
    ) -> Result<(), TradeRejection> {
        let position = book.position(&request.symbol);
        let available = position.map_or(0, |p| p.quantity);
        if available < request.quantity {
            return Err(TradeRejection::InsufficientHoldings {
                symbol: request.symbol.clone(),
                requested: request.quantity,
                available,
            });
        }

        if self.limits.enforce_settlement_lock {
            if let Some(pos) = position.filter(|p| !p.is_sellable(today)) {
                return Err(TradeRejection::SettlementLocked {
                    symbol: request.symbol.clone(),
                    bought: pos.last_buy_date.unwrap_or(today),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::Position;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn guard() -> OrderGuard {
        OrderGuard::new(TradingConfig::default(), FeeSchedule::default()).unwrap()
    }

    fn request(side: OrderSide, symbol: &str, quantity: i64, price: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            name: String::new(),
            side,
            quantity,
            price,
            reason: String::new(),
        }
    }

    fn holding(symbol: &str, quantity: i64, last_buy_date: Option<NaiveDate>) -> Position {
        Position {
            portfolio_id: 1,
            symbol: symbol.to_string(),
            name: String::new(),
            quantity,
            avg_cost: dec!(10),
            current_price: dec!(10),
            last_buy_date,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn buy_beyond_cash_is_insufficient_funds() {
        let book = Book::new(1, dec!(1000000));
        let err = guard()
            .validate(&request(OrderSide::Buy, "600519", 1000, dec!(1500)), &book, 0, today())
            .unwrap_err();
        assert_eq!(
            err,
            TradeRejection::InsufficientFunds {
                required: dec!(1500450),
                available: dec!(1000000),
            }
        );
    }

    #[test]
    fn buy_within_limits_passes() {
        let book = Book::new(1, dec!(1000000));
        assert!(guard()
            .validate(&request(OrderSide::Buy, "600519", 100, dec!(1500)), &book, 0, today())
            .is_ok());
    }

    #[test]
    fn buy_above_position_ratio_is_rejected() {
        let book = Book::new(1, dec!(1000000));
        // 30_000 * 10 = 300_000 > 0.2 * 1_000_000
        let err = guard()
            .validate(&request(OrderSide::Buy, "000001", 30000, dec!(10)), &book, 0, today())
            .unwrap_err();
        assert_eq!(
            err,
            TradeRejection::PositionLimitExceeded {
                notional: dec!(300000),
                limit: dec!(200000.0),
            }
        );
    }

    #[test]
    fn new_symbol_beyond_max_holdings_is_rejected() {
        let mut limits = TradingConfig::default();
        limits.max_holdings = 2;
        let guard = OrderGuard::new(limits, FeeSchedule::default()).unwrap();
        let book = Book::with_positions(
            1,
            dec!(1000000),
            [holding("600000", 100, None), holding("600036", 100, None)],
        );

        let err = guard
            .validate(&request(OrderSide::Buy, "000001", 100, dec!(10)), &book, 0, today())
            .unwrap_err();
        assert_eq!(err, TradeRejection::HoldingsLimitExceeded { held: 2, max: 2 });

        // adding to an existing holding does not open a new slot
        assert!(guard
            .validate(&request(OrderSide::Buy, "600036", 100, dec!(10)), &book, 0, today())
            .is_ok());
    }

    #[test]
    fn overselling_is_insufficient_holdings() {
        let book = Book::with_positions(1, dec!(0), [holding("600036", 100, None)]);
        let err = guard()
            .validate(&request(OrderSide::Sell, "600036", 200, dec!(10)), &book, 0, today())
            .unwrap_err();
        assert!(matches!(
            err,
            TradeRejection::InsufficientHoldings { requested: 200, available: 100, .. }
        ));
    }

    #[test]
    fn odd_lot_oversell_is_insufficient_holdings() {
        let book = Book::with_positions(1, dec!(0), [holding("600036", 100, None)]);
        let g = guard();

        let err = g
            .validate(&request(OrderSide::Sell, "600036", 150, dec!(10)), &book, 0, today())
            .unwrap_err();
        assert_eq!(
            err,
            TradeRejection::InsufficientHoldings {
                symbol: "600036".to_string(),
                requested: 150,
                available: 100,
            }
        );

        let err = g
            .validate(&request(OrderSide::Sell, "000001", 50, dec!(10)), &book, 0, today())
            .unwrap_err();
        assert_eq!(
            err,
            TradeRejection::InsufficientHoldings {
                symbol: "000001".to_string(),
                requested: 50,
                available: 0,
            }
        );

        // an odd lot below the holding is still a lot violation
        let partial = Book::with_positions(1, dec!(0), [holding("600036", 150, None)]);
        assert!(matches!(
            g.validate(&request(OrderSide::Sell, "600036", 50, dec!(10)), &partial, 0, today()),
            Err(TradeRejection::InvalidQuantity(_))
        ));
    }

    #[test]
    fn same_day_sell_hits_settlement_lock_only_when_enforced() {
        let book = Book::with_positions(1, dec!(0), [holding("600036", 100, Some(today()))]);
        let sell = request(OrderSide::Sell, "600036", 100, dec!(11));

        let err = guard().validate(&sell, &book, 0, today()).unwrap_err();
        assert!(matches!(err, TradeRejection::SettlementLocked { .. }));

        let mut limits = TradingConfig::default();
        limits.enforce_settlement_lock = false;
        let lenient = OrderGuard::new(limits, FeeSchedule::default()).unwrap();
        assert!(lenient.validate(&sell, &book, 0, today()).is_ok());

        let tomorrow = today().succ_opt().unwrap();
        assert!(guard().validate(&sell, &book, 0, tomorrow).is_ok());
    }

    #[test]
    fn lot_rules_and_daily_limit() {
        let book = Book::with_positions(1, dec!(1000000), [holding("600036", 150, None)]);
        let g = guard();

        let odd_buy = request(OrderSide::Buy, "600036", 150, dec!(10));
        assert!(matches!(
            g.validate(&odd_buy, &book, 0, today()),
            Err(TradeRejection::InvalidQuantity(_))
        ));

        // odd lot allowed when closing the full holding
        let close_all = request(OrderSide::Sell, "600036", 150, dec!(10));
        assert!(g.validate(&close_all, &book, 0, today()).is_ok());

        let zero_price = request(OrderSide::Buy, "600036", 100, Decimal::ZERO);
        assert_eq!(
            g.validate(&zero_price, &book, 0, today()),
            Err(TradeRejection::InvalidPrice(Decimal::ZERO))
        );

        let ok_buy = request(OrderSide::Buy, "600036", 100, dec!(10));
        assert_eq!(
            g.validate(&ok_buy, &book, 10, today()),
            Err(TradeRejection::DailyTradeLimitExceeded { count: 10, limit: 10 })
        );
    }
}
