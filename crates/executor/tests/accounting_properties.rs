//! Property-based tests for the accounting invariants of `Book`.

use chrono::{NaiveDate, Utc};
use configuration::FeeSchedule;
use core_types::OrderSide;
use executor::{Book, Execution, calculate_fees};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// =============================================================================
// Generators
// =============================================================================

/// A price between 1.00 and 2000.00 with cent precision.
fn arb_price() -> impl Strategy<Value = Decimal> {
    (100i64..200_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// A quantity of 1 to 50 board lots.
fn arb_lots() -> impl Strategy<Value = i64> {
    (1i64..=50).prop_map(|lots| lots * 100)
}

fn arb_side() -> impl Strategy<Value = OrderSide> {
    prop_oneof![Just(OrderSide::Buy), Just(OrderSide::Sell)]
}

fn fill(side: OrderSide, quantity: i64, price: Decimal) -> Execution {
    let notional = price * Decimal::from(quantity);
    Execution {
        symbol: "600036".to_string(),
        side,
        price,
        quantity,
        fees: calculate_fees(&FeeSchedule::default(), side, notional),
        timestamp: Utc::now(),
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// The average cost after any sequence of buys is the notional-weighted mean
    /// of the fills.
    #[test]
    fn average_cost_is_weighted_mean_of_buys(
        buys in prop::collection::vec((arb_lots(), arb_price()), 1..12)
    ) {
        let mut book = Book::new(1, dec!(1000000000));
        let mut total_qty = 0i64;
        let mut total_notional = Decimal::ZERO;

        for (qty, price) in &buys {
            book.apply(&fill(OrderSide::Buy, *qty, *price), "", today()).unwrap();
            total_qty += qty;
            total_notional += *price * Decimal::from(*qty);
        }

        let pos = book.position("600036").unwrap();
        prop_assert_eq!(pos.quantity, total_qty);
        let expected = total_notional / Decimal::from(total_qty);
        prop_assert!((pos.avg_cost - expected).abs() < dec!(0.0000000001));
    }

    /// Sells never move the average cost of the shares that remain.
    #[test]
    fn sells_preserve_average_cost(
        lots in 2i64..=50,
        buy_price in arb_price(),
        sell_price in arb_price(),
        sell_fraction in 1i64..100,
    ) {
        let mut book = Book::new(1, dec!(1000000000));
        book.apply(&fill(OrderSide::Buy, lots * 100, buy_price), "", today()).unwrap();
        let before = book.position("600036").unwrap().avg_cost;

        let sell_qty = ((lots * sell_fraction / 100).max(1)).min(lots - 1) * 100;
        book.apply(&fill(OrderSide::Sell, sell_qty, sell_price), "", today()).unwrap();

        let pos = book.position("600036").unwrap();
        prop_assert_eq!(pos.avg_cost, before);
        prop_assert_eq!(pos.quantity, lots * 100 - sell_qty);
    }

    /// Cash equals the initial capital minus every buy debit plus every sell credit.
    #[test]
    fn cash_matches_fill_ledger(
        trades in prop::collection::vec((arb_side(), arb_lots(), arb_price()), 1..20)
    ) {
        let initial = dec!(100000000);
        let mut book = Book::new(1, initial);
        let mut expected = initial;

        for (side, qty, price) in trades {
            let exec = fill(side, qty, price);
            if book.apply(&exec, "", today()).is_ok() {
                let notional = exec.notional();
                expected += match side {
                    OrderSide::Buy => -(notional + exec.fees.commission),
                    OrderSide::Sell => notional - exec.fees.commission - exec.fees.stamp_duty,
                };
            }
        }

        prop_assert_eq!(book.cash, expected);
        prop_assert!(book.cash >= Decimal::ZERO);
        prop_assert!(book.positions.values().all(|p| p.quantity > 0));
    }
}
