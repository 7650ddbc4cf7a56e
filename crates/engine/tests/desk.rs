mod common;

use common::*;
use core_types::{Candidate, OrderStatus, Sentiment, TradeAction, TriggerKind};
use engine::EngineError;
use events::{DeskEvent, LogLevel};
use rust_decimal_macros::dec;

fn candidate(symbol: &str) -> Candidate {
    Candidate {
        symbol: symbol.to_string(),
        name: format!("{symbol} Co"),
        price: Some(dec!(10)),
        change_pct: Some(1.2),
        amount: None,
        turnover_rate: None,
        pe_ratio: None,
        market_cap: None,
        indicators: None,
    }
}

#[tokio::test]
async fn cycle_executes_non_hold_decisions_and_records_the_run() {
    let h = harness().await;
    h.market.set_index(3050.0, 0.8);
    h.market.set_price("600519", dec!(1500));
    h.market.set_price("000002", dec!(10));
    *h.market.hot.lock().unwrap() = vec![candidate("600519"), candidate("000002")];
    h.decisions.script(vec![
        decision("600519", TradeAction::Buy, 100),
        decision("000001", TradeAction::Hold, 0),
        decision("000002", TradeAction::Sell, 100),
    ]);

    let report = h.desk.run_cycle(TriggerKind::Hourly).await.unwrap();

    assert_eq!(report.trigger, TriggerKind::Hourly);
    assert_eq!(report.decision_count, 3);
    assert_eq!(report.filled, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);
    assert!(report.decision_error.is_none());
    assert_eq!(report.orders.len(), 2);
    // the decision name was empty, so the quote's name is used
    assert_eq!(report.orders[0].name, "600519 Co");

    let market = h.decisions.seen_market.lock().unwrap().clone().unwrap();
    assert_eq!(market.sentiment, Sentiment::Bullish);
    assert_eq!(market.index_level, Some(3050.0));
    assert_eq!(*h.decisions.seen_candidates.lock().unwrap(), 2);

    let runs = h.desk.analysis_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, report.run_id);
    assert_eq!(runs[0].trigger, TriggerKind::Hourly);
    assert_eq!(runs[0].filled, 1);
    assert_eq!(runs[0].failed, 1);
    assert!(runs[0].decisions_json.contains("600519"));

    let last = h.desk.last_report().await.unwrap();
    assert_eq!(last.run_id, report.run_id);
}

#[tokio::test]
async fn decision_without_quote_is_skipped_not_failed() {
    let h = harness().await;
    h.decisions
        .script(vec![decision("688981", TradeAction::Buy, 100)]);

    let report = h.desk.run_cycle(TriggerKind::PreOpen).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.filled + report.failed, 0);
    assert!(h.desk.orders(50, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn unavailable_index_yields_unknown_sentiment() {
    let h = harness().await;
    h.desk.run_cycle(TriggerKind::Midday).await.unwrap();

    let market = h.decisions.seen_market.lock().unwrap().clone().unwrap();
    assert_eq!(market.sentiment, Sentiment::Unknown);
    assert!(market.index_level.is_none());
    assert!(market.index_change_pct.is_none());
}

#[tokio::test]
async fn failed_decision_call_reports_a_neutral_run() {
    let h = harness().await;
    h.market.set_price("600519", dec!(1500));
    h.decisions
        .script(vec![decision("600519", TradeAction::Buy, 100)]);
    h.decisions.fail_next();

    let report = h.desk.run_cycle(TriggerKind::Hourly).await.unwrap();

    assert_eq!(report.sentiment, Sentiment::Neutral);
    assert_eq!(report.decision_count, 0);
    assert!(report.decision_error.as_deref().unwrap().contains("500"));
    assert!(h.desk.orders(50, 0).await.unwrap().is_empty());

    let runs = h.desk.analysis_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].sentiment, Sentiment::Neutral);
    assert!(runs[0].summary.starts_with("decision generation failed"));
}

#[tokio::test]
async fn failed_decision_call_is_published_as_a_warning() {
    let h = harness().await;
    let mut events = h.desk.subscribe();
    h.decisions.fail_next();

    h.desk.run_cycle(TriggerKind::Hourly).await.unwrap();

    match events.try_recv().unwrap() {
        DeskEvent::Log(message) => {
            assert_eq!(message.level, LogLevel::Warn);
            assert!(message.message.contains("model overloaded"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn ledger_failure_mid_cycle_still_records_the_run() {
    let h = harness().await;
    let mut events = h.desk.subscribe();
    h.market.set_price("600519", dec!(1500));
    h.market.set_price("000002", dec!(10));
    h.decisions.script(vec![
        decision("600519", TradeAction::Buy, 100),
        decision("000002", TradeAction::Buy, 100),
    ]);
    sqlx::query("DROP TABLE orders")
        .execute(h.desk.coordinator().ledger().pool())
        .await
        .unwrap();

    let err = h.desk.run_cycle(TriggerKind::Hourly).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));

    let runs = h.desk.analysis_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].decision_count, 2);
    assert_eq!(runs[0].filled, 0);
    assert_eq!(runs[0].failed, 0);
    assert!(runs[0].decisions_json.contains("000002"));

    let last = h.desk.last_report().await.unwrap();
    assert_eq!(last.run_id, runs[0].id);
    assert!(last.execution_error.is_some());

    // nothing was booked against the portfolio
    let snapshot = h.desk.snapshot().await.unwrap();
    assert_eq!(snapshot.cash, dec!(1000000));
    assert!(snapshot.positions.is_empty());

    match events.try_recv().unwrap() {
        DeskEvent::Log(message) => assert_eq!(message.level, LogLevel::Error),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn stop_loss_closes_the_whole_position() {
    let h = harness().await;
    h.desk
        .execute(&proposal("000651", TradeAction::Buy, 100, dec!(10)))
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::days(1));
    h.market.set_price("000651", dec!(9));

    let report = h.desk.run_cycle(TriggerKind::Hourly).await.unwrap();

    assert_eq!(report.filled, 1);
    let exit = &report.orders[0];
    assert_eq!(exit.quantity, 100);
    assert!(exit.reason.starts_with("stop-loss triggered at -10.00%"));
    assert!(h.desk.snapshot().await.unwrap().positions.is_empty());
}

#[tokio::test]
async fn take_profit_sells_half_rounded_to_a_lot() {
    let h = harness().await;
    h.desk
        .execute(&proposal("000651", TradeAction::Buy, 300, dec!(10)))
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::days(1));
    h.market.set_price("000651", dec!(12.5));

    let report = h.desk.run_cycle(TriggerKind::Hourly).await.unwrap();

    assert_eq!(report.filled, 1);
    assert_eq!(report.orders[0].quantity, 100);
    let snapshot = h.desk.snapshot().await.unwrap();
    assert_eq!(snapshot.positions[0].quantity, 200);
    assert_eq!(snapshot.positions[0].current_price, dec!(12.5));
}

#[tokio::test]
async fn protective_exits_leave_same_day_buys_alone() {
    let h = harness().await;
    h.desk
        .execute(&proposal("000651", TradeAction::Buy, 100, dec!(10)))
        .await
        .unwrap();
    h.market.set_price("000651", dec!(9));

    let report = h.desk.run_cycle(TriggerKind::Hourly).await.unwrap();

    assert_eq!(report.filled + report.failed, 0);
    assert_eq!(h.desk.snapshot().await.unwrap().positions[0].quantity, 100);
}

#[tokio::test]
async fn exits_can_be_switched_off() {
    let mut config = test_config();
    config.trading.protective_exits = false;
    let h = harness_with(config).await;
    h.desk
        .execute(&proposal("000651", TradeAction::Buy, 100, dec!(10)))
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::days(1));
    h.market.set_price("000651", dec!(5));

    let report = h.desk.run_cycle(TriggerKind::Hourly).await.unwrap();
    assert_eq!(report.orders.len(), 0);
}

#[tokio::test]
async fn manual_analysis_publishes_events() {
    let h = harness().await;
    let mut events = h.desk.subscribe();
    h.market.set_price("600519", dec!(1500));
    h.decisions
        .script(vec![decision("600519", TradeAction::Buy, 100)]);

    let outcome = h.desk.manual_analysis().await.unwrap();
    assert_eq!(outcome.report.trigger, TriggerKind::Manual);
    assert_eq!(outcome.snapshot.positions.len(), 1);

    match events.try_recv().unwrap() {
        DeskEvent::OrderRecorded(order) => assert_eq!(order.status, OrderStatus::Filled),
        other => panic!("unexpected event {other:?}"),
    }
    match events.try_recv().unwrap() {
        DeskEvent::AnalysisCompleted(summary) => {
            assert_eq!(summary.run_id, outcome.report.run_id);
            assert_eq!(summary.filled, 1);
        }
        other => panic!("unexpected event {other:?}"),
    }
    match events.try_recv().unwrap() {
        DeskEvent::PortfolioState(snapshot) => assert_eq!(snapshot.cash, dec!(849955)),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn reset_recreates_the_portfolio_with_initial_capital() {
    let h = harness().await;
    let original = h.desk.portfolio_id();
    h.desk
        .execute(&proposal("600519", TradeAction::Buy, 100, dec!(1500)))
        .await
        .unwrap();
    h.desk.run_cycle(TriggerKind::Hourly).await.unwrap();

    let fresh = h.desk.reset().await.unwrap();

    assert_ne!(fresh.id, original);
    assert_eq!(h.desk.portfolio_id(), fresh.id);
    assert_eq!(fresh.cash, dec!(1000000));
    let snapshot = h.desk.snapshot().await.unwrap();
    assert!(snapshot.positions.is_empty());
    assert!(h.desk.orders(50, 0).await.unwrap().is_empty());
    assert!(h.desk.analysis_runs(10).await.unwrap().is_empty());
    assert!(h.desk.last_report().await.is_none());
}

#[tokio::test]
async fn order_history_is_paged_newest_first() {
    let h = harness().await;
    for symbol in ["000001", "000002", "000003"] {
        h.desk
            .execute(&proposal(symbol, TradeAction::Buy, 100, dec!(10)))
            .await
            .unwrap();
    }
    let first_page = h.desk.orders(2, 0).await.unwrap();
    assert_eq!(first_page.len(), 2);
    assert_eq!(first_page[0].symbol, "000003");
    let second_page = h.desk.orders(2, 1).await.unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].symbol, "000001");
}
