//! Candidate selection
//!
//! Pure price-time priority logic over a fetched book: sort both sides,
//! pick the best buy and best sell, decide matchability, trade price and
//! fill quantity. No I/O here; the sweeper feeds it order payloads and
//! executes the plan it returns.

use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::models::Order;

/// An order as it sits in a book side: ledger contract id plus payload.
#[derive(Debug, Clone)]
pub struct BookOrder {
    pub contract_id: String,
    pub order: Order,
}

/// An executable match: the chosen pair of orders plus settlement math.
#[derive(Debug, Clone)]
pub struct MatchPlan {
    pub buy: BookOrder,
    pub sell: BookOrder,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Outcome of scanning a pair's book for the next match.
#[derive(Debug)]
pub enum Selection {
    Match(MatchPlan),
    /// Best candidates do not cross (or a side is empty).
    NoMatch,
    /// A candidate crossed but no trade price could be derived
    /// (both MARKET with no last price). Operational error.
    PriceUnavailable { buy_id: String, sell_id: String },
}

// ============================================================================
// Priority ordering
// ============================================================================

/// Buys: highest price first, MARKET sorts as +infinity; ties by earliest
/// timestamp, then lexicographic order id.
pub fn sort_buys(buys: &mut [BookOrder]) {
    buys.sort_by(compare_buys);
}

/// Sells: lowest price first, MARKET sorts as -infinity; same tie-breaks.
pub fn sort_sells(sells: &mut [BookOrder]) {
    sells.sort_by(compare_sells);
}

fn compare_buys(a: &BookOrder, b: &BookOrder) -> Ordering {
    // None = MARKET = +inf, so None sorts before any limit price.
    match (a.order.price, b.order.price) {
        (None, None) => time_priority(a, b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(pa), Some(pb)) => pb.cmp(&pa).then_with(|| time_priority(a, b)),
    }
}

fn compare_sells(a: &BookOrder, b: &BookOrder) -> Ordering {
    // None = MARKET = -inf, so None sorts before any limit price.
    match (a.order.price, b.order.price) {
        (None, None) => time_priority(a, b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(pa), Some(pb)) => pa.cmp(&pb).then_with(|| time_priority(a, b)),
    }
}

fn time_priority(a: &BookOrder, b: &BookOrder) -> Ordering {
    a.order
        .timestamp
        .cmp(&b.order.timestamp)
        .then_with(|| a.order.order_id.cmp(&b.order.order_id))
}

// ============================================================================
// Matchability and settlement math
// ============================================================================

/// `buy.price >= sell.price`, with MARKET treated as the matching infinity.
fn crosses(buy: &Order, sell: &Order) -> bool {
    match (buy.price, sell.price) {
        (None, _) | (_, None) => true,
        (Some(bid), Some(ask)) => bid >= ask,
    }
}

/// The resting order's price wins. The resting order is the earlier one;
/// with MARKET involved the LIMIT price applies; two MARKET orders fall
/// back to the book's last price.
fn trade_price(buy: &Order, sell: &Order, last_price: Option<Decimal>) -> Option<Decimal> {
    match (buy.price, sell.price) {
        (Some(bid), Some(ask)) => {
            if resting_first(buy, sell) {
                Some(bid)
            } else {
                Some(ask)
            }
        }
        (Some(bid), None) => Some(bid),
        (None, Some(ask)) => Some(ask),
        (None, None) => last_price,
    }
}

fn resting_first(buy: &Order, sell: &Order) -> bool {
    (buy.timestamp, buy.order_id.as_str()) <= (sell.timestamp, sell.order_id.as_str())
}

/// Scan sorted sides for the next executable match.
///
/// Self-trade prevention: when the heads share an owner the side whose
/// head order is older is advanced past for this scan, no trade is
/// produced and neither order is touched.
pub fn select(buys: &[BookOrder], sells: &[BookOrder], last_price: Option<Decimal>) -> Selection {
    let mut bi = 0;
    let mut si = 0;

    loop {
        let (Some(buy), Some(sell)) = (buys.get(bi), sells.get(si)) else {
            return Selection::NoMatch;
        };

        if !crosses(&buy.order, &sell.order) {
            return Selection::NoMatch;
        }

        if buy.order.owner == sell.order.owner {
            if resting_first(&buy.order, &sell.order) {
                bi += 1;
            } else {
                si += 1;
            }
            continue;
        }

        let Some(price) = trade_price(&buy.order, &sell.order, last_price) else {
            return Selection::PriceUnavailable {
                buy_id: buy.order.order_id.clone(),
                sell_id: sell.order.order_id.clone(),
            };
        };

        let quantity = buy.order.remaining().min(sell.order.remaining());
        return Selection::Match(MatchPlan {
            buy: buy.clone(),
            sell: sell.clone(),
            price,
            quantity,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderMode, OrderStatus, Side, TradingPair};
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry(
        id: &str,
        owner: &str,
        side: Side,
        price: Option<Decimal>,
        quantity: Decimal,
        ts: i64,
    ) -> BookOrder {
        BookOrder {
            contract_id: format!("#{}", id),
            order: Order {
                order_id: id.to_string(),
                owner: owner.to_string(),
                side,
                mode: if price.is_some() {
                    OrderMode::Limit
                } else {
                    OrderMode::Market
                },
                pair: TradingPair::parse("BTC/USDT").unwrap(),
                price,
                quantity,
                filled: Decimal::ZERO,
                status: OrderStatus::Open,
                timestamp: at(ts),
                locked_holding_ref: format!("#h-{}", id),
                operator: "operator".into(),
            },
        }
    }

    #[test]
    fn buys_sort_highest_price_then_time() {
        let mut buys = vec![
            entry("b1", "a", Side::Buy, Some(dec!(100)), dec!(1), 3),
            entry("b2", "b", Side::Buy, Some(dec!(101)), dec!(1), 5),
            entry("b3", "c", Side::Buy, Some(dec!(100)), dec!(1), 1),
        ];
        sort_buys(&mut buys);
        let ids: Vec<_> = buys.iter().map(|e| e.order.order_id.as_str()).collect();
        assert_eq!(ids, ["b2", "b3", "b1"]);
    }

    #[test]
    fn sells_sort_lowest_price_then_time() {
        let mut sells = vec![
            entry("s1", "a", Side::Sell, Some(dec!(51000)), dec!(1), 1),
            entry("s2", "b", Side::Sell, Some(dec!(50000)), dec!(1), 5),
        ];
        sort_sells(&mut sells);
        // Lower sell price wins regardless of age.
        assert_eq!(sells[0].order.order_id, "s2");
    }

    #[test]
    fn market_orders_sort_to_the_front() {
        let mut buys = vec![
            entry("b1", "a", Side::Buy, Some(dec!(999999)), dec!(1), 1),
            entry("b2", "b", Side::Buy, None, dec!(1), 9),
        ];
        sort_buys(&mut buys);
        assert_eq!(buys[0].order.order_id, "b2");

        let mut sells = vec![
            entry("s1", "a", Side::Sell, Some(dec!(1)), dec!(1), 1),
            entry("s2", "b", Side::Sell, None, dec!(1), 9),
        ];
        sort_sells(&mut sells);
        assert_eq!(sells[0].order.order_id, "s2");
    }

    #[test]
    fn equal_timestamp_breaks_by_order_id() {
        let mut buys = vec![
            entry("b-z", "a", Side::Buy, Some(dec!(100)), dec!(1), 1),
            entry("b-a", "b", Side::Buy, Some(dec!(100)), dec!(1), 1),
        ];
        sort_buys(&mut buys);
        assert_eq!(buys[0].order.order_id, "b-a");
    }

    #[test]
    fn touch_trades_at_resting_price() {
        let sells = vec![entry("s1", "alice", Side::Sell, Some(dec!(50000)), dec!(1), 1)];
        let buys = vec![entry("b1", "bob", Side::Buy, Some(dec!(50000)), dec!(1), 2)];

        match select(&buys, &sells, None) {
            Selection::Match(plan) => {
                assert_eq!(plan.price, dec!(50000));
                assert_eq!(plan.quantity, dec!(1));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn resting_buy_price_wins() {
        // Bob's buy at 51000 rests; Alice sells at 50000 later. The trade
        // executes at the resting order's 51000.
        let buys = vec![entry("b1", "bob", Side::Buy, Some(dec!(51000)), dec!(1), 1)];
        let sells = vec![entry("s1", "alice", Side::Sell, Some(dec!(50000)), dec!(1), 2)];

        match select(&buys, &sells, None) {
            Selection::Match(plan) => assert_eq!(plan.price, dec!(51000)),
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn market_taker_gets_limit_price() {
        let sells = vec![entry("s1", "alice", Side::Sell, Some(dec!(50000)), dec!(1), 1)];
        let buys = vec![entry("b1", "bob", Side::Buy, None, dec!(1), 2)];

        match select(&buys, &sells, None) {
            Selection::Match(plan) => assert_eq!(plan.price, dec!(50000)),
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn no_cross_means_no_match() {
        let buys = vec![entry("b1", "bob", Side::Buy, Some(dec!(49000)), dec!(1), 1)];
        let sells = vec![entry("s1", "alice", Side::Sell, Some(dec!(50000)), dec!(1), 2)];
        assert!(matches!(select(&buys, &sells, None), Selection::NoMatch));
    }

    #[test]
    fn empty_side_means_no_match() {
        let buys = vec![entry("b1", "bob", Side::Buy, None, dec!(1), 1)];
        assert!(matches!(select(&buys, &[], None), Selection::NoMatch));
    }

    #[test]
    fn partial_fill_quantity_is_min_remaining() {
        let sells = vec![entry("s1", "alice", Side::Sell, Some(dec!(50000)), dec!(0.3), 1)];
        let buys = vec![entry("b1", "bob", Side::Buy, Some(dec!(50000)), dec!(1.0), 2)];

        match select(&buys, &sells, None) {
            Selection::Match(plan) => {
                assert_eq!(plan.quantity, dec!(0.3));
                assert_eq!(plan.price, dec!(50000));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn self_trade_is_skipped_without_a_trade() {
        let sells = vec![entry("s1", "alice", Side::Sell, Some(dec!(50000)), dec!(1), 1)];
        let buys = vec![entry("b1", "alice", Side::Buy, Some(dec!(50000)), dec!(1), 2)];

        // Only Alice on both sides: no trade may be produced.
        assert!(matches!(select(&buys, &sells, None), Selection::NoMatch));
    }

    #[test]
    fn self_trade_advances_past_older_head() {
        // Alice's sell (older) blocks; skipping it lets Carol's sell match.
        let sells = vec![
            entry("s1", "alice", Side::Sell, Some(dec!(50000)), dec!(1), 1),
            entry("s2", "carol", Side::Sell, Some(dec!(50000)), dec!(1), 3),
        ];
        let buys = vec![entry("b1", "alice", Side::Buy, Some(dec!(50000)), dec!(1), 2)];

        match select(&buys, &sells, None) {
            Selection::Match(plan) => {
                assert_eq!(plan.sell.order.order_id, "s2");
                assert_eq!(plan.buy.order.order_id, "b1");
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn time_priority_at_equal_price() {
        let sells = vec![
            entry("s-alice", "alice", Side::Sell, Some(dec!(50000)), dec!(1), 1),
            entry("s-carol", "carol", Side::Sell, Some(dec!(50000)), dec!(1), 2),
        ];
        let mut sorted = sells.clone();
        sort_sells(&mut sorted);
        let buys = vec![entry("b1", "bob", Side::Buy, Some(dec!(50000)), dec!(1), 3)];

        match select(&buys, &sorted, None) {
            Selection::Match(plan) => assert_eq!(plan.sell.order.order_id, "s-alice"),
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn price_priority_beats_age() {
        let mut sells = vec![
            entry("s-old", "alice", Side::Sell, Some(dec!(51000)), dec!(1), 1),
            entry("s-new", "carol", Side::Sell, Some(dec!(50000)), dec!(1), 2),
        ];
        sort_sells(&mut sells);
        let buys = vec![entry("b1", "bob", Side::Buy, Some(dec!(51000)), dec!(1), 3)];

        match select(&buys, &sells, None) {
            Selection::Match(plan) => {
                assert_eq!(plan.sell.order.order_id, "s-new");
                assert_eq!(plan.price, dec!(50000));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn two_market_orders_fall_back_to_last_price() {
        let buys = vec![entry("b1", "bob", Side::Buy, None, dec!(1), 1)];
        let sells = vec![entry("s1", "alice", Side::Sell, None, dec!(1), 2)];

        match select(&buys, &sells, Some(dec!(42000))) {
            Selection::Match(plan) => assert_eq!(plan.price, dec!(42000)),
            other => panic!("expected match, got {:?}", other),
        }

        assert!(matches!(
            select(&buys, &sells, None),
            Selection::PriceUnavailable { .. }
        ));
    }
}
