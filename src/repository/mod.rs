//! Orderbook Repository
//!
//! In-memory index of the current `OrderBook` contract per trading pair.
//! The ledger is the source of truth; this cache is a performance hint and
//! may be stale. Entries are refreshed on miss, on `Conflict`, and from
//! stream events, with a CAS on the source offset so late events cannot
//! overwrite newer state.

use std::sync::Arc;

use dashmap::DashMap;

use crate::ledger::{LedgerClient, LedgerError};
use crate::models::{OrderBook, TradingPair};

/// An `OrderBook` contract: id plus decoded payload.
#[derive(Debug, Clone)]
pub struct OrderBookContract {
    pub contract_id: String,
    pub book: OrderBook,
}

#[derive(Debug, Clone)]
struct BookEntry {
    contract: OrderBookContract,
    /// Offset of the transaction that produced this contract version.
    offset: u64,
}

pub struct BookRepository {
    ledger: Arc<LedgerClient>,
    books: DashMap<TradingPair, BookEntry>,
}

impl BookRepository {
    pub fn new(ledger: Arc<LedgerClient>) -> Self {
        Self {
            ledger,
            books: DashMap::new(),
        }
    }

    /// Current book contract for `pair`, from cache or a ledger query.
    /// `None` means no book exists for the pair.
    pub async fn current(
        &self,
        pair: &TradingPair,
    ) -> Result<Option<OrderBookContract>, LedgerError> {
        if let Some(entry) = self.books.get(pair) {
            return Ok(Some(entry.contract.clone()));
        }
        self.refresh(pair).await
    }

    /// Re-query the ledger for `pair`, replacing the cached entry.
    pub async fn refresh(
        &self,
        pair: &TradingPair,
    ) -> Result<Option<OrderBookContract>, LedgerError> {
        let template = self.ledger.order_book_template().await?;
        let contracts = self
            .ledger
            .query_active(&[template], self.ledger.operator_party())
            .await?;

        let mut candidates: Vec<(OrderBookContract, u64)> = Vec::new();
        for active in contracts {
            let book: OrderBook = active.decode()?;
            if &book.pair == pair {
                candidates.push((
                    OrderBookContract {
                        contract_id: active.contract_id,
                        book,
                    },
                    active.offset,
                ));
            }
        }

        if candidates.len() > 1 {
            // Operational anomaly: exactly one book should exist per pair.
            tracing::warn!(
                pair = %pair,
                count = candidates.len(),
                "Multiple OrderBook contracts for pair, selecting latest creation offset"
            );
        }

        let Some((contract, offset)) = candidates
            .into_iter()
            .max_by_key(|(_, offset)| *offset)
        else {
            self.books.remove(pair);
            return Ok(None);
        };

        self.store(pair.clone(), contract.clone(), offset);
        Ok(Some(contract))
    }

    /// Apply a book replacement observed on the update stream. Ignored if
    /// the cached entry already reflects a later offset.
    pub fn apply_event(&self, contract: OrderBookContract, offset: u64) {
        self.store(contract.book.pair.clone(), contract, offset);
    }

    /// Drop the cached entry, typically after a `Conflict`.
    pub fn invalidate(&self, pair: &TradingPair) {
        self.books.remove(pair);
    }

    pub fn cached_pairs(&self) -> Vec<TradingPair> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    fn store(&self, pair: TradingPair, contract: OrderBookContract, offset: u64) {
        match self.books.entry(pair) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().offset <= offset {
                    occupied.insert(BookEntry { contract, offset });
                } else {
                    tracing::debug!(
                        pair = %occupied.key(),
                        stale = offset,
                        current = occupied.get().offset,
                        "Ignoring stale book update"
                    );
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(BookEntry { contract, offset });
            }
        }
    }

    #[cfg(test)]
    fn cached(&self, pair: &TradingPair) -> Option<(String, u64)> {
        self.books
            .get(pair)
            .map(|entry| (entry.contract.contract_id.clone(), entry.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenProvider;

    fn repo() -> BookRepository {
        let tokens = Arc::new(TokenProvider::new("http://localhost/token", "id", "secret"));
        let ledger = Arc::new(LedgerClient::new(
            "http://localhost:7575",
            "operator",
            tokens,
            30_000,
        ));
        BookRepository::new(ledger)
    }

    fn contract(id: &str) -> OrderBookContract {
        OrderBookContract {
            contract_id: id.to_string(),
            book: OrderBook {
                pair: TradingPair::parse("BTC/USDT").unwrap(),
                buy_orders: vec![],
                sell_orders: vec![],
                last_price: None,
                operator: "operator".into(),
            },
        }
    }

    #[test]
    fn later_offset_wins() {
        let repo = repo();
        let pair = TradingPair::parse("BTC/USDT").unwrap();

        repo.apply_event(contract("#book-1"), 10);
        repo.apply_event(contract("#book-2"), 20);
        assert_eq!(repo.cached(&pair), Some(("#book-2".into(), 20)));
    }

    #[test]
    fn stale_event_cannot_overwrite() {
        let repo = repo();
        let pair = TradingPair::parse("BTC/USDT").unwrap();

        repo.apply_event(contract("#book-2"), 20);
        repo.apply_event(contract("#book-1"), 10);
        assert_eq!(repo.cached(&pair), Some(("#book-2".into(), 20)));
    }

    #[test]
    fn invalidate_drops_entry() {
        let repo = repo();
        let pair = TradingPair::parse("BTC/USDT").unwrap();

        repo.apply_event(contract("#book-1"), 10);
        repo.invalidate(&pair);
        assert_eq!(repo.cached(&pair), None);
        assert!(repo.cached_pairs().is_empty());
    }
}
