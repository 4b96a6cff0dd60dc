//! Per-instrument order-book record.
//!
//! Ladders map price to aggregate resting amount, sorted ascending. The
//! top-of-book fields are a cache recomputed from the ladders after every
//! applied update; a zero `best_bid_price`/`best_ask_price` means that side
//! is empty. An unknown instrument is represented by a default-constructed
//! book with an empty `instrument_name`.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

/// Price-keyed ladder side. `OrderedFloat` gives the f64 keys a total order.
pub type Ladder = BTreeMap<OrderedFloat<f64>, f64>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Orderbook {
    pub instrument_name: String,
    /// Exchange-supplied milliseconds of the last applied update.
    pub timestamp: i64,
    /// Exchange-supplied sequence number of the last applied update.
    pub change_id: i64,
    pub best_bid_price: f64,
    pub best_bid_amount: f64,
    pub best_ask_price: f64,
    pub best_ask_amount: f64,
    pub bids: Ladder,
    pub asks: Ladder,
}

impl Orderbook {
    /// Whether a snapshot has ever named this book. Queries for unknown
    /// symbols return a book for which this is false.
    #[inline]
    pub fn is_known(&self) -> bool {
        !self.instrument_name.is_empty()
    }

    /// Clear both ladders. Used when a snapshot replaces the book.
    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Set the amount at `price`, deleting the level when `amount` is zero.
    pub fn set_level(ladder: &mut Ladder, price: f64, amount: f64) {
        if amount == 0.0 {
            ladder.remove(&OrderedFloat(price));
        } else {
            ladder.insert(OrderedFloat(price), amount);
        }
    }

    /// Remove the level at `price` regardless of amount. No-op when absent.
    pub fn delete_level(ladder: &mut Ladder, price: f64) {
        ladder.remove(&OrderedFloat(price));
    }

    /// Recompute the top-of-book cache from the ladders. The ladders are the
    /// authority; explicit top fields from the feed are never trusted.
    pub fn refresh_top(&mut self) {
        match self.bids.iter().next_back() {
            Some((price, amount)) => {
                self.best_bid_price = price.into_inner();
                self.best_bid_amount = *amount;
            }
            None => {
                self.best_bid_price = 0.0;
                self.best_bid_amount = 0.0;
            }
        }
        match self.asks.iter().next() {
            Some((price, amount)) => {
                self.best_ask_price = price.into_inner();
                self.best_ask_amount = *amount;
            }
            None => {
                self.best_ask_price = 0.0;
                self.best_ask_amount = 0.0;
            }
        }
    }

    #[inline]
    pub fn mid_price(&self) -> Option<f64> {
        if self.best_bid_price > 0.0 && self.best_ask_price > 0.0 {
            Some((self.best_bid_price + self.best_ask_price) / 2.0)
        } else {
            None
        }
    }

    /// A crossed book is accepted (the replica mirrors the feed) but callers
    /// may want to know.
    #[inline]
    pub fn is_crossed(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty() && self.best_bid_price >= self.best_ask_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_top_tracks_ladders() {
        let mut ob = Orderbook::default();
        Orderbook::set_level(&mut ob.bids, 99.5, 2.0);
        Orderbook::set_level(&mut ob.bids, 100.0, 1.0);
        Orderbook::set_level(&mut ob.asks, 101.0, 3.0);
        ob.refresh_top();

        assert_eq!(ob.best_bid_price, 100.0);
        assert_eq!(ob.best_bid_amount, 1.0);
        assert_eq!(ob.best_ask_price, 101.0);
        assert_eq!(ob.best_ask_amount, 3.0);
    }

    #[test]
    fn zero_amount_deletes_level() {
        let mut ob = Orderbook::default();
        Orderbook::set_level(&mut ob.asks, 101.0, 3.0);
        Orderbook::set_level(&mut ob.asks, 101.0, 0.0);
        ob.refresh_top();

        assert!(ob.asks.is_empty());
        assert_eq!(ob.best_ask_price, 0.0);
        assert_eq!(ob.best_ask_amount, 0.0);
    }

    #[test]
    fn delete_absent_level_is_noop() {
        let mut ob = Orderbook::default();
        Orderbook::set_level(&mut ob.bids, 100.0, 1.0);
        Orderbook::delete_level(&mut ob.bids, 123.45);
        ob.refresh_top();

        assert_eq!(ob.bids.len(), 1);
        assert_eq!(ob.best_bid_price, 100.0);
    }

    #[test]
    fn default_book_is_unknown() {
        let ob = Orderbook::default();
        assert!(!ob.is_known());
        assert_eq!(ob.best_bid_price, 0.0);
        assert_eq!(ob.mid_price(), None);
    }

    #[test]
    fn crossed_book_detected_but_representable() {
        let mut ob = Orderbook::default();
        Orderbook::set_level(&mut ob.bids, 102.0, 1.0);
        Orderbook::set_level(&mut ob.asks, 101.0, 1.0);
        ob.refresh_top();

        assert!(ob.is_crossed());
        assert_eq!(ob.best_bid_price, 102.0);
        assert_eq!(ob.best_ask_price, 101.0);
    }
}
