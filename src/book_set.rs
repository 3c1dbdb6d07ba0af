//! Per-symbol books gated by a global sequence number.
//!
//! A [`BookSet`] accepts a message only when its `34` sequence number is
//! above everything accepted so far, across all symbols. Older or repeated
//! messages are ignored rather than treated as errors, which lets a consumer
//! replay overlapping captures.

use std::collections::BTreeMap;

use tracing::debug;

use crate::book::Book;
use crate::error::{BookError, Result};
use crate::message::{Message, MsgType};

/// State kept for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolBook {
    /// Sequence number of the last message applied to this symbol.
    pub seq: u64,
    pub book: Book,
}

/// Why a message left the set untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Neither a snapshot nor an incremental refresh.
    UnsupportedType(u8),
    /// Sequence number not above the current revision.
    Stale { seq: u64, revision: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied { seq: u64 },
    Ignored(IgnoreReason),
}

#[derive(Debug, Default, Clone)]
pub struct BookSet {
    revision: u64,
    books: BTreeMap<String, SymbolBook>,
}

impl BookSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number accepted so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn update(&mut self, message: &Message<'_>) -> Result<UpdateOutcome> {
        let msg_type = message.msg_type();
        if !matches!(msg_type, MsgType::Snapshot | MsgType::Incremental) {
            debug!(msg_type = %char::from(msg_type.as_byte()), "message type ignored");
            return Ok(UpdateOutcome::Ignored(IgnoreReason::UnsupportedType(msg_type.as_byte())));
        }

        let seq = message.seq_num()?;
        if seq <= self.revision {
            debug!(seq, revision = self.revision, "stale message ignored");
            return Ok(UpdateOutcome::Ignored(IgnoreReason::Stale {
                seq,
                revision: self.revision,
            }));
        }

        let symbol = message.symbol()?;
        if msg_type == MsgType::Snapshot {
            let book = Book::from_snapshot(message).map_err(|e| e.for_symbol(symbol))?;
            debug!(symbol, seq, bids = book.bids.len(), asks = book.asks.len(), "snapshot applied");
            self.books.insert(symbol.to_string(), SymbolBook { seq, book });
        } else {
            let entry = self
                .books
                .get_mut(symbol)
                .ok_or_else(|| BookError::violation("no snapshot for book").for_symbol(symbol))?;
            entry.book.update(message).map_err(|e| e.for_symbol(symbol))?;
            entry.seq = seq;
            debug!(symbol, seq, "incremental applied");
        }

        self.revision = seq;
        Ok(UpdateOutcome::Applied { seq })
    }

    pub fn book(&self, symbol: &str) -> Option<&Book> {
        self.books.get(symbol).map(|s| &s.book)
    }

    /// Sequence number of the last message applied to `symbol`.
    pub fn symbol_seq(&self, symbol: &str) -> Option<u64> {
        self.books.get(symbol).map(|s| s.seq)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.books.keys().map(String::as_str)
    }

    /// Symbols updated at or after `revision`, in symbol order.
    pub fn changed_since(&self, revision: u64) -> impl Iterator<Item = (&str, &SymbolBook)> {
        self.books
            .iter()
            .filter(move |(_, s)| s.seq >= revision)
            .map(|(k, s)| (k.as_str(), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MessageBuilder;
    use crate::error::ErrorKind;
    use crate::message::{EntryType, UpdateAction};

    const SOH: u8 = 0x01;

    fn snapshot(seq: u64, symbol: &str) -> Vec<u8> {
        MessageBuilder::new(MsgType::Snapshot)
            .seq(seq)
            .symbol(symbol)
            .entry_count(2)
            .snapshot_entry(EntryType::Bid, 1.1, 100.0)
            .snapshot_entry(EntryType::Offer, 1.101, 50.0)
            .build()
    }

    fn change_bid(seq: u64, symbol: &str, price: f64, size: f64) -> Vec<u8> {
        MessageBuilder::new(MsgType::Incremental)
            .seq(seq)
            .symbol(symbol)
            .entry_count(1)
            .update_entry(UpdateAction::Change, EntryType::Bid, price, size)
            .build()
    }

    fn apply(set: &mut BookSet, raw: &[u8]) -> Result<UpdateOutcome> {
        set.update(&Message::parse(SOH, raw)?)
    }

    #[test]
    fn snapshot_then_incremental() {
        let mut set = BookSet::new();
        assert_eq!(
            apply(&mut set, &snapshot(1, "EUR/USD")).unwrap(),
            UpdateOutcome::Applied { seq: 1 }
        );
        assert_eq!(
            apply(&mut set, &change_bid(2, "EUR/USD", 1.1, 75.0)).unwrap(),
            UpdateOutcome::Applied { seq: 2 }
        );
        let book = set.book("EUR/USD").unwrap();
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.best_bid().unwrap().size, 75.0);
        assert_eq!(book.best_ask().unwrap().size, 50.0);
        assert_eq!(set.revision(), 2);
        assert_eq!(set.symbol_seq("EUR/USD"), Some(2));
    }

    #[test]
    fn stale_messages_are_ignored() {
        let mut set = BookSet::new();
        apply(&mut set, &snapshot(5, "EUR/USD")).unwrap();
        let before = set.book("EUR/USD").cloned();
        for seq in [5, 4, 0] {
            let outcome = apply(&mut set, &change_bid(seq, "EUR/USD", 1.1, 1.0)).unwrap();
            assert_eq!(
                outcome,
                UpdateOutcome::Ignored(IgnoreReason::Stale { seq, revision: 5 })
            );
        }
        // even a broken update is not looked at once it is stale
        let bogus = change_bid(3, "EUR/USD", 9.9, 1.0);
        assert!(matches!(apply(&mut set, &bogus), Ok(UpdateOutcome::Ignored(_))));
        assert_eq!(set.book("EUR/USD").cloned(), before);
        assert_eq!(set.revision(), 5);
    }

    #[test]
    fn other_types_are_ignored() {
        let mut set = BookSet::new();
        let heartbeat = MessageBuilder::new(MsgType::Other(b'0')).seq(7).build();
        assert_eq!(
            apply(&mut set, &heartbeat).unwrap(),
            UpdateOutcome::Ignored(IgnoreReason::UnsupportedType(b'0'))
        );
        assert_eq!(set.revision(), 0);
    }

    #[test]
    fn incremental_without_snapshot_fails() {
        let mut set = BookSet::new();
        let err = apply(&mut set, &change_bid(1, "GBP/USD", 1.3, 1.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        assert!(err.to_string().contains("GBP/USD"));
        assert!(set.is_empty());
        assert_eq!(set.revision(), 0);
    }

    #[test]
    fn failed_update_keeps_revision() {
        let mut set = BookSet::new();
        apply(&mut set, &snapshot(1, "EUR/USD")).unwrap();
        let err = apply(&mut set, &change_bid(2, "EUR/USD", 1.2, 1.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        assert_eq!(set.revision(), 1);
        assert_eq!(set.symbol_seq("EUR/USD"), Some(1));
        // the same sequence number is still usable after the failure
        apply(&mut set, &change_bid(2, "EUR/USD", 1.1, 1.0)).unwrap();
    }

    #[test]
    fn snapshot_replaces_book() {
        let mut set = BookSet::new();
        apply(&mut set, &snapshot(1, "EUR/USD")).unwrap();
        let empty = MessageBuilder::new(MsgType::Snapshot)
            .seq(2)
            .symbol("EUR/USD")
            .entry_count(0)
            .build();
        apply(&mut set, &empty).unwrap();
        let book = set.book("EUR/USD").unwrap();
        assert!(book.bids.is_empty() && book.asks.is_empty());
    }

    #[test]
    fn revision_filters_changed_symbols() {
        let mut set = BookSet::new();
        apply(&mut set, &snapshot(1, "EUR/USD")).unwrap();
        apply(&mut set, &snapshot(2, "USD/JPY")).unwrap();
        assert_eq!(set.revision(), 2);
        let changed: Vec<_> = set.changed_since(2).map(|(s, _)| s).collect();
        assert_eq!(changed, vec!["USD/JPY"]);
        let all: Vec<_> = set.changed_since(0).map(|(s, _)| s).collect();
        assert_eq!(all, vec!["EUR/USD", "USD/JPY"]);
    }

    #[test]
    fn independent_sets_do_not_interfere() {
        let mut a = BookSet::new();
        let mut b = BookSet::new();
        apply(&mut a, &snapshot(10, "EUR/USD")).unwrap();
        apply(&mut b, &snapshot(1, "EUR/USD")).unwrap();
        assert_eq!(a.revision(), 10);
        assert_eq!(b.revision(), 1);
    }
}
