//! Price-level order book built from market-data snapshots.
//!
//! This module defines the aggregated book representation (`Book`, `Side`
//! and `Level`) and how messages act on it:
//! - A `W` snapshot builds a new book from scratch with `add`
//! - An `X` incremental refresh applies New/Change/Delete actions with `set`
//! - Levels are keyed by the price scaled to 8 decimals, so two prices that
//!   differ only by float noise land on the same level
//!
//! Entries other than bids and offers (trades, index values, settlement
//! prices) are decoded and dropped.
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::error::{BookError, Result};
use crate::message::{EntryType, Message, UpdateAction};

/// Scale applied to prices before keying.
pub const PRICE_SCALE: f64 = 100_000_000.0;

/// Price scaled by [`PRICE_SCALE`] and rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceKey(pub i64);

impl PriceKey {
    pub fn from_price(price: f64) -> Self {
        PriceKey((price * PRICE_SCALE).round() as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Level {
    /// Price as received.
    pub price: f64,
    /// Aggregated size at that price.
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SideKind {
    /// Best (highest) price first.
    Bid,
    /// Best (lowest) price first.
    Ask,
}

/// One side of the book, iterated best price first.
#[derive(Debug, Clone, PartialEq)]
pub struct Side {
    kind: SideKind,
    levels: BTreeMap<PriceKey, Level>,
}

impl Side {
    pub fn new(kind: SideKind) -> Self {
        Self {
            kind,
            levels: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> SideKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels in side order: descending prices for bids, ascending for asks.
    pub fn levels(&self) -> Box<dyn DoubleEndedIterator<Item = (PriceKey, &Level)> + '_> {
        let it = self.levels.iter().map(|(k, l)| (*k, l));
        match self.kind {
            SideKind::Bid => Box::new(it.rev()),
            SideKind::Ask => Box::new(it),
        }
    }

    /// The `index`-th level in side order.
    ///
    /// Walks from the best level, so cost grows with `index`.
    pub fn level_at(&self, index: usize) -> Option<&Level> {
        self.levels().nth(index).map(|(_, l)| l)
    }

    pub fn best(&self) -> Option<&Level> {
        self.level_at(0)
    }

    pub fn get(&self, price: f64) -> Option<&Level> {
        self.levels.get(&PriceKey::from_price(price))
    }

    /// Insert a new level; the price must not be on the side already.
    pub fn add(&mut self, price: f64, size: f64) -> Result<()> {
        let key = PriceKey::from_price(price);
        if self.levels.contains_key(&key) {
            return Err(BookError::violation("add without remove").at_price(price));
        }
        self.levels.insert(key, Level { price, size });
        Ok(())
    }

    /// Apply one incremental action. `Change` and `Delete` need an existing level.
    pub fn set(&mut self, action: UpdateAction, price: f64, size: f64) -> Result<()> {
        self.apply(action, price, size).map(|_| ())
    }

    /// Like [`Side::set`], returning what the key held before.
    fn apply(&mut self, action: UpdateAction, price: f64, size: f64) -> Result<Option<Level>> {
        if action == UpdateAction::New {
            return self.add(price, size).map(|_| None);
        }
        let key = PriceKey::from_price(price);
        let Some(level) = self.levels.get_mut(&key) else {
            return Err(BookError::violation("modify without existing level").at_price(price));
        };
        let before = *level;
        match action {
            UpdateAction::Change => level.size = size,
            _ => {
                self.levels.remove(&key);
            }
        }
        Ok(Some(before))
    }

    fn restore(&mut self, key: PriceKey, before: Option<Level>) {
        match before {
            Some(level) => {
                self.levels.insert(key, level);
            }
            None => {
                self.levels.remove(&key);
            }
        }
    }
}

/// Top `n` levels of each side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Depth {
    /// Best ask first.
    pub asks: Vec<Level>,
    /// Best bid first.
    pub bids: Vec<Level>,
    pub total_asks: usize,
    pub total_bids: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    /// Sell side, lowest price first.
    pub asks: Side,
    /// Buy side, highest price first.
    pub bids: Side,
}

impl Default for Book {
    fn default() -> Self {
        Self {
            asks: Side::new(SideKind::Ask),
            bids: Side::new(SideKind::Bid),
        }
    }
}

impl Book {
    /// Build a book from every bid and offer of a snapshot.
    ///
    /// Fields are read in wire order (type, price, size) even for entries
    /// that are dropped.
    pub fn from_snapshot(snapshot: &Message<'_>) -> Result<Self> {
        let mut book = Book::default();
        for entry in snapshot.entries()? {
            let entry = entry?;
            let entry_type = entry.read_entry_type()?;
            let price = entry.read_price()?;
            let size = entry.read_size()?;
            match entry_type {
                EntryType::Bid => book.bids.add(price, size)?,
                EntryType::Offer => book.asks.add(price, size)?,
                _ => trace!(?entry_type, price, size, "snapshot entry skipped"),
            }
        }
        Ok(book)
    }

    /// Apply every bid and offer action of an incremental refresh.
    ///
    /// All-or-nothing: if any entry fails, the actions already applied from
    /// this message are undone before the error is returned.
    pub fn update(&mut self, message: &Message<'_>) -> Result<()> {
        let mut journal: Vec<(SideKind, PriceKey, Option<Level>)> = Vec::new();
        let applied = self.apply_entries(message, &mut journal);
        if applied.is_err() {
            for (kind, key, before) in journal.into_iter().rev() {
                self.side_mut(kind).restore(key, before);
            }
        }
        applied
    }

    fn apply_entries(
        &mut self,
        message: &Message<'_>,
        journal: &mut Vec<(SideKind, PriceKey, Option<Level>)>,
    ) -> Result<()> {
        for entry in message.entries()? {
            let entry = entry?;
            let action = entry.read_update_action()?;
            let entry_type = entry.read_entry_type()?;
            let price = entry.read_price()?;
            let size = entry.read_size()?;
            let kind = match entry_type {
                EntryType::Bid => SideKind::Bid,
                EntryType::Offer => SideKind::Ask,
                _ => {
                    trace!(?entry_type, price, size, "incremental entry skipped");
                    continue;
                }
            };
            let before = self.side_mut(kind).apply(action, price, size)?;
            trace!(?kind, ?action, price, size, "level updated");
            journal.push((kind, PriceKey::from_price(price), before));
        }
        Ok(())
    }

    pub fn side(&self, kind: SideKind) -> &Side {
        match kind {
            SideKind::Bid => &self.bids,
            SideKind::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, kind: SideKind) -> &mut Side {
        match kind {
            SideKind::Bid => &mut self.bids,
            SideKind::Ask => &mut self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.best()
    }

    /// Top `n` levels per side.
    pub fn depth(&self, n: usize) -> Depth {
        Depth {
            asks: self.asks.levels().take(n).map(|(_, l)| *l).collect(),
            bids: self.bids.levels().take(n).map(|(_, l)| *l).collect(),
            total_asks: self.asks.len(),
            total_bids: self.bids.len(),
        }
    }
}
