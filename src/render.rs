//! Text and JSON views of the symbols that changed since a revision.
use std::io::{self, Write};

use serde::Serialize;

use crate::book::{Book, Depth};
use crate::book_set::BookSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// One JSON line per changed symbol.
#[derive(Debug, Serialize)]
pub struct SymbolDepth<'a> {
    pub symbol: &'a str,
    pub seq: u64,
    pub revision: u64,
    #[serde(flatten)]
    pub depth: Depth,
}

/// Write every symbol whose last update is at or after `revision`.
pub fn write_changed<W: Write>(
    out: &mut W,
    books: &BookSet,
    revision: u64,
    levels: usize,
    format: Format,
) -> io::Result<()> {
    for (symbol, entry) in books.changed_since(revision) {
        match format {
            Format::Text => {
                writeln!(out)?;
                writeln!(out, "{symbol}:")?;
                write_book(out, &entry.book, levels)?;
            }
            Format::Json => {
                let line = SymbolDepth {
                    symbol,
                    seq: entry.seq,
                    revision: books.revision(),
                    depth: entry.book.depth(levels),
                };
                serde_json::to_writer(&mut *out, &line)?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

/// Asks above the separator with the best ask closest to it, bids below
/// with the best bid first. Indices count from the best level.
pub fn write_book<W: Write>(out: &mut W, book: &Book, levels: usize) -> io::Result<()> {
    let depth = book.depth(levels);
    writeln!(out, "Total SELL: {}", depth.total_asks)?;
    for (i, level) in depth.asks.iter().enumerate().rev() {
        writeln!(out, "[{i}] price: {} ({})", level.price, level.size)?;
    }
    writeln!(out, "==========")?;
    for (i, level) in depth.bids.iter().enumerate() {
        writeln!(out, "[{i}] price: {} ({})", level.price, level.size)?;
    }
    writeln!(out, "Total BUY: {}", depth.total_bids)?;
    Ok(())
}
