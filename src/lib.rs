//! Market data book builder library.
//!
//! This crate reconstructs price-level order books for many symbols from
//! FIX 4.4 market-data messages (`35=W` snapshots and `35=X` incremental
//! refreshes), one delimiter-separated message per line:
//!
//! - `scanner`: zero-copy tag lookup and value decoding over a byte range
//! - `message`: envelope validation (begin string, body length, checksum,
//!   message type) and the `268` repeating group
//! - `book`: price levels per side and snapshot/incremental semantics
//! - `book_set`: per-symbol books behind a global sequence gate
//! - `builder`: encoder for well-formed messages
//! - `source` and `render`: line reader and text/JSON output used by the
//!   `fix_book` binary
//!
//! ```
//! use fix_book::{BookSet, EntryType, Message, MessageBuilder, MsgType};
//!
//! let raw = MessageBuilder::new(MsgType::Snapshot)
//!     .seq(1)
//!     .symbol("EUR/USD")
//!     .entry_count(1)
//!     .snapshot_entry(EntryType::Bid, 1.1, 100.0)
//!     .build();
//!
//! let mut books = BookSet::new();
//! books.update(&Message::parse(0x01, &raw)?)?;
//! assert_eq!(books.revision(), 1);
//! assert_eq!(books.book("EUR/USD").unwrap().bids.len(), 1);
//! # Ok::<(), fix_book::BookError>(())
//! ```
pub mod book;
pub mod book_set;
pub mod builder;
pub mod error;
pub mod message;
pub mod render;
pub mod scanner;
pub mod source;

pub use book::{Book, Depth, Level, PriceKey, Side, SideKind};
pub use book_set::{BookSet, IgnoreReason, SymbolBook, UpdateOutcome};
pub use builder::MessageBuilder;
pub use error::{BookError, ErrorKind, Result};
pub use message::{Entries, Entry, EntryType, Message, MsgType, UpdateAction};
pub use source::MessageSource;
