//! FIX 4.4 market-data message envelope and repeating-group entries.
//!
//! [`Message::parse`] validates the framing fields (`8`, `9`, `35`, `10`)
//! before any body field is trusted, then narrows its view to the body so
//! later reads never see the header or trailer. Body reads are lazy: each
//! call goes back to the scanner.
//!
//! The `268` repeating group is walked with [`Message::entries`], a
//! single-pass iterator. Each [`Entry`] borrows the message it came from
//! because locating the next element means scanning the message body again.

use std::cell::Cell;

use crate::error::{BookError, Result};
use crate::scanner::{Fields, checksum};

pub const BEGIN_STRING: &[u8] = b"8=FIX.4.4";
pub const BODY_LENGTH: &[u8] = b"9=";
pub const MSG_TYPE: &[u8] = b"35=";
pub const CHECKSUM: &[u8] = b"10=";
pub const MSG_SEQ_NUM: &[u8] = b"34=";
pub const SYMBOL: &[u8] = b"55=";
pub const NO_MD_ENTRIES: &[u8] = b"268=";
pub const MD_ENTRY_TYPE: &[u8] = b"269=";
pub const MD_ENTRY_PX: &[u8] = b"270=";
pub const MD_ENTRY_SIZE: &[u8] = b"271=";
pub const MD_UPDATE_ACTION: &[u8] = b"279=";

/// Shortest message that can hold the framing fields:
/// `8=FIX.4.4|9=|35=?|10=nnn|` with an empty length value.
pub const MIN_MESSAGE_LEN: usize = BEGIN_STRING.len()
    + 1
    + BODY_LENGTH.len()
    + 1
    + MSG_TYPE.len()
    + 2
    + CHECKSUM.len()
    + 3
    + 1;

/// Value of tag 35.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    /// `W`, market data snapshot / full refresh.
    Snapshot,
    /// `X`, market data incremental refresh.
    Incremental,
    Other(u8),
}

impl From<u8> for MsgType {
    fn from(b: u8) -> Self {
        match b {
            b'W' => MsgType::Snapshot,
            b'X' => MsgType::Incremental,
            other => MsgType::Other(other),
        }
    }
}

impl MsgType {
    pub fn as_byte(self) -> u8 {
        match self {
            MsgType::Snapshot => b'W',
            MsgType::Incremental => b'X',
            MsgType::Other(b) => b,
        }
    }
}

/// Tag 269.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Bid = 0,
    Offer = 1,
    Trade = 2,
    Index = 3,
    SettlementPrice = 6,
}

impl TryFrom<u64> for EntryType {
    type Error = ();

    fn try_from(v: u64) -> std::result::Result<Self, ()> {
        Ok(match v {
            0 => EntryType::Bid,
            1 => EntryType::Offer,
            2 => EntryType::Trade,
            3 => EntryType::Index,
            6 => EntryType::SettlementPrice,
            _ => return Err(()),
        })
    }
}

/// Tag 279.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    New = 0,
    Change = 1,
    Delete = 2,
}

impl TryFrom<u64> for UpdateAction {
    type Error = ();

    fn try_from(v: u64) -> std::result::Result<Self, ()> {
        Ok(match v {
            0 => UpdateAction::New,
            1 => UpdateAction::Change,
            2 => UpdateAction::Delete,
            _ => return Err(()),
        })
    }
}

/// A validated message borrowing its bytes.
#[derive(Debug)]
pub struct Message<'a> {
    fields: Fields<'a>,
    msg_type: MsgType,
    group_taken: Cell<bool>,
}

impl<'a> Message<'a> {
    /// Validate the envelope of one message.
    ///
    /// Trailing `\r`/`\n` bytes are ignored. On success the message view
    /// covers only the body between the `35` field and the `10` field.
    pub fn parse(soh: u8, bytes: &'a [u8]) -> Result<Self> {
        let end = bytes
            .iter()
            .rposition(|&b| b != b'\r' && b != b'\n')
            .map_or(0, |i| i + 1);
        let mut fields = Fields::with_range(bytes, soh, 0, end);

        if end <= MIN_MESSAGE_LEN {
            return Err(BookError::malformed("message too short", end));
        }
        if bytes[end - 1] != soh {
            return Err(BookError::malformed("message does not end with delimiter", end - 1));
        }
        if !bytes.starts_with(BEGIN_STRING) || bytes[BEGIN_STRING.len()] != soh {
            return Err(BookError::malformed("missing or unsupported begin string", 0));
        }

        let mut cursor = BEGIN_STRING.len() + 1;
        if !bytes[cursor..end].starts_with(BODY_LENGTH) {
            return Err(BookError::malformed("body length must follow begin string", cursor));
        }
        cursor += BODY_LENGTH.len();
        let body_len = usize::try_from(fields.read_int_value(&mut cursor)?)
            .map_err(|_| BookError::malformed("body length out of range", cursor))?;
        let remaining = end - cursor;
        if body_len.checked_add(7).is_none_or(|need| remaining < need) {
            return Err(BookError::malformed("body length exceeds message", cursor));
        }

        let checksum_begin = cursor + body_len;
        if bytes[checksum_begin - 1] != soh {
            return Err(BookError::malformed("body length does not end on a field", checksum_begin));
        }
        if !bytes[checksum_begin..end].starts_with(CHECKSUM) {
            return Err(BookError::malformed("checksum field expected", checksum_begin));
        }
        let expected = checksum(&bytes[..checksum_begin], soh);
        let value_at = checksum_begin + CHECKSUM.len();
        let mut after = value_at;
        let declared = fields.read_int_value(&mut after)?;
        if after - value_at != 4 {
            return Err(BookError::malformed("checksum must be three digits", value_at));
        }
        if after != end {
            return Err(BookError::malformed("bytes after checksum field", after));
        }
        if declared != u64::from(expected) {
            return Err(BookError::malformed("checksum mismatch", value_at));
        }

        if !bytes[cursor..end].starts_with(MSG_TYPE) {
            return Err(BookError::malformed("message type must follow body length", cursor));
        }
        cursor += MSG_TYPE.len();
        let msg_type = bytes[cursor];
        if msg_type == soh {
            return Err(BookError::malformed("empty message type", cursor));
        }
        cursor += 1;
        if bytes[cursor] != soh {
            return Err(BookError::malformed("message type must be a single character", cursor));
        }
        cursor += 1;

        fields.narrow(cursor, checksum_begin);
        Ok(Self {
            fields,
            msg_type: MsgType::from(msg_type),
            group_taken: Cell::new(false),
        })
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn soh(&self) -> u8 {
        self.fields.soh()
    }

    /// The validated body, between the message type and the checksum.
    pub fn body(&self) -> &'a [u8] {
        &self.fields.buf()[self.fields.begin()..self.fields.end()]
    }

    pub fn seq_num(&self) -> Result<u64> {
        self.fields.read_int_field(MSG_SEQ_NUM)
    }

    pub fn symbol(&self) -> Result<&'a str> {
        self.fields.read_str_field(SYMBOL)
    }

    pub fn entry_count(&self) -> Result<usize> {
        let n = self.fields.read_int_field(NO_MD_ENTRIES)?;
        usize::try_from(n)
            .map_err(|_| BookError::malformed("entry count out of range", self.fields.cursor()))
    }

    /// First element of the `268` group, or `None` for an empty group.
    ///
    /// Shares the single-pass budget with [`Message::entries`]: once either
    /// has handed out the group, both fail with a protocol violation.
    pub fn first_entry(&self) -> Result<Option<Entry<'_, 'a>>> {
        self.take_group()?;
        self.open_group()
    }

    /// Walk the `268` group once.
    ///
    /// A message hands out its group a single time; a second call fails
    /// rather than re-scanning from the start.
    pub fn entries(&self) -> Result<Entries<'_, 'a>> {
        self.take_group()?;
        Ok(Entries {
            state: EntriesState::Start(self),
        })
    }

    fn take_group(&self) -> Result<()> {
        if self.group_taken.replace(true) {
            return Err(BookError::violation("repeating group already traversed"));
        }
        Ok(())
    }

    fn open_group(&self) -> Result<Option<Entry<'_, 'a>>> {
        let count = self.entry_count()?;
        if count == 0 {
            return Ok(None);
        }
        let begin = self.fields.cursor();
        let eq = self.fields.buf()[begin..self.fields.end()]
            .iter()
            .position(|&b| b == b'=')
            .ok_or_else(|| BookError::malformed("group has no fields", begin))?;
        let tag = &self.fields.buf()[begin..begin + eq + 1];
        self.make_entry(begin, count, tag).map(Some)
    }

    fn make_entry(&self, begin: usize, count: usize, tag: &'a [u8]) -> Result<Entry<'_, 'a>> {
        let end = if count > 1 {
            self.fields
                .scan(tag, begin + tag.len(), self.fields.end())
                .ok_or_else(|| BookError::malformed("fewer group entries than declared", begin))?
        } else {
            self.fields.end()
        };
        self.fields.set_cursor(end);
        Ok(Entry {
            fields: Fields::with_range(self.fields.buf(), self.fields.soh(), begin, end),
            remaining: count - 1,
            tag,
            message: self,
        })
    }
}

/// One element of the `268` repeating group.
#[derive(Debug)]
pub struct Entry<'m, 'a> {
    fields: Fields<'a>,
    remaining: usize,
    tag: &'a [u8],
    message: &'m Message<'a>,
}

impl<'m, 'a> Entry<'m, 'a> {
    pub fn read_update_action(&self) -> Result<UpdateAction> {
        let at = self.fields.cursor();
        let v = self.fields.read_int_field(MD_UPDATE_ACTION)?;
        UpdateAction::try_from(v).map_err(|_| BookError::malformed("invalid MDUpdateAction", at))
    }

    pub fn read_entry_type(&self) -> Result<EntryType> {
        let at = self.fields.cursor();
        let v = self.fields.read_int_field(MD_ENTRY_TYPE)?;
        EntryType::try_from(v).map_err(|_| BookError::malformed("invalid MDEntryType", at))
    }

    pub fn read_price(&self) -> Result<f64> {
        self.fields.read_decimal_field(MD_ENTRY_PX)
    }

    pub fn read_size(&self) -> Result<f64> {
        self.fields.read_decimal_field(MD_ENTRY_SIZE)
    }

    /// Elements still to come after this one.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Byte range of this element within the message buffer.
    pub fn span(&self) -> (usize, usize) {
        (self.fields.begin(), self.fields.end())
    }

    /// Consume this element and locate the one after it.
    pub fn next_entry(self) -> Result<Option<Entry<'m, 'a>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.message
            .make_entry(self.fields.end(), self.remaining, self.tag)
            .map(Some)
    }
}

enum EntriesState<'m, 'a> {
    Start(&'m Message<'a>),
    Pending {
        message: &'m Message<'a>,
        begin: usize,
        remaining: usize,
        tag: &'a [u8],
    },
    Done,
}

/// Single-pass iterator over group entries. Fused after the last element or
/// the first error.
pub struct Entries<'m, 'a> {
    state: EntriesState<'m, 'a>,
}

impl<'m, 'a> Iterator for Entries<'m, 'a> {
    type Item = Result<Entry<'m, 'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let produced = match std::mem::replace(&mut self.state, EntriesState::Done) {
            EntriesState::Start(message) => message.open_group(),
            EntriesState::Pending {
                message,
                begin,
                remaining,
                tag,
            } => message.make_entry(begin, remaining, tag).map(Some),
            EntriesState::Done => return None,
        };
        match produced {
            Ok(Some(entry)) => {
                if entry.remaining > 0 {
                    self.state = EntriesState::Pending {
                        message: entry.message,
                        begin: entry.fields.end(),
                        remaining: entry.remaining,
                        tag: entry.tag,
                    };
                }
                Some(Ok(entry))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl std::iter::FusedIterator for Entries<'_, '_> {}
