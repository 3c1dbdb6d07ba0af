//! Encoder for well-formed market-data messages.
//!
//! Fields are appended in call order. [`MessageBuilder::build`] prefixes the
//! begin string and body length and appends the three-digit checksum, so the
//! output always passes [`Message::parse`](crate::message::Message::parse)
//! with the same delimiter.

use std::fmt::Display;

use crate::message::{BEGIN_STRING, EntryType, MsgType, UpdateAction};
use crate::scanner::checksum;

#[derive(Debug, Clone)]
pub struct MessageBuilder {
    soh: u8,
    msg_type: MsgType,
    body: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            soh: 0x01,
            msg_type,
            body: Vec::with_capacity(128),
        }
    }

    /// Delimiter byte; `0x01` by default.
    pub fn soh(mut self, soh: u8) -> Self {
        self.soh = soh;
        self
    }

    pub fn field(mut self, tag: u32, value: impl Display) -> Self {
        self.body.extend_from_slice(format!("{tag}={value}").as_bytes());
        self.body.push(self.soh);
        self
    }

    pub fn seq(self, seq: u64) -> Self {
        self.field(34, seq)
    }

    pub fn symbol(self, symbol: &str) -> Self {
        self.field(55, symbol)
    }

    pub fn entry_count(self, n: usize) -> Self {
        self.field(268, n)
    }

    /// Snapshot group element: `269`, `270`, `271`.
    pub fn snapshot_entry(self, entry_type: EntryType, price: f64, size: f64) -> Self {
        self.field(269, entry_type as u8)
            .field(270, price)
            .field(271, size)
    }

    /// Incremental group element: `279`, `269`, `270`, `271`.
    pub fn update_entry(
        self,
        action: UpdateAction,
        entry_type: EntryType,
        price: f64,
        size: f64,
    ) -> Self {
        self.field(279, action as u8)
            .snapshot_entry(entry_type, price, size)
    }

    pub fn build(self) -> Vec<u8> {
        let soh = self.soh;
        let mut typed = Vec::with_capacity(self.body.len() + 8);
        typed.extend_from_slice(b"35=");
        typed.push(self.msg_type.as_byte());
        typed.push(soh);
        typed.extend_from_slice(&self.body);

        let mut out = Vec::with_capacity(typed.len() + 32);
        out.extend_from_slice(BEGIN_STRING);
        out.push(soh);
        out.extend_from_slice(format!("9={}", typed.len()).as_bytes());
        out.push(soh);
        out.extend_from_slice(&typed);
        let cs = checksum(&out, soh);
        out.extend_from_slice(format!("10={cs:03}").as_bytes());
        out.push(soh);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_body_length_and_checksum() {
        let raw = MessageBuilder::new(MsgType::Incremental)
            .soh(b'|')
            .seq(2)
            .symbol("EUR/USD")
            .build();
        let text = String::from_utf8(raw).unwrap();
        // "35=X|34=2|55=EUR/USD|" is 21 bytes
        assert!(text.starts_with("8=FIX.4.4|9=21|35=X|34=2|55=EUR/USD|10="));
        assert_eq!(text.len(), "8=FIX.4.4|9=21|".len() + 21 + "10=nnn|".len());
        assert!(text.ends_with('|'));
    }

    #[test]
    fn encodes_entries_in_wire_order() {
        let raw = MessageBuilder::new(MsgType::Incremental)
            .soh(b'|')
            .update_entry(UpdateAction::Delete, EntryType::Offer, 1.25, 0.0)
            .build();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("|279=2|269=1|270=1.25|271=0|"));
    }
}
