use crate::isa::{Address, Register};
use crate::network::SlotId;
use std::collections::BTreeMap;

/// one pending transaction from a peer. a missing value is a read request;
/// a present one is a write (or, for the requester, the delivered answer)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub address: Address,
    pub value: Option<Register>,
}

impl Transaction {
    pub fn read(address: Address) -> Self {
        Transaction { address, value: None }
    }

    pub fn write(address: Address, value: Register) -> Self {
        Transaction {
            address,
            value: Some(value),
        }
    }
}

/// single-slot-per-sender register of incoming transactions. posting into
/// an occupied slot replaces what was there; nothing queues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mailbox {
    slots: BTreeMap<SlotId, Transaction>,
}

impl Mailbox {
    pub fn new() -> Self {
        Mailbox::default()
    }

    /// last writer wins
    pub fn post(&mut self, sender: SlotId, transaction: Transaction) {
        self.slots.insert(sender, transaction);
    }

    /// look without clearing
    pub fn peek(&self, sender: SlotId) -> Option<Transaction> {
        self.slots.get(&sender).copied()
    }

    /// clear the sender's slot, handing back what was in it
    pub fn consume(&mut self, sender: SlotId) -> Option<Transaction> {
        self.slots.remove(&sender)
    }

    /// senders with something pending, lowest slot first
    pub fn senders(&self) -> Vec<SlotId> {
        self.slots.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, Transaction)> + '_ {
        self.slots.iter().map(|(s, t)| (*s, *t))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
