use crate::error::ChipsError;
use crate::mailbox::Transaction;
use std::collections::HashMap;
use std::fmt;

pub type NetworkId = u8;
pub type SlotId = u8;

/// where a device sits: which network, and which slot on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkAddress {
    pub network: NetworkId,
    pub slot: SlotId,
}

impl NetworkAddress {
    pub fn new(network: NetworkId, slot: SlotId) -> Self {
        NetworkAddress { network, slot }
    }

    /// another slot on the same network
    pub fn sibling(&self, slot: SlotId) -> Self {
        NetworkAddress::new(self.network, slot)
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.slot)
    }
}

/// handle for a device owned by a puzzle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

/// lookup table from network address to device
#[derive(Debug, Default)]
pub struct Fabric {
    table: HashMap<NetworkAddress, DeviceId>,
}

impl Fabric {
    pub fn new() -> Self {
        Fabric::default()
    }

    /// wire a device in; every address can only be taken once
    pub fn attach(&mut self, address: NetworkAddress, id: DeviceId) -> Result<(), ChipsError> {
        if self.table.contains_key(&address) {
            return Err(ChipsError::DuplicateAddress(address));
        }
        self.table.insert(address, id);
        Ok(())
    }

    pub fn resolve(&self, address: NetworkAddress) -> Option<DeviceId> {
        self.table.get(&address).copied()
    }

    /// every taken address, in order
    pub fn addresses(&self) -> Vec<NetworkAddress> {
        let mut addresses: Vec<_> = self.table.keys().copied().collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// What an executing device sees of the world around it. Slots are always
/// on the caller's own network; the caller is always the sender.
pub trait Network {
    /// is there a live device at `slot`?
    fn resolve(&self, slot: SlotId) -> bool;

    /// drop `transaction` into the mailbox of the device at `slot`, in the
    /// caller's sender slot. false if nothing lives there
    fn post(&mut self, slot: SlotId, transaction: Transaction) -> bool;
}

/// a post waiting to be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Post {
    pub to: DeviceId,
    pub from: SlotId,
    pub transaction: Transaction,
}

/// Network view handed to one device while it steps. Posts are collected
/// here and delivered by the puzzle as soon as that device's step returns.
pub struct Outbox<'a> {
    fabric: &'a Fabric,
    origin: NetworkAddress,
    posts: Vec<Post>,
}

impl<'a> Outbox<'a> {
    pub fn new(fabric: &'a Fabric, origin: NetworkAddress) -> Self {
        Outbox {
            fabric,
            origin,
            posts: Vec::new(),
        }
    }

    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }
}

impl Network for Outbox<'_> {
    fn resolve(&self, slot: SlotId) -> bool {
        self.fabric.resolve(self.origin.sibling(slot)).is_some()
    }

    fn post(&mut self, slot: SlotId, transaction: Transaction) -> bool {
        match self.fabric.resolve(self.origin.sibling(slot)) {
            Some(to) => {
                self.posts.push(Post {
                    to,
                    from: self.origin.slot,
                    transaction,
                });
                true
            }
            None => false,
        }
    }
}

/// a network with nobody on it; useful for stepping a lone device
pub struct Disconnected;

impl Network for Disconnected {
    fn resolve(&self, _slot: SlotId) -> bool {
        false
    }

    fn post(&mut self, _slot: SlotId, _transaction: Transaction) -> bool {
        false
    }
}
