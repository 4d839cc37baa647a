use crate::error::ChipsError;
use crate::events::{Event, EventBus};
use crate::interpreter::{self, Cpu, ExecState, Machine};
use crate::isa::{Address, InstructionSet, Register};
use crate::mailbox::{Mailbox, Transaction};
use crate::memory::{CellStore, Snapshot};
use crate::network::{Network, NetworkAddress, NetworkId, SlotId};
use std::io;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// what kind of device this is
#[derive(Debug, Clone)]
pub enum DeviceKind {
    Vm(Cpu),
    Ram,
    Display,
}

#[derive(Debug)]
pub struct Device {
    name: String,
    address: NetworkAddress,
    memory: CellStore,
    mailbox: Mailbox,
    state: ExecState,
    saved: Option<Snapshot>,
    error_message: String,
    events: Rc<EventBus>,
    kind: DeviceKind,
}

impl Device {
    fn new(
        name: &str,
        address: NetworkAddress,
        memory_size: usize,
        kind: DeviceKind,
        events: Rc<EventBus>,
    ) -> Self {
        Device {
            name: name.to_string(),
            address,
            memory: CellStore::new(memory_size),
            mailbox: Mailbox::new(),
            state: ExecState::Edit,
            saved: None,
            error_message: String::new(),
            events,
            kind,
        }
    }

    /// a VM; its memory can be no bigger than the instruction pointer reaches
    pub fn vm(
        name: &str,
        address: NetworkAddress,
        memory_size: usize,
        register_count: usize,
        isa: Rc<InstructionSet>,
        events: Rc<EventBus>,
    ) -> Result<Self, ChipsError> {
        let max = usize::from(Address::MAX) + 1;
        if memory_size > max {
            return Err(ChipsError::MemoryTooLarge { len: memory_size, max });
        }
        let cpu = Cpu::new(register_count, isa);
        Ok(Device::new(name, address, memory_size, DeviceKind::Vm(cpu), events))
    }

    pub fn ram(name: &str, address: NetworkAddress, memory_size: usize, events: Rc<EventBus>) -> Self {
        Device::new(name, address, memory_size, DeviceKind::Ram, events)
    }

    pub fn display(name: &str, address: NetworkAddress, memory_size: usize, events: Rc<EventBus>) -> Self {
        Device::new(name, address, memory_size, DeviceKind::Display, events)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> NetworkAddress {
        self.address
    }

    pub fn network_id(&self) -> NetworkId {
        self.address.network
    }

    pub fn slot_id(&self) -> SlotId {
        self.address.slot
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn is_vm(&self) -> bool {
        matches!(self.kind, DeviceKind::Vm(_))
    }

    /// only VMs can be edited by the player
    pub fn editable(&self) -> bool {
        self.is_vm()
    }

    fn cpu(&self) -> Option<&Cpu> {
        match &self.kind {
            DeviceKind::Vm(cpu) => Some(cpu),
            _ => None,
        }
    }

    fn cpu_mut(&mut self) -> Option<&mut Cpu> {
        match &mut self.kind {
            DeviceKind::Vm(cpu) => Some(cpu),
            _ => None,
        }
    }

    fn dirty(&self) {
        self.events.emit(Event::DeviceDirty(self.address));
    }

    // memory

    pub fn memory_size(&self) -> usize {
        self.memory.len()
    }

    pub fn memory(&self) -> &CellStore {
        &self.memory
    }

    pub fn read(&self, index: usize) -> Option<u8> {
        self.memory.read(index)
    }

    pub fn write(&mut self, index: usize, value: u8) -> bool {
        let ok = self.memory.write(index, value);
        if ok {
            self.dirty();
        }
        ok
    }

    /// a player's edit: only VMs, only while editing
    pub fn edit(&mut self, index: usize, value: u8) -> bool {
        self.editable() && self.state == ExecState::Edit && self.write(index, value)
    }

    /// replace memory with a program image loaded at address 0; the rest is
    /// zeroed. an image too big for the device leaves memory untouched
    pub fn load_program(&mut self, reader: &mut impl io::Read) -> Result<(), ChipsError> {
        let mut image = CellStore::new(self.memory.len());
        image.load_from(reader, 0)?;
        self.memory = image;
        self.dirty();
        Ok(())
    }

    // cpu; passive devices have no registers and no ip

    pub fn register_count(&self) -> usize {
        self.cpu().map_or(0, Cpu::register_count)
    }

    pub fn register(&self, index: usize) -> Option<Register> {
        self.cpu()?.register(index)
    }

    pub fn set_register(&mut self, index: usize, value: Register) -> bool {
        let ok = self
            .cpu_mut()
            .map_or(false, |cpu| cpu.set_register(index, value));
        if ok {
            self.dirty();
        }
        ok
    }

    pub fn flag_zero(&self) -> bool {
        self.cpu().map_or(false, Cpu::flag_zero)
    }

    pub fn set_flag_zero(&mut self, value: bool) {
        if let Some(cpu) = self.cpu_mut() {
            cpu.set_flag_zero(value);
            self.dirty();
        }
    }

    pub fn instruction_pointer(&self) -> Option<Register> {
        self.cpu().map(Cpu::ip)
    }

    pub fn set_instruction_pointer(&mut self, ip: Register) -> bool {
        match self.cpu_mut() {
            Some(cpu) => {
                cpu.set_ip(ip);
                self.dirty();
                true
            }
            None => false,
        }
    }

    pub fn instruction_set(&self) -> Option<&Rc<InstructionSet>> {
        self.cpu().map(Cpu::instruction_set)
    }

    /// disassemble the instruction at `index`, for display only
    pub fn decode_for_display(&self, index: usize) -> Option<String> {
        self.instruction_set()?
            .decode_for_display(&self.memory, index)
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn clear_error(&mut self) {
        self.error_message.clear();
        self.dirty();
    }

    // mailbox

    /// a peer at `sender` drops a transaction in; replaces whatever it had
    /// pending
    pub fn post_incoming(&mut self, sender: SlotId, transaction: Transaction) {
        debug!(to = %self.address, from = sender, ?transaction, "post");
        self.mailbox.post(sender, transaction);
        self.dirty();
    }

    /// what `sender` has pending, without clearing it
    pub fn incoming(&self, sender: SlotId) -> Option<Transaction> {
        self.mailbox.peek(sender)
    }

    pub fn consume_incoming(&mut self, sender: SlotId) -> Option<Transaction> {
        self.mailbox.consume(sender)
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    // lifecycle

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// start (or resume) running. starting from edit snapshots memory so
    /// stop can put it back
    pub fn run(&mut self) {
        if self.state == ExecState::Edit {
            self.saved = Some(self.memory.snapshot());
            if let Some(cpu) = self.cpu_mut() {
                cpu.set_ip(0);
            }
        }
        self.state = ExecState::Running;
        info!(device = %self.address, name = %self.name, "run");
        self.dirty();
    }

    pub fn pause(&mut self) {
        if self.state == ExecState::Running {
            self.state = ExecState::Paused;
            info!(device = %self.address, name = %self.name, "pause");
            self.dirty();
        }
    }

    /// back to editing: memory as it was when the run started, no error,
    /// nothing pending, cpu zeroed
    pub fn stop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.memory.restore(&saved);
        }
        self.error_message.clear();
        self.mailbox.clear();
        if let Some(cpu) = self.cpu_mut() {
            cpu.reset();
        }
        self.state = ExecState::Edit;
        info!(device = %self.address, name = %self.name, "stop");
        self.dirty();
    }

    /// Advance one step whatever the state: a VM executes one instruction,
    /// a passive device answers its mailbox. On failure the device records
    /// the message, halts if it was running, and the error is returned.
    pub fn step(&mut self, network: &mut dyn Network) -> Result<(), ChipsError> {
        let result = match &mut self.kind {
            DeviceKind::Vm(cpu) => {
                let mut machine = Machine {
                    cpu,
                    memory: &mut self.memory,
                    mailbox: &mut self.mailbox,
                    network,
                };
                interpreter::cycle(&mut machine).map(|_| true)
            }
            DeviceKind::Ram | DeviceKind::Display => {
                drain_mailbox(&mut self.memory, &mut self.mailbox, network)
            }
        };
        match result {
            Ok(changed) => {
                if self.is_vm() {
                    self.events.emit(Event::InstructionExecuted(self.address));
                }
                if changed {
                    self.dirty();
                }
                Ok(())
            }
            Err(e) => {
                self.halt(&e);
                Err(e)
            }
        }
    }

    fn halt(&mut self, error: &ChipsError) {
        self.error_message = if self.is_vm() {
            error.halt_message()
        } else {
            error.to_string()
        };
        if self.state == ExecState::Running {
            self.state = ExecState::Paused;
        }
        warn!(device = %self.address, name = %self.name, %error, "halted");
        self.events.emit(Event::ErrorRaised {
            device: self.address,
            message: self.error_message.clone(),
        });
        self.dirty();
    }
}

/// Answer every pending transaction of a passive device. Writes go into
/// memory, read requests are answered through the network. A bad address
/// drops that one transaction; the rest are still handled and the first
/// failure is reported. Returns whether anything was pending.
fn drain_mailbox(
    memory: &mut CellStore,
    mailbox: &mut Mailbox,
    network: &mut dyn Network,
) -> Result<bool, ChipsError> {
    let pending: Vec<_> = mailbox.iter().collect();
    let mut failure = None;
    for (sender, transaction) in &pending {
        mailbox.consume(*sender);
        let index = usize::from(transaction.address);
        let out_of_bounds = ChipsError::OutOfBounds {
            index,
            len: memory.len(),
        };
        match transaction.value {
            Some(value) => {
                if !memory.write(index, value) {
                    failure.get_or_insert(out_of_bounds);
                }
            }
            None => match memory.read(index) {
                Some(value) => {
                    // the requester may have gone; it just never hears back
                    network.post(*sender, Transaction::write(transaction.address, value));
                }
                None => {
                    failure.get_or_insert(out_of_bounds);
                }
            },
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(!pending.is_empty()),
    }
}
