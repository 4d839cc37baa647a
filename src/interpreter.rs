/// # interpreter
///
/// The fetch/decode/execute engine of a VM device. A VM is:
///  * a register file of `Register`s; how many depends on the machine kind,
///    and instructions that need more than the VM has simply fail
///  * a zero flag, set by the test and IO instructions and read by JMPNZI8
///  * an instruction pointer, always at the start of the next instruction
///  * a shared, read-only instruction set
///
/// memory and mailbox belong to the device around it; a `Machine` borrows
/// them together with the cpu for the length of one cycle.
use crate::error::ChipsError;
use crate::isa::{InstructionSet, Register};
use crate::mailbox::Mailbox;
use crate::memory::CellStore;
use crate::network::Network;
use std::rc::Rc;
use tracing::debug;

/// where a device is in its edit/run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    #[default]
    Edit,
    Running,
    Paused,
}

/// the executing part of a VM
#[derive(Debug, Clone)]
pub struct Cpu {
    registers: Vec<Register>,
    flag_zero: bool,
    ip: Register,
    isa: Rc<InstructionSet>,
}

impl Cpu {
    pub fn new(register_count: usize, isa: Rc<InstructionSet>) -> Self {
        Cpu {
            registers: vec![0; register_count],
            flag_zero: false,
            ip: 0,
            isa,
        }
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn register(&self, index: usize) -> Option<Register> {
        self.registers.get(index).copied()
    }

    /// false if there's no such register
    pub fn set_register(&mut self, index: usize, value: Register) -> bool {
        match self.registers.get_mut(index) {
            Some(r) => {
                *r = value;
                true
            }
            None => false,
        }
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn flag_zero(&self) -> bool {
        self.flag_zero
    }

    pub fn set_flag_zero(&mut self, value: bool) {
        self.flag_zero = value;
    }

    pub fn ip(&self) -> Register {
        self.ip
    }

    pub fn set_ip(&mut self, ip: Register) {
        self.ip = ip;
    }

    pub fn instruction_set(&self) -> &Rc<InstructionSet> {
        &self.isa
    }

    /// registers, flag and ip back to zero
    pub fn reset(&mut self) {
        self.registers.iter_mut().for_each(|r| *r = 0);
        self.flag_zero = false;
        self.ip = 0;
    }
}

/// everything an instruction may touch while it runs
pub struct Machine<'a> {
    pub cpu: &'a mut Cpu,
    pub memory: &'a mut CellStore,
    pub mailbox: &'a mut Mailbox,
    pub network: &'a mut dyn Network,
}

/// Run one fetch/decode/execute cycle at the instruction pointer, returning
/// the name of the instruction executed. The pointer advances by the
/// instruction's encoded length only when it succeeds; on failure nothing
/// the failing instruction hadn't already committed is touched.
pub fn cycle(machine: &mut Machine<'_>) -> Result<&'static str, ChipsError> {
    let isa = Rc::clone(&machine.cpu.isa);
    let ip = usize::from(machine.cpu.ip);
    if ip >= machine.memory.len() {
        return Err(ChipsError::IpOutOfBounds {
            ip,
            len: machine.memory.len(),
        });
    }
    let instruction = isa
        .lookup(machine.memory, ip)
        .ok_or(ChipsError::InvalidOpcode { index: ip })?;
    instruction.execute(machine, ip)?;

    // jumps pre-subtract their own length, so this always applies
    let len = instruction.encoded_len() as Register;
    machine.cpu.ip = machine.cpu.ip.wrapping_add(len);
    debug!(
        name = instruction.name(),
        at = ip,
        next = machine.cpu.ip,
        "executed"
    );
    Ok(instruction.name())
}
