use crate::interpreter::Machine;
use crate::isa::{Instruction, InstructionSet, OperandKind, Register};
use crate::mailbox::Transaction;

// NB. R0 doubles as the network slot for OUT/IN and R1 as the remote address,
//     so anything touching the network needs both

pub const LDR0: u8 = 0x01;
pub const LDR1: u8 = 0x02;
pub const LDR0I8: u8 = 0x03;
pub const LDR1I8: u8 = 0x04;
pub const STR0: u8 = 0x05;
pub const STR1: u8 = 0x06;
pub const ADDI8: u8 = 0x10;
pub const ADD: u8 = 0x11;
pub const SUBI8: u8 = 0x12;
pub const SUB: u8 = 0x13;
pub const JMPI8: u8 = 0x20;
pub const JMPNZI8: u8 = 0x21;
pub const OUTI8: u8 = 0x30;
pub const OUTR: u8 = 0x31;
pub const IN: u8 = 0x32;
pub const TESTZ: u8 = 0x40;
pub const TESTGT: u8 = 0x41;

/// memory cell at a decoded address operand, if it's in range
fn cell(machine: &Machine<'_>, operand: u32) -> Option<Register> {
    machine.memory.read(usize::try_from(operand).ok()?)
}

fn load_address(reg: usize, machine: &mut Machine<'_>, address: u32) -> bool {
    if machine.cpu.register_count() <= reg {
        return false;
    }
    match cell(machine, address) {
        Some(v) => machine.cpu.set_register(reg, v),
        None => false,
    }
}

fn store_address(reg: usize, machine: &mut Machine<'_>, address: u32) -> bool {
    match machine.cpu.register(reg) {
        Some(v) => machine.memory.write(address as usize, v),
        None => false,
    }
}

fn ldr0(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    load_address(0, m, ops[0])
}

fn ldr1(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    load_address(1, m, ops[0])
}

fn ldr0_imm8(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    m.cpu.set_register(0, ops[0] as Register)
}

fn ldr1_imm8(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    m.cpu.set_register(1, ops[0] as Register)
}

fn str0(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    store_address(0, m, ops[0])
}

fn str1(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    store_address(1, m, ops[0])
}

/// R0 <- f(R0, rhs)
fn accumulate(m: &mut Machine<'_>, rhs: Option<Register>, f: fn(Register, Register) -> Register) -> bool {
    match (m.cpu.register(0), rhs) {
        (Some(r0), Some(rhs)) => m.cpu.set_register(0, f(r0, rhs)),
        _ => false,
    }
}

fn add_imm8(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    accumulate(m, Some(ops[0] as Register), Register::wrapping_add)
}

fn add_address(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    let rhs = cell(m, ops[0]);
    accumulate(m, rhs, Register::wrapping_add)
}

fn sub_imm8(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    accumulate(m, Some(ops[0] as Register), Register::wrapping_sub)
}

fn sub_address(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    let rhs = cell(m, ops[0]);
    accumulate(m, rhs, Register::wrapping_sub)
}

/// target minus our own length, since the ip advances past us afterwards
fn jump_target(this: &Instruction, target: u32) -> Register {
    (target as Register).wrapping_sub(this.encoded_len() as Register)
}

fn jmp_imm8(this: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    m.cpu.set_ip(jump_target(this, ops[0]));
    true
}

fn jmpnz_imm8(this: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    if !m.cpu.flag_zero() {
        m.cpu.set_ip(jump_target(this, ops[0]));
    }
    true
}

/// write `value` to the device at slot R0, address R1
fn send(m: &mut Machine<'_>, value: Register) -> bool {
    let (slot, address) = match (m.cpu.register(0), m.cpu.register(1)) {
        (Some(slot), Some(address)) => (slot, address),
        _ => return false,
    };
    let delivered = m.network.post(slot, Transaction::write(address, value));
    m.cpu.set_flag_zero(!delivered);
    true
}

fn out_imm8(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    send(m, ops[0] as Register)
}

fn out_reg(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    match m.cpu.register(ops[0] as usize) {
        Some(v) => send(m, v),
        None => false,
    }
}

fn input(_: &Instruction, m: &mut Machine<'_>, _: &[u32]) -> bool {
    let (slot, address) = match (m.cpu.register(0), m.cpu.register(1)) {
        (Some(slot), Some(address)) => (slot, address),
        _ => return false,
    };
    match m.mailbox.peek(slot) {
        Some(Transaction { value: Some(v), .. }) => {
            m.cpu.set_flag_zero(false);
            m.cpu.set_register(0, v);
            m.mailbox.consume(slot);
        }
        _ => {
            // nothing yet; (re)send the request and let the program poll
            m.cpu.set_flag_zero(true);
            m.network.post(slot, Transaction::read(address));
        }
    }
    true
}

fn test_zero(_: &Instruction, m: &mut Machine<'_>, _: &[u32]) -> bool {
    match m.cpu.register(0) {
        Some(r0) => {
            m.cpu.set_flag_zero(r0 == 0);
            true
        }
        None => false,
    }
}

fn test_greater_than(_: &Instruction, m: &mut Machine<'_>, ops: &[u32]) -> bool {
    match m.cpu.register(0) {
        Some(r0) => {
            m.cpu.set_flag_zero(u32::from(r0) > ops[0]);
            true
        }
        None => false,
    }
}

/// every instruction a standard VM understands
pub fn standard_instructions() -> Vec<Instruction> {
    use OperandKind::*;
    vec![
        Instruction::new("LDR0", &[LDR0], &[Addr], "Loads the value at `addr0` into `R0`.", ldr0),
        Instruction::new("LDR1", &[LDR1], &[Addr], "Loads the value at `addr0` into `R1`.", ldr1),
        Instruction::new("LDR0I8", &[LDR0I8], &[Imm8], "Loads the immediate value `i8val0` into `R0`.", ldr0_imm8),
        Instruction::new("LDR1I8", &[LDR1I8], &[Imm8], "Loads the immediate value `i8val0` into `R1`.", ldr1_imm8),
        Instruction::new("STR0", &[STR0], &[Addr], "Stores the value in `R0` at `addr0`.", str0),
        Instruction::new("STR1", &[STR1], &[Addr], "Stores the value in `R1` at `addr0`.", str1),
        Instruction::new("ADDI8", &[ADDI8], &[Imm8], "Adds the immediate value `i8val0` to `R0`.", add_imm8),
        Instruction::new("ADD", &[ADD], &[Addr], "Adds the value at `addr0` to `R0`.", add_address),
        Instruction::new("SUBI8", &[SUBI8], &[Imm8], "Subtracts the immediate value `i8val0` from `R0`.", sub_imm8),
        Instruction::new("SUB", &[SUB], &[Addr], "Subtracts the value at `addr0` from `R0`.", sub_address),
        Instruction::new("JMPI8", &[JMPI8], &[Imm8], "Jumps to the immediate value `i8val0`.", jmp_imm8),
        Instruction::new(
            "JMPNZI8",
            &[JMPNZI8],
            &[Imm8],
            "Jumps to the immediate value `i8val0` if the zero flag is not set.",
            jmpnz_imm8,
        ),
        Instruction::new(
            "OUTI8",
            &[OUTI8],
            &[Imm8],
            "Sends the value `i8val0` to the network device at `R0` and address `R1`.\nSets the zero flag if there is no such device.",
            out_imm8,
        ),
        Instruction::new(
            "OUTR",
            &[OUTR],
            &[Reg],
            "Sends the value in `reg0` to the network device at `R0` and address `R1`.\nSets the zero flag if there is no such device.",
            out_reg,
        ),
        Instruction::new(
            "IN",
            &[IN],
            &[],
            "Requests a value from the network device at `R0` and address `R1`.\nEither sets the zero flag if no data was received,\nor the data is received in `R0` and the zero flag is cleared.",
            input,
        ),
        Instruction::new("TESTZ", &[TESTZ], &[], "Sets the zero flag if `R0` is zero.", test_zero),
        Instruction::new(
            "TESTGT",
            &[TESTGT],
            &[Imm8],
            "Sets the zero flag if `R0` is greater than `i8val0`.",
            test_greater_than,
        ),
    ]
}

/// table of [`standard_instructions`]
pub fn standard_set() -> InstructionSet {
    let mut set = InstructionSet::new();
    for instruction in standard_instructions() {
        // opcodes above are all distinct single bytes
        if let Err(e) = set.insert(instruction) {
            unreachable!("standard instruction set is inconsistent: {}", e);
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChipsError;
    use crate::interpreter::{cycle, Cpu};
    use crate::mailbox::Mailbox;
    use crate::memory::CellStore;
    use crate::network::{Network, SlotId};
    use std::rc::Rc;

    /// network of fixed slots that remembers what was posted
    #[derive(Default)]
    struct Recorder {
        live: Vec<SlotId>,
        posts: Vec<(SlotId, Transaction)>,
    }

    impl Network for Recorder {
        fn resolve(&self, slot: SlotId) -> bool {
            self.live.contains(&slot)
        }

        fn post(&mut self, slot: SlotId, transaction: Transaction) -> bool {
            if self.resolve(slot) {
                self.posts.push((slot, transaction));
                true
            } else {
                false
            }
        }
    }

    struct Rig {
        cpu: Cpu,
        memory: CellStore,
        mailbox: Mailbox,
        network: Recorder,
    }

    impl Rig {
        fn new(registers: usize, program: &[u8]) -> Self {
            let mut memory = CellStore::new(32);
            memory.load(0, program).unwrap();
            Rig {
                cpu: Cpu::new(registers, Rc::new(standard_set())),
                memory,
                mailbox: Mailbox::new(),
                network: Recorder::default(),
            }
        }

        fn step(&mut self) -> Result<&'static str, ChipsError> {
            cycle(&mut Machine {
                cpu: &mut self.cpu,
                memory: &mut self.memory,
                mailbox: &mut self.mailbox,
                network: &mut self.network,
            })
        }
    }

    #[test]
    fn test_every_opcode_is_one_byte_and_unique() {
        let set = standard_set();
        assert_eq!(set.len(), standard_instructions().len());
        assert!(set.iter().all(|i| i.opcode().len() == 1));
    }

    #[test]
    fn test_load_and_store() -> Result<(), ChipsError> {
        let mut rig = Rig::new(2, &[LDR0, 0x10, LDR1, 0x11, STR0, 0x12, STR1, 0x13]);
        rig.memory.write(0x10, 7);
        rig.memory.write(0x11, 9);
        for _ in 0..4 {
            rig.step()?;
        }
        assert_eq!(rig.cpu.registers(), &[7, 9]);
        assert_eq!(rig.memory.read_span(0x12, 2), Some(&[7u8, 9][..]));
        assert_eq!(rig.cpu.ip(), 8);
        Ok(())
    }

    #[test]
    fn test_load_out_of_bounds_fails() {
        let mut rig = Rig::new(2, &[LDR0, 0x40]);
        assert!(matches!(rig.step(), Err(ChipsError::SemanticFailure { name: "LDR0" })));
        let mut rig = Rig::new(2, &[STR1, 0x20]);
        assert!(rig.step().is_err());
        assert_eq!(rig.cpu.ip(), 0);
    }

    #[test]
    fn test_register_absent() {
        let mut rig = Rig::new(0, &[LDR0I8, 1]);
        assert!(rig.step().is_err());
        let mut rig = Rig::new(1, &[STR1, 0x10]);
        assert!(rig.step().is_err());
        let mut rig = Rig::new(0, &[TESTZ]);
        assert!(rig.step().is_err());
    }

    #[test]
    fn test_arithmetic_wraps() -> Result<(), ChipsError> {
        let mut rig = Rig::new(1, &[LDR0I8, 0xff, ADDI8, 0x02, SUB, 0x10, SUBI8, 0x01]);
        rig.memory.write(0x10, 0x03);
        rig.step()?;
        rig.step()?;
        assert_eq!(rig.cpu.register(0), Some(0x01));
        rig.step()?;
        assert_eq!(rig.cpu.register(0), Some(0xfe));
        rig.step()?;
        assert_eq!(rig.cpu.register(0), Some(0xfd));
        Ok(())
    }

    #[test]
    fn test_add_address() -> Result<(), ChipsError> {
        let mut rig = Rig::new(1, &[LDR0I8, 0x05, ADD, 0x10]);
        rig.memory.write(0x10, 0x06);
        rig.step()?;
        rig.step()?;
        assert_eq!(rig.cpu.register(0), Some(0x0b));
        Ok(())
    }

    #[test]
    fn test_jumps() -> Result<(), ChipsError> {
        // JMPI8 needs no registers at all
        let mut rig = Rig::new(0, &[JMPI8, 0x06]);
        rig.step()?;
        assert_eq!(rig.cpu.ip(), 0x06);

        let mut rig = Rig::new(1, &[JMPNZI8, 0x08, JMPNZI8, 0x08]);
        rig.cpu.set_flag_zero(true);
        rig.step()?;
        assert_eq!(rig.cpu.ip(), 2);
        rig.cpu.set_flag_zero(false);
        rig.step()?;
        assert_eq!(rig.cpu.ip(), 8);

        // jumping to 0 wraps through the pre-subtraction
        let mut rig = Rig::new(0, &[JMPI8, 0x00]);
        rig.step()?;
        assert_eq!(rig.cpu.ip(), 0);
        Ok(())
    }

    #[test]
    fn test_tests() -> Result<(), ChipsError> {
        let mut rig = Rig::new(1, &[TESTZ, TESTGT, 0x04, LDR0I8, 0x05, TESTGT, 0x04, TESTZ]);
        rig.step()?;
        assert!(rig.cpu.flag_zero());
        rig.step()?;
        assert!(!rig.cpu.flag_zero());
        rig.step()?;
        rig.step()?;
        assert!(rig.cpu.flag_zero());
        rig.step()?;
        assert!(!rig.cpu.flag_zero());
        Ok(())
    }

    #[test]
    fn test_out_posts_write() -> Result<(), ChipsError> {
        let mut rig = Rig::new(2, &[LDR0I8, 3, LDR1I8, 0x0c, OUTI8, 0x2a, LDR0I8, 4, OUTI8, 0x2b]);
        rig.network.live = vec![3];
        rig.step()?;
        rig.step()?;
        rig.step()?;
        assert!(!rig.cpu.flag_zero());
        assert_eq!(rig.network.posts, vec![(3, Transaction::write(0x0c, 0x2a))]);
        rig.step()?;
        rig.step()?;
        // nobody at slot 4
        assert!(rig.cpu.flag_zero());
        assert_eq!(rig.network.posts.len(), 1);
        Ok(())
    }

    #[test]
    fn test_out_reg() -> Result<(), ChipsError> {
        let mut rig = Rig::new(2, &[LDR0I8, 1, LDR1I8, 9, OUTR, 1, OUTR, 7]);
        rig.network.live = vec![1];
        rig.step()?;
        rig.step()?;
        rig.step()?;
        assert_eq!(rig.network.posts, vec![(1, Transaction::write(9, 9))]);
        assert!(matches!(rig.step(), Err(ChipsError::SemanticFailure { name: "OUTR" })));
        Ok(())
    }

    #[test]
    fn test_out_needs_two_registers() {
        let mut rig = Rig::new(1, &[OUTI8, 1]);
        assert!(rig.step().is_err());
        let mut rig = Rig::new(1, &[IN]);
        assert!(rig.step().is_err());
    }

    #[test]
    fn test_in_requests_then_receives() -> Result<(), ChipsError> {
        let mut rig = Rig::new(2, &[LDR0I8, 2, LDR1I8, 0x1f, IN, IN]);
        rig.network.live = vec![2];
        rig.step()?;
        rig.step()?;
        rig.step()?;
        assert!(rig.cpu.flag_zero());
        assert_eq!(rig.network.posts, vec![(2, Transaction::read(0x1f))]);

        // the peer answers
        rig.mailbox.post(2, Transaction::write(0x1f, 0x99));
        rig.step()?;
        assert!(!rig.cpu.flag_zero());
        assert_eq!(rig.cpu.register(0), Some(0x99));
        assert!(rig.mailbox.peek(2).is_none());
        Ok(())
    }

    #[test]
    fn test_in_from_nobody_sets_zero() -> Result<(), ChipsError> {
        let mut rig = Rig::new(2, &[IN]);
        rig.step()?;
        assert!(rig.cpu.flag_zero());
        assert!(rig.network.posts.is_empty());
        Ok(())
    }

    #[test]
    fn test_in_ignores_peer_read_request() -> Result<(), ChipsError> {
        let mut rig = Rig::new(2, &[IN]);
        rig.network.live = vec![0];
        rig.mailbox.post(0, Transaction::read(4));
        rig.step()?;
        assert!(rig.cpu.flag_zero());
        assert_eq!(rig.mailbox.peek(0), Some(Transaction::read(4)));
        assert_eq!(rig.network.posts, vec![(0, Transaction::read(0))]);
        Ok(())
    }

    #[test]
    fn test_counter_loop() -> Result<(), ChipsError> {
        let mut rig = Rig::new(2, &[LDR0I8, 0x08, ADDI8, 0x01, STR0, 0x0a, JMPI8, 0x02]);
        rig.step()?;
        for expected in 9..20u8 {
            assert_eq!(rig.step()?, "ADDI8");
            assert_eq!(rig.step()?, "STR0");
            assert_eq!(rig.memory.read(0x0a), Some(expected));
            assert_eq!(rig.step()?, "JMPI8");
            assert_eq!(rig.cpu.ip(), 0x02);
        }
        Ok(())
    }
}
