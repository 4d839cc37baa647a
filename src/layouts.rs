use crate::error::ChipsError;
use crate::instructions::*;
use crate::network::NetworkAddress;
use crate::puzzle::Puzzle;
use std::rc::Rc;

pub const NAMES: [&str; 2] = ["fill", "stripes"];

const VM_MEMORY: usize = 64;
const VM_REGISTERS: usize = 2;

/// the loop counter lives in the VM's last cell
const COUNTER: u8 = 0x3f;

/// ram[i] = i for i in 0..16, through OUTR
#[rustfmt::skip]
const FILL_PROGRAM: [u8; 18] = [
    LDR1, COUNTER,      // 00 R1 = i
    LDR0I8, 0x01,       // 02 R0 = ram slot
    OUTR, 0x01,         // 04 ram[R1] = R1
    LDR0, COUNTER,      // 06
    ADDI8, 0x01,        // 08
    STR0, COUNTER,      // 0a i += 1
    TESTGT, 0x0f,       // 0c
    JMPNZI8, 0x00,      // 0e loop while i <= 15
    JMPI8, 0x10,        // 10 park
];

/// display[i] = 0xaa for i in 0..16
#[rustfmt::skip]
const STRIPES_PROGRAM: [u8; 18] = [
    LDR0I8, 0x01,       // 00 R0 = display slot
    LDR1, COUNTER,      // 02 R1 = i
    OUTI8, 0xaa,        // 04 display[R1] = 0xaa
    LDR0, COUNTER,      // 06
    ADDI8, 0x01,        // 08
    STR0, COUNTER,      // 0a i += 1
    TESTGT, 0x0f,       // 0c
    JMPNZI8, 0x00,      // 0e loop while i <= 15
    JMPI8, 0x10,        // 10 park
];

fn load(puzzle: &mut Puzzle, program: &[u8]) -> Result<(), ChipsError> {
    let id = puzzle
        .resolve(NetworkAddress::new(0, 0))
        .ok_or(ChipsError::UnresolvedPeer(NetworkAddress::new(0, 0)))?;
    if let Some(vm) = puzzle.device_mut(id) {
        let mut p = program;
        vm.load_program(&mut p)?;
    }
    Ok(())
}

/// one VM and one RAM; solved once the ram holds 0, 1, .. 15
pub fn fill() -> Result<Puzzle, ChipsError> {
    let mut puzzle = Puzzle::new("fill");
    let isa = Rc::new(standard_set());
    puzzle.add_vm("VM", NetworkAddress::new(0, 0), VM_MEMORY, VM_REGISTERS, isa)?;
    let ram = NetworkAddress::new(0, 1);
    puzzle.add_ram("RAM", ram, 32)?;
    load(&mut puzzle, &FILL_PROGRAM)?;
    puzzle.set_solution(move |p| {
        p.device_at(ram)
            .map_or(false, |d| (0..16u8).all(|i| d.read(usize::from(i)) == Some(i)))
    });
    Ok(puzzle)
}

/// one VM and a display; solved once the first 16 cells read 0xaa
pub fn stripes() -> Result<Puzzle, ChipsError> {
    let mut puzzle = Puzzle::new("stripes");
    let isa = Rc::new(standard_set());
    puzzle.add_vm("VM", NetworkAddress::new(0, 0), VM_MEMORY, VM_REGISTERS, isa)?;
    let display = NetworkAddress::new(0, 1);
    puzzle.add_display("Display", display, 32)?;
    load(&mut puzzle, &STRIPES_PROGRAM)?;
    puzzle.set_solution(move |p| {
        p.device_at(display)
            .map_or(false, |d| (0..16).all(|i| d.read(i) == Some(0xaa)))
    });
    Ok(puzzle)
}

/// build a layout by name
pub fn build(name: &str) -> Option<Result<Puzzle, ChipsError>> {
    match name {
        "fill" => Some(fill()),
        "stripes" => Some(stripes()),
        _ => None,
    }
}
