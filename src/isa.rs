use crate::error::ChipsError;
use crate::interpreter::Machine;
use crate::memory::CellStore;
use std::collections::BTreeMap;
use std::fmt::Write;

/// memory address, also the on-the-wire encoding of an `Addr` operand
pub type Address = u8;
/// width of a VM register
pub type Register = u8;

pub const ADDRESS_WIDTH: usize = std::mem::size_of::<Address>();

/// widest opcode, and the size of the window keys are read from
const MAX_OPCODE_LEN: usize = 4;

/// key widths tried, narrowest first, when looking up the bytes at an index
const KEY_WIDTHS: [usize; 3] = [1, 2, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Imm8,
    Imm16,
    Imm32,
    Addr,
    Reg,
}

impl OperandKind {
    /// encoded size in bytes
    pub const fn width(self) -> usize {
        match self {
            OperandKind::Imm8 => 1,
            OperandKind::Imm16 => 2,
            OperandKind::Imm32 => 4,
            OperandKind::Addr => ADDRESS_WIDTH,
            OperandKind::Reg => 1,
        }
    }

    /// placeholder used in documentation, e.g. `i8val0`
    fn placeholder(self, idx: usize) -> String {
        match self {
            OperandKind::Imm8 => format!("i8val{}", idx),
            OperandKind::Imm16 => format!("i16val{}", idx),
            OperandKind::Imm32 => format!("i32val{}", idx),
            OperandKind::Addr => format!("addr{}", idx),
            OperandKind::Reg => format!("reg{}", idx),
        }
    }

    fn render(self, value: u32) -> String {
        match self {
            OperandKind::Imm8 => format!("{:#04x}", value),
            OperandKind::Imm16 => format!("{:#06x}", value),
            OperandKind::Imm32 => format!("{:#010x}", value),
            OperandKind::Addr => format!("[{:#0w$x}]", value, w = 2 + 2 * ADDRESS_WIDTH),
            OperandKind::Reg => format!("R{}", value),
        }
    }
}

/// little-endian unsigned value of up to four bytes
pub fn decode_le(bytes: &[u8]) -> u32 {
    debug_assert!(bytes.len() <= 4);
    let mut buf = [0u8; 4];
    let n = bytes.len().min(4);
    buf[..n].copy_from_slice(&bytes[..n]);
    u32::from_le_bytes(buf)
}

/// how many leading bytes an opcode of `len` bytes is keyed on
fn key_width(len: usize) -> usize {
    match len {
        1 => 1,
        2 => 2,
        _ => 4,
    }
}

/// Table key for an opcode: the first byte for 1-byte opcodes, the first two
/// bytes as a little-endian u16 for 2-byte ones, and four bytes as a u32 for
/// 3- and 4-byte ones. A 3-byte opcode is therefore keyed on one byte more
/// than it has; that byte counts as zero here, so at lookup time the byte
/// following a 3-byte opcode must be zero for it to match.
pub fn opcode_key(opcode: &[u8]) -> u32 {
    let width = key_width(opcode.len());
    let mut window = [0u8; MAX_OPCODE_LEN];
    let n = opcode.len().min(width);
    window[..n].copy_from_slice(&opcode[..n]);
    decode_le(&window[..width])
}

/// What an instruction does once its operands are decoded. Returns false
/// when the instruction declines, e.g. the device has too few registers.
pub type Semantics = fn(&Instruction, &mut Machine<'_>, &[u32]) -> bool;

/// one entry of an instruction set
#[derive(Clone)]
pub struct Instruction {
    name: &'static str,
    opcode: Vec<u8>,
    operands: Vec<OperandKind>,
    description: &'static str,
    semantics: Semantics,
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
            .field("name", &self.name)
            .field("opcode", &self.opcode)
            .field("operands", &self.operands)
            .finish()
    }
}

impl Instruction {
    pub fn new(
        name: &'static str,
        opcode: &[u8],
        operands: &[OperandKind],
        description: &'static str,
        semantics: Semantics,
    ) -> Self {
        assert!(
            (1..=MAX_OPCODE_LEN).contains(&opcode.len()),
            "opcodes are 1 to 4 bytes long"
        );
        Instruction {
            name,
            opcode: opcode.to_vec(),
            operands: operands.to_vec(),
            description,
            semantics,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn opcode(&self) -> &[u8] {
        &self.opcode
    }

    pub fn operands(&self) -> &[OperandKind] {
        &self.operands
    }

    pub fn key(&self) -> u32 {
        opcode_key(&self.opcode)
    }

    /// opcode plus every operand, in bytes
    pub fn encoded_len(&self) -> usize {
        self.opcode.len() + self.operands.iter().map(|o| o.width()).sum::<usize>()
    }

    /// split a fetched instruction into operand values, checking the opcode
    /// prefix first
    pub fn decode_operands(&self, stream: &[u8]) -> Result<Vec<u32>, ChipsError> {
        if stream.len() < self.encoded_len() || !stream.starts_with(&self.opcode) {
            return Err(ChipsError::OpcodeMismatch { name: self.name });
        }
        let mut rest = &stream[self.opcode.len()..];
        let mut values = Vec::with_capacity(self.operands.len());
        for operand in &self.operands {
            let (field, tail) = rest.split_at(operand.width());
            values.push(decode_le(field));
            rest = tail;
        }
        Ok(values)
    }

    /// fetch, decode and run the instruction starting at `index`
    pub fn execute(&self, machine: &mut Machine<'_>, index: usize) -> Result<(), ChipsError> {
        let len = machine.memory.len();
        let stream = machine
            .memory
            .read_span(index, self.encoded_len())
            .ok_or(ChipsError::OutOfBounds {
                index: index.saturating_add(self.encoded_len()),
                len,
            })?;
        let values = self.decode_operands(stream)?;
        if (self.semantics)(self, machine, &values) {
            Ok(())
        } else {
            Err(ChipsError::SemanticFailure { name: self.name })
        }
    }

    /// render the instruction at `index` as text, e.g. `LDR0 [0x0a]`
    pub fn disassemble(&self, memory: &CellStore, index: usize) -> Option<String> {
        let stream = memory.read_span(index, self.encoded_len())?;
        let values = self.decode_operands(stream).ok()?;
        let mut text = self.name.to_string();
        for (i, (kind, value)) in self.operands.iter().zip(values).enumerate() {
            text.push_str(if i == 0 { " " } else { ", " });
            text.push_str(&kind.render(value));
        }
        Some(text)
    }

    /// documentation markup: a `highlighted` header line with the opcode
    /// bytes, name and operand placeholders, then the description
    pub fn documentation(&self) -> String {
        let mut header = String::from("`");
        for b in &self.opcode {
            let _ = write!(header, "{:02x} ", b);
        }
        header.push_str(self.name);
        header.push_str("` ");
        let placeholders: Vec<String> = self
            .operands
            .iter()
            .enumerate()
            .map(|(i, o)| format!("`{}`", o.placeholder(i)))
            .collect();
        header.push_str(&placeholders.join(", "));
        format!("{}\n{}", header.trim_end(), self.description)
    }
}

/// opcode key -> instruction
#[derive(Debug, Clone, Default)]
pub struct InstructionSet {
    table: BTreeMap<u32, Instruction>,
}

impl InstructionSet {
    pub fn new() -> Self {
        InstructionSet::default()
    }

    /// add an instruction; its key must be free
    pub fn insert(&mut self, instruction: Instruction) -> Result<(), ChipsError> {
        let key = instruction.key();
        if self.table.contains_key(&key) {
            return Err(ChipsError::DuplicateOpcode { key });
        }
        self.table.insert(key, instruction);
        Ok(())
    }

    pub fn get(&self, key: u32) -> Option<&Instruction> {
        self.table.get(&key)
    }

    /// find the instruction encoded at `index`
    pub fn lookup(&self, memory: &CellStore, index: usize) -> Option<&Instruction> {
        let mut window = [0u8; MAX_OPCODE_LEN];
        for (i, cell) in window.iter_mut().enumerate() {
            *cell = index
                .checked_add(i)
                .and_then(|at| memory.read(at))
                .unwrap_or(0);
        }
        KEY_WIDTHS.iter().find_map(|width| {
            let instruction = self.table.get(&decode_le(&window[..*width]))?;
            let prefix = memory.read_span(index, instruction.opcode.len())?;
            (prefix == instruction.opcode.as_slice()).then_some(instruction)
        })
    }

    /// render whatever instruction sits at `index`; None if there isn't one
    pub fn decode_for_display(&self, memory: &CellStore, index: usize) -> Option<String> {
        if index >= memory.len() {
            return None;
        }
        self.lookup(memory, index)?.disassemble(memory, index)
    }

    /// instructions in key order
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.table.values()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nothing(_: &Instruction, _: &mut Machine<'_>, _: &[u32]) -> bool {
        true
    }

    fn sample_set() -> InstructionSet {
        let mut set = InstructionSet::new();
        set.insert(Instruction::new("ONE", &[0x01], &[OperandKind::Imm8], "", nothing))
            .unwrap();
        set.insert(Instruction::new("TWO", &[0xf0, 0x02], &[OperandKind::Imm16], "", nothing))
            .unwrap();
        set.insert(Instruction::new("THREE", &[0xf1, 0x02, 0x03], &[OperandKind::Addr], "", nothing))
            .unwrap();
        set.insert(Instruction::new("FOUR", &[0xf2, 1, 2, 3], &[OperandKind::Imm32, OperandKind::Reg], "", nothing))
            .unwrap();
        set.insert(Instruction::new("NOP", &[0x00], &[], "", nothing))
            .unwrap();
        set
    }

    fn store(bytes: &[u8]) -> CellStore {
        let mut m = CellStore::new(16);
        m.load(0, bytes).unwrap();
        m
    }

    #[test]
    fn test_decode_le() {
        assert_eq!(decode_le(&[0x34]), 0x34);
        assert_eq!(decode_le(&[0x34, 0x12]), 0x1234);
        assert_eq!(decode_le(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
    }

    #[test]
    fn test_opcode_keys() {
        assert_eq!(opcode_key(&[0x7f]), 0x7f);
        assert_eq!(opcode_key(&[0x01, 0x02]), 0x0201);
        assert_eq!(opcode_key(&[0x01, 0x02, 0x03]), 0x0003_0201);
        assert_eq!(opcode_key(&[0x01, 0x02, 0x03, 0x04]), 0x0403_0201);
    }

    #[test]
    fn test_encoded_len() {
        let set = sample_set();
        let lens: Vec<_> = set.iter().map(|i| (i.name(), i.encoded_len())).collect();
        assert!(lens.contains(&("ONE", 2)));
        assert!(lens.contains(&("TWO", 4)));
        assert!(lens.contains(&("THREE", 3 + ADDRESS_WIDTH)));
        assert!(lens.contains(&("FOUR", 9)));
        assert!(lens.contains(&("NOP", 1)));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut set = sample_set();
        // [0x01, 0x00] keys to 1, same as ONE
        let r = set.insert(Instruction::new("ALIAS", &[0x01, 0x00], &[], "", nothing));
        assert!(matches!(r, Err(ChipsError::DuplicateOpcode { key: 1 })));
    }

    #[test]
    fn test_lookup_each_width() {
        let set = sample_set();
        let m = store(&[0xf0, 0x02, 0x34, 0x12]);
        assert_eq!(set.lookup(&m, 0).map(|i| i.name()), Some("TWO"));
        let m = store(&[0xf2, 1, 2, 3, 0, 0, 0, 0, 0]);
        assert_eq!(set.lookup(&m, 0).map(|i| i.name()), Some("FOUR"));
        let m = store(&[0x01, 0x02]);
        assert_eq!(set.lookup(&m, 0).map(|i| i.name()), Some("ONE"));
        let m = store(&[0x42]);
        assert!(set.lookup(&m, 0).is_none());
    }

    #[test]
    fn test_three_byte_opcode_needs_zero_after() {
        let set = sample_set();
        let m = store(&[0xf1, 0x02, 0x03, 0x00]);
        assert_eq!(set.lookup(&m, 0).map(|i| i.name()), Some("THREE"));
        let m = store(&[0xf1, 0x02, 0x03, 0x09]);
        assert!(set.lookup(&m, 0).is_none());
    }

    #[test]
    fn test_lookup_at_end_of_memory() {
        let set = sample_set();
        let mut m = CellStore::new(2);
        m.write(1, 0x01);
        assert_eq!(set.lookup(&m, 1).map(|i| i.name()), Some("ONE"));
        // ..but there's no room for its operand
        assert_eq!(set.decode_for_display(&m, 1), None);
        assert_eq!(set.decode_for_display(&m, 2), None);
    }

    #[test]
    fn test_decode_for_display() {
        let set = sample_set();
        let m = store(&[0x01, 0x7f]);
        assert_eq!(set.decode_for_display(&m, 0), Some("ONE 0x7f".to_string()));
        let m = store(&[0xf0, 0x02, 0x34, 0x12]);
        assert_eq!(set.decode_for_display(&m, 0), Some("TWO 0x1234".to_string()));
        let m = store(&[0xf1, 0x02, 0x03, 0x00]);
        assert_eq!(set.decode_for_display(&m, 0), Some("THREE [0x00]".to_string()));
        let m = store(&[0xf2, 1, 2, 3, 0xef, 0xbe, 0xad, 0xde, 1]);
        assert_eq!(
            set.decode_for_display(&m, 0),
            Some("FOUR 0xdeadbeef, R1".to_string())
        );
        let m = store(&[0x00]);
        assert_eq!(set.decode_for_display(&m, 0), Some("NOP".to_string()));
    }

    #[test]
    fn test_operands_mismatched_prefix() {
        let set = sample_set();
        let one = set.get(1).unwrap();
        assert!(matches!(
            one.decode_operands(&[0x02, 0x00]),
            Err(ChipsError::OpcodeMismatch { name: "ONE" })
        ));
        assert_eq!(one.decode_operands(&[0x01, 0x09]).unwrap(), vec![9]);
    }

    #[test]
    fn test_documentation() {
        let i = Instruction::new("LDR0I8", &[0x03], &[OperandKind::Imm8], "Loads `i8val0` into `R0`.", nothing);
        assert_eq!(i.documentation(), "`03 LDR0I8` `i8val0`\nLoads `i8val0` into `R0`.");
        let i = Instruction::new("IN", &[0x31], &[], "Reads.", nothing);
        assert_eq!(i.documentation(), "`31 IN`\nReads.");
    }

    #[test]
    #[should_panic]
    fn test_empty_opcode_panics() {
        let _ = Instruction::new("BAD", &[], &[], "", nothing);
    }
}
