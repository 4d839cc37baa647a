///
/// ## Design
///
/// * tiny VMs and passive peripherals (RAM, displays) sit in slots on small
///   networks, and talk to each other only through mailboxes
/// * everything is tick driven and single threaded: a puzzle steps every
///   device once per tick, a VM runs exactly one instruction per step
/// * no device can touch another's memory; a write is a mailbox post, a read
///   is a post of a request followed, a tick or more later, by a post of the
///   answer
/// * abstract the view and input, so a front end can be swapped out and
///   the whole thing runs headless under test
///
/// Model
///
/// Puzzle
///  |-- event bus (observers; the view listens here)
///  |-- fabric: (network, slot) -> device
///  |-- devices
///  |    |-- cell store, mailbox, address, edit/run state
///  |    `-- kind: VM(cpu: registers, zero flag, ip, instruction set) | RAM | Display
///  `-- tick
///       |-- for each device: step it with an outbox onto the fabric
///       |     VM      -> fetch, decode, execute one instruction
///       |     passive -> answer every pending mailbox entry
///       |-- deliver the outbox into the peers' mailboxes
///       `-- check the solution, if the puzzle has one
pub mod device;
pub mod error;
pub mod events;
pub mod input;
pub mod instructions;
pub mod interpreter;
pub mod isa;
pub mod layouts;
pub mod mailbox;
pub mod memory;
pub mod network;
pub mod puzzle;
pub mod session;
pub mod view;

pub use device::Device;
pub use error::ChipsError;
pub use interpreter::ExecState;
pub use puzzle::Puzzle;
