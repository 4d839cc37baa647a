use crate::events::Event;
use crate::input::{Command, Input};
use crate::interpreter::ExecState;
use crate::puzzle::Puzzle;
use crate::view::{Focus, View};
use std::cell::Cell;
use std::io;
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};

/// Apply one player command. Returns false once the player wants out.
pub fn apply(puzzle: &mut Puzzle, focus: &mut Focus, command: Command) -> bool {
    let count = puzzle.devices().len().max(1);
    match command {
        Command::Run => puzzle.run(),
        Command::Pause => puzzle.pause(),
        Command::Step => {
            for (id, e) in puzzle.step() {
                warn!(device = id.0, error = %e, "step failed");
            }
        }
        Command::Stop => puzzle.stop(),
        Command::NextDevice => focus.selected = (focus.selected + 1) % count,
        Command::PreviousDevice => focus.selected = (focus.selected + count - 1) % count,
        Command::ToggleDocumentation => focus.show_documentation = !focus.show_documentation,
        Command::Quit => return false,
    }
    true
}

/// Main loop: read commands, tick while running, redraw when something
/// changed, sleep out the rest of the tick. `max_frames` bounds the loop for
/// tests; None runs until the player quits.
pub fn run(
    puzzle: &mut Puzzle,
    view: &mut impl View,
    input: &mut impl Input,
    tick: Duration,
    max_frames: Option<u64>,
) -> Result<(), io::Error> {
    let dirty = Rc::new(Cell::new(true));
    let flag = Rc::clone(&dirty);
    puzzle.events().subscribe(move |event| {
        if let Event::PuzzleSolved = event {
            info!("puzzle solved");
        }
        flag.set(true);
    });

    let mut focus = Focus::default();
    let mut frames = 0u64;
    loop {
        for command in input.poll_commands()? {
            dirty.set(true);
            if !apply(puzzle, &mut focus, command) {
                return Ok(());
            }
        }
        if puzzle.state() == ExecState::Running {
            puzzle.tick();
        }
        if dirty.replace(false) {
            view.draw(puzzle, &focus)?;
        }

        frames += 1;
        if max_frames.map_or(false, |max| frames >= max) {
            return Ok(());
        }
        spin_sleep::sleep(tick);
    }
}
