use crossterm::event::{poll, read, Event, KeyCode};
use crossterm::terminal;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::Duration;
use tracing::warn;

/// what the player can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Pause,
    Step,
    Stop,
    NextDevice,
    PreviousDevice,
    ToggleDocumentation,
    Quit,
}

/// character keys and the commands they map to
const KEYMAP: [(char, Command); 6] = [
    ('r', Command::Run),
    ('p', Command::Pause),
    ('s', Command::Step),
    ('x', Command::Stop),
    ('d', Command::ToggleDocumentation),
    ('q', Command::Quit),
];

/// reads player commands
pub trait Input {
    /// every command issued since the last call, oldest first; never blocks
    fn poll_commands(&mut self) -> Result<Vec<Command>, io::Error>;
}

/// keyboard input through crossterm, with the terminal in raw mode for as
/// long as this lives
pub struct KeyboardInput {
    keymap: HashMap<char, Command>,
}

impl KeyboardInput {
    pub fn new() -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        Ok(KeyboardInput {
            keymap: HashMap::from(KEYMAP),
        })
    }

    fn map_key(&self, code: KeyCode) -> Option<Command> {
        match code {
            KeyCode::Char(key) => self.keymap.get(&key.to_ascii_lowercase()).copied(),
            KeyCode::Tab | KeyCode::Right | KeyCode::Down => Some(Command::NextDevice),
            KeyCode::BackTab | KeyCode::Left | KeyCode::Up => Some(Command::PreviousDevice),
            KeyCode::Esc => Some(Command::Quit),
            _ => None,
        }
    }
}

impl Drop for KeyboardInput {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl Input for KeyboardInput {
    fn poll_commands(&mut self) -> Result<Vec<Command>, io::Error> {
        let mut commands = Vec::new();
        while poll(Duration::from_millis(0))? {
            match read()? {
                Event::Key(evt) => match self.map_key(evt.code) {
                    Some(command) => commands.push(command),
                    None => warn!(key = ?evt.code, "unmapped key"),
                },
                Event::Resize(..) => {}
                other => warn!(event = ?other, "unknown event received"),
            }
        }
        Ok(commands)
    }
}

/// dummy Input implementation for testing; hands out one command per poll
pub struct DummyInput {
    commands: VecDeque<Command>,
}

impl DummyInput {
    pub fn new(commands: &[Command]) -> Self {
        DummyInput {
            commands: commands.iter().copied().collect(),
        }
    }
}

impl Input for DummyInput {
    fn poll_commands(&mut self) -> Result<Vec<Command>, io::Error> {
        Ok(self.commands.pop_front().into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keymap_is_unique() {
        let map: HashMap<char, Command> = HashMap::from(KEYMAP);
        assert_eq!(map.len(), KEYMAP.len());
    }

    #[test]
    fn test_dummy_input_one_at_a_time() -> Result<(), io::Error> {
        let mut input = DummyInput::new(&[Command::Run, Command::Quit]);
        assert_eq!(input.poll_commands()?, vec![Command::Run]);
        assert_eq!(input.poll_commands()?, vec![Command::Quit]);
        assert!(input.poll_commands()?.is_empty());
        Ok(())
    }
}
