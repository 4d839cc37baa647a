use crate::device::{Device, DeviceKind};
use crate::interpreter::ExecState;
use crate::puzzle::Puzzle;
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use std::fmt::Write as _;
use std::io;
use tui::backend::CrosstermBackend;
use tui::layout::{Constraint, Direction, Layout};
use tui::style::{Color, Modifier, Style};
use tui::text::{Span, Spans};
use tui::widgets::{Block, Borders, Paragraph, Wrap};
use tui::Terminal;

/// bytes shown per hex dump row
const BYTES_PER_LINE: usize = 16;

/// what the player is looking at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Focus {
    pub selected: usize,
    pub show_documentation: bool,
}

/// View is used by the main loop to put a puzzle on the screen. It should
/// abstract the implementation details, so a variety of front ends would
/// work.
pub trait View {
    fn draw(&mut self, puzzle: &Puzzle, focus: &Focus) -> Result<(), io::Error>;
}

/// "0/1 RAM (32b)"
pub fn device_title(device: &Device) -> String {
    format!(
        "{} {} ({}b)",
        device.address(),
        device.name(),
        device.memory_size()
    )
}

fn state_label(state: ExecState) -> &'static str {
    match state {
        ExecState::Edit => "EDIT",
        ExecState::Running => "RUNNING",
        ExecState::Paused => "PAUSED",
    }
}

/// plain hex dump, one `BYTES_PER_LINE` row per line
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(out, "{:04x}:", row * BYTES_PER_LINE);
        for b in chunk {
            let _ = write!(out, " {:02x}", b);
        }
        out.push('\n');
    }
    out
}

/// hex dump rows with the byte under the instruction pointer highlighted
pub fn hex_rows(bytes: &[u8], ip: Option<usize>) -> Vec<Spans<'static>> {
    let address_style = Style::default().fg(Color::DarkGray);
    let ip_style = Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    bytes
        .chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(row, chunk)| {
            let mut spans = vec![Span::styled(format!("{:04x} ", row * BYTES_PER_LINE), address_style)];
            for (col, b) in chunk.iter().enumerate() {
                let at = row * BYTES_PER_LINE + col;
                spans.push(Span::raw(" "));
                if Some(at) == ip {
                    spans.push(Span::styled(format!("{:02x}", b), ip_style));
                } else {
                    spans.push(Span::raw(format!("{:02x}", b)));
                }
            }
            Spans::from(spans)
        })
        .collect()
}

/// `backtick` markup to lines, the quoted parts highlighted
pub fn markup_lines(markup: &str) -> Vec<Spans<'static>> {
    let highlight = Style::default().fg(Color::Cyan);
    markup
        .lines()
        .map(|line| {
            let spans: Vec<Span<'static>> = line
                .split('`')
                .enumerate()
                .filter(|(_, part)| !part.is_empty())
                .map(|(i, part)| {
                    if i % 2 == 1 {
                        Span::styled(part.to_string(), highlight)
                    } else {
                        Span::raw(part.to_string())
                    }
                })
                .collect();
            Spans::from(spans)
        })
        .collect()
}

/// register, flag and ip lines for a VM; nothing for peripherals
fn register_lines(device: &Device) -> Vec<Spans<'static>> {
    let mut lines = Vec::new();
    if let DeviceKind::Vm(_) = device.kind() {
        for i in 0..device.register_count() {
            let value = device.register(i).unwrap_or_default();
            lines.push(Spans::from(format!("R{}  {:#04x}", i, value)));
        }
        lines.push(Spans::from(format!("Z   {}", u8::from(device.flag_zero()))));
        let ip = device.instruction_pointer().unwrap_or_default();
        lines.push(Spans::from(format!("IP  {:#04x}", ip)));
        let next = device
            .decode_for_display(usize::from(ip))
            .unwrap_or_else(|| "??".to_string());
        lines.push(Spans::from(vec![
            Span::raw("->  "),
            Span::styled(next, Style::default().fg(Color::Cyan)),
        ]));
    }
    lines
}

/// full-screen puzzle view in a terminal, rendered using TUI and crossterm
pub struct TermView {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TermView {
    pub fn new() -> Result<TermView, io::Error> {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        Ok(TermView { terminal })
    }
}

impl Drop for TermView {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

impl View for TermView {
    fn draw(&mut self, puzzle: &Puzzle, focus: &Focus) -> Result<(), io::Error> {
        let devices = puzzle.devices();
        let selected = devices.get(focus.selected);
        self.terminal.draw(|f| {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(8), Constraint::Length(3)].as_ref())
                .split(f.size());
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(60), Constraint::Length(28)].as_ref())
                .split(rows[0]);

            // device list
            let list: Vec<Spans> = devices
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    let style = if i == focus.selected {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    };
                    Spans::from(Span::styled(device_title(d), style))
                })
                .collect();
            f.render_widget(
                Paragraph::new(list).block(Block::default().title("Devices").borders(Borders::ALL)),
                columns[1],
            );

            if let Some(device) = selected {
                let show_docs = focus.show_documentation && device.is_vm();
                let constraints = if show_docs {
                    [Constraint::Percentage(60), Constraint::Percentage(40)]
                } else {
                    [Constraint::Percentage(100), Constraint::Percentage(0)]
                };
                let panes = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints(constraints.as_ref())
                    .split(columns[0]);

                let ip = match puzzle.state() {
                    ExecState::Edit => None,
                    _ => device.instruction_pointer().map(usize::from),
                };
                let mut lines = hex_rows(device.memory().as_slice(), ip);
                lines.push(Spans::from(""));
                lines.extend(register_lines(device));
                if !device.error_message().is_empty() {
                    lines.push(Spans::from(""));
                    lines.push(Spans::from(Span::styled(
                        device.error_message().to_string(),
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    )));
                }
                f.render_widget(
                    Paragraph::new(lines).block(
                        Block::default()
                            .title(format!("Hex Editor for {}", device_title(device)))
                            .borders(Borders::ALL),
                    ),
                    panes[0],
                );

                if show_docs {
                    let mut docs = Vec::new();
                    if let Some(isa) = device.instruction_set() {
                        for instruction in isa.iter() {
                            docs.extend(markup_lines(&instruction.documentation()));
                            docs.push(Spans::from(""));
                        }
                    }
                    f.render_widget(
                        Paragraph::new(docs)
                            .wrap(Wrap { trim: false })
                            .block(Block::default().title("Documentation").borders(Borders::ALL)),
                        panes[1],
                    );
                }
            }

            let status = format!(
                "{} [{}] tick {}   r run  p pause  s step  x stop  tab device  d docs  q quit",
                puzzle.name(),
                state_label(puzzle.state()),
                puzzle.ticks()
            );
            f.render_widget(
                Paragraph::new(status).block(Block::default().borders(Borders::ALL)),
                rows[1],
            );
        })?;
        Ok(())
    }
}

/// useful for testing non-display routines
#[derive(Debug, Default)]
pub struct DummyView {
    pub frames: usize,
}

impl View for DummyView {
    fn draw(&mut self, _puzzle: &Puzzle, _focus: &Focus) -> Result<(), io::Error> {
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkAddress;
    use crate::events::EventBus;

    #[test]
    fn test_hex_dump() {
        let bytes: Vec<u8> = (0..20).collect();
        let dump = hex_dump(&bytes);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000: 00 01 02"));
        assert_eq!(lines[1], "0010: 10 11 12 13");
    }

    #[test]
    fn test_hex_rows_highlight_ip() {
        let rows = hex_rows(&[0xaa; 32], Some(17));
        assert_eq!(rows.len(), 2);
        let highlighted: Vec<_> = rows[1]
            .0
            .iter()
            .filter(|s| s.style.bg == Some(Color::Cyan))
            .collect();
        assert_eq!(highlighted.len(), 1);
        assert!(rows[0].0.iter().all(|s| s.style.bg.is_none()));
    }

    #[test]
    fn test_markup_lines() {
        let lines = markup_lines("`03 LDR0I8` `i8val0`\nLoads into `R0`.");
        assert_eq!(lines.len(), 2);
        let first: Vec<_> = lines[0].0.iter().map(|s| s.content.to_string()).collect();
        assert_eq!(first, vec!["03 LDR0I8", " ", "i8val0"]);
        assert_eq!(lines[1].0[1].content, "R0");
        assert_eq!(lines[1].0[1].style.fg, Some(Color::Cyan));
    }

    #[test]
    fn test_device_title() {
        let d = Device::ram("RAM", NetworkAddress::new(0, 1), 32, EventBus::new());
        assert_eq!(device_title(&d), "0/1 RAM (32b)");
    }

    #[test]
    fn test_dummy_view_counts_frames() -> Result<(), io::Error> {
        let mut v = DummyView::default();
        let p = Puzzle::new("test");
        v.draw(&p, &Focus::default())?;
        v.draw(&p, &Focus::default())?;
        assert_eq!(v.frames, 2);
        Ok(())
    }

    #[test]
    #[ignore]
    // NB. needs a real terminal
    fn test_term_view_draws() -> Result<(), io::Error> {
        let mut v = TermView::new()?;
        let p = Puzzle::new("test");
        v.draw(&p, &Focus::default())
    }
}
