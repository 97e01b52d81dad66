//! Key reference for the contract entry screen, built from its bindings.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Text;
use ratatui::widgets::{Block, Borders, Row, Table};

use super::contract_entry::{KEY_BINDINGS, KeySection};
use crate::tui::action::Action;
use crate::tui::app::Screen;

/// What help was opened over, so it can mark which bindings apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelpState {
    origin: Screen,
    editing: bool,
}

impl HelpState {
    /// Help over `origin`; `editing` is whether a pest item was open.
    pub fn opened_from(origin: Screen, editing: bool) -> Self {
        Self { origin, editing }
    }

    pub fn origin(&self) -> Screen {
        self.origin
    }

    pub fn editing(&self) -> bool {
        self.editing
    }

    /// Esc, `q` or F1 return to the origin; every other key is ignored.
    pub fn handle_key(&self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::F(1) => Action::Navigate(self.origin),
            _ => Action::None,
        }
    }
}

/// One heading row per section, then its bindings. Sections that do not
/// apply in the current state are dimmed.
fn rows(editing: bool) -> Vec<Row<'static>> {
    let mut rows = Vec::new();
    for section in KeySection::ALL {
        let active = section.is_active(editing);
        let (heading, key, text) = if active {
            (
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                Style::default().fg(Color::Yellow),
                Style::default(),
            )
        } else {
            let dim = Style::default().fg(Color::DarkGray);
            (dim, dim, dim)
        };

        let note = if active { "" } else { "not available now" };
        rows.push(Row::new(vec![section.title(), note]).style(heading));
        for binding in KEY_BINDINGS.iter().filter(|b| b.section == section) {
            rows.push(Row::new(vec![
                Text::styled(format!("  {}", binding.keys), key),
                Text::styled(binding.does, text),
            ]));
        }
        rows.push(Row::new(vec!["", ""]));
    }
    rows
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[mutants::skip]
pub fn draw_help(state: &HelpState, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Keys (Esc to close) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let table = Table::new(
        rows(state.editing()),
        [Constraint::Length(20), Constraint::Min(10)],
    )
    .block(block);
    frame.render_widget(table, area);
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyEventKind, KeyEventState, KeyModifiers};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use ratatui::buffer::Buffer;

    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn render(editing: bool) -> Buffer {
        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        let state = HelpState::opened_from(Screen::ContractEntry, editing);
        terminal
            .draw(|frame| draw_help(&state, frame, frame.area()))
            .unwrap();
        terminal.backend().buffer().clone()
    }

    fn lines(buf: &Buffer) -> Vec<String> {
        (0..buf.area.height)
            .map(|y| {
                (0..buf.area.width)
                    .map(|x| buf[(x, y)].symbol().chars().next().unwrap_or(' '))
                    .collect()
            })
            .collect()
    }

    /// Foreground of the first cell of `text` on the screen.
    fn fg_of(buf: &Buffer, text: &str) -> Color {
        for (y, line) in lines(buf).iter().enumerate() {
            if let Some(byte) = line.find(text) {
                let x = line[..byte].chars().count();
                return buf[(x as u16, y as u16)].fg;
            }
        }
        panic!("{text} not on screen");
    }

    #[test]
    fn closing_keys_return_to_origin() {
        let state = HelpState::opened_from(Screen::ContractEntry, false);
        for code in [KeyCode::Esc, KeyCode::Char('q'), KeyCode::F(1)] {
            assert_eq!(
                state.handle_key(press(code)),
                Action::Navigate(Screen::ContractEntry)
            );
        }
        assert_eq!(state.handle_key(press(KeyCode::Char('x'))), Action::None);
    }

    #[test]
    fn lists_every_binding() {
        let screen = lines(&render(false)).join("\n");
        for binding in KEY_BINDINGS {
            assert!(screen.contains(binding.does), "missing {}", binding.does);
        }
        for section in KeySection::ALL {
            assert!(screen.contains(section.title()));
        }
    }

    #[test]
    fn editor_keys_are_dimmed_until_an_item_is_open() {
        let idle = render(false);
        assert_eq!(fg_of(&idle, "save the open item"), Color::DarkGray);
        assert_eq!(fg_of(&idle, "Item editor"), Color::DarkGray);
        assert_eq!(fg_of(&idle, "not available now"), Color::DarkGray);
        assert_eq!(fg_of(&idle, "Ctrl+N"), Color::Yellow);

        let editing = render(true);
        assert_eq!(fg_of(&editing, "Ctrl+S"), Color::Yellow);
        assert_eq!(fg_of(&editing, "add a pest item"), Color::DarkGray);
    }
}
