//! Contract entry screen: contract fields, the pest-item editor and table,
//! driven through a [`FormSession`].

use std::rc::Rc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};
use tracing::debug;

use crate::engine::{BufferState, Commit, FormSession};
use crate::lookups::Period;
use crate::model::names::{
    BILLING_FREQUENCY, CONTRACT_TYPE, CONTRACT_VALUE, END_DATE, INVOICE_COUNT, INVOICE_REMARKS,
    ITEM_FREQUENCY, ITEM_SUBJECT, ITEM_TOTAL, ITEM_UNIT_COUNT, ITEM_UNIT_VALUE, REMINDER_DATE,
    START_DATE,
};
use crate::model::{FieldHandle, FieldId, FieldKind, LocalId, Value, format_amount};
use crate::tui::action::Action;
use crate::tui::app::Screen;
use crate::tui::widgets::{
    Control, Form, StatusBarContext, StatusSink, draw_form, draw_item_table, draw_status_bar,
};

/// Key of the submit button, the traversal's terminal handle.
pub const SUBMIT: &str = "submit";

/// Pests the item editor offers.
pub fn pest_options() -> Vec<Value> {
    [
        ("ants", "Ants"),
        ("bed_bugs", "Bed bugs"),
        ("cockroaches", "Cockroaches"),
        ("mosquitoes", "Mosquitoes"),
        ("rodents", "Rodents"),
        ("termites", "Termites"),
    ]
    .into_iter()
    .map(|(id, label)| Value::reference(id, label))
    .collect()
}

/// Contract terms are whole months.
fn contract_types() -> Vec<Value> {
    Period::ALL
        .into_iter()
        .filter(|p| p.months().is_some())
        .map(Period::value)
        .collect()
}

fn frequencies() -> Vec<Value> {
    Period::ALL.into_iter().map(Period::value).collect()
}

/// Which part of the screen a key binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySection {
    /// Contract fields and the whole screen.
    Form,
    /// The pest-item table, while no item is open.
    Items,
    /// The pest-item editor, while an item is open.
    Editor,
}

impl KeySection {
    pub const ALL: [KeySection; 3] = [Self::Form, Self::Items, Self::Editor];

    pub fn title(self) -> &'static str {
        match self {
            Self::Form => "Contract form",
            Self::Items => "Pest items",
            Self::Editor => "Item editor",
        }
    }

    /// Whether the section's bindings apply right now.
    pub fn is_active(self, editing: bool) -> bool {
        match self {
            Self::Form => true,
            Self::Items => !editing,
            Self::Editor => editing,
        }
    }
}

/// One key binding of the contract entry screen.
#[derive(Debug, Clone, Copy)]
pub struct KeyBinding {
    pub keys: &'static str,
    pub does: &'static str,
    pub section: KeySection,
    /// Short label for the footer; `None` keeps the binding out of it.
    pub hint: Option<&'static str>,
}

const fn bind(
    keys: &'static str,
    does: &'static str,
    section: KeySection,
    hint: Option<&'static str>,
) -> KeyBinding {
    KeyBinding {
        keys,
        does,
        section,
        hint,
    }
}

/// Everything [`ContractEntryState::handle_key`] responds to.
pub const KEY_BINDINGS: &[KeyBinding] = &[
    bind("Enter", "next field; submits on Save contract", KeySection::Form, Some("next")),
    bind("Shift+Enter", "line break in multi-line fields", KeySection::Form, None),
    bind("Tab / Shift+Tab", "next / previous field", KeySection::Form, None),
    bind("↑↓ ←→", "cycle the options of a choice", KeySection::Form, None),
    bind("Esc", "close popup, then quit", KeySection::Form, None),
    bind("Ctrl+Q", "quit", KeySection::Form, None),
    bind("Ctrl+N", "add a pest item", KeySection::Items, Some("add item")),
    bind("PgUp/PgDn", "select a pest item", KeySection::Items, Some("select")),
    bind("Ctrl+E", "edit the selected item", KeySection::Items, Some("edit")),
    bind("Ctrl+D", "delete the selected item", KeySection::Items, Some("delete")),
    bind("Ctrl+S", "save the open item", KeySection::Editor, Some("save item")),
    bind("Esc", "discard the open item", KeySection::Editor, Some("cancel item")),
    bind("F1", "show or hide key help", KeySection::Form, Some("help")),
];

/// Footer hints for the bindings that apply right now.
pub fn footer_hint(editing: bool) -> String {
    KEY_BINDINGS
        .iter()
        .filter(|b| b.section.is_active(editing))
        .filter_map(|b| b.hint.map(|hint| format!("{}: {hint}", b.keys)))
        .collect::<Vec<_>>()
        .join("  ")
}

/// Adds the contract form's submit rules to `session`.
pub fn contract_rules(session: FormSession) -> FormSession {
    session
        .require([CONTRACT_TYPE, BILLING_FREQUENCY, START_DATE, END_DATE])
        .with_date_range(START_DATE, END_DATE)
}

/// State for the contract entry screen.
///
/// Owns the controls; the session's focus controller only holds them weakly.
#[derive(Debug)]
pub struct ContractEntryState {
    head: Form,
    item: Form,
    tail: Form,
    selected: Option<usize>,
    invalid: Option<FieldId>,
}

impl ContractEntryState {
    /// Builds the controls, registers them with `session` in traversal
    /// order and focuses the first one.
    pub fn new(session: &mut FormSession) -> Self {
        let head = Form::new(vec![
            Control::choice(CONTRACT_TYPE, "Contract type", contract_types()).required(),
            Control::choice(BILLING_FREQUENCY, "Billing frequency", frequencies()).required(),
            Control::date(START_DATE, "Start date").required(),
            Control::date(END_DATE, "End date").required(),
            Control::date(REMINDER_DATE, "Reminder date"),
            Control::text(INVOICE_COUNT, "Invoices").read_only(),
        ]);
        let item = Form::new(vec![
            Control::choice(ITEM_SUBJECT, "Pest", pest_options()),
            Control::choice(ITEM_FREQUENCY, "Visit frequency", frequencies()),
            Control::text(ITEM_UNIT_COUNT, "Visits"),
            Control::text(ITEM_UNIT_VALUE, "Rate per visit"),
            Control::text(ITEM_TOTAL, "Line total").read_only(),
        ]);
        let tail = Form::new(vec![
            Control::text(INVOICE_REMARKS, "Invoice remarks").multiline(),
            Control::text(CONTRACT_VALUE, "Contract value").read_only(),
            Control::button(SUBMIT, "Save contract"),
        ]);

        session.register_fields(&head.handles());
        session.register_fields(&item.handles());
        session.register_fields(&tail.handles());
        if let Some(submit) = tail.get(SUBMIT) {
            session.set_terminal(&(Rc::clone(submit) as Rc<dyn FieldHandle>));
        }

        let state = Self {
            head,
            item,
            tail,
            selected: None,
            invalid: None,
        };
        state.sync_mounts(session);
        session.focus_mut().focus_first();
        state
    }

    pub fn control(&self, id: &str) -> Option<&Rc<Control>> {
        self.head
            .get(id)
            .or_else(|| self.item.get(id))
            .or_else(|| self.tail.get(id))
    }

    /// Index of the highlighted table row.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// The field the last failed submit pointed at.
    pub fn invalid(&self) -> Option<&FieldId> {
        self.invalid.as_ref()
    }

    pub fn mark_invalid(&mut self, field: Option<&str>) {
        self.invalid = field.map(FieldId::new);
    }

    /// Mounts and unmounts controls to match the session: billing frequency
    /// needs a contract type, item controls need an open buffer.
    pub fn sync_mounts(&self, session: &FormSession) {
        let has_type = session
            .value(CONTRACT_TYPE)
            .is_some_and(|v| !v.is_empty());
        if let Some(billing) = self.head.get(BILLING_FREQUENCY) {
            billing.set_present(has_type);
        }
        let editing = session.items().buffer().is_some();
        for control in self.item.controls() {
            control.set_present(editing);
        }
    }

    /// Re-syncs after the committed rows changed underneath the screen.
    pub fn rows_changed(&mut self, session: &FormSession) {
        self.sync_mounts(session);
        self.clamp_selection(session.items().rows().len());
    }

    /// Returns focus to the contract after the item editor closes.
    pub fn item_closed(&mut self, session: &mut FormSession) {
        self.rows_changed(session);
        session.focus_mut().focus_on(&FieldId::new(INVOICE_REMARKS));
    }

    fn clamp_selection(&mut self, len: usize) {
        self.selected = match (self.selected, len) {
            (_, 0) => None,
            (Some(i), len) => Some(i.min(len - 1)),
            (None, _) => None,
        };
    }

    fn move_selection(&mut self, len: usize, forward: bool) {
        if len == 0 {
            self.selected = None;
            return;
        }
        self.selected = Some(match (self.selected, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(i), true) => (i + 1).min(len - 1),
            (Some(i), false) => i.saturating_sub(1),
        });
    }

    fn selected_row(&self, session: &FormSession) -> Option<LocalId> {
        self.selected
            .and_then(|i| session.items().rows().get(i))
            .map(|row| row.local_id)
    }

    /// Handles a key event, returning an [`Action`] for the app to apply.
    pub fn handle_key(&mut self, session: &mut FormSession, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return self.handle_command(session, key.code);
        }

        let focused = session.focus().focused().cloned();
        let control = focused
            .as_ref()
            .and_then(|id| self.control(id.as_str()))
            .cloned();

        match key.code {
            KeyCode::F(1) => Action::Navigate(Screen::Help),
            KeyCode::Esc => self.escape(session, control.as_deref()),
            KeyCode::Tab => {
                close_popup(control.as_deref());
                match &focused {
                    Some(id) => session.focus_mut().advance_from(id),
                    None => session.focus_mut().focus_first(),
                };
                Action::None
            }
            KeyCode::BackTab => {
                close_popup(control.as_deref());
                if let Some(id) = &focused {
                    session.focus_mut().retreat_from(id);
                }
                Action::None
            }
            KeyCode::Enter => {
                let Some(control) = control else {
                    session.focus_mut().focus_first();
                    return Action::None;
                };
                if control.kind() == FieldKind::Button {
                    return Action::Submit;
                }
                control.close_popup();
                let shift = key.modifiers.contains(KeyModifiers::SHIFT);
                match session.commit_gesture(control.id(), control.is_multiline(), shift) {
                    Commit::LineBreak => self.edit_text(session, &control, |t| t.push('\n')),
                    Commit::Advanced(_) => {}
                }
                Action::None
            }
            KeyCode::Up | KeyCode::Left => {
                self.cycle_choice(session, control.as_deref(), false);
                Action::None
            }
            KeyCode::Down | KeyCode::Right => {
                self.cycle_choice(session, control.as_deref(), true);
                Action::None
            }
            KeyCode::PageUp => {
                self.move_selection(session.items().rows().len(), false);
                Action::None
            }
            KeyCode::PageDown => {
                self.move_selection(session.items().rows().len(), true);
                Action::None
            }
            KeyCode::Backspace => {
                if let Some(control) = control.filter(|c| is_typed(c)) {
                    self.edit_text(session, &control, |t| {
                        t.pop();
                    });
                }
                Action::None
            }
            KeyCode::Char(ch) => {
                if let Some(control) = control.filter(|c| is_typed(c)) {
                    self.edit_text(session, &control, |t| t.push(ch));
                }
                Action::None
            }
            _ => Action::None,
        }
    }

    /// Ctrl-chords for the item table.
    fn handle_command(&mut self, session: &mut FormSession, code: KeyCode) -> Action {
        match code {
            KeyCode::Char('n') => {
                session.begin_add();
                self.open_item_editor(session);
                Action::None
            }
            KeyCode::Char('e') => {
                if let Some(id) = self.selected_row(session)
                    && session.begin_edit(id).is_ok()
                {
                    self.open_item_editor(session);
                }
                Action::None
            }
            KeyCode::Char('s') if session.items().buffer().is_some() => Action::CommitItem,
            KeyCode::Char('d') => self
                .selected_row(session)
                .map_or(Action::None, Action::DeleteItem),
            KeyCode::Char('c') | KeyCode::Char('q') => Action::Quit,
            _ => Action::None,
        }
    }

    fn open_item_editor(&mut self, session: &mut FormSession) {
        self.sync_mounts(session);
        session.focus_mut().focus_on(&FieldId::new(ITEM_SUBJECT));
    }

    /// Esc closes an open popup, then an open item editor, then quits.
    fn escape(&mut self, session: &mut FormSession, control: Option<&Control>) -> Action {
        if let Some(control) = control.filter(|c| c.popup_open()) {
            control.close_popup();
            return Action::None;
        }
        if session.cancel_edit() {
            self.item_closed(session);
            return Action::None;
        }
        Action::Quit
    }

    fn cycle_choice(&mut self, session: &mut FormSession, control: Option<&Control>, forward: bool) {
        let Some(control) = control.filter(|c| c.kind().has_popup()) else {
            return;
        };
        let current = session.value(control.id().as_str());
        if let Some(next) = control.cycle(current.as_ref(), forward) {
            self.set(session, control.id(), next);
        }
    }

    fn edit_text(&mut self, session: &mut FormSession, control: &Control, edit: impl FnOnce(&mut String)) {
        let mut text = session
            .value(control.id().as_str())
            .map(|v| v.label().to_string())
            .unwrap_or_default();
        edit(&mut text);
        self.set(session, control.id(), Value::scalar(text));
    }

    fn set(&mut self, session: &mut FormSession, field: &FieldId, value: Value) {
        if self.invalid.as_ref() == Some(field) {
            self.invalid = None;
        }
        match session.set_field(field.as_str(), value) {
            Ok(fired) => debug!(field = %field, bindings = fired.len(), "field edited"),
            Err(e) => debug!(field = %field, error = %e, "edit rejected"),
        }
        self.sync_mounts(session);
    }
}

fn close_popup(control: Option<&Control>) {
    if let Some(control) = control {
        control.close_popup();
    }
}

/// Controls that take typed characters.
fn is_typed(control: &Control) -> bool {
    matches!(control.kind(), FieldKind::Text | FieldKind::Date | FieldKind::Time)
}

/// Renders the contract entry screen.
#[cfg_attr(coverage_nightly, coverage(off))]
#[mutants::skip]
pub fn draw_contract_entry(
    state: &ContractEntryState,
    session: &FormSession,
    sink: &StatusSink,
    frame: &mut Frame,
    area: Rect,
) {
    let block = Block::default()
        .title(" Service contract ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [body_area, footer_area, status_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(inner);

    let [left_area, right_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
            .areas(body_area);

    let [head_area, tail_area] = Layout::vertical([
        Constraint::Length(state.head.height()),
        Constraint::Min(0),
    ])
    .areas(left_area);
    draw_form(&state.head, session, state.invalid(), frame, head_area);
    draw_form(&state.tail, session, state.invalid(), frame, tail_area);

    let [item_area, table_area] = Layout::vertical([
        Constraint::Length(state.item.height()),
        Constraint::Min(3),
    ])
    .areas(right_area);
    draw_form(&state.item, session, state.invalid(), frame, item_area);

    let editing = match session.items().state() {
        BufferState::EditingExisting(id) => Some(id),
        _ => None,
    };
    draw_item_table(session.items().rows(), state.selected(), editing, frame, table_area);

    let hint = footer_hint(session.items().buffer().is_some());
    let footer = Paragraph::new(Line::from(hint))
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM));
    frame.render_widget(footer, footer_area);

    let ctx = StatusBarContext {
        notification: sink.latest(),
        contract_value: format_amount(session.contract_value()),
        row_count: session.items().rows().len(),
        pending: session.engine().in_flight(),
    };
    draw_status_bar(&ctx, frame, status_area);
}
