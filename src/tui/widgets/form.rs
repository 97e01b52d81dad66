//! Form controls backed by a [`FormSession`], and their rendering.

use std::cell::Cell;
use std::rc::Rc;

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::engine::FormSession;
use crate::model::{FieldHandle, FieldId, FieldKind, Value};

/// One on-screen control. Registered with the session's focus controller,
/// which only holds it weakly; the owning [`Form`] keeps it alive.
#[derive(Debug)]
pub struct Control {
    id: FieldId,
    label: String,
    kind: FieldKind,
    multiline: bool,
    required: bool,
    options: Vec<Value>,
    present: Cell<bool>,
    enabled: Cell<bool>,
    popup_open: Cell<bool>,
}

impl Control {
    fn new(id: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            id: FieldId::new(id),
            label: label.to_string(),
            kind,
            multiline: false,
            required: false,
            options: Vec::new(),
            present: Cell::new(true),
            enabled: Cell::new(true),
            popup_open: Cell::new(false),
        }
    }

    pub fn text(id: &str, label: &str) -> Self {
        Self::new(id, label, FieldKind::Text)
    }

    pub fn date(id: &str, label: &str) -> Self {
        Self::new(id, label, FieldKind::Date)
    }

    pub fn choice(id: &str, label: &str, options: Vec<Value>) -> Self {
        Self {
            options,
            ..Self::new(id, label, FieldKind::Choice)
        }
    }

    pub fn button(id: &str, label: &str) -> Self {
        Self::new(id, label, FieldKind::Button)
    }

    /// Multi-line text: Shift+Enter inserts a line break.
    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Shown but skipped by traversal.
    pub fn read_only(self) -> Self {
        self.enabled.set(false);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn options(&self) -> &[Value] {
        &self.options
    }

    pub fn set_present(&self, present: bool) {
        self.present.set(present);
        if !present {
            self.popup_open.set(false);
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn popup_open(&self) -> bool {
        self.popup_open.get()
    }

    pub fn close_popup(&self) {
        self.popup_open.set(false);
    }

    /// The option after (or before) `current`. An unknown or empty current
    /// value starts from the first (or last) option.
    pub fn cycle(&self, current: Option<&Value>, forward: bool) -> Option<Value> {
        let len = self.options.len();
        if len == 0 {
            return None;
        }
        let pos = current
            .filter(|v| !v.is_empty())
            .and_then(|v| self.options.iter().position(|o| o.key() == v.key()));
        let next = match (pos, forward) {
            (Some(p), true) => (p + 1) % len,
            (Some(p), false) => (p + len - 1) % len,
            (None, true) => 0,
            (None, false) => len - 1,
        };
        Some(self.options[next].clone())
    }
}

impl FieldHandle for Control {
    fn id(&self) -> &FieldId {
        &self.id
    }

    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn is_present(&self) -> bool {
        self.present.get()
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn focus(&self) {
        self.popup_open.set(false);
    }

    fn activate_popup(&self) {
        self.popup_open.set(true);
    }

    fn is_multiline(&self) -> bool {
        self.multiline
    }
}

/// An ordered set of controls.
#[derive(Debug, Default)]
pub struct Form {
    controls: Vec<Rc<Control>>,
}

impl Form {
    pub fn new(controls: Vec<Control>) -> Self {
        Self {
            controls: controls.into_iter().map(Rc::new).collect(),
        }
    }

    pub fn controls(&self) -> &[Rc<Control>] {
        &self.controls
    }

    pub fn get(&self, id: &str) -> Option<&Rc<Control>> {
        self.controls.iter().find(|c| c.id.as_str() == id)
    }

    /// Every control except buttons, for the focus order.
    pub fn handles(&self) -> Vec<Rc<dyn FieldHandle>> {
        self.controls
            .iter()
            .filter(|c| c.kind != FieldKind::Button)
            .map(|c| Rc::clone(c) as Rc<dyn FieldHandle>)
            .collect()
    }

    /// Height each present control takes when drawn.
    fn layout(&self) -> Vec<(&Rc<Control>, u16)> {
        self.controls
            .iter()
            .filter(|c| c.is_present())
            .map(|c| (c, if c.multiline { 5 } else { 3 }))
            .collect()
    }

    /// Total height of the present controls.
    pub fn height(&self) -> u16 {
        self.layout().iter().map(|(_, h)| h).sum()
    }
}

fn display_value(control: &Control, session: &FormSession) -> String {
    let value = session
        .value(control.id.as_str())
        .map(|v| v.label().to_string())
        .unwrap_or_default();
    match control.kind {
        FieldKind::Choice | FieldKind::MultiChoice if value.is_empty() => "‹ none ›".to_string(),
        FieldKind::Choice | FieldKind::MultiChoice => format!("‹ {value} ›"),
        _ => value,
    }
}

fn option_spans<'a>(control: &'a Control, current: Option<&Value>) -> Vec<Span<'a>> {
    let selected = current.map(Value::key).unwrap_or_default();
    let mut spans = Vec::new();
    for (i, option) in control.options.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        let style = if option.key() == selected {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(option.label(), style));
    }
    spans
}

/// Renders the present controls of `form` top to bottom.
#[cfg_attr(coverage_nightly, coverage(off))]
#[mutants::skip]
pub fn draw_form(
    form: &Form,
    session: &FormSession,
    invalid: Option<&FieldId>,
    frame: &mut Frame,
    area: Rect,
) {
    let layout = form.layout();
    let constraints: Vec<Constraint> = layout
        .iter()
        .map(|(_, h)| Constraint::Length(*h))
        .collect();
    let rows = Layout::vertical(constraints).split(area);
    let focused = session.focus().focused();

    for (i, (control, _)) in layout.iter().enumerate() {
        let is_focused = focused == Some(&control.id);
        let border_color = if invalid == Some(&control.id) {
            Color::Red
        } else if is_focused {
            Color::Yellow
        } else {
            Color::DarkGray
        };

        if control.kind == FieldKind::Button {
            let style = if is_focused {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default().fg(Color::Cyan)
            };
            let button = Paragraph::new(Span::styled(format!("[ {} ]", control.label), style))
                .alignment(Alignment::Center)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(border_color)),
                );
            frame.render_widget(button, rows[i]);
            continue;
        }

        let mut title = control.label.clone();
        if control.required {
            title.push_str(" *");
        }
        if !control.is_enabled() {
            title.push_str(" (computed)");
        }
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color));

        let text = if control.popup_open() && is_focused {
            let current = session.value(control.id.as_str());
            vec![Line::from(option_spans(control, current.as_ref()))]
        } else {
            let value = display_value(control, session);
            let mut lines: Vec<Line> = value.lines().map(|l| Line::from(l.to_string())).collect();
            if lines.is_empty() || value.ends_with('\n') {
                lines.push(Line::from(""));
            }
            if is_focused
                && control.kind != FieldKind::Choice
                && let Some(last) = lines.last_mut()
            {
                last.spans.push(Span::styled(
                    "\u{2588}",
                    Style::default().add_modifier(Modifier::SLOW_BLINK),
                ));
            }
            lines
        };

        let paragraph = Paragraph::new(text)
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, rows[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frequencies() -> Vec<Value> {
        vec![
            Value::reference("monthly", "Monthly"),
            Value::reference("quarterly", "Quarterly"),
            Value::reference("yearly", "Yearly"),
        ]
    }

    fn make_form() -> Form {
        Form::new(vec![
            Control::choice("billing_frequency", "Billing", frequencies()).required(),
            Control::date("start_date", "Start date").required(),
            Control::text("invoice_count", "Invoices").read_only(),
            Control::text("invoice_remarks", "Remarks").multiline(),
            Control::button("submit", "Save contract"),
        ])
    }

    mod control {
        use super::*;

        #[test]
        fn cycle_moves_forward_and_wraps() {
            let form = make_form();
            let c = form.get("billing_frequency").unwrap();
            let quarterly = Value::reference("quarterly", "Quarterly");
            let yearly = Value::reference("yearly", "Yearly");
            assert_eq!(c.cycle(Some(&quarterly), true).unwrap().key(), "yearly");
            assert_eq!(c.cycle(Some(&yearly), true).unwrap().key(), "monthly");
        }

        #[test]
        fn cycle_backward_wraps() {
            let form = make_form();
            let c = form.get("billing_frequency").unwrap();
            let monthly = Value::reference("monthly", "Monthly");
            assert_eq!(c.cycle(Some(&monthly), false).unwrap().key(), "yearly");
        }

        #[test]
        fn cycle_from_empty_starts_at_an_end() {
            let form = make_form();
            let c = form.get("billing_frequency").unwrap();
            assert_eq!(c.cycle(None, true).unwrap().key(), "monthly");
            assert_eq!(c.cycle(Some(&Value::empty()), false).unwrap().key(), "yearly");
        }

        #[test]
        fn cycle_without_options_is_none() {
            let c = Control::choice("contract_type", "Type", vec![]);
            assert_eq!(c.cycle(None, true), None);
        }

        #[test]
        fn focus_closes_and_activate_opens_popup() {
            let c = Control::choice("billing_frequency", "Billing", frequencies());
            c.activate_popup();
            c.activate_popup();
            assert!(c.popup_open());
            c.focus();
            c.focus();
            assert!(!c.popup_open());
        }

        #[test]
        fn unmounting_closes_popup() {
            let c = Control::choice("billing_frequency", "Billing", frequencies());
            c.activate_popup();
            c.set_present(false);
            assert!(!c.is_present());
            assert!(!c.popup_open());
        }

        #[test]
        fn read_only_controls_are_disabled() {
            let form = make_form();
            assert!(!form.get("invoice_count").unwrap().is_enabled());
            assert!(form.get("start_date").unwrap().is_enabled());
        }

        #[test]
        fn handle_reports_kind_and_multiline() {
            let form = make_form();
            let remarks = form.get("invoice_remarks").unwrap();
            assert!(remarks.is_multiline());
            assert_eq!(remarks.kind(), FieldKind::Text);
            assert_eq!(form.get("start_date").unwrap().kind(), FieldKind::Date);
        }
    }

    mod form {
        use super::*;

        #[test]
        fn handles_exclude_buttons() {
            let form = make_form();
            let ids: Vec<String> = form.handles().iter().map(|h| h.id().to_string()).collect();
            assert_eq!(
                ids,
                vec!["billing_frequency", "start_date", "invoice_count", "invoice_remarks"]
            );
        }

        #[test]
        fn get_unknown_is_none() {
            assert!(make_form().get("nope").is_none());
        }

        #[test]
        fn height_counts_present_controls() {
            let form = make_form();
            assert_eq!(form.height(), 3 + 3 + 3 + 5 + 3);
            form.get("invoice_remarks").unwrap().set_present(false);
            assert_eq!(form.height(), 3 + 3 + 3 + 3);
        }

        #[test]
        fn required_flags() {
            let form = make_form();
            assert!(form.get("start_date").unwrap().is_required());
            assert!(!form.get("invoice_remarks").unwrap().is_required());
        }
    }

    mod rendering {
        use ratatui::Terminal;
        use ratatui::backend::TestBackend;

        use super::*;
        use crate::engine::RecordingSink;

        fn buffer_to_string(buf: &ratatui::buffer::Buffer) -> String {
            let mut s = String::new();
            for y in 0..buf.area.height {
                for x in 0..buf.area.width {
                    s.push(buf[(x, y)].symbol().chars().next().unwrap_or(' '));
                }
                s.push('\n');
            }
            s
        }

        fn render(form: &Form, session: &FormSession, invalid: Option<&FieldId>) -> String {
            let backend = TestBackend::new(60, 20);
            let mut terminal = Terminal::new(backend).unwrap();
            terminal
                .draw(|frame| draw_form(form, session, invalid, frame, frame.area()))
                .unwrap();
            buffer_to_string(terminal.backend().buffer())
        }

        fn session() -> FormSession {
            FormSession::new(Rc::new(RecordingSink::new()))
        }

        #[test]
        fn shows_labels_and_values() {
            let form = make_form();
            let mut session = session();
            session.set_field("start_date", Value::scalar("2024-03-01")).unwrap();
            let output = render(&form, &session, None);
            assert!(output.contains("Start date *"));
            assert!(output.contains("2024-03-01"));
            assert!(output.contains("Invoices (computed)"));
            assert!(output.contains("[ Save contract ]"));
        }

        #[test]
        fn empty_choice_shows_none() {
            let form = make_form();
            let output = render(&form, &session(), None);
            assert!(output.contains("‹ none ›"));
        }

        #[test]
        fn open_popup_lists_options() {
            let form = make_form();
            let mut session = session();
            session.register_fields(&form.handles());
            session.focus_mut().focus_first();
            let output = render(&form, &session, None);
            assert!(output.contains("Monthly Quarterly Yearly"));
        }

        #[test]
        fn absent_controls_are_not_drawn() {
            let form = make_form();
            form.get("invoice_remarks").unwrap().set_present(false);
            let output = render(&form, &session(), None);
            assert!(!output.contains("Remarks"));
        }
    }
}
