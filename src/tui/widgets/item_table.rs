//! Table of committed line items.

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table};

use crate::model::{LineItem, LocalId, format_amount};

/// Renders the committed rows. `selected` is highlighted; the row open in
/// the editing buffer is marked.
#[cfg_attr(coverage_nightly, coverage(off))]
#[mutants::skip]
pub fn draw_item_table(
    rows: &[LineItem],
    selected: Option<usize>,
    editing: Option<LocalId>,
    frame: &mut Frame,
    area: Rect,
) {
    let block = Block::default()
        .title(" Pest items ")
        .borders(Borders::TOP)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if rows.is_empty() {
        let empty = Paragraph::new("No items yet").alignment(Alignment::Center);
        frame.render_widget(empty, inner);
        return;
    }

    let header = Row::new(vec!["", "Pest", "Frequency", "Visits", "Rate", "Total"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let body: Vec<Row> = rows
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let style = if selected == Some(i) {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default()
            };
            let marker = if editing == Some(item.local_id) { "✎" } else { "" };
            Row::new(vec![
                marker.to_string(),
                item.subject_label.clone(),
                item.frequency_label.clone(),
                item.unit_count().raw().to_string(),
                item.unit_value().raw().to_string(),
                format_amount(item.total()),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(2),
        Constraint::Min(12),
        Constraint::Length(12),
        Constraint::Length(7),
        Constraint::Length(8),
        Constraint::Length(10),
    ];
    frame.render_widget(Table::new(body, widths).header(header), inner);
}
