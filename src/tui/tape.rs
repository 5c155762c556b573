use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

use super::state::UiState;
use crate::model::{symbol_label, Snapshot};

/// Width of one rendered cell, including its separator.
const CELL_WIDTH: u16 = 4;

/// One visible tape cell.
#[derive(Debug, PartialEq, Eq)]
pub struct TapeCell {
    pub pos: i64,
    pub symbol: String,
    pub under_head: bool,
}

/// Cells of `tape` that fit in `max_cells`, keeping the head in view.
///
/// Positions the head has moved to outside the written tape render as `blank`.
pub fn tape_window(snapshot: &Snapshot, tape: usize, blank: &str, max_cells: usize) -> Vec<TapeCell> {
    let Some(cells) = snapshot.tapes.get(tape) else {
        return Vec::new();
    };
    let head = snapshot.heads.get(tape).copied().unwrap_or_default();
    let max_cells = max_cells.max(1) as i64;

    let lo = head.min(0);
    let hi = head.max(cells.len() as i64 - 1).max(lo);
    let (start, end) = if hi - lo + 1 <= max_cells {
        (lo, hi)
    } else {
        let start = (head - max_cells / 2).clamp(lo, hi - max_cells + 1);
        (start, start + max_cells - 1)
    };

    (start..=end)
        .map(|pos| TapeCell {
            pos,
            symbol: usize::try_from(pos)
                .ok()
                .and_then(|i| cells.get(i))
                .map(symbol_label)
                .unwrap_or_else(|| blank.to_string()),
            under_head: pos == head,
        })
        .collect()
}

pub fn draw_tapes(area: Rect, f: &mut Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Tapes");
    let Some(snapshot) = state.snapshot.as_ref() else {
        let p = Paragraph::new(Line::from(Span::styled(
            "Press Enter to initialize (i to edit input)",
            Style::default().fg(Color::Gray),
        )))
        .block(block);
        f.render_widget(p, area);
        return;
    };

    let max_cells = (area.width.saturating_sub(10) / CELL_WIDTH).max(1) as usize;
    let mut lines = Vec::new();
    for tape in 0..snapshot.tapes.len() {
        let window = tape_window(snapshot, tape, state.blank(), max_cells);
        let mut cells = vec![Span::styled(
            format!("T{:<3} ", tape + 1),
            Style::default().fg(Color::Gray),
        )];
        let mut marker = vec![Span::raw("     ")];
        for c in &window {
            let style = if c.under_head {
                Style::default()
                    .fg(Color::Black)
                    .bg(state.status_color())
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            cells.push(Span::styled(format!("{:^3}", c.symbol), style));
            cells.push(Span::raw("│"));
            marker.push(Span::styled(
                if c.under_head { " ▲  " } else { "    " },
                Style::default().fg(state.status_color()),
            ));
        }
        lines.push(Line::from(cells));
        lines.push(Line::from(marker));
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

pub fn draw_transitions(area: Rect, f: &mut Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title(format!(
        "Transitions ({})",
        state.transitions.len()
    ));
    if state.transitions.is_empty() {
        f.render_widget(
            Paragraph::new("No transitions declared for this machine.").block(block),
            area,
        );
        return;
    }

    let header = Row::new(vec!["#", "From", "Read", "To", "Write", "Move"])
        .style(Style::default().fg(Color::Yellow));
    let rows = state.transitions.iter().enumerate().map(|(i, row)| match row {
        Ok(t) => Row::new(vec![
            Cell::from(i.to_string()),
            Cell::from(t.from_state.clone()),
            Cell::from(t.read_symbols.join(", ")),
            Cell::from(t.to_state.clone()),
            Cell::from(t.write_symbols.join(", ")),
            Cell::from(t.moves.join(", ")),
        ]),
        Err(e) => Row::new(vec![
            Cell::from(i.to_string()),
            Cell::from(Span::styled(e.to_string(), Style::default().fg(Color::Red))),
        ]),
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ],
    )
    .header(header)
    .block(block);
    f.render_widget(table, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tape: &[&str], head: i64) -> Snapshot {
        Snapshot {
            state: "q0".into(),
            tapes: vec![tape.iter().map(|s| (*s).into()).collect()],
            heads: vec![head],
            halted: false,
            step_count: 0,
        }
    }

    #[test]
    fn head_past_end_renders_blank_cell() {
        let w = tape_window(&snap(&["1", "0"], 3), 0, "_", 10);
        let symbols: Vec<&str> = w.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["1", "0", "_", "_"]);
        assert!(w[3].under_head);
    }

    #[test]
    fn negative_head_extends_window_left() {
        let w = tape_window(&snap(&["a"], -2), 0, "B", 10);
        assert_eq!(w.first().map(|c| c.pos), Some(-2));
        assert!(w[0].under_head);
        assert_eq!(w[2].symbol, "a");
    }

    #[test]
    fn long_tape_is_windowed_around_head() {
        let tape: Vec<String> = (0..100).map(|i| (i % 10).to_string()).collect();
        let refs: Vec<&str> = tape.iter().map(String::as_str).collect();
        let w = tape_window(&snap(&refs, 50), 0, "_", 9);
        assert_eq!(w.len(), 9);
        assert!(w.iter().any(|c| c.under_head && c.pos == 50));

        let w = tape_window(&snap(&refs, 0), 0, "_", 9);
        assert_eq!(w.first().map(|c| c.pos), Some(0));
    }
}
