use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

const KEYS: &[(&str, &str)] = &[
    ("q / Ctrl-C", "Quit"),
    ("m / M", "Next / previous machine"),
    ("i", "Edit input (Enter initializes, Esc cancels)"),
    ("Enter", "Initialize with current input"),
    ("n / space", "Step once"),
    ("p", "Play / pause auto-step"),
    ("+ / -", "Slower / faster auto-step (50 ms)"),
    ("u", "Undo to previous step"),
    ("r", "Reset run"),
    ("t", "Show / hide transitions"),
    ("e", "Export trace as JSON"),
    ("tab", "Switch tabs"),
    ("?", "Show this help"),
];

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![Line::from("Keybinds:")];
    for (key, what) in KEYS {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
            Span::raw(*what),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(
        "Steps are evaluated by the engine; undo replays recorded snapshots locally.",
    ));
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
