mod help;
mod state;
mod tape;

use crate::cli::Cli;
use crate::engine::HttpEngine;
use crate::model::SessionEvent;
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{KeyAction, UiState, TAB_HELP, TAB_RUN};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let cfg = crate::cli::build_config(&args);
    let engine = Arc::new(HttpEngine::new(&cfg).context("create engine client")?);

    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let interval_ms = cfg.interval_ms;
    let initial_input = cfg.input.clone();
    let ui_handle = std::thread::spawn(move || {
        run_threaded(interval_ms, initial_input, event_rx, cmd_tx)
    });

    let res = orchestrator::run_session(engine, &cfg, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    interval_ms: u64,
    initial_input: String,
    mut event_rx: UnboundedReceiver<SessionEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; the session sees it through events.
    let mut state = UiState {
        interval_ms,
        ..Default::default()
    };
    let mut pending_input = Some(initial_input).filter(|s| !s.is_empty());

    let tick_rate = Duration::from_millis(50);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            let described = matches!(ev, SessionEvent::Descriptor { .. });
            state.apply_event(ev);
            // --input prefills the field for the first machine that loads.
            if described {
                if let Some(input) = pending_input.take() {
                    state.input = input;
                }
            }
        }
        if event_rx.is_closed() && event_rx.is_empty() {
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match state.handle_key(k) {
                    KeyAction::None => {}
                    KeyAction::Send(cmd) => {
                        let _ = cmd_tx.send(cmd);
                    }
                    KeyAction::Quit => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Run"),
        Line::from("Transitions"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("turing-tape"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_RUN => draw_run(chunks[1], f, state),
        TAB_HELP => help::draw_help(chunks[1], f),
        _ => tape::draw_transitions(chunks[1], f, state),
    }
}

fn draw_run(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(6),
                Constraint::Length(3),
                Constraint::Min(4),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(rows[0]);

    let gray = Style::default().fg(Color::Gray);
    let machine = state.machine.as_deref().unwrap_or("-");
    let position = format!("{}/{}", state.selected + 1, state.machines.len().max(1));
    let finals = state
        .descriptor
        .as_ref()
        .map(|d| d.final_states.iter().cloned().collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
    let machine_lines = vec![
        Line::from(vec![
            Span::styled("Machine: ", gray),
            Span::styled(machine.to_string(), Style::default().fg(Color::Yellow)),
            Span::styled(format!("  ({position}, m/M to switch)"), gray),
        ]),
        Line::from(vec![
            Span::styled("Final states: ", gray),
            Span::raw(finals),
        ]),
        Line::from(vec![
            Span::styled("Blank: ", gray),
            Span::raw(state.blank().to_string()),
        ]),
    ];
    f.render_widget(
        Paragraph::new(machine_lines).block(Block::default().borders(Borders::ALL).title("Machine")),
        top[0],
    );

    let status = state.status();
    let (step, machine_state) = state
        .snapshot
        .as_ref()
        .map(|s| (s.step_count.to_string(), s.state.clone()))
        .unwrap_or_else(|| ("-".into(), "-".into()));
    let history = match state.cursor {
        Some(c) => format!("{}/{}", c + 1, state.history_len),
        None => "-".into(),
    };
    let play = if state.playing {
        Span::styled("▶ playing", Style::default().fg(Color::Green))
    } else {
        Span::styled("⏸ paused", gray)
    };
    let run_lines = vec![
        Line::from(vec![
            Span::styled("Status: ", gray),
            Span::styled(
                status.label(),
                Style::default()
                    .fg(state.status_color())
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("State: ", gray),
            Span::raw(machine_state),
            Span::styled("  Step: ", gray),
            Span::raw(step),
            Span::styled("  History: ", gray),
            Span::raw(history),
        ]),
        Line::from(vec![
            play,
            Span::styled(format!("  every {} ms", state.interval_ms), gray),
        ]),
    ];
    f.render_widget(
        Paragraph::new(run_lines).block(Block::default().borders(Borders::ALL).title("Run")),
        top[1],
    );

    let input_line = if state.input.is_empty() && !state.editing_input {
        Line::from(Span::styled(
            state.placeholder().unwrap_or("(empty)").to_string(),
            Style::default().fg(Color::DarkGray),
        ))
    } else if state.editing_input {
        Line::from(vec![
            Span::raw(state.input.clone()),
            Span::styled("█", Style::default().fg(Color::Yellow)),
        ])
    } else {
        Line::from(state.input.clone())
    };
    let input_title = if state.editing_input {
        "Input (editing)"
    } else {
        "Input (i to edit)"
    };
    f.render_widget(
        Paragraph::new(input_line).block(Block::default().borders(Borders::ALL).title(input_title)),
        rows[1],
    );

    tape::draw_tapes(rows[2], f, state);

    let info_style = if state.info_is_error {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(state.status_color())
    };
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(state.info.clone(), info_style)))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Info")),
        rows[3],
    );
}
