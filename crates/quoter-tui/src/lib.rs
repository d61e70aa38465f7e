// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use quoter_app::{
    DialogField, DialogState, Editor, EditorCommand, EditorEvent, SyncOutcome, TableModel,
    TotalsResponse,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);

/// Side effects the terminal UI needs from its host.
pub trait AppRuntime {
    fn save_table(&mut self, table: &TableModel) -> Result<()>;
    fn sync_enabled(&self) -> bool;
    fn run_totals_sync(
        &mut self,
        form: &[(String, String)],
        adjust: bool,
    ) -> Result<TotalsResponse>;
    fn spawn_totals_sync(
        &mut self,
        request_id: u64,
        form: Vec<(String, String)>,
        adjust: bool,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let outcome = match self.run_totals_sync(&form, adjust) {
            Ok(response) => SyncOutcome::Completed(response),
            Err(error) => SyncOutcome::Failed(format!("{error:#}")),
        };
        tx.send(InternalEvent::TotalsSync {
            request_id,
            outcome,
        })
        .map_err(|_| anyhow!("totals sync channel closed"))?;
        Ok(())
    }
    fn cancel_totals_sync(&mut self, _request_id: u64) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    TotalsSync { request_id: u64, outcome: SyncOutcome },
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ViewData {
    title: String,
    help_visible: bool,
    quit_armed: bool,
    status_token: u64,
}

pub fn run_app<R: AppRuntime>(editor: &mut Editor, runtime: &mut R, title: &str) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData {
        title: title.to_owned(),
        ..ViewData::default()
    };
    let (internal_tx, internal_rx) = mpsc::channel();

    // Server totals for the freshly loaded rows.
    if runtime.sync_enabled() {
        start_sync(editor, runtime, &mut view_data, &internal_tx, false);
    }

    let mut result = Ok(());
    loop {
        process_internal_events(editor, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, editor, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(editor, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    if let Some(request_id) = editor.cancel_sync() {
        let _ = runtime.cancel_totals_sync(request_id);
    }
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: AppRuntime>(
    editor: &mut Editor,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                editor.dispatch(EditorCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::TotalsSync {
                request_id,
                outcome,
            } => {
                let events = editor.finish_sync(request_id, outcome);
                apply_events(editor, runtime, view_data, tx, events);
            }
        }
    }
}

fn apply_events<R: AppRuntime>(
    editor: &mut Editor,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: Vec<EditorEvent>,
) {
    for event in events {
        match event {
            EditorEvent::SyncRequested { adjust } => {
                if runtime.sync_enabled() {
                    start_sync(editor, runtime, view_data, tx, adjust);
                } else if adjust {
                    emit_status(
                        editor,
                        view_data,
                        tx,
                        "totals sync is off -- enable [sync] in the config to adjust margins",
                    );
                }
            }
            EditorEvent::StatusUpdated(_) => {
                view_data.status_token = view_data.status_token.saturating_add(1);
                schedule_status_clear(tx, view_data.status_token);
            }
            EditorEvent::FormDisabled(message) => {
                warn!(%message, "editing disabled after failed totals sync");
            }
            EditorEvent::TableChanged(change) => {
                view_data.quit_armed = false;
                debug!(renames = change.renames.len(), "table changed");
            }
            _ => {}
        }
    }
}

fn start_sync<R: AppRuntime>(
    editor: &mut Editor,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    adjust: bool,
) {
    let ticket = editor.begin_sync();
    if let Some(aborted) = ticket.aborted {
        if let Err(error) = runtime.cancel_totals_sync(aborted) {
            warn!(request_id = aborted, error = %error, "abort totals sync");
        }
    }

    let form = editor.table().serialize_form();
    if let Err(error) = runtime.spawn_totals_sync(ticket.request_id, form, adjust, tx.clone()) {
        let events = editor.finish_sync(
            ticket.request_id,
            SyncOutcome::Failed(format!("{error:#}")),
        );
        apply_events(editor, runtime, view_data, tx, events);
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    editor: &mut Editor,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    editor.dispatch(EditorCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: AppRuntime>(
    editor: &mut Editor,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL) {
        save(editor, runtime, view_data, internal_tx);
        return false;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    if editor.sync().notification().is_some() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
            let events = editor.dispatch(EditorCommand::DismissNotification);
            apply_events(editor, runtime, view_data, internal_tx, events);
        }
        return false;
    }

    let command = if editor.dialog().is_open() {
        dialog_command(editor, key)
    } else {
        match table_command(key) {
            Some(KeyAction::Command(command)) => Some(command),
            Some(KeyAction::Help) => {
                view_data.help_visible = true;
                None
            }
            Some(KeyAction::Quit) => {
                if editor.is_dirty() && !view_data.quit_armed {
                    view_data.quit_armed = true;
                    emit_status(
                        editor,
                        view_data,
                        internal_tx,
                        "unsaved changes -- ctrl+s to save, q again to discard",
                    );
                    return false;
                }
                return true;
            }
            None => None,
        }
    };

    if let Some(command) = command {
        let events = editor.dispatch(command);
        apply_events(editor, runtime, view_data, internal_tx, events);
    }
    false
}

enum KeyAction {
    Command(EditorCommand),
    Help,
    Quit,
}

fn table_command(key: KeyEvent) -> Option<KeyAction> {
    let command = match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => return Some(KeyAction::Quit),
        (KeyCode::Char('?'), _) => return Some(KeyAction::Help),
        (KeyCode::Char('j') | KeyCode::Down, KeyModifiers::NONE) => EditorCommand::SelectNext,
        (KeyCode::Char('k') | KeyCode::Up, KeyModifiers::NONE) => EditorCommand::SelectPrev,
        (KeyCode::Char('J'), _) | (KeyCode::Down, KeyModifiers::SHIFT) => EditorCommand::MoveDown,
        (KeyCode::Char('K'), _) | (KeyCode::Up, KeyModifiers::SHIFT) => EditorCommand::MoveUp,
        (KeyCode::Char('a'), _) => EditorCommand::OpenAdd,
        (KeyCode::Char('e') | KeyCode::Enter, _) => EditorCommand::OpenEdit,
        (KeyCode::Char('d') | KeyCode::Delete, _) => EditorCommand::DeleteSelected,
        (KeyCode::Char('y'), _) => EditorCommand::Duplicate,
        (KeyCode::Char('s'), _) => EditorCommand::SortGroup,
        (KeyCode::Char('S'), _) => EditorCommand::SortAll,
        (KeyCode::Char('x'), _) => EditorCommand::PickUp,
        (KeyCode::Char('p'), _) => EditorCommand::DropHere,
        (KeyCode::Char('r'), _) => EditorCommand::RequestAdjust,
        (KeyCode::Esc, _) => EditorCommand::ClearStatus,
        _ => return None,
    };
    Some(KeyAction::Command(command))
}

fn dialog_command(editor: &Editor, key: KeyEvent) -> Option<EditorCommand> {
    let accepts_text = editor.dialog().focus().accepts_text();
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => Some(EditorCommand::CancelDialog),
        (KeyCode::Enter, _) => Some(EditorCommand::SubmitDialog),
        (KeyCode::Char('d'), KeyModifiers::CONTROL) => Some(EditorCommand::DeleteFromDialog),
        (KeyCode::Tab | KeyCode::Down, _) => Some(EditorCommand::DialogNextField),
        (KeyCode::BackTab | KeyCode::Up, _) => Some(EditorCommand::DialogPrevField),
        (KeyCode::Left, _) if !accepts_text => Some(EditorCommand::DialogCycleCategory(-1)),
        (KeyCode::Right | KeyCode::Char(' '), _) if !accepts_text => {
            Some(EditorCommand::DialogCycleCategory(1))
        }
        (KeyCode::Backspace, _) => Some(EditorCommand::DialogBackspace),
        (KeyCode::Char(ch), modifiers)
            if !modifiers.contains(KeyModifiers::CONTROL) && accepts_text =>
        {
            Some(EditorCommand::DialogInput(ch))
        }
        _ => None,
    }
}

fn save<R: AppRuntime>(
    editor: &mut Editor,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    match runtime.save_table(editor.table()) {
        Ok(()) => {
            editor.mark_saved();
            view_data.quit_armed = false;
            emit_status(editor, view_data, internal_tx, "saved");
        }
        Err(error) => {
            warn!(error = %format!("{error:#}"), "save failed");
            emit_status(
                editor,
                view_data,
                internal_tx,
                format!("save failed: {error:#}"),
            );
        }
    }
}

fn render(frame: &mut ratatui::Frame<'_>, editor: &Editor, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(header_text(editor, view_data))
        .style(Style::default().fg(Color::White))
        .block(Block::default().title("quoter").borders(Borders::ALL));
    frame.render_widget(header, layout[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(layout[1]);
    render_table(frame, body[0], editor);

    let totals = Paragraph::new(totals_panel_text(editor))
        .block(Block::default().title("totals").borders(Borders::ALL));
    frame.render_widget(totals, body[1]);

    let status_widget = Paragraph::new(status_text(editor))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout[2]);

    if editor.dialog().is_open() {
        let area = centered_rect(60, 50, frame.area());
        frame.render_widget(Clear, area);
        let title = match editor.dialog().state() {
            DialogState::Editing { .. } => "edit item",
            _ => "add item",
        };
        let dialog = Paragraph::new(dialog_overlay_text(editor))
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(dialog, area);
    }

    if let Some(message) = editor.sync().notification() {
        let area = centered_rect(60, 25, frame.area());
        frame.render_widget(Clear, area);
        let notification = Paragraph::new(format!("{message}\n\nesc dismiss"))
            .style(Style::default().fg(Color::Red))
            .block(
                Block::default()
                    .title("update failed")
                    .borders(Borders::ALL),
            );
        frame.render_widget(notification, area);
    }

    if view_data.help_visible {
        let area = centered_rect(70, 50, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, editor: &Editor) {
    let format = editor.format();
    let table = editor.table();
    let header = Row::new(
        ["field", "description", "unit", "price", "qty", "total"]
            .into_iter()
            .map(|label| {
                Cell::from(label).style(
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                )
            }),
    );

    let mut rows = Vec::new();
    for group in table.groups() {
        let label = editor
            .category(group.category_id)
            .map(|category| category.label())
            .unwrap_or_else(|| group.code.clone());
        rows.push(
            Row::new(vec![
                Cell::from(String::new()),
                Cell::from(label),
                Cell::from(String::new()),
                Cell::from(String::new()),
                Cell::from(String::new()),
                Cell::from(format.format_amount(group.total())),
            ])
            .style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
        );

        for item in &group.items {
            let path = table
                .path_of(item.id)
                .map(|path| format!("[{}][{}]", path.group, path.item))
                .unwrap_or_default();
            let marker = if editor.picked() == Some(item.id) {
                "* "
            } else {
                "  "
            };
            let mut style = Style::default();
            if editor.is_read_only() {
                style = style.fg(Color::DarkGray);
            }
            if editor.selected() == Some(item.id) {
                style = style.bg(Color::DarkGray);
            }
            if editor.dialog().highlighted() == Some(item.id) {
                style = Style::default()
                    .fg(Color::Black)
                    .bg(Color::Yellow)
                    .add_modifier(Modifier::BOLD);
            }
            rows.push(
                Row::new(vec![
                    Cell::from(format!("{marker}{path}")),
                    Cell::from(item.description.clone()),
                    Cell::from(item.unit.clone()),
                    Cell::from(format.format_amount(item.price)),
                    Cell::from(format.format_input(item.quantity)),
                    Cell::from(format.format_amount(item.total())),
                ])
                .style(style),
            );
        }
    }

    let widths = [
        Constraint::Length(10),
        Constraint::Min(16),
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Length(8),
        Constraint::Length(14),
    ];
    let widget = Table::new(rows, widths)
        .header(header)
        .block(Block::default().title("items").borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn header_text(editor: &Editor, view_data: &ViewData) -> String {
    let mut parts = vec![view_data.title.clone()];
    parts.push(format!("{} items", editor.table().item_count()));
    parts.push(format!(
        "total {}",
        editor.format().format_amount(editor.table().grand_total())
    ));
    if editor.is_dirty() {
        parts.push("modified".to_owned());
    }
    if editor.is_read_only() {
        parts.push("read-only".to_owned());
    }
    if editor.sync().in_flight().is_some() {
        parts.push("syncing".to_owned());
    }
    parts.join(" | ")
}

fn totals_panel_text(editor: &Editor) -> String {
    let format = editor.format();
    let mut lines = Vec::new();
    for group in editor.table().groups() {
        lines.push(format!(
            "{:<8} {:>14}",
            group.code,
            format.format_amount(group.total())
        ));
    }
    lines.push(format!(
        "{:<8} {:>14}",
        "total",
        format.format_amount(editor.table().grand_total())
    ));

    if let Some(totals) = editor.sync().totals() {
        lines.push(String::new());
        lines.push("server".to_owned());
        lines.extend(totals.lines.iter().cloned());
        if let Some(margin) = totals.overall_margin {
            let marker = if totals.overall_below {
                " (below target)"
            } else {
                ""
            };
            lines.push(format!(
                "margin {}{marker}",
                format.format_percent(margin)
            ));
        }
    }
    lines.join("\n")
}

fn dialog_overlay_text(editor: &Editor) -> String {
    let dialog = editor.dialog();
    let form = dialog.form();
    let mut lines = Vec::new();
    for field in DialogField::ORDER {
        let cursor = if dialog.focus() == field { ">" } else { " " };
        let value = match field {
            DialogField::Category => editor
                .category(form.category)
                .map(|category| format!("< {} >", category.label()))
                .unwrap_or_default(),
            _ => form.text(field).to_owned(),
        };
        let mut line = format!("{cursor} {:<12} {value}", field.label());
        if let Some(error) = dialog.error_for(field) {
            line.push_str(&format!("  ! {error}"));
        }
        lines.push(line);
    }
    lines.push(format!("  {:<12} {}", "Total", dialog.total_text()));
    lines.push(String::new());
    let delete_hint = if dialog.highlighted().is_some() {
        " | ctrl+d delete"
    } else {
        ""
    };
    lines.push(format!(
        "tab/shift+tab field | left/right category | enter save | esc cancel{delete_hint}"
    ));
    lines.join("\n")
}

fn status_text(editor: &Editor) -> String {
    let default = "j/k move | J/K reorder | a add | e edit | d del | y dup | s/S sort | x/p pick/drop | r adjust | ctrl+s save | ? help";
    match editor.status_line() {
        Some(status) => format!("{status} | {default}"),
        None => default.to_owned(),
    }
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+s save | ctrl+q quit | q quit (twice when modified)\n\
rows: j/k or up/down select | J/K or shift+up/down move within group\n\
rows: a add | e/enter edit | d delete | y duplicate below\n\
rows: s sort group by description | S sort all groups\n\
rows: x pick up | p drop before selected row (any group)\n\
totals: r ask server to adjust margins | esc dismiss notification\n\
dialog: tab/shift+tab field | left/right category | enter save | esc cancel | ctrl+d delete"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
