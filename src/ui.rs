use color_eyre::eyre::Result;
use crossterm::event::{
    self,
    Event,
    KeyCode,
    KeyEventKind,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io::stdout;
use tokio::sync::mpsc;
use wallet_sync::{
    balance::BalanceDisplay,
    presenter::{
        PresenterMode,
        WalletView,
    },
};

pub enum UserEvent {
    Quit,
    Connect,
    SwitchNetwork,
    Refresh,
    RefreshBalance,
    Redraw,
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

/// Everything one frame shows.
pub struct Screen<'a> {
    pub view: &'a WalletView,
    pub balance: &'a BalanceDisplay,
    pub status: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // single persistent Terminal so buffers survive between draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Blocking terminal reads happen on their own thread and are forwarded to
/// the async loop.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_user_event(input: &mut InputEventReceiver) -> Result<UserEvent> {
    loop {
        match input.recv().await {
            Some(Ok(Event::Key(k))) => {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                let ev = match k.code {
                    KeyCode::Char('q') | KeyCode::Esc => UserEvent::Quit,
                    KeyCode::Char('c') => UserEvent::Connect,
                    KeyCode::Char('s') => UserEvent::SwitchNetwork,
                    KeyCode::Char('r') => UserEvent::Refresh,
                    KeyCode::Char('b') => UserEvent::RefreshBalance,
                    _ => continue,
                };
                return Ok(ev);
            }
            Some(Ok(Event::Resize(..))) => return Ok(UserEvent::Redraw),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(UserEvent::Quit),
        }
    }
}

pub fn draw(state: &mut UiState, screen: &Screen<'_>) -> Result<()> {
    if let Some(terminal) = state.terminal.as_mut() {
        terminal.draw(|f| ui(f, screen))?;
    }
    Ok(())
}

fn ui(f: &mut Frame, screen: &Screen<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let title = Paragraph::new(Line::from(vec![
        Span::styled("wallet-sync", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(screen.view.headline.clone(), headline_style(screen.view)),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    match screen.view.mode {
        PresenterMode::ConnectPrompt => draw_connect_prompt(f, chunks[1], screen.view),
        PresenterMode::SwitchNetworkPrompt => draw_switch_prompt(f, chunks[1], screen.view),
        PresenterMode::ConnectedView => draw_connected(f, chunks[1], screen),
    }

    let status = match screen.status {
        Some(message) => Line::styled(message.to_string(), Style::default().fg(Color::Red)),
        None => Line::styled("Ready", Style::default().fg(Color::DarkGray)),
    };
    let status = Paragraph::new(status)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[2]);

    let help = Paragraph::new(help_line(screen.view.mode))
        .style(Style::default().fg(Color::DarkGray));
    f.render_widget(help, chunks[3]);
}

fn draw_connect_prompt(f: &mut Frame, area: Rect, view: &WalletView) {
    let mut lines = vec![Line::from(view.headline.clone())];
    if view.wallet_missing {
        lines.push(Line::styled(
            "No wallet provider detected. Start the wallet and pass --rpc-url.",
            Style::default().fg(Color::Yellow),
        ));
    } else {
        lines.push(Line::from("Press c to connect."));
    }
    if let Some(error) = &view.error {
        lines.push(Line::styled(
            format!("Last error: {error}"),
            Style::default().fg(Color::Red),
        ));
    }
    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Connect"));
    f.render_widget(panel, area);
}

fn draw_switch_prompt(f: &mut Frame, area: Rect, view: &WalletView) {
    let mut lines = vec![
        Line::from(format!(
            "Account: {}",
            view.account.as_deref().unwrap_or("-")
        )),
        Line::styled(
            format!(
                "Current network: {}",
                view.network.as_deref().unwrap_or("-")
            ),
            Style::default().fg(Color::Yellow),
        ),
    ];
    if let Some(target) = &view.switch_target {
        lines.push(Line::from(format!(
            "Press s to switch to {} ({})",
            target.display_name, target.chain_id
        )));
    }
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Wrong network"));
    f.render_widget(panel, area);
}

fn draw_connected(f: &mut Frame, area: Rect, screen: &Screen<'_>) {
    let view = screen.view;
    let mut lines = vec![
        Line::from(format!(
            "Account: {}",
            view.account.as_deref().unwrap_or("-")
        )),
        Line::from(format!(
            "Network: {}",
            view.network.as_deref().unwrap_or("-")
        )),
    ];
    if let Some(balance) = balance_line(screen.balance) {
        lines.push(balance);
    }
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(panel, area);
}

fn balance_line(balance: &BalanceDisplay) -> Option<Line<'static>> {
    let line = match balance {
        BalanceDisplay::Hidden => return None,
        BalanceDisplay::Loading => {
            Line::styled("Balance: loading...", Style::default().fg(Color::DarkGray))
        }
        BalanceDisplay::Amount {
            amount, read_at, ..
        } => Line::from(vec![
            Span::styled(
                format!("Balance: {}", amount.exact()),
                Style::default().fg(Color::Green),
            ),
            Span::styled(
                format!("  ({}, read {})", amount.compact(), read_at.format("%H:%M:%S")),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        BalanceDisplay::NotDeployed => Line::styled(
            "Balance: token not deployed on this network yet",
            Style::default().fg(Color::DarkGray),
        ),
        BalanceDisplay::Unavailable { reason } => Line::styled(
            format!("Balance unavailable: {reason}"),
            Style::default().fg(Color::Red),
        ),
    };
    Some(line)
}

fn headline_style(view: &WalletView) -> Style {
    match view.mode {
        PresenterMode::ConnectedView => Style::default().fg(Color::Green),
        PresenterMode::SwitchNetworkPrompt => Style::default().fg(Color::Yellow),
        PresenterMode::ConnectPrompt if view.error.is_some() => Style::default().fg(Color::Red),
        PresenterMode::ConnectPrompt => Style::default(),
    }
}

fn help_line(mode: PresenterMode) -> &'static str {
    match mode {
        PresenterMode::ConnectPrompt => "c connect  r refresh  q quit",
        PresenterMode::SwitchNetworkPrompt => "s switch network  r refresh  q quit",
        PresenterMode::ConnectedView => "s switch network  b refresh balance  r refresh  q quit",
    }
}
