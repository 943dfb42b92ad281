mod views;

use crate::app::{App, Mode, ViewState};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let limited = app.rate_limited();
  let mut constraints = vec![Constraint::Min(1)]; // Main content
  if limited {
    constraints.push(Constraint::Length(1)); // Advisory rate-limit banner
  }
  constraints.push(Constraint::Length(1)); // Status bar

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints(constraints)
    .split(frame.area());

  draw_main(frame, chunks[0], app);

  if limited {
    draw_rate_limit_banner(frame, chunks[1], app);
  }
  draw_status_bar(frame, chunks[chunks.len() - 1], app);
}

fn draw_main(frame: &mut Frame, area: Rect, app: &App) {
  if app.auth_failed() {
    draw_not_authorized(frame, area, app.region());
    return;
  }

  match app.current_view() {
    Some(ViewState::Chart {
      superiors,
      superiors_loading,
      root,
      selected,
      ..
    }) => {
      views::chart::draw_chart(
        frame,
        area,
        app.header_title(),
        superiors,
        *superiors_loading,
        root,
        *selected,
      );
    }
    Some(ViewState::SearchResults {
      term,
      users,
      total,
      selected,
      loading,
    }) => {
      views::search::draw_search_results(frame, area, term, users, *total, *selected, *loading);
    }
    None => {
      let paragraph = Paragraph::new("Checking authorization...")
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
    }
  }
}

fn draw_not_authorized(frame: &mut Frame, area: Rect, region: &str) {
  let lines = vec![
    Line::from(Span::styled(
      "Not authorized",
      Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    )),
    Line::raw(""),
    Line::raw(format!(
      "The directory at api.{} rejected the access token.",
      region
    )),
    Line::raw(format!(
      "Complete the OAuth flow at https://login.{}/ for this region,",
      region
    )),
    Line::raw("then export ORGX_ACCESS_TOKEN and restart orgx."),
  ];
  frame.render_widget(Paragraph::new(lines), area);
}

fn draw_rate_limit_banner(frame: &mut Frame, area: Rect, app: &App) {
  let banner = format!(
    " Rate limited by the API - please be patient, retrying in {}s ",
    app.rate_limit_retry_secs()
  );
  let paragraph = Paragraph::new(banner).style(
    Style::default()
      .fg(Color::Black)
      .bg(Color::Yellow)
      .add_modifier(Modifier::BOLD),
  );
  frame.render_widget(paragraph, area);
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match app.mode() {
    Mode::Normal => {
      if let Some(status) = app.status() {
        (status.to_string(), Style::default().fg(Color::Green))
      } else {
        let hint = format!(
          " :command  /search  j/k:nav  Enter:expand  r:recenter  q:back  Ctrl-C:quit  [{} discovered]",
          app.subordinate_count()
        );
        (hint, Style::default().fg(Color::DarkGray))
      }
    }
    Mode::Command => {
      let suggestions = app.autocomplete_suggestions();
      let hint = suggestions
        .get(app.selected_suggestion())
        .map(|cmd| format!("  {} - {}", cmd.name, cmd.description))
        .unwrap_or_default();
      (
        format!(":{}{}", app.command_input(), hint),
        Style::default().fg(Color::Yellow),
      )
    }
    Mode::Search => {
      let search = format!("/{}", app.search_input());
      (search, Style::default().fg(Color::Cyan))
    }
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
