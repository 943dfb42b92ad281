use crate::directory::types::User;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_search_results(
  frame: &mut Frame,
  area: Rect,
  term: &str,
  users: &[User],
  total: u64,
  selected: usize,
  loading: bool,
) {
  let title = if loading {
    format!(" Search \"{}\" (loading...) ", term)
  } else {
    format!(" Search \"{}\" ({} of {}) ", term, users.len(), total)
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if users.is_empty() && !loading {
    let paragraph = Paragraph::new("No users found.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = users
    .iter()
    .map(|user| {
      let mut spans = vec![Span::styled(
        format!("{:<28}", user.display_name()),
        Style::default().fg(Color::Cyan),
      )];
      if let Some(title) = &user.title {
        spans.push(Span::raw(" "));
        spans.push(Span::raw(title.clone()));
      }
      if let Some(email) = &user.email {
        spans.push(Span::styled(
          format!("  {}", email),
          Style::default().fg(Color::DarkGray),
        ));
      }
      ListItem::new(Line::from(spans))
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(selected));

  frame.render_stateful_widget(list, area, &mut state);
}
