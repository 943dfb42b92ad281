use crate::app::ChartNode;
use crate::directory::types::User;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};

pub fn draw_chart(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  superiors: &[User],
  superiors_loading: bool,
  root: &ChartNode,
  selected: usize,
) {
  let heading = if superiors_loading {
    format!(" Org Chart [{}] (loading superiors...) ", title)
  } else {
    format!(" Org Chart [{}] ", title)
  };

  let block = Block::default()
    .title(heading)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  // The API returns the chain immediate-manager-first; the chart shows it
  // top-down, so reverse before rendering.
  let chain_len = superiors.len();

  let mut items: Vec<ListItem> = Vec::new();
  for (depth, user) in superiors.iter().rev().enumerate() {
    items.push(user_row(depth, "  ", user, true));
  }

  let mut rows = Vec::new();
  root.visible_rows(chain_len, &mut rows);
  for (depth, node) in &rows {
    let marker = if node.loading {
      "~ "
    } else if node.expanded {
      "v "
    } else {
      "> "
    };
    items.push(user_row(*depth, marker, &node.user, false));
  }

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  // Selection only moves within the report tree; superiors sit above it.
  let mut state = ListState::default();
  state.select(Some(chain_len + selected));

  frame.render_stateful_widget(list, area, &mut state);
}

fn user_row(depth: usize, marker: &str, user: &User, dim: bool) -> ListItem<'static> {
  let name_style = if dim {
    Style::default().fg(Color::DarkGray)
  } else {
    Style::default().fg(Color::Cyan)
  };

  let mut spans = vec![
    Span::raw("  ".repeat(depth)),
    Span::raw(marker.to_string()),
    Span::styled(format!("{:<28}", truncate(user.display_name(), 28)), name_style),
  ];

  if let Some(title) = &user.title {
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
      truncate(title, 30),
      Style::default().fg(if dim { Color::DarkGray } else { Color::White }),
    ));
  }
  if let Some(department) = &user.department {
    spans.push(Span::styled(
      format!(" ({})", truncate(department, 20)),
      Style::default().fg(Color::DarkGray),
    ));
  }

  ListItem::new(Line::from(spans))
}

fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}
