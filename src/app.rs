use crate::commands::{self, Command};
use crate::config::Config;
use crate::directory::client::DirectoryClient;
use crate::directory::types::User;
use crate::event::{DirectoryEvent, Event, EventHandler};
use crate::export;
use crate::scheduler::{RateLimitState, RateLimitedScheduler};
use crate::session::Session;
use crate::ui;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Input mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
  Search,
}

/// One node in the expanded direct-report tree.
#[derive(Debug)]
pub struct ChartNode {
  pub user: User,
  /// None until this node's reports have been fetched at least once.
  pub reports: Option<Vec<ChartNode>>,
  pub expanded: bool,
  pub loading: bool,
}

impl ChartNode {
  fn new(user: User) -> Self {
    Self {
      user,
      reports: None,
      expanded: false,
      loading: false,
    }
  }

  /// Number of visible rows in this subtree (self plus expanded children).
  pub fn visible_len(&self) -> usize {
    let mut len = 1;
    if self.expanded {
      if let Some(reports) = &self.reports {
        len += reports.iter().map(ChartNode::visible_len).sum::<usize>();
      }
    }
    len
  }

  /// Visible rows in pre-order, with their depth below this node.
  pub fn visible_rows<'a>(&'a self, depth: usize, rows: &mut Vec<(usize, &'a ChartNode)>) {
    rows.push((depth, self));
    if self.expanded {
      if let Some(reports) = &self.reports {
        for child in reports {
          child.visible_rows(depth + 1, rows);
        }
      }
    }
  }

  fn node_at_mut(&mut self, index: usize) -> Option<&mut ChartNode> {
    if index == 0 {
      return Some(self);
    }
    let mut index = index - 1;
    if self.expanded {
      if let Some(reports) = &mut self.reports {
        for child in reports {
          let len = child.visible_len();
          if index < len {
            return child.node_at_mut(index);
          }
          index -= len;
        }
      }
    }
    None
  }

  /// Find a node anywhere in the subtree, expanded or not. The reporting
  /// graph is assumed acyclic, so an id occurs at most once.
  fn find_mut(&mut self, id: &str) -> Option<&mut ChartNode> {
    if self.user.id == id {
      return Some(self);
    }
    if let Some(reports) = &mut self.reports {
      for child in reports {
        if let Some(found) = child.find_mut(id) {
          return Some(found);
        }
      }
    }
    None
  }
}

/// View state - each variant owns its data
#[derive(Debug)]
pub enum ViewState {
  /// The chart recentered on one target: their superior chain above, their
  /// lazily expanded report tree below.
  Chart {
    target: User,
    superiors: Vec<User>,
    superiors_loading: bool,
    root: ChartNode,
    selected: usize,
  },

  /// Search results pushed on top of the chart
  SearchResults {
    term: String,
    users: Vec<User>,
    total: u64,
    selected: usize,
    loading: bool,
  },
}

/// Main application state
pub struct App {
  /// Navigation stack - the chart is always at index 0 once seeded
  view_stack: Vec<ViewState>,

  /// Current input mode
  mode: Mode,

  /// Command input buffer (after pressing :)
  command_input: String,

  /// Search term buffer (after pressing /)
  search_input: String,

  /// Selected autocomplete suggestion index
  selected_suggestion: usize,

  /// One-line feedback from the last command (export path, errors)
  status: Option<String>,

  /// Application configuration
  config: Config,

  /// Directory API client
  client: DirectoryClient,

  /// Session context shared with the client
  session: Arc<Session>,

  /// Advisory rate-limit flag owned by the scheduler
  rate_limit: Arc<RateLimitState>,

  /// The authenticated user, once fetched
  me: Option<User>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub async fn new(config: Config) -> Result<Self> {
    let token = Config::get_access_token()?;
    let scheduler =
      RateLimitedScheduler::with_max_concurrency(config.directory.max_concurrent_requests);
    let rate_limit = scheduler.rate_limit();
    let session = Arc::new(Session::new());
    let client = DirectoryClient::new(
      &config.directory.region,
      &token,
      scheduler,
      Arc::clone(&session),
    )?;
    let (tx, _rx) = mpsc::unbounded_channel();

    Ok(Self {
      view_stack: Vec::new(),
      mode: Mode::Normal,
      command_input: String::new(),
      search_input: String::new(),
      selected_suggestion: 0,
      status: None,
      config,
      client,
      session,
      rate_limit,
      me: None,
      event_tx: tx,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create event handler
    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    // Who am I? Seeds the chart and doubles as the authorization check.
    self.spawn_self_fetch();

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events
      if let Some(event) = events.next().await {
        self.handle_event(event)?;
      }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  fn handle_event(&mut self, event: Event) -> Result<()> {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {} // UI refresh happens automatically
      Event::Directory(directory_event) => self.handle_directory_event(directory_event),
      Event::Error(msg) => {
        self.status = Some(msg);
      }
    }
    Ok(())
  }

  fn handle_key(&mut self, key: crossterm::event::KeyEvent) {
    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
      Mode::Search => self.handle_search_mode_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: crossterm::event::KeyEvent) {
    match key.code {
      // Quit
      KeyCode::Char('q') => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
      KeyCode::Enter => self.enter_selected(),
      KeyCode::Char('r') => self.recenter_selected(),
      KeyCode::Esc => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        }
      }

      // Mode switches
      KeyCode::Char(':') => {
        self.mode = Mode::Command;
        self.command_input.clear();
      }
      KeyCode::Char('/') => {
        self.mode = Mode::Search;
        self.search_input.clear();
      }

      _ => {}
    }
  }

  fn handle_command_mode_key(&mut self, key: crossterm::event::KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.command_input.clear();
        self.selected_suggestion = 0;
      }
      KeyCode::Enter => {
        self.execute_command();
        self.mode = Mode::Normal;
        self.selected_suggestion = 0;
      }
      KeyCode::Tab | KeyCode::Down => {
        // Navigate autocomplete suggestions
        let suggestions = commands::get_suggestions(&self.command_input);
        if !suggestions.is_empty() {
          self.selected_suggestion = (self.selected_suggestion + 1) % suggestions.len();
        }
      }
      KeyCode::BackTab | KeyCode::Up => {
        // Navigate autocomplete suggestions backwards
        let suggestions = commands::get_suggestions(&self.command_input);
        if !suggestions.is_empty() {
          self.selected_suggestion = if self.selected_suggestion == 0 {
            suggestions.len() - 1
          } else {
            self.selected_suggestion - 1
          };
        }
      }
      KeyCode::Backspace => {
        self.command_input.pop();
        self.selected_suggestion = 0; // Reset selection on input change
      }
      KeyCode::Char(c) => {
        self.command_input.push(c);
        self.selected_suggestion = 0; // Reset selection on input change
      }
      _ => {}
    }
  }

  fn handle_search_mode_key(&mut self, key: crossterm::event::KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.search_input.clear();
      }
      KeyCode::Enter => {
        self.mode = Mode::Normal;
        self.submit_search();
      }
      KeyCode::Backspace => {
        self.search_input.pop();
      }
      KeyCode::Char(c) => {
        self.search_input.push(c);
      }
      _ => {}
    }
  }

  fn execute_command(&mut self) {
    // Get the command to execute - either from selected suggestion or direct input
    let suggestions = commands::get_suggestions(&self.command_input);
    let cmd = if !suggestions.is_empty() && self.selected_suggestion < suggestions.len() {
      suggestions[self.selected_suggestion].name.to_string()
    } else {
      self.command_input.trim().to_lowercase()
    };

    match cmd.as_str() {
      "me" => {
        if let Some(me) = self.me.clone() {
          self.recenter(me);
        }
      }
      "search" => {
        self.mode = Mode::Search;
        self.search_input.clear();
      }
      "export" => {
        self.export_subordinates();
      }
      "quit" => {
        self.should_quit = true;
      }
      _ => {
        // Unknown command
      }
    }
    self.command_input.clear();
  }

  fn submit_search(&mut self) {
    let term = self.search_input.clone();
    if term.chars().count() < 3 {
      self.status = Some("Search needs at least 3 characters".to_string());
      return;
    }

    self.view_stack.push(ViewState::SearchResults {
      term: term.clone(),
      users: Vec::new(),
      total: 0,
      selected: 0,
      loading: true,
    });
    self.spawn_search(term);
  }

  /// Recenter the chart on a new target. Prior superiors, the subordinate
  /// accumulator and search state are all cleared before the new fetches
  /// resolve, so nothing stale can flash through.
  fn recenter(&mut self, user: User) {
    self.session.subordinates.clear();
    self.search_input.clear();
    self.status = None;

    let target_id = user.id.clone();
    let mut root = ChartNode::new(user.clone());
    root.expanded = true;
    root.loading = true;

    self.view_stack = vec![ViewState::Chart {
      target: user,
      superiors: Vec::new(),
      superiors_loading: true,
      root,
      selected: 0,
    }];

    self.spawn_superiors(target_id.clone());
    self.spawn_reports(target_id);
  }

  fn recenter_selected(&mut self) {
    let user = match self.view_stack.last_mut() {
      Some(ViewState::Chart { root, selected, .. }) => {
        root.node_at_mut(*selected).map(|node| node.user.clone())
      }
      _ => None,
    };
    if let Some(user) = user {
      self.recenter(user);
    }
  }

  fn enter_selected(&mut self) {
    let mut fetch: Option<String> = None;
    let mut recenter_on: Option<User> = None;

    match self.view_stack.last_mut() {
      Some(ViewState::Chart { root, selected, .. }) => {
        if let Some(node) = root.node_at_mut(*selected) {
          if node.expanded {
            node.expanded = false;
          } else {
            // Expanding always re-fetches, so the subtree reflects the
            // live directory rather than whatever the cache remembers.
            node.expanded = true;
            node.loading = true;
            fetch = Some(node.user.id.clone());
          }
        }
      }
      Some(ViewState::SearchResults { users, selected, .. }) => {
        recenter_on = users.get(*selected).cloned();
      }
      None => {}
    }

    if let Some(parent_id) = fetch {
      self.spawn_reports(parent_id);
    }
    if let Some(user) = recenter_on {
      self.recenter(user);
    }
  }

  fn move_selection(&mut self, delta: i32) {
    if let Some(view) = self.view_stack.last_mut() {
      match view {
        ViewState::Chart { root, selected, .. } => {
          let len = root.visible_len();
          if len > 0 {
            *selected = (*selected as i32 + delta).rem_euclid(len as i32) as usize;
          }
        }
        ViewState::SearchResults { users, selected, .. } => {
          let len = users.len();
          if len > 0 {
            *selected = (*selected as i32 + delta).rem_euclid(len as i32) as usize;
          }
        }
      }
    }
  }

  fn export_subordinates(&mut self) {
    match export::write_subordinates(&self.session.subordinates.snapshot()) {
      Ok(path) => {
        self.status = Some(format!("Exported subordinates to {}", path.display()));
      }
      Err(e) => {
        self.status = Some(e.to_string());
      }
    }
  }

  // Spawned fetches: each reports back over the event channel, tagged with
  // enough identity to drop results that are stale on arrival.

  fn spawn_self_fetch(&self) {
    let client = self.client.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      match client.fetch_self().await {
        Ok(me) => {
          let _ = tx.send(Event::Directory(DirectoryEvent::SelfLoaded(me)));
        }
        Err(e) => {
          let _ = tx.send(Event::Error(e.to_string()));
        }
      }
    });
  }

  fn spawn_superiors(&self, target_id: String) {
    let client = self.client.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      match client.superiors(&target_id).await {
        Ok(superiors) => {
          let _ = tx.send(Event::Directory(DirectoryEvent::SuperiorsLoaded {
            target_id,
            superiors: superiors.unwrap_or_default(),
          }));
        }
        Err(e) => {
          let _ = tx.send(Event::Error(e.to_string()));
          let _ = tx.send(Event::Directory(DirectoryEvent::SuperiorsLoaded {
            target_id,
            superiors: Vec::new(),
          }));
        }
      }
    });
  }

  fn spawn_reports(&self, parent_id: String) {
    let client = self.client.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      match client.direct_reports(&parent_id).await {
        Ok(reports) => {
          let _ = tx.send(Event::Directory(DirectoryEvent::ReportsLoaded {
            parent_id,
            reports,
          }));
        }
        Err(e) => {
          let _ = tx.send(Event::Error(e.to_string()));
          let _ = tx.send(Event::Directory(DirectoryEvent::ReportsLoaded {
            parent_id,
            reports: None,
          }));
        }
      }
    });
  }

  fn spawn_search(&self, term: String) {
    let client = self.client.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      match client.search(&term).await {
        Ok(results) => {
          let _ = tx.send(Event::Directory(DirectoryEvent::SearchLoaded {
            term,
            results,
          }));
        }
        Err(e) => {
          let _ = tx.send(Event::Error(e.to_string()));
          let _ = tx.send(Event::Directory(DirectoryEvent::SearchLoaded {
            term,
            results: None,
          }));
        }
      }
    });
  }

  fn handle_directory_event(&mut self, event: DirectoryEvent) {
    match event {
      DirectoryEvent::SelfLoaded(Some(me)) => {
        self.me = Some(me.clone());
        self.recenter(me);
      }
      DirectoryEvent::SelfLoaded(None) => {
        // On an auth failure the client flagged the session and the UI
        // switches to the not-authorized screen; anything else (e.g. an
        // exhausted rate limit) just gets a status line.
        if !self.session.auth_failed() {
          self.status = Some("Could not load your profile; see the log for details".to_string());
        }
      }
      DirectoryEvent::SuperiorsLoaded {
        target_id,
        superiors: loaded,
      } => {
        if let Some(ViewState::Chart {
          target,
          superiors,
          superiors_loading,
          ..
        }) = self.view_stack.first_mut()
        {
          // A recenter may have raced this fetch; stale chains are dropped.
          if target.id == target_id {
            *superiors = loaded;
            *superiors_loading = false;
          }
        }
      }
      DirectoryEvent::ReportsLoaded { parent_id, reports } => {
        if let Some(ViewState::Chart { root, .. }) = self.view_stack.first_mut() {
          if let Some(node) = root.find_mut(&parent_id) {
            node.loading = false;
            node.reports = Some(
              reports
                .unwrap_or_default()
                .into_iter()
                .map(ChartNode::new)
                .collect(),
            );
          }
        }
      }
      DirectoryEvent::SearchLoaded { term, results } => {
        if let Some(ViewState::SearchResults {
          term: current_term,
          users,
          total,
          loading,
          ..
        }) = self.view_stack.last_mut()
        {
          if *current_term == term {
            let results = results.unwrap_or_default();
            *users = results.users;
            *total = results.total;
            *loading = false;
          }
        }
      }
    }
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> Option<&ViewState> {
    self.view_stack.last()
  }

  pub fn mode(&self) -> &Mode {
    &self.mode
  }

  pub fn command_input(&self) -> &str {
    &self.command_input
  }

  pub fn search_input(&self) -> &str {
    &self.search_input
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn header_title(&self) -> &str {
    self
      .config
      .title
      .as_deref()
      .unwrap_or(&self.config.directory.region)
  }

  pub fn region(&self) -> &str {
    &self.config.directory.region
  }

  pub fn auth_failed(&self) -> bool {
    self.session.auth_failed()
  }

  pub fn rate_limited(&self) -> bool {
    self.rate_limit.is_limited()
  }

  pub fn rate_limit_retry_secs(&self) -> u64 {
    self.rate_limit.retry_after_secs()
  }

  pub fn subordinate_count(&self) -> usize {
    self.session.subordinates.len()
  }

  pub fn autocomplete_suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(&self.command_input)
  }

  pub fn selected_suggestion(&self) -> usize {
    self.selected_suggestion
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn user(id: &str, name: &str) -> User {
    User {
      id: id.to_string(),
      name: Some(name.to_string()),
      ..User::default()
    }
  }

  fn tree() -> ChartNode {
    // root -> [a -> [a1], b]
    let mut root = ChartNode::new(user("root", "Root"));
    root.expanded = true;
    let mut a = ChartNode::new(user("a", "A"));
    a.expanded = true;
    a.reports = Some(vec![ChartNode::new(user("a1", "A1"))]);
    let b = ChartNode::new(user("b", "B"));
    root.reports = Some(vec![a, b]);
    root
  }

  #[test]
  fn test_visible_len_counts_expanded_rows() {
    let mut root = tree();
    assert_eq!(root.visible_len(), 4);

    // Collapsing a hides its subtree but not the node itself.
    root.reports.as_mut().unwrap()[0].expanded = false;
    assert_eq!(root.visible_len(), 3);
  }

  #[test]
  fn test_node_at_mut_walks_preorder() {
    let mut root = tree();
    assert_eq!(root.node_at_mut(0).unwrap().user.id, "root");
    assert_eq!(root.node_at_mut(1).unwrap().user.id, "a");
    assert_eq!(root.node_at_mut(2).unwrap().user.id, "a1");
    assert_eq!(root.node_at_mut(3).unwrap().user.id, "b");
    assert!(root.node_at_mut(4).is_none());
  }

  #[test]
  fn test_find_mut_reaches_collapsed_nodes() {
    let mut root = tree();
    root.reports.as_mut().unwrap()[0].expanded = false;
    assert!(root.find_mut("a1").is_some());
    assert!(root.find_mut("nope").is_none());
  }

  async fn test_app() -> App {
    let scheduler = RateLimitedScheduler::new();
    let rate_limit = scheduler.rate_limit();
    let session = Arc::new(Session::new());
    let client = DirectoryClient::new(
      "mypurecloud.com",
      "test-token",
      scheduler,
      Arc::clone(&session),
    )
    .unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    App {
      view_stack: Vec::new(),
      mode: Mode::Normal,
      command_input: String::new(),
      search_input: String::new(),
      selected_suggestion: 0,
      status: None,
      config: Config::default(),
      client,
      session,
      rate_limit,
      me: None,
      event_tx: tx,
      should_quit: false,
    }
  }

  #[tokio::test]
  async fn test_recenter_clears_traversal_state_immediately() {
    let mut app = test_app().await;
    app.session.subordinates.add(&[user("old", "Old")]);
    app.search_input = "stale term".to_string();

    app.recenter(user("t", "Target"));

    // Cleared synchronously, before any fetch can resolve.
    assert_eq!(app.subordinate_count(), 0);
    assert!(app.search_input().is_empty());

    match app.current_view() {
      Some(ViewState::Chart {
        target,
        superiors,
        superiors_loading,
        ..
      }) => {
        assert_eq!(target.id, "t");
        assert!(superiors.is_empty());
        assert!(superiors_loading);
      }
      other => panic!("expected chart view, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_stale_superiors_are_dropped() {
    let mut app = test_app().await;
    app.recenter(user("t", "Target"));

    app.handle_directory_event(DirectoryEvent::SuperiorsLoaded {
      target_id: "someone-else".to_string(),
      superiors: vec![user("boss", "Boss")],
    });

    match app.current_view() {
      Some(ViewState::Chart {
        superiors,
        superiors_loading,
        ..
      }) => {
        assert!(superiors.is_empty());
        assert!(superiors_loading);
      }
      other => panic!("expected chart view, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_reports_attach_to_their_parent_node() {
    let mut app = test_app().await;
    app.recenter(user("t", "Target"));

    app.handle_directory_event(DirectoryEvent::ReportsLoaded {
      parent_id: "t".to_string(),
      reports: Some(vec![user("r1", "R1"), user("r2", "R2")]),
    });

    match app.current_view() {
      Some(ViewState::Chart { root, .. }) => {
        assert!(!root.loading);
        assert_eq!(root.visible_len(), 3);
      }
      other => panic!("expected chart view, got {:?}", other),
    }

    // Reports for a node that no longer exists are dropped quietly.
    app.handle_directory_event(DirectoryEvent::ReportsLoaded {
      parent_id: "gone".to_string(),
      reports: Some(vec![user("x", "X")]),
    });
  }
}
