/// A directory user, reduced to what the app displays and keys on.
///
/// Treated as an immutable snapshot once cached; a later fetch of the same
/// id replaces the whole record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
  pub id: String,
  pub name: Option<String>,
  pub title: Option<String>,
  pub department: Option<String>,
  pub email: Option<String>,
  /// Id of the embedded manager reference, when the API includes one.
  pub manager_id: Option<String>,
  pub image_uri: Option<String>,
}

impl User {
  /// Name for display, falling back to the id when the profile has none.
  pub fn display_name(&self) -> &str {
    match self.name.as_deref() {
      Some(name) if !name.is_empty() => name,
      _ => &self.id,
    }
  }
}

/// One page of name-search results. Transient: never cached, stale the
/// moment it is shown.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
  pub total: u64,
  pub users: Vec<User>,
}
