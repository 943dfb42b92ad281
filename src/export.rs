//! CSV export of the subordinates discovered so far.

use chrono::Local;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use crate::directory::types::User;

/// Write the accumulator snapshot to a timestamped CSV file in the current
/// directory and return its path.
pub fn write_subordinates(users: &[User]) -> Result<PathBuf> {
  if users.is_empty() {
    return Err(eyre!("No subordinates discovered yet; expand the chart first"));
  }

  let path = PathBuf::from(format!(
    "orgx-subordinates-{}.csv",
    Local::now().format("%Y%m%d-%H%M%S")
  ));
  let contents = render_csv(users);
  std::fs::write(&path, contents)
    .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;

  Ok(path)
}

fn render_csv(users: &[User]) -> String {
  let mut out = String::from("id,name,title,department,email,manager_id\n");
  for user in users {
    let fields = [
      user.id.as_str(),
      user.name.as_deref().unwrap_or(""),
      user.title.as_deref().unwrap_or(""),
      user.department.as_deref().unwrap_or(""),
      user.email.as_deref().unwrap_or(""),
      user.manager_id.as_deref().unwrap_or(""),
    ];
    let row: Vec<String> = fields.iter().map(|f| escape(f)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
  }
  out
}

/// RFC 4180 quoting: wrap fields containing commas, quotes or newlines,
/// doubling embedded quotes.
fn escape(field: &str) -> String {
  if field.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_render_csv_quotes_awkward_fields() {
    let users = vec![User {
      id: "u-1".to_string(),
      name: Some("Lovelace, Ada".to_string()),
      title: Some("Engineer \"First\"".to_string()),
      ..User::default()
    }];

    let csv = render_csv(&users);
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("id,name,title,department,email,manager_id"));
    assert_eq!(
      lines.next(),
      Some(r#"u-1,"Lovelace, Ada","Engineer ""First""",,,"#)
    );
  }

  #[test]
  fn test_plain_fields_are_left_alone() {
    assert_eq!(escape("Ada"), "Ada");
    assert_eq!(escape(""), "");
  }
}
