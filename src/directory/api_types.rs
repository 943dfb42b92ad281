//! Serde-deserializable types matching directory API payloads.
//!
//! These are separate from the domain types so the wire format (camelCase,
//! deeply optional) stays out of the rest of the app.

use serde::{Deserialize, Serialize};

use super::types::{SearchResults, User};

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  #[serde(default)]
  pub id: String,
  pub name: Option<String>,
  pub title: Option<String>,
  pub department: Option<String>,
  pub email: Option<String>,
  /// Partial embedded user; only the id is carried into the domain type.
  pub manager: Option<Box<ApiUser>>,
  #[serde(default)]
  pub images: Vec<ApiUserImage>,
}

#[derive(Debug, Deserialize)]
pub struct ApiUserImage {
  #[serde(rename = "imageUri")]
  pub image_uri: Option<String>,
}

// ============================================================================
// Search endpoint request/response
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchRequest {
  pub page_size: u32,
  pub page_number: u32,
  pub query: Vec<UserSearchCriteria>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSearchCriteria {
  #[serde(rename = "type")]
  pub kind: String,
  pub fields: Vec<String>,
  pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub results: Vec<ApiUser>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiUser> for User {
  fn from(api: ApiUser) -> Self {
    let image_uri = api.images.into_iter().find_map(|image| image.image_uri);
    User {
      id: api.id,
      name: api.name,
      title: api.title,
      department: api.department,
      email: api.email,
      manager_id: api.manager.and_then(|manager| {
        if manager.id.is_empty() {
          None
        } else {
          Some(manager.id)
        }
      }),
      image_uri,
    }
  }
}

impl From<ApiSearchResponse> for SearchResults {
  fn from(api: ApiSearchResponse) -> Self {
    SearchResults {
      total: api.total,
      users: api.results.into_iter().map(User::from).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_user_deserializes_from_wire_shape() {
    let json = r#"{
      "id": "u-123",
      "name": "Ada Lovelace",
      "title": "Principal Engineer",
      "department": "R&D",
      "email": "ada@example.com",
      "manager": { "id": "u-7", "name": "Charles Babbage" },
      "images": [
        { "resolution": "x96", "imageUri": "https://img.example.com/u-123.png" }
      ],
      "version": 4,
      "state": "active"
    }"#;

    let user: User = serde_json::from_str::<ApiUser>(json).unwrap().into();
    assert_eq!(user.id, "u-123");
    assert_eq!(user.display_name(), "Ada Lovelace");
    assert_eq!(user.manager_id.as_deref(), Some("u-7"));
    assert_eq!(
      user.image_uri.as_deref(),
      Some("https://img.example.com/u-123.png")
    );
  }

  #[test]
  fn test_user_with_only_an_id() {
    let user: User = serde_json::from_str::<ApiUser>(r#"{"id": "u-1"}"#)
      .unwrap()
      .into();
    assert_eq!(user.display_name(), "u-1");
    assert!(user.manager_id.is_none());
    assert!(user.image_uri.is_none());
  }

  #[test]
  fn test_search_request_wire_shape() {
    let request = UserSearchRequest {
      page_size: 15,
      page_number: 1,
      query: vec![UserSearchCriteria {
        kind: "CONTAINS".to_string(),
        fields: vec!["name".to_string()],
        value: "ada".to_string(),
      }],
    };

    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["pageSize"], 15);
    assert_eq!(json["pageNumber"], 1);
    assert_eq!(json["query"][0]["type"], "CONTAINS");
    assert_eq!(json["query"][0]["fields"][0], "name");
    assert_eq!(json["query"][0]["value"], "ada");
  }

  #[test]
  fn test_search_response_defaults() {
    let results: SearchResults = serde_json::from_str::<ApiSearchResponse>(r#"{}"#)
      .unwrap()
      .into();
    assert_eq!(results.total, 0);
    assert!(results.users.is_empty());
  }
}
