//! Directory API client.
//!
//! Every call goes through the rate-limited scheduler and writes resolved
//! users into the session cache. Non-success answers come back as
//! `Ok(None)` so the UI can treat "no data yet" and "fetch failed" the
//! same way; only transport failures are errors.

use color_eyre::{eyre::eyre, Result};
use reqwest::{header, Response};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::scheduler::{classify, Classification, RateLimitedScheduler};
use crate::session::Session;

use super::api_types::{ApiSearchResponse, ApiUser, UserSearchCriteria, UserSearchRequest};
use super::types::{SearchResults, User};

/// Search terms shorter than this never hit the network; the query would be
/// too broad to be worth an API call.
const MIN_SEARCH_TERM_CHARS: usize = 3;

const SEARCH_PAGE_SIZE: u32 = 15;

/// Client for the directory API, scoped to one region and bearer token.
#[derive(Clone)]
pub struct DirectoryClient {
  http: reqwest::Client,
  base_url: Url,
  scheduler: RateLimitedScheduler,
  session: Arc<Session>,
}

impl DirectoryClient {
  /// Build a client for `https://api.<region>`. The token comes from the
  /// auth collaborator and is installed as a default header, so every
  /// request carries it without further plumbing.
  pub fn new(
    region: &str,
    token: &str,
    scheduler: RateLimitedScheduler,
    session: Arc<Session>,
  ) -> Result<Self> {
    let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
      .map_err(|e| eyre!("Access token is not a valid header value: {}", e))?;
    auth.set_sensitive(true);

    let mut headers = header::HeaderMap::new();
    headers.insert(header::AUTHORIZATION, auth);

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    let base_url = Url::parse(&format!("https://api.{}", region))
      .map_err(|e| eyre!("Invalid region {}: {}", region, e))?;

    Ok(Self {
      http,
      base_url,
      scheduler,
      session,
    })
  }

  pub fn session(&self) -> &Arc<Session> {
    &self.session
  }

  /// GET the current user. This doubles as the authorization probe: a
  /// plain failure flips the session's auth-failed flag. A 429 that
  /// survived the scheduler's retries does not; the account is throttled,
  /// not unauthorized.
  pub async fn fetch_self(&self) -> Result<Option<User>> {
    let response = self.get(self.endpoint(&["api", "v2", "users", "me"])).await?;
    match classify(response.status()) {
      Classification::Success => {}
      Classification::Failure => {
        warn!(status = %response.status(), "self fetch failed, treating as unauthorized");
        self.session.set_auth_failed(true);
        return Ok(None);
      }
      Classification::RateLimited => {
        return Ok(None);
      }
    }
    self.session.set_auth_failed(false);

    let user = User::from(self.parse::<ApiUser>(response).await?);
    self.session.cache.put(&user);
    Ok(Some(user))
  }

  /// Search users by name fragment (CONTAINS, one page of 15). Terms
  /// shorter than three characters resolve to `None` without a request.
  /// Results are not cached: they are stale the moment they are shown.
  pub async fn search(&self, term: &str) -> Result<Option<SearchResults>> {
    if term.chars().count() < MIN_SEARCH_TERM_CHARS {
      return Ok(None);
    }

    let request = UserSearchRequest {
      page_size: SEARCH_PAGE_SIZE,
      page_number: 1,
      query: vec![UserSearchCriteria {
        kind: "CONTAINS".to_string(),
        fields: vec!["name".to_string()],
        value: term.to_string(),
      }],
    };
    let body = serde_json::to_value(&request)
      .map_err(|e| eyre!("Failed to serialize search request: {}", e))?;

    let url = self.endpoint(&["api", "v2", "users", "search"]);
    let response = self.post_json(url, body).await?;
    if classify(response.status()) != Classification::Success {
      debug!(status = %response.status(), term, "user search failed");
      return Ok(None);
    }

    let results = SearchResults::from(self.parse::<ApiSearchResponse>(response).await?);
    debug!(term, total = results.total, "user search completed");
    Ok(Some(results))
  }

  /// GET a user's direct reports. Every returned user is cached and added
  /// to the subordinate accumulator.
  pub async fn direct_reports(&self, user_id: &str) -> Result<Option<Vec<User>>> {
    if user_id.is_empty() {
      return Ok(None);
    }

    let url = self.endpoint(&["api", "v2", "users", user_id, "directreports"]);
    let response = self.get(url).await?;
    if classify(response.status()) != Classification::Success {
      debug!(status = %response.status(), user_id, "direct reports fetch failed");
      return Ok(None);
    }

    let users: Vec<User> = self
      .parse::<Vec<ApiUser>>(response)
      .await?
      .into_iter()
      .map(User::from)
      .collect();
    for user in &users {
      self.session.cache.put(user);
    }
    self.session.subordinates.add(&users);
    Ok(Some(users))
  }

  /// GET a user's chain of managers, immediate manager first. Callers that
  /// want a top-down display reverse the list themselves.
  pub async fn superiors(&self, user_id: &str) -> Result<Option<Vec<User>>> {
    if user_id.is_empty() {
      return Ok(None);
    }

    let url = self.endpoint(&["api", "v2", "users", user_id, "superiors"]);
    let response = self.get(url).await?;
    if classify(response.status()) != Classification::Success {
      debug!(status = %response.status(), user_id, "superiors fetch failed");
      return Ok(None);
    }

    let users: Vec<User> = self
      .parse::<Vec<ApiUser>>(response)
      .await?
      .into_iter()
      .map(User::from)
      .collect();
    for user in &users {
      self.session.cache.put(user);
    }
    Ok(Some(users))
  }

  /// Cache-first single-user lookup.
  pub async fn user(&self, user_id: &str) -> Result<Option<User>> {
    if user_id.is_empty() {
      return Ok(None);
    }
    if let Some(user) = self.session.cache.get(user_id) {
      return Ok(Some(user));
    }

    let url = self.endpoint(&["api", "v2", "users", user_id]);
    let response = self.get(url).await?;
    if classify(response.status()) != Classification::Success {
      debug!(status = %response.status(), user_id, "user fetch failed");
      return Ok(None);
    }

    let user = User::from(self.parse::<ApiUser>(response).await?);
    self.session.cache.put(&user);
    Ok(Some(user))
  }

  /// Join percent-encoded path segments onto the base URL, so ids are safe
  /// to splice into a path.
  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .expect("https base url always has path segments")
      .extend(segments);
    url
  }

  async fn get(&self, url: Url) -> Result<Response> {
    let http = self.http.clone();
    self
      .scheduler
      .submit(move || {
        let http = http.clone();
        let url = url.clone();
        Box::pin(async move { Ok(http.get(url).send().await?) })
      })
      .await
  }

  async fn post_json(&self, url: Url, body: serde_json::Value) -> Result<Response> {
    let http = self.http.clone();
    self
      .scheduler
      .submit(move || {
        let http = http.clone();
        let url = url.clone();
        let body = body.clone();
        Box::pin(async move { Ok(http.post(url).json(&body).send().await?) })
      })
      .await
  }

  async fn parse<T: serde::de::DeserializeOwned>(&self, response: Response) -> Result<T> {
    response
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse directory response: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> DirectoryClient {
    DirectoryClient::new(
      "mypurecloud.com",
      "test-token",
      RateLimitedScheduler::new(),
      Arc::new(Session::new()),
    )
    .unwrap()
  }

  #[tokio::test]
  async fn test_short_search_term_is_a_noop() {
    let client = client();
    assert!(client.search("").await.unwrap().is_none());
    assert!(client.search("ab").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_empty_ids_are_noops() {
    let client = client();
    assert!(client.direct_reports("").await.unwrap().is_none());
    assert!(client.superiors("").await.unwrap().is_none());
    assert!(client.user("").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_user_is_served_from_cache_without_network() {
    let client = client();
    let cached = User {
      id: "u-1".to_string(),
      name: Some("Ada".to_string()),
      ..User::default()
    };
    client.session().cache.put(&cached);

    // No server is running; a hit proves the call never left the cache.
    let found = client.user("u-1").await.unwrap().unwrap();
    assert_eq!(found, cached);
  }

  #[tokio::test]
  async fn test_endpoint_percent_encodes_ids() {
    let client = client();
    let url = client.endpoint(&["api", "v2", "users", "odd id/here", "directreports"]);
    assert_eq!(
      url.as_str(),
      "https://api.mypurecloud.com/api/v2/users/odd%20id%2Fhere/directreports"
    );
  }
}
