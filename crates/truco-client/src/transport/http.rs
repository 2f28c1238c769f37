//! REST authority client.

use reqwest::{Client, Response};
use serde::{Deserialize, de::DeserializeOwned};
use truco_core::{CreateMatchRequest, HandView, MatchId, MatchSnapshot};

use crate::{authority::Authority, dispatcher::ActionKind, error::AuthorityError};

/// Authority reached over HTTP.
///
/// `base_url` includes the API prefix, e.g. `http://localhost:8080/api`.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Created {
    id: MatchId,
}

impl HttpAuthority {
    /// Authority at `base_url` with a default client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Authority at `base_url` using `client`.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn match_url(&self, match_id: &MatchId, tail: &str) -> String {
        format!("{}/matches/{}{tail}", self.base_url, match_id)
    }
}

/// Path below `/matches/{id}` for an action.
fn action_path(action: ActionKind) -> String {
    match action {
        ActionKind::PlayCard { .. } => "/play".to_string(),
        ActionKind::CallBid(bid) => format!("/cantar/{}", bid.path_segment()),
        ActionKind::Accept => "/querer".to_string(),
        ActionKind::Decline => "/no-querer".to_string(),
        ActionKind::Fold => "/mazo".to_string(),
    }
}

fn request_error(err: &reqwest::Error) -> AuthorityError {
    if err.is_decode() {
        AuthorityError::Decode { reason: err.to_string() }
    } else {
        AuthorityError::Unavailable { reason: err.to_string() }
    }
}

/// Pass success responses through, turn error statuses into `Rejected`.
async fn check(response: Response) -> Result<Response, AuthorityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        message
    };
    Err(AuthorityError::Rejected { status: status.as_u16(), message })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AuthorityError> {
    check(response).await?.json::<T>().await.map_err(|e| request_error(&e))
}

impl Authority for HttpAuthority {
    async fn fetch_snapshot(&self, match_id: MatchId) -> Result<MatchSnapshot, AuthorityError> {
        let response = self
            .client
            .get(self.match_url(&match_id, ""))
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        read_json(response).await
    }

    async fn fetch_hand(&self, match_id: MatchId, player: String) -> Result<HandView, AuthorityError> {
        let response = self
            .client
            .get(self.match_url(&match_id, "/hand"))
            .query(&[("player", player.as_str())])
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        read_json(response).await
    }

    async fn submit(
        &self,
        match_id: MatchId,
        player: String,
        action: ActionKind,
    ) -> Result<String, AuthorityError> {
        let mut request = self
            .client
            .post(self.match_url(&match_id, &action_path(action)))
            .query(&[("player", player.as_str())]);
        if let ActionKind::PlayCard { index } = action {
            request = request.query(&[("cardIndex", index)]);
        }

        let response = request.send().await.map_err(|e| request_error(&e))?;
        check(response).await?.text().await.map_err(|e| request_error(&e))
    }

    async fn create_match(&self, request: CreateMatchRequest) -> Result<MatchId, AuthorityError> {
        let response = self
            .client
            .post(format!("{}/matches", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        let created: Created = read_json(response).await?;
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use truco_core::BidKind;

    use super::*;

    #[test]
    fn action_paths_follow_authority_routes() {
        assert_eq!(action_path(ActionKind::PlayCard { index: 2 }), "/play");
        assert_eq!(action_path(ActionKind::CallBid(BidKind::Truco)), "/cantar/truco");
        assert_eq!(action_path(ActionKind::CallBid(BidKind::Envido)), "/cantar/envido");
        assert_eq!(action_path(ActionKind::Accept), "/querer");
        assert_eq!(action_path(ActionKind::Decline), "/no-querer");
        assert_eq!(action_path(ActionKind::Fold), "/mazo");
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let authority = HttpAuthority::new("http://localhost:8080/api/");
        assert_eq!(
            authority.match_url(&MatchId::new("M1"), "/hand"),
            "http://localhost:8080/api/matches/M1/hand"
        );
    }
}
