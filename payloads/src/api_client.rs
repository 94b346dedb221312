use crate::{RaidId, requests, responses};
use reqwest::StatusCode;
use serde::Serialize;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An API client for interfacing with the backend.
pub struct APIClient {
    pub address: String,
    pub inner_client: reqwest::Client,
}

/// Helper methods for http actions
impl APIClient {
    fn format_url(&self, path: &str) -> String {
        format!("{}/api/{path}", &self.address)
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        let request = self.inner_client.post(self.format_url(path)).json(body);

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request.send().await
    }

    async fn empty_post(&self, path: &str) -> ReqwestResult {
        let request = self.inner_client.post(self.format_url(path));

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request.send().await
    }

    async fn empty_get(&self, path: &str) -> ReqwestResult {
        let request = self.inner_client.get(self.format_url(path));

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request.send().await
    }
}

/// Account and session methods
impl APIClient {
    pub async fn health_check(&self) -> Result<(), ClientError> {
        let response = self.empty_get("health_check").await?;
        ok_empty(response).await
    }

    pub async fn create_account(
        &self,
        details: &requests::CreateAccount,
    ) -> Result<(), ClientError> {
        let response = self.post("create_account", details).await?;
        ok_empty(response).await
    }

    pub async fn login(
        &self,
        details: &requests::LoginCredentials,
    ) -> Result<(), ClientError> {
        let response = self.post("login", &details).await?;
        ok_empty(response).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self.empty_post("logout").await?;
        ok_empty(response).await
    }

    /// Check if the user is logged in.
    pub async fn login_check(&self) -> Result<bool, ClientError> {
        let response = self.empty_post("login_check").await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::UNAUTHORIZED => Ok(false),
            _ => Err(ClientError::APIError(
                response.status(),
                response.text().await?,
            )),
        }
    }

    /// Get the current user's profile information.
    pub async fn user_profile(
        &self,
    ) -> Result<responses::UserProfile, ClientError> {
        let response = self.empty_get("user_profile").await?;
        ok_body(response).await
    }

    /// Leaderboard of all users by total points.
    pub async fn ranking(
        &self,
    ) -> Result<Vec<responses::RankingEntry>, ClientError> {
        let response = self.empty_get("ranking").await?;
        ok_body(response).await
    }

    pub async fn group_ranking(
        &self,
        filter: &requests::GroupRanking,
    ) -> Result<Vec<responses::GroupRankingEntry>, ClientError> {
        let response = self.post("group_ranking", filter).await?;
        ok_body(response).await
    }
}

/// Raid methods
impl APIClient {
    /// Create a raid (admin only). The raid starts out READY.
    pub async fn create_raid(
        &self,
        details: &requests::CreateRaid,
    ) -> Result<RaidId, ClientError> {
        let response = self.post("create_raid", details).await?;
        ok_body(response).await
    }

    pub async fn get_raid(
        &self,
        raid_id: &RaidId,
    ) -> Result<responses::RaidDetail, ClientError> {
        let response = self.post("get_raid", raid_id).await?;
        ok_body(response).await
    }

    pub async fn list_raids(
        &self,
        filter: &requests::ListRaids,
    ) -> Result<Vec<responses::RaidSummary>, ClientError> {
        let response = self.post("list_raids", filter).await?;
        ok_body(response).await
    }

    /// Patch a raid and/or move it through its lifecycle (admin only).
    pub async fn update_raid(
        &self,
        details: &requests::UpdateRaid,
    ) -> Result<responses::Raid, ClientError> {
        let response = self.post("update_raid", details).await?;
        ok_body(response).await
    }

    /// Delete a raid and all of its participation records (admin only).
    pub async fn delete_raid(
        &self,
        raid_id: &RaidId,
    ) -> Result<(), ClientError> {
        let response = self.post("delete_raid", raid_id).await?;
        ok_empty(response).await
    }

    /// Attack the raid boss. Rejections come back as
    /// [`ClientError::APIError`] with an [`responses::AttackRejection`]
    /// JSON body.
    pub async fn attack_raid(
        &self,
        raid_id: &RaidId,
    ) -> Result<responses::AttackOutcome, ClientError> {
        let response = self.post("attack_raid", raid_id).await?;
        ok_body(response).await
    }

    pub async fn get_participation(
        &self,
        raid_id: &RaidId,
    ) -> Result<Option<responses::Participation>, ClientError> {
        let response = self.post("get_participation", raid_id).await?;
        ok_body(response).await
    }

    pub async fn list_participants(
        &self,
        raid_id: &RaidId,
    ) -> Result<Vec<responses::Participant>, ClientError> {
        let response = self.post("list_participants", raid_id).await?;
        ok_body(response).await
    }

    /// Retry reward distribution for a cleared raid (admin only).
    pub async fn distribute_rewards(
        &self,
        raid_id: &RaidId,
    ) -> Result<responses::DistributionResult, ClientError> {
        let response = self.post("distribute_rewards", raid_id).await?;
        ok_body(response).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An unhandled API error to display, containing response text.
    #[error("{1}")]
    APIError(StatusCode, String),
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
}

/// Deserialize a successful request into the desired type, or return an
/// appropriate error.
pub async fn ok_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(response.json::<T>().await?)
}

/// Check that an empty response is OK, returning a ClientError if not.
pub async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(())
}
