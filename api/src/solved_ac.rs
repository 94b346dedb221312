//! Whether a judge handle has solved a problem, according to solved.ac.

#[cfg(not(feature = "mock-checker"))]
use anyhow::Context;
#[cfg(feature = "mock-checker")]
use std::collections::HashSet;
#[cfg(feature = "mock-checker")]
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("Solve checker unavailable")]
    Unavailable(#[source] anyhow::Error),
}

/// Client for the solved.ac v3 API.
///
/// With `mock-checker` this is an in-memory table of solved
/// `(handle, problem_id)` pairs shared between clones, so a test harness
/// can flip results while the server is running.
#[derive(Clone)]
pub struct SolveChecker {
    #[cfg(not(feature = "mock-checker"))]
    client: reqwest::Client,
    #[cfg(not(feature = "mock-checker"))]
    base_url: String,
    #[cfg(feature = "mock-checker")]
    state: Arc<Mutex<MockState>>,
}

#[cfg(feature = "mock-checker")]
#[derive(Default)]
struct MockState {
    solved: HashSet<(String, i32)>,
    unavailable: bool,
    delay: Option<Duration>,
}

#[cfg(not(feature = "mock-checker"))]
#[derive(serde::Deserialize)]
struct SearchResponse {
    count: u64,
}

#[cfg(not(feature = "mock-checker"))]
impl SolveChecker {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create solved.ac client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn check_solved(
        &self,
        handle: &str,
        problem_id: i32,
    ) -> Result<bool, CheckerError> {
        self.search(handle, problem_id)
            .await
            .map_err(CheckerError::Unavailable)
    }

    async fn search(
        &self,
        handle: &str,
        problem_id: i32,
    ) -> anyhow::Result<bool> {
        let response = self
            .client
            .get(format!("{}/search/problem", self.base_url))
            .query(&[("query", format!("id:{problem_id} s@{handle}"))])
            .send()
            .await
            .context("Failed to reach solved.ac")?
            .error_for_status()
            .context("solved.ac returned an error status")?;
        let body = response
            .json::<SearchResponse>()
            .await
            .context("Failed to parse solved.ac response")?;
        Ok(body.count > 0)
    }
}

#[cfg(feature = "mock-checker")]
impl SolveChecker {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub async fn check_solved(
        &self,
        handle: &str,
        problem_id: i32,
    ) -> Result<bool, CheckerError> {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(CheckerError::Unavailable(anyhow::anyhow!(
                "mock checker is unavailable"
            )));
        }
        Ok(state.solved.contains(&(handle.to_string(), problem_id)))
    }

    pub fn mark_solved(&self, handle: &str, problem_id: i32) {
        self.state
            .lock()
            .unwrap()
            .solved
            .insert((handle.to_string(), problem_id));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Make every check take `delay` before answering, like a slow judge.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }
}
