use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kindred_types::models::LetterStatus;

use crate::config::ModerationSettings;

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct ClassifyAnswer {
    flagged: bool,
}

/// Classifier client for the letter flow.
///
/// Fail-open: an unconfigured endpoint, a transport error or an unusable
/// answer all approve the letter.
pub struct Moderator {
    endpoint: Option<Endpoint>,
}

struct Endpoint {
    client: reqwest::Client,
    url: String,
}

impl Moderator {
    pub fn new(settings: &ModerationSettings) -> Result<Self> {
        let Some(url) = settings.url.clone() else {
            return Ok(Self::disabled());
        };

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("building moderation HTTP client")?;

        Ok(Self {
            endpoint: Some(Endpoint { client, url }),
        })
    }

    /// Approves everything.
    pub fn disabled() -> Self {
        Self { endpoint: None }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Resolve a pending letter to `Approved` or `Rejected`.
    pub async fn classify(&self, content: &str) -> LetterStatus {
        let Some(endpoint) = &self.endpoint else {
            debug!("No classifier configured, approving letter");
            return LetterStatus::Approved;
        };

        match ask(endpoint, content).await {
            Ok(true) => LetterStatus::Rejected,
            Ok(false) => LetterStatus::Approved,
            Err(e) => {
                warn!("Classifier failed, approving letter (fail-open): {:#}", e);
                LetterStatus::Approved
            }
        }
    }
}

async fn ask(endpoint: &Endpoint, content: &str) -> Result<bool> {
    let resp = endpoint
        .client
        .post(&endpoint.url)
        .json(&ClassifyRequest { content })
        .send()
        .await
        .context("classifier request")?;

    if !resp.status().is_success() {
        bail!("classifier answered {}", resp.status());
    }

    let answer: ClassifyAnswer = resp.json().await.context("classifier answer")?;
    Ok(answer.flagged)
}
