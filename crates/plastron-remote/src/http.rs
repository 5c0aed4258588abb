use crate::{
    classify::classify_output, codes, ControlAction, ControlBackend, ControlConfig, ControlError,
    ControlOutcome, ControlRequest,
};
use plastron_schema::{ContainerError, ContainerKind};
use serde::Deserialize;
use std::time::Duration;

/// Wire shape of a control endpoint reply.
///
/// `output.stdout`/`output.stderr` are mandatory free-text channels;
/// `location.url` appears once the container is reachable.
#[derive(Debug, Deserialize)]
struct ControlReply {
    output: Option<ReplyOutput>,
    location: Option<ReplyLocation>,
}

#[derive(Debug, Deserialize)]
struct ReplyOutput {
    stdout: Option<String>,
    stderr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyLocation {
    url: Option<String>,
}

/// HTTP client for the remote control endpoint.
///
/// `GET {base_url}/control/{kind}?{params}`: session requests carry
/// `sid`, `hipuser`, `action`; app requests add `aid`, `app`, and on start
/// the transient webdav credentials `nc`, `hippass`.
pub struct HttpControlClient {
    config: ControlConfig,
    client: reqwest::Client,
}

impl HttpControlClient {
    pub fn new(config: ControlConfig) -> Result<Self, ControlError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ControlError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn params(
        request: &ControlRequest,
        action: ControlAction,
    ) -> Result<Vec<(&'static str, String)>, ControlError> {
        let mut params = Vec::new();
        match request.kind {
            ContainerKind::Session => {
                params.push(("sid", request.id.clone()));
            }
            ContainerKind::App => {
                let parent = request.parent_id.clone().ok_or_else(|| {
                    ControlError::Config(format!("app '{}' has no parent session id", request.id))
                })?;
                let app = request.app.clone().ok_or_else(|| {
                    ControlError::Config(format!("app '{}' has no application name", request.id))
                })?;
                params.push(("sid", parent));
                params.push(("aid", request.id.clone()));
                params.push(("app", app));
                if action == ControlAction::Start {
                    params.push(("nc", request.user.clone()));
                    if let Some(ref password) = request.password {
                        params.push(("hippass", password.clone()));
                    }
                }
            }
        }
        params.push(("hipuser", request.user.clone()));
        params.push(("action", action.as_str().to_owned()));
        Ok(params)
    }
}

#[async_trait::async_trait]
impl ControlBackend for HttpControlClient {
    async fn invoke(
        &self,
        request: &ControlRequest,
        action: ControlAction,
    ) -> Result<ControlOutcome, ControlError> {
        let url = format!("{}/control/{}", self.config.base_url, request.kind);
        let params = Self::params(request, action)?;
        tracing::debug!("GET {url} [{action} {}]", request.id);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ControlError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Unreachable(format!(
                "HTTP {status} for {url}"
            )));
        }

        let reply: ControlReply = response
            .json()
            .await
            .map_err(|e| ControlError::Protocol(format!("invalid reply body: {e}")))?;

        let output = reply
            .output
            .ok_or_else(|| ControlError::Protocol("reply missing 'output'".to_owned()))?;
        let stdout = output
            .stdout
            .ok_or_else(|| ControlError::Protocol("reply missing 'output.stdout'".to_owned()))?;
        let stderr = output
            .stderr
            .ok_or_else(|| ControlError::Protocol("reply missing 'output.stderr'".to_owned()))?;

        let (state, ambiguous) = classify_output(&stdout, &stderr);
        if ambiguous {
            tracing::warn!(
                "unclassifiable status for {} ({action}): stdout={stdout:?} stderr={stderr:?}",
                request.id
            );
        }

        Ok(ControlOutcome {
            url: reply.location.and_then(|l| l.url),
            state,
            error: ambiguous.then(|| {
                ContainerError::new(codes::AMBIGUOUS_STATUS, "remote status did not match any known state")
            }),
        })
    }
}
