// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use quoter_app::{SyncOutcome, TotalsResponse};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, HeaderValue};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Posts the serialized calculation form and decodes the totals answer.
#[derive(Debug, Clone)]
pub struct Client {
    update_url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(update_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = update_url.trim();
        if trimmed.is_empty() {
            bail!("sync.update_url must not be empty -- set it in the [sync] section");
        }
        let update_url = Url::parse(trimmed)
            .with_context(|| format!("sync.update_url {trimmed:?} is not a valid URL"))?;
        if !matches!(update_url.scheme(), "http" | "https") {
            bail!(
                "sync.update_url must use http or https, got {:?}",
                update_url.scheme()
            );
        }
        if timeout.is_zero() {
            bail!("sync.timeout must be positive");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            update_url,
            timeout,
            http,
        })
    }

    pub fn update_url(&self) -> &str {
        self.update_url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends the form; `adjust` asks the server to rebalance margins.
    pub fn post_update(&self, form: &[(String, String)], adjust: bool) -> Result<TotalsResponse> {
        let mut pairs: Vec<(&str, &str)> = form
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        if adjust {
            pairs.push(("adjust", "true"));
        }

        debug!(
            url = %self.update_url,
            fields = pairs.len(),
            adjust,
            "posting calculation form"
        );
        let response = self
            .http
            .post(self.update_url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&pairs)
            .send()
            .map_err(|error| connection_error(self.update_url.as_str(), error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let parsed: TotalsResponse = response.json().context("decode totals response")?;
        debug!(result = parsed.result, "totals response received");
        Ok(parsed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub request_id: u64,
    pub form: Vec<(String, String)>,
    pub adjust: bool,
}

#[derive(Debug)]
struct PendingSync {
    request_id: u64,
    cancelled: Arc<AtomicBool>,
}

/// Runs at most one debounced totals request at a time on a worker thread.
#[derive(Debug)]
pub struct TotalsSync {
    client: Client,
    debounce: Duration,
    pending: Option<PendingSync>,
}

impl TotalsSync {
    pub fn new(client: Client, debounce: Duration) -> Self {
        Self {
            client,
            debounce,
            pending: None,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn pending(&self) -> Option<u64> {
        self.pending.as_ref().map(|pending| pending.request_id)
    }

    /// Starts `request`, aborting any pending one. `on_done` runs on the
    /// worker thread with the outcome.
    pub fn spawn<F>(&mut self, request: SyncRequest, on_done: F) -> Result<()>
    where
        F: FnOnce(u64, SyncOutcome) + Send + 'static,
    {
        if let Some(previous) = self.pending.take() {
            previous.cancelled.store(true, Ordering::SeqCst);
            debug!(request_id = previous.request_id, "superseded totals request");
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let worker_flag = Arc::clone(&cancelled);
        let client = self.client.clone();
        let debounce = self.debounce;
        let request_id = request.request_id;

        thread::Builder::new()
            .name(format!("totals-sync-{request_id}"))
            .spawn(move || {
                let outcome = run_request(&client, debounce, &worker_flag, request);
                on_done(request_id, outcome);
            })
            .context("spawn totals sync worker")?;

        self.pending = Some(PendingSync {
            request_id,
            cancelled,
        });
        Ok(())
    }

    /// Aborts the pending request if it is `request_id`.
    pub fn abort(&mut self, request_id: u64) -> bool {
        match self.pending.take() {
            Some(pending) if pending.request_id == request_id => {
                pending.cancelled.store(true, Ordering::SeqCst);
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }
}

fn run_request(
    client: &Client,
    debounce: Duration,
    cancelled: &AtomicBool,
    request: SyncRequest,
) -> SyncOutcome {
    if !debounce.is_zero() {
        thread::sleep(debounce);
    }
    if cancelled.load(Ordering::SeqCst) {
        debug!(
            request_id = request.request_id,
            "totals request aborted before sending"
        );
        return SyncOutcome::Aborted;
    }

    let result = client.post_update(&request.form, request.adjust);
    if cancelled.load(Ordering::SeqCst) {
        debug!(
            request_id = request.request_id,
            "totals response discarded after abort"
        );
        return SyncOutcome::Aborted;
    }

    match result {
        Ok(response) => {
            if !response.result {
                info!(
                    request_id = request.request_id,
                    message = response.message.as_deref().unwrap_or_default(),
                    "server rejected calculation update"
                );
            }
            SyncOutcome::Completed(response)
        }
        Err(error) => {
            let error = format!("{error:#}");
            warn!(request_id = request.request_id, %error, "totals sync failed");
            SyncOutcome::Failed(error)
        }
    }
}

fn connection_error(update_url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("{update_url} did not answer in time -- raise sync.timeout or retry");
    }
    anyhow!("cannot reach {update_url} -- check sync.update_url and the server ({error})")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<TotalsResponse>(body)
        && let Some(message) = parsed.message
        && !message.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), message);
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() < 100 && !trimmed.contains('<') {
        return anyhow!("server error ({}): {}", status.as_u16(), trimmed);
    }

    anyhow!("server returned {}", status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::{Client, clean_error_response};
    use reqwest::StatusCode;
    use std::time::Duration;

    #[test]
    fn new_rejects_bad_urls() {
        let timeout = Duration::from_secs(1);
        assert!(Client::new("", timeout).is_err());
        assert!(Client::new("not a url", timeout).is_err());
        let error = Client::new("ftp://example.com/update", timeout)
            .expect_err("ftp scheme should be rejected");
        assert!(error.to_string().contains("http or https"));
        assert!(Client::new("http://example.com/update", Duration::ZERO).is_err());
    }

    #[test]
    fn clean_error_response_prefers_json_message() {
        let error = clean_error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"result":false,"message":"Calculation is locked"}"#,
        );
        assert_eq!(
            error.to_string(),
            "server error (422): Calculation is locked"
        );
    }

    #[test]
    fn clean_error_response_hides_html_pages() {
        let error = clean_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "<html><body>Internal error</body></html>",
        );
        assert_eq!(error.to_string(), "server returned 500");

        let short = clean_error_response(StatusCode::FORBIDDEN, "forbidden");
        assert_eq!(short.to_string(), "server error (403): forbidden");
    }
}
