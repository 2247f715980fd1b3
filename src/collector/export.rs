//! The export collaborator boundary. How the history file is produced is
//! not this pipeline's business; anything that yields the tabular export
//! body can stand behind [`Exporter`].

use std::time::Duration;

use log::info;

use crate::{collector::CollectionError, config::ExportConfig};

pub trait Exporter {
    /// Produces the raw export body, restricted to scrobbles after `since`
    /// (unix seconds) when the collaborator supports incremental export.
    fn export_history(&self, since: Option<i64>) -> Result<String, CollectionError>;
}

/// Export via the web export service's CSV endpoint.
pub struct HttpExporter {
    agent: ureq::Agent,
    base_url: String,
    username: String,
}

impl HttpExporter {
    pub fn new(config: &ExportConfig, username: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username,
        }
    }
}

impl Exporter for HttpExporter {
    fn export_history(&self, since: Option<i64>) -> Result<String, CollectionError> {
        let url = format!("{}/export.html", self.base_url);
        info!("requesting export for user {}", self.username);

        let stamp = since.map(|s| s.to_string());
        let mut form: Vec<(&str, &str)> = vec![
            ("user", &self.username),
            ("type", "scrobbles"),
            ("format", "csv"),
        ];
        if let Some(stamp) = &stamp {
            form.push(("stamp", stamp));
        }

        let response = self
            .agent
            .post(&url)
            .send_form(&form)
            .map_err(|e| CollectionError::Export(format!("export request failed: {e}")))?;

        let body = response
            .into_string()
            .map_err(|e| CollectionError::Export(format!("failed to read export body: {e}")))?;

        if !looks_like_export(&body) {
            return Err(CollectionError::Export(
                "response does not appear to be CSV data".to_string(),
            ));
        }

        Ok(body)
    }
}

/// Cheap guard against the service answering with an HTML error page.
fn looks_like_export(body: &str) -> bool {
    let header = body.trim_start().lines().next().unwrap_or("").to_lowercase();
    header.contains("artist") && header.contains("track")
}
