//! Report-server retrieval
//!
//! Reports are rendered by the server and fetched with a single GET of the form
//! `<server>?<report path>&rs:Format=<format>&<param>=<value>...`.

use anyhow::{Context, Result, bail};
use log::info;
use reqwest::StatusCode;
use reqwest::Url;
use std::fs::File;
use std::path::Path;

pub const DEFAULT_FORMAT: &str = "EXCEL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub server: String,
    /// Path of the report on the server, e.g. `/Sales/Daily`
    pub report_path: String,
    pub format: String,
    pub params: Vec<(String, String)>,
    pub auth: Option<(String, String)>,
}

impl ReportRequest {
    pub fn new(server: impl Into<String>, report_path: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            report_path: report_path.into(),
            format: DEFAULT_FORMAT.to_string(),
            params: Vec::new(),
            auth: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((user.into(), password.into()));
        self
    }

    /// Full report URL with percent-encoded parameter values
    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server)
            .with_context(|| format!("Invalid server URL '{}'", self.server))?;
        url.set_query(Some(&format!(
            "{}&rs:Format={}",
            self.report_path, self.format
        )));
        if !self.params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Fetch the rendered report into `dest`
    pub fn download(&self, dest: &Path) -> Result<()> {
        let url = self.url()?;
        info!("Requesting report {}", self.report_path);

        let client = reqwest::blocking::Client::new();
        let mut request = client.get(url);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        let mut response = request
            .send()
            .with_context(|| format!("Failed to reach {}", self.server))?;

        if response.status() != StatusCode::OK {
            bail!("Server error: {}", response.status().as_u16());
        }

        let mut file = File::create(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let bytes = response
            .copy_to(&mut file)
            .with_context(|| format!("Failed to save report to {}", dest.display()))?;
        info!("Saved {} bytes to {}", bytes, dest.display());
        Ok(())
    }
}
