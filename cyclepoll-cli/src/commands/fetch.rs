//! Fetch command - adaptively fetch one time window of a list endpoint.

use std::path::PathBuf;
use std::time::Instant;

use cyclepoll::fetch::{AdaptiveFetcher, ApiRequest, FetchClient, TimeWindow, WindowItem};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::common::{load_config, parse_param, parse_time, runtime};
use crate::error::CliError;

/// Arguments for the fetch command.
pub struct FetchArgs {
    pub config: Option<PathBuf>,
    pub url: String,
    pub start: String,
    pub end: String,
    pub params: Vec<String>,
    pub token: Option<String>,
    pub client_id: Option<String>,
    pub dedup: bool,
    pub json: bool,
}

/// A list item with an id and a view count; other fields pass through.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListedItem {
    pub id: String,

    #[serde(default)]
    pub view_count: u64,

    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl WindowItem for ListedItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn magnitude(&self) -> f64 {
        self.view_count as f64
    }
}

impl FetchArgs {
    /// Builds the request template from URL, params and credentials.
    fn base_request(&self) -> Result<ApiRequest, CliError> {
        let mut request = ApiRequest::get(self.url.as_str());
        for raw in &self.params {
            let (name, value) = parse_param(raw)?;
            request = request.append_param(name, value);
        }
        if let Some(token) = &self.token {
            request = request.with_bearer(token);
        }
        if let Some(client_id) = &self.client_id {
            request = request.with_client_id(client_id);
        }
        request.to_url()?;
        Ok(request)
    }

    fn window(&self) -> Result<TimeWindow, CliError> {
        let start = parse_time(&self.start)?;
        let end = parse_time(&self.end)?;
        if end <= start {
            return Err(CliError::Config(format!(
                "Window end {} is not after start {}",
                self.end, self.start
            )));
        }
        Ok(TimeWindow::new(start, end))
    }
}

/// Run the fetch command.
pub fn run(args: FetchArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let base = args.base_request()?;
    let window = args.window()?;

    let client = FetchClient::with_reqwest(config.fetch)?;
    let fetcher = AdaptiveFetcher::new(client, config.adaptive);

    let rt = runtime()?;
    let started = Instant::now();
    let items: Vec<ListedItem> = rt.block_on(async {
        if args.dedup {
            fetcher.fetch_deduplicated(&base, window).await
        } else {
            fetcher.fetch(&base, window).await
        }
    })?;
    info!(
        items = items.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fetch complete"
    );

    if args.json {
        for item in &items {
            let line = serde_json::to_string(item)
                .map_err(|e| CliError::Config(format!("Failed to encode item: {}", e)))?;
            println!("{}", line);
        }
    } else {
        print_summary(&items, window);
    }
    Ok(())
}

fn print_summary(items: &[ListedItem], window: TimeWindow) {
    let views: u64 = items.iter().map(|i| i.view_count).sum();
    println!("Window: {} .. {}", window.start, window.end);
    println!("Items:  {}", items.len());
    println!("Views:  {}", views);
    if let Some(top) = items.iter().max_by_key(|i| i.view_count) {
        println!("Top:    {} ({} views)", top.id, top.view_count);
    }
}
