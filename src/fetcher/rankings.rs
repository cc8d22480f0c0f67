//! Ranked user enumeration from the legacy performance ranking pages
//!
//! The v1 API has no ranking endpoint, so the listing HTML is scanned for
//! profile links (`/u/<id>`), in page order.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::downloader::config::{ApiConfig, RANKS_PER_PAGE};
use crate::fetcher::osu_http::{build_http_client, get_page};
use crate::fetcher::{FetcherError, FetcherResult, ListEnumerator};
use crate::{GameMode, UserId};

const PROFILE_LINK: &str = r#"href\s*=\s*["']/u/(\d+)["'/?#]"#;

/// Scrapes ranked user ids for one mode (and optionally one country)
///
/// Listing pages are public, so the scraper never holds the API key.
#[derive(Debug, Clone)]
pub struct RankingsScraper {
    client: Client,
    url: String,
    mode: GameMode,
    country: Option<String>,
    link_pattern: Regex,
}

impl RankingsScraper {
    /// Scraper for `config.rankings_url`
    pub fn new(config: &ApiConfig, mode: GameMode, country: Option<String>) -> FetcherResult<Self> {
        let link_pattern = Regex::new(PROFILE_LINK)
            .map_err(|e| FetcherError::InvalidResponse(format!("bad profile link pattern: {e}")))?;

        Ok(Self {
            client: build_http_client(config)?,
            url: config.rankings_url.clone(),
            mode,
            country: country.map(|c| c.to_lowercase()),
            link_pattern,
        })
    }

    fn page_params(&self, page: usize) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("m", self.mode.api_value().to_string()),
            ("page", page.to_string()),
        ];
        if let Some(country) = &self.country {
            params.push(("c", country.clone()));
        }
        params
    }

    /// User ids linked from one listing page, in document order
    pub fn extract_user_ids(&self, html: &str) -> Vec<UserId> {
        self.link_pattern
            .captures_iter(html)
            .filter_map(|cap| cap.get(1).and_then(|m| m.as_str().parse().ok()))
            .collect()
    }
}

#[async_trait]
impl ListEnumerator for RankingsScraper {
    async fn enumerate(&self, page_count: usize) -> FetcherResult<Vec<UserId>> {
        info!(pages = page_count, mode = %self.mode, "Scraping rankings");
        let mut ids = Vec::with_capacity(page_count * RANKS_PER_PAGE);

        for page in 1..=page_count {
            let html = get_page(&self.client, &self.url, &self.page_params(page)).await?;
            let found = self.extract_user_ids(&html);

            if found.len() != RANKS_PER_PAGE {
                warn!(page, found = found.len(), "Unexpected number of users on ranking page");
            }
            debug!(page, found = found.len(), "Scraped rankings page");
            ids.extend(found);
        }

        info!(users = ids.len(), "Rankings scraped");
        Ok(ids)
    }
}

/// Listing pages needed to reach `rank` (exclusive)
pub fn pages_for_rank(rank: usize) -> usize {
    rank.div_ceil(RANKS_PER_PAGE)
}
