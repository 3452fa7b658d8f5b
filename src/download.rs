//! xeno-canto recording downloader
//!
//! Queries the public recordings API for each species and stores the first
//! `num_files` recordings of the requested quality under
//! `data/raw/<species_dir>/<n>.mp3`.

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::utils::error::{BirdsongError, Result, ResultExt};
use crate::utils::logging::ProgressLogger;
use crate::utils::ProjectPaths;

const USER_AGENT: &str = concat!("birdsong-classifier/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Species queried when none are given
pub const DEFAULT_SPECIES: &str = "Eurasian blue tit,House sparrow,Common chaffinch";

/// What to download
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    /// English species names as understood by the API
    pub species: Vec<String>,
    /// Recording quality grade, `A` (best) to `E`
    pub quality: String,
    pub page: u32,
    pub num_files: usize,
    /// Number given to the first saved file
    pub start_index: usize,
}

/// Quality grades the API accepts
const QUALITY_GRADES: [&str; 5] = ["A", "B", "C", "D", "E"];

impl DownloadOptions {
    /// Reject an empty species list, an unknown quality grade and zero counts
    pub fn validate(&self) -> Result<()> {
        self.species.first().context("no species given")?;
        QUALITY_GRADES
            .iter()
            .find(|&&q| q == self.quality)
            .with_context(|| format!("quality must be one of A-E, got '{}'", self.quality))?;
        if self.page == 0 || self.num_files == 0 {
            return Err(BirdsongError::InvalidInput(format!(
                "page and num-files must be positive, got page {} and {} file(s)",
                self.page, self.num_files
            )));
        }
        Ok(())
    }
}

/// Split a comma-separated species list, dropping blanks
pub fn parse_species_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Directory name for a species: lowercase words joined by `_`
pub fn species_dir_name(species: &str) -> String {
    species
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Search URL for one species, quality grade and result page
pub fn query_url(api_url: &str, species: &str, quality: &str, page: u32) -> String {
    let words = species.split_whitespace().collect::<Vec<_>>().join("%20");
    format!("{}?query={}%20q:{}&page={}", api_url, words, quality, page)
}

/// One page of search results
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingsPage {
    #[serde(rename = "numPages", default)]
    pub num_pages: Option<u32>,
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub id: Option<String>,
    /// Direct audio URL; absent for restricted recordings
    #[serde(default)]
    pub file: Option<String>,
}

/// Counts for one species or for a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DownloadSummary {
    fn merge(&mut self, other: DownloadSummary) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Blocking client for the recordings API
pub struct Downloader {
    client: Client,
    api_url: String,
}

impl Downloader {
    pub fn new(api_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
        })
    }

    /// Fetch one page of recordings for `species`
    pub fn query(&self, species: &str, quality: &str, page: u32) -> Result<RecordingsPage> {
        let url = query_url(&self.api_url, species, quality, page);
        debug!("Querying {}", url);

        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(BirdsongError::Download(format!(
                "query for '{}' returned HTTP {}",
                species,
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    /// Download every species in `options`
    ///
    /// A failed query skips that species; the run continues with the next one.
    pub fn download_all(&self, options: &DownloadOptions, paths: &ProjectPaths) -> Result<DownloadSummary> {
        options.validate()?;
        let mut summary = DownloadSummary::default();

        for species in &options.species {
            info!("Downloading recordings for {}", species);
            let page = match self.query(species, &options.quality, options.page) {
                Ok(page) => page,
                Err(e) => {
                    error!("Query for {} failed: {}", species, e);
                    continue;
                }
            };

            let target = paths.raw_dir(&species_dir_name(species));
            match self.save_recordings(&page.recordings, options, &target) {
                Ok(counts) => {
                    info!(
                        "{}: {} downloaded, {} skipped, {} failed",
                        species, counts.downloaded, counts.skipped, counts.failed
                    );
                    summary.merge(counts);
                }
                Err(e) => error!("Could not prepare {:?}: {}", target, e),
            }
        }

        Ok(summary)
    }

    /// Save the first `num_files` recordings into `target`
    pub fn save_recordings(
        &self,
        recordings: &[Recording],
        options: &DownloadOptions,
        target: &Path,
    ) -> Result<DownloadSummary> {
        std::fs::create_dir_all(target)?;

        let count = if recordings.len() < options.num_files {
            warn!(
                "Only {} recordings available, requested {}",
                recordings.len(),
                options.num_files
            );
            recordings.len()
        } else {
            options.num_files
        };

        let mut summary = DownloadSummary::default();
        let mut progress = ProgressLogger::new("Downloading", count);

        for (i, recording) in recordings.iter().take(count).enumerate() {
            let path = target.join(format!("{}.mp3", options.start_index + i));
            progress.increment();

            if path.exists() {
                debug!("{:?} already exists, skipping", path);
                summary.skipped += 1;
                continue;
            }
            let Some(url) = recording.file.as_deref().filter(|u| !u.is_empty()) else {
                warn!("Recording {:?} has no file URL, skipping", recording.id);
                summary.skipped += 1;
                continue;
            };

            match self.fetch_file(url, &path) {
                Ok(()) => summary.downloaded += 1,
                Err(e) => {
                    error!("Failed to download {}: {}", url, e);
                    summary.failed += 1;
                }
            }
        }

        progress.finish();
        Ok(summary)
    }

    fn fetch_file(&self, url: &str, path: &Path) -> Result<()> {
        let response = self.client.get(url).send()?.error_for_status()?;
        let bytes = response.bytes()?;
        std::fs::write(path, &bytes)?;
        debug!("Saved {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }
}
