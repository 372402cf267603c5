//! Scripted fetch and extract collaborators for crawler unit tests

use crate::crawler::fetcher::{FetchError, PageFetcher, PageRequest, RawPage};
use crate::crawler::parser::{ExtractedPage, RecordExtractor};
use crate::record::{RawRecord, Track};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

type Script = Box<dyn Fn(u32, u32) -> Result<(), FetchError> + Send + Sync>;
type Latency = Box<dyn Fn(u32) -> Duration + Send + Sync>;

/// Fetcher whose outcome per (page, attempt) is decided by a closure
pub struct StubFetcher {
    script: Script,
    latency: Latency,
    attempts: Mutex<HashMap<u32, u32>>,
    calls: Mutex<Vec<(u32, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubFetcher {
    pub fn ok() -> Self {
        Self::with_script(|_, _| Ok(()))
    }

    pub fn with_script(script: impl Fn(u32, u32) -> Result<(), FetchError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            latency: Box::new(|_| Duration::ZERO),
            attempts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.latency = Box::new(latency);
        self
    }

    /// Page number and start time of every fetch, in call order
    pub fn calls(&self) -> Vec<(u32, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> Result<RawPage, FetchError> {
        let page = request.page_number();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(page).or_insert(0);
            *count += 1;
            *count
        };
        self.calls.lock().unwrap().push((page, Instant::now()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep((self.latency)(page)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(page, attempt)?;
        Ok(RawPage {
            url: format!("stub://explorer/{}", page),
            page_number: page,
            offset: request.cursor.offset(),
            body: String::new(),
            has_more: None,
        })
    }
}

/// Extractor serving fixed records per page number
///
/// Pages that were never registered fail extraction.
#[derive(Default)]
pub struct StubExtractor {
    pages: HashMap<u32, ExtractedPage>,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, number: u32, records: Vec<RawRecord>, has_next_page: bool) -> Self {
        self.pages.insert(
            number,
            ExtractedPage {
                records,
                has_next_page,
            },
        );
        self
    }
}

impl RecordExtractor for StubExtractor {
    fn extract_records(&self, page: &RawPage) -> Result<ExtractedPage, FetchError> {
        self.pages
            .get(&page.page_number)
            .cloned()
            .ok_or_else(|| FetchError::Extraction {
                url: page.url.clone(),
                message: "no mix listing found".to_string(),
            })
    }
}

/// Title only: scores 0.4, or 0.5 once tagged with a genre
pub fn bare_record(title: &str) -> RawRecord {
    RawRecord {
        title: title.to_string(),
        ..RawRecord::default()
    }
}

/// Every scored field present, with a complete two-track list
pub fn full_record(title: &str) -> RawRecord {
    let track = |position: u32| Track {
        position,
        title: Some(format!("Track {}", position)),
        artist: Some("Artist".to_string()),
        start_time: None,
    };

    let mut record = RawRecord {
        title: format!("2024-03-01 - DJ Test - {}", title),
        url: format!("https://www.mixesdb.com/w/{}", title.replace(' ', "_")),
        author: Some("DJ Test".to_string()),
        date: NaiveDate::from_ymd_opt(2024, 3, 1),
        tracks: vec![track(1), track(2)],
        ..RawRecord::default()
    };
    record
        .metadata
        .insert(crate::record::DURATION_KEY.to_string(), "1:02:03".into());
    record.metadata.insert("bitrate".to_string(), "320 kbps".into());
    record
}
