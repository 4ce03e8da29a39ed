//! Test utilities: mock implementations of the core trait seams.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::AppError;
use crate::report::{IngestEvent, IngestReporter};
use crate::traits::{CredentialSource, PageFetch, RegionLookup};

// ---------------------------------------------------------------------------
// MockPageFetcher
// ---------------------------------------------------------------------------

/// Mock page fetcher backed by a queue of canned responses.
///
/// Each call pops the first element; an exhausted queue returns an empty
/// page (the upstream end-of-data signal). Every call is recorded as
/// `(offset, limit)`.
#[derive(Clone)]
pub struct MockPageFetcher {
    responses: Arc<Mutex<Vec<Result<Vec<Value>, AppError>>>>,
    calls: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl MockPageFetcher {
    pub fn with_responses(responses: Vec<Result<Vec<Value>, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A fetcher that serves `records` in pages, then empty pages forever.
    pub fn with_records(records: Vec<Value>, page_size: usize) -> Self {
        let pages = records
            .chunks(page_size.max(1))
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Self::with_responses(pages)
    }

    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageFetch for MockPageFetcher {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>, AppError> {
        self.calls.lock().unwrap().push((offset, limit));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Vec::new())
        } else {
            // Respect the requested limit like the real upstream does.
            responses.remove(0).map(|mut page| {
                page.truncate(limit);
                page
            })
        }
    }
}

// ---------------------------------------------------------------------------
// MockCredentialSource
// ---------------------------------------------------------------------------

/// Mock credential source that hands out a fixed token and records
/// `ensure_token` / `invalidate` calls.
#[derive(Clone)]
pub struct MockCredentialSource {
    result: Arc<Mutex<Result<String, String>>>,
    pub ensure_calls: Arc<Mutex<u32>>,
    pub invalidations: Arc<Mutex<u32>>,
}

impl MockCredentialSource {
    pub fn with_token(token: &str) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(token.to_string()))),
            ensure_calls: Arc::new(Mutex::new(0)),
            invalidations: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Arc::new(Mutex::new(Err(message.to_string()))),
            ensure_calls: Arc::new(Mutex::new(0)),
            invalidations: Arc::new(Mutex::new(0)),
        }
    }

    pub fn ensure_count(&self) -> u32 {
        *self.ensure_calls.lock().unwrap()
    }

    pub fn invalidation_count(&self) -> u32 {
        *self.invalidations.lock().unwrap()
    }
}

impl CredentialSource for MockCredentialSource {
    async fn ensure_token(&self) -> Result<String, AppError> {
        *self.ensure_calls.lock().unwrap() += 1;
        self.result
            .lock()
            .unwrap()
            .clone()
            .map_err(AppError::Auth)
    }

    fn invalidate(&self) {
        *self.invalidations.lock().unwrap() += 1;
    }
}

// ---------------------------------------------------------------------------
// MockRegionLookup
// ---------------------------------------------------------------------------

/// Mock region lookup backed by a fixed map, recording every queried code.
#[derive(Clone)]
pub struct MockRegionLookup {
    mapping: Arc<HashMap<String, i32>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockRegionLookup {
    pub fn with_mapping(entries: &[(&str, i32)]) -> Self {
        let mapping = entries
            .iter()
            .map(|(code, region)| ((*code).to_string(), *region))
            .collect();
        Self {
            mapping: Arc::new(mapping),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RegionLookup for MockRegionLookup {
    async fn find_by_code(&self, code: &str) -> Option<i32> {
        self.calls.lock().unwrap().push(code.to_string());
        self.mapping.get(code).copied()
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock ingestion reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|l| *l == label)
            .count()
    }
}

impl IngestReporter for MockReporter {
    fn report(&self, event: IngestEvent<'_>) {
        let label = match &event {
            IngestEvent::RunStarted { .. } => "RunStarted",
            IngestEvent::PageFetched { .. } => "PageFetched",
            IngestEvent::RetryScheduled { .. } => "RetryScheduled",
            IngestEvent::CircuitRejected { .. } => "CircuitRejected",
            IngestEvent::RecordRejected { .. } => "RecordRejected",
            IngestEvent::RunCompleted { .. } => "RunCompleted",
            IngestEvent::RunAborted { .. } => "RunAborted",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a raw upstream record with the fields the normalizer reads.
pub fn make_raw_offer(id: &str, title: &str, description: &str) -> Value {
    serde_json::json!({
        "id": id,
        "intitule": title,
        "description": description,
        "entreprise": { "nom": "ACME" },
        "lieuTravail": { "libelle": "75 - Paris", "codePostal": "75001" },
        "dateCreation": "2025-05-12T09:00:00Z",
        "origineOffre": { "urlOrigine": "https://candidat.example/offres/1" }
    })
}

/// A batch of valid raw offers with sequential ids.
pub fn make_raw_offers(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| make_raw_offer(&format!("OFF{i:04}"), "Développeur Rust", "Rust et Docker"))
        .collect()
}
