//! Record sources for aggregation sessions.

use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::bridge::AggregationRecords;
use crate::errors::QueryResult;
use crate::filter::Filter;
use crate::pipeline::{FindRequest, QueryEngine, TotalCount};

/// Default cap on records fed into one aggregation
pub const DEFAULT_MAX_RECORDS: usize = 100_000;

/// Read parameters shared by pivot and graph requests
#[derive(Debug, Clone)]
pub struct AggregationRequest {
    pub document: String,
    pub token: Option<String>,
    pub filter: Option<Filter>,
    pub sort: Option<Value>,
    pub limit: Option<i64>,
    pub display_name: Option<String>,
    pub display_type: Option<String>,
    /// Label language
    pub lang: String,
}

impl AggregationRequest {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            token: None,
            filter: None,
            sort: None,
            limit: None,
            display_name: None,
            display_type: None,
            lang: "en".to_string(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// The find behind this aggregation, capped at `max_records`
    pub fn find_request(&self, fields: String, max_records: usize) -> FindRequest {
        let cap = i64::try_from(max_records).unwrap_or(i64::MAX);
        let limit = match self.limit {
            Some(n) if n > 0 => n.min(cap),
            _ => cap,
        };
        let mut request = FindRequest::new(self.document.clone());
        request.token = self.token.clone();
        request.filter = self.filter.clone();
        request.sort = self.sort.clone();
        request.fields = Some(fields).filter(|f| !f.is_empty());
        request.limit = Some(limit);
        request.display_name = self.display_name.clone();
        request.display_type = self.display_type.clone();
        request.get_total = true;
        request.transform_dates_to_string = true;
        request
    }
}

/// An opened, non-empty record stream and its total
pub struct OpenedRecords {
    pub records: AggregationRecords,
    pub total: Option<TotalCount>,
}

/// Opens the find and peeks at the first record.
///
/// Returns `None` when the stream is empty, so no session is started for
/// nothing. A failing first record is returned as the error.
pub async fn open_records(
    engine: &QueryEngine,
    request: FindRequest,
) -> QueryResult<Option<OpenedRecords>> {
    let mut stream = engine.find_stream(&request).await?;
    let total = stream.take_total();
    match stream.next().await {
        None => Ok(None),
        Some(Err(err)) => Err(err.into()),
        Some(Ok(first)) => Ok(Some(OpenedRecords {
            records: stream::once(async move { Ok(first) }).chain(stream).boxed(),
            total,
        })),
    }
}
