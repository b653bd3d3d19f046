//! # Streaming Find
//!
//! `Auth -> CompileQuery -> OpenCursor -> Stream -> Close`.
//!
//! Records are pulled from the cursor one at a time and pass through the
//! transform chain before the consumer sees them. The optional total runs
//! concurrently on its own task. Dropping a [`FindStream`] drops the
//! cursor and aborts the count.

use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::errors::StreamError;
use super::params::{effective_limit, effective_skip, parse_field_list, parse_sort, FindRequest};
use super::transforms::{
    DateNormalizationTransform, FieldPermissionTransform, HelperFieldStripTransform,
    PopulateTransform, TransformChain,
};
use crate::access::{access_for, build_access_projection, AccessError, AccessProjection};
use crate::auth::{CallerResolver, User};
use crate::errors::{QueryError, QueryResult};
use crate::filter::{compile_query, CompiledQuery, Filter, FilterContext};
use crate::meta::{MetaObject, MetaRegistry};
use crate::record::Record;
use crate::store::{DocumentStore, FindPlan, SortKey, StoreError};

/// Limits applied to every find
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Used when the caller gives no usable limit
    pub default_limit: usize,
    /// Above this limit results are ordered by `_id` for stable paging
    pub large_result_threshold: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: 50,
            large_result_threshold: 1000,
        }
    }
}

/// A compiled, access-checked read ready to open
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub document: String,
    pub user: User,
    pub meta: MetaObject,
    pub plan: FindPlan,
    pub access: Arc<AccessProjection>,
}

/// Pipeline entry point shared by every read surface
#[derive(Clone)]
pub struct QueryEngine {
    registry: Arc<MetaRegistry>,
    store: Arc<dyn DocumentStore>,
    resolver: Arc<dyn CallerResolver>,
    settings: QuerySettings,
}

impl QueryEngine {
    pub fn new(
        registry: Arc<MetaRegistry>,
        store: Arc<dyn DocumentStore>,
        resolver: Arc<dyn CallerResolver>,
    ) -> Self {
        Self {
            registry,
            store,
            resolver,
            settings: QuerySettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<MetaRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Resolve the caller, check access and compile the read
    pub async fn build_find_query(&self, request: &FindRequest) -> QueryResult<BuiltQuery> {
        let user = self.resolver.resolve(request.token.as_deref()).await?;
        let document = request.document.as_str();

        let access = access_for(document, &user, &self.registry)
            .filter(|a| a.is_readable)
            .ok_or_else(|| AccessError::ReadDenied(document.to_string()))?;
        let meta = self
            .registry
            .meta(document)
            .ok_or_else(|| QueryError::UnknownDocument(document.to_string()))?;

        let ctx = FilterContext::new(&self.registry, &user);

        let mut filters = Vec::new();
        if request.filter.is_none() {
            if let (Some(name), Some(kind)) = (&request.display_name, &request.display_type) {
                if let Some(filter) = self
                    .registry
                    .display(document, kind, name)
                    .and_then(|d| d.filter.clone())
                {
                    filters.push(filter);
                }
            }
        }
        if let Some(read_filter) = &access.read_filter {
            filters.push(read_filter.clone());
        }
        if let Some(filter) = &request.filter {
            filters.push(filter.clone());
        }

        let mut query = compile_query(&Filter::all_of(filters), meta, &ctx)?;
        if let Some(search) = request.filter.as_ref().and_then(|f| f.text_search.as_deref()) {
            query = query.with_text_search(search);
        }

        let requested: BTreeSet<String> = parse_field_list(request.fields.as_deref());
        let projection = build_access_projection(access, meta, &requested, &ctx)
            .map_err(AccessError::from)?;

        let limit = effective_limit(request.limit, self.settings.default_limit);
        let mut sort = match &request.sort {
            Some(sort) => parse_sort(sort, meta)?,
            None => Vec::new(),
        };
        if limit > self.settings.large_result_threshold {
            sort = vec![SortKey::asc("_id")];
        }

        let plan = FindPlan::new(query)
            .with_sort(sort)
            .with_skip(effective_skip(request.start))
            .with_limit(Some(limit))
            .with_projection(projection.projection.clone());

        debug!(
            document,
            user_id = %user.id,
            query = %plan.query.as_value(),
            limit,
            skip = plan.skip,
            "find query built"
        );

        Ok(BuiltQuery {
            document: document.to_string(),
            meta: meta.clone(),
            user,
            plan,
            access: Arc::new(projection),
        })
    }

    /// Open the record stream for a request
    pub async fn find_stream(&self, request: &FindRequest) -> QueryResult<FindStream> {
        let built = self.build_find_query(request).await?;

        let total = request.get_total.then(|| {
            TotalCount::spawn(
                self.store.clone(),
                built.document.clone(),
                built.plan.query.clone(),
            )
        });

        let cursor = self.store.find(&built.document, built.plan.clone()).await?;

        let mut chain = TransformChain::new()
            .with(FieldPermissionTransform::new(built.access.clone()))
            .with(HelperFieldStripTransform::new(built.access.clone()));
        if request.with_detail_fields {
            let populate = PopulateTransform::new(self.store.clone(), &built.meta);
            if !populate.is_empty() {
                chain = chain.with(populate);
            }
        }
        if !request.lookups.is_empty() {
            chain = chain.with(PopulateTransform::with_lookups(
                self.store.clone(),
                request.lookups.clone(),
            ));
        }
        if request.transform_dates_to_string {
            chain = chain.with(DateNormalizationTransform);
        }

        info!(
            document = %built.document,
            user_id = %built.user.id,
            stages = ?chain.stage_names(),
            "find stream opened"
        );

        let chain = Arc::new(chain);
        let records = cursor
            .map_err(StreamError::from)
            .and_then(move |record| {
                let chain = chain.clone();
                async move { chain.run(record).await }
            })
            .boxed();

        Ok(FindStream::new(built.document, records, total))
    }
}

/// Record stream of one find, with its optional concurrent total
pub struct FindStream {
    document: String,
    records: BoxStream<'static, Result<Record, StreamError>>,
    total: Option<TotalCount>,
    started: Instant,
    yielded: usize,
    finished: bool,
}

impl FindStream {
    pub fn new(
        document: String,
        records: BoxStream<'static, Result<Record, StreamError>>,
        total: Option<TotalCount>,
    ) -> Self {
        Self {
            document,
            records,
            total,
            started: Instant::now(),
            yielded: 0,
            finished: false,
        }
    }

    /// Takes the total handle, leaving the stream to run on its own
    pub fn take_total(&mut self) -> Option<TotalCount> {
        self.total.take()
    }

    pub fn total(&self) -> Option<&TotalCount> {
        self.total.as_ref()
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }
}

impl Stream for FindStream {
    type Item = Result<Record, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        let polled = this.records.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(Some(Ok(_))) => this.yielded += 1,
            Poll::Ready(Some(Err(err))) => {
                warn!(document = %this.document, error = %err, "find stream failed");
                this.finished = true;
            }
            Poll::Ready(None) => {
                info!(
                    document = %this.document,
                    records = this.yielded,
                    elapsed_ms = this.started.elapsed().as_millis() as u64,
                    "find stream finished"
                );
                this.finished = true;
            }
            Poll::Pending => {}
        }
        polled
    }
}

impl Drop for FindStream {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                document = %self.document,
                records = self.yielded,
                "find stream dropped before completion"
            );
        }
    }
}

/// Concurrent count published through a watch channel.
///
/// Dropping the handle aborts the count task.
pub struct TotalCount {
    rx: watch::Receiver<Option<Result<u64, StoreError>>>,
    handle: JoinHandle<()>,
}

impl TotalCount {
    pub fn spawn(store: Arc<dyn DocumentStore>, document: String, query: CompiledQuery) -> Self {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let result = store.count(&document, &query).await;
            debug!(document = %document, total = ?result.as_ref().ok(), "count finished");
            // Nobody listening is fine
            let _ = tx.send(Some(result));
        });
        Self { rx, handle }
    }

    /// The count, if it has resolved
    pub fn get(&self) -> Option<Result<u64, StoreError>> {
        self.rx.borrow().clone()
    }

    pub async fn wait(&mut self) -> Result<u64, StoreError> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value
                .clone()
                .unwrap_or_else(|| Err(StoreError::Cursor("count unavailable".into()))),
            Err(_) => Err(StoreError::Cursor("count aborted".into())),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TotalCount {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
