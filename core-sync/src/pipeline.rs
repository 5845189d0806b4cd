//! # Job Pipeline
//!
//! Executes one dequeued job: pairs in order, directions per sync mode,
//! items one at a time against the target.
//!
//! Nothing in here returns an error to the worker. Every failure becomes a
//! [`SyncFailure`] in the result and processing moves on to the next item,
//! direction or pair.

use crate::job::{SyncJobId, SyncJobRecord};
use crate::metrics::SyncMetrics;
use crate::provider::ItemAdder;
use crate::registry::{ServiceHandle, ServiceRegistry};
use crate::repository::MetadataStore;
use crate::request::{ServicePair, SyncJobRequest, SyncMode};
use crate::result::{CrossServiceSyncResult, ServicePairResult, SyncErrorKind, SyncFailure};
use crate::SyncError;
use core_auth::{OAuthManager, OAuthTokens, UserServiceRef};
use core_matching::{matches_sync_type, supports_sync_type, to_universal, UniversalItem};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A resolved service plus the user's tokens for it
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub handle: ServiceHandle,
    pub tokens: OAuthTokens,
}

impl ServiceEndpoint {
    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

/// What one direction of a pair produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectionalOutcome {
    pub items_synced: Vec<UniversalItem>,
    pub items_failed: Vec<UniversalItem>,
    pub errors: Vec<SyncFailure>,
}

pub struct JobProcessor {
    registry: Arc<ServiceRegistry>,
    oauth: Arc<dyn OAuthManager>,
    adder: Arc<dyn ItemAdder>,
    store: Arc<dyn MetadataStore>,
    metrics: Arc<SyncMetrics>,
    events: EventBus,
    settings: SyncSettings,
}

impl JobProcessor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        oauth: Arc<dyn OAuthManager>,
        adder: Arc<dyn ItemAdder>,
        store: Arc<dyn MetadataStore>,
        metrics: Arc<SyncMetrics>,
        events: EventBus,
        settings: SyncSettings,
    ) -> Self {
        Self {
            registry,
            oauth,
            adder,
            store,
            metrics,
            events,
            settings,
        }
    }

    /// Run a job to completion and persist its record and result
    ///
    /// Store failures are logged; the returned result always carries the
    /// synced items regardless of the retention policy.
    #[instrument(
        skip(self, request, ctx),
        fields(user_id = %request.user_id, sync_type = %request.sync_type)
    )]
    pub async fn process_sync_job(
        &self,
        request: SyncJobRequest,
        ctx: &CancellationToken,
    ) -> CrossServiceSyncResult {
        let job_id = SyncJobId::new();
        let started = Instant::now();

        let record = SyncJobRecord::start(job_id, &request);
        if let Err(e) = self.store.create_job(&record).await {
            warn!(job_id = %job_id, error = %e, "Failed to create job record");
        }

        info!(
            job_id = %job_id,
            pairs = request.service_pairs.len(),
            scheduled = request.is_scheduled,
            dry_run = request.options.dry_run,
            "Processing sync job"
        );
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Started {
                job_id: job_id.to_string(),
                user_id: request.user_id.clone(),
                sync_type: request.sync_type.to_string(),
                pair_count: request.service_pairs.len(),
            }))
            .ok();

        // Sequential on purpose: bounds outbound load per job
        let mut pair_results = Vec::with_capacity(request.service_pairs.len());
        for pair in &request.service_pairs {
            pair_results.push(self.process_service_pair(&request, pair, ctx).await);
        }

        let mut result = CrossServiceSyncResult::from_pairs(
            job_id,
            request.user_id.clone(),
            request.sync_type,
            pair_results,
            started.elapsed(),
        );
        result
            .metadata
            .insert("scheduled".to_string(), request.is_scheduled.into());
        result
            .metadata
            .insert("priority".to_string(), request.priority.as_str().into());
        result
            .metadata
            .insert("dry_run".to_string(), request.options.dry_run.into());

        match record.finish(&result) {
            Ok(record) => {
                if let Err(e) = self.store.update_job(&record).await {
                    warn!(job_id = %job_id, error = %e, "Failed to update job record");
                }
            }
            Err(e) => warn!(job_id = %job_id, error = %e, "Job record transition rejected"),
        }

        let stored = result.retained(self.settings.result_retention);
        if let Err(e) = self.store.store_result(&stored).await {
            error!(job_id = %job_id, error = %e, "Failed to store sync result");
        }

        self.metrics.record(&result).await;

        let event = if result.success {
            SyncEvent::Completed {
                job_id: job_id.to_string(),
                total_synced: result.total_synced,
                duration_ms: result.duration.as_millis() as u64,
            }
        } else {
            SyncEvent::Failed {
                job_id: job_id.to_string(),
                total_synced: result.total_synced,
                total_failed: result.total_failed,
                error_count: result.errors.len(),
            }
        };
        self.events.emit(CoreEvent::Sync(event)).ok();

        info!(
            job_id = %job_id,
            success = result.success,
            total_synced = result.total_synced,
            total_failed = result.total_failed,
            duration_ms = result.duration.as_millis() as u64,
            "Sync job finished"
        );

        result
    }

    /// Resolve a pair and run the directions its mode asks for
    ///
    /// A service or token failure aborts this pair only.
    #[instrument(
        skip(self, request, pair, ctx),
        fields(source = %pair.source_service, target = %pair.target_service, mode = %pair.sync_mode)
    )]
    pub async fn process_service_pair(
        &self,
        request: &SyncJobRequest,
        pair: &ServicePair,
        ctx: &CancellationToken,
    ) -> ServicePairResult {
        let started = Instant::now();
        let mut pair_result = ServicePairResult::new(pair);

        let source_handle = match self.resolve_service(&pair.source_service).await {
            Ok(handle) => handle,
            Err(failure) => return pair_result.abort(failure, started.elapsed()),
        };
        let target_handle = match self.resolve_service(&pair.target_service).await {
            Ok(handle) => handle,
            Err(failure) => return pair_result.abort(failure, started.elapsed()),
        };
        let source_tokens = match self.resolve_tokens(&request.user_id, &pair.source_service).await {
            Ok(tokens) => tokens,
            Err(failure) => return pair_result.abort(failure, started.elapsed()),
        };
        let target_tokens = match self.resolve_tokens(&request.user_id, &pair.target_service).await {
            Ok(tokens) => tokens,
            Err(failure) => return pair_result.abort(failure, started.elapsed()),
        };

        let source = ServiceEndpoint {
            handle: source_handle,
            tokens: source_tokens,
        };
        let target = ServiceEndpoint {
            handle: target_handle,
            tokens: target_tokens,
        };

        let outcomes = match pair.sync_mode {
            SyncMode::SyncFrom => {
                vec![self.perform_directional_sync(request, &source, &target, ctx).await]
            }
            SyncMode::SyncTo => {
                vec![self.perform_directional_sync(request, &target, &source, ctx).await]
            }
            SyncMode::Bidirectional => {
                // Reverse runs even when forward failed
                let forward = self.perform_directional_sync(request, &source, &target, ctx).await;
                let reverse = self.perform_directional_sync(request, &target, &source, ctx).await;
                vec![forward, reverse]
            }
        };

        for outcome in outcomes {
            pair_result.items_synced.extend(outcome.items_synced);
            pair_result.items_failed.extend(outcome.items_failed);
            pair_result.errors.extend(outcome.errors);
        }

        let pair_result = pair_result.finish(started.elapsed());
        debug!(
            success = pair_result.success,
            synced = pair_result.items_synced.len(),
            errors = pair_result.errors.len(),
            "Service pair finished"
        );
        pair_result
    }

    /// Move items from one service to another
    ///
    /// An unsuccessful or empty fetch is not a failure. Items whose native
    /// type does not belong to the job's sync type are skipped silently.
    #[instrument(skip_all, fields(from = %from.name(), to = %to.name()))]
    pub async fn perform_directional_sync(
        &self,
        request: &SyncJobRequest,
        from: &ServiceEndpoint,
        to: &ServiceEndpoint,
        ctx: &CancellationToken,
    ) -> DirectionalOutcome {
        let mut outcome = DirectionalOutcome::default();
        let sync_type = request.sync_type;
        let from_name = from.name();
        let to_name = to.name();

        for name in [from_name, to_name] {
            if !supports_sync_type(name, sync_type) {
                outcome.errors.push(SyncFailure::new(
                    SyncErrorKind::ConfigError,
                    format!("{name} does not support {sync_type}"),
                    format!("sync:{from_name}->{to_name}"),
                ));
                return outcome;
            }
        }

        if let Err(e) = from.handle.wait_for_permit(ctx).await {
            outcome.errors.push(SyncFailure::new(
                SyncErrorKind::ServiceError,
                e.to_string(),
                format!("rate_limit:{from_name}"),
            ));
            return outcome;
        }

        let fetched = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(SyncError::Cancelled),
            response = from
                .handle
                .provider()
                .get_user_data(ctx, &from.tokens, request.options.since) => response,
        };

        let response = match fetched {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Fetching source data failed");
                outcome.errors.push(SyncFailure::new(
                    SyncErrorKind::ServiceError,
                    e.to_string(),
                    format!("fetch:{from_name}"),
                ));
                return outcome;
            }
        };

        if !response.success || response.items.is_empty() {
            debug!(
                success = response.success,
                reported_errors = response.errors.len(),
                "Nothing to sync from source"
            );
            return outcome;
        }

        let fetched_count = response.items.len();
        let mut transformed = Vec::new();
        for item in response
            .items
            .into_iter()
            .filter(|item| matches_sync_type(from_name, &item.item_type, sync_type))
        {
            match to_universal(from_name, &item.data) {
                Ok(mut universal) => {
                    universal.action = item.action;
                    universal
                        .external_ids
                        .entry(from_name.to_string())
                        .or_insert_with(|| item.external_id.clone());
                    transformed.push((item.external_id, universal));
                }
                Err(e) => outcome.errors.push(
                    SyncFailure::new(
                        SyncErrorKind::TransformError,
                        e.to_string(),
                        format!("transform:{from_name}"),
                    )
                    .with_item(item.external_id),
                ),
            }
        }

        debug!(
            fetched = fetched_count,
            transformed = transformed.len(),
            transform_errors = outcome.errors.len(),
            "Source items transformed"
        );

        if request.options.dry_run {
            return outcome;
        }

        let options = request.options.clone().with_match_threshold(
            request
                .options
                .effective_threshold(self.settings.default_match_threshold),
        );
        let delay = self.settings.item_delay;

        for (index, (source_id, item)) in transformed.into_iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {
                        outcome.errors.push(SyncFailure::new(
                            SyncErrorKind::ServiceError,
                            SyncError::Cancelled.to_string(),
                            format!("add:{to_name}"),
                        ));
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let added = tokio::select! {
                biased;
                _ = ctx.cancelled() => Err(SyncError::Cancelled),
                added = self
                    .adder
                    .add_item_to_service(ctx, to_name, &to.tokens, &item, &options) => added,
            };

            match added {
                Ok(()) => outcome.items_synced.push(item),
                Err(SyncError::Cancelled) => {
                    debug!(item = %item.display_id(), "Add interrupted by cancellation");
                    outcome.errors.push(
                        SyncFailure::new(
                            SyncErrorKind::ServiceError,
                            SyncError::Cancelled.to_string(),
                            format!("add:{to_name}"),
                        )
                        .with_item(source_id),
                    );
                    break;
                }
                Err(e) => {
                    debug!(item = %item.display_id(), error = %e, "Target rejected item");
                    outcome.errors.push(
                        SyncFailure::new(
                            SyncErrorKind::AddError,
                            e.to_string(),
                            format!("add:{to_name}"),
                        )
                        .with_item(source_id),
                    );
                    outcome.items_failed.push(item);
                }
            }
        }

        outcome
    }

    async fn resolve_service(&self, service: &str) -> Result<ServiceHandle, SyncFailure> {
        self.registry.get_service(service).await.map_err(|e| {
            SyncFailure::new(
                SyncErrorKind::ServiceError,
                e.to_string(),
                format!("resolve:{service}"),
            )
        })
    }

    async fn resolve_tokens(&self, user_id: &str, service: &str) -> Result<OAuthTokens, SyncFailure> {
        let auth_failure = |message: String| {
            SyncFailure::new(
                SyncErrorKind::AuthError,
                message,
                format!("tokens:{service}"),
            )
        };

        let user_ref =
            UserServiceRef::new(user_id, service).map_err(|e| auth_failure(e.to_string()))?;
        self.oauth
            .get_user_tokens(&user_ref)
            .await
            .map_err(|e| auth_failure(e.to_string()))
    }
}
