use crate::cache::{CACHE_KEY, CacheStore, FastTier, FileTier, MemoryTier, RedisTier, TIER_TIMEOUT};
use crate::cli::ServiceName;
use crate::config::Config;
use crate::refresh::{RefreshOutcome, RefreshPipeline, RefreshScheduler, RefreshSettings};
use crate::services::manager::ServiceManager;
use crate::services::scheduler::SchedulerService;
use crate::services::web::WebService;
use crate::source::WarehouseSource;
use crate::state::AppState;
use crate::utils::fmt_duration;
use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    db_pool: sqlx::PgPool,
    app_state: AppState,
    scheduler: Arc<RefreshScheduler>,
    service_manager: ServiceManager,
}

impl App {
    /// Wire up the warehouse pool, cache tiers and refresh pipeline.
    ///
    /// Only configuration problems are fatal here. The pool connects lazily,
    /// so a warehouse that is down at startup just degrades the first refresh.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let connect_options = PgConnectOptions::from_str(&config.warehouse_url)
            .context("Failed to parse WAREHOUSE_URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(5));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_timeout(config.fetch_timeout)
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_lazy_with(connect_options);

        info!(
            max_connections = 4,
            acquire_timeout = fmt_duration(config.fetch_timeout),
            stats_table = %config.stats_table,
            country_table = %config.country_table,
            "warehouse pool configured"
        );

        let source = WarehouseSource::new(
            db_pool.clone(),
            config.stats_table.clone(),
            config.country_table.clone(),
        );

        let fast = Self::fast_tier(config.redis_url.as_deref()).await;
        let durable = FileTier::new(config.cache_file.clone());
        let store = CacheStore::new(fast, durable, config.cache_ttl);
        info!(
            fast_tier = store.fast_backend(),
            durable_path = %store.durable_path().display(),
            ttl = fmt_duration(config.cache_ttl),
            "cache store ready"
        );

        let settings = RefreshSettings {
            fetch_timeout: config.fetch_timeout,
            excluded_countries: config.excluded_countries.clone(),
            on_total_failure: config.total_failure_policy,
        };
        let pipeline = Arc::new(RefreshPipeline::new(Arc::new(source), store, settings));

        let app_state = AppState::new(pipeline.clone(), &config.app_env, config.health_window)
            .with_admin_token(config.admin_token.clone());

        let scheduler = Arc::new(RefreshScheduler::new(
            pipeline,
            config.refresh_interval,
            app_state.refresh_trigger.clone(),
        ));

        Ok(App {
            config,
            db_pool,
            app_state,
            scheduler,
            service_manager: ServiceManager::new(),
        })
    }

    /// Redis when configured and reachable, otherwise process memory.
    async fn fast_tier(redis_url: Option<&str>) -> Arc<dyn FastTier> {
        let Some(url) = redis_url.filter(|u| !u.is_empty()) else {
            return Arc::new(MemoryTier::new());
        };

        match tokio::time::timeout(TIER_TIMEOUT, RedisTier::connect(url, CACHE_KEY)).await {
            Ok(Ok(tier)) => Arc::new(tier),
            Ok(Err(e)) => {
                warn!(error = ?e, "Failed to connect to Redis, using in-memory fast tier");
                Arc::new(MemoryTier::new())
            }
            Err(_) => {
                warn!(
                    timeout = fmt_duration(TIER_TIMEOUT),
                    "Redis connect timed out, using in-memory fast tier"
                );
                Arc::new(MemoryTier::new())
            }
        }
    }

    /// Run one synchronous refresh so the cache is populated before serving.
    pub async fn warm_up(&self) -> RefreshOutcome {
        self.scheduler.warm_up().await
    }

    /// Setup and register services based on enabled service list
    pub fn setup_services(&mut self, services: &[ServiceName]) -> Result<(), anyhow::Error> {
        if services.contains(&ServiceName::Web) {
            let web_service = Box::new(WebService::new(self.config.port, self.app_state.clone()));
            self.service_manager
                .register_service(ServiceName::Web.as_str(), web_service);
        }

        if services.contains(&ServiceName::Scheduler) {
            let scheduler_service = Box::new(SchedulerService::new(
                self.scheduler.clone(),
                self.app_state.service_statuses.clone(),
            ));
            self.service_manager
                .register_service(ServiceName::Scheduler.as_str(), scheduler_service);
        }

        if !self.service_manager.has_services() {
            error!("No services enabled. Cannot start application.");
            return Err(anyhow::anyhow!("No services enabled"));
        }

        Ok(())
    }

    /// Start all registered services
    pub fn start_services(&mut self) {
        self.service_manager.spawn_all();
    }

    /// Run the application and handle shutdown signals
    pub async fn run(self) -> ExitCode {
        use crate::services::signals::handle_shutdown_signals;
        let exit_code =
            handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await;
        self.db_pool.close().await;
        exit_code
    }

    /// Release the warehouse pool without starting any services.
    pub async fn close(self) {
        self.db_pool.close().await;
    }
}
