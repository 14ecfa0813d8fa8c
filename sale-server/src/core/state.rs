use std::sync::Arc;
use std::time::Duration;

use shared::util::now_millis;

use crate::broadcast::{EventBroadcaster, SubscriptionRegistry};
use crate::cache::InMemoryCache;
use crate::catalog::{CachedCatalog, InMemoryCatalog, ProductDirectory};
use crate::core::config::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::orders::{InMemoryOrderStore, OrderLedger};
use crate::pricing::charged_unit_price;
use crate::queue::{InMemoryJobQueue, JobQueue};
use crate::ratelimit::RateLimiter;
use crate::sales::SalesService;
use crate::stock::{InMemoryCounterStore, StockLedger};
use crate::users::InMemoryUserDirectory;
use crate::utils::retry::RetryPolicy;
use crate::worker::ConfirmationWorker;

/// 商品缓存条目的存活时间（秒）
const PRODUCT_CACHE_TTL_SECS: u64 = 60;

/// 服务器状态 - 持有所有服务的单例引用
///
/// ServerState 是抢购节点的核心数据结构，持有所有服务的共享引用。
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | broadcaster | Arc<EventBroadcaster> | 按主题事件广播 |
/// | registry | Arc<SubscriptionRegistry> | 连接订阅管理 |
/// | catalog | Arc<CachedCatalog> | 商品目录 (带缓存) |
/// | stock | Arc<StockLedger> | 库存计数与预留 |
/// | limiter | Arc<RateLimiter> | 固定窗口限流 |
/// | orders | Arc<OrderLedger> | 订单状态机 |
/// | queue | Arc<dyn JobQueue> | 确认任务队列 |
/// | sales | Arc<SalesService> | 销售准入编排 |
///
/// # 使用示例
///
/// ```ignore
/// let state = ServerState::initialize(&config).await;
///
/// // 下单
/// let receipt = state.sales().purchase("prod_1", 1, "user_1").await?;
///
/// // 查询库存
/// let level = state.sales().stock_level("prod_1").await?;
/// ```
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 按主题事件广播
    pub broadcaster: Arc<EventBroadcaster>,
    /// 连接订阅管理
    pub registry: Arc<SubscriptionRegistry>,
    /// 商品目录 (缓存装饰层)
    pub catalog: Arc<CachedCatalog>,
    /// 库存计数与预留
    pub stock: Arc<StockLedger>,
    /// 固定窗口限流器
    pub limiter: Arc<RateLimiter>,
    /// 订单状态机
    pub orders: Arc<OrderLedger>,
    /// 确认任务队列
    pub queue: Arc<dyn JobQueue>,
    /// 销售准入编排
    pub sales: Arc<SalesService>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 广播层 (EventBroadcaster, SubscriptionRegistry)
    /// 2. 库存 (CounterStore + StockLedger) 并按目录初始库存播种
    /// 3. 订单、限流、确认队列
    /// 4. 目录 (内存目录 + 缓存装饰) 与用户目录
    /// 5. SalesService 编排层
    ///
    /// # Panics
    ///
    /// 初始库存播种失败时 panic
    pub async fn initialize(config: &Config) -> Self {
        // 1. Broadcast layer
        let broadcaster = Arc::new(EventBroadcaster::new(config.event_capacity));
        let registry = Arc::new(SubscriptionRegistry::new(broadcaster.clone()));

        // 2. Stock counters, seeded from the demo catalog
        let counters = Arc::new(InMemoryCounterStore::new());
        let stock = Arc::new(StockLedger::new(counters, broadcaster.clone()));

        // 3. Orders, rate limiting, confirmation queue
        let order_store = Arc::new(InMemoryOrderStore::new());
        let orders = Arc::new(OrderLedger::new(order_store, config.cancel_window_secs));
        let limiter = Arc::new(RateLimiter::new());
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new(config.queue_capacity));

        // 4. Catalog behind a read-through cache, plus the user directory
        let directory: Arc<dyn ProductDirectory> = Arc::new(InMemoryCatalog::seed_demo());
        let cache = Arc::new(InMemoryCache::new());
        let catalog = Arc::new(CachedCatalog::new(
            directory,
            cache,
            PRODUCT_CACHE_TTL_SECS,
        ));
        let users = Arc::new(InMemoryUserDirectory::seed_demo());

        // 5. Sales orchestration
        let sales = Arc::new(SalesService::new(
            users,
            catalog.clone(),
            stock.clone(),
            orders.clone(),
            limiter.clone(),
            queue.clone(),
            registry.clone(),
            broadcaster.clone(),
            config.sales_policy(),
        ));

        let state = Self {
            config: config.clone(),
            broadcaster,
            registry,
            catalog,
            stock,
            limiter,
            orders,
            queue,
            sales,
        };

        state.seed_stock().await;
        state
    }

    /// 按目录初始库存播种计数器
    ///
    /// 每个商品一个计数器，key 为 `stock:{product_id}`。
    async fn seed_stock(&self) {
        let products = self.catalog.all().await;
        for product in &products {
            self.stock
                .seed(&product.id, product.initial_stock)
                .await
                .expect("Failed to seed initial stock");
        }
        tracing::info!("📦 Seeded stock for {} products", products.len());
    }

    /// 启动后台任务
    ///
    /// 必须在接收流量之前调用
    ///
    /// 启动的任务：
    /// - 确认 worker 池 (`worker_count` 个，消费确认队列)
    /// - 限流窗口清理器 (每 `sweep_interval_secs` 秒)
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let confirm_delay = Duration::from_millis(self.config.confirm_delay_ms);
        let retry = RetryPolicy::with_max_retries(self.config.confirm_max_retries);

        for worker_id in 0..self.config.worker_count {
            let worker = ConfirmationWorker::new(
                self.queue.clone(),
                self.orders.clone(),
                self.stock.clone(),
                self.broadcaster.clone(),
                confirm_delay,
                retry.clone(),
                tasks.shutdown_token(),
            );
            tasks.spawn(
                format!("confirmation_worker_{worker_id}"),
                TaskKind::Worker,
                worker.run(worker_id),
            );
        }

        let limiter = self.limiter.clone();
        let sweep_interval = Duration::from_secs(self.config.sweep_interval_secs);
        let token = tasks.shutdown_token();
        tasks.spawn("ratelimit_sweeper", TaskKind::Periodic, async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let swept = limiter.sweep(now_millis());
                        if swept > 0 {
                            tracing::debug!(swept, "Expired rate-limit windows removed");
                        }
                    }
                }
            }
        });
    }

    /// 停止接收新任务
    ///
    /// 关闭确认队列的入队端。已在排队的任务被丢弃，
    /// 进行中的任务由 worker 跑完。
    pub async fn close_intake(&self) {
        self.queue.close().await;
    }

    /// 获取销售服务
    pub fn sales(&self) -> &Arc<SalesService> {
        &self.sales
    }

    /// 获取订阅管理器
    pub fn subscription_registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// 打印就绪横幅 (日志)
    ///
    /// 列出在售商品、生效单价与初始库存，便于启动时目视核对。
    pub async fn print_ready_banner(&self) {
        tracing::info!(
            "╔══════════════════════════════════════════════════════════════════════╗"
        );
        tracing::info!(
            "║                      FLASH SALE SERVER - READY                       ║"
        );
        tracing::info!(
            "╚══════════════════════════════════════════════════════════════════════╝"
        );
        for product in self.catalog.all().await {
            let charged = charged_unit_price(&product).unwrap_or(product.price);
            let tag = if product.flash_sale { "⚡" } else { "  " };
            tracing::info!(
                "  {} {:<10} {:<32} {:>8} -> {:>8}  x{}",
                tag,
                product.id,
                product.name,
                product.price,
                charged,
                product.initial_stock
            );
        }
        tracing::info!("  Environment  : {}", self.config.environment);
        tracing::info!("  Workers      : {}", self.config.worker_count);
        tracing::info!(
            "  Rate limit   : {} req / {}s per user",
            self.config.rate_limit_max,
            self.config.rate_limit_window_secs
        );
        tracing::info!(
            "════════════════════════════════════════════════════════════════════════"
        );
    }
}
