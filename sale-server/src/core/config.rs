use crate::sales::SalesPolicy;

/// 服务器配置 - 抢购节点的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | ./logs | 日志目录 |
/// | ENVIRONMENT | development | 运行环境 |
/// | RATE_LIMIT_MAX | 10 | 每窗口允许的下单次数 |
/// | RATE_LIMIT_WINDOW_SECS | 60 | 限流窗口长度(秒) |
/// | MAX_QUANTITY_PER_ORDER | 10 | 单笔订单最大数量 |
/// | CANCEL_WINDOW_SECS | 300 | 下单后可取消时长(秒) |
/// | WORKER_COUNT | 4 | 确认 worker 数量 |
/// | CONFIRM_DELAY_MS | 2000 | 确认前的处理延迟(毫秒) |
/// | CONFIRM_MAX_RETRIES | 3 | 确认失败重试次数 |
/// | EVENT_CAPACITY | 256 | 每主题事件缓冲容量 |
/// | QUEUE_CAPACITY | 1024 | 确认队列容量 |
/// | SWEEP_INTERVAL_SECS | 60 | 限流窗口清理间隔(秒) |
///
/// # 示例
///
/// ```ignore
/// WORKER_COUNT=8 CONFIRM_DELAY_MS=500 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 日志级别: trace | debug | info | warn | error
    pub log_level: String,
    /// 日志文件目录
    pub log_dir: String,
    /// 运行环境: development | staging | production
    pub environment: String,

    // === 准入策略配置 ===
    /// 每用户每窗口允许的下单次数
    pub rate_limit_max: u32,
    /// 限流窗口长度（秒）
    pub rate_limit_window_secs: u64,
    /// 单笔订单最大数量（下限固定为 1）
    pub max_quantity_per_order: u32,
    /// 下单后允许取消的时长（秒）
    pub cancel_window_secs: u64,

    // === 确认流水线配置 ===
    /// 确认 worker 数量
    pub worker_count: usize,
    /// 每个任务确认前的模拟处理延迟（毫秒）
    pub confirm_delay_ms: u64,
    /// 确认失败后的重试次数
    pub confirm_max_retries: u32,
    /// 每主题广播缓冲容量
    pub event_capacity: usize,
    /// 确认队列容量（打满后快速拒绝）
    pub queue_capacity: usize,
    /// 限流器过期窗口清理间隔（秒）
    pub sweep_interval_secs: u64,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            rate_limit_max: std::env::var("RATE_LIMIT_MAX")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10),
            rate_limit_window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60),
            max_quantity_per_order: std::env::var("MAX_QUANTITY_PER_ORDER")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10),
            cancel_window_secs: std::env::var("CANCEL_WINDOW_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300),

            worker_count: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(4),
            confirm_delay_ms: std::env::var("CONFIRM_DELAY_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(2000),
            confirm_max_retries: std::env::var("CONFIRM_MAX_RETRIES")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3),
            event_capacity: std::env::var("EVENT_CAPACITY")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(256),
            queue_capacity: std::env::var("QUEUE_CAPACITY")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1024),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(worker_count: usize, confirm_delay_ms: u64, queue_capacity: usize) -> Self {
        let mut config = Self::from_env();
        config.worker_count = worker_count;
        config.confirm_delay_ms = confirm_delay_ms;
        config.queue_capacity = queue_capacity;
        config
    }

    /// 销售服务使用的策略切片
    pub fn sales_policy(&self) -> SalesPolicy {
        SalesPolicy {
            rate_limit_max: self.rate_limit_max,
            rate_limit_window_secs: self.rate_limit_window_secs,
            max_quantity_per_order: self.max_quantity_per_order,
            cancel_window_secs: self.cancel_window_secs,
        }
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
