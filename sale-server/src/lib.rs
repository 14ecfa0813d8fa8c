//! Sale Server - 高并发抢购准入节点
//!
//! # 架构概述
//!
//! 本模块是 Sale Server 的主入口，提供以下核心功能：
//!
//! - **销售准入** (`sales`): 限流、校验、库存预留、下单的编排层
//! - **库存账本** (`stock`): 原子计数器上的预留/释放协议
//! - **订单状态机** (`orders`): pending → confirmed/cancelled/failed 的 CAS 裁决
//! - **确认流水线** (`queue` + `worker`): 异步确认与失败补偿
//! - **事件广播** (`broadcast`): 按主题推送库存与订单通知
//!
//! # 模块结构
//!
//! ```text
//! sale-server/src/
//! ├── core/       # 配置、状态、后台任务
//! ├── broadcast/  # 按主题事件广播与订阅管理
//! ├── cache/      # TTL 缓存
//! ├── catalog/    # 商品目录 (内存 + 缓存装饰)
//! ├── users/      # 用户目录
//! ├── stock/      # 库存计数与预留协议
//! ├── ratelimit/  # 固定窗口限流
//! ├── orders/     # 订单存储与状态机
//! ├── pricing/    # 抢购定价
//! ├── queue/      # 确认任务队列
//! ├── worker/     # 确认 worker 池
//! ├── sales/      # 销售准入编排
//! └── utils/      # 日志、重试
//! ```

pub mod broadcast;
pub mod cache;
pub mod catalog;
pub mod core;
pub mod orders;
pub mod pricing;
pub mod queue;
pub mod ratelimit;
pub mod sales;
pub mod stock;
pub mod users;
pub mod utils;
pub mod worker;

// Re-export 公共类型
pub use core::{BackgroundTasks, Config, ServerState, TaskKind};
pub use orders::{LedgerError, OrderLedger, OrderStore};
pub use queue::{ConfirmationJob, JobQueue};
pub use sales::{SaleError, SaleResult, SalesService};
pub use stock::{StockError, StockLedger};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    ______ __               __
   / ____// /____ _ _____ / /_
  / /_   / // __ `// ___// __ \
 / __/  / // /_/ /(__  )/ / / /
/_/    /_/ \__,_//____//_/ /_/
   _____        __
  / ___/____ _ / /___
  \__ \/ __ `// // _ \
 ___/ / /_/ // //  __/
/____/\__,_//_/ \___/
    "#
    );
}
