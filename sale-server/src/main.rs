use sale_server::{
    BackgroundTasks, Config, SaleError, ServerState, init_logger_with_file, print_banner,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 设置环境 (dotenv, 日志)
    dotenv::dotenv().ok();

    // 打印横幅
    print_banner();

    // 2. 加载配置
    let config = Config::from_env();
    init_logger_with_file(Some(&config.log_level), Some(&config.log_dir));

    tracing::info!("⚡ Flash Sale Server starting...");

    // 3. 初始化服务器状态 (播种目录库存)
    let state = ServerState::initialize(&config).await;

    // 4. 启动后台任务 (确认 worker 池 + 限流清理)
    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks);
    tasks.log_summary();

    state.print_ready_banner().await;

    // 5. 开发环境跑一轮抢购演练
    if config.is_development() {
        run_sale_drill(&state).await;
    }

    // 6. 等待停止信号
    tracing::info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // 7. Graceful shutdown: 取消后台任务，随后关闭队列入口
    tasks.shutdown().await;
    state.close_intake().await;

    tracing::info!("👋 Sale server stopped");
    Ok(())
}

/// 抢购演练 - 真实并发打满准入路径
///
/// 100 个用户同时抢 prod_1 (初始库存 50)。预期恰好 50 人下单成功，
/// 其余收到售罄，确认流水线在后台继续消化已下的订单。
async fn run_sale_drill(state: &ServerState) {
    const DRILL_PRODUCT: &str = "prod_1";
    const DRILL_BUYERS: usize = 100;

    tracing::info!(
        "🚀 Sale drill: {} buyers rushing {}",
        DRILL_BUYERS,
        DRILL_PRODUCT
    );

    let mut attempts = Vec::with_capacity(DRILL_BUYERS);
    for n in 1..=DRILL_BUYERS {
        let sales = state.sales.clone();
        attempts.push(tokio::spawn(async move {
            sales.purchase(DRILL_PRODUCT, 1, &format!("user_{n}")).await
        }));
    }

    let mut admitted = 0usize;
    let mut sold_out = 0usize;
    let mut rejected = 0usize;
    for attempt in attempts {
        match attempt.await {
            Ok(Ok(_)) => admitted += 1,
            Ok(Err(SaleError::OutOfStock)) => sold_out += 1,
            Ok(Err(e)) => {
                rejected += 1;
                tracing::warn!(error = %e, "Drill purchase rejected");
            }
            Err(e) => {
                rejected += 1;
                tracing::error!(error = %e, "Drill buyer task failed");
            }
        }
    }

    let remaining = state
        .sales
        .stock_level(DRILL_PRODUCT)
        .await
        .unwrap_or_default();
    tracing::info!(
        "🎯 Drill result: {} admitted, {} sold out, {} rejected, {} stock left, {} orders queued",
        admitted,
        sold_out,
        rejected,
        remaining,
        state.queue.depth()
    );
}
