//! 抢购压力测试 - 100 个买家同时冲击有限库存
//!
//! 使用 ServerState::initialize 完整初始化，并发打满 SalesService 准入路径。
//! 不启动确认 worker：成交结果与队列深度一一对应，便于精确断言。

use std::time::Instant;

use sale_server::{Config, SaleError, ServerState};
use shared::models::OrderStatus;

const BUYERS: usize = 100;

/// 让 `BUYERS` 个已播种用户同时抢购同一商品，返回
/// (成交数, 售罄数, 其他错误数)。
async fn rush(
    state: &ServerState,
    product_id: &'static str,
    quantity: u32,
) -> (usize, usize, usize) {
    let mut handles = Vec::with_capacity(BUYERS);
    for n in 1..=BUYERS {
        let sales = state.sales.clone();
        handles.push(tokio::spawn(async move {
            sales
                .purchase(product_id, quantity, &format!("user_{n}"))
                .await
        }));
    }

    let mut admitted = 0;
    let mut sold_out = 0;
    let mut other = 0;
    for handle in handles {
        match handle.await.expect("买家任务不应 panic") {
            Ok(receipt) => {
                assert_eq!(receipt.status, OrderStatus::Pending);
                assert_eq!(receipt.quantity, quantity);
                admitted += 1;
            }
            Err(SaleError::OutOfStock) => sold_out += 1,
            Err(_) => other += 1,
        }
    }
    (admitted, sold_out, other)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_buyers_never_oversell() {
    println!();
    println!("╔═══════════════════════════════════════════════════════════════════╗");
    println!(
        "║            抢购压力测试 - {} 买家 vs 有限库存                     ║",
        BUYERS
    );
    println!("╚═══════════════════════════════════════════════════════════════════╝");

    // [1/4] 初始化完整状态 (目录 + 库存播种 + 准入链)
    println!("[1/4] 初始化 ServerState...");
    let config = Config::from_env();
    let state = ServerState::initialize(&config).await;

    // [2/4] 单件抢购: prod_1 初始库存 50
    println!("[2/4] 单件抢购 prod_1 (库存 50)...");
    let start = Instant::now();
    let (admitted, sold_out, other) = rush(&state, "prod_1", 1).await;
    println!(
        "      [{:.2?}] 成交: {}, 售罄: {}, 其他: {}",
        start.elapsed(),
        admitted,
        sold_out,
        other
    );

    assert_eq!(admitted, 50, "恰好 50 个买家成交");
    assert_eq!(sold_out, 50, "其余买家收到售罄");
    assert_eq!(other, 0, "不应出现其他错误");
    assert_eq!(
        state.sales.stock_level("prod_1").await.unwrap(),
        0,
        "库存应清零"
    );
    assert_eq!(state.queue.depth(), 50, "每笔成交入队一个确认任务");
    assert_eq!(state.orders.pending_count().await.unwrap(), 50);

    // [3/4] 多件抢购: prod_2 初始库存 30, 每单 3 件
    println!("[3/4] 多件抢购 prod_2 (库存 30, 每单 3 件)...");
    let (admitted, sold_out, other) = rush(&state, "prod_2", 3).await;
    println!(
        "      成交: {}, 售罄: {}, 其他: {}",
        admitted, sold_out, other
    );

    assert_eq!(admitted, 10, "30 件库存按每单 3 件只容纳 10 单");
    assert_eq!(sold_out, 90, "其余买家收到售罄");
    assert_eq!(other, 0);
    assert_eq!(
        state.sales.stock_level("prod_2").await.unwrap(),
        0,
        "并发补偿后不应留下碎片库存"
    );
    assert_eq!(state.queue.depth(), 60);

    // [4/4] 售罄后补货重新开卖
    println!("[4/4] 补货后重新开卖...");
    let restock = state.sales.restock("prod_1", 5).await.unwrap();
    assert_eq!(restock.new_stock, 5);

    let receipt = state.sales.purchase("prod_1", 1, "user_1").await.unwrap();
    assert_eq!(receipt.status, OrderStatus::Pending);
    assert_eq!(state.sales.stock_level("prod_1").await.unwrap(), 4);

    println!("✅ 测试通过!");
}
