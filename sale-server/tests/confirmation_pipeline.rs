//! 确认流水线端到端测试
//!
//! 启动完整后台任务（确认 worker 池 + 限流清理器），覆盖：
//! 下单 → 延迟确认 → 用户通知、取消先于确认、入队失败的补偿、
//! 以及 graceful shutdown 下进行中任务跑完。

use std::time::Duration;

use sale_server::{BackgroundTasks, Config, SaleError, ServerState};
use shared::event::{SaleEvent, Topic};
use shared::models::OrderStatus;
use shared::util::now_millis;
use tokio::time::{sleep, timeout};

fn test_config(confirm_delay_ms: u64) -> Config {
    let mut config = Config::with_overrides(2, confirm_delay_ms, 64);
    config.environment = "test".into();
    config
}

/// 轮询订单状态直到到达 `want` 或超时。
async fn wait_for_status(
    state: &ServerState,
    order_id: &str,
    requester: &str,
    want: OrderStatus,
) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let order = state
            .sales
            .order(order_id, requester)
            .await
            .expect("订单应始终可查");
        if order.status == want {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_order_confirms_and_notifies() {
    let config = test_config(25);
    let state = ServerState::initialize(&config).await;
    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks);
    assert_eq!(tasks.len(), 3, "2 个 worker + 1 个清理器");
    assert_eq!(tasks.count_by_kind(), (2, 1));

    let mut inbox = state.sales.subscribe("conn-1", Topic::user("user_1"));

    let receipt = state
        .sales
        .purchase("prod_1", 2, "user_1")
        .await
        .expect("下单应成功");
    assert_eq!(receipt.status, OrderStatus::Pending);
    assert_eq!(receipt.message, "Order queued! Processing in background.");
    assert_eq!(state.sales.stock_level("prod_1").await.unwrap(), 48);

    assert!(
        wait_for_status(&state, &receipt.order_id, "user_1", OrderStatus::Confirmed).await,
        "订单应在处理延迟后确认"
    );

    let event = timeout(Duration::from_secs(2), inbox.recv())
        .await
        .expect("应收到确认通知")
        .expect("广播通道不应关闭");
    match event {
        SaleEvent::OrderNotification {
            order_id, status, ..
        } => {
            assert_eq!(order_id, receipt.order_id);
            assert_eq!(status, OrderStatus::Confirmed);
        }
        other => panic!("预期订单通知, 收到 {other:?}"),
    }

    // 确认不返还库存
    assert_eq!(state.sales.stock_level("prod_1").await.unwrap(), 48);

    tasks.shutdown().await;
    state.close_intake().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_beats_the_worker() {
    let config = test_config(100);
    let state = ServerState::initialize(&config).await;
    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks);

    let receipt = state
        .sales
        .purchase("prod_4", 1, "user_2")
        .await
        .expect("下单应成功");
    let cancel = state
        .sales
        .cancel(&receipt.order_id, "user_2", now_millis())
        .await
        .expect("窗口内取消应成功");
    assert_eq!(cancel.refunded_quantity, 1);
    assert_eq!(cancel.stock, 100);

    // 等 worker 处理完该任务: 取消已赢得状态裁决, worker 只能跳过
    sleep(Duration::from_millis(1000)).await;

    let order = state
        .sales
        .order(&receipt.order_id, "user_2")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled, "取消结果不应被推翻");
    assert_eq!(
        state.sales.stock_level("prod_4").await.unwrap(),
        100,
        "跳过的任务不应再次返还库存"
    );

    tasks.shutdown().await;
    state.close_intake().await;
}

#[tokio::test]
async fn closed_intake_rolls_back_admission() {
    let config = test_config(50);
    let state = ServerState::initialize(&config).await;
    // 不启动 worker, 直接关闭入队端
    state.close_intake().await;

    let err = state
        .sales
        .purchase("prod_5", 2, "user_3")
        .await
        .expect_err("入队失败应使下单失败");
    assert!(matches!(err, SaleError::Internal(_)));

    assert_eq!(
        state.sales.stock_level("prod_5").await.unwrap(),
        75,
        "未入队的预留应回滚"
    );
    let orders = state.sales.orders_for_user("user_3").await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_lets_in_flight_job_finish() {
    let config = test_config(300);
    let state = ServerState::initialize(&config).await;
    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks);

    let receipt = state
        .sales
        .purchase("prod_6", 1, "user_4")
        .await
        .expect("下单应成功");

    // 等 worker 领取任务
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while state.queue.depth() > 0 && tokio::time::Instant::now() < deadline {
        sleep(Duration::from_millis(10)).await;
    }

    // shutdown 等待进行中的任务跑完才返回
    tasks.shutdown().await;
    state.close_intake().await;

    let order = state
        .sales
        .order(&receipt.order_id, "user_4")
        .await
        .unwrap();
    assert_eq!(
        order.status,
        OrderStatus::Confirmed,
        "进行中的任务应跑完再停"
    );
}
