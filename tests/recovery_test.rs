//! Recovery Tests - Restart over a Durable Store
//!
//! Each test stops a model mid-flight, opens a fresh model over the
//! same data directory and checks what it resumes.

mod support;

use std::sync::Arc;

use tempfile::TempDir;

use otc_pipeline::adapters::persistence::DiskStore;
use otc_pipeline::config::PipelineConfig;
use otc_pipeline::domain::order::{Order, Status};
use otc_pipeline::ports::storage::OrderStore;
use otc_pipeline::usecases::admin::AdminApi;
use otc_pipeline::usecases::model::{ActorCounts, Model, Recovery};

use support::{BTC_DROP, MockConnector, btc_order, model_with};

async fn disk(dir: &TempDir) -> Arc<dyn OrderStore> {
    Arc::new(DiskStore::open(dir.path()).await.unwrap())
}

fn funded_btc() -> MockConnector {
    let mut btc = MockConnector::new();
    btc.expect_balance().returning(|_| Ok(100_000));
    btc
}

fn paying_sky(txid: &'static str) -> MockConnector {
    let mut sky = MockConnector::new();
    sky.expect_send().times(1).returning(move |_, _| Ok(txid.to_string()));
    sky
}

async fn restart(dir: &TempDir, btc: MockConnector, sky: MockConnector) -> (Arc<Model>, Recovery) {
    let model = model_with(&PipelineConfig::default(), btc, sky, disk(dir).await);
    let report = model.recover().await.unwrap();
    (model, report)
}

#[tokio::test]
async fn test_restart_resumes_from_last_persisted_status() {
    let dir = TempDir::new().unwrap();
    let order = btc_order(BTC_DROP);
    {
        let model = model_with(
            &PipelineConfig::default(),
            funded_btc(),
            MockConnector::new(),
            disk(&dir).await,
        );
        model.add(order.clone()).await.unwrap();
        model.step().await;
        model.stop();
    }

    let (model, report) = restart(&dir, MockConnector::new(), paying_sky("tx-after-restart")).await;
    assert_eq!(report, Recovery { loaded: 1, resumed: 1 });
    assert_eq!(model.workers().holder(&order.id).await, Some("sender"));

    model.step().await;
    let resumed = model.order(&order.id).await.unwrap();
    assert_eq!(resumed.status, Status::PendingConfirm);
    assert_eq!(resumed.txid.as_deref(), Some("tx-after-restart"));

    let events = disk(&dir).await.load_events().await.unwrap();
    let statuses: Vec<Status> = events.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![Status::PendingDeposit, Status::PendingSend, Status::PendingConfirm]
    );
}

#[tokio::test]
async fn test_crash_after_send_parks_instead_of_paying_twice() {
    let dir = TempDir::new().unwrap();
    let order = btc_order(BTC_DROP);
    {
        let model = model_with(
            &PipelineConfig::default(),
            funded_btc(),
            paying_sky("tx-lost"),
            disk(&dir).await,
        );
        model.add(order.clone()).await.unwrap();
        model.step().await;
        // Pay out, then crash before the router records the txid.
        model.workers().sender.tick().await;
        model.stop();
    }

    let mut sky = MockConnector::new();
    sky.expect_send().never();
    let (model, report) = restart(&dir, MockConnector::new(), sky).await;
    assert_eq!(report.resumed, 1);

    model.step().await;
    let parked = model.order(&order.id).await.unwrap();
    assert_eq!(parked.status, Status::PendingSend);
    assert!(parked.times.send_started_at > 0);
    assert!(parked.last_error.as_deref().unwrap().contains("send outcome unknown"));
    assert_eq!(model.counts(), ActorCounts::default());

    let admin = AdminApi::new(Arc::clone(&model));
    assert_eq!(admin.parked().await.len(), 1);
}

#[tokio::test]
async fn test_finished_orders_are_loaded_but_not_resumed() {
    let dir = TempDir::new().unwrap();
    let store = disk(&dir).await;
    let mut done = btc_order("done-drop");
    done.status = Status::Done;
    let mut expired = btc_order("expired-drop");
    expired.status = Status::Expired;
    let waiting = btc_order("waiting-drop");
    for o in [&done, &expired, &waiting] {
        store.save_order(o).await.unwrap();
    }

    let (model, report) = restart(&dir, MockConnector::new(), MockConnector::new()).await;
    assert_eq!(report, Recovery { loaded: 3, resumed: 1 });
    assert_eq!(model.counts().scanner, 1);
    assert_eq!(model.orders().await.len(), 3);
    assert_eq!(model.users().await.len(), 1);
    assert_eq!(
        model.order(&Order::make_id(support::SKY_ADDR, done.drop.currency, "done-drop"))
            .await
            .unwrap()
            .status,
        Status::Done
    );
}
