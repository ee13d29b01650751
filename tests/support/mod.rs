//! Shared fixtures for the integration tests.
//!
//! Mocks, the in-memory store and the reference order come from the
//! crate's `test-support` feature; this module only adds what needs a
//! full `Model`.

#![allow(dead_code)]

use std::sync::Arc;

use otc_pipeline::config::PipelineConfig;
use otc_pipeline::domain::pricing::Pricer;
use otc_pipeline::ports::storage::OrderStore;
use otc_pipeline::usecases::controller::Controller;
use otc_pipeline::usecases::currencies::Currencies;
use otc_pipeline::usecases::model::Model;
use otc_pipeline::usecases::test_support::priced_currencies;

pub use otc_pipeline::usecases::test_support::{MemoryStore, MockConnector, order as btc_order};

pub const SKY_ADDR: &str = "2GgFvqoyk9RjwVzj8tqfcXVXB4orBwoc9qv";
pub const BTC_DROP: &str = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";

/// Registry with BTC priced at 200000 sats per SKY, plus the pricer.
pub fn currencies(btc: MockConnector, sky: MockConnector) -> (Arc<Currencies>, Arc<Pricer>) {
    let pricer = Arc::new(Pricer::with_internal(200_000));
    (priced_currencies(btc, sky, Arc::clone(&pricer)), pricer)
}

pub fn model_with(
    config: &PipelineConfig,
    btc: MockConnector,
    sky: MockConnector,
    store: Arc<dyn OrderStore>,
) -> Arc<Model> {
    let (curs, _pricer) = currencies(btc, sky);
    Arc::new(Model::new(
        config,
        curs,
        store,
        Arc::new(Controller::new(config.start_paused)),
    ))
}
