//! Price Refresher - Exchange Polling with Internal Failover
//!
//! Each refresh fetches the exchange rate for one deposit currency. On
//! success the exchange price is stored and made active; on failure the
//! pricer falls back to the internal source. There is no retry inside a
//! refresh: the next tick is the retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::order::Currency;
use crate::domain::pricing::{Pricer, Source};
use crate::ports::rate_feed::RateFeed;
use crate::usecases::controller::{Controller, LoopMode};

pub struct PriceRefresher {
  currency: Currency,
  pricer: Arc<Pricer>,
  feed: Arc<dyn RateFeed>,
}

impl PriceRefresher {
  pub fn new(currency: Currency, pricer: Arc<Pricer>, feed: Arc<dyn RateFeed>) -> Self {
    Self {
      currency,
      pricer,
      feed,
    }
  }

  /// Fetch once and update the pricer. Returns the active source.
  pub async fn refresh(&self) -> Source {
    match self.feed.fetch_rate(self.currency).await {
      Ok(rate) if rate > 0 => {
        self.pricer.set_price(Source::Exchange, rate).await;
        self.pricer.set_source(Source::Exchange).await;
        info!(currency = %self.currency, feed = self.feed.name(), rate, "Exchange price updated");
      }
      Ok(_) => {
        warn!(currency = %self.currency, feed = self.feed.name(), "Exchange returned zero price, using internal");
        self.pricer.set_source(Source::Internal).await;
      }
      Err(e) => {
        warn!(currency = %self.currency, feed = self.feed.name(), error = %e, "Exchange price unavailable, using internal");
        self.pricer.set_source(Source::Internal).await;
      }
    }
    self.pricer.get_source().await
  }

  /// Refresh every `interval` until the controller stops. Runs while paused.
  pub fn spawn(self, controller: &Arc<Controller>, interval: Duration) -> JoinHandle<()> {
    let refresher = Arc::new(self);
    controller.spawn_loop("price_refresh", interval, LoopMode::Always, move || {
      let refresher = Arc::clone(&refresher);
      async move {
        refresher.refresh().await;
      }
    })
  }
}
