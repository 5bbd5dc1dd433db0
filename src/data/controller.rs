use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use uuid::Uuid;
use log::{info, warn};

use crate::data::events::{ChartPayload, Event, NewsPayload, PriceSnapshot};
use crate::data::loader::LoadError;
use crate::data::market::StockMarket;
use crate::data::pubsub::Publisher;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Round number must be non-negative")]
    NegativeRound,
    #[error("Round {round} exceeds available data (max: {max})")]
    InvalidRound { round: usize, max: usize },
    #[error("Chart data must contain all currencies: missing {}", .0.join(", "))]
    MissingCurrencies(Vec<String>),
    #[error("All prices must be non-negative numbers ({currency} = {price})")]
    NegativePrice { currency: String, price: i64 },
    #[error("Market state lock poisoned")]
    LockPoisoned,
    #[error("Failed to reload round data: {0}")]
    Load(#[from] LoadError),
}

/// Admin view of the current and upcoming rounds.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub current_prices: ChartPayload,
    pub current_news: NewsPayload,
    pub current_round_number: usize,
    pub current_news_round: Option<usize>,
    pub next_prices: PriceSnapshot,
    pub next_news: Vec<String>,
    pub available_currencies: Vec<String>,
    pub total_rounds: usize,
    pub subscribers: usize,
}

/// Drives the market cursors and publishes every transition.
pub struct MarketController {
    market: RwLock<StockMarket>,
    publisher: Arc<Publisher>,
}

impl MarketController {
    pub fn new(market: StockMarket, publisher: Arc<Publisher>) -> Self {
        Self {
            market: RwLock::new(market),
            publisher,
        }
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StockMarket>, ControlError> {
        self.market.read().map_err(|_| ControlError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StockMarket>, ControlError> {
        self.market.write().map_err(|_| ControlError::LockPoisoned)
    }

    fn round_index(round: i64, len: usize) -> Result<usize, ControlError> {
        let round = usize::try_from(round).map_err(|_| ControlError::NegativeRound)?;
        if round >= len {
            return Err(ControlError::InvalidRound { round, max: len.saturating_sub(1) });
        }
        Ok(round)
    }

    fn load_events(market: &StockMarket) -> (Event, Event) {
        (
            Event::ChartLoad(market.chart_until_current()),
            Event::NewsLoad(market.news_until_current()),
        )
    }

    /// Advance the chart one round and broadcast it. `Ok(false)` at the last round.
    pub async fn next_round(&self) -> Result<bool, ControlError> {
        let event = {
            let mut market = self.write()?;
            if !market.next_chart_step() {
                return Ok(false);
            }
            info!("Advanced chart to round {}", market.current_step_chart());
            Event::ChartUpdate(market.current_chart_data())
        };

        self.publisher.notify(event).await;
        Ok(true)
    }

    /// Reveal the next round's news and broadcast it. `Ok(false)` when the
    /// news would catch up with the chart or no rounds remain.
    pub async fn publish_news(&self) -> Result<bool, ControlError> {
        let event = {
            let mut market = self.write()?;
            if !market.next_news_step() {
                return Ok(false);
            }
            match (market.current_step_news(), market.current_news_data()) {
                (Some(step), Some(news)) => {
                    info!("Published news for round {}", step);
                    Event::NewsUpdate(news)
                }
                _ => return Ok(false),
            }
        };

        self.publisher.notify(event).await;
        Ok(true)
    }

    /// Replay everything revealed so far to a single newly joined subscriber.
    pub async fn catch_up(&self, uid: Uuid) -> Result<(), ControlError> {
        let (chart, news) = Self::load_events(&*self.read()?);

        if !self.publisher.notify_by_uid(uid, chart).await {
            warn!("Chart catch-up not delivered to subscriber {}", uid);
        }
        if !self.publisher.notify_by_uid(uid, news).await {
            warn!("News catch-up not delivered to subscriber {}", uid);
        }
        Ok(())
    }

    /// Replay everything revealed so far to every subscriber.
    pub async fn publish_loads_all(&self) -> Result<(), ControlError> {
        let (chart, news) = Self::load_events(&*self.read()?);
        self.publisher.notify(chart).await;
        self.publisher.notify(news).await;
        Ok(())
    }

    /// Replace a round's prices and/or news, then re-broadcast the full state.
    pub async fn edit_round(
        &self,
        round: i64,
        chart: Option<BTreeMap<String, i64>>,
        news: Option<Vec<String>>,
    ) -> Result<usize, ControlError> {
        let round = {
            let mut market = self.write()?;
            let round = Self::round_index(round, market.len())?;

            // an empty mapping leaves the prices untouched
            let snapshot = match chart {
                Some(chart) if !chart.is_empty() => Some(Self::validate_chart(&market.currencies(), chart)?),
                _ => None,
            };

            if let Some(snapshot) = snapshot {
                market.update_step_data(round, snapshot);
            }
            if let Some(news) = news {
                market.update_step_news(round, news);
            }
            info!("Round {} edited", round);
            round
        };

        self.publish_loads_all().await?;
        Ok(round)
    }

    fn validate_chart(currencies: &[String], chart: BTreeMap<String, i64>) -> Result<PriceSnapshot, ControlError> {
        let missing: Vec<String> = currencies.iter()
            .filter(|currency| !chart.contains_key(*currency))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ControlError::MissingCurrencies(missing));
        }

        chart.into_iter()
            .map(|(currency, price)| match u64::try_from(price) {
                Ok(price) => Ok((currency, price)),
                Err(_) => Err(ControlError::NegativePrice { currency, price }),
            })
            .collect()
    }

    /// Jump the chart to `step` with news revealed up to the round before it.
    pub async fn go_to_step(&self, step: i64) -> Result<usize, ControlError> {
        let step = {
            let mut market = self.write()?;
            let step = Self::round_index(step, market.len())?;
            market.set_chart_step(step);
            if step > 0 {
                market.set_news_step(step - 1);
            }
            info!("Jumped to round {}", step);
            step
        };

        self.publish_loads_all().await?;
        Ok(step)
    }

    /// End the game: every listener's stream terminates.
    pub async fn finish_game(&self) -> usize {
        info!("Finishing game for {} subscribers", self.publisher.subscriber_count());
        self.publisher.notify(Event::StreamStop).await
    }

    /// Reload rounds from the source, rewind, and re-broadcast the initial state.
    pub async fn reset(&self) -> Result<(), ControlError> {
        self.write()?.reset()?;
        self.publish_loads_all().await
    }

    pub fn service_info(&self) -> Result<ServiceInfo, ControlError> {
        let market = self.read()?;
        let chart_step = market.current_step_chart();
        let next_news_step = market.current_step_news().map_or(0, |step| step + 1);

        Ok(ServiceInfo {
            current_prices: market.current_chart_data(),
            current_news: market.current_news_data().unwrap_or_default(),
            current_round_number: chart_step,
            current_news_round: market.current_step_news(),
            next_prices: market.step_data(chart_step + 1).cloned().unwrap_or_default(),
            next_news: market.step_news(next_news_step).map(<[String]>::to_vec).unwrap_or_default(),
            available_currencies: market.currencies(),
            total_rounds: market.len(),
            subscribers: self.publisher.subscriber_count(),
        })
    }
}
