use std::path::PathBuf;
use log::{info, warn};

use crate::data::events::{ChartPayload, NewsPayload, PriceSnapshot, RoundMap};
use crate::data::loader::{DataLoader, LoadError, Round};

/// Where the scripted rounds come from; consulted at startup and on reset.
pub trait RoundSource: Send + Sync {
    fn load(&self) -> Result<Vec<Round>, LoadError>;
}

pub struct DataFile(pub PathBuf);

impl RoundSource for DataFile {
    fn load(&self) -> Result<Vec<Round>, LoadError> {
        DataLoader::load_rounds(&self.0)
    }
}

impl RoundSource for Vec<Round> {
    fn load(&self) -> Result<Vec<Round>, LoadError> {
        if self.is_empty() {
            return Err(LoadError::Empty);
        }
        Ok(self.clone())
    }
}

/// Scripted rounds plus the chart and news cursors.
///
/// The news cursor always lags the chart cursor: `news < chart`, with `None`
/// meaning no news has been revealed yet.
pub struct StockMarket {
    source: Box<dyn RoundSource>,
    rounds: Vec<Round>,
    current_step_chart: usize,
    current_step_news: Option<usize>,
}

impl StockMarket {
    pub fn new(source: Box<dyn RoundSource>) -> Result<Self, LoadError> {
        let rounds = source.load()?;
        if rounds.is_empty() {
            return Err(LoadError::Empty);
        }

        Ok(Self {
            source,
            rounds,
            current_step_chart: 0,
            current_step_news: None,
        })
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn current_step_chart(&self) -> usize {
        self.current_step_chart
    }

    pub fn current_step_news(&self) -> Option<usize> {
        self.current_step_news
    }

    /// Currencies every chart edit must cover, taken from round 0.
    pub fn currencies(&self) -> Vec<String> {
        self.rounds.first()
            .map(|round| round.chart.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn clamp_news(&mut self) {
        if let Some(news) = self.current_step_news {
            if news >= self.current_step_chart {
                self.current_step_news = self.current_step_chart.checked_sub(1);
            }
        }
    }

    pub fn set_chart_step(&mut self, step: usize) -> bool {
        if step >= self.rounds.len() {
            warn!("Rejected chart step {}: only {} rounds", step, self.rounds.len());
            return false;
        }
        self.current_step_chart = step;
        self.clamp_news();
        true
    }

    pub fn set_news_step(&mut self, step: usize) -> bool {
        if step >= self.rounds.len() || step + 1 > self.current_step_chart {
            warn!("Rejected news step {}: chart is at round {}", step, self.current_step_chart);
            return false;
        }
        self.current_step_news = Some(step);
        true
    }

    pub fn next_chart_step(&mut self) -> bool {
        if self.current_step_chart + 1 >= self.rounds.len() {
            warn!("Chart already at last round {}", self.current_step_chart);
            return false;
        }
        self.current_step_chart += 1;
        self.clamp_news();
        true
    }

    pub fn next_news_step(&mut self) -> bool {
        let next = self.current_step_news.map_or(0, |news| news + 1);
        self.set_news_step(next)
    }

    pub fn update_step_data(&mut self, step: usize, snapshot: PriceSnapshot) -> bool {
        match self.rounds.get_mut(step) {
            Some(round) => {
                round.chart = snapshot;
                true
            }
            None => {
                warn!("Cannot update chart for round {}: out of range", step);
                false
            }
        }
    }

    pub fn update_step_news(&mut self, step: usize, news: Vec<String>) -> bool {
        match self.rounds.get_mut(step) {
            Some(round) => {
                round.news = news;
                true
            }
            None => {
                warn!("Cannot update news for round {}: out of range", step);
                false
            }
        }
    }

    /// Reload rounds from the source and rewind both cursors. On a load
    /// failure the current state is left untouched.
    pub fn reset(&mut self) -> Result<(), LoadError> {
        let rounds = self.source.load()?;
        if rounds.is_empty() {
            return Err(LoadError::Empty);
        }
        self.rounds = rounds;
        self.current_step_chart = 0;
        self.current_step_news = None;
        info!("Market reset with {} rounds", self.rounds.len());
        Ok(())
    }

    pub fn step_data(&self, step: usize) -> Option<&PriceSnapshot> {
        self.rounds.get(step).map(|round| &round.chart)
    }

    pub fn step_news(&self, step: usize) -> Option<&[String]> {
        self.rounds.get(step).map(|round| round.news.as_slice())
    }

    pub fn current_chart_data(&self) -> ChartPayload {
        let step = self.current_step_chart;
        RoundMap::single(step, self.rounds[step].chart.clone())
    }

    pub fn chart_until_current(&self) -> ChartPayload {
        self.rounds[..=self.current_step_chart].iter()
            .enumerate()
            .map(|(i, round)| (i, round.chart.clone()))
            .collect()
    }

    pub fn current_news_data(&self) -> Option<NewsPayload> {
        self.current_step_news
            .map(|step| RoundMap::single(step, self.rounds[step].news.clone()))
    }

    pub fn news_until_current(&self) -> NewsPayload {
        match self.current_step_news {
            Some(step) => self.rounds[..=step].iter()
                .enumerate()
                .map(|(i, round)| (i, round.news.clone()))
                .collect(),
            None => RoundMap::new(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_rounds(count: usize) -> Vec<Round> {
    (0..count)
        .map(|i| Round {
            chart: [("Apple".to_string(), 100 + i as u64), ("Google".to_string(), 200 - i as u64)]
                .into_iter()
                .collect(),
            news: vec![format!("news for round {}", i)],
        })
        .collect()
}
