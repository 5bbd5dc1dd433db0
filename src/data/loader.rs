use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use serde_json::Value;
use log::info;

use crate::data::events::PriceSnapshot;

/// One scripted round: the price snapshot and the news revealed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub chart: PriceSnapshot,
    pub news: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("data file not found: {path}")]
    NotFound { path: String },
    #[error("failed to read data file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed round data: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("round data must be a JSON object keyed by round number")]
    NotAnObject,
    #[error("round data contains no rounds")]
    Empty,
    #[error("round {index} is missing (round keys must run from 0 without gaps)")]
    MissingRound { index: usize },
    #[error("round {round} is missing key '{key}'")]
    MissingKey { round: usize, key: &'static str },
    #[error("round {round} has invalid {field}: {detail}")]
    InvalidValue {
        round: usize,
        field: &'static str,
        detail: String,
    },
}

pub struct DataLoader;

impl DataLoader {
    pub fn load_rounds(path: impl AsRef<Path>) -> Result<Vec<Round>, LoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LoadError::NotFound { path: path.display().to_string() },
            _ => LoadError::Io { path: path.display().to_string(), source: e },
        })?;

        let rounds = Self::parse_rounds(&content)?;
        info!("Successfully loaded {} rounds from {}", rounds.len(), path.display());
        Ok(rounds)
    }

    /// Parse `{"0": {"chart": {..}, "news": [..] | null}, "1": ..}`.
    pub fn parse_rounds(content: &str) -> Result<Vec<Round>, LoadError> {
        let value: Value = serde_json::from_str(content)?;
        let rounds = value.as_object().ok_or(LoadError::NotAnObject)?;

        if rounds.is_empty() {
            return Err(LoadError::Empty);
        }

        (0..rounds.len())
            .map(|index| {
                let round = rounds.get(&index.to_string())
                    .ok_or(LoadError::MissingRound { index })?;
                Self::parse_round(index, round)
            })
            .collect()
    }

    fn parse_round(index: usize, value: &Value) -> Result<Round, LoadError> {
        let fields = value.as_object().ok_or_else(|| LoadError::InvalidValue {
            round: index,
            field: "round",
            detail: "expected an object with 'chart' and 'news'".to_string(),
        })?;

        let chart = fields.get("chart")
            .ok_or(LoadError::MissingKey { round: index, key: "chart" })?;
        let chart: PriceSnapshot = serde_json::from_value(chart.clone())
            .map_err(|e| LoadError::InvalidValue { round: index, field: "chart", detail: e.to_string() })?;

        let news = match fields.get("news") {
            None => return Err(LoadError::MissingKey { round: index, key: "news" }),
            Some(Value::Null) => Vec::new(),
            Some(news) => serde_json::from_value(news.clone())
                .map_err(|e| LoadError::InvalidValue { round: index, field: "news", detail: e.to_string() })?,
        };

        Ok(Round { chart, news })
    }
}
