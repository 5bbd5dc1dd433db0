use std::collections::BTreeMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Currency name -> price for a single round.
pub type PriceSnapshot = BTreeMap<String, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Load,
    Update,
    StreamStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Chart,
    News,
}

/// Round-indexed payload. Serializes as a JSON object whose keys are the
/// round numbers as strings, in ascending round order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoundMap<T>(Vec<(usize, T)>);

impl<T> RoundMap<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(round: usize, value: T) -> Self {
        Self(vec![(round, value)])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, round: usize) -> Option<&T> {
        self.0.iter().find(|(r, _)| *r == round).map(|(_, v)| v)
    }

    pub fn rounds(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().map(|(r, _)| *r)
    }
}

impl<T> FromIterator<(usize, T)> for RoundMap<T> {
    fn from_iter<I: IntoIterator<Item = (usize, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Serialize> Serialize for RoundMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (round, value) in &self.0 {
            map.serialize_entry(&round.to_string(), value)?;
        }
        map.end()
    }
}

pub type ChartPayload = RoundMap<PriceSnapshot>;
pub type NewsPayload = RoundMap<Vec<String>>;

/// A state change or lifecycle signal pushed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Full replay of chart rounds up to the current chart cursor.
    ChartLoad(ChartPayload),
    /// Full replay of news rounds up to the current news cursor.
    NewsLoad(NewsPayload),
    ChartUpdate(ChartPayload),
    NewsUpdate(NewsPayload),
    /// Terminal signal: listeners end their stream on receipt.
    StreamStop,
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum WirePayload<'a> {
    Chart(&'a ChartPayload),
    News(&'a NewsPayload),
}

#[derive(serde::Serialize)]
struct WireEvent<'a> {
    data: Option<WirePayload<'a>>,
    event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_type: Option<DataType>,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::ChartLoad(_) | Event::NewsLoad(_) => EventType::Load,
            Event::ChartUpdate(_) | Event::NewsUpdate(_) => EventType::Update,
            Event::StreamStop => EventType::StreamStop,
        }
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Event::ChartLoad(_) | Event::ChartUpdate(_) => Some(DataType::Chart),
            Event::NewsLoad(_) | Event::NewsUpdate(_) => Some(DataType::News),
            Event::StreamStop => None,
        }
    }

    pub fn is_stream_stop(&self) -> bool {
        matches!(self, Event::StreamStop)
    }

    fn wire_payload(&self) -> Option<WirePayload<'_>> {
        match self {
            Event::ChartLoad(data) | Event::ChartUpdate(data) => Some(WirePayload::Chart(data)),
            Event::NewsLoad(data) | Event::NewsUpdate(data) => Some(WirePayload::News(data)),
            Event::StreamStop => None,
        }
    }

    /// Serialize to the wire form `{data, event_type[, data_type]}`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireEvent {
            data: self.wire_payload(),
            event_type: self.event_type(),
            data_type: self.data_type(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn snapshot(pairs: &[(&str, u64)]) -> PriceSnapshot {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_chart_update_wire_format() {
        let event = Event::ChartUpdate(RoundMap::single(3, snapshot(&[("Apple", 120), ("Google", 80)])));
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value, json!({
            "data": {"3": {"Apple": 120, "Google": 80}},
            "event_type": "update",
            "data_type": "chart"
        }));
    }

    #[test]
    fn test_news_load_keeps_round_order() {
        let payload: NewsPayload = (0..12).map(|i| (i, vec![format!("headline {}", i)])).collect();
        let json = Event::NewsLoad(payload).to_json().unwrap();

        // "10" must come after "9", not after "1"
        let pos_9 = json.find("\"9\"").unwrap();
        let pos_10 = json.find("\"10\"").unwrap();
        assert!(pos_9 < pos_10);
        assert!(json.contains("\"event_type\":\"load\""));
        assert!(json.contains("\"data_type\":\"news\""));
    }

    #[test]
    fn test_stream_stop_has_no_data_type() {
        let value: Value = serde_json::from_str(&Event::StreamStop.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"data": null, "event_type": "stream_stop"}));
    }

    #[test]
    fn test_event_tags() {
        let load = Event::ChartLoad(RoundMap::new());
        assert_eq!(load.event_type(), EventType::Load);
        assert_eq!(load.data_type(), Some(DataType::Chart));
        assert!(!load.is_stream_stop());

        let news = Event::NewsUpdate(RoundMap::new());
        assert_eq!(news.event_type(), EventType::Update);
        assert_eq!(news.data_type(), Some(DataType::News));

        assert!(Event::StreamStop.is_stream_stop());
        assert_eq!(Event::StreamStop.data_type(), None);
    }

    #[test]
    fn test_round_map_lookup() {
        let map: RoundMap<u32> = vec![(0, 10), (1, 20)].into_iter().collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(1), Some(&20));
        assert_eq!(map.get(5), None);
        assert_eq!(map.rounds().collect::<Vec<_>>(), vec![0, 1]);
    }
}
