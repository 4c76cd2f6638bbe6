use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axial hex coordinate used for proximity-filtered broadcasts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

impl HexCoord {
    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Hex grid distance in cells.
    pub fn distance(&self, other: &HexCoord) -> u32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        ((dq.abs() + dr.abs() + (dq + dr).abs()) / 2) as u32
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Simulation,
    Minimap,
    Game,
}

/// Broadcast envelope pushed to subscribers. `data.type` carries the
/// specific sub-tag; proximity broadcasts add `data.distance`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GameMessage {
    #[serde(rename = "msgType")]
    pub msg_type: MessageKind,
    pub content: String,
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<HexCoord>,
}

impl GameMessage {
    pub fn simulation(sub_tag: &str, content: impl Into<String>) -> Self {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), serde_json::json!(sub_tag));
        Self {
            msg_type: MessageKind::Simulation,
            content: content.into(),
            data,
            position: None,
        }
    }

    pub fn game(sub_tag: &str, content: impl Into<String>) -> Self {
        let mut msg = Self::simulation(sub_tag, content);
        msg.msg_type = MessageKind::Game;
        msg
    }

    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn at(mut self, position: HexCoord) -> Self {
        self.position = Some(position);
        self
    }

    pub fn sub_tag(&self) -> Option<&str> {
        self.data.get("type").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_distance() {
        let a = HexCoord::new(0, 0);
        assert_eq!(a.distance(&HexCoord::new(3, 0)), 3);
        assert_eq!(a.distance(&HexCoord::new(2, -1)), 2);
        assert_eq!(a.distance(&HexCoord::new(-2, 2)), 2);
        assert_eq!(a.distance(&a), 0);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let msg = GameMessage::simulation("year_tick", "year 100")
            .with_data("year", serde_json::json!(100));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["msgType"], "simulation");
        assert_eq!(json["data"]["type"], "year_tick");
        assert!(json.get("position").is_none());
    }
}
