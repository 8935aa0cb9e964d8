//! Synthetic vehicle records for `serve`.
use livecursor::{Geometry, GraphObject, Point, Record, Value};
use livecursor_common::time::now_ns;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeMap;

const KINDS: [&str; 3] = ["X", "Y", "Z"];

pub struct Feed {
    next_id: i64,
    rng: StdRng,
}

impl Feed {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn next_record(&mut self) -> Record {
        let id = self.next_id;
        self.next_id += 1;

        let kind = KINDS[self.rng.gen_range(0..KINDS.len())];
        let position = Geometry::Point(Point::new(
            self.rng.gen_range(-180.0..180.0),
            self.rng.gen_range(-90.0..90.0),
        ));
        let driver = GraphObject::Entity {
            type_name: "Driver".to_string(),
            id: format!("driver-{}", self.rng.gen_range(1..=20)),
            properties: BTreeMap::new(),
        };
        Record::new()
            .with("id", id)
            .with("type", kind)
            .with("speed", self.rng.gen_range(0.0..120.0))
            .with("observed_at", Value::Timestamp(now_ns()))
            .with("position", position)
            .with("driver", driver)
    }

    pub fn batch(&mut self, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.next_record()).collect()
    }

    /// Id of a vehicle published earlier, if any.
    pub fn published_id(&mut self) -> Option<i64> {
        (self.next_id > 1).then(|| self.rng.gen_range(1..self.next_id))
    }
}
