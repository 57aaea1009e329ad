//! Hysteresis trip points.
//!
//! When a sensor crosses a trigger threshold its level is latched together
//! with a release temperature `threshold - hysteresis`. The latched level
//! holds until the sensor cools below the release temperature.

use std::collections::BTreeMap;
use tpfan_hw::is_disconnected;

use crate::settings::{SensorId, TriggerTable};

/// A latched fan level and the temperature at which it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trip {
    pub temperature: i32,
    pub level: u16,
}

/// Trip points of all sensors.
#[derive(Debug, Default, Clone)]
pub struct TripState {
    trips: BTreeMap<SensorId, Trip>,
}

impl TripState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.trips.clear();
    }

    pub fn get(&self, sensor: &SensorId) -> Option<&Trip> {
        self.trips.get(sensor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SensorId, &Trip)> {
        self.trips.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// Returns the level one sensor asks for and updates its trip point.
    pub fn evaluate_sensor(
        &mut self,
        sensor: &SensorId,
        temperature: i32,
        triggers: &TriggerTable,
        hysteresis: i32,
    ) -> u16 {
        let mut level = 0;
        if let Some(trip) = self.trips.get(sensor) {
            if temperature >= trip.temperature {
                level = trip.level;
            } else {
                self.trips.remove(sensor);
            }
        }

        for (&threshold, &trigger_level) in triggers {
            if temperature >= threshold && trigger_level > level {
                level = trigger_level;
                self.trips.insert(
                    sensor.clone(),
                    Trip {
                        temperature: threshold - hysteresis,
                        level: trigger_level,
                    },
                );
            }
        }
        level
    }

    /// Returns the highest level requested by any connected sensor.
    ///
    /// Disconnected readings and sensors without a trigger table are
    /// skipped and leave their trip points alone.
    pub fn evaluate(
        &mut self,
        readings: &[(SensorId, i32)],
        triggers: &BTreeMap<SensorId, TriggerTable>,
        hysteresis: i32,
    ) -> u16 {
        readings
            .iter()
            .filter(|(_, temperature)| !is_disconnected(*temperature))
            .filter_map(|(sensor, temperature)| {
                triggers
                    .get(sensor)
                    .map(|table| self.evaluate_sensor(sensor, *temperature, table, hysteresis))
            })
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu() -> SensorId {
        SensorId::Indexed(0)
    }

    fn table() -> BTreeMap<SensorId, TriggerTable> {
        BTreeMap::from([(cpu(), TriggerTable::from([(50, 2), (70, 5)]))])
    }

    #[test]
    fn test_hysteresis_scenario() {
        let triggers = table();
        let mut trips = TripState::new();

        assert_eq!(trips.evaluate(&[(cpu(), 50)], &triggers, 3), 2);
        assert_eq!(
            trips.get(&cpu()),
            Some(&Trip {
                temperature: 47,
                level: 2
            })
        );

        assert_eq!(trips.evaluate(&[(cpu(), 49)], &triggers, 3), 2);

        assert_eq!(trips.evaluate(&[(cpu(), 46)], &triggers, 3), 0);
        assert!(trips.get(&cpu()).is_none());

        assert_eq!(trips.evaluate(&[(cpu(), 71)], &triggers, 3), 5);
        assert_eq!(
            trips.get(&cpu()),
            Some(&Trip {
                temperature: 67,
                level: 5
            })
        );

        assert_eq!(trips.evaluate(&[(cpu(), 68)], &triggers, 3), 5);
    }

    #[test]
    fn test_release_steps_down_to_lower_trigger() {
        let triggers = table();
        let mut trips = TripState::new();
        assert_eq!(trips.evaluate(&[(cpu(), 75)], &triggers, 3), 5);
        // Below the level-5 release but still above the level-2 threshold.
        assert_eq!(trips.evaluate(&[(cpu(), 60)], &triggers, 3), 2);
        assert_eq!(trips.get(&cpu()).map(|t| t.temperature), Some(47));
    }

    #[test]
    fn test_disconnected_readings_ignored() {
        let triggers = table();
        let mut trips = TripState::new();
        assert_eq!(trips.evaluate(&[(cpu(), 55)], &triggers, 3), 2);

        for reading in [128, -128, 0] {
            assert_eq!(trips.evaluate(&[(cpu(), reading)], &triggers, 3), 0);
            assert_eq!(
                trips.get(&cpu()),
                Some(&Trip {
                    temperature: 47,
                    level: 2
                })
            );
        }
    }

    #[test]
    fn test_max_over_sensors() {
        let gpu = SensorId::Indexed(3);
        let mut triggers = table();
        triggers.insert(gpu.clone(), TriggerTable::from([(40, 7)]));
        let mut trips = TripState::new();

        let level = trips.evaluate(&[(cpu(), 55), (gpu.clone(), 45)], &triggers, 2);
        assert_eq!(level, 7);
        assert_eq!(trips.get(&gpu).map(|t| t.temperature), Some(38));
        assert_eq!(trips.get(&cpu()).map(|t| t.temperature), Some(48));
    }

    #[test]
    fn test_unconfigured_sensor_skipped() {
        let triggers = table();
        let mut trips = TripState::new();
        assert_eq!(trips.evaluate(&[(SensorId::Indexed(5), 90)], &triggers, 3), 0);
        assert!(trips.is_empty());
    }

    #[test]
    fn test_zero_hysteresis_releases_below_threshold() {
        let triggers = table();
        let mut trips = TripState::new();
        assert_eq!(trips.evaluate(&[(cpu(), 50)], &triggers, 0), 2);
        assert_eq!(trips.evaluate(&[(cpu(), 49)], &triggers, 0), 0);
    }
}
