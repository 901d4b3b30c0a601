use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const MIN_DAILY_COMMANDS: u32 = 500;
pub const MAX_DAILY_COMMANDS: u32 = 800;

/// One day's farm/rest timetable. Immutable once created; the farm session
/// keeps a cursor over it and regenerates a fresh one when the cycle is
/// exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySchedule {
    pub pattern: String,
    pub total_commands: u32,
    pub num_batches: usize,
    /// Farm step durations, seconds.
    pub farm_times: Vec<f64>,
    /// Command budget per farm step.
    pub farm_commands: Vec<u32>,
    /// Rest step durations, seconds.
    pub rest_times: Vec<f64>,
    pub total_farm_hours: f64,
    pub total_rest_hours: f64,
    pub avg_delay_target: f64,
}

impl DailySchedule {
    /// Draws one randomized schedule: a single continuous 7-8h farm window
    /// sized for 500-800 commands, then the rest of the 24h day plus 1-2h of
    /// extra padding rest. Each day is drawn independently; `history` is
    /// appended to for auditing but never read back into the draw.
    pub fn generate(history: &mut ChannelHistory) -> Self {
        Self::generate_with(&mut rand::thread_rng(), history)
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, history: &mut ChannelHistory) -> Self {
        let farm_seconds = rng.gen_range(7.0..8.0) * 3600.0;
        let avg_delay = rng.gen_range(35.0..50.0);

        let estimated_commands = (farm_seconds / avg_delay) as u32;
        let variation = rng.gen_range(0.90..1.10);
        let total_commands = ((estimated_commands as f64 * variation) as u32)
            .clamp(MIN_DAILY_COMMANDS, MAX_DAILY_COMMANDS);

        let extra_rest = rng.gen_range(3600.0..2.0 * 3600.0);
        let rest_seconds = (24.0 * 3600.0 - farm_seconds) + extra_rest;

        history.last_batch_counts.push(1);
        let len = history.last_batch_counts.len();
        if len > 5 {
            history.last_batch_counts.drain(..len - 5);
        }
        history.total_days += 1;

        Self {
            pattern: "safe_continuous".to_string(),
            total_commands,
            num_batches: 1,
            farm_times: vec![farm_seconds],
            farm_commands: vec![total_commands],
            rest_times: vec![rest_seconds],
            total_farm_hours: farm_seconds / 3600.0,
            total_rest_hours: rest_seconds / 3600.0,
            avg_delay_target: avg_delay,
        }
    }
}

/// Per-channel cycle audit trail. Write-only with respect to schedule
/// generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelHistory {
    pub last_batch_counts: Vec<u32>,
    pub total_days: u32,
}

/// Durable store for the schedule audit trail, one JSON file keyed by
/// channel id. Every write is a read-modify-write of the whole file; a
/// missing or corrupt file degrades to an empty store.
pub struct FarmHistoryStore {
    path: PathBuf,
}

impl FarmHistoryStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("farm_history.json"),
        }
    }

    fn load(&self) -> HashMap<String, ChannelHistory> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn save(&self, store: &HashMap<String, ChannelHistory>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(store) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(&self.path, contents) {
                    warn!("Failed to persist farm history: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize farm history: {e}"),
        }
    }

    /// Generates the next daily schedule for a channel and records the cycle
    /// in the durable history. Persistence failures are logged, not fatal.
    pub fn generate_schedule(&self, channel_id: u64) -> DailySchedule {
        let mut store = self.load();
        let history = store.entry(channel_id.to_string()).or_default();
        let schedule = DailySchedule::generate(history);
        debug!(
            "New schedule for {}: {} commands over {:.1}h, day #{}",
            channel_id,
            schedule.total_commands,
            schedule.total_farm_hours,
            store[&channel_id.to_string()].total_days
        );
        self.save(&store);
        schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_command_budget_bounds() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..500 {
            let mut history = ChannelHistory::default();
            let schedule = DailySchedule::generate_with(&mut rng, &mut history);
            assert!(schedule.total_commands >= MIN_DAILY_COMMANDS);
            assert!(schedule.total_commands <= MAX_DAILY_COMMANDS);
            assert_eq!(schedule.farm_commands, vec![schedule.total_commands]);
        }
    }

    #[test]
    fn test_farm_window_and_padded_rest() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..500 {
            let mut history = ChannelHistory::default();
            let schedule = DailySchedule::generate_with(&mut rng, &mut history);

            let farm = schedule.farm_times[0];
            let rest = schedule.rest_times[0];
            assert!(farm >= 7.0 * 3600.0 && farm <= 8.0 * 3600.0);
            // Extra rest padding always pushes the full cycle past 24h.
            assert!(farm + rest > 24.0 * 3600.0);
            assert!(farm + rest <= 26.0 * 3600.0);
            assert!(schedule.avg_delay_target >= 35.0 && schedule.avg_delay_target <= 50.0);
        }
    }

    #[test]
    fn test_history_appends_and_truncates() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut history = ChannelHistory::default();
        for day in 1..=8u32 {
            DailySchedule::generate_with(&mut rng, &mut history);
            assert_eq!(history.total_days, day);
            assert!(history.last_batch_counts.len() <= 5);
        }
        assert_eq!(history.last_batch_counts, vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_store_survives_missing_file() {
        let dir = std::env::temp_dir().join(format!("owobot-test-{}", std::process::id()));
        let store = FarmHistoryStore::new(&dir);

        let schedule = store.generate_schedule(42);
        assert_eq!(schedule.num_batches, 1);

        // Second day for the same channel accumulates.
        store.generate_schedule(42);
        let loaded = store.load();
        assert_eq!(loaded["42"].total_days, 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
