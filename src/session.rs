use crate::schedule::DailySchedule;
use log::debug;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Wall-clock seconds since the epoch. Schedule cursors and huntbot timers
/// are plain epoch floats so they survive being compared across awaits.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuntBotStage {
    Normal,
    WaitingForReturn,
    WaitingForPasswordReset,
}

/// Per-channel huntbot sub-state: retry counter, pause/next-attempt timers,
/// stage tag and the remembered optimal stake.
#[derive(Debug, Clone)]
pub struct HuntBotState {
    pub tries: u32,
    pub pause_until: f64,
    pub next_time: f64,
    pub stage: HuntBotStage,
    pub cowoncy: u64,
}

impl Default for HuntBotState {
    fn default() -> Self {
        Self {
            tries: 0,
            pause_until: 0.0,
            next_time: 0.0,
            stage: HuntBotStage::Normal,
            cowoncy: 20000,
        }
    }
}

/// Mutable cursor over a [`DailySchedule`]. Even steps farm, odd steps rest;
/// reset wholesale when a full day completes.
#[derive(Debug, Clone, Default)]
pub struct FarmSession {
    pub schedule: Option<DailySchedule>,
    pub current_step: usize,
    pub step_start: f64,
    pub current_farm_commands_sent: u32,
    pub daily_commands_sent: u32,
    pub rest_logged: bool,
}

impl FarmSession {
    pub fn start_day(&mut self, schedule: DailySchedule) {
        self.schedule = Some(schedule);
        self.current_step = 0;
        self.step_start = now_secs();
        self.current_farm_commands_sent = 0;
        self.daily_commands_sent = 0;
        self.rest_logged = false;
    }

    pub fn advance_step(&mut self) {
        self.current_step += 1;
        self.step_start = now_secs();
        self.current_farm_commands_sent = 0;
        self.rest_logged = false;
    }

    pub fn record_sent(&mut self) {
        self.current_farm_commands_sent += 1;
        self.daily_commands_sent += 1;
    }
}

/// Everything the process tracks for one channel: counters read by the
/// status layer, activity/ban flags, huntbot sub-state and the farm cursor.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub commands_sent: u64,
    pub gems_used: u64,
    pub last_gem_check: f64,
    pub last_quest_check: f64,
    pub bets_placed: u64,
    pub bet_profit: i64,
    pub current_bet_amount: u64,
    pub bet_index: usize,
    pub farm_active: bool,
    pub bet_active: bool,
    pub banned: bool,
    pub stopped_by_command: bool,
    pub huntbot: HuntBotState,
    pub farm_session: FarmSession,
}

impl Default for ChannelState {
    fn default() -> Self {
        let now = now_secs();
        Self {
            commands_sent: 0,
            gems_used: 0,
            last_gem_check: now,
            last_quest_check: now,
            bets_placed: 0,
            bet_profit: 0,
            current_bet_amount: 0,
            bet_index: 0,
            farm_active: false,
            bet_active: false,
            banned: false,
            stopped_by_command: false,
            huntbot: HuntBotState::default(),
            farm_session: FarmSession::default(),
        }
    }
}

/// Process-wide session state keyed by channel id.
///
/// Only the engine owning a channel id writes that key; the lock exists for
/// map-shape safety across tasks, not for writer coordination, so contention
/// is negligible by design.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<u64, ChannelState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the channel's state, creating default state on first
    /// touch.
    pub fn with_channel<T>(&self, channel_id: u64, f: impl FnOnce(&mut ChannelState) -> T) -> T {
        let mut map = self.inner.write().expect("session registry poisoned");
        f(map.entry(channel_id).or_default())
    }

    /// Cloned point-in-time view for status reporting.
    pub fn snapshot(&self, channel_id: u64) -> ChannelState {
        let map = self.inner.read().expect("session registry poisoned");
        map.get(&channel_id).cloned().unwrap_or_default()
    }

    pub fn is_farm_active(&self, channel_id: u64) -> bool {
        self.snapshot(channel_id).farm_active
    }

    pub fn is_bet_active(&self, channel_id: u64) -> bool {
        self.snapshot(channel_id).bet_active
    }
}

/// Registry of spawned engine tasks per channel, so ban handling and
/// shutdown can abort a channel's loops. Cancellation is cooperative:
/// `abort` takes effect at the loop's next suspension point.
#[derive(Default)]
pub struct TaskRegistry {
    inner: RwLock<HashMap<u64, Vec<JoinHandle<()>>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel_id: u64, handle: JoinHandle<()>) {
        let mut map = self.inner.write().expect("task registry poisoned");
        map.entry(channel_id).or_default().push(handle);
    }

    /// Aborts and forgets every task tracked for a channel. Returns how many
    /// were cancelled.
    pub fn abort_channel(&self, channel_id: u64) -> usize {
        let mut map = self.inner.write().expect("task registry poisoned");
        let tasks = map.remove(&channel_id).unwrap_or_default();
        for task in &tasks {
            task.abort();
        }
        debug!("Cancelled {} tasks for channel {channel_id}", tasks.len());
        tasks.len()
    }

    pub fn abort_all(&self) {
        let mut map = self.inner.write().expect("task registry poisoned");
        for (_, tasks) in map.drain() {
            for task in tasks {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creates_default_state() {
        let registry = SessionRegistry::new();
        let sent = registry.with_channel(7, |state| {
            state.commands_sent += 3;
            state.commands_sent
        });
        assert_eq!(sent, 3);
        assert_eq!(registry.snapshot(7).commands_sent, 3);
        assert_eq!(registry.snapshot(8).commands_sent, 0);
    }

    #[test]
    fn test_farm_session_cursor() {
        let mut session = FarmSession::default();
        let mut history = crate::schedule::ChannelHistory::default();
        session.start_day(crate::schedule::DailySchedule::generate(&mut history));

        session.record_sent();
        session.record_sent();
        assert_eq!(session.current_farm_commands_sent, 2);
        assert_eq!(session.daily_commands_sent, 2);

        session.advance_step();
        assert_eq!(session.current_step, 1);
        assert_eq!(session.current_farm_commands_sent, 0);
        // Daily total survives step transitions.
        assert_eq!(session.daily_commands_sent, 2);
    }
}
