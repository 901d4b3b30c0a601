use crate::client::{webhook_embed, History, Messenger, StatusSink, WebhookSink};
use crate::detector::{messages_contain_phrase, BET_BAN_PHRASES};
use crate::error::Result;
use crate::farm::EngineDeps;
use crate::session::{SessionRegistry, TaskRegistry};
use crate::timing::bet_delay;
use log::{debug, error, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Martingale stake ladder: losses escalate, a win resets to the base stake.
pub const BET_SEQUENCE: [u64; 13] = [
    1, 4, 20, 100, 500, 1500, 5015, 11946, 25020, 46507, 93555, 184200, 250000,
];

const ERROR_BACKOFF: Duration = Duration::from_secs(5);
const SETTLE_WAIT: Duration = Duration::from_secs(2);
const PENDING_POLL: Duration = Duration::from_secs(1);

/// What the latest game-bot reply says about the pending coinflip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetOutcome {
    Loss,
    Win,
    Pending,
}

pub fn classify_outcome(content: &str) -> BetOutcome {
    let lower = content.to_lowercase();
    if lower.contains("you lost it all") {
        BetOutcome::Loss
    } else if lower.contains("you won") {
        BetOutcome::Win
    } else {
        BetOutcome::Pending
    }
}

/// Cursor into [`BET_SEQUENCE`].
#[derive(Debug, Clone, Default)]
pub struct BetLadder {
    index: usize,
}

impl BetLadder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> u64 {
        BET_SEQUENCE[self.index]
    }

    /// Escalates to the next stake; an exhausted ladder wraps to the base
    /// stake with a warning.
    pub fn advance_on_loss(&mut self) -> u64 {
        self.index += 1;
        if self.index >= BET_SEQUENCE.len() {
            self.index = 0;
            warn!("⚠️ Bet sequence exhausted, resetting to {}", BET_SEQUENCE[0]);
        }
        self.current()
    }

    pub fn reset_on_win(&mut self) -> u64 {
        self.index = 0;
        self.current()
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Martingale betting engine for one (channel, token) pair.
pub struct BetEngine {
    channel_id: u64,
    token: String,
    state: Arc<SessionRegistry>,
    tasks: Arc<TaskRegistry>,
    messenger: Arc<dyn Messenger>,
    history: Arc<dyn History>,
    status: Arc<dyn StatusSink>,
    webhook: Arc<dyn WebhookSink>,
}

impl BetEngine {
    pub fn new(channel_id: u64, token: String, deps: EngineDeps) -> Self {
        Self {
            channel_id,
            token,
            state: deps.state,
            tasks: deps.tasks,
            messenger: deps.messenger,
            history: deps.history,
            status: deps.status,
            webhook: deps.webhook,
        }
    }

    /// Flags the channel as bet-active. Called once by the owner before
    /// spawning `run`.
    pub fn activate(&self) {
        self.state.with_channel(self.channel_id, |ch| {
            ch.bet_active = true;
            ch.banned = false;
            ch.stopped_by_command = false;
        });
    }

    fn report_status(&self, active: bool) {
        let snapshot = self.state.snapshot(self.channel_id);
        self.status.update(
            "owo_bet",
            self.channel_id,
            active,
            json!({
                "bets_placed": snapshot.bets_placed,
                "profit": snapshot.bet_profit,
                "banned": snapshot.banned,
            }),
        );
    }

    pub async fn check_ban(&self) -> bool {
        match self
            .history
            .fetch_messages(self.channel_id, 10, &self.token)
            .await
        {
            Ok(messages) => messages_contain_phrase(&messages, BET_BAN_PHRASES),
            Err(e) => {
                error!("Bet ban check failed: {e}");
                false
            }
        }
    }

    pub async fn handle_ban_detection(&self) {
        error!("🚨 BAN DETECTED for bet {}!", self.channel_id);

        let snapshot = self.state.snapshot(self.channel_id);
        let embed = webhook_embed(
            "🚨 BAN DETECTED - BET",
            format!(
                "**Channel:** <#{}>\n⚠️ Ban/captcha detected. The bet engine stopped completely.",
                self.channel_id
            ),
            0xff0000,
            vec![
                ("🎰 Bets placed".to_string(), format!("`{}`", snapshot.bets_placed)),
                ("📊 Profit/Loss".to_string(), format!("`{:+}`", snapshot.bet_profit)),
            ],
        );
        self.webhook.notify("ban_alert", embed).await;

        self.state.with_channel(self.channel_id, |ch| {
            ch.bet_active = false;
            ch.banned = true;
            ch.stopped_by_command = true;
        });

        let notice = "🚨 **BAN DETECTED!**\n\n\
            The bet engine stopped completely. Please:\n\
            1. Resolve the captcha/ban\n\
            2. Re-activate the channel to resume";
        if let Err(e) = self
            .messenger
            .send_message(self.channel_id, notice, &self.token)
            .await
        {
            debug!("Ban notice send failed: {e}");
        }

        self.report_status(false);
        self.tasks.abort_channel(self.channel_id);
    }

    /// Newest message in the channel, if it came from the game bot.
    async fn fetch_latest_owo_message(&self) -> Option<crate::message::Message> {
        match self
            .history
            .fetch_messages(self.channel_id, 1, &self.token)
            .await
        {
            Ok(messages) => messages.into_iter().next().filter(|m| m.is_from_owo()),
            Err(e) => {
                error!("Latest message fetch failed: {e}");
                None
            }
        }
    }

    pub async fn place_bet(&self, amount: u64, ladder: &BetLadder) -> Result<()> {
        let command = format!("owo cf {amount}");
        self.messenger
            .send_message(self.channel_id, &command, &self.token)
            .await?;

        let total = self.state.with_channel(self.channel_id, |ch| {
            ch.bets_placed += 1;
            ch.current_bet_amount = amount;
            ch.bet_index = ladder.index();
            ch.bets_placed
        });
        info!("🎰 Placed bet {amount} (total: {total})");
        self.report_status(true);
        Ok(())
    }

    /// Debits the just-placed stake and escalates the ladder. Returns the
    /// next stake to place.
    pub fn record_loss(&self, ladder: &mut BetLadder) -> u64 {
        let (amount, profit) = self.state.with_channel(self.channel_id, |ch| {
            ch.bet_profit -= ch.current_bet_amount as i64;
            (ch.current_bet_amount, ch.bet_profit)
        });
        info!("❌ LOST -{amount} | Profit: {profit:+}");
        ladder.advance_on_loss()
    }

    /// Credits the just-placed stake and resets the ladder to the base.
    pub fn record_win(&self, ladder: &mut BetLadder) -> u64 {
        let (amount, profit) = self.state.with_channel(self.channel_id, |ch| {
            ch.bet_profit += ch.current_bet_amount as i64;
            (ch.current_bet_amount, ch.bet_profit)
        });
        info!("✅ WON +{amount} | Profit: {profit:+}");
        ladder.reset_on_win()
    }

    /// Main martingale loop. Terminal only on ban detection, external
    /// deactivation or task cancellation.
    pub async fn run(&self) {
        info!("🟢 Starting bet loop for {}", self.channel_id);

        let mut ladder = BetLadder::new();
        if let Err(e) = self.place_bet(ladder.current(), &ladder).await {
            error!("Initial bet failed: {e}");
        }

        while self.state.is_bet_active(self.channel_id) {
            match self.bet_iteration(&mut ladder).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    error!("Bet iteration error: {e}");
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }

        self.report_status(false);
        info!("🔴 Bet loop stopped for {}", self.channel_id);
    }

    async fn bet_iteration(&self, ladder: &mut BetLadder) -> Result<Flow> {
        if self.check_ban().await {
            self.handle_ban_detection().await;
            return Ok(Flow::Stop);
        }

        sleep(SETTLE_WAIT).await;
        let Some(message) = self.fetch_latest_owo_message().await else {
            return Ok(Flow::Continue);
        };

        match classify_outcome(&message.content) {
            BetOutcome::Loss => {
                let next = self.record_loss(ladder);
                sleep(Duration::from_secs_f64(bet_delay())).await;
                self.place_bet(next, ladder).await?;
            }
            BetOutcome::Win => {
                let next = self.record_win(ladder);
                sleep(Duration::from_secs_f64(bet_delay())).await;
                self.place_bet(next, ladder).await?;
            }
            BetOutcome::Pending => {
                sleep(PENDING_POLL).await;
            }
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Messenger, StatusSink, WebhookSink};
    use crate::message::{Author, Embed, Message, OWO_BOT_ID};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingMessenger {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_message(&self, _: u64, text: &str, _: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct CannedHistory {
        messages: Vec<Message>,
    }

    #[async_trait]
    impl History for CannedHistory {
        async fn fetch_messages(&self, _: u64, _: u8, _: &str) -> Result<Vec<Message>> {
            Ok(self.messages.clone())
        }

        async fn fetch_bytes(&self, _: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    struct RecordingWebhook {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebhookSink for RecordingWebhook {
        async fn notify(&self, event_kind: &str, _: serde_json::Value) -> bool {
            self.events.lock().unwrap().push(event_kind.to_string());
            true
        }
    }

    struct SilentStatus;

    impl StatusSink for SilentStatus {
        fn update(&self, _: &str, _: u64, _: bool, _: serde_json::Value) {}
    }

    fn engine_with(history: Vec<Message>) -> (BetEngine, Arc<RecordingMessenger>, Arc<RecordingWebhook>) {
        let messenger = Arc::new(RecordingMessenger {
            sent: Mutex::new(Vec::new()),
        });
        let webhook = Arc::new(RecordingWebhook {
            events: Mutex::new(Vec::new()),
        });
        let deps = EngineDeps {
            state: Arc::new(SessionRegistry::new()),
            tasks: Arc::new(TaskRegistry::new()),
            messenger: messenger.clone(),
            history: Arc::new(CannedHistory { messages: history }),
            status: Arc::new(SilentStatus),
            webhook: webhook.clone(),
            solver: None,
        };
        let engine = BetEngine::new(2002, "token".to_string(), deps);
        (engine, messenger, webhook)
    }

    #[test]
    fn test_classify_outcome() {
        assert_eq!(classify_outcome("Aww You lost it all..."), BetOutcome::Loss);
        assert_eq!(classify_outcome("and you WON 100 cowoncy!"), BetOutcome::Win);
        assert_eq!(classify_outcome("spinning..."), BetOutcome::Pending);
    }

    #[test]
    fn test_ladder_wraps_when_exhausted() {
        let mut ladder = BetLadder::new();
        for _ in 0..BET_SEQUENCE.len() - 1 {
            ladder.advance_on_loss();
        }
        assert_eq!(ladder.current(), 250000);
        assert_eq!(ladder.advance_on_loss(), 1);
        assert_eq!(ladder.index(), 0);
    }

    #[tokio::test]
    async fn test_martingale_bookkeeping() {
        let (engine, _, _) = engine_with(Vec::new());
        engine.activate();
        let mut ladder = BetLadder::new();

        engine.place_bet(ladder.current(), &ladder).await.unwrap();

        // Three consecutive losses: stakes 1, 4, 20.
        for expected_next in [4u64, 20, 100] {
            let next = engine.record_loss(&mut ladder);
            assert_eq!(next, expected_next);
            engine.place_bet(next, &ladder).await.unwrap();
        }

        let state = engine.state.snapshot(2002);
        assert_eq!(ladder.index(), 3);
        assert_eq!(state.bet_index, 3);
        assert_eq!(state.bet_profit, -(1 + 4 + 20));
        assert_eq!(state.bets_placed, 4);

        // A win at index 3 credits the 100 stake and resets the ladder.
        let next = engine.record_win(&mut ladder);
        assert_eq!(next, 1);
        assert_eq!(ladder.index(), 0);
        assert_eq!(engine.state.snapshot(2002).bet_profit, -25 + 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_reply_places_next_stake() {
        let loss = Message {
            id: "1".to_string(),
            author: Author {
                id: OWO_BOT_ID.to_string(),
            },
            content: "Spent 1 and you lost it all...".to_string(),
            embeds: Vec::<Embed>::new(),
            attachments: vec![],
        };
        let (engine, messenger, _) = engine_with(vec![loss]);
        engine.activate();
        let mut ladder = BetLadder::new();
        engine.place_bet(ladder.current(), &ladder).await.unwrap();

        let flow = engine.bet_iteration(&mut ladder).await.unwrap();
        assert!(matches!(flow, Flow::Continue));

        let sent = messenger.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), ["owo cf 1", "owo cf 4"]);
        assert_eq!(engine.state.snapshot(2002).bet_profit, -1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ban_reply_is_terminal() {
        let captcha = Message {
            id: "1".to_string(),
            author: Author {
                id: OWO_BOT_ID.to_string(),
            },
            content: "please complete your captcha to continue".to_string(),
            embeds: vec![],
            attachments: vec![],
        };
        let (engine, _, webhook) = engine_with(vec![captcha]);
        engine.activate();
        let mut ladder = BetLadder::new();

        let flow = engine.bet_iteration(&mut ladder).await.unwrap();
        assert!(matches!(flow, Flow::Stop));
        assert_eq!(webhook.events.lock().unwrap().as_slice(), ["ban_alert"]);

        let state = engine.state.snapshot(2002);
        assert!(state.banned);
        assert!(!state.bet_active);
    }
}
