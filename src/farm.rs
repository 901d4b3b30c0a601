use crate::client::{CaptchaSolver, History, Messenger, StatusSink, WebhookSink};
use crate::config::FarmConfig;
use crate::detector::{messages_contain_phrase, FARM_BAN_PHRASES};
use crate::error::Result;
use crate::huntbot::ESCALATION_PAUSE_SECS;
use crate::schedule::{DailySchedule, FarmHistoryStore};
use crate::session::{now_secs, FarmSession, HuntBotStage, SessionRegistry, TaskRegistry};
use crate::timing::calculate_delay;
use crate::client::webhook_embed;
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const GEM_CHECK_INTERVAL_SECS: f64 = 4000.0;
const QUEST_CHECK_INTERVAL_SECS: f64 = 86450.0;
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Commands sent on every farm day.
const BASE_COMMANDS: [&str; 5] = ["owoh", "owo pray", "owo h", "owo b", "owob"];

/// Per-day variant pools: one command is drawn from each, so consecutive
/// days don't share an identical command mix.
const VARIANT_POOLS: [&[&str]; 3] = [
    &["owo cf 1", "owoz", "owo s 1", "owo owo"],
    &["owo pup", "owo army", "owo piku", "owo run"],
    &["owo punch <@408785106942164992>", "owo roll"],
];

/// Collaborators shared by every engine in the process.
#[derive(Clone)]
pub struct EngineDeps {
    pub state: Arc<SessionRegistry>,
    pub tasks: Arc<TaskRegistry>,
    pub messenger: Arc<dyn Messenger>,
    pub history: Arc<dyn History>,
    pub status: Arc<dyn StatusSink>,
    pub webhook: Arc<dyn WebhookSink>,
    pub solver: Option<Arc<dyn CaptchaSolver>>,
}

enum Flow {
    Continue,
    Stop,
}

/// Builds the day's command pool: the base set plus one draw per variant
/// pool.
pub fn build_command_pool<R: Rng + ?Sized>(rng: &mut R) -> Vec<String> {
    let mut commands: Vec<String> = BASE_COMMANDS.iter().map(|c| c.to_string()).collect();
    for pool in VARIANT_POOLS {
        if let Some(choice) = pool.choose(rng) {
            commands.push(choice.to_string());
        }
    }
    commands
}

/// Picks the next farm command, never repeating the previous one when an
/// alternative exists.
pub fn pick_farm_command<R: Rng + ?Sized>(
    rng: &mut R,
    commands: &[String],
    last: Option<&str>,
) -> String {
    let mut cmd = commands.choose(rng).cloned().unwrap_or_default();
    while Some(cmd.as_str()) == last && commands.len() > 1 {
        cmd = commands.choose(rng).cloned().unwrap_or_default();
    }
    cmd
}

/// Continuous resource-farming engine for one (channel, token) pair.
///
/// Runs the farm/rest state machine over a randomized daily schedule,
/// delegating to the gem, quest and huntbot sub-managers, and terminating
/// only on ban detection or external cancellation.
pub struct FarmEngine {
    pub(crate) channel_id: u64,
    pub(crate) token: String,
    pub(crate) config: FarmConfig,
    pub(crate) state: Arc<SessionRegistry>,
    pub(crate) tasks: Arc<TaskRegistry>,
    pub(crate) messenger: Arc<dyn Messenger>,
    pub(crate) history: Arc<dyn History>,
    pub(crate) status: Arc<dyn StatusSink>,
    pub(crate) webhook: Arc<dyn WebhookSink>,
    pub(crate) solver: Option<Arc<dyn CaptchaSolver>>,
    history_store: FarmHistoryStore,
}

impl FarmEngine {
    pub fn new(
        channel_id: u64,
        token: String,
        config: FarmConfig,
        data_dir: &Path,
        deps: EngineDeps,
    ) -> Self {
        Self {
            channel_id,
            token,
            config,
            state: deps.state,
            tasks: deps.tasks,
            messenger: deps.messenger,
            history: deps.history,
            status: deps.status,
            webhook: deps.webhook,
            solver: deps.solver,
            history_store: FarmHistoryStore::new(data_dir),
        }
    }

    /// Flags the channel as farm-active. The owner calls this exactly once
    /// before spawning `run`; the engine itself never re-activates a channel.
    pub fn activate(&self) {
        self.state.with_channel(self.channel_id, |ch| {
            ch.farm_active = true;
            ch.banned = false;
            ch.stopped_by_command = false;
            ch.huntbot.cowoncy = self.config.money;
        });
    }

    fn report_status(&self, active: bool) {
        let snapshot = self.state.snapshot(self.channel_id);
        self.status.update(
            "owo_farm",
            self.channel_id,
            active,
            json!({
                "gems_used": snapshot.gems_used,
                "commands_sent": snapshot.commands_sent,
                "banned": snapshot.banned,
            }),
        );
    }

    /// Polls the recent game-bot replies for challenge phrases. Any fetch or
    /// parse error counts as "no ban detected".
    pub async fn check_ban(&self) -> bool {
        match self
            .history
            .fetch_messages(self.channel_id, 5, &self.token)
            .await
        {
            Ok(messages) => messages_contain_phrase(&messages, FARM_BAN_PHRASES),
            Err(e) => {
                error!("Ban check failed: {e}");
                false
            }
        }
    }

    /// Terminal ban path: alert the webhook, flip the shared flags, notify
    /// the channel, report final status and cancel this channel's tasks.
    /// Reactivation is an external decision.
    pub async fn handle_ban_detection(&self) {
        error!("🚨 BAN DETECTED for {}!", self.channel_id);

        let snapshot = self.state.snapshot(self.channel_id);
        let embed = webhook_embed(
            "🚨 BAN DETECTED - FARM",
            format!(
                "**Channel:** <#{}>\n⚠️ Ban/captcha detected. The farm engine stopped completely.",
                self.channel_id
            ),
            0xff0000,
            vec![
                ("💎 Gems used".to_string(), format!("`{}`", snapshot.gems_used)),
                ("📝 Commands sent".to_string(), format!("`{}`", snapshot.commands_sent)),
            ],
        );
        self.webhook.notify("ban_alert", embed).await;

        self.state.with_channel(self.channel_id, |ch| {
            ch.farm_active = false;
            ch.banned = true;
            ch.stopped_by_command = true;
        });

        let notice = "🚨 **BAN DETECTED!**\n\n\
            The farm engine stopped completely. Please:\n\
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

        // Abort last: this cancels our own task handle too, and abort takes
        // effect at the next suspension point.
        self.tasks.abort_channel(self.channel_id);
    }

    async fn announce_new_day(&self, schedule: &DailySchedule) {
        let embed = webhook_embed(
            "📋 NEW DAILY SCHEDULE",
            format!(
                "**Channel:** <#{}>\n**Pattern:** `{}`\n**Total commands:** `{}`",
                self.channel_id,
                schedule.pattern.to_uppercase(),
                schedule.total_commands
            ),
            0x00ff00,
            vec![],
        );
        self.webhook.notify("farm_status", embed).await;
        info!(
            "📋 New daily schedule: {} commands over {:.1}h",
            schedule.total_commands, schedule.total_farm_hours
        );
    }

    /// Main farm loop. Terminal only on ban detection, a missing-schedule
    /// invariant violation, external deactivation or task cancellation.
    pub async fn run(&self) {
        info!("🟢 Starting farm loop for {}", self.channel_id);

        // First day: draw a schedule and announce it.
        let needs_schedule = self
            .state
            .with_channel(self.channel_id, |ch| ch.farm_session.schedule.is_none());
        if needs_schedule {
            let schedule = self.history_store.generate_schedule(self.channel_id);
            self.state.with_channel(self.channel_id, |ch| {
                ch.farm_session.start_day(schedule.clone())
            });
            self.report_status(true);
            self.announce_new_day(&schedule).await;
        }

        // Bootstrap hunt when this channel has never spoken to the huntbot.
        if self.config.huntbot && self.state.snapshot(self.channel_id).huntbot.next_time == 0.0 {
            let money = self.config.money;
            info!("🤖 First HuntBot start with {money} cowoncy...");
            if let Err(e) = self
                .messenger
                .send_message(self.channel_id, &format!("owo hb {money}"), &self.token)
                .await
            {
                error!("HuntBot bootstrap send failed: {e}");
            } else {
                self.state
                    .with_channel(self.channel_id, |ch| ch.huntbot.tries = 1);
                sleep(Duration::from_secs(4)).await;
                self.handle_huntbot_messages(Some(money)).await;
            }
        }

        let commands = build_command_pool(&mut rand::thread_rng());
        let mut last_command: Option<String> = None;

        while self.state.is_farm_active(self.channel_id) {
            match self.farm_iteration(&commands, &mut last_command).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    error!("Farm iteration error: {e}");
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }

        self.report_status(false);
        info!("🔴 Farm loop stopped for {}", self.channel_id);
    }

    async fn farm_iteration(
        &self,
        commands: &[String],
        last_command: &mut Option<String>,
    ) -> Result<Flow> {
        if self.check_ban().await {
            self.handle_ban_detection().await;
            return Ok(Flow::Stop);
        }

        let session = self.state.snapshot(self.channel_id).farm_session;
        let Some(schedule) = session.schedule.clone() else {
            error!("Schedule missing for {}!", self.channel_id);
            return Ok(Flow::Stop);
        };

        // A full farm+rest cycle is exhausted: report the day and roll over.
        if session.current_step >= schedule.num_batches * 2 {
            let snapshot = self.state.snapshot(self.channel_id);
            let embed = webhook_embed(
                "🎉 FARM DAY COMPLETE",
                format!("**Channel:** <#{}>", self.channel_id),
                0xffff00,
                vec![
                    (
                        "✅ Total commands".to_string(),
                        format!("`{}`", session.daily_commands_sent),
                    ),
                    ("💎 Gems".to_string(), format!("`{}`", snapshot.gems_used)),
                ],
            );
            self.webhook.notify("daily_complete", embed).await;

            let next = self.history_store.generate_schedule(self.channel_id);
            self.state
                .with_channel(self.channel_id, |ch| ch.farm_session.start_day(next.clone()));
            self.announce_new_day(&next).await;
            return Ok(Flow::Continue);
        }

        if session.current_step % 2 == 0 {
            self.farm_step(&schedule, &session, commands, last_command)
                .await
        } else {
            self.rest_step(&schedule, &session).await
        }
    }

    async fn farm_step(
        &self,
        schedule: &DailySchedule,
        session: &FarmSession,
        commands: &[String],
        last_command: &mut Option<String>,
    ) -> Result<Flow> {
        let now = now_secs();
        let farm_index = session.current_step / 2;
        let farm_time = schedule.farm_times[farm_index];
        let farm_budget = schedule.farm_commands[farm_index];

        let elapsed = now - session.step_start;
        let time_left = farm_time - elapsed;
        let sent = session.current_farm_commands_sent;
        let commands_left = farm_budget as i64 - sent as i64;

        // Step budget exhausted: move to the rest step.
        if elapsed >= farm_time || sent >= farm_budget {
            self.state
                .with_channel(self.channel_id, |ch| ch.farm_session.advance_step());

            let rest_time = schedule.rest_times[farm_index];
            let embed = webhook_embed(
                &format!("💤 REST STARTING (BATCH {})", farm_index + 1),
                format!("**Channel:** <#{}>", self.channel_id),
                0xffa500,
                vec![
                    ("✅ Sent".to_string(), format!("`{sent} commands`")),
                    ("⏰ Resting".to_string(), format!("`{:.1}h`", rest_time / 3600.0)),
                ],
            );
            self.webhook.notify("farm_status", embed).await;
            return Ok(Flow::Continue);
        }

        if commands_left <= 0 || time_left <= 0.0 {
            sleep(Duration::from_secs(10)).await;
            return Ok(Flow::Continue);
        }

        let snapshot = self.state.snapshot(self.channel_id);

        if now - snapshot.last_gem_check > GEM_CHECK_INTERVAL_SECS {
            self.check_and_use_gems().await;
            self.state
                .with_channel(self.channel_id, |ch| ch.last_gem_check = now);
            return Ok(Flow::Continue);
        }

        if now - snapshot.last_quest_check > QUEST_CHECK_INTERVAL_SECS {
            self.check_and_reroll_quests().await;
            self.state
                .with_channel(self.channel_id, |ch| ch.last_quest_check = now);
            return Ok(Flow::Continue);
        }

        if now < snapshot.huntbot.pause_until {
            sleep(Duration::from_secs(10)).await;
            return Ok(Flow::Continue);
        }

        if self.config.huntbot && now >= snapshot.huntbot.next_time + 15.0 {
            return self.huntbot_trigger(&snapshot.huntbot.stage, now).await;
        }

        // One externally observable action, then the computed pause.
        let delay = calculate_delay(time_left, commands_left);
        let cmd = pick_farm_command(&mut rand::thread_rng(), commands, last_command.as_deref());
        self.messenger
            .send_message(self.channel_id, &cmd, &self.token)
            .await?;
        *last_command = Some(cmd);

        self.state.with_channel(self.channel_id, |ch| {
            ch.commands_sent += 1;
            ch.farm_session.record_sent();
        });

        info!(
            "🌱 Batch {}: {}/{} | Day: {}/{} | Delay: {:.1}s",
            farm_index + 1,
            sent + 1,
            farm_budget,
            session.daily_commands_sent + 1,
            schedule.total_commands,
            delay
        );
        self.report_status(true);

        sleep(Duration::from_secs_f64(delay)).await;
        Ok(Flow::Continue)
    }

    async fn huntbot_trigger(&self, stage: &HuntBotStage, now: f64) -> Result<Flow> {
        let money = self.config.money;
        let cmd = match stage {
            HuntBotStage::WaitingForReturn => "owohb".to_string(),
            _ => format!("owo hb {money}"),
        };

        let tries = self
            .state
            .with_channel(self.channel_id, |ch| ch.huntbot.tries + 1);
        debug!("🤖 HuntBot try {tries}: {cmd}");
        self.messenger
            .send_message(self.channel_id, &cmd, &self.token)
            .await?;
        self.state
            .with_channel(self.channel_id, |ch| ch.huntbot.tries += 1);
        sleep(Duration::from_secs(4)).await;

        let handled = self.handle_huntbot_messages(Some(money)).await;
        self.state.with_channel(self.channel_id, |ch| {
            if handled {
                ch.huntbot.tries = 0;
            } else if ch.huntbot.tries >= 4 {
                ch.huntbot.pause_until = now + ESCALATION_PAUSE_SECS;
                ch.huntbot.tries = 0;
                warn!("⏸️ HuntBot paused for 14 minutes");
            }
        });
        Ok(Flow::Continue)
    }

    async fn rest_step(&self, schedule: &DailySchedule, session: &FarmSession) -> Result<Flow> {
        let now = now_secs();
        let rest_index = (session.current_step - 1) / 2;
        let rest_time = schedule.rest_times[rest_index];

        let elapsed = now - session.step_start;
        let time_left = rest_time - elapsed;

        if elapsed >= rest_time {
            self.state
                .with_channel(self.channel_id, |ch| ch.farm_session.advance_step());

            let next_farm_index = (session.current_step + 1) / 2;
            if next_farm_index < schedule.farm_times.len() {
                let embed = webhook_embed(
                    &format!("🌱 FARM STARTING (BATCH {})", next_farm_index + 1),
                    format!("**Channel:** <#{}>", self.channel_id),
                    0x00ff00,
                    vec![],
                );
                self.webhook.notify("farm_status", embed).await;
            }
            return Ok(Flow::Continue);
        }

        if !session.rest_logged {
            info!(
                "💤 Resting batch {}: {:.2}h remaining",
                rest_index + 1,
                time_left / 3600.0
            );
            self.state
                .with_channel(self.channel_id, |ch| ch.farm_session.rest_logged = true);
        }

        // Coarse sleeping: the rest budget does not need sub-minute accuracy.
        if time_left > 300.0 {
            sleep(Duration::from_secs(300)).await;
        } else {
            sleep(Duration::from_secs(60)).await;
        }
        Ok(Flow::Continue)
    }
}
