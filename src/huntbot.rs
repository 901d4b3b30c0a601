use crate::farm::FarmEngine;
use crate::session::HuntBotStage;
use log::{debug, error, info, warn};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Cool-down after the bot demands a password reset (~11.6 minutes).
pub const PASSWORD_RESET_WAIT_SECS: f64 = 700.0;

/// Full pause after repeated failures to resolve a huntbot interaction.
pub const ESCALATION_PAUSE_SECS: f64 = 14.0 * 60.0;

/// Upper bound on re-scans inside one handling call. The original retried by
/// recursing on itself; a pathological reply stream must not recurse forever.
const MAX_HANDLE_PASSES: u32 = 4;

const DEFAULT_COWONCY: u64 = 20000;

fn hours_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)H").unwrap())
}

fn minutes_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)M").unwrap())
}

fn back_in_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"i will be back in\s*(\d+h?\s*\d*m?|\d+m?)").unwrap())
}

fn cowoncy_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"current max autohunt:.*?for (\d+) cowoncy").unwrap())
}

/// Parses an `NhNm`-style duration ("2h30m", "45m", "3h"). Missing parts
/// count as zero.
pub fn parse_huntbot_duration(time_str: &str) -> Duration {
    let upper = time_str.trim().to_uppercase();
    let hours: u64 = hours_regex()
        .captures(&upper)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    let minutes: u64 = minutes_regex()
        .captures(&upper)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    Duration::from_secs(hours * 3600 + minutes * 60)
}

/// Extracts the optimal autohunt stake from the huntbot greeting. Falls back
/// to the default stake when the line is missing or malformed.
pub fn parse_optimal_cowoncy(content: &str) -> u64 {
    let lower = content.to_lowercase().replace(',', "");
    cowoncy_regex()
        .captures(&lower)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(DEFAULT_COWONCY)
}

/// What one pass over the recent replies decided.
enum PassOutcome {
    /// Terminal for this call: the interaction is resolved or waiting.
    Handled,
    /// A follow-up command was sent; the replies must be scanned again.
    Rescan,
    /// Nothing recognized.
    Unhandled,
}

impl FarmEngine {
    fn set_huntbot_wait(&self, stage: HuntBotStage, wait: Duration) {
        let until = crate::session::now_secs() + wait.as_secs_f64();
        self.state.with_channel(self.channel_id, |ch| {
            ch.huntbot.next_time = until;
            ch.huntbot.stage = stage;
        });
    }

    /// Reads the recent game-bot replies and reacts to the known huntbot
    /// phrases. Returns true when the interaction was resolved (a hunt is
    /// running, a wait was scheduled, or the captcha path finished) and false
    /// when nothing was recognized. Re-scans after follow-up commands are
    /// bounded by `MAX_HANDLE_PASSES`.
    pub async fn handle_huntbot_messages(&self, cowoncy_amount: Option<u64>) -> bool {
        let mut cowoncy = cowoncy_amount;

        for pass in 0..MAX_HANDLE_PASSES {
            match self.huntbot_pass(&mut cowoncy).await {
                PassOutcome::Handled => return true,
                PassOutcome::Unhandled => return false,
                PassOutcome::Rescan => {
                    debug!("HuntBot re-scan (pass {})", pass + 1);
                }
            }
        }

        warn!("⚠️ HuntBot handling gave up after {MAX_HANDLE_PASSES} passes");
        false
    }

    async fn huntbot_pass(&self, cowoncy: &mut Option<u64>) -> PassOutcome {
        let messages = match self
            .history
            .fetch_messages(self.channel_id, 5, &self.token)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!("HuntBot fetch failed: {e}");
                return PassOutcome::Unhandled;
            }
        };

        for message in &messages {
            if !message.is_from_owo() {
                continue;
            }

            let text = message.combined_text();
            let lower = text.to_lowercase();

            if lower.contains("please include your password! the command is") {
                warn!("⚠️ HuntBot wants a password, backing off ~11 minutes");
                self.set_huntbot_wait(
                    HuntBotStage::WaitingForPasswordReset,
                    Duration::from_secs_f64(PASSWORD_RESET_WAIT_SECS),
                );
                return PassOutcome::Handled;
            }

            if lower.contains("i am back with") && lower.contains("animals") {
                tokio::time::sleep(Duration::from_secs(15)).await;
                if let Err(e) = self
                    .messenger
                    .send_message(self.channel_id, "owohb", &self.token)
                    .await
                {
                    error!("HuntBot restart send failed: {e}");
                    return PassOutcome::Unhandled;
                }
                tokio::time::sleep(Duration::from_secs(4)).await;
                return PassOutcome::Rescan;
            }

            if lower.contains("beep. boop. i am huntbot") {
                let optimal = parse_optimal_cowoncy(&text);
                self.state
                    .with_channel(self.channel_id, |ch| ch.huntbot.cowoncy = optimal);
                let command = format!("owo hb {optimal}");
                if let Err(e) = self
                    .messenger
                    .send_message(self.channel_id, &command, &self.token)
                    .await
                {
                    error!("HuntBot stake send failed: {e}");
                    return PassOutcome::Unhandled;
                }
                *cowoncy = Some(optimal);
                tokio::time::sleep(Duration::from_secs(4)).await;
                return PassOutcome::Rescan;
            }

            if lower.contains("i will be back in") {
                if let Some(caps) = back_in_regex().captures(&lower) {
                    let wait = parse_huntbot_duration(&caps[1]);
                    self.set_huntbot_wait(HuntBotStage::WaitingForReturn, wait);
                    info!("⏰ HuntBot returns in {}", caps[1].trim());
                    return PassOutcome::Handled;
                }
            }

            if lower.contains("here is your password!") {
                if let Some(url) = message.first_attachment_url() {
                    return self.solve_huntbot_captcha(url, *cowoncy).await;
                }
            }

            if lower.contains("you spent") && lower.contains("cowoncy") {
                if let Some(caps) = back_in_regex().captures(&lower) {
                    let wait = parse_huntbot_duration(&caps[1]);
                    self.set_huntbot_wait(HuntBotStage::WaitingForReturn, wait);
                    info!("🤖 HuntBot dispatched, returns in {}", caps[1].trim());
                    return PassOutcome::Handled;
                }
            }
        }

        PassOutcome::Unhandled
    }

    /// Captcha path of the huntbot exchange: try the async solver, fall back
    /// to the non-suspending byte matcher on pre-fetched bytes, and submit
    /// the code with the remembered stake. A missing solver or a failed
    /// solve resolves the interaction as a reported failure, never a crash.
    async fn solve_huntbot_captcha(&self, url: &str, cowoncy: Option<u64>) -> PassOutcome {
        let Some(solver) = &self.solver else {
            error!("❌ Captcha solver not available");
            return PassOutcome::Handled;
        };

        info!("🔐 Solving HuntBot captcha...");

        let mut code = match solver.solve(url).await {
            Ok(code) => Some(code),
            Err(e) => {
                debug!("Async solver failed: {e}");
                None
            }
        };

        if code.is_none() {
            code = match self.history.fetch_bytes(url).await {
                Ok(bytes) => match solver.solve_bytes(&bytes) {
                    Ok(code) => Some(code),
                    Err(e) => {
                        debug!("Byte solver failed: {e}");
                        None
                    }
                },
                Err(e) => {
                    debug!("Captcha fetch failed: {e}");
                    None
                }
            };
        }

        let Some(code) = code else {
            error!("❌ HuntBot captcha could not be solved");
            return PassOutcome::Handled;
        };

        let stake =
            cowoncy.unwrap_or_else(|| self.state.snapshot(self.channel_id).huntbot.cowoncy);
        let command = format!("owo autohunt {stake} {code}");
        if let Err(e) = self
            .messenger
            .send_message(self.channel_id, &command, &self.token)
            .await
        {
            error!("Autohunt submit failed: {e}");
            return PassOutcome::Handled;
        }
        info!("✅ HuntBot captcha solved: {code}");
        tokio::time::sleep(Duration::from_secs(4)).await;
        PassOutcome::Rescan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_hours_and_minutes() {
        assert_eq!(parse_huntbot_duration("2h 30m"), Duration::from_secs(9000));
        assert_eq!(parse_huntbot_duration("2H30M"), Duration::from_secs(9000));
    }

    #[test]
    fn test_duration_partial() {
        assert_eq!(parse_huntbot_duration("45m"), Duration::from_secs(2700));
        assert_eq!(parse_huntbot_duration("3h"), Duration::from_secs(10800));
        assert_eq!(parse_huntbot_duration("garbage"), Duration::ZERO);
    }

    #[test]
    fn test_back_in_phrase_capture() {
        let caps = back_in_regex()
            .captures("i will be back in 1h 23m with your animals")
            .unwrap();
        assert_eq!(parse_huntbot_duration(&caps[1]), Duration::from_secs(4980));
    }

    #[test]
    fn test_optimal_cowoncy() {
        let greeting =
            "BEEP. BOOP. I am HuntBot!\nCurrent max autohunt: 6 hours for 24,500 cowoncy";
        assert_eq!(parse_optimal_cowoncy(greeting), 24500);
    }

    #[test]
    fn test_cowoncy_default_on_missing_line() {
        assert_eq!(parse_optimal_cowoncy("beep. boop. i am huntbot"), 20000);
    }
}
