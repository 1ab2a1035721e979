use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use bringup_core::clock::MonotonicInstant;
use bringup_core::config::{CameraConfig, UploadMode, UploadTarget, WifiCredentials};
use bringup_core::journal::BootJournal;
use bringup_core::orchestrator::{BootOrchestrator, BootOutcome, BringupSettings};
use bringup_core::supervisor::{LoopSupervisor, TickOutcome};
use embassy_futures::block_on;

use crate::board::{self, FaultTarget, SharedSim, SimBoard, SimInstant, SimState};
use crate::command::{self, BootKind, Command, HealTarget};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "boot",
        "boot <power-on|software|brownout|deep-sleep|other>  - run bring-up after that reset",
    ),
    (
        "fail",
        "fail <storage|client|ap|time|config|collaborators|power|runtime>  - inject a fault",
    ),
    ("heal", "heal <target|all>             - clear injected faults"),
    (
        "power-loss",
        "power-loss                    - scramble retained memory",
    ),
    (
        "tick",
        "tick [n]                      - run n supervisor ticks on a running boot",
    ),
    (
        "status",
        "status                        - display board and boot state",
    ),
    ("help", "help [topic]                  - show help for a command"),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Interactive,
    Healthy,
    AccessPointFallback,
    NetworkDown,
    Brownout,
    NoCard,
}

impl TranscriptProfile {
    pub const SCENARIOS: [TranscriptProfile; 5] = [
        TranscriptProfile::Healthy,
        TranscriptProfile::AccessPointFallback,
        TranscriptProfile::NetworkDown,
        TranscriptProfile::Brownout,
        TranscriptProfile::NoCard,
    ];

    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "transcripts/emulator-session.log",
            TranscriptProfile::Healthy => "transcripts/scenario-a-healthy.log",
            TranscriptProfile::AccessPointFallback => "transcripts/scenario-b-ap-fallback.log",
            TranscriptProfile::NetworkDown => "transcripts/scenario-c-network-down.log",
            TranscriptProfile::Brownout => "transcripts/scenario-d-brownout.log",
            TranscriptProfile::NoCard => "transcripts/scenario-e-no-card.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "tlc32 emulator session",
            TranscriptProfile::Healthy => "Scenario A: power-on, client joins, time syncs",
            TranscriptProfile::AccessPointFallback => {
                "Scenario B: power-on, client never joins, access point comes up"
            }
            TranscriptProfile::NetworkDown => "Scenario C: power-on, no network at all",
            TranscriptProfile::Brownout => "Scenario D: brownout reset",
            TranscriptProfile::NoCard => "Scenario E: power-on without a card",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        match tag.to_ascii_lowercase().as_str() {
            "interactive" | "session" => Ok(Self::Interactive),
            "a" | "healthy" => Ok(Self::Healthy),
            "b" | "ap-fallback" => Ok(Self::AccessPointFallback),
            "c" | "network-down" => Ok(Self::NetworkDown),
            "d" | "brownout" => Ok(Self::Brownout),
            "e" | "no-card" => Ok(Self::NoCard),
            _ => Err(format!("Unknown transcript profile `{tag}`")),
        }
    }

    /// Console lines that reproduce the scenario.
    pub fn script(self) -> &'static [&'static str] {
        match self {
            TranscriptProfile::Interactive => &[],
            TranscriptProfile::Healthy => &["boot power-on", "tick 2", "status"],
            TranscriptProfile::AccessPointFallback => &["fail client", "boot power-on", "status"],
            TranscriptProfile::NetworkDown => &["fail client", "fail ap", "boot power-on", "status"],
            TranscriptProfile::Brownout => &["boot power-on", "boot brownout", "status"],
            TranscriptProfile::NoCard => &["fail storage", "boot power-on", "status"],
        }
    }
}

/// Drives the simulated board from console commands.
pub struct Session {
    sim: SharedSim,
    defaults: CameraConfig,
    settings: BringupSettings,
    supervisor: Option<LoopSupervisor<SimBoard>>,
    last_outcome: Option<BootOutcome>,
    boots: u32,
    transcript: TranscriptLogger,
    started_at: HostInstant,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        Ok(Self {
            sim: SimState::new(),
            defaults: bench_defaults(),
            settings: BringupSettings::default(),
            supervisor: None,
            last_outcome: None,
            boots: 0,
            transcript,
            started_at: HostInstant::now(),
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let responses = match command::parse(trimmed) {
            Ok(command) => self.dispatch(command),
            Err(err) => vec![format!("error: {err}")],
        };

        let elapsed = self.started_at.elapsed();
        for response in &responses {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, response)?;
        }
        Ok(responses)
    }

    fn dispatch(&mut self, command: Command) -> Vec<String> {
        match command {
            Command::Boot(kind) => self.boot(kind),
            Command::Fail(target) => {
                self.sim.borrow_mut().faults.insert(target);
                vec![format!("fault injected: {target}")]
            }
            Command::Heal(HealTarget::One(target)) => {
                self.sim.borrow_mut().faults.remove(target);
                vec![format!("fault cleared: {target}")]
            }
            Command::Heal(HealTarget::All) => {
                self.sim.borrow_mut().faults.clear();
                vec!["all faults cleared".to_string()]
            }
            Command::PowerLoss => {
                self.sim.borrow_mut().counter.lose_power();
                self.supervisor = None;
                vec!["power lost; retained memory scrambled".to_string()]
            }
            Command::Tick(count) => self.tick(count),
            Command::Status => self.status(),
            Command::Help(topic) => help(topic.as_deref()),
        }
    }

    fn boot(&mut self, kind: BootKind) -> Vec<String> {
        self.supervisor = None;
        let code = kind.reset_code();
        let booted_at = {
            let mut sim = self.sim.borrow_mut();
            sim.reset(code);
            sim.drain_log();
            sim.now
        };
        self.boots += 1;

        let components = board::components(&self.sim, &self.defaults);
        let mut orchestrator = BootOrchestrator::<SimBoard>::new(components, self.settings);
        let report = block_on(orchestrator.bring_up());

        let mut lines = vec![format!("boot #{} after {} ({code})", self.boots, kind.tag())];
        lines.extend(self.drain_log_lines());
        lines.extend(journal_lines(orchestrator.journal()));

        let spent = self.sim.borrow().now.saturating_duration_since(booted_at);
        let context = &report.context;
        let outcome = report
            .outcome()
            .map_or_else(|| "none".to_string(), ToString::to_string);
        lines.push(format!(
            "outcome: {outcome} | boot-count={} | network={} | time-valid={} | elapsed={}",
            context.boot_count,
            context.network_mode(),
            context.time_valid,
            format_duration_short(spent)
        ));
        if let Some(plan) = &report.retreat {
            lines.push(format!(
                "deep sleep {} ({})",
                format_duration_short(plan.duration),
                plan.reason
            ));
        }

        self.last_outcome = report.outcome().cloned();
        if report.is_running() {
            self.supervisor = orchestrator.into_supervisor().ok();
        }
        lines
    }

    fn tick(&mut self, count: u32) -> Vec<String> {
        let Some(supervisor) = self.supervisor.as_mut() else {
            return vec!["no running boot; use `boot` first".to_string()];
        };

        let mut lines = Vec::new();
        let mut retreat = None;
        for _ in 0..count {
            match block_on(supervisor.tick()) {
                TickOutcome::Healthy => {
                    lines.push(format!("tick {}: healthy", supervisor.ticks()));
                }
                TickOutcome::Retreat(plan) => {
                    lines.push(format!(
                        "tick {}: {} -> deep sleep {}",
                        supervisor.ticks(),
                        plan.reason,
                        format_duration_short(plan.duration)
                    ));
                    retreat = Some(plan);
                    break;
                }
            }
        }
        lines.extend(self.drain_log_lines());

        if let Some(plan) = retreat {
            self.last_outcome = Some(BootOutcome::Retreat(plan.reason));
            self.supervisor = None;
        }
        lines
    }

    fn status(&self) -> Vec<String> {
        let sim = self.sim.borrow();
        let faults: Vec<&str> = sim.faults.iter().map(FaultTarget::tag).collect();
        let faults = if faults.is_empty() {
            "none".to_string()
        } else {
            faults.join(", ")
        };
        let retained = sim
            .stored_count()
            .map_or_else(|| "invalid".to_string(), |count| count.to_string());
        let outcome = self
            .last_outcome
            .as_ref()
            .map_or_else(|| "not booted".to_string(), ToString::to_string);

        let mut lines = vec![
            format!("boots this session: {}", self.boots),
            format!("retained boot count: {retained}"),
            format!("last outcome: {outcome}"),
            format!("injected faults: {faults}"),
            format!(
                "config file: {}",
                if sim.config_file.is_some() { "present" } else { "absent" }
            ),
            format!(
                "capture tasks: {}",
                if sim.tasks_running { "running" } else { "stopped" }
            ),
            format!(
                "deep sleeps: {} | captures: {} | virtual clock: {}",
                sim.sleeps.len(),
                sim.captures,
                format_duration_short(sim.now.since_start())
            ),
        ];
        if let Some(supervisor) = &self.supervisor {
            lines.push(format!(
                "supervisor: {} ticks every {}",
                supervisor.ticks(),
                format_duration_short(supervisor.interval())
            ));
        }
        lines
    }

    fn drain_log_lines(&self) -> Vec<String> {
        self.sim
            .borrow_mut()
            .drain_log()
            .into_iter()
            .map(|line| format!("  log  {line}"))
            .collect()
    }
}

fn bench_defaults() -> CameraConfig {
    CameraConfig {
        wifi: WifiCredentials::new("studio", "hunter22").unwrap_or_default(),
        upload: UploadTarget::new("uploads.example.net", "tlc32", "secret").unwrap_or_default(),
        upload_mode: UploadMode::On,
        ..CameraConfig::default()
    }
}

fn journal_lines(journal: &BootJournal<SimInstant>) -> Vec<String> {
    journal
        .oldest_first()
        .map(|record| {
            format!(
                "  #{:<3} +{:>8}  {}",
                record.id,
                format_duration_short(journal.offset_of(record)),
                record.event
            )
        })
        .collect()
}

fn help(topic: Option<&str>) -> Vec<String> {
    match topic {
        None => {
            let mut lines = vec![format!("topics: {}", help_topic_list())];
            lines.extend(HELP_TOPICS.iter().map(|(_, usage)| (*usage).to_string()));
            lines.push("exit                          - leave the emulator".to_string());
            lines
        }
        Some(topic) => match HELP_TOPICS.iter().find(|(name, _)| *name == topic) {
            Some((_, usage)) => vec![(*usage).to_string()],
            None => vec![format!(
                "no help for `{topic}`; topics: {}",
                help_topic_list()
            )],
        },
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# {}", profile.header())?;
        writeln!(logger.writer, "# Timestamps are host milliseconds since session start")?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(TranscriptProfile::Interactive).unwrap()
    }

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).unwrap()
    }

    #[test]
    fn power_on_boot_reaches_running_and_ticks() {
        let mut session = session();

        let boot = run(&mut session, "boot power-on");
        let outcome = boot.last().unwrap();
        assert!(outcome.starts_with("outcome: running | boot-count=1 | network=client"));
        assert!(boot.iter().any(|line| line == "  log  boot:1"));

        let ticks = run(&mut session, "tick 2");
        assert_eq!(ticks[..2], ["tick 1: healthy", "tick 2: healthy"]);

        let status = run(&mut session, "status");
        assert!(status.iter().any(|line| line == "capture tasks: running"));
    }

    #[test]
    fn malformed_card_config_is_left_in_place() {
        let mut session = session();
        let hand_edited = "wifi.ssid = studio\nwifi.chanel = 6\n";
        session.sim.borrow_mut().config_file = Some(hand_edited.to_owned());

        let boot = run(&mut session, "boot power-on");
        assert!(boot.iter().any(|line| line.contains("config unreadable")));
        assert_eq!(
            session.sim.borrow().config_file.as_deref(),
            Some(hand_edited)
        );
    }

    #[test]
    fn runtime_fault_ends_the_supervisor() {
        let mut session = session();
        run(&mut session, "boot power-on");
        run(&mut session, "fail runtime");

        let ticks = run(&mut session, "tick 5");
        assert!(ticks[0].starts_with("tick 1: unhandled fault: capture task stalled"));
        assert_eq!(
            run(&mut session, "tick"),
            ["no running boot; use `boot` first"]
        );
    }

    #[test]
    fn brownout_retreats_without_mounting() {
        let mut session = session();
        run(&mut session, "boot power-on");

        let boot = run(&mut session, "boot brownout");
        assert!(boot.iter().any(|line| line.starts_with("outcome: retreat")));
        assert!(boot.iter().any(|line| line.contains("boot-count=2")));
        assert!(!boot.iter().any(|line| line.contains("SD card")));
    }

    #[test]
    fn missing_card_retreats() {
        let mut session = session();
        run(&mut session, "fail storage");

        let boot = run(&mut session, "boot power-on");
        assert!(boot.iter().any(|line| line.starts_with("deep sleep 600.000s (storage mount failed)")));
    }

    #[test]
    fn power_loss_restarts_the_count() {
        let mut session = session();
        run(&mut session, "boot power-on");
        run(&mut session, "boot software");
        run(&mut session, "power-loss");

        let boot = run(&mut session, "boot power-on");
        assert!(boot.last().unwrap().contains("boot-count=1"));
    }

    #[test]
    fn unknown_commands_report_errors() {
        let mut session = session();
        assert_eq!(run(&mut session, "reboot"), ["error: unknown command `reboot`"]);
        assert_eq!(run(&mut session, "help tick"), [HELP_TOPICS[4].1]);
    }
}
