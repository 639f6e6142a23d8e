//! Simulation Orchestrator
//!
//! Drives one full race through the contract: setup, betting, the race
//! itself, then results and reward distribution. Every step is logged;
//! observers follow along through `subscribe`.

use crate::config::ConsoleConfig;
use crate::ledger::{LedgerClient, LedgerError, RaceContract};
use crate::race::shuffle::{lap_bar, simulate_race};
use crate::race::{format_tokens, Horse, RaceResult, RaceStatus, Shuffler};
use crate::simulation::delay::Delay;
use crate::simulation::log::{LogCategory, LogEntry, Phase, SimEvent};
use crate::simulation::payout::Payout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

const RULE: &str = "═══════════════════════════════════════";

/// Failures that abort a run
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("A race needs at least 3 horses, got {0}")]
    NotEnoughHorses(usize),

    #[error("Total pot of {0} bets does not fit in a balance")]
    PotOverflow(usize),
}

/// How a `run` or `reset` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Every step went through
    Completed(T),
    /// A required call failed; the error was logged
    Aborted(String),
    /// Another run was already active
    Rejected,
    /// No connection or no signing account
    NotReady,
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

/// Contract state read back after the rewards went out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalState {
    pub status: Option<RaceStatus>,
    pub winners: Vec<u32>,
    pub rewards: usize,
}

/// Everything a completed run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub race: RaceResult,
    /// Bets reported by the contract during results
    pub bets_found: usize,
    pub payout: Payout,
    /// Reward calls that went through
    pub rewards_issued: usize,
    pub final_state: FinalState,
    pub log: Vec<LogEntry>,
}

/// Releases the running flag when a run ends, however it ends
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Main simulation orchestrator
pub struct Orchestrator<L: LedgerClient> {
    config: ConsoleConfig,
    contract: RaceContract<L>,
    delay: Box<dyn Delay>,
    shuffler: Mutex<Box<dyn Shuffler>>,
    running: AtomicBool,
    log: Mutex<Vec<LogEntry>>,
    phase: Mutex<Phase>,
    events: broadcast::Sender<SimEvent>,
}

impl<L: LedgerClient> Orchestrator<L> {
    /// Create a new orchestrator over `ledger`
    pub fn new(
        config: ConsoleConfig,
        ledger: L,
        delay: Box<dyn Delay>,
        shuffler: Box<dyn Shuffler>,
    ) -> Self {
        let (events, _) = broadcast::channel(512);
        Self {
            config,
            contract: RaceContract::new(ledger),
            delay,
            shuffler: Mutex::new(shuffler),
            running: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
            phase: Mutex::new(Phase::Idle),
            events,
        }
    }

    pub fn contract(&self) -> &RaceContract<L> {
        &self.contract
    }

    /// Follow log lines and phase changes as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the log
    pub fn log(&self) -> Vec<LogEntry> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn phase(&self) -> Phase {
        self.phase.lock().map(|p| *p).unwrap_or(Phase::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the complete simulation.
    ///
    /// Never fails: problems end up in the log and in the returned outcome.
    pub async fn run(&self) -> Outcome<Box<RunReport>> {
        let Some(_guard) = self.try_begin() else {
            debug!("Simulation already running, ignoring run request");
            return Outcome::Rejected;
        };

        if !self.contract.is_ready() {
            self.emit("Please connect wallet and contract first!", LogCategory::Error);
            return Outcome::NotReady;
        }

        self.clear_log();
        info!("Starting race simulation...");

        let outcome = match self.run_phases().await {
            Ok(report) => {
                info!(
                    "Simulation complete: {} winner(s), {} reward(s) issued",
                    report.payout.winners.len(),
                    report.rewards_issued
                );
                Outcome::Completed(Box::new(report))
            }
            Err(e) => {
                self.emit(format!("Error: {e}"), LogCategory::Error);
                Outcome::Aborted(e.to_string())
            }
        };

        self.set_phase(Phase::Idle);
        outcome
    }

    /// Put the contract back to PENDING with no winners
    pub async fn reset(&self) -> Outcome<()> {
        let Some(_guard) = self.try_begin() else {
            debug!("Simulation running, ignoring reset request");
            return Outcome::Rejected;
        };

        if !self.contract.is_ready() {
            self.emit("Please connect wallet and contract first!", LogCategory::Error);
            return Outcome::NotReady;
        }

        self.emit("Resetting contract state...", LogCategory::Info);
        match self.reset_contract().await {
            Ok(()) => Outcome::Completed(()),
            Err(e) => {
                self.emit(format!("Error: {e}"), LogCategory::Error);
                Outcome::Aborted(e.to_string())
            }
        }
    }

    async fn reset_contract(&self) -> Result<(), LedgerError> {
        self.contract.set_status(RaceStatus::Pending).await?;
        self.emit("✓ Status reset to PENDING", LogCategory::Success);
        self.contract.set_winners(0, 0).await?;
        self.emit("✓ Winners reset", LogCategory::Success);
        self.emit("Contract reset complete!", LogCategory::Success);
        Ok(())
    }

    async fn run_phases(&self) -> Result<RunReport, SimulationError> {
        let started_at = Utc::now();

        self.setup_phase().await?;
        self.betting_phase().await;
        let race = self.racing_phase().await?;
        let (bets_found, payout, rewards_issued) = self.results_phase(&race).await?;
        let final_state = self.final_state().await;

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            race,
            bets_found,
            payout,
            rewards_issued,
            final_state,
            log: self.log(),
        })
    }

    /// Phase 1: reset status, enter the horses
    async fn setup_phase(&self) -> Result<(), SimulationError> {
        self.set_phase(Phase::Setup);
        self.emit(RULE, LogCategory::Header);
        self.emit("🏇 KARERA DS - HORSE RACING SIMULATION 🏇", LogCategory::Header);
        self.emit(RULE, LogCategory::Header);
        self.blank();
        self.emit("📋 PHASE 1: SETUP", LogCategory::Phase);
        self.emit("Setting up the race...", LogCategory::Info);
        self.pause(self.config.pacing.phase()).await;

        self.emit(
            format!("Resetting race status to PENDING ({})...", RaceStatus::Pending.code()),
            LogCategory::Info,
        );
        self.contract.set_status(RaceStatus::Pending).await?;
        self.emit("✓ Status set to PENDING", LogCategory::Success);
        self.pause(self.config.pacing.step()).await;

        self.emit("Adding horses to the race...", LogCategory::Info);
        for horse in &self.config.horses {
            match self.contract.add_horse(horse).await {
                Ok(_) => self.emit(
                    format!("  ✓ Added Horse #{}: {}", horse.id, horse.name),
                    LogCategory::Success,
                ),
                Err(e) => {
                    debug!("addHorse #{} failed: {}", horse.id, e);
                    self.emit(
                        format!("  → Horse #{} may already exist, continuing...", horse.id),
                        LogCategory::Warning,
                    );
                }
            }
            self.pause(self.config.pacing.horse()).await;
        }

        self.blank();
        self.emit("🐴 Horses in this race:", LogCategory::Info);
        for horse in &self.config.horses {
            self.emit(format!("   [{}] {}", horse.id, horse.name), LogCategory::Info);
        }
        self.blank();
        Ok(())
    }

    /// Phase 2: place every simulated bet, failures do not stop the rest
    async fn betting_phase(&self) {
        self.set_phase(Phase::Betting);
        self.emit("📋 PHASE 2: BETTING", LogCategory::Phase);
        self.emit("Opening betting window...", LogCategory::Info);
        self.pause(self.config.pacing.phase()).await;

        let bets = &self.config.bets;
        self.emit(format!("Placing {} simulated bets...", bets.len()), LogCategory::Info);
        for (i, bet) in bets.iter().enumerate() {
            match self.contract.add_bet(&bet.choice, bet.amount).await {
                Ok(_) => self.emit(
                    format!(
                        "  ✓ Bet #{}: Horses [{}] - Amount: {} tokens",
                        i + 1,
                        join_ids(&bet.choice),
                        format_tokens(bet.amount)
                    ),
                    LogCategory::Success,
                ),
                Err(e) => self.emit(format!("  ✗ Bet #{} failed: {}", i + 1, e), LogCategory::Error),
            }
            self.pause(self.config.pacing.step()).await;
        }
        self.blank();
    }

    /// Phase 3: start the race, show the laps, record the winners.
    ///
    /// Lap snapshots are independent shuffles for display only; the final
    /// standings come from one more shuffle.
    async fn racing_phase(&self) -> Result<RaceResult, SimulationError> {
        self.set_phase(Phase::Racing);
        self.emit("📋 PHASE 3: THE RACE", LogCategory::Phase);
        self.emit("Starting the race...", LogCategory::Info);
        self.contract.set_status(RaceStatus::Started).await?;
        self.emit("✓ Race status set to STARTED", LogCategory::Success);
        self.pause(self.config.pacing.phase()).await;

        self.blank();
        self.emit("🏁 AND THEY'RE OFF! 🏁", LogCategory::Race);
        self.blank();

        let laps = self.config.laps;
        for lap in 1..=laps {
            self.emit(format!("--- Lap {lap}/{laps} ---"), LogCategory::Race);
            let positions = self.shuffle();
            for (idx, horse) in positions.iter().enumerate() {
                self.emit(
                    format!("  {} #{} {}", lap_bar(idx, positions.len()), horse.id, horse.name),
                    LogCategory::Race,
                );
            }
            self.blank();
            self.pause(self.config.pacing.lap()).await;
        }

        let race = self.final_standings()?;
        self.emit("🏆 FINAL RESULTS 🏆", LogCategory::Race);
        self.emit(
            format!("  🥇 1st Place: #{} {}", race.first.id, race.first.name),
            LogCategory::Success,
        );
        self.emit(
            format!("  🥈 2nd Place: #{} {}", race.second.id, race.second.name),
            LogCategory::Success,
        );
        self.emit(
            format!("  🥉 3rd Place: #{} {}", race.third.id, race.third.name),
            LogCategory::Info,
        );
        self.blank();

        let (first, second) = race.winning_pair();
        self.emit("Recording winners on blockchain...", LogCategory::Info);
        self.contract.set_winners(first, second).await?;
        self.emit("✓ Winners recorded!", LogCategory::Success);
        self.pause(self.config.pacing.step()).await;

        self.contract.add_winning_combination(first, second).await?;
        self.emit(
            format!("✓ Winning combination added: [{first}, {second}]"),
            LogCategory::Success,
        );
        self.blank();
        Ok(race)
    }

    /// Phase 4: finish the race and pay the bets covering both winners
    async fn results_phase(
        &self,
        race: &RaceResult,
    ) -> Result<(usize, Payout, usize), SimulationError> {
        self.set_phase(Phase::Results);
        self.emit("📋 PHASE 4: RESULTS & REWARDS", LogCategory::Phase);
        self.contract.set_status(RaceStatus::Finished).await?;
        self.emit("✓ Race status set to FINISHED", LogCategory::Success);
        self.pause(self.config.pacing.step()).await;

        self.emit("Calculating rewards...", LogCategory::Info);
        let bets = self.contract.bets().await.unwrap_or_else(|e| {
            debug!("getBets failed: {}", e);
            Vec::new()
        });
        self.emit(format!("Found {} bets to process", bets.len()), LogCategory::Info);

        let (first, second) = race.winning_pair();
        let payout = Payout::compute(&bets, first, second)
            .ok_or(SimulationError::PotOverflow(bets.len()))?;
        self.emit(
            format!("Total pot: {} tokens", format_tokens(payout.total_pot)),
            LogCategory::Info,
        );
        self.emit(format!("Winning bets: {}", payout.winners.len()), LogCategory::Info);

        let mut rewards_issued = 0;
        if payout.winners.is_empty() {
            self.emit("No winning bets this race. House wins!", LogCategory::Warning);
        } else {
            self.blank();
            self.emit("💰 DISTRIBUTING REWARDS 💰", LogCategory::Reward);
            for winner in &payout.winners {
                match self.contract.add_reward(&winner.bettor, payout.reward_per_winner).await {
                    Ok(_) => {
                        rewards_issued += 1;
                        self.emit(
                            format!(
                                "  ✓ Reward of {} tokens to {}...",
                                format_tokens(payout.reward_per_winner),
                                short_address(&winner.bettor)
                            ),
                            LogCategory::Success,
                        );
                    }
                    Err(e) => {
                        self.emit(format!("  ✗ Failed to add reward: {e}"), LogCategory::Error)
                    }
                }
            }
        }

        self.blank();
        self.emit(RULE, LogCategory::Header);
        self.emit("🎉 SIMULATION COMPLETE! 🎉", LogCategory::Header);
        self.emit(RULE, LogCategory::Header);
        Ok((bets.len(), payout, rewards_issued))
    }

    /// Read back status, winners and rewards for the closing summary.
    /// Query failures show up as missing values.
    async fn final_state(&self) -> FinalState {
        self.blank();
        self.emit("📊 FINAL CONTRACT STATE:", LogCategory::Phase);

        let status = self.contract.status().await.ok();
        let winners = self.contract.winners().await.unwrap_or_default();
        let rewards = self.contract.rewards().await.map(|r| r.len()).unwrap_or(0);

        let status_label = status.map_or_else(|| "Unknown".to_string(), |s| s.to_string());
        self.emit(format!("  Status: {status_label}"), LogCategory::Info);
        let winners_label = if winners.is_empty() {
            "N/A".to_string()
        } else {
            join_ids(&winners)
        };
        self.emit(format!("  Winners: [{winners_label}]"), LogCategory::Info);
        self.emit(format!("  Total Rewards: {rewards}"), LogCategory::Info);

        FinalState {
            status,
            winners,
            rewards,
        }
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                running: &self.running,
            })
    }

    fn shuffle(&self) -> Vec<Horse> {
        self.shuffler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .order(&self.config.horses)
    }

    fn final_standings(&self) -> Result<RaceResult, SimulationError> {
        let mut shuffler = self
            .shuffler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        simulate_race(&mut **shuffler, &self.config.horses)
            .ok_or(SimulationError::NotEnoughHorses(self.config.horses.len()))
    }

    async fn pause(&self, duration: Duration) {
        self.delay.pause(duration).await;
    }

    fn set_phase(&self, phase: Phase) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
        debug!("Phase -> {}", phase);
        let _ = self.events.send(SimEvent::Phase(phase));
    }

    fn clear_log(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
        let _ = self.events.send(SimEvent::Cleared);
    }

    fn blank(&self) {
        self.emit("", LogCategory::Info);
    }

    fn emit(&self, message: impl Into<String>, category: LogCategory) {
        let entry = LogEntry::new(message, category);
        entry.trace();
        if let Ok(mut log) = self.log.lock() {
            log.push(entry.clone());
        }
        let _ = self.events.send(SimEvent::Log(entry));
    }
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
}

/// First ten characters of an address
fn short_address(address: &str) -> String {
    address.chars().take(10).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::contract::methods;
    use crate::ledger::MemoryLedger;
    use crate::race::ScriptedShuffler;
    use crate::simulation::delay::NoDelay;
    use async_trait::async_trait;
    use serde_json::json;

    const SIGNER: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    /// Yields to the scheduler instead of sleeping
    struct YieldDelay;

    #[async_trait]
    impl Delay for YieldDelay {
        async fn pause(&self, _duration: Duration) {
            tokio::task::yield_now().await;
        }
    }

    fn orchestrator(ledger: MemoryLedger, order: Vec<u32>) -> Orchestrator<MemoryLedger> {
        Orchestrator::new(
            ConsoleConfig::quick_test(),
            ledger,
            Box::new(NoDelay),
            Box::new(ScriptedShuffler::repeating(order, 4)),
        )
    }

    fn phase_markers(log: &[LogEntry]) -> Vec<String> {
        log.iter()
            .filter(|e| e.category == LogCategory::Phase && e.message.contains("PHASE"))
            .map(|e| e.message.clone())
            .collect()
    }

    fn report(outcome: Outcome<Box<RunReport>>) -> Box<RunReport> {
        match outcome {
            Outcome::Completed(report) => report,
            other => panic!("run did not complete: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_run_pays_matching_bet() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        let orch = orchestrator(ledger.clone(), vec![1, 2, 3, 4, 5, 6]);

        let report = report(orch.run().await);

        assert_eq!(report.race.winning_pair(), (1, 2));
        assert_eq!(report.bets_found, 3);
        assert_eq!(report.payout.total_pot, 4_500_000_000_000);
        assert_eq!(report.payout.winners.len(), 1);
        assert_eq!(report.rewards_issued, 1);
        assert_eq!(report.final_state.status, Some(RaceStatus::Finished));
        assert_eq!(report.final_state.winners, vec![1, 2]);
        assert_eq!(report.final_state.rewards, 1);

        let state = ledger.state();
        assert_eq!(state.horses.len(), 6);
        assert_eq!(state.winning_combinations, vec![(1, 2)]);
        assert_eq!(state.rewards[0].amount, 4_500_000_000_000);
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn test_phase_markers_in_order() {
        let orch = orchestrator(MemoryLedger::with_signer(SIGNER), vec![3, 4]);
        let mut events = orch.subscribe();

        assert!(orch.run().await.is_completed());

        assert_eq!(
            phase_markers(&orch.log()),
            vec![
                "📋 PHASE 1: SETUP",
                "📋 PHASE 2: BETTING",
                "📋 PHASE 3: THE RACE",
                "📋 PHASE 4: RESULTS & REWARDS",
            ]
        );

        let mut phases = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SimEvent::Phase(phase) = event {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![Phase::Setup, Phase::Betting, Phase::Racing, Phase::Results, Phase::Idle]
        );
    }

    #[tokio::test]
    async fn test_fixed_bet_data_single_reward() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.respond(
            methods::GET_BETS,
            json!({"Ok": [{"bettor": "A", "amount": "1000000000000", "choice": ["1", "2"]}]}),
        );
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        let report = report(orch.run().await);

        assert_eq!(report.payout.winners.len(), 1);
        assert_eq!(report.payout.winners[0].bettor, "A");

        let rewards = ledger.calls_to(methods::ADD_REWARD);
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].args, vec![json!("A"), json!("1000000000000")]);
    }

    #[tokio::test]
    async fn test_no_winners_no_rewards() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        let orch = orchestrator(ledger.clone(), vec![6, 3]);

        let report = report(orch.run().await);

        assert!(report.payout.winners.is_empty());
        assert_eq!(report.rewards_issued, 0);
        assert!(ledger.calls_to(methods::ADD_REWARD).is_empty());
        assert!(orch
            .log()
            .iter()
            .any(|e| e.message == "No winning bets this race. House wins!"));
    }

    #[tokio::test]
    async fn test_horse_failure_does_not_stop_setup() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.reject_when(methods::ADD_HORSE, json!(2), "HorseAlreadyExists");
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        assert!(orch.run().await.is_completed());

        assert_eq!(ledger.calls_to(methods::ADD_HORSE).len(), 6);
        let ids: Vec<u32> = ledger.state().horses.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 3, 4, 5, 6]);

        let warnings: Vec<_> = orch
            .log()
            .into_iter()
            .filter(|e| e.category == LogCategory::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("Horse #2 may already exist"));
    }

    #[tokio::test]
    async fn test_second_run_reports_existing_horses() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        let orch = Orchestrator::new(
            ConsoleConfig::quick_test(),
            ledger.clone(),
            Box::new(NoDelay),
            Box::new(ScriptedShuffler::default()),
        );

        assert!(orch.run().await.is_completed());
        assert!(orch.run().await.is_completed());

        let warnings = orch
            .log()
            .iter()
            .filter(|e| e.category == LogCategory::Warning && e.message.contains("may already exist"))
            .count();
        assert_eq!(warnings, 6);
        assert_eq!(ledger.state().bets.len(), 6);
    }

    #[tokio::test]
    async fn test_bet_failure_does_not_stop_betting() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.reject_when(methods::ADD_BET, json!([1, 2]), "InsufficientBalance");
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        let report = report(orch.run().await);

        assert_eq!(ledger.calls_to(methods::ADD_BET).len(), 3);
        assert_eq!(report.bets_found, 2);
        assert!(report.payout.winners.is_empty());
        assert!(orch
            .log()
            .iter()
            .any(|e| e.category == LogCategory::Error && e.message.starts_with("  ✗ Bet #1 failed")));
    }

    #[tokio::test]
    async fn test_status_failure_aborts_run() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.reject_when(methods::SET_STATUS, json!(1), "NotOwner");
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        let outcome = orch.run().await;

        assert!(matches!(outcome, Outcome::Aborted(_)));
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(ledger.calls_to(methods::SET_WINNERS).is_empty());

        let log = orch.log();
        let errors: Vec<_> = log.iter().filter(|e| e.category == LogCategory::Error).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Error: setStatus rejected"));
        assert_eq!(phase_markers(&log).len(), 3);
    }

    fn assert_aborted_once(
        orch: &Orchestrator<MemoryLedger>,
        outcome: Outcome<Box<RunReport>>,
        prefix: &str,
    ) {
        assert!(matches!(outcome, Outcome::Aborted(_)));
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(!orch.is_running());

        let log = orch.log();
        let errors: Vec<_> = log.iter().filter(|e| e.category == LogCategory::Error).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with(prefix), "{}", errors[0].message);
    }

    fn finish_calls(ledger: &MemoryLedger) -> usize {
        ledger
            .calls_to(methods::SET_STATUS)
            .iter()
            .filter(|c| c.args == vec![json!(2)])
            .count()
    }

    #[tokio::test]
    async fn test_pending_status_failure_aborts_setup() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.reject_when(methods::SET_STATUS, json!(0), "NotOwner");
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        let outcome = orch.run().await;

        assert_aborted_once(&orch, outcome, "Error: setStatus rejected");
        assert!(ledger.calls_to(methods::ADD_HORSE).is_empty());
        assert!(ledger.calls_to(methods::ADD_BET).is_empty());
        assert_eq!(phase_markers(&orch.log()).len(), 1);
    }

    #[tokio::test]
    async fn test_set_winners_failure_aborts_run() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.reject(methods::SET_WINNERS, "NotOwner");
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        let outcome = orch.run().await;

        assert_aborted_once(&orch, outcome, "Error: setWinners rejected");
        assert!(ledger.calls_to(methods::ADD_WINNING_COMBINATION).is_empty());
        assert_eq!(finish_calls(&ledger), 0);
        assert!(ledger.calls_to(methods::ADD_REWARD).is_empty());
        assert_eq!(phase_markers(&orch.log()).len(), 3);
    }

    #[tokio::test]
    async fn test_winning_combination_failure_aborts_run() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.reject(methods::ADD_WINNING_COMBINATION, "NotOwner");
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        let outcome = orch.run().await;

        assert_aborted_once(&orch, outcome, "Error: addWinningCombination rejected");
        assert_eq!(ledger.calls_to(methods::SET_WINNERS).len(), 1);
        assert_eq!(finish_calls(&ledger), 0);
        assert!(ledger.calls_to(methods::ADD_REWARD).is_empty());
        assert_eq!(ledger.state().winners, (1, 2));
    }

    #[tokio::test]
    async fn test_pot_overflow_aborts_without_rewards() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        let max = u128::MAX.to_string();
        ledger.respond(
            methods::GET_BETS,
            json!({"Ok": [
                {"bettor": "A", "amount": max, "choice": ["1", "2"]},
                {"bettor": "B", "amount": max, "choice": ["2", "1"]},
            ]}),
        );
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        let outcome = orch.run().await;

        assert_aborted_once(&orch, outcome, "Error: Total pot of 2 bets");
        assert_eq!(finish_calls(&ledger), 1);
        assert!(ledger.calls_to(methods::ADD_REWARD).is_empty());
    }

    #[tokio::test]
    async fn test_reward_failure_is_logged_and_skipped() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.reject(methods::ADD_REWARD, "RewardsClosed");
        let orch = orchestrator(ledger.clone(), vec![1, 2]);

        let report = report(orch.run().await);

        assert_eq!(report.payout.winners.len(), 1);
        assert_eq!(report.rewards_issued, 0);
        assert_eq!(report.final_state.rewards, 0);
    }

    #[tokio::test]
    async fn test_requires_signer() {
        let orch = orchestrator(MemoryLedger::default(), vec![]);

        assert!(matches!(orch.run().await, Outcome::NotReady));
        let log = orch.log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].category, LogCategory::Error);
        assert_eq!(log[0].message, "Please connect wallet and contract first!");

        let orch = orchestrator(MemoryLedger::disconnected(), vec![]);
        assert!(matches!(orch.run().await, Outcome::NotReady));
        assert!(matches!(orch.reset().await, Outcome::NotReady));
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        let orch = Orchestrator::new(
            ConsoleConfig::quick_test(),
            ledger.clone(),
            Box::new(YieldDelay),
            Box::new(ScriptedShuffler::default()),
        );

        let (first, second) = tokio::join!(orch.run(), orch.run());

        assert!(first.is_completed());
        assert!(matches!(second, Outcome::Rejected));
        assert_eq!(phase_markers(&orch.log()).len(), 4);
        assert_eq!(ledger.calls_to(methods::ADD_HORSE).len(), 6);
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn test_reset_sets_pending() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        let orch = orchestrator(ledger.clone(), vec![4, 5]);
        assert!(orch.run().await.is_completed());

        assert!(orch.reset().await.is_completed());

        assert_eq!(orch.contract().status().await.unwrap(), RaceStatus::Pending);
        assert_eq!(orch.contract().winners().await.unwrap(), vec![0, 0]);
        assert!(orch
            .log()
            .iter()
            .any(|e| e.message == "Contract reset complete!"));
    }

    #[tokio::test]
    async fn test_reset_failure_logs_once() {
        let ledger = MemoryLedger::with_signer(SIGNER);
        ledger.reject(methods::SET_WINNERS, "NotOwner");
        let orch = orchestrator(ledger, vec![]);

        assert!(matches!(orch.reset().await, Outcome::Aborted(_)));
        let errors = orch
            .log()
            .iter()
            .filter(|e| e.category == LogCategory::Error)
            .count();
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_short_address() {
        assert_eq!(short_address(SIGNER), "5GrwvaEF5z");
        assert_eq!(short_address("A"), "A");
    }
}
