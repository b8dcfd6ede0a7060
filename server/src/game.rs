//! Authoritative turn-based game state machine.
//!
//! Owns the singleton shared state: inning, outs, score, the current role
//! owners, and the scalars of the pitch in flight. Transitions only happen
//! here; any action arriving from a session that does not hold the required
//! role is a silent no-op with no broadcast (the caller checks the return
//! value and stops).

use crate::scoring;
use crate::session::SessionRegistry;
use log::{debug, info};
use shared::{Flash, GameStatus, HitResult, PitchType, Role, RoleOwner, ServerEvent, SessionId};

/// The process-lifetime game state. Never persisted; restart discards it.
#[derive(Debug, Clone)]
pub struct GameState {
    pub inning: u32,
    pub outs: u32,
    pub score: u32,
    pub status: GameStatus,
    pub pitcher: RoleOwner,
    pub batter: RoleOwner,
    pub pitch_type: Option<PitchType>,
    pub pitch_speed: f64,
    pub pitch_accuracy: f64,
    pub is_cpu_playing: bool,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            inning: 1,
            outs: 0,
            score: 0,
            status: GameStatus::Waiting,
            pitcher: RoleOwner::Cpu,
            batter: RoleOwner::Cpu,
            pitch_type: None,
            pitch_speed: 0.0,
            pitch_accuracy: 0.0,
            is_cpu_playing: false,
        }
    }

    /// Full snapshot for `gameStateUpdate` broadcasts.
    pub fn snapshot(&self) -> ServerEvent {
        ServerEvent::GameStateUpdate {
            inning: self.inning,
            outs: self.outs,
            score: self.score,
            current_pitcher: self.pitcher,
            current_batter: self.batter,
            status: self.status,
        }
    }

    fn is_current_pitcher(&self, id: SessionId) -> bool {
        self.pitcher == RoleOwner::Human(id)
    }

    fn is_current_batter(&self, id: SessionId) -> bool {
        self.batter == RoleOwner::Human(id)
    }

    fn recompute_cpu_flag(&mut self) {
        self.is_cpu_playing = self.pitcher.is_cpu() || self.batter.is_cpu();
    }

    /// A joining human takes over the given role (from the CPU, per the
    /// registry's vacancy rule). Claiming the pitcher slot arms the at-bat.
    pub fn claim_role(&mut self, id: SessionId, role: Role) {
        match role {
            Role::Pitcher => {
                self.pitcher = RoleOwner::Human(id);
                self.status = GameStatus::Pitching;
            }
            Role::Batter => self.batter = RoleOwner::Human(id),
        }
        self.recompute_cpu_flag();
        info!("Session {} now holds the {:?} role", id, role);
    }

    /// A leaver's role reverts to CPU control. Inning and score persist.
    pub fn release_role(&mut self, role: Role) {
        match role {
            Role::Pitcher => self.pitcher = RoleOwner::Cpu,
            Role::Batter => self.batter = RoleOwner::Cpu,
        }
        self.recompute_cpu_flag();
        info!("{:?} role reverted to CPU", role);
    }

    /// Commits a pitch type. Valid only from the current pitcher and only
    /// while no swing is pending; otherwise a silent no-op.
    pub fn select_pitch(&mut self, who: SessionId, pitch_type: PitchType) -> bool {
        if !self.is_current_pitcher(who) || self.status == GameStatus::Batting {
            debug!("Dropping selectPitch from session {}", who);
            return false;
        }

        self.pitch_type = Some(pitch_type);
        self.status = GameStatus::Pitching;
        true
    }

    /// Scores the pitcher's timing submission and opens the swing window.
    /// Returns the derived pitch speed, or `None` for a non-pitcher.
    pub fn apply_pitch(
        &mut self,
        who: SessionId,
        timings: &[f64],
        flash_sequence: &[Flash],
    ) -> Option<f64> {
        if !self.is_current_pitcher(who) {
            debug!("Dropping pitchTiming from session {}", who);
            return None;
        }

        let accuracy = scoring::accuracy(timings, flash_sequence);
        let speed = scoring::speed(timings);
        self.record_pitch(accuracy, speed);
        Some(speed)
    }

    /// Stores a resolved pitch and transitions to the batter's turn. The
    /// CPU pitcher path calls this directly after synthesizing its timings.
    pub fn record_pitch(&mut self, accuracy: f64, speed: f64) {
        self.pitch_accuracy = accuracy;
        self.pitch_speed = speed;
        self.status = GameStatus::Batting;
    }

    /// Scores the batter's timing submission and resolves the at-bat,
    /// applying stats, outs, score, and any inning rollover. Returns the
    /// result to broadcast, or `None` for a non-batter.
    pub fn apply_swing(
        &mut self,
        who: SessionId,
        timings: &[f64],
        flash_sequence: &[Flash],
        registry: &mut SessionRegistry,
    ) -> Option<HitResult> {
        if !self.is_current_batter(who) {
            debug!("Dropping swingTiming from session {}", who);
            return None;
        }

        let swing_accuracy = scoring::accuracy(timings, flash_sequence);
        let swing_power = scoring::speed(timings);
        let result = scoring::resolve_hit(
            swing_accuracy,
            swing_power,
            self.pitch_speed,
            self.pitch_accuracy,
        );
        self.apply_hit_result(&result, registry);
        Some(result)
    }

    /// Applies a resolved at-bat to the shared state: stat increments,
    /// strike/out bookkeeping, scoring, and the inning/role-swap rollover.
    ///
    /// Batter stats live on the batter's session; when the batter is the CPU
    /// (or its session vanished in a disconnect race) there is no record to
    /// update and the bookkeeping is skipped. The global score still moves.
    pub fn apply_hit_result(&mut self, result: &HitResult, registry: &mut SessionRegistry) {
        use shared::HitOutcome::*;

        let stats = self
            .batter
            .human()
            .and_then(|id| registry.session_mut(id))
            .map(|s| &mut s.stats);

        match result.outcome {
            Strike => {
                if let Some(stats) = stats {
                    stats.strikes += 1;
                    if stats.strikes >= 3 {
                        self.outs += 1;
                        stats.strikes = 0;
                        stats.balls = 0;
                        info!("Strikeout; outs now {}", self.outs);
                    }
                }
            }
            Foul => {}
            Hit => {
                if let Some(stats) = stats {
                    stats.hits += 1;
                }
            }
            HomeRun => {
                if let Some(stats) = stats {
                    stats.home_runs += 1;
                    stats.runs += 1;
                }
                self.score += 1;
                info!("Home run; score now {}", self.score);
            }
        }

        if self.outs >= 3 {
            self.advance_inning(registry);
        }

        // The at-bat is settled; the pitcher is up again.
        self.status = GameStatus::Pitching;
    }

    /// Inning rollover: reset outs, swap the pitcher and batter identities,
    /// and flip the role flags on whichever of them are live human sessions.
    fn advance_inning(&mut self, registry: &mut SessionRegistry) {
        self.inning += 1;
        self.outs = 0;

        let new_pitcher = resolve_owner(self.batter, registry);
        let new_batter = resolve_owner(self.pitcher, registry);
        self.pitcher = new_pitcher;
        self.batter = new_batter;

        if let Some(id) = new_pitcher.human() {
            registry.set_role(id, Some(Role::Pitcher));
        }
        if let Some(id) = new_batter.human() {
            registry.set_role(id, Some(Role::Batter));
        }

        self.recompute_cpu_flag();
        info!(
            "Inning {}: roles swapped (pitcher {:?}, batter {:?})",
            self.inning, self.pitcher, self.batter
        );
    }
}

/// Re-resolves a role owner against the registry: an identity whose session
/// is gone (disconnect race) is replaced by CPU control rather than carried
/// forward as a dangling reference.
fn resolve_owner(owner: RoleOwner, registry: &SessionRegistry) -> RoleOwner {
    match owner.human() {
        Some(id) if registry.session(id).is_none() => RoleOwner::Cpu,
        _ => owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::HitOutcome;
    use tokio::sync::mpsc;

    fn strike() -> HitResult {
        HitResult {
            outcome: HitOutcome::Strike,
            power: 0.0,
            accuracy: 0.1,
        }
    }

    /// Registry with two joined humans: (registry, batter_id, pitcher_id).
    fn two_player_setup(game: &mut GameState) -> (SessionRegistry, SessionId, SessionId) {
        let mut registry = SessionRegistry::new(8);
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = registry.connect(tx_a);
        let b = registry.connect(tx_b);

        let role_a = registry.join(a, "A".into()).unwrap().unwrap();
        game.claim_role(a, role_a);
        let role_b = registry.join(b, "B".into()).unwrap().unwrap();
        game.claim_role(b, role_b);

        assert_eq!(role_a, Role::Batter);
        assert_eq!(role_b, Role::Pitcher);
        (registry, a, b)
    }

    #[test]
    fn join_flow_sets_roles_and_cpu_flag() {
        let mut game = GameState::new();
        let mut registry = SessionRegistry::new(8);
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = registry.connect(tx);

        let role = registry.join(a, "A".into()).unwrap().unwrap();
        game.claim_role(a, role);

        // First joiner bats against a CPU pitcher.
        assert_eq!(game.batter, RoleOwner::Human(a));
        assert_eq!(game.pitcher, RoleOwner::Cpu);
        assert!(game.is_cpu_playing);
        assert_eq!(game.status, GameStatus::Waiting);

        let (tx, _rx) = mpsc::unbounded_channel();
        let b = registry.connect(tx);
        let role = registry.join(b, "B".into()).unwrap().unwrap();
        game.claim_role(b, role);

        assert_eq!(game.pitcher, RoleOwner::Human(b));
        assert!(!game.is_cpu_playing);
        assert_eq!(game.status, GameStatus::Pitching);
    }

    #[test]
    fn three_strikes_make_an_out_and_reset_counts() {
        let mut game = GameState::new();
        let (mut registry, batter, _pitcher) = two_player_setup(&mut game);

        game.apply_hit_result(&strike(), &mut registry);
        game.apply_hit_result(&strike(), &mut registry);
        assert_eq!(game.outs, 0);
        assert_eq!(registry.session(batter).unwrap().stats.strikes, 2);

        game.apply_hit_result(&strike(), &mut registry);
        assert_eq!(game.outs, 1);
        let stats = &registry.session(batter).unwrap().stats;
        assert_eq!(stats.strikes, 0);
        assert_eq!(stats.balls, 0);
    }

    #[test]
    fn outs_never_exceed_two_before_rollover() {
        let mut game = GameState::new();
        let (mut registry, _batter, _pitcher) = two_player_setup(&mut game);

        for _ in 0..8 {
            game.apply_hit_result(&strike(), &mut registry);
            assert!(game.outs <= 2);
        }
    }

    #[test]
    fn third_out_rolls_the_inning_and_swaps_roles() {
        let mut game = GameState::new();
        let (mut registry, batter, pitcher) = two_player_setup(&mut game);

        // Nine strikes: three strikeouts, three outs, one rollover.
        for _ in 0..9 {
            game.apply_hit_result(&strike(), &mut registry);
        }

        assert_eq!(game.inning, 2);
        assert_eq!(game.outs, 0);
        assert_eq!(game.pitcher, RoleOwner::Human(batter));
        assert_eq!(game.batter, RoleOwner::Human(pitcher));

        let former_batter = registry.session(batter).unwrap();
        assert!(former_batter.is_pitching);
        assert!(!former_batter.is_batting);
        let former_pitcher = registry.session(pitcher).unwrap();
        assert!(former_pitcher.is_batting);
        assert!(!former_pitcher.is_pitching);
    }

    #[test]
    fn swap_with_vanished_session_reverts_to_cpu() {
        let mut game = GameState::new();
        let (mut registry, batter, pitcher) = two_player_setup(&mut game);

        // The pitcher disconnects between the second and third out.
        game.outs = 2;
        registry.disconnect(pitcher);
        game.release_role(Role::Pitcher);

        game.apply_hit_result(&strike(), &mut registry);
        game.apply_hit_result(&strike(), &mut registry);
        game.apply_hit_result(&strike(), &mut registry);

        assert_eq!(game.inning, 2);
        // The former batter pitches; the vacated side is CPU.
        assert_eq!(game.pitcher, RoleOwner::Human(batter));
        assert_eq!(game.batter, RoleOwner::Cpu);
        assert!(game.is_cpu_playing);
    }

    #[test]
    fn home_run_updates_batter_stats_and_score() {
        let mut game = GameState::new();
        let (mut registry, batter, _pitcher) = two_player_setup(&mut game);

        let result = HitResult {
            outcome: HitOutcome::HomeRun,
            power: 1.5,
            accuracy: 0.95,
        };
        game.apply_hit_result(&result, &mut registry);

        let stats = &registry.session(batter).unwrap().stats;
        assert_eq!(stats.home_runs, 1);
        assert_eq!(stats.runs, 1);
        assert_eq!(game.score, 1);
        assert_eq!(game.status, GameStatus::Pitching);
    }

    #[test]
    fn foul_changes_no_stats() {
        let mut game = GameState::new();
        let (mut registry, batter, _pitcher) = two_player_setup(&mut game);

        let result = HitResult {
            outcome: HitOutcome::Foul,
            power: 0.5,
            accuracy: 0.4,
        };
        game.apply_hit_result(&result, &mut registry);

        assert_eq!(registry.session(batter).unwrap().stats, Default::default());
        assert_eq!(game.outs, 0);
        assert_eq!(game.score, 0);
    }

    #[test]
    fn select_pitch_rejects_wrong_identity_and_mid_swing() {
        let mut game = GameState::new();
        let (_registry, batter, pitcher) = two_player_setup(&mut game);

        // The batter cannot pitch.
        assert!(!game.select_pitch(batter, PitchType::Fastball));
        assert_eq!(game.pitch_type, None);

        assert!(game.select_pitch(pitcher, PitchType::Fastball));
        assert_eq!(game.pitch_type, Some(PitchType::Fastball));

        // Re-selecting before the timing submission is allowed...
        assert!(game.select_pitch(pitcher, PitchType::Curve));

        // ...but not once the pitch is in flight.
        game.record_pitch(1.0, 1.0);
        assert!(!game.select_pitch(pitcher, PitchType::Fastball));
        assert_eq!(game.pitch_type, Some(PitchType::Curve));
    }

    #[test]
    fn pitch_and_swing_reject_wrong_identity() {
        let mut game = GameState::new();
        let (mut registry, batter, pitcher) = two_player_setup(&mut game);
        let seq = scoring::generate_flash_sequence(&mut rand::thread_rng(), 1.0);
        let timings: Vec<f64> = seq.iter().map(|f| f.time_ms).collect();

        assert!(game.apply_pitch(batter, &timings, &seq).is_none());
        assert_eq!(game.status, GameStatus::Pitching);

        assert!(game
            .apply_swing(pitcher, &timings, &seq, &mut registry)
            .is_none());
        assert_eq!(game.score, 0);
    }

    #[test]
    fn perfect_pitch_then_perfect_swing_is_a_home_run() {
        let mut game = GameState::new();
        let (mut registry, batter, pitcher) = two_player_setup(&mut game);
        let mut rng = rand::thread_rng();

        assert!(game.select_pitch(pitcher, PitchType::Fastball));
        let pitch_seq = scoring::generate_flash_sequence(&mut rng, 1.0);
        let timings: Vec<f64> = pitch_seq.iter().map(|f| f.time_ms).collect();

        let speed = game.apply_pitch(pitcher, &timings, &pitch_seq).unwrap();
        assert_eq!(speed, 1.0);
        assert_eq!(game.pitch_accuracy, 1.0);
        assert_eq!(game.status, GameStatus::Batting);

        let swing_seq = scoring::generate_flash_sequence(&mut rng, speed);
        let swing_timings: Vec<f64> = swing_seq.iter().map(|f| f.time_ms).collect();
        let result = game
            .apply_swing(batter, &swing_timings, &swing_seq, &mut registry)
            .unwrap();

        assert_eq!(result.outcome, HitOutcome::HomeRun);
        assert_eq!(game.score, 1);
        assert_eq!(registry.session(batter).unwrap().stats.home_runs, 1);
    }

    #[test]
    fn release_role_restores_cpu_control() {
        let mut game = GameState::new();
        let (_registry, _batter, _pitcher) = two_player_setup(&mut game);
        assert!(!game.is_cpu_playing);

        game.release_role(Role::Pitcher);
        assert_eq!(game.pitcher, RoleOwner::Cpu);
        assert!(game.is_cpu_playing);

        // Inning and score survive the departure.
        assert_eq!(game.inning, 1);
    }
}
