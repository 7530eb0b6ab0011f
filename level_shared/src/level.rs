//! The level aggregate.
//!
//! [`Level`] owns one instance of every core component and is driven from
//! outside: the peer runtime calls [`Level::tick`] on a fixed cadence, feeds
//! relay traffic into [`Level::handle_remote`] and the session callbacks,
//! forwards physics contacts to [`Level::on_collision`], and drains the
//! outbox and event bus afterwards.
//!
//! Online, coins and player avatars are [`NetworkObjects`]; enemies and
//! missiles are pooled on every peer and only their creation is replicated.
//! Offline, everything but the local player comes from the pool.

use std::{mem, time::Duration};

use anyhow::Context;
use rand::rngs::StdRng;
use tracing::{debug, info, trace, warn};

use crate::{
    authority::{AuthorityRouter, SpawnDecision, SpawnMode},
    config::LevelConfig,
    entity::{
        BodyPose, CollisionTag, Entity, EntityCategory, NetworkId, NetworkIdAllocator,
        PeerOrdinal, Transform,
    },
    event::{EventBus, LevelEvent},
    ledger::{ScoreBoard, SessionScoreLedger},
    math::Vec2,
    net::{CallTarget, Outgoing, RemoteCall, Sound},
    objects::{NetworkObjects, Owner},
    persistence::{HighScore, ScoreStore},
    pool::{EntityHandle, EntityPool, SlotState},
    replication::{PlayerSnapshot, ReplicationChannel},
    session::{LifecycleAction, Panel, SessionLifecycle},
    spawn::{SpawnPolicy, SpawnRequest, Spawner},
};

/// Where player 1 enters the level.
pub const PLAYER1_START: Vec2 = Vec2::new(-6.3, -5.4);
/// Where player 2 enters the level.
pub const PLAYER2_START: Vec2 = Vec2::new(6.3, -5.4);

pub fn start_position(ordinal: PeerOrdinal) -> Vec2 {
    if ordinal == PeerOrdinal::TWO {
        PLAYER2_START
    } else {
        PLAYER1_START
    }
}

/// One side of a contact reported by the physics collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collider {
    /// This peer's own player.
    LocalPlayer,
    Pooled(EntityHandle),
    Network(NetworkId),
    /// Level geometry (ground, walls, pipes).
    Static(CollisionTag),
}

#[derive(Debug)]
struct PlayerSlot {
    /// Offline avatar. Online, the avatar lives in the network objects.
    solo: Entity,
    id: Option<NetworkId>,
    alive: bool,
    respawn_at: Option<Duration>,
}

impl PlayerSlot {
    fn new() -> Self {
        Self {
            solo: Entity::new(EntityCategory::Player),
            id: None,
            alive: false,
            respawn_at: None,
        }
    }
}

pub struct Level {
    config: LevelConfig,
    clock: Duration,
    paused: bool,
    rng: StdRng,
    pool: EntityPool,
    spawners: Vec<Spawner>,
    router: AuthorityRouter,
    objects: NetworkObjects,
    ledger: SessionScoreLedger,
    session: SessionLifecycle,
    replication: ReplicationChannel,
    player_ids: NetworkIdAllocator,
    player: PlayerSlot,
    store: Box<dyn ScoreStore>,
    high_score: HighScore,
    outbox: Vec<Outgoing>,
    events: EventBus,
}

impl Level {
    pub fn new(config: LevelConfig, store: Box<dyn ScoreStore>, rng: StdRng) -> anyhow::Result<Self> {
        let high_score = HighScore::load(store.as_ref(), config.save_slot)
            .with_context(|| format!("load high score slot {}", config.save_slot))?;

        let mut pool = EntityPool::new();
        for category in EntityCategory::ALL {
            pool.populate(category, config.pool.for_category(category));
        }

        let mut spawners = vec![
            Spawner::new(SpawnPolicy::coins()),
            Spawner::new(SpawnPolicy::missiles()),
        ];
        spawners.extend(
            config
                .enemy_spawn_points
                .iter()
                .map(|pipe| Spawner::new(SpawnPolicy::enemies_at(*pipe))),
        );

        let mut events = EventBus::new();
        events.push(LevelEvent::HighScoreLoaded(high_score.value()));

        Ok(Self {
            replication: ReplicationChannel::new(config.send_rate_hz),
            config,
            clock: Duration::ZERO,
            paused: false,
            rng,
            pool,
            spawners,
            router: AuthorityRouter::new(),
            objects: NetworkObjects::new(),
            ledger: SessionScoreLedger::new(),
            session: SessionLifecycle::new(),
            player_ids: NetworkIdAllocator::for_peer(PeerOrdinal::ONE),
            player: PlayerSlot::new(),
            store,
            high_score,
            outbox: Vec::new(),
            events,
        })
    }

    // ─── Accessors ───

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn session(&self) -> &SessionLifecycle {
        &self.session
    }

    pub fn scores(&self) -> ScoreBoard {
        self.ledger.scores()
    }

    pub fn high_score(&self) -> u32 {
        self.high_score.value()
    }

    pub fn store(&self) -> &dyn ScoreStore {
        self.store.as_ref()
    }

    pub fn pool(&self) -> &EntityPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut EntityPool {
        &mut self.pool
    }

    pub fn objects(&self) -> &NetworkObjects {
        &self.objects
    }

    pub fn spawners(&self) -> &[Spawner] {
        &self.spawners
    }

    pub fn spawn_mode(&self) -> SpawnMode {
        self.router.mode()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn player_alive(&self) -> bool {
        self.player.alive
    }

    pub fn local_player_id(&self) -> Option<NetworkId> {
        self.player.id
    }

    /// The entity this peer controls, if it is currently in the level.
    pub fn local_player(&self) -> Option<&Entity> {
        if !self.player.alive {
            return None;
        }
        match self.player.id {
            Some(id) => self.objects.get(id).map(|o| &o.entity),
            None => Some(&self.player.solo),
        }
    }

    /// Remote calls waiting for the relay, oldest first.
    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        mem::take(&mut self.outbox)
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    // ─── Session ───

    pub fn start_solo(&mut self) {
        let actions = self.session.start_solo();
        self.perform(actions);
    }

    pub fn on_joined_room(&mut self, ordinal: PeerOrdinal, peer_count: u8, authority: PeerOrdinal) {
        self.player_ids = NetworkIdAllocator::for_peer(ordinal);
        let actions = self.session.on_joined_room(ordinal, peer_count, authority);
        self.perform(actions);
    }

    pub fn on_peer_joined(&mut self, ordinal: PeerOrdinal, peer_count: u8) {
        debug!(?ordinal, peer_count, "Peer entered room");
        let actions = self.session.on_peer_joined(peer_count);
        self.perform(actions);
    }

    pub fn on_peer_left(
        &mut self,
        ordinal: PeerOrdinal,
        nickname: &str,
        peer_count: u8,
        authority: PeerOrdinal,
    ) {
        let removed = self.objects.remove_owned_by(ordinal);
        debug!(?ordinal, removed, "Dropped objects of departed peer");
        let actions = self.session.on_peer_left(nickname, peer_count, authority);
        self.perform(actions);
    }

    pub fn on_disconnected(&mut self) {
        let actions = self.session.on_disconnected();
        self.perform(actions);
    }

    /// Toggles the pause panel. Offline play also freezes the clock.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        self.events.push(if self.paused {
            LevelEvent::PanelShown(Panel::Pause)
        } else {
            LevelEvent::PanelHidden(Panel::Pause)
        });
    }

    fn perform(&mut self, actions: Vec<LifecycleAction>) {
        for action in actions {
            trace!(?action, "Lifecycle action");
            match action {
                LifecycleAction::StartGame => self.start_game(),
                LifecycleAction::EnableGenerators => self.enable_generators(),
                LifecycleAction::BroadcastEnableGenerators => {
                    self.call(CallTarget::All, RemoteCall::EnableGenerators)
                }
                LifecycleAction::DisableGenerators => self.disable_generators(),
                LifecycleAction::CleanScene => self.clean_scene(),
                LifecycleAction::LeaveRoom => self.events.push(LevelEvent::LeaveRoom),
                LifecycleAction::ShowPanel(panel) => self.events.push(LevelEvent::PanelShown(panel)),
                LifecycleAction::HidePanel(panel) => self.events.push(LevelEvent::PanelHidden(panel)),
                LifecycleAction::ReloadScene => self.events.push(LevelEvent::ReloadScene),
            }
        }
    }

    fn start_game(&mut self) {
        if self.session.is_connected() {
            self.call(CallTarget::All, RemoteCall::ResetScore { is_player1: true });
            self.call(CallTarget::All, RemoteCall::ResetScore { is_player1: false });
            self.instantiate_player();
            return;
        }

        self.paused = false;
        for category in [EntityCategory::Coin, EntityCategory::Enemy, EntityCategory::Missile] {
            self.pool.release_all(category);
        }
        self.objects.clear();
        let board = self.ledger.apply_reset(true);
        self.events.push(LevelEvent::ScoreChanged(board));

        self.player.solo.place(PLAYER1_START);
        self.player.alive = true;
        self.player.respawn_at = None;
        self.events.push(LevelEvent::PlayerSpawned {
            ordinal: PeerOrdinal::ONE,
            position: PLAYER1_START,
        });
        info!("Solo game started");
    }

    /// Creates this peer's avatar and announces it to the room. Every
    /// (re)spawn online also clears the spawning player's own score, so an
    /// online death costs the points collected so far.
    fn instantiate_player(&mut self) {
        if self.player.id.is_some() {
            return;
        }
        let ordinal = self.session.ordinal();
        let position = start_position(ordinal);
        let id = self.player_ids.next_id();

        self.objects
            .spawn(id, EntityCategory::Player, position, Owner::Peer(ordinal));
        self.player.id = Some(id);
        self.player.alive = true;
        self.player.respawn_at = None;
        self.call(
            CallTarget::Others,
            RemoteCall::InstantiatePlayer {
                id,
                ordinal,
                position,
            },
        );
        self.call(
            CallTarget::All,
            RemoteCall::ResetScore {
                is_player1: ordinal == PeerOrdinal::ONE,
            },
        );
        self.events
            .push(LevelEvent::PlayerSpawned { ordinal, position });
        info!(?id, ?ordinal, "Player instantiated");
    }

    fn enable_generators(&mut self) {
        let mode = SpawnMode::resolve(self.session.is_connected(), self.session.ordinal());
        if self.spawners.iter().all(Spawner::is_enabled) {
            debug!("Generators already enabled");
            return;
        }
        self.router.set_mode(mode);
        for spawner in &mut self.spawners {
            spawner.enable(mode, self.clock);
        }
        info!(?mode, "Generators enabled");
    }

    fn disable_generators(&mut self) {
        for spawner in &mut self.spawners {
            spawner.disable();
        }
        info!("Generators disabled");
    }

    /// Removes every transient entity. Online coins go through the
    /// authority with no collector, so nobody scores.
    fn clean_scene(&mut self) {
        self.pool.release_all(EntityCategory::Enemy);
        self.pool.release_all(EntityCategory::Missile);
        if self.session.is_connected() {
            for id in self.objects.ids(EntityCategory::Coin) {
                self.call(
                    CallTarget::Authority,
                    RemoteCall::DestroyCoinOnAuthority {
                        id,
                        collector: PeerOrdinal::NOBODY,
                    },
                );
            }
        } else {
            self.pool.release_all(EntityCategory::Coin);
        }
    }

    // ─── Simulation ───

    pub fn tick(&mut self, dt: Duration) {
        if self.paused && !self.session.is_connected() {
            return;
        }
        self.clock += dt;
        self.pool.advance_movers(dt.as_secs_f32());

        for i in 0..self.spawners.len() {
            if let Some(request) = self.spawners[i].poll(self.clock, &mut self.rng) {
                self.route_spawn(request);
            }
        }

        if let Some(at) = self.player.respawn_at {
            if self.clock >= at && self.session.state().is_online() {
                self.instantiate_player();
            }
        }
    }

    fn route_spawn(&mut self, request: SpawnRequest) {
        match self.router.request_spawn(request, &mut self.pool) {
            SpawnDecision::Local(handle) => {
                trace!(?handle, category = ?request.category, "Spawned locally");
            }
            SpawnDecision::Remote(out) => self.call(out.target, out.call),
            SpawnDecision::Dropped => {}
        }
    }

    /// Issues a remote call. Offline, or when this peer is the addressed
    /// authority, the call runs locally right away.
    pub fn call(&mut self, target: CallTarget, call: RemoteCall) {
        let me = self.session.ordinal();
        if !self.session.is_connected() {
            if target != CallTarget::Others {
                self.handle_remote(me, call);
            }
            return;
        }
        if target == CallTarget::Authority && self.session.is_authority() {
            self.handle_remote(me, call);
            return;
        }
        self.outbox.push(Outgoing::new(target, call));
    }

    /// Dispatches one inbound remote call.
    pub fn handle_remote(&mut self, from: PeerOrdinal, call: RemoteCall) {
        trace!(?from, ?call, "Remote call");
        match call {
            RemoteCall::InstantiateEnemy { position } => {
                self.router
                    .on_remote_spawn(EntityCategory::Enemy, position, &mut self.pool);
            }
            RemoteCall::InstantiateMissile { position } => {
                self.router
                    .on_remote_spawn(EntityCategory::Missile, position, &mut self.pool);
            }
            RemoteCall::InstantiateCoin { id, position } => {
                self.objects
                    .spawn(id, EntityCategory::Coin, position, Owner::Room);
            }
            RemoteCall::InstantiatePlayer {
                id,
                ordinal,
                position,
            } => {
                if self.objects.contains(id) {
                    debug!(?id, "Avatar already present");
                    return;
                }
                self.objects
                    .spawn(id, EntityCategory::Player, position, Owner::Peer(ordinal));
                self.events
                    .push(LevelEvent::PlayerSpawned { ordinal, position });
            }
            RemoteCall::DestroyNetworkObject { id } => {
                if !self.objects.destroy(id) {
                    debug!(?id, "Destroy for unknown object ignored");
                }
            }
            RemoteCall::DestroyCoinOnAuthority { id, collector } => {
                if !self.session.is_authority() {
                    warn!(?from, ?id, "Collection request reached a non-authority peer");
                    return;
                }
                if let Some(follow_up) =
                    self.ledger
                        .destroy_collectible(id, collector, &mut self.objects)
                {
                    for out in follow_up {
                        self.call(out.target, out.call);
                    }
                }
            }
            RemoteCall::IncrementScore { is_player1 } => {
                let board = self.ledger.apply_increment(is_player1);
                self.events.push(LevelEvent::ScoreChanged(board));
            }
            RemoteCall::ResetScore { is_player1 } => {
                let board = self.ledger.apply_reset(is_player1);
                self.events.push(LevelEvent::ScoreChanged(board));
            }
            RemoteCall::PlaySound { sound } => self.events.push(sound),
            RemoteCall::EnableGenerators => self.enable_generators(),
        }
    }

    // ─── Collisions ───

    pub fn on_collision(&mut self, a: Collider, b: Collider) {
        if !self.react(a, b) {
            self.react(b, a);
        }
    }

    fn tag_of(&self, collider: Collider) -> CollisionTag {
        match collider {
            Collider::LocalPlayer => CollisionTag::PLAYER,
            Collider::Pooled(handle) => match self.pool.state(handle) {
                Some(SlotState::Active) => self
                    .pool
                    .get(handle)
                    .map_or(CollisionTag::empty(), |e| e.category.tag()),
                _ => CollisionTag::empty(),
            },
            Collider::Network(id) => self
                .objects
                .get(id)
                .map_or(CollisionTag::empty(), |o| o.entity.category.tag()),
            Collider::Static(tag) => tag,
        }
    }

    /// Reaction of `subject` to touching `other`. Returns whether anything
    /// happened.
    fn react(&mut self, subject: Collider, other: Collider) -> bool {
        match subject {
            Collider::LocalPlayer => {
                if !self.player.alive {
                    return false;
                }
                let tag = self.tag_of(other);
                if tag.intersects(CollisionTag::HARMFUL) {
                    self.die();
                    true
                } else if tag.contains(CollisionTag::COIN) {
                    self.collect(other)
                } else {
                    false
                }
            }
            Collider::Pooled(handle) => {
                let Collider::Static(tag) = other else {
                    return false;
                };
                if self.pool.state(handle) != Some(SlotState::Active) {
                    return false;
                }
                let Some(category) = self.pool.get(handle).map(|e| e.category) else {
                    return false;
                };
                match category {
                    EntityCategory::Enemy if tag.contains(CollisionTag::WALL) => {
                        if let Some(enemy) = self.pool.get_mut(handle) {
                            enemy.turn();
                        }
                        true
                    }
                    EntityCategory::Enemy if tag.contains(CollisionTag::PIPE) => {
                        self.pool.release(handle);
                        true
                    }
                    EntityCategory::Missile if tag.contains(CollisionTag::GROUND) => {
                        self.pool.release(handle);
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn die(&mut self) {
        self.player.alive = false;
        let ordinal = self.session.ordinal();
        self.events.push(LevelEvent::PlayerDied { ordinal });

        if !self.session.is_connected() {
            self.player.solo.active = false;
            self.events.push(Sound::Hurt);
            self.game_over();
            return;
        }

        self.call(CallTarget::All, RemoteCall::PlaySound { sound: Sound::Hurt });
        if let Some(id) = self.player.id.take() {
            if self.objects.destroy(id) {
                self.call(CallTarget::Others, RemoteCall::DestroyNetworkObject { id });
            }
        }
        self.player.respawn_at = Some(self.clock + self.config.respawn_delay());
        info!(?ordinal, "Player died, respawn scheduled");
    }

    fn game_over(&mut self) {
        self.disable_generators();
        self.events.push(LevelEvent::PanelShown(Panel::GameOver));

        let score = self.ledger.scores().player1;
        if let Err(e) = self.high_score.commit(self.store.as_mut(), score) {
            warn!(error = ?e, score, "Failed to save high score");
        }
        info!(score, high_score = self.high_score.value(), "Game over");
        self.events.push(LevelEvent::GameOver {
            score,
            high_score: self.high_score.value(),
        });
    }

    fn collect(&mut self, coin: Collider) -> bool {
        match coin {
            Collider::Pooled(handle) if !self.session.is_connected() => {
                self.pool.release(handle);
                let board = self.ledger.apply_increment(true);
                self.events.push(LevelEvent::ScoreChanged(board));
                self.events.push(Sound::Coin);
                true
            }
            Collider::Network(id) if self.session.is_connected() => {
                let collector = self.session.ordinal();
                self.call(
                    CallTarget::Authority,
                    RemoteCall::DestroyCoinOnAuthority { id, collector },
                );
                true
            }
            _ => false,
        }
    }

    // ─── Replication ───

    /// Pose update from the input/physics collaborator for the local player.
    pub fn set_local_player_pose(&mut self, transform: Transform, body: BodyPose) {
        if !self.player.alive {
            return;
        }
        let entity = match self.player.id {
            Some(id) => match self.objects.get_mut(id) {
                Some(obj) => &mut obj.entity,
                None => return,
            },
            None => &mut self.player.solo,
        };
        entity.transform = transform;
        entity.body = body;
    }

    /// Snapshots of the avatars this peer owns, once per network tick.
    pub fn collect_snapshots(&mut self) -> Vec<(NetworkId, PlayerSnapshot)> {
        if !self.session.is_connected() || !self.replication.due(self.clock) {
            return Vec::new();
        }
        self.objects
            .owned_by(self.session.ordinal())
            .into_iter()
            .filter_map(|id| {
                self.objects
                    .get(id)
                    .filter(|o| o.entity.category == EntityCategory::Player)
                    .map(|o| (id, PlayerSnapshot::capture(&o.entity)))
            })
            .collect()
    }

    /// Applies a snapshot for a remote avatar. Unknown or self-owned ids are
    /// ignored.
    pub fn apply_snapshot(&mut self, id: NetworkId, snapshot: PlayerSnapshot) -> bool {
        let me = Owner::Peer(self.session.ordinal());
        match self.objects.get_mut(id) {
            Some(obj) if obj.owner != me && obj.entity.category == EntityCategory::Player => {
                snapshot.apply(&mut obj.entity);
                true
            }
            _ => {
                trace!(?id, "Snapshot ignored");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryScoreStore;
    use rand::SeedableRng;

    fn level_with(store: MemoryScoreStore, config: LevelConfig) -> Level {
        Level::new(config, Box::new(store), StdRng::seed_from_u64(11)).unwrap()
    }

    fn level() -> Level {
        level_with(MemoryScoreStore::new(), LevelConfig::default())
    }

    /// Delivers the outbox back into `level` the way the relay echoes calls
    /// targeted at every peer.
    fn echo_all(level: &mut Level, from: PeerOrdinal) {
        for out in level.take_outbox() {
            if matches!(out.target, CallTarget::All | CallTarget::RoomObject) {
                level.handle_remote(from, out.call);
            }
        }
    }

    fn with_coin(level: &mut Level, id: u32) {
        level.handle_remote(
            PeerOrdinal::ONE,
            RemoteCall::InstantiateCoin {
                id: NetworkId(id),
                position: Vec2::new(0.0, 2.0),
            },
        );
    }

    // =============================================================================
    // Solo play
    // =============================================================================

    #[test]
    fn solo_spawns_into_pool() {
        let mut level = level();
        level.start_solo();
        assert_eq!(level.spawn_mode(), SpawnMode::Solo);
        for _ in 0..(60 * 12) {
            level.tick(Duration::from_millis(1000 / 60));
        }
        assert!(level.pool().active(EntityCategory::Coin).count() > 0);
        assert!(level.take_outbox().is_empty());
    }

    #[test]
    fn solo_coin_and_death_commit_high_score() {
        let mut level = level_with(MemoryScoreStore::with_slot(1, 1), LevelConfig::default());
        level.start_solo();

        let mut collected = 0;
        for _ in 0..3 {
            let coin = level
                .pool_mut()
                .spawn(EntityCategory::Coin, Vec2::new(0.0, 2.0))
                .unwrap();
            level.on_collision(Collider::Pooled(coin), Collider::LocalPlayer);
            assert_eq!(level.pool().state(coin), Some(SlotState::Pooled));
            collected += 1;
        }
        assert_eq!(level.scores().player1, collected);
        assert_eq!(level.events_mut().drain::<Sound>(), vec![Sound::Coin; 3]);

        let enemy = level
            .pool_mut()
            .spawn(EntityCategory::Enemy, Vec2::ZERO)
            .unwrap();
        level.on_collision(Collider::LocalPlayer, Collider::Pooled(enemy));

        assert!(!level.player_alive());
        assert!(level.spawners().iter().all(|s| !s.is_enabled()));
        assert_eq!(level.store().load(1).unwrap(), 3);
        assert!(level.events_mut().drain::<LevelEvent>().contains(&LevelEvent::GameOver {
            score: 3,
            high_score: 3
        }));
    }

    #[test]
    fn solo_restart_resets_score_and_scene() {
        let mut level = level();
        level.start_solo();
        level.handle_remote(PeerOrdinal::ONE, RemoteCall::IncrementScore { is_player1: true });
        level.pool_mut().spawn(EntityCategory::Missile, Vec2::new(11.0, 2.23));
        level.on_collision(Collider::LocalPlayer, Collider::Static(CollisionTag::MISSILE));

        level.start_solo();
        assert_eq!(level.scores(), ScoreBoard::default());
        assert_eq!(level.pool().active(EntityCategory::Missile).count(), 0);
        assert!(level.player_alive());
        assert_eq!(level.local_player().unwrap().transform.position, PLAYER1_START);
        assert!(level.spawners().iter().all(Spawner::is_running));
    }

    #[test]
    fn pause_freezes_solo_clock() {
        let mut level = level();
        level.start_solo();
        level.toggle_pause();
        level.tick(Duration::from_secs(5));
        assert_eq!(level.clock(), Duration::ZERO);
        level.toggle_pause();
        level.tick(Duration::from_secs(5));
        assert_eq!(level.clock(), Duration::from_secs(5));
    }

    #[test]
    fn solo_exhausted_pool_then_replenished() {
        let config = LevelConfig {
            pool: crate::config::PoolSizes {
                coin: 0,
                ..Default::default()
            },
            ..LevelConfig::default()
        };
        let mut level = level_with(MemoryScoreStore::new(), config);
        level.start_solo();
        level.tick(Duration::from_secs(1));
        assert_eq!(level.pool().active(EntityCategory::Coin).count(), 0);

        level.pool_mut().populate(EntityCategory::Coin, 1);
        level.tick(Duration::from_secs(10));
        let coins: Vec<_> = level.pool().active(EntityCategory::Coin).collect();
        assert_eq!(coins.len(), 1);
        let position = level.pool().get(coins[0]).unwrap().transform.position;
        assert!(SpawnPolicy::coins()
            .regions
            .iter()
            .any(|r| r.region.contains(position)));
    }

    // =============================================================================
    // Movers
    // =============================================================================

    #[test]
    fn enemy_turns_at_walls_and_leaves_through_pipes() {
        let mut level = level();
        let enemy = level
            .pool_mut()
            .spawn(EntityCategory::Enemy, Vec2::new(-7.0, 4.0))
            .unwrap();
        level.tick(Duration::from_secs(1));
        assert_eq!(level.pool().get(enemy).unwrap().transform.position.x, -4.0);

        level.on_collision(Collider::Static(CollisionTag::WALL), Collider::Pooled(enemy));
        assert_eq!(level.pool().get(enemy).unwrap().direction, -1.0);

        level.on_collision(Collider::Pooled(enemy), Collider::Static(CollisionTag::PIPE));
        assert_eq!(level.pool().state(enemy), Some(SlotState::Pooled));
    }

    #[test]
    fn missile_despawns_on_ground_only() {
        let mut level = level();
        let missile = level
            .pool_mut()
            .spawn(EntityCategory::Missile, Vec2::new(11.0, -3.5))
            .unwrap();
        level.on_collision(Collider::Pooled(missile), Collider::Static(CollisionTag::WALL));
        assert_eq!(level.pool().state(missile), Some(SlotState::Active));
        level.on_collision(Collider::Pooled(missile), Collider::Static(CollisionTag::GROUND));
        assert_eq!(level.pool().state(missile), Some(SlotState::Pooled));
    }

    // =============================================================================
    // Two-peer play
    // =============================================================================

    #[test]
    fn joining_resets_scores_and_announces_avatar() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::TWO, 2, PeerOrdinal::ONE);
        let out = level.take_outbox();
        assert_eq!(
            out[..2],
            [
                Outgoing::new(CallTarget::All, RemoteCall::ResetScore { is_player1: true }),
                Outgoing::new(CallTarget::All, RemoteCall::ResetScore { is_player1: false }),
            ]
        );
        let id = level.local_player_id().unwrap();
        assert_eq!(
            out[2],
            Outgoing::new(
                CallTarget::Others,
                RemoteCall::InstantiatePlayer {
                    id,
                    ordinal: PeerOrdinal::TWO,
                    position: PLAYER2_START
                }
            )
        );
        assert_eq!(
            out[3],
            Outgoing::new(CallTarget::All, RemoteCall::ResetScore { is_player1: false })
        );
        assert_eq!(level.local_player().unwrap().transform.position, PLAYER2_START);
    }

    #[test]
    fn owner_enables_generators_when_guest_arrives() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::ONE, 1, PeerOrdinal::ONE);
        level.take_outbox();
        assert!(level.spawners().iter().all(|s| !s.is_enabled()));

        level.on_peer_joined(PeerOrdinal::TWO, 2);
        echo_all(&mut level, PeerOrdinal::ONE);
        assert_eq!(level.spawn_mode(), SpawnMode::AuthoritativeOwner);
        assert!(level.spawners().iter().all(Spawner::is_running));

        level.tick(Duration::from_secs(2));
        let out = level.take_outbox();
        assert!(out.iter().any(|o| matches!(
            o,
            Outgoing {
                target: CallTarget::RoomObject,
                call: RemoteCall::InstantiateCoin { .. }
            }
        )));
        assert!(out.iter().any(|o| matches!(
            o.call,
            RemoteCall::InstantiateEnemy { .. }
        )));
    }

    #[test]
    fn guest_enables_without_spawning() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::TWO, 2, PeerOrdinal::ONE);
        level.take_outbox();
        level.handle_remote(PeerOrdinal::ONE, RemoteCall::EnableGenerators);
        assert_eq!(level.spawn_mode(), SpawnMode::AuthoritativeGuest);
        level.tick(Duration::from_secs(30));
        assert!(level.take_outbox().is_empty());

        level.handle_remote(
            PeerOrdinal::ONE,
            RemoteCall::InstantiateEnemy {
                position: Vec2::new(-7.0, 4.0),
            },
        );
        assert_eq!(level.pool().active(EntityCategory::Enemy).count(), 1);
    }

    #[test]
    fn coin_race_scores_first_collector_once() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::ONE, 2, PeerOrdinal::ONE);
        echo_all(&mut level, PeerOrdinal::ONE);
        with_coin(&mut level, 42);

        level.handle_remote(
            PeerOrdinal::ONE,
            RemoteCall::DestroyCoinOnAuthority {
                id: NetworkId(42),
                collector: PeerOrdinal::ONE,
            },
        );
        level.handle_remote(
            PeerOrdinal::TWO,
            RemoteCall::DestroyCoinOnAuthority {
                id: NetworkId(42),
                collector: PeerOrdinal::TWO,
            },
        );

        let out = level.take_outbox();
        let destroys = out
            .iter()
            .filter(|o| o.call == RemoteCall::DestroyNetworkObject { id: NetworkId(42) })
            .count();
        assert_eq!(destroys, 1);
        assert!(!level.objects().contains(NetworkId(42)));

        for o in out {
            if o.target == CallTarget::All {
                level.handle_remote(PeerOrdinal::ONE, o.call);
            }
        }
        assert_eq!(
            level.scores(),
            ScoreBoard {
                player1: 1,
                player2: 0
            }
        );
    }

    #[test]
    fn guest_collection_is_routed_to_authority() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::TWO, 2, PeerOrdinal::ONE);
        level.take_outbox();
        with_coin(&mut level, 7);

        level.on_collision(Collider::LocalPlayer, Collider::Network(NetworkId(7)));
        assert_eq!(
            level.take_outbox(),
            vec![Outgoing::new(
                CallTarget::Authority,
                RemoteCall::DestroyCoinOnAuthority {
                    id: NetworkId(7),
                    collector: PeerOrdinal::TWO
                }
            )]
        );
        // Not the guest's call to make.
        assert!(level.objects().contains(NetworkId(7)));
    }

    #[test]
    fn guest_leaving_cleans_scene_without_scoring() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::ONE, 1, PeerOrdinal::ONE);
        level.on_peer_joined(PeerOrdinal::TWO, 2);
        echo_all(&mut level, PeerOrdinal::ONE);
        with_coin(&mut level, 1);
        with_coin(&mut level, 2);
        level.handle_remote(
            PeerOrdinal::ONE,
            RemoteCall::InstantiateMissile {
                position: Vec2::new(11.0, 2.23),
            },
        );
        level.handle_remote(
            PeerOrdinal::TWO,
            RemoteCall::InstantiatePlayer {
                id: NetworkId(200_001),
                ordinal: PeerOrdinal::TWO,
                position: PLAYER2_START,
            },
        );
        let before = level.scores();

        level.on_peer_left(PeerOrdinal::TWO, "2", 1, PeerOrdinal::ONE);

        assert_eq!(level.session().state(), crate::session::SessionState::WaitingForPeer);
        assert!(level.spawners().iter().all(|s| !s.is_enabled()));
        assert_eq!(level.pool().active(EntityCategory::Missile).count(), 0);
        assert!(level.objects().ids(EntityCategory::Coin).is_empty());
        assert!(!level.objects().contains(NetworkId(200_001)));

        let out = level.take_outbox();
        assert!(out
            .iter()
            .all(|o| !matches!(o.call, RemoteCall::IncrementScore { .. })));
        assert_eq!(level.scores(), before);
    }

    #[test]
    fn owner_leaving_abandons_room() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::TWO, 2, PeerOrdinal::ONE);
        with_coin(&mut level, 3);
        level.take_outbox();

        level.on_peer_left(PeerOrdinal::ONE, "1", 1, PeerOrdinal::TWO);
        let events = level.events_mut().drain::<LevelEvent>();
        assert!(events.contains(&LevelEvent::LeaveRoom));
        assert!(events.contains(&LevelEvent::PanelShown(Panel::PlayerLost)));
        // The guest inherited authority and cleaned up locally.
        assert!(!level.objects().contains(NetworkId(3)));
    }

    #[test]
    fn online_death_respawns_after_delay() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::ONE, 1, PeerOrdinal::ONE);
        level.take_outbox();
        let first = level.local_player_id().unwrap();

        level.on_collision(Collider::LocalPlayer, Collider::Static(CollisionTag::ENEMY));
        assert!(!level.player_alive());
        assert!(!level.objects().contains(first));
        let out = level.take_outbox();
        assert!(out.contains(&Outgoing::new(
            CallTarget::All,
            RemoteCall::PlaySound { sound: Sound::Hurt }
        )));
        assert!(out.contains(&Outgoing::new(
            CallTarget::Others,
            RemoteCall::DestroyNetworkObject { id: first }
        )));

        level.tick(Duration::from_millis(1500));
        assert!(!level.player_alive());
        level.tick(Duration::from_millis(500));
        assert!(level.player_alive());
        let second = level.local_player_id().unwrap();
        assert_ne!(first, second);
        assert_eq!(level.local_player().unwrap().transform.position, PLAYER1_START);
    }

    #[test]
    fn online_respawn_clears_own_score() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::ONE, 2, PeerOrdinal::ONE);
        echo_all(&mut level, PeerOrdinal::ONE);
        level.handle_remote(PeerOrdinal::ONE, RemoteCall::IncrementScore { is_player1: true });
        level.handle_remote(PeerOrdinal::ONE, RemoteCall::IncrementScore { is_player1: false });
        assert_eq!(
            level.scores(),
            ScoreBoard {
                player1: 1,
                player2: 1
            }
        );

        level.on_collision(Collider::LocalPlayer, Collider::Static(CollisionTag::ENEMY));
        echo_all(&mut level, PeerOrdinal::ONE);
        level.tick(level.config().respawn_delay());
        assert!(level.player_alive());

        let out = level.take_outbox();
        let respawn = out
            .iter()
            .position(|o| matches!(o.call, RemoteCall::InstantiatePlayer { .. }))
            .unwrap();
        assert_eq!(
            out[respawn + 1],
            Outgoing::new(CallTarget::All, RemoteCall::ResetScore { is_player1: true })
        );

        for o in out {
            if o.target == CallTarget::All {
                level.handle_remote(PeerOrdinal::ONE, o.call);
            }
        }
        // Only the dead player's slot is cleared.
        assert_eq!(
            level.scores(),
            ScoreBoard {
                player1: 0,
                player2: 1
            }
        );
    }

    #[test]
    fn snapshots_flow_to_remote_avatars_only() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::ONE, 2, PeerOrdinal::ONE);
        level.take_outbox();
        let mine = level.local_player_id().unwrap();

        level.set_local_player_pose(
            Transform::at(Vec2::new(1.0, -5.4)),
            BodyPose {
                position: Vec2::new(1.0, -5.4),
                rotation: 0.0,
            },
        );
        let snaps = level.collect_snapshots();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].0, mine);
        assert_eq!(snaps[0].1.position, Vec2::new(1.0, -5.4));
        assert!(level.collect_snapshots().is_empty());

        assert!(!level.apply_snapshot(mine, snaps[0].1));
        assert!(!level.apply_snapshot(NetworkId(9), snaps[0].1));

        level.handle_remote(
            PeerOrdinal::TWO,
            RemoteCall::InstantiatePlayer {
                id: NetworkId(200_001),
                ordinal: PeerOrdinal::TWO,
                position: PLAYER2_START,
            },
        );
        assert!(level.apply_snapshot(NetworkId(200_001), snaps[0].1));
        assert_eq!(
            level.objects().get(NetworkId(200_001)).unwrap().entity.transform.position,
            Vec2::new(1.0, -5.4)
        );
    }

    #[test]
    fn disconnect_requests_reload() {
        let mut level = level();
        level.on_joined_room(PeerOrdinal::ONE, 1, PeerOrdinal::ONE);
        level.on_disconnected();
        assert!(level
            .events_mut()
            .drain::<LevelEvent>()
            .contains(&LevelEvent::ReloadScene));
    }
}
