//! Protocol engine — the hexagonal core.
//!
//! [`Engine`] owns the configuration, the telemetry buffers, the command
//! executor and the connectivity supervisor. It exposes one entry point,
//! [`Engine::poll`], which the main loop calls with the current time and
//! the port adapters. All I/O flows through those ports, so the whole
//! engine runs against mocks on the host.
//!
//! ```text
//!  MQTT callback ──▶ CommandInbox ──▶ ┌──────────────────────────────┐
//!                                     │            Engine            │
//!  SensorSource ──▶ sensor tick ────▶ │  executor · progress · ticks │ ──▶ DevicePort
//!                                     │  telemetry · supervisor      │ ──▶ PersistentStore
//!                                     └──────────────┬───────────────┘
//!                                                    ▼
//!                                         publish ──▶ Transport
//! ```
//!
//! One `poll` does, in order: drain queued commands, run due ticks,
//! publish buffered lines, and carry out a due restart.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::app::executor::{CommandExecutor, Effects, ExecContext};
use crate::app::inbox::CommandInbox;
use crate::app::ports::{DevicePort, NetworkPort, PersistentStore, SensorSource, Transport};
use crate::app::progress::CommandProgress;
use crate::app::supervisor::{
    ConnectivitySupervisor, SessionSettings, SupervisorSettings, TRANSPORT_TIMEOUT_MS,
};
use crate::app::telemetry::{collect_readings, AssetLines, LineBuffer, Telemetry};
use crate::config::{BootMode, ConfigKey, ConfigStore};
use crate::diagnostics::{
    read_boot_status, save_restart_record, take_restart_record, write_boot_status, BootStatus,
    EngineDiagnostics, RestartReason, RestartRecord,
};
use crate::error::{BufferError, DecodeFailure, TransportError};
use crate::protocol::command::{decode, Command, OperationType, MINIMAL_SPEED_MS};
use crate::protocol::{
    self, LineSink, Qos, REQUIRED_INTERVAL_MINUTES, TOPIC_ASSET_STREAM, TOPIC_DATA_STREAM,
    TOPIC_REGISTRATION_UP,
};
use crate::scheduler::{ScheduleKind, Scheduler, TimerId};

pub const ASSET_TICK_MS: u32 = 1000;
pub const KEEPALIVE_EVERY_TICKS: u64 = 60;
pub const INVENTORY_MIRROR_EVERY: u64 = 12;
pub const REGISTRATION_REQUEST_EVERY_TICKS: u64 = 5;
/// Delay between acknowledging a restart and resetting.
pub const REBOOT_GRACE_MS: u32 = 5000;
pub const EXHAUSTED_RESTART_COOLDOWN_MS: u32 = 30_000;
pub const SUBSCRIBE_DELAY_MS: u32 = 5000;
pub const LOCK_TIMEOUT_MS: u32 = 100;
pub const LOCK_STARVATION_LIMIT: u32 = 30;

pub const RESTART_EVENT: &str = "c8y_RestartEvent";
pub const UPTIME_EVENT: &str = "c8y_UptimeEvent";
const RESTART_PENDING: &str = "Restart pending";

/// Scratch size for one sensor tick's measurement lines.
const SENSOR_TICK_SCRATCH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub asset_tick_ms: u32,
    pub keepalive_every_ticks: u64,
    pub inventory_mirror_every: u64,
    pub registration_request_every: u64,
    pub reboot_grace_ms: u32,
    pub exhausted_restart_cooldown_ms: u32,
    pub subscribe_delay_ms: u32,
    pub lock_timeout_ms: u32,
    pub lock_starvation_limit: u32,
    pub supervisor: SupervisorSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            asset_tick_ms: ASSET_TICK_MS,
            keepalive_every_ticks: KEEPALIVE_EVERY_TICKS,
            inventory_mirror_every: INVENTORY_MIRROR_EVERY,
            registration_request_every: REGISTRATION_REQUEST_EVERY_TICKS,
            reboot_grace_ms: REBOOT_GRACE_MS,
            exhausted_restart_cooldown_ms: EXHAUSTED_RESTART_COOLDOWN_MS,
            subscribe_delay_ms: SUBSCRIBE_DELAY_MS,
            lock_timeout_ms: LOCK_TIMEOUT_MS,
            lock_starvation_limit: LOCK_STARVATION_LIMIT,
            supervisor: SupervisorSettings::default(),
        }
    }
}

/// The adapters one [`Engine::poll`] works with.
pub struct Ports<'a> {
    pub transport: &'a mut dyn Transport,
    pub network: &'a mut dyn NetworkPort,
    pub sensors: &'a mut dyn SensorSource,
    pub device: &'a mut dyn DevicePort,
    /// Primary storage: configuration, boot status, restart record.
    pub store: &'a mut dyn PersistentStore,
}

/// Registration metadata progress on the asset stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetUpdatePhase {
    /// Nothing sent yet; the next tick sends the full registration.
    Initial,
    /// Configuration changed; the next tick re-sends the summary.
    Waiting,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartState {
    None,
    Scheduled(RestartReason),
    /// The reset was requested from the device port.
    Done(RestartReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subscriptions {
    NotYet,
    DueAt(u64),
    Active,
}

/// State changes a rendered asset tick commits once its lines are
/// buffered.
struct AssetPlan {
    phase: AssetUpdatePhase,
    progress: CommandProgress,
    reboot_confirmed: bool,
    restart_event_sent: bool,
    followups_sent: bool,
}

// ───────────────────────────────────────────────────────────────
// Engine
// ───────────────────────────────────────────────────────────────

pub struct Engine {
    settings: EngineSettings,
    config: ConfigStore,
    device_id: String,
    mode: BootMode,
    telemetry: Arc<Telemetry>,
    inbox: Arc<CommandInbox>,
    executor: CommandExecutor,
    supervisor: ConnectivitySupervisor,
    scheduler: Scheduler,
    phase: AssetUpdatePhase,
    /// `503,c8y_Restart` still owed to the platform.
    reboot_pending: bool,
    previous_restart: Option<RestartRecord>,
    pending_request_operations: bool,
    pending_firmware: bool,
    subscriptions: Subscriptions,
    restart: RestartState,
    force_reconnect: bool,
    started_ms: u64,
    last_poll_ms: u64,
    asset_ticks: u64,
    sensor_ticks: u64,
    publish_failures: u32,
    render_overflows: u32,
}

impl Engine {
    /// Build the engine for `config`. Nothing runs until [`start`](Self::start).
    pub fn new(config: ConfigStore, device_id: &str, settings: EngineSettings) -> Self {
        let mode = config.boot_mode();
        let session = SessionSettings::from_config(&config, device_id);
        let subscriptions = match mode {
            // Credentials arrive on the registration topic right away.
            BootMode::Registration => Subscriptions::DueAt(0),
            BootMode::Operation => Subscriptions::NotYet,
        };
        Self {
            telemetry: Arc::new(Telemetry::new(Duration::from_millis(u64::from(settings.lock_timeout_ms)))),
            inbox: Arc::new(CommandInbox::new()),
            executor: CommandExecutor::new(mode),
            supervisor: ConnectivitySupervisor::new(session, settings.supervisor),
            scheduler: Scheduler::new(),
            settings,
            config,
            device_id: device_id.to_owned(),
            mode,
            phase: AssetUpdatePhase::Initial,
            reboot_pending: false,
            previous_restart: None,
            pending_request_operations: false,
            pending_firmware: false,
            subscriptions,
            restart: RestartState::None,
            force_reconnect: false,
            started_ms: 0,
            last_poll_ms: 0,
            asset_ticks: 0,
            sensor_ticks: 0,
            publish_failures: 0,
            render_overflows: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Load restart bookkeeping and arm the ticks. The first asset tick is
    /// due immediately.
    pub fn start(&mut self, now_ms: u64, store: &mut dyn PersistentStore) {
        self.started_ms = now_ms;
        self.last_poll_ms = now_ms;
        self.reboot_pending = read_boot_status(store) == BootStatus::RestartPending;
        self.previous_restart = take_restart_record(store);

        self.scheduler.arm_at(
            TimerId::AssetTick,
            ScheduleKind::Periodic {
                interval_ms: self.settings.asset_tick_ms,
            },
            now_ms,
        );
        if self.mode == BootMode::Operation {
            self.scheduler.arm(
                TimerId::SensorTick,
                ScheduleKind::Periodic {
                    interval_ms: self.sensor_period_ms(),
                },
                now_ms,
            );
        }
        info!(
            "Engine: started as {} in {:?} mode (restart confirmation {})",
            self.device_id,
            self.mode,
            if self.reboot_pending { "pending" } else { "clear" }
        );
    }

    /// Run everything due at `now_ms`. Returns the time until the next
    /// timer is due.
    pub fn poll(&mut self, now_ms: u64, ports: &mut Ports<'_>) -> u64 {
        self.last_poll_ms = now_ms;
        if matches!(self.restart, RestartState::Done(_)) {
            return u64::from(self.settings.asset_tick_ms);
        }

        self.drain_commands(now_ms, ports);
        self.sync_sensor_period(now_ms);

        let mut restart_due = false;
        for id in self.scheduler.poll(now_ms) {
            match id {
                TimerId::AssetTick => self.asset_tick(now_ms, &mut *ports.device, &mut *ports.store),
                TimerId::SensorTick => self.sensor_tick(&mut *ports.sensors),
                TimerId::Restart => restart_due = true,
            }
        }
        self.check_lock_starvation(now_ms);
        self.publish(now_ms, ports);

        if restart_due {
            self.perform_restart(now_ms, ports);
        }

        self.scheduler
            .next_due()
            .map_or(u64::from(self.settings.asset_tick_ms), |due| due.saturating_sub(now_ms))
    }

    // ── Commands ──────────────────────────────────────────────

    /// Dequeue while the acknowledgment machine can take a command.
    fn drain_commands(&mut self, now_ms: u64, ports: &mut Ports<'_>) {
        loop {
            let progress = self.executor.progress();
            let refusing = progress.is_blocking() || matches!(self.restart, RestartState::Scheduled(_));
            if !refusing && !progress.is_idle() {
                break;
            }
            let Some(line) = self.inbox.try_next() else {
                break;
            };
            let decoded = decode(&line);

            if self.mode == BootMode::Registration {
                match decoded {
                    Ok(cmd @ Command::Credentials { .. }) if !refusing => {
                        let fx = self.execute(cmd, ports);
                        self.apply_effects(fx, now_ms);
                    }
                    _ => debug!("Engine: ignoring \"{}\" while registering", line.as_str()),
                }
                continue;
            }

            if refusing {
                let op = match decoded {
                    Ok(cmd) => cmd.operation_type(),
                    Err(e) if e.failure == DecodeFailure::Empty => continue,
                    Err(e) => e.op,
                };
                self.refuse(op);
                continue;
            }

            match decoded {
                Ok(cmd) => {
                    let fx = self.execute(cmd, ports);
                    self.apply_effects(fx, now_ms);
                }
                Err(e) if e.failure == DecodeFailure::Empty => {}
                Err(e) => self.executor.reject(e),
            }
        }
    }

    fn execute(&mut self, cmd: Command, ports: &mut Ports<'_>) -> Effects {
        let mut ctx = ExecContext {
            config: &mut self.config,
            store: &mut *ports.store,
            device: &mut *ports.device,
        };
        self.executor.execute(cmd, &mut ctx)
    }

    fn apply_effects(&mut self, fx: Effects, now_ms: u64) {
        if fx.config_changed && self.phase == AssetUpdatePhase::Completed {
            self.phase = AssetUpdatePhase::Waiting;
        }
        self.pending_request_operations |= fx.request_operations;
        self.pending_firmware |= fx.firmware_changed;
        if fx.confirm_restart {
            self.reboot_pending = true;
        }
        if let Some(req) = fx.restart {
            self.schedule_restart(req.reason, req.delay_ms, now_ms);
        }
    }

    /// Fail a command that arrived while a restart is pending, without
    /// touching the acknowledgment machine.
    fn refuse(&mut self, op: OperationType) {
        warn!("Engine: refusing {} while restart is pending", op.name());
        let mut lines = LineBuffer::<128>::new();
        let queued = protocol::ack_failed(&mut lines, op, RESTART_PENDING)
            .and_then(|()| self.telemetry.asset().append(&lines));
        if let Err(e) = queued {
            warn!("Engine: \"{RESTART_PENDING}\" for {} lost ({e})", op.name());
        }
    }

    // ── Asset tick ────────────────────────────────────────────

    fn asset_tick(&mut self, now_ms: u64, device: &mut dyn DevicePort, store: &mut dyn PersistentStore) {
        self.asset_ticks += 1;
        let mut lines = AssetLines::new();
        let plan = match self.render_asset(now_ms, device, &mut lines) {
            Ok(plan) => plan,
            Err(e) => {
                self.render_overflows += 1;
                warn!("Engine: asset tick {} does not fit ({e})", self.asset_ticks);
                return;
            }
        };
        match self.telemetry.asset().append(&lines) {
            Ok(()) => self.commit_asset(plan, now_ms, store),
            Err(e) => debug!("Engine: asset tick {} deferred ({e})", self.asset_ticks),
        }
    }

    fn render_asset(
        &self,
        now_ms: u64,
        device: &mut dyn DevicePort,
        out: &mut AssetLines,
    ) -> Result<AssetPlan, BufferError> {
        let mut plan = AssetPlan {
            phase: self.phase,
            progress: self.executor.progress(),
            reboot_confirmed: false,
            restart_event_sent: false,
            followups_sent: false,
        };

        if self.mode == BootMode::Registration {
            if (self.asset_ticks - 1) % self.settings.registration_request_every.max(1) == 0 {
                protocol::registration_request(out)?;
            }
            return Ok(plan);
        }

        match self.phase {
            AssetUpdatePhase::Initial => {
                protocol::device_registration(out, &self.device_id)?;
                protocol::supported_operations(out)?;
                protocol::capability_summary(out, &self.config.capability_summary())?;
                protocol::required_interval(out, REQUIRED_INTERVAL_MINUTES)?;
                self.render_firmware(out)?;
                plan.phase = AssetUpdatePhase::Completed;
            }
            AssetUpdatePhase::Waiting => {
                protocol::capability_summary(out, &self.config.capability_summary())?;
                plan.phase = AssetUpdatePhase::Completed;
            }
            AssetUpdatePhase::Completed => {}
        }

        if self.reboot_pending {
            protocol::ack_successful(out, OperationType::Restart)?;
            plan.reboot_confirmed = true;
        }
        if let Some(record) = self.previous_restart {
            protocol::event(out, RESTART_EVENT, format_args!("Restarted: {}", record.reason.describe()))?;
            plan.restart_event_sent = true;
        }
        if self.pending_request_operations {
            protocol::request_operations(out)?;
        }
        if self.pending_firmware && self.phase != AssetUpdatePhase::Initial {
            self.render_firmware(out)?;
        }
        plan.followups_sent = true;

        plan.progress = self.executor.progress().advance(out)?;

        if self.asset_ticks % self.settings.keepalive_every_ticks.max(1) == 0 {
            if let Some(percent) = device.battery_percent() {
                protocol::battery(out, percent)?;
            }
            protocol::event(
                out,
                UPTIME_EVENT,
                format_args!("Uptime {} s", self.uptime_ms(now_ms) / 1000),
            )?;
        }
        Ok(plan)
    }

    fn render_firmware(&self, out: &mut impl LineSink) -> Result<(), BufferError> {
        protocol::firmware(
            out,
            self.config.get(ConfigKey::FirmwareName),
            self.config.get(ConfigKey::FirmwareVersion),
            self.config.get(ConfigKey::FirmwareUrl),
        )
    }

    fn commit_asset(&mut self, plan: AssetPlan, now_ms: u64, store: &mut dyn PersistentStore) {
        self.phase = plan.phase;

        let was_blocking = self.executor.progress().is_blocking();
        self.executor.set_progress(plan.progress);
        if plan.progress.is_blocking() && !was_blocking {
            self.schedule_restart(RestartReason::Operator, self.settings.reboot_grace_ms, now_ms);
        }

        if plan.reboot_confirmed {
            self.reboot_pending = false;
            if let Err(e) = write_boot_status(store, BootStatus::Clear) {
                warn!("Engine: boot status not cleared: {e}");
            }
        }
        if plan.restart_event_sent {
            self.previous_restart = None;
        }
        if plan.followups_sent {
            self.pending_request_operations = false;
            self.pending_firmware = false;
        }
    }

    // ── Sensor tick ───────────────────────────────────────────

    fn sensor_period_ms(&self) -> u32 {
        self.config.stream_rate_ms().max(MINIMAL_SPEED_MS)
    }

    fn sync_sensor_period(&mut self, now_ms: u64) {
        if self.mode != BootMode::Operation {
            return;
        }
        let period = self.sensor_period_ms();
        if self.scheduler.interval(TimerId::SensorTick) != Some(period) {
            info!("Engine: sensor period now {period} ms");
            self.scheduler.arm(
                TimerId::SensorTick,
                ScheduleKind::Periodic { interval_ms: period },
                now_ms,
            );
        }
    }

    fn sensor_tick(&mut self, sensors: &mut dyn SensorSource) {
        if self.mode != BootMode::Operation || !self.executor.is_publishing() {
            return;
        }
        self.sensor_ticks += 1;
        let readings = collect_readings(&sensors.snapshot(), &self.config);

        let mut lines = LineBuffer::<SENSOR_TICK_SCRATCH>::new();
        for (channel, reading) in &readings {
            if let Err(e) = protocol::measurement(&mut lines, *channel, *reading) {
                self.render_overflows += 1;
                warn!("Engine: measurement {:?} does not fit ({e})", channel);
            }
        }
        if let Err(e) = self.telemetry.sensor().append(&lines) {
            debug!("Engine: sensor tick {} not buffered ({e})", self.sensor_ticks);
        }

        if self.sensor_ticks % self.settings.inventory_mirror_every.max(1) == 0 {
            let mut mirror = AssetLines::new();
            for (channel, reading) in &readings {
                if let Err(e) = protocol::inventory_mirror(&mut mirror, *channel, &self.device_id, *reading) {
                    self.render_overflows += 1;
                    warn!("Engine: inventory line {:?} does not fit ({e})", channel);
                }
            }
            if let Err(e) = self.telemetry.asset().append(&mirror) {
                debug!("Engine: inventory mirror not buffered ({e})");
            }
        }
    }

    // ── Publishing ────────────────────────────────────────────

    fn publish(&mut self, now_ms: u64, ports: &mut Ports<'_>) {
        match self.supervisor.ensure_connected(
            now_ms,
            &mut *ports.network,
            &mut *ports.transport,
            self.force_reconnect,
        ) {
            Ok(()) => self.force_reconnect = false,
            Err(TransportError::RetryBudgetExhausted) => {
                self.schedule_restart(
                    RestartReason::ConnectivityExhausted,
                    self.settings.exhausted_restart_cooldown_ms,
                    now_ms,
                );
                self.discard_measurements();
                return;
            }
            Err(e) => {
                debug!("Engine: offline ({e})");
                self.discard_measurements();
                return;
            }
        }

        self.arm_subscriptions_if_due(now_ms, &mut *ports.transport);

        let (asset_topic, data_topic) = match self.mode {
            BootMode::Registration => (TOPIC_REGISTRATION_UP, None),
            BootMode::Operation => (TOPIC_ASSET_STREAM, Some(TOPIC_DATA_STREAM)),
        };

        if let Some(topic) = data_topic {
            if let Ok(batch) = self.telemetry.sensor().drain() {
                if !batch.is_empty() {
                    if let Err(e) =
                        ports
                            .transport
                            .publish(topic, batch.payload.as_bytes(), Qos::AtMostOnce, TRANSPORT_TIMEOUT_MS)
                    {
                        self.publish_failures += 1;
                        self.force_reconnect = true;
                        warn!("Engine: {} measurement lines lost ({e})", batch.lines);
                        return;
                    }
                }
            }
        }

        let Ok(batch) = self.telemetry.asset().drain() else {
            return;
        };
        if batch.is_empty() {
            return;
        }
        match ports
            .transport
            .publish(asset_topic, batch.payload.as_bytes(), Qos::AtLeastOnce, TRANSPORT_TIMEOUT_MS)
        {
            Ok(()) => {
                debug!("Engine: published {} asset lines", batch.lines);
                if self.subscriptions == Subscriptions::NotYet {
                    self.subscriptions =
                        Subscriptions::DueAt(now_ms + u64::from(self.settings.subscribe_delay_ms));
                }
            }
            Err(e) => {
                self.publish_failures += 1;
                self.force_reconnect = true;
                warn!("Engine: asset publish failed ({e}), keeping {} lines", batch.lines);
                if let Err(e) = self.telemetry.asset().restore(&batch) {
                    warn!("Engine: {} asset lines dropped ({e})", batch.lines);
                }
            }
        }
    }

    fn arm_subscriptions_if_due(&mut self, now_ms: u64, transport: &mut dyn Transport) {
        let Subscriptions::DueAt(due) = self.subscriptions else {
            return;
        };
        if now_ms < due {
            return;
        }
        self.subscriptions = Subscriptions::Active;
        if let Err(e) = self.supervisor.arm_subscriptions(transport) {
            warn!("Engine: subscribe failed ({e}), reconnecting");
            self.force_reconnect = true;
        }
    }

    /// Measurements are not kept across an outage.
    fn discard_measurements(&self) {
        if let Ok(batch) = self.telemetry.sensor().drain() {
            if !batch.is_empty() {
                debug!("Engine: discarded {} measurement lines while offline", batch.lines);
            }
        }
    }

    // ── Restart ───────────────────────────────────────────────

    fn schedule_restart(&mut self, reason: RestartReason, delay_ms: u32, now_ms: u64) {
        if self.restart != RestartState::None {
            return;
        }
        info!("Engine: restart ({}) in {delay_ms} ms", reason.describe());
        self.restart = RestartState::Scheduled(reason);
        self.scheduler
            .arm(TimerId::Restart, ScheduleKind::OneShot { delay_ms }, now_ms);
    }

    fn check_lock_starvation(&mut self, now_ms: u64) {
        let streak = self
            .telemetry
            .sensor()
            .consecutive_timeouts()
            .max(self.telemetry.asset().consecutive_timeouts());
        if streak > self.settings.lock_starvation_limit && self.restart == RestartState::None {
            error!("Engine: {streak} consecutive buffer lock timeouts");
            self.schedule_restart(RestartReason::LockStarvation, 0, now_ms);
        }
    }

    fn perform_restart(&mut self, now_ms: u64, ports: &mut Ports<'_>) {
        let RestartState::Scheduled(reason) = self.restart else {
            return;
        };
        if reason == RestartReason::Operator {
            if let Err(e) = write_boot_status(&mut *ports.store, BootStatus::RestartPending) {
                warn!("Engine: boot status not saved: {e}");
            }
        }
        let record = RestartRecord {
            reason,
            uptime_ms: self.uptime_ms(now_ms),
            consecutive_failures: self.supervisor.health().consecutive_failures,
        };
        if let Err(e) = save_restart_record(&mut *ports.store, &record) {
            warn!("Engine: restart record not saved: {e}");
        }
        info!("Engine: restarting ({})", reason.describe());
        ports.transport.disconnect();
        self.restart = RestartState::Done(reason);
        ports.device.restart();
    }

    // ── Queries ───────────────────────────────────────────────

    /// Handle for the transport callback.
    pub fn inbox(&self) -> Arc<CommandInbox> {
        Arc::clone(&self.inbox)
    }

    /// Handle for producers outside the engine.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn mode(&self) -> BootMode {
        self.mode
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn progress(&self) -> CommandProgress {
        self.executor.progress()
    }

    pub fn asset_phase(&self) -> AssetUpdatePhase {
        self.phase
    }

    pub fn is_publishing(&self) -> bool {
        self.executor.is_publishing()
    }

    pub fn restart_state(&self) -> RestartState {
        self.restart
    }

    fn uptime_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_ms)
    }

    pub fn diagnostics(&self) -> EngineDiagnostics {
        let health = self.supervisor.health();
        EngineDiagnostics {
            uptime_ms: self.uptime_ms(self.last_poll_ms),
            asset_ticks: self.asset_ticks,
            sensor_ticks: self.sensor_ticks,
            sensor_lock_timeouts: self.telemetry.sensor().lock_timeouts(),
            asset_lock_timeouts: self.telemetry.asset().lock_timeouts(),
            dropped_commands: self.inbox.dropped(),
            overflowed_lines: self.render_overflows
                + self.telemetry.sensor().overflowed_lines()
                + self.telemetry.asset().overflowed_lines(),
            publish_failures: self.publish_failures,
            consecutive_connect_failures: health.consecutive_failures,
            link_up: health.last_known_up,
        }
    }
}
