//! Command execution.
//!
//! Applies one decoded [`Command`] and moves the acknowledgment machine
//! into the state its policy calls for:
//!
//! | Command                         | Side effect                    | Ack path         |
//! |---------------------------------|--------------------------------|------------------|
//! | restart                         | none until acknowledged        | 501 → Blocking   |
//! | speed, sensor, config           | store + persist                | 501 → 503        |
//! | firmware                        | store + persist, re-send 115   | 501 → 503        |
//! | start, stop                     | publishing on/off              | 501 → 503        |
//! | startButton, stopButton         | publishing on/off              | button triad     |
//! | toggle, message                 | LED toggle                     | command triad    |
//! | restartConfirm                  | re-send restart confirmation   | command triad    |
//! | printConfig                     | log configuration              | button triad     |
//! | resetBootstatus                 | clear boot status file         | button triad     |
//! | requestCommands                 | send 500                       | button triad     |
//! | credentials (registration only) | store + persist, restart       | none             |
//!
//! Anything that mutates the configuration and fails to persist it is
//! acknowledged as failed.

use core::fmt::Write as _;

use log::{error, info, warn};

use crate::app::ports::{DevicePort, PersistentStore};
use crate::app::progress::CommandProgress;
use crate::config::{is_storable_value, write_config, BootMode, ConfigKey, ConfigStore};
use crate::diagnostics::{write_boot_status, BootStatus, RestartReason};
use crate::error::DecodeError;
use crate::protocol::command::{Command, OperationType, Origin};

/// Grace period between storing new credentials and the restart.
pub const REGISTRATION_RESTART_DELAY_MS: u32 = 2000;

const CONFIG_NOT_SAVED: &str = "Config not saved";
const BOOT_STATUS_NOT_SAVED: &str = "Boot status not saved";

/// A restart the engine has to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequest {
    pub reason: RestartReason,
    pub delay_ms: u32,
}

/// Follow-up output the engine owes after a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// Stream rate or sensor flags changed; re-send the capability summary.
    pub config_changed: bool,
    /// Firmware attributes changed; re-send `115`.
    pub firmware_changed: bool,
    /// Send `500`.
    pub request_operations: bool,
    /// Re-send `503,c8y_Restart`.
    pub confirm_restart: bool,
    pub restart: Option<RestartRequest>,
}

/// Everything a command may touch.
pub struct ExecContext<'a> {
    pub config: &'a mut ConfigStore,
    pub store: &'a mut dyn PersistentStore,
    pub device: &'a mut dyn DevicePort,
}

pub struct CommandExecutor {
    mode: BootMode,
    progress: CommandProgress,
    publishing: bool,
}

impl CommandExecutor {
    pub fn new(mode: BootMode) -> Self {
        Self {
            mode,
            progress: CommandProgress::Idle,
            publishing: true,
        }
    }

    pub fn progress(&self) -> CommandProgress {
        self.progress
    }

    /// Commit the state returned by [`CommandProgress::advance`].
    pub fn set_progress(&mut self, next: CommandProgress) {
        if next != self.progress {
            log::debug!("Executor: {:?} -> {:?}", self.progress, next);
        }
        self.progress = next;
    }

    /// Whether the measurement stream is on.
    pub fn is_publishing(&self) -> bool {
        self.publishing
    }

    /// Queue the failure acknowledgment for a line that did not decode.
    pub fn reject(&mut self, err: DecodeError) {
        warn!("Executor: rejecting {}: {}", err.op.name(), err.failure);
        self.progress = CommandProgress::BeforeFailed {
            op: err.op,
            reason: err.failure.reason(),
        };
    }

    /// Apply `cmd`. Only called while the acknowledgment machine is idle.
    pub fn execute(&mut self, cmd: Command, ctx: &mut ExecContext<'_>) -> Effects {
        let op = cmd.operation_type();
        let verb = cmd.verb();
        let mut fx = Effects::default();
        info!("Executor: {} ({})", verb, op.name());

        let next = match cmd {
            Command::Restart => CommandProgress::BeforeExecuting { op, restart: true },
            Command::Speed(ms) => {
                ctx.config.set_int(ConfigKey::StreamRate, i64::from(ms));
                fx.config_changed = true;
                persist(ctx, op)
            }
            Command::Sensor { sensor, enabled } => {
                ctx.config.set_sensor(sensor, enabled);
                fx.config_changed = true;
                persist(ctx, op)
            }
            Command::Config { key, value } => {
                ctx.config.set(key, &value);
                fx.config_changed = true;
                persist(ctx, op)
            }
            Command::Firmware { name, version, url } => {
                ctx.config.set(ConfigKey::FirmwareName, &name);
                ctx.config.set(ConfigKey::FirmwareVersion, &version);
                ctx.config.set(ConfigKey::FirmwareUrl, &url);
                fx.firmware_changed = true;
                persist(ctx, op)
            }
            Command::PublishStart(origin) => {
                self.publishing = true;
                publishing_ack(origin, op, verb)
            }
            Command::PublishStop(origin) => {
                self.publishing = false;
                publishing_ack(origin, op, verb)
            }
            Command::Toggle | Command::Message => {
                ctx.device.toggle_led();
                CommandProgress::ImmediateCmd { op, verb }
            }
            Command::RestartConfirm => {
                fx.confirm_restart = true;
                CommandProgress::ImmediateCmd { op, verb }
            }
            Command::PrintConfig => {
                ctx.config.list();
                CommandProgress::ImmediateButton { op, verb }
            }
            Command::ResetBootStatus => match write_boot_status(ctx.store, BootStatus::Clear) {
                Ok(()) => CommandProgress::ImmediateButton { op, verb },
                Err(e) => {
                    warn!("Executor: boot status not cleared: {e}");
                    CommandProgress::BeforeFailed {
                        op,
                        reason: BOOT_STATUS_NOT_SAVED,
                    }
                }
            },
            Command::RequestCommands => {
                fx.request_operations = true;
                CommandProgress::ImmediateButton { op, verb }
            }
            Command::Credentials { tenant, user, password } => {
                fx.restart = self.register(ctx, &tenant, &user, &password);
                self.progress
            }
        };
        self.progress = next;
        fx
    }

    /// Store issued device credentials and ask for a restart into
    /// operation mode.
    fn register(
        &self,
        ctx: &mut ExecContext<'_>,
        tenant: &str,
        user: &str,
        password: &str,
    ) -> Option<RestartRequest> {
        if self.mode != BootMode::Registration {
            warn!("Executor: ignoring credentials outside registration mode");
            return None;
        }
        let mut login = String::new();
        let _ = write!(login, "{tenant}/{user}");
        if !is_storable_value(&login) {
            error!("Executor: login {login} cannot be stored; staying in registration mode");
            return None;
        }
        ctx.config.set(ConfigKey::MqttUser, &login);
        ctx.config.set(ConfigKey::MqttPassword, password);
        match write_config(ctx.config, ctx.store) {
            Ok(()) => {
                info!("Executor: registered as {login}, restarting");
                Some(RestartRequest {
                    reason: RestartReason::Registered,
                    delay_ms: REGISTRATION_RESTART_DELAY_MS,
                })
            }
            Err(e) => {
                error!("Executor: credentials not persisted ({e}); staying in registration mode");
                None
            }
        }
    }
}

fn persist(ctx: &mut ExecContext<'_>, op: OperationType) -> CommandProgress {
    match write_config(ctx.config, ctx.store) {
        Ok(()) => CommandProgress::BeforeExecuting { op, restart: false },
        Err(e) => {
            warn!("Executor: configuration not persisted: {e}");
            CommandProgress::BeforeFailed {
                op,
                reason: CONFIG_NOT_SAVED,
            }
        }
    }
}

fn publishing_ack(origin: Origin, op: OperationType, verb: &'static str) -> CommandProgress {
    match origin {
        Origin::Operator => CommandProgress::BeforeExecuting { op, restart: false },
        Origin::Button => CommandProgress::ImmediateButton { op, verb },
    }
}
