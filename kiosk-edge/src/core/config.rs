//! Orchestrator configuration

use chrono::NaiveTime;
use kiosk_client::ClientConfig;
use kiosk_printer::{DeviceAddress, PrinterModel};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// What the supervisor may do beyond restarting a single service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Soft tier only
    None,
    /// Restart every container of the application
    Restart,
    /// Reboot the device
    Reboot,
}

impl FromStr for RestartPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(RestartPolicy::None),
            "restart" => Ok(RestartPolicy::Restart),
            "reboot" => Ok(RestartPolicy::Reboot),
            _ => Err(()),
        }
    }
}

/// One managed printer
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    pub address: DeviceAddress,
    pub model: PrinterModel,
    pub allow_low_paper: bool,
    /// Supervisor service restarted when the printer goes missing
    pub service_name: String,
}

/// Local supervisor API
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub address: String,
    pub api_key: String,
    pub app_id: String,
}

/// Health loop and escalation timings
#[derive(Debug, Clone, Copy)]
pub struct HealthTimings {
    /// `not_found` duration before the service is restarted
    pub restart_cooldown: Duration,
    /// Minimum spacing between two restarts of the same peripheral
    pub restart_min_interval: Duration,
    /// `not_found` duration before the hard tier fires
    pub hard_restart_after: Duration,
    /// Poll interval while something is unhealthy
    pub fast_interval: Duration,
    /// Poll interval while everything is ready
    pub slow_interval: Duration,
    /// Longest one peripheral's status check may hold up a tick
    pub check_timeout: Duration,
}

impl Default for HealthTimings {
    fn default() -> Self {
        Self {
            restart_cooldown: Duration::from_secs(60),
            restart_min_interval: Duration::from_secs(300),
            hard_restart_after: Duration::from_secs(900),
            fast_interval: Duration::from_secs(5),
            slow_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(45),
        }
    }
}

/// Device watchdog triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    /// Backend silence before the device is recovered; `None` disables
    pub offline_after: Option<Duration>,
    /// Daily recovery time (UTC); `None` disables
    pub daily_reboot: Option<NaiveTime>,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            offline_after: Some(Duration::from_secs(3 * 60)),
            daily_reboot: NaiveTime::from_hms_opt(10, 0, 0),
        }
    }
}

/// Orchestrator configuration
///
/// # Environment
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | API_URL | required | Backend base URL |
/// | ANON_KEY | required | Backend anonymous key |
/// | DEVICE_USER / DEVICE_PASSWORD | required | Device account |
/// | DEVICE_ID / DEVICE_NAME | required | Device identity |
/// | DEVICE_TYPE | island | Reported device type |
/// | BALENA_SUPERVISOR_ADDRESS | required | Local supervisor URL |
/// | BALENA_SUPERVISOR_API_KEY | required | Supervisor API key |
/// | BALENA_APP_ID | required | Application id |
/// | DEVICE_RESTART_POLICY | required | none / restart / reboot |
/// | HTTP_PORT | 80 | Peripheral HTTP port |
/// | RECEIPT_PRINTER / LABEL_PRINTER | unset | `tcp://host:port` or device path |
/// | RECEIPT_PRINTER_MODEL | eu-m30 | eu-m30 / tm-t88iv |
/// | RECEIPT_ALLOW_LOW_PAPER | true | Print on low paper |
/// | LABEL_ALLOW_LOW_PAPER | false | Print on low paper |
/// | RECEIPT_SERVICE_NAME | receipt-printer | Service to restart |
/// | LABEL_SERVICE_NAME | label-printer | Service to restart |
/// | LIGHT_URL | unset | Light controller base URL |
/// | LOGO_PATH | unset | PNG logo |
/// | FEEDBACK_URL | unset | Feedback page for label QR codes |
/// | DEDUPE_WINDOW_SECS | 60 | Duplicate job window |
/// | HTTP_TIMEOUT_SECS | 10 | Outbound HTTP timeout |
/// | RESTART_COOLDOWN_SECS | 60 | Missing time before a service restart |
/// | RESTART_MIN_INTERVAL_SECS | 300 | Spacing between restarts |
/// | HARD_RESTART_AFTER_SECS | 900 | Missing time before the hard tier |
/// | POLL_FAST_SECS / POLL_SLOW_SECS | 5 / 30 | Adaptive poll interval |
/// | STATUS_CHECK_TIMEOUT_SECS | 45 | Per-printer bound on one health check |
/// | REBOOT_AFTER_OFFLINE_MINS | 3 | Backend silence before recovery, 0 disables |
/// | SCHEDULED_REBOOT_TIME_UTC | 10:00 | Daily recovery time, `off` disables |
/// | LOG_LEVEL / LOG_JSON / LOG_DIR | info / false / unset | Logging |
/// | W1_DEVICES_DIR | /sys/bus/w1/devices | 1-Wire sysfs root |
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub anon_key: String,
    pub device_user: String,
    pub device_password: String,
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub supervisor: SupervisorConfig,
    pub restart_policy: RestartPolicy,
    pub http_port: u16,
    pub receipt: Option<PrinterConfig>,
    pub label: Option<PrinterConfig>,
    pub light_url: Option<String>,
    pub logo_path: Option<PathBuf>,
    pub feedback_url: Option<String>,
    pub dedupe_window: Duration,
    pub http_timeout: Duration,
    pub health: HealthTimings,
    pub watchdog: WatchdogSettings,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    pub w1_devices_dir: PathBuf,
}

/// Typed access to a key/value source
struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, var: &'static str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.optional(var).ok_or(ConfigError::Missing(var))
    }

    fn or(&self, var: &'static str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, var: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(var) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value }),
        }
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(var) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { var, value }),
            },
        }
    }

    fn secs(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(var, default).map(Duration::from_secs)
    }

    fn watchdog(&self) -> Result<WatchdogSettings, ConfigError> {
        let offline_after = match self.parse("REBOOT_AFTER_OFFLINE_MINS", 3u64)? {
            0 => None,
            mins => Some(Duration::from_secs(mins * 60)),
        };
        let daily_reboot = match self.optional("SCHEDULED_REBOOT_TIME_UTC") {
            None => WatchdogSettings::default().daily_reboot,
            Some(value) if matches!(value.to_ascii_lowercase().as_str(), "off" | "none") => None,
            Some(value) => Some(NaiveTime::parse_from_str(&value, "%H:%M").map_err(|_| {
                ConfigError::Invalid {
                    var: "SCHEDULED_REBOOT_TIME_UTC",
                    value,
                }
            })?),
        };
        Ok(WatchdogSettings {
            offline_after,
            daily_reboot,
        })
    }

    fn printer(
        &self,
        address_var: &'static str,
        model: PrinterModel,
        allow_low_var: &'static str,
        allow_low_default: bool,
        service_var: &'static str,
        service_default: &str,
    ) -> Result<Option<PrinterConfig>, ConfigError> {
        let Some(raw) = self.optional(address_var) else {
            return Ok(None);
        };
        let address = DeviceAddress::parse(&raw).map_err(|_| ConfigError::Invalid {
            var: address_var,
            value: raw,
        })?;
        Ok(Some(PrinterConfig {
            address,
            model,
            allow_low_paper: self.flag(allow_low_var, allow_low_default)?,
            service_name: self.or(service_var, service_default),
        }))
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };

        let restart_policy: RestartPolicy = {
            let value = env.required("DEVICE_RESTART_POLICY")?;
            value.parse().map_err(|_| ConfigError::Invalid {
                var: "DEVICE_RESTART_POLICY",
                value,
            })?
        };

        let receipt_model = match env.optional("RECEIPT_PRINTER_MODEL") {
            None => PrinterModel::EuM30,
            Some(value) => match value.parse::<PrinterModel>() {
                Ok(m) if m.kind() == kiosk_printer::PrinterKind::Receipt => m,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "RECEIPT_PRINTER_MODEL",
                        value,
                    });
                }
            },
        };

        let defaults = HealthTimings::default();

        Ok(Self {
            api_url: env.required("API_URL")?,
            anon_key: env.required("ANON_KEY")?,
            device_user: env.required("DEVICE_USER")?,
            device_password: env.required("DEVICE_PASSWORD")?,
            device_id: env.required("DEVICE_ID")?,
            device_name: env.required("DEVICE_NAME")?,
            device_type: env.or("DEVICE_TYPE", "island"),
            supervisor: SupervisorConfig {
                address: env.required("BALENA_SUPERVISOR_ADDRESS")?,
                api_key: env.required("BALENA_SUPERVISOR_API_KEY")?,
                app_id: env.required("BALENA_APP_ID")?,
            },
            restart_policy,
            http_port: env.parse("HTTP_PORT", 80)?,
            receipt: env.printer(
                "RECEIPT_PRINTER",
                receipt_model,
                "RECEIPT_ALLOW_LOW_PAPER",
                true,
                "RECEIPT_SERVICE_NAME",
                "receipt-printer",
            )?,
            label: env.printer(
                "LABEL_PRINTER",
                PrinterModel::TmL100,
                "LABEL_ALLOW_LOW_PAPER",
                false,
                "LABEL_SERVICE_NAME",
                "label-printer",
            )?,
            light_url: env.optional("LIGHT_URL"),
            logo_path: env.optional("LOGO_PATH").map(PathBuf::from),
            feedback_url: env.optional("FEEDBACK_URL"),
            dedupe_window: env.secs("DEDUPE_WINDOW_SECS", 60)?,
            http_timeout: env.secs("HTTP_TIMEOUT_SECS", 10)?,
            health: HealthTimings {
                restart_cooldown: env
                    .secs("RESTART_COOLDOWN_SECS", defaults.restart_cooldown.as_secs())?,
                restart_min_interval: env.secs(
                    "RESTART_MIN_INTERVAL_SECS",
                    defaults.restart_min_interval.as_secs(),
                )?,
                hard_restart_after: env
                    .secs("HARD_RESTART_AFTER_SECS", defaults.hard_restart_after.as_secs())?,
                fast_interval: env.secs("POLL_FAST_SECS", defaults.fast_interval.as_secs())?,
                slow_interval: env.secs("POLL_SLOW_SECS", defaults.slow_interval.as_secs())?,
                check_timeout: env
                    .secs("STATUS_CHECK_TIMEOUT_SECS", defaults.check_timeout.as_secs())?,
            },
            watchdog: env.watchdog()?,
            log_level: env.or("LOG_LEVEL", "info"),
            log_json: env.flag("LOG_JSON", false)?,
            log_dir: env.optional("LOG_DIR"),
            w1_devices_dir: PathBuf::from(env.or("W1_DEVICES_DIR", "/sys/bus/w1/devices")),
        })
    }

    /// Backend client settings derived from this configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.api_url.clone(), self.anon_key.clone())
            .with_credentials(self.device_user.clone(), self.device_password.clone())
            .with_device(
                self.device_id.clone(),
                self.device_name.clone(),
                self.device_type.clone(),
            )
            .with_timeout(self.http_timeout.as_secs())
    }
}
