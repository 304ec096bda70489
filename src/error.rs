use std::io;
use thiserror::Error;
use msgbox::IconType;
use std::fmt::Display;
use std::str::Utf8Error;
use iced;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Heart rate thresholds must be ordered: min normal {min_normal} <= max normal {max_normal} <= max acceptable {max_acceptable}")]
    InvalidThresholds { min_normal: u32, max_normal: u32, max_acceptable: u32 },

    #[error("Pulse reading interval must be greater than zero")]
    InvalidInterval,
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },
}

/// Failures reported by the vendor health SDK boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    #[error("Health services are not available on this device")]
    Unavailable,

    #[error("Sign-in failed: {reason}")]
    SignInFailed { reason: String },

    #[error("Failed to subscribe to heart rate data: {reason}")]
    SubscriptionFailed { reason: String },

    #[error("Failed to read heart rate data: {reason}")]
    ReadFailed { reason: String },

    #[error("Failed to close health session: {reason}")]
    CloseFailed { reason: String },
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Not connected to {provider}")]
    NotConnected { provider: String },

    #[error("No heart rate data available")]
    NoData,

    #[error("Health data is not supported on this platform")]
    UnsupportedPlatform,

    #[error("{source}")]
    Sdk { #[from] source: SdkError },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No device connected")]
    NoDeviceConnected,

    #[error("{source}")]
    Provider { #[from] source: ProviderError },
}

pub fn error_msgbox<T: Display>(message: &'static str, error: &T) {
    let message = format!("{}: {}", message, error);
    eprintln!("{}", &message);
    if let Err(err) = msgbox::create(concat!("Pulse Monitor ", env!("CARGO_PKG_VERSION")), &message, IconType::Error) {
        eprintln!("Failed to create msgbox: {:?}", err);
    }
}
