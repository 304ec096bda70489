/**
 * How often (milliseconds) the monitoring loop reads a new pulse sample by default.
 */
pub const DEFAULT_PULSE_READING_INTERVAL: u64 = 5000;

/**
 * How far back (minutes) to look for heart rate points when reading the current pulse.
 */
pub const DEFAULT_DATA_RETENTION_MINUTES: u32 = 5;

pub const DEFAULT_MIN_NORMAL_HEART_RATE: u32 = 60;
pub const DEFAULT_MAX_NORMAL_HEART_RATE: u32 = 100;
pub const DEFAULT_MAX_ACCEPTABLE_HEART_RATE: u32 = 120;

/**
 * Device identifier handed to the device manager by the connect command.
 */
pub const DEFAULT_DEVICE_ID: &str = "huawei_device";

/**
 * Substring of the provider name used to select a provider in connect_to_device.
 */
pub const DEFAULT_PROVIDER_KEY: &str = "Huawei";

pub const HUAWEI_PROVIDER_NAME: &str = "Huawei Health";
pub const UNSUPPORTED_PROVIDER_NAME: &str = "Unsupported Platform";

pub const HUAWEI_DEFAULT_DEVICE_ID: &str = "Huawei Device";
pub const HUAWEI_DEFAULT_DEVICE_NAME: &str = "Huawei Watch";

/**
 * Rate reported by the placeholder sample when the vendor returns no data point.
 */
pub const PLACEHOLDER_PULSE_RATE: u32 = 74;

/**
 * Capacity of the per-subscriber event channels.
 */
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub const STATUS_CONNECTED: &str = "Connected to Huawei Health";
pub const STATUS_DISCONNECTED: &str = "Disconnected from Huawei Health";
