use core::fmt;

/// A bounded queue had no room for the message; the message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue full")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Transmit queue or hardware mailbox had no free slot.
    MailboxFull,
    /// Identifier out of range or payload longer than 8 bytes.
    InvalidFrame,
    BusOff,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::MailboxFull => f.write_str("CAN mailbox full"),
            TransportError::InvalidFrame => f.write_str("invalid CAN frame"),
            TransportError::BusOff => f.write_str("CAN bus off"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    Adc,
    Gpio,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Adc => f.write_str("ADC read failed"),
            SensorError::Gpio => f.write_str("GPIO read failed"),
        }
    }
}

/// Startup configuration that must not be run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Control period too long to honour the minimum torque command frequency.
    CommandPeriodTooSlow { period_us: u64, max_us: u64 },
    ZeroPeriod,
    /// A pedal channel's full-travel reading is not above its offset.
    PedalCalibration,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::CommandPeriodTooSlow { period_us, max_us } => write!(
                f,
                "control period {}us exceeds maximum command delay {}us",
                period_us, max_us
            ),
            ConfigError::ZeroPeriod => f.write_str("control period must be non-zero"),
            ConfigError::PedalCalibration => f.write_str("pedal max value must exceed its offset"),
        }
    }
}
