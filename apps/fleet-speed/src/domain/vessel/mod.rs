//! Vessel Position Types
//!
//! Canonical, codec-agnostic representation of an AIS position report.
//! Values are validated at construction and immutable afterwards, so every
//! `AisMessage` that reaches the aggregation layer is known to be rankable.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Smallest valid 9-digit MMSI.
pub const MMSI_MIN: u32 = 100_000_000;

/// Largest valid 9-digit MMSI.
pub const MMSI_MAX: u32 = 999_999_999;

/// AIS encodes "speed not available" as 1023 tenths of a knot.
pub const SOG_NOT_AVAILABLE: f64 = 102.3;

/// AIS encodes "latitude not available" as 91 degrees.
pub const LATITUDE_NOT_AVAILABLE: f64 = 91.0;

/// AIS encodes "longitude not available" as 181 degrees.
pub const LONGITUDE_NOT_AVAILABLE: f64 = 181.0;

// =============================================================================
// Errors
// =============================================================================

/// Validation failures for vessel data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VesselDataError {
    /// MMSI is not a 9-digit number.
    #[error("invalid MMSI: {0}")]
    InvalidMmsi(String),

    /// Speed over ground negative, non-finite or the "not available" sentinel.
    #[error("invalid speed over ground: {0}")]
    InvalidSpeed(f64),
}

// =============================================================================
// MMSI
// =============================================================================

/// Maritime Mobile Service Identity, a 9-digit vessel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Mmsi(u32);

impl Mmsi {
    /// Create an MMSI, validating that it has exactly nine digits.
    ///
    /// # Errors
    ///
    /// Returns `VesselDataError::InvalidMmsi` if the value is out of range.
    pub fn new(value: u64) -> Result<Self, VesselDataError> {
        u32::try_from(value)
            .ok()
            .filter(|v| (MMSI_MIN..=MMSI_MAX).contains(v))
            .map(Self)
            .ok_or_else(|| VesselDataError::InvalidMmsi(value.to_string()))
    }

    /// Get the numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl FromStr for Mmsi {
    type Err = VesselDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 9 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VesselDataError::InvalidMmsi(s.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map_err(|_| VesselDataError::InvalidMmsi(s.to_string()))
            .and_then(Self::new)
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:09}", self.0)
    }
}

impl<'de> Deserialize<'de> for Mmsi {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // The feed has been observed to send both numbers and digit strings.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self::new(n),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// AIS Message
// =============================================================================

/// A validated AIS position report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AisMessage {
    mmsi: Mmsi,
    timestamp: DateTime<Utc>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed_over_ground: f64,
    course_over_ground: Option<f64>,
}

impl AisMessage {
    /// Create a position report.
    ///
    /// The timestamp is truncated to whole seconds so that redeliveries with
    /// differing sub-second precision deduplicate. Coordinates and course
    /// outside their ranges (including the AIS "not available" values) are
    /// stored as `None`; the report still ranks on speed.
    ///
    /// # Errors
    ///
    /// Returns `VesselDataError::InvalidSpeed` if the speed is unusable.
    pub fn new(
        mmsi: Mmsi,
        timestamp: DateTime<Utc>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        speed_over_ground: f64,
        course_over_ground: Option<f64>,
    ) -> Result<Self, VesselDataError> {
        if !speed_over_ground.is_finite()
            || speed_over_ground < 0.0
            || speed_over_ground >= SOG_NOT_AVAILABLE
        {
            return Err(VesselDataError::InvalidSpeed(speed_over_ground));
        }

        Ok(Self {
            mmsi,
            timestamp: timestamp.trunc_subsecs(0),
            latitude: latitude.filter(|v| (-90.0..=90.0).contains(v)),
            longitude: longitude.filter(|v| (-180.0..=180.0).contains(v)),
            speed_over_ground,
            course_over_ground: course_over_ground.filter(|c| (0.0..360.0).contains(c)),
        })
    }

    /// Vessel identifier.
    #[must_use]
    pub const fn mmsi(&self) -> Mmsi {
        self.mmsi
    }

    /// Provider-supplied message time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Latitude in degrees, if available.
    #[must_use]
    pub const fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    /// Longitude in degrees, if available.
    #[must_use]
    pub const fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    /// Speed over ground in knots.
    #[must_use]
    pub const fn speed_over_ground(&self) -> f64 {
        self.speed_over_ground
    }

    /// Course over ground in degrees, if reported.
    #[must_use]
    pub const fn course_over_ground(&self) -> Option<f64> {
        self.course_over_ground
    }
}
