//! The closed set of signals exchanged on a [`SignalBus`](crate::SignalBus).
//!
//! Each topic has a strongly-typed payload. Management signals can also be
//! decoded from name/value maps so agromanagement schedules stay
//! data-driven while everything past setup works with typed variants.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;
use crate::value::Value;

/// Untyped payload as written in a schedule document.
pub type Payload = IndexMap<String, Value>;

// ── SignalKind ──────────────────────────────────────────────────

/// Topic token identifying a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// A crop calendar reached its start date.
    CropStart,
    /// The crop emerged.
    CropEmerged,
    /// The crop cycle ended.
    CropFinish,
    /// The run must stop after the current step.
    Terminate,
    /// A periodic output snapshot should be taken.
    Output,
    /// A summary snapshot should be taken.
    SummaryOutput,
    /// Mineral nitrogen application.
    ApplyN,
    /// Nitrogen application for the SNOMIN soil model.
    ApplyNSnomin,
    /// Irrigation event.
    Irrigate,
    /// Grass mowing event.
    Mowing,
}

impl SignalKind {
    /// Every topic, in declaration order.
    pub const ALL: [SignalKind; 10] = [
        Self::CropStart,
        Self::CropEmerged,
        Self::CropFinish,
        Self::Terminate,
        Self::Output,
        Self::SummaryOutput,
        Self::ApplyN,
        Self::ApplyNSnomin,
        Self::Irrigate,
        Self::Mowing,
    ];

    /// The topic's canonical name as used in schedule documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CropStart => "crop_start",
            Self::CropEmerged => "crop_emerged",
            Self::CropFinish => "crop_finish",
            Self::Terminate => "terminate",
            Self::Output => "output",
            Self::SummaryOutput => "summary_output",
            Self::ApplyN => "apply_n",
            Self::ApplyNSnomin => "apply_n_snomin",
            Self::Irrigate => "irrigate",
            Self::Mowing => "mowing",
        }
    }

    /// Whether an event table may send this topic.
    ///
    /// Crop lifecycle topics are owned by the crop calendar and the crop
    /// itself and are never scheduled directly.
    pub fn is_schedulable(self) -> bool {
        !matches!(self, Self::CropStart | Self::CropEmerged | Self::CropFinish)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| PayloadError::UnknownTopic {
                topic: s.to_owned(),
            })
    }
}

// ── Crop lifecycle modes ───────────────────────────────────────

/// How a crop cycle begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartType {
    /// Simulation starts at sowing.
    Sowing,
    /// Simulation starts at emergence.
    Emergence,
}

/// How a crop cycle is meant to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndType {
    /// The crop ends when it signals physiological maturity.
    Maturity,
    /// The crop ends on the calendar's end date.
    Harvest,
    /// Whichever comes first: maturity or the end date.
    Earliest,
}

/// Why a crop cycle actually ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishType {
    /// The crop reached maturity.
    Maturity,
    /// The calendar's end date was reached.
    Harvest,
    /// The calendar's maximum duration elapsed.
    MaxDuration,
    /// The next campaign started while the crop was still active.
    CampaignEnd,
}

impl fmt::Display for StartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sowing => "sowing",
            Self::Emergence => "emergence",
        })
    }
}

impl fmt::Display for EndType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Maturity => "maturity",
            Self::Harvest => "harvest",
            Self::Earliest => "earliest",
        })
    }
}

impl fmt::Display for FinishType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Maturity => "maturity",
            Self::Harvest => "harvest",
            Self::MaxDuration => "max_duration",
            Self::CampaignEnd => "campaign_end",
        })
    }
}

// ── Payloads ───────────────────────────────────────────────────

/// Payload of [`Signal::CropStart`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropStart {
    /// Crop identity, used to select crop parameters.
    pub crop_name: String,
    /// Variety identity.
    pub variety_name: String,
    /// How the cycle begins.
    pub start_type: StartType,
    /// How the cycle is meant to end.
    pub end_type: EndType,
}

/// Payload of [`Signal::CropFinish`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropFinish {
    /// Why the cycle ended.
    pub finish_type: FinishType,
    /// Whether the crop subtree is removed after finalization.
    pub crop_delete: bool,
}

/// Payload of [`Signal::ApplyN`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplyN {
    /// Amount of nitrogen applied (kg/ha).
    pub amount: f64,
    /// Recovery fraction of the applied nitrogen.
    pub recovery: f64,
}

/// Payload of [`Signal::ApplyNSnomin`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplyNSnomin {
    /// Amount of material applied (kg/ha).
    pub amount: f64,
    /// Depth of application (cm).
    pub application_depth: f64,
    /// Carbon/nitrogen ratio of the organic material.
    pub cnratio: f64,
    /// Initial apparent age of the organic material (y).
    pub initial_age: f64,
    /// Ammonium fraction.
    pub f_nh4n: f64,
    /// Nitrate fraction.
    pub f_no3n: f64,
    /// Organic material fraction.
    pub f_orgmat: f64,
}

/// Payload of [`Signal::Irrigate`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Irrigate {
    /// Irrigation amount (cm).
    pub amount: f64,
    /// Fraction of the amount that reaches the soil.
    pub efficiency: f64,
}

/// Payload of [`Signal::Mowing`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mowing {
    /// Biomass left standing after mowing (kg/ha).
    pub biomass_remaining: f64,
}

// ── Signal ─────────────────────────────────────────────────────

/// A signal with its typed payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    /// See [`SignalKind::CropStart`].
    CropStart(CropStart),
    /// See [`SignalKind::CropEmerged`].
    CropEmerged,
    /// See [`SignalKind::CropFinish`].
    CropFinish(CropFinish),
    /// See [`SignalKind::Terminate`].
    Terminate,
    /// See [`SignalKind::Output`].
    Output,
    /// See [`SignalKind::SummaryOutput`].
    SummaryOutput,
    /// See [`SignalKind::ApplyN`].
    ApplyN(ApplyN),
    /// See [`SignalKind::ApplyNSnomin`].
    ApplyNSnomin(ApplyNSnomin),
    /// See [`SignalKind::Irrigate`].
    Irrigate(Irrigate),
    /// See [`SignalKind::Mowing`].
    Mowing(Mowing),
}

impl Signal {
    /// The topic of this signal.
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::CropStart(_) => SignalKind::CropStart,
            Self::CropEmerged => SignalKind::CropEmerged,
            Self::CropFinish(_) => SignalKind::CropFinish,
            Self::Terminate => SignalKind::Terminate,
            Self::Output => SignalKind::Output,
            Self::SummaryOutput => SignalKind::SummaryOutput,
            Self::ApplyN(_) => SignalKind::ApplyN,
            Self::ApplyNSnomin(_) => SignalKind::ApplyNSnomin,
            Self::Irrigate(_) => SignalKind::Irrigate,
            Self::Mowing(_) => SignalKind::Mowing,
        }
    }

    /// Decode a schedulable signal from a schedule payload.
    ///
    /// Field names follow the conventional agromanagement spelling
    /// (`N_amount`, `N_recovery`, `f_NH4N`, ...). Irrigation accepts
    /// `amount` or `irrigation_amount`; its `efficiency` defaults to 1.
    pub fn from_payload(kind: SignalKind, payload: &Payload) -> Result<Self, PayloadError> {
        if !kind.is_schedulable() {
            return Err(PayloadError::Unschedulable { topic: kind });
        }
        let f = |names: &[&'static str]| number(kind, payload, names);
        let signal = match kind {
            SignalKind::Terminate => Self::Terminate,
            SignalKind::Output => Self::Output,
            SignalKind::SummaryOutput => Self::SummaryOutput,
            SignalKind::ApplyN => Self::ApplyN(ApplyN {
                amount: f(&["N_amount"])?,
                recovery: f(&["N_recovery"])?,
            }),
            SignalKind::ApplyNSnomin => Self::ApplyNSnomin(ApplyNSnomin {
                amount: f(&["amount"])?,
                application_depth: f(&["application_depth"])?,
                cnratio: f(&["cnratio"])?,
                initial_age: f(&["initial_age"])?,
                f_nh4n: f(&["f_NH4N"])?,
                f_no3n: f(&["f_NO3N"])?,
                f_orgmat: f(&["f_orgmat"])?,
            }),
            SignalKind::Irrigate => Self::Irrigate(Irrigate {
                amount: f(&["amount", "irrigation_amount"])?,
                efficiency: optional_number(kind, payload, "efficiency")?.unwrap_or(1.0),
            }),
            SignalKind::Mowing => Self::Mowing(Mowing {
                biomass_remaining: f(&["biomass_remaining"])?,
            }),
            SignalKind::CropStart | SignalKind::CropEmerged | SignalKind::CropFinish => {
                return Err(PayloadError::Unschedulable { topic: kind })
            }
        };
        Ok(signal)
    }
}

fn number(
    topic: SignalKind,
    payload: &Payload,
    names: &[&'static str],
) -> Result<f64, PayloadError> {
    for name in names {
        if let Some(v) = optional_number(topic, payload, name)? {
            return Ok(v);
        }
    }
    Err(PayloadError::MissingField {
        topic,
        field: names[0],
    })
}

fn optional_number(
    topic: SignalKind,
    payload: &Payload,
    field: &'static str,
) -> Result<Option<f64>, PayloadError> {
    match payload.get(field) {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or(PayloadError::WrongType {
            topic,
            field,
            expected: "a number",
        }),
    }
}
