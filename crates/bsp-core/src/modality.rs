//! Physiological modality tags and event kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BspError;

/// Physiological signal modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Electrocardiogram
    Ecg,
    /// Electrodermal activity
    Eda,
    /// Electroencephalogram
    Eeg,
    /// Electromyogram
    Emg,
    /// Photoplethysmogram
    Ppg,
    /// Phonocardiogram
    Pcg,
    /// Respiration (belt, thermistor or impedance)
    Respiration,
}

impl Modality {
    /// All supported modalities
    pub const ALL: [Modality; 7] = [
        Modality::Ecg,
        Modality::Eda,
        Modality::Eeg,
        Modality::Emg,
        Modality::Ppg,
        Modality::Pcg,
        Modality::Respiration,
    ];

    /// Event kind emitted by detection on this modality
    pub fn event_kind(&self) -> EventKind {
        match self {
            Modality::Ecg => EventKind::RPeak,
            Modality::Ppg => EventKind::SystolicPeak,
            Modality::Eda => EventKind::ScrOnset,
            Modality::Respiration => EventKind::Inhalation,
            Modality::Pcg => EventKind::HeartSound,
            Modality::Emg => EventKind::ActivationOnset,
            Modality::Eeg => EventKind::Transient,
        }
    }

    /// Conventional unit of the raw samples
    pub fn default_unit(&self) -> &'static str {
        match self {
            Modality::Ecg | Modality::Emg => "mV",
            Modality::Eeg => "uV",
            Modality::Eda => "uS",
            Modality::Ppg | Modality::Pcg | Modality::Respiration => "a.u.",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modality::Ecg => "ECG",
            Modality::Eda => "EDA",
            Modality::Eeg => "EEG",
            Modality::Emg => "EMG",
            Modality::Ppg => "PPG",
            Modality::Pcg => "PCG",
            Modality::Respiration => "Respiration",
        };
        f.write_str(name)
    }
}

impl FromStr for Modality {
    type Err = BspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecg" => Ok(Modality::Ecg),
            "eda" | "gsr" => Ok(Modality::Eda),
            "eeg" => Ok(Modality::Eeg),
            "emg" => Ok(Modality::Emg),
            "ppg" | "bvp" => Ok(Modality::Ppg),
            "pcg" => Ok(Modality::Pcg),
            "resp" | "respiration" => Ok(Modality::Respiration),
            other => Err(BspError::ConfigurationError {
                message: format!("Unknown modality '{}'", other),
            }),
        }
    }
}

/// Type tag carried by every detected event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    RPeak,
    SystolicPeak,
    ScrOnset,
    Inhalation,
    HeartSound,
    ActivationOnset,
    Transient,
    /// Caller-defined tag
    Custom(String),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::RPeak => write!(f, "R-peak"),
            EventKind::SystolicPeak => write!(f, "systolic-peak"),
            EventKind::ScrOnset => write!(f, "SCR-onset"),
            EventKind::Inhalation => write!(f, "inhalation"),
            EventKind::HeartSound => write!(f, "S1"),
            EventKind::ActivationOnset => write!(f, "activation-onset"),
            EventKind::Transient => write!(f, "transient"),
            EventKind::Custom(tag) => write!(f, "{}", tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modality_parsing() {
        assert_eq!("ECG".parse::<Modality>().unwrap(), Modality::Ecg);
        assert_eq!("bvp".parse::<Modality>().unwrap(), Modality::Ppg);
        assert!("ekg2".parse::<Modality>().is_err());
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(Modality::Ecg.event_kind().to_string(), "R-peak");
        assert_eq!(EventKind::Custom("J-point".into()).to_string(), "J-point");
    }
}
