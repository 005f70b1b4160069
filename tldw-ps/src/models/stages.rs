//! Fixed pipeline stage table
//!
//! Every stage owns a slice of the overall 0-100 progress range. The slices are
//! listed in pipeline order and partition `[0, 100]` without gaps or overlaps.

use std::str::FromStr;
use tldw_common::{Error, ProgressStatus};

/// Named pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Initialization,
    Resources,
    Media,
    Audio,
    Transcription,
    Summarization,
    Finalization,
    Done,
}

/// Static configuration of one stage
#[derive(Debug)]
pub struct ProcessingStage {
    pub stage: Stage,
    pub name: &'static str,
    pub status: ProgressStatus,
    /// Overall progress at 0% of this stage
    pub min: u8,
    /// Overall progress at 100% of this stage
    pub max: u8,
    /// In-stage percent → human readable message
    pub message: fn(u8) -> String,
}

/// Stage table in pipeline order
pub const STAGES: [ProcessingStage; 8] = [
    ProcessingStage {
        stage: Stage::Initialization,
        name: "initialization",
        status: ProgressStatus::Initializing,
        min: 0,
        max: 5,
        message: initialization_message,
    },
    ProcessingStage {
        stage: Stage::Resources,
        name: "resources",
        status: ProgressStatus::Preparing,
        min: 5,
        max: 10,
        message: resources_message,
    },
    ProcessingStage {
        stage: Stage::Media,
        name: "media",
        status: ProgressStatus::Downloading,
        min: 10,
        max: 30,
        message: media_message,
    },
    ProcessingStage {
        stage: Stage::Audio,
        name: "audio",
        status: ProgressStatus::Processing,
        min: 30,
        max: 40,
        message: audio_message,
    },
    ProcessingStage {
        stage: Stage::Transcription,
        name: "transcription",
        status: ProgressStatus::Transcribing,
        min: 40,
        max: 70,
        message: transcription_message,
    },
    ProcessingStage {
        stage: Stage::Summarization,
        name: "summarization",
        status: ProgressStatus::Summarizing,
        min: 70,
        max: 95,
        message: summarization_message,
    },
    ProcessingStage {
        stage: Stage::Finalization,
        name: "finalization",
        status: ProgressStatus::Finalizing,
        min: 95,
        max: 99,
        message: finalization_message,
    },
    ProcessingStage {
        stage: Stage::Done,
        name: "done",
        status: ProgressStatus::Done,
        min: 99,
        max: 100,
        message: done_message,
    },
];

impl Stage {
    pub fn config(self) -> &'static ProcessingStage {
        &STAGES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.config().name
    }

    /// Map an in-stage percent (clamped to 0-100) to overall progress
    pub fn overall_progress(self, stage_percent: f64) -> u8 {
        let config = self.config();
        let percent = if stage_percent.is_nan() {
            0.0
        } else {
            stage_percent.clamp(0.0, 100.0)
        };
        let span = f64::from(config.max - config.min);
        let overall = f64::from(config.min) + span * percent / 100.0;
        overall.round().clamp(f64::from(config.min), f64::from(config.max)) as u8
    }

    /// Message for an in-stage percent
    pub fn message(self, stage_percent: u8) -> String {
        (self.config().message)(stage_percent.min(100))
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        STAGES
            .iter()
            .find(|config| config.name == name)
            .map(|config| config.stage)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown pipeline stage: {}", name)))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn initialization_message(percent: u8) -> String {
    if percent >= 100 {
        "Request validated".to_string()
    } else {
        "Validating request...".to_string()
    }
}

fn resources_message(percent: u8) -> String {
    if percent >= 100 {
        "Resources ready".to_string()
    } else {
        "Preparing resources...".to_string()
    }
}

fn media_message(percent: u8) -> String {
    match percent {
        0 => "Fetching media...".to_string(),
        100 => "Media downloaded".to_string(),
        p => format!("Downloading media... {}%", p),
    }
}

fn audio_message(percent: u8) -> String {
    match percent {
        100 => "Audio ready".to_string(),
        p => format!("Processing audio... {}%", p),
    }
}

fn transcription_message(percent: u8) -> String {
    match percent {
        0 => "Starting transcription...".to_string(),
        100 => "Transcription complete".to_string(),
        p => format!("Transcribing audio... {}%", p),
    }
}

fn summarization_message(percent: u8) -> String {
    match percent {
        0 => "Generating summary...".to_string(),
        100 => "Summary generated".to_string(),
        p => format!("Summarizing transcript... {}%", p),
    }
}

fn finalization_message(_percent: u8) -> String {
    "Finalizing results...".to_string()
}

fn done_message(_percent: u8) -> String {
    "Done".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ranges_partition_0_to_100() {
        assert_eq!(STAGES.first().map(|s| s.min), Some(0));
        assert_eq!(STAGES.last().map(|s| s.max), Some(100));

        for stage in &STAGES {
            assert!(stage.min < stage.max, "{} has an empty range", stage.name);
        }
        for pair in STAGES.windows(2) {
            assert_eq!(
                pair[0].max, pair[1].min,
                "gap or overlap between {} and {}",
                pair[0].name, pair[1].name
            );
        }
    }

    #[test]
    fn test_table_index_matches_enum() {
        for (index, config) in STAGES.iter().enumerate() {
            assert_eq!(config.stage as usize, index);
            assert_eq!(config.stage.config().name, config.name);
        }
    }

    #[test]
    fn test_overall_progress_interpolates_and_clamps() {
        assert_eq!(Stage::Transcription.overall_progress(0.0), 40);
        assert_eq!(Stage::Transcription.overall_progress(50.0), 55);
        assert_eq!(Stage::Transcription.overall_progress(100.0), 70);
        assert_eq!(Stage::Transcription.overall_progress(-20.0), 40);
        assert_eq!(Stage::Transcription.overall_progress(250.0), 70);
        assert_eq!(Stage::Media.overall_progress(f64::NAN), 10);
        assert_eq!(Stage::Done.overall_progress(100.0), 100);
    }

    #[test]
    fn test_stage_from_name() {
        assert_eq!("media".parse::<Stage>().unwrap(), Stage::Media);
        assert_eq!("summarization".parse::<Stage>().unwrap(), Stage::Summarization);
        assert!(matches!(
            "uploading".parse::<Stage>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_stage_messages() {
        assert_eq!(Stage::Transcription.message(0), "Starting transcription...");
        assert_eq!(Stage::Transcription.message(37), "Transcribing audio... 37%");
        assert_eq!(Stage::Transcription.message(100), "Transcription complete");
        assert_eq!(Stage::Initialization.message(100), "Request validated");
    }
}
