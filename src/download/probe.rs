// Audiocine - Audio description cinema for mobile
// Copyright (C) 2025 Audiocine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Media duration extraction for finished downloads

use crate::error::{AudiocineError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in milliseconds
    async fn duration_ms(&self, file: &Path) -> Result<i64>;
}

/// Reads `format.duration` with ffprobe
///
/// On Android the host normally injects a probe backed by the platform
/// metadata retriever instead.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    program: String,
}

impl Default for FfprobeDurationProbe {
    fn default() -> Self {
        Self {
            program: "ffprobe".to_string(),
        }
    }
}

impl FfprobeDurationProbe {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[derive(Debug, Deserialize)]
struct FormatProbe {
    format: FormatSection,
}

#[derive(Debug, Deserialize)]
struct FormatSection {
    duration: Option<String>,
}

/// Extract milliseconds from `ffprobe -show_format -print_format json` output
pub fn parse_ffprobe_duration(json: &str) -> Option<i64> {
    let probe: FormatProbe = serde_json::from_str(json).ok()?;
    let seconds: f64 = probe.format.duration?.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some((seconds * 1000.0).round() as i64)
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration_ms(&self, file: &Path) -> Result<i64> {
        let output = Command::new(&self.program)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg(file.as_os_str())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AudiocineError::ToolNotFound(self.program.clone())
                } else {
                    AudiocineError::FileIoError(format!("Failed to execute {}: {}", self.program, e))
                }
            })?;

        if !output.status.success() {
            return Err(AudiocineError::FileIoError(format!(
                "{} could not read {}",
                self.program,
                file.display()
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        parse_ffprobe_duration(&json).ok_or_else(|| {
            AudiocineError::FileIoError(format!("No duration reported for {}", file.display()))
        })
    }
}
