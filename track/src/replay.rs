//! Recorded sensor sessions.
//!
//! A recording is JSON Lines: one [`SensorFrame`] per line. Blank lines and
//! lines starting with `#` are skipped. Frames may carry the reconstruction
//! output that was captured live; [`ReplayFaceModelFactory`] hands that back
//! so the full pipeline runs without sensor hardware.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::face_model::{FaceModel, FaceModelError, FaceModelFactory};
use crate::sensor::{FeaturePoints, SensorFrame, SubjectRecord};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Iterator over the frames of a recording.
pub struct FrameReplay<R> {
    reader: R,
    line_number: usize,
    buf: String,
}

impl FrameReplay<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ReplayError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> FrameReplay<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for FrameReplay<R> {
    type Item = Result<SensorFrame, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            let read = self.reader.read_line(&mut self.buf);
            if matches!(read, Ok(0)) {
                return None;
            }
            // A line that fails to decode is still consumed.
            self.line_number += 1;
            if let Err(e) = read {
                return Some(Err(e.into()));
            }

            let line = self.buf.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(
                serde_json::from_str(line).map_err(|source| ReplayError::Parse {
                    line: self.line_number,
                    source,
                }),
            );
        }
    }
}

/// Face model that returns the landmarks recorded alongside the frame.
#[derive(Debug, Default)]
pub struct ReplayFaceModel {
    identity: i32,
}

impl ReplayFaceModel {
    pub fn identity(&self) -> i32 {
        self.identity
    }
}

impl FaceModel for ReplayFaceModel {
    fn reconstruct(&mut self, subject: &SubjectRecord) -> Result<FeaturePoints, FaceModelError> {
        subject.feature_points.clone().ok_or_else(|| {
            FaceModelError::ReconstructionFailed(format!(
                "no recorded landmarks for subject {}",
                subject.identity
            ))
        })
    }
}

#[derive(Debug, Default)]
pub struct ReplayFaceModelFactory;

impl FaceModelFactory for ReplayFaceModelFactory {
    type Model = ReplayFaceModel;

    fn create(&mut self, identity: i32) -> Result<ReplayFaceModel, FaceModelError> {
        Ok(ReplayFaceModel { identity })
    }
}
