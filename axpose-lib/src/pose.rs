use crate::error::AxError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// One sampled pose: a timestamp plus one position per servo, ordered per
/// the owning project's servo ID list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Milliseconds; controller-local when captured via sync read,
    /// wall-clock when stamped by the recording host.
    pub timestamp_ms: u64,
    pub positions: Vec<u16>,
}

/// A recorded pose sequence: the servo IDs it covers and the frames sampled
/// from them, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseProject {
    pub servo_ids: Vec<u8>,
    pub frames: Vec<PoseFrame>,
}

impl PoseProject {
    pub fn new(servo_ids: Vec<u8>) -> Self {
        Self {
            servo_ids,
            frames: Vec::new(),
        }
    }

    /// Append a frame, enforcing one position per servo ID.
    pub fn push_frame(&mut self, frame: PoseFrame) -> Result<(), AxError> {
        if frame.positions.len() != self.servo_ids.len() {
            return Err(AxError::Project(format!(
                "frame carries {} positions for {} servos",
                frame.positions.len(),
                self.servo_ids.len()
            )));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), AxError> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        info!(path = %path.display(), frames = self.frames.len(), "pose project saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, AxError> {
        let file = BufReader::new(File::open(path)?);
        let project: Self = serde_json::from_reader(file)?;
        project.check_consistent()?;
        info!(path = %path.display(), frames = project.frames.len(), "pose project loaded");
        Ok(project)
    }

    fn check_consistent(&self) -> Result<(), AxError> {
        for (index, frame) in self.frames.iter().enumerate() {
            if frame.positions.len() != self.servo_ids.len() {
                return Err(AxError::Project(format!(
                    "frame {index} carries {} positions for {} servos",
                    frame.positions.len(),
                    self.servo_ids.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_frame_rejects_wrong_arity() {
        let mut project = PoseProject::new(vec![1, 2, 3]);
        let err = project
            .push_frame(PoseFrame {
                timestamp_ms: 0,
                positions: vec![100, 200],
            })
            .unwrap_err();
        assert!(matches!(err, AxError::Project(_)));
        assert!(project.frames.is_empty());
    }

    #[test]
    fn save_load_round_trip() {
        let mut project = PoseProject::new(vec![1, 2]);
        project
            .push_frame(PoseFrame {
                timestamp_ms: 1234,
                positions: vec![512, 300],
            })
            .unwrap();

        let dir = std::env::temp_dir();
        let path = dir.join("axpose_pose_round_trip.json");
        project.save(&path).unwrap();
        let loaded = PoseProject::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, project);
    }
}
