//! Request and response bodies of the HTTP interface.

use crate::sim::{CommandOutcome, InitialPose, JointId, StepMode, StepOutcome};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub actuator_id: JointId,
    pub position: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandActuatorsRequest {
    #[serde(default)]
    pub commands: Vec<ActuatorCommand>,
}

impl CommandActuatorsRequest {
    pub fn pairs(&self) -> Vec<(JointId, f64)> {
        self.commands
            .iter()
            .map(|c| (c.actuator_id, c.position))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandActuatorsResponse {
    pub results: Vec<CommandOutcome>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepModeRequest {
    pub mode: StepMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepRequest {
    #[serde(default = "one")]
    pub num_steps: u64,
}

fn one() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResponse {
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub sim_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointPosition {
    pub actuator_id: JointId,
    pub position: f64,
}

/// Reset payload. An empty object resets to the model's initial pose.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub base_position: Option<[f64; 3]>,
    /// `[w, x, y, z]`
    #[serde(default)]
    pub base_orientation: Option<[f64; 4]>,
    #[serde(default)]
    pub joints: Vec<JointPosition>,
}

impl ResetRequest {
    pub fn is_empty(&self) -> bool {
        self.base_position.is_none() && self.base_orientation.is_none() && self.joints.is_empty()
    }

    /// Returns `None` for an empty request, or an error message if a value is unusable.
    pub fn into_pose(self) -> Result<Option<InitialPose>, String> {
        if self.is_empty() {
            return Ok(None);
        }

        let base_position = match self.base_position {
            Some(p) if p.iter().all(|c| c.is_finite()) => Some(Vector3::from(p)),
            Some(_) => return Err("base_position must be finite".to_string()),
            None => None,
        };

        let base_orientation = match self.base_orientation {
            Some([w, x, y, z]) => {
                let q = Quaternion::new(w, x, y, z);
                let norm = q.norm();
                if !norm.is_finite() || norm < f64::EPSILON {
                    return Err("base_orientation must be a non-zero quaternion".to_string());
                }
                Some(UnitQuaternion::from_quaternion(q))
            }
            None => None,
        };

        Ok(Some(InitialPose {
            base_position,
            base_orientation,
            joints: self
                .joints
                .into_iter()
                .map(|j| (j.actuator_id, j.position))
                .collect(),
        }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueResponse {
    pub actuator_id: JointId,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorResponse {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateQuery {
    /// Comma separated joint IDs
    pub ids: Option<String>,
}

impl StateQuery {
    pub fn ids(&self) -> Result<Option<Vec<JointId>>, String> {
        let Some(ids) = self.ids.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        ids.split(',')
            .map(|id| {
                id.trim()
                    .parse::<JointId>()
                    .map_err(|_| format!("'{}' is not a joint ID", id.trim()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reset_means_initial_pose() {
        let request: ResetRequest = serde_json::from_str("{}").unwrap();
        assert!(request.into_pose().unwrap().is_none());
    }

    #[test]
    fn reset_orientation_is_normalized() {
        let request: ResetRequest =
            serde_json::from_str(r#"{"base_orientation": [2.0, 0.0, 0.0, 0.0]}"#).unwrap();
        let pose = request.into_pose().unwrap().unwrap();

        let q = pose.base_orientation.unwrap();
        assert!((q.w - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_quaternion_is_rejected() {
        let request = ResetRequest {
            base_orientation: Some([0.0; 4]),
            ..ResetRequest::default()
        };
        assert!(request.into_pose().is_err());
    }

    #[test]
    fn command_response_parses_from_json() {
        let response: CommandActuatorsResponse = serde_json::from_str(
            r#"{"results": [{"actuator_id": 4, "accepted": true}, {"actuator_id": 9, "accepted": false}]}"#,
        )
        .unwrap();

        assert_eq!(
            response.results,
            vec![
                CommandOutcome {
                    actuator_id: 4,
                    accepted: true
                },
                CommandOutcome {
                    actuator_id: 9,
                    accepted: false
                },
            ]
        );
    }

    #[test]
    fn state_query_parses_id_lists() {
        let query = StateQuery {
            ids: Some("1, 2,3".to_string()),
        };
        assert_eq!(query.ids().unwrap(), Some(vec![1, 2, 3]));

        assert_eq!(StateQuery::default().ids().unwrap(), None);
        assert!(
            StateQuery {
                ids: Some("1,x".to_string())
            }
            .ids()
            .is_err()
        );
    }
}
