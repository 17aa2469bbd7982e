//! Job definitions and the change events derived from watching them.

use serde::{Deserialize, Serialize};

/// A cron job definition as published by the master.
///
/// The name is the unique key fleet-wide; an update replaces the definition
/// wholesale. Once a run has been dispatched the dispatched copy is never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub command: String,
    #[serde(rename = "cronExpr")]
    pub cron_expr: String,
}

impl Job {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(value: &str) -> serde_json::Result<Self> {
        serde_json::from_str(value)
    }
}

/// A change observed on the coordination store, typed for the scheduler.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A job was created or replaced.
    Save(Job),

    /// A job definition was removed; carries the job name.
    Delete(String),

    /// A kill marker appeared for the named job.
    Kill(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_json_uses_original_field_names() {
        let job = Job {
            name: "job1".to_string(),
            command: "echo hi".to_string(),
            cron_expr: "* * * * *".to_string(),
        };
        let json = job.to_json().unwrap();
        assert!(json.contains("\"cronExpr\""), "wire format keeps cronExpr: {json}");

        let back = Job::from_json(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn malformed_job_json_is_an_error() {
        assert!(Job::from_json("{\"name\":\"x\"}").is_err());
        assert!(Job::from_json("not json").is_err());
    }
}
