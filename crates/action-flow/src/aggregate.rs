//! Run-wide accumulation of hits and failures.

use beaconcheck_core_types::{Hit, Platform};
use chrono::{DateTime, Utc};
use expect_gate::Verdict;
use serde::Serialize;

use crate::types::StepResult;

/// Accumulator owned by one run and threaded through the executor.
#[derive(Debug, Clone)]
pub struct RunState {
    run_id: String,
    journey: String,
    started_at: DateTime<Utc>,
    hits: Vec<Hit>,
    failures: Vec<Verdict>,
    steps_finalized: Vec<String>,
}

impl RunState {
    pub fn new(journey: impl Into<String>) -> Self {
        let started_at = Utc::now();
        let short = uuid::Uuid::new_v4().simple().to_string();
        Self {
            run_id: format!("{}-{}", started_at.format("%Y%m%dT%H%M%S"), &short[..8]),
            journey: journey.into(),
            started_at,
            hits: Vec::new(),
            failures: Vec::new(),
            steps_finalized: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Appends every hit of the step, then its failing verdicts.
    ///
    /// Hits go in regardless of validation outcome, including platforms that
    /// got no report section.
    pub fn accumulate(&mut self, step: &StepResult) {
        self.hits.extend(step.hits.all().cloned());
        self.failures.extend(step.failures().cloned());
        self.steps_finalized.push(step.step.clone());
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn failures(&self) -> &[Verdict] {
        &self.failures
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id.clone(),
            journey: self.journey.clone(),
            started_at: self.started_at,
            taken_at: Utc::now(),
            hits: self.hits.clone(),
            failures: self.failures.clone(),
            steps_finalized: self.steps_finalized.clone(),
        }
    }
}

/// Read-only view of a run: the global hit stream and failure list.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub journey: String,
    pub started_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub hits: Vec<Hit>,
    pub failures: Vec<Verdict>,
    pub steps_finalized: Vec<String>,
}

impl RunSnapshot {
    pub fn hits_for(&self, platform: Platform) -> impl Iterator<Item = &Hit> {
        self.hits.iter().filter(move |hit| hit.platform() == platform)
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_tap::CapturedHits;
    use expect_gate::PlatformValidation;
    use std::collections::BTreeMap;

    fn step(name: &str, hits: Vec<Hit>, verdicts: Vec<Verdict>) -> StepResult {
        let mut captured = CapturedHits::new();
        for hit in hits {
            captured.push(hit);
        }
        let passed = verdicts.iter().all(|v| v.passed);
        StepResult {
            step: name.to_string(),
            index: 0,
            hits: captured,
            validations: vec![PlatformValidation {
                platform: Platform::Adobe,
                matrix: Default::default(),
                verdicts,
                passed,
            }],
            navigated: false,
            challenges: 0,
            actions: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    fn hit(platform: Platform) -> Hit {
        let mut fields = BTreeMap::new();
        fields.insert("k".to_string(), "v".to_string());
        Hit::new(platform, fields)
    }

    #[test]
    fn test_accumulate_tags_failures_with_origin() {
        let mut state = RunState::new("consent");
        state.accumulate(&step(
            "Homepage",
            vec![hit(Platform::Adobe), hit(Platform::Ga4)],
            vec![
                Verdict::pass("Homepage", Platform::Adobe, "v10", "x".into(), "x".into()),
                Verdict::fail("Homepage", Platform::Adobe, "v12", "y".into(), String::new()),
            ],
        ));
        state.accumulate(&step("PLP", vec![hit(Platform::Cja)], Vec::new()));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.hits.len(), 3);
        assert_eq!(snapshot.hits_for(Platform::Ga4).count(), 1);
        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].origin(), "Homepage [ADOBE]");
        assert_eq!(snapshot.steps_finalized, vec!["Homepage", "PLP"]);
        assert!(snapshot.run_id.len() > 16);
    }
}
