use serde::{Deserialize, Serialize};

use super::domain::ReputationLevel;

/// Single source of truth for score boundaries. Both level classification and
/// the analytics score buckets read from this table, so the two can never
/// drift apart.
///
/// Each field is the lowest score that still belongs to the named level; any
/// score below `probation_floor` is `Restricted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub probation_floor: i64,
    pub regular_floor: i64,
    pub trusted_floor: i64,
    pub exemplary_floor: i64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            probation_floor: -50,
            regular_floor: 1,
            trusted_floor: 101,
            exemplary_floor: 501,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThresholdError {
    #[error("level thresholds must be strictly increasing")]
    NotMonotonic,
}

/// Static bounds of one classification band. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketBounds {
    pub level: ReputationLevel,
    pub floor: Option<i64>,
    pub ceiling: Option<i64>,
}

impl LevelThresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.probation_floor < self.regular_floor
            && self.regular_floor < self.trusted_floor
            && self.trusted_floor < self.exemplary_floor
        {
            Ok(())
        } else {
            Err(ThresholdError::NotMonotonic)
        }
    }

    /// Map a total score to its level. Total over the integer line.
    pub fn classify(&self, score: i64) -> ReputationLevel {
        if score >= self.exemplary_floor {
            ReputationLevel::Exemplary
        } else if score >= self.trusted_floor {
            ReputationLevel::Trusted
        } else if score >= self.regular_floor {
            ReputationLevel::Regular
        } else if score >= self.probation_floor {
            ReputationLevel::Probation
        } else {
            ReputationLevel::Restricted
        }
    }

    /// The exhaustive, non-overlapping 5-band partition used by the analytics
    /// histogram. Ceilings are inclusive.
    pub fn buckets(&self) -> [BucketBounds; 5] {
        [
            BucketBounds {
                level: ReputationLevel::Restricted,
                floor: None,
                ceiling: Some(self.probation_floor - 1),
            },
            BucketBounds {
                level: ReputationLevel::Probation,
                floor: Some(self.probation_floor),
                ceiling: Some(self.regular_floor - 1),
            },
            BucketBounds {
                level: ReputationLevel::Regular,
                floor: Some(self.regular_floor),
                ceiling: Some(self.trusted_floor - 1),
            },
            BucketBounds {
                level: ReputationLevel::Trusted,
                floor: Some(self.trusted_floor),
                ceiling: Some(self.exemplary_floor - 1),
            },
            BucketBounds {
                level: ReputationLevel::Exemplary,
                floor: Some(self.exemplary_floor),
                ceiling: None,
            },
        ]
    }
}

/// Feature-gate consequence of a level transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureAction {
    Unlock,
    Restrict,
}

/// Change of level observed by a summary refresh. Computed once per refresh
/// by comparing the stored level to the recomputed one, never inferred from
/// the event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTransition {
    pub from: ReputationLevel,
    pub to: ReputationLevel,
}

impl LevelTransition {
    pub fn detect(previous: ReputationLevel, next: ReputationLevel) -> Option<Self> {
        if previous == next {
            None
        } else {
            Some(Self {
                from: previous,
                to: next,
            })
        }
    }

    pub fn is_promotion(&self) -> bool {
        self.to > self.from
    }

    pub fn is_demotion(&self) -> bool {
        self.to < self.from
    }

    /// Upward transitions into the trusted tiers earn a milestone notice.
    pub fn awards_milestone(&self) -> bool {
        self.is_promotion()
            && matches!(
                self.to,
                ReputationLevel::Trusted | ReputationLevel::Exemplary
            )
    }

    pub fn feature_action(&self) -> Option<FeatureAction> {
        if self.awards_milestone() {
            Some(FeatureAction::Unlock)
        } else if self.is_demotion()
            && matches!(
                self.to,
                ReputationLevel::Restricted | ReputationLevel::Probation
            )
        {
            Some(FeatureAction::Restrict)
        } else {
            None
        }
    }
}

/// Feature set granted or revoked when a user enters a level.
pub fn features_for(level: ReputationLevel) -> &'static [&'static str] {
    match level {
        ReputationLevel::Restricted => &["read_only"],
        ReputationLevel::Probation => &["post_with_review"],
        ReputationLevel::Regular => &["post", "comment"],
        ReputationLevel::Trusted => &["post", "comment", "flag_content", "edit_tags"],
        ReputationLevel::Exemplary => &[
            "post",
            "comment",
            "flag_content",
            "edit_tags",
            "moderate_queue",
        ],
    }
}
